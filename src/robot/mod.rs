mod ml;
mod protocol;
mod registry;
mod server;

pub use ml::{MlWorker, UnconfiguredMlWorker};
pub use registry::{ConnectionHandle, RobotRegistry, RobotSnapshot};
pub use server::RobotServer;

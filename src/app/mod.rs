mod shutdown;
mod startup;
mod state;
mod supervisor;
mod types;

pub use supervisor::ProcessSupervisor;
pub use types::{Component, ComponentState, ShutdownReason};

pub mod app;
pub mod arena;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_bus;
pub mod frame_source;
pub mod geometry;
pub mod jpeg_extractor;
pub mod marker;
pub mod overlay;
pub mod pipeline;
pub mod port_guard;
pub mod robot;
pub mod streaming;

pub use app::{Component, ComponentState, ProcessSupervisor, ShutdownReason};
pub use config::AppConfig;
pub use error::{AppError, Result};

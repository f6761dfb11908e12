mod handlers;
mod server;

pub use server::FrontendServer;

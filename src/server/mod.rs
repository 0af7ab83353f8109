mod api_error;
pub mod config;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;

pub use api_error::{ApiError, ErrorCode};
pub use config::ServerConfig;
pub use http_layers::*;
pub use server::run_server;

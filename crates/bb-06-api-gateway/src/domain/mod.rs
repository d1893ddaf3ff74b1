//! Gateway domain: configuration, response envelope and error mapping.

pub mod config;
pub mod envelope;
pub mod error;

pub use config::{ConfigError, CorsConfig, GatewayConfig};
pub use envelope::ApiResponse;
pub use error::{ApiError, ApiResult};

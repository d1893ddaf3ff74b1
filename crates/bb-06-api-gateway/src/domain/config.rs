//! Gateway configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors: CorsConfig,
    /// Largest accepted request body, uploads included.
    pub max_body_bytes: usize,
    /// Upper bound on handling a single request.
    pub request_timeout: Duration,
    /// Unit assumed when a carbon emission write omits one.
    pub default_emission_unit: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            cors: CorsConfig::default(),
            max_body_bytes: 50 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            default_emission_unit: "kgCO2e".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn for_testing() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_body_bytes: 1024 * 1024,
            request_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_body_bytes cannot be 0".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }
        if self.default_emission_unit.trim().is_empty() {
            return Err(ConfigError::InvalidUnit);
        }
        if self.cors.allowed_origins.is_empty() {
            return Err(ConfigError::InvalidCors(
                "at least one allowed origin is required".into(),
            ));
        }
        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// CORS settings.
#[derive(Clone, Debug)]
pub struct CorsConfig {
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache, in seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Idempotency-Key".to_string(),
            ],
            max_age: 3600,
        }
    }
}

impl CorsConfig {
    /// Origins from a comma separated list, as in `CORS_ORIGIN`.
    pub fn with_origins(origins: &str) -> Self {
        Self {
            allowed_origins: origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            ..Self::default()
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("default emission unit cannot be empty")]
    InvalidUnit,
    #[error("invalid CORS configuration: {0}")]
    InvalidCors(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_addr().port(), 3000);
        assert!(GatewayConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = GatewayConfig {
            max_body_bytes: 0,
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));

        let config = GatewayConfig {
            request_timeout: Duration::ZERO,
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_origins_from_list() {
        let cors = CorsConfig::with_origins("http://localhost:3000, https://beanblock.app,");
        assert_eq!(
            cors.allowed_origins,
            vec!["http://localhost:3000", "https://beanblock.app"]
        );

        let config = GatewayConfig {
            cors: CorsConfig::with_origins(" , "),
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCors(_))));
    }
}

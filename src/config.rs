//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

use crate::codes::worker_id::WORKER_ID_MASK;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub codes: CodesConfig,
    pub payments: PaymentsConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment code generation configuration
#[derive(Debug, Clone)]
pub struct CodesConfig {
    pub signing_secret: String,
    /// Fixed worker id override; when absent the id is derived from host
    /// identity at startup.
    pub worker_id: Option<u16>,
    pub prefix: String,
}

/// Payment processing configuration
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub pix_expiration_minutes: i64,
    pub platform_fee_bps: u32,
    pub expiration_poll_seconds: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            codes: CodesConfig::from_env()?,
            payments: PaymentsConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.codes.validate()?;
        self.payments.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            // Defaults to a local development database; SKIP_EXTERNALS
            // deployments never open the pool at all.
            url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/rifaflow".to_string()),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "DATABASE_URL cannot be empty".to_string(),
            ));
        }

        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ConfigError::ValidationFailed(
                "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "DATABASE_MAX_CONNECTIONS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(
                "LOG_LEVEL must be one of trace, debug, info, warn, error".to_string(),
            ));
        }

        Ok(())
    }
}

impl CodesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CodesConfig {
            signing_secret: env::var("CODE_SIGNING_SECRET")
                .map_err(|_| ConfigError::MissingVariable("CODE_SIGNING_SECRET".to_string()))?,
            worker_id: match env::var("CODE_WORKER_ID") {
                Ok(raw) => Some(
                    raw.parse()
                        .map_err(|_| ConfigError::InvalidValue("CODE_WORKER_ID".to_string()))?,
                ),
                Err(_) => None,
            },
            prefix: env::var("PAYMENT_CODE_PREFIX").unwrap_or_else(|_| "PAY".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.len() < 16 {
            return Err(ConfigError::ValidationFailed(
                "CODE_SIGNING_SECRET must be at least 16 characters".to_string(),
            ));
        }

        if let Some(worker_id) = self.worker_id {
            if worker_id > WORKER_ID_MASK {
                return Err(ConfigError::ValidationFailed(format!(
                    "CODE_WORKER_ID must be at most {}",
                    WORKER_ID_MASK
                )));
            }
        }

        Ok(())
    }
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PaymentsConfig {
            pix_expiration_minutes: env::var("PIX_EXPIRATION_MINUTES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_EXPIRATION_MINUTES".to_string()))?,
            platform_fee_bps: env::var("PLATFORM_FEE_BPS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PLATFORM_FEE_BPS".to_string()))?,
            expiration_poll_seconds: env::var("EXPIRATION_POLL_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EXPIRATION_POLL_SECONDS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pix_expiration_minutes <= 0 {
            return Err(ConfigError::ValidationFailed(
                "PIX_EXPIRATION_MINUTES must be positive".to_string(),
            ));
        }

        if self.platform_fee_bps > 10_000 {
            return Err(ConfigError::ValidationFailed(
                "PLATFORM_FEE_BPS cannot exceed 10000".to_string(),
            ));
        }

        if self.expiration_poll_seconds == 0 {
            return Err(ConfigError::ValidationFailed(
                "EXPIRATION_POLL_SECONDS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Invalid port
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_scheme_validation() {
        let config = DatabaseConfig {
            url: "mysql://localhost/rifaflow".to_string(),
            max_connections: 20,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_signing_secret_rejected() {
        let config = CodesConfig {
            signing_secret: "short".to_string(),
            worker_id: None,
            prefix: "PAY".to_string(),
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_id_must_fit_the_id_space() {
        let config = CodesConfig {
            signing_secret: "a-long-enough-signing-secret".to_string(),
            worker_id: Some(WORKER_ID_MASK + 1),
            prefix: "PAY".to_string(),
        };

        assert!(config.validate().is_err());

        let config = CodesConfig {
            worker_id: Some(WORKER_ID_MASK),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fee_over_one_hundred_percent_rejected() {
        let config = PaymentsConfig {
            pix_expiration_minutes: 10,
            platform_fee_bps: 10_001,
            expiration_poll_seconds: 30,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_expiration_window_rejected() {
        let config = PaymentsConfig {
            pix_expiration_minutes: 0,
            platform_fee_bps: 500,
            expiration_poll_seconds: 30,
        };

        assert!(config.validate().is_err());
    }
}

//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use todo_tracker::db::DatabaseConfig;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid {
                var: "APP_ENV".to_string(),
                reason: format!("'{other}' is not one of development, staging, production"),
            }),
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    /// Tokens added per second
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
    pub enabled: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub env: Environment,
    /// Database configuration; ignored when `in_memory` is set
    pub database: DatabaseConfig,
    /// Use the in-process store instead of PostgreSQL
    pub in_memory: bool,
    pub limiter: LimiterConfig,
    /// Origins allowed to make cross-origin requests
    pub cors_trusted_origins: Vec<String>,
    /// Server-side secret mixed into password hashes
    pub password_pepper: String,
    /// From address for outgoing email
    pub smtp_sender: String,
    /// Install the Prometheus recorder and serve `/debug/vars`
    pub metrics: bool,
}

/// Values given on the command line; each wins over its environment variable.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub env: Option<Environment>,
    pub database_url: Option<String>,
    pub in_memory: bool,
    pub limiter_rps: Option<f64>,
    pub limiter_burst: Option<u32>,
    pub limiter_disabled: bool,
    pub cors_trusted_origins: Option<String>,
    pub metrics: bool,
}

const DEV_PEPPER: &str = "development-only-pepper";

impl ServerConfig {
    /// Load configuration from environment variables, applying `overrides`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is malformed, or if production is selected
    /// without `PASSWORD_PEPPER`.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let port = match overrides.port {
            Some(port) => port,
            None => parse_env_strict("PORT", 4000)?,
        };

        let env = match overrides.env {
            Some(env) => env,
            None => match std::env::var("APP_ENV") {
                Ok(v) => v.parse()?,
                Err(_) => Environment::Development,
            },
        };

        let development = DatabaseConfig::development();
        let database_url = overrides
            .database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or(development.database_url);

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 25),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 1),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 900),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
            query_timeout: Duration::from_secs(parse_env_or("DB_QUERY_TIMEOUT_SECS", 5)),
        };

        let limiter = LimiterConfig {
            rps: match overrides.limiter_rps {
                Some(rps) => rps,
                None => parse_env_strict("LIMITER_RPS", 2.0)?,
            },
            burst: match overrides.limiter_burst {
                Some(burst) => burst,
                None => parse_env_strict("LIMITER_BURST", 4)?,
            },
            enabled: !overrides.limiter_disabled && parse_env_strict("LIMITER_ENABLED", true)?,
        };

        let cors_trusted_origins = overrides
            .cors_trusted_origins
            .or_else(|| std::env::var("CORS_TRUSTED_ORIGINS").ok())
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let password_pepper = match std::env::var("PASSWORD_PEPPER") {
            Ok(pepper) => pepper,
            Err(_) if env.is_production() => {
                return Err(ConfigError::MissingRequired {
                    var: "PASSWORD_PEPPER".to_string(),
                    hint: "Generate with: openssl rand -hex 16".to_string(),
                });
            }
            Err(_) => DEV_PEPPER.to_string(),
        };

        let smtp_sender = std::env::var("SMTP_SENDER")
            .unwrap_or_else(|_| "Todo Tracker <no-reply@todo-tracker.local>".to_string());

        Ok(ServerConfig {
            port,
            env,
            database,
            in_memory: overrides.in_memory,
            limiter,
            cors_trusted_origins,
            password_pepper,
            smtp_sender,
            metrics: overrides.metrics || parse_env_or("METRICS_ENABLED", false),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.limiter.rps > 0.0) {
            return Err(ConfigError::Invalid {
                var: "LIMITER_RPS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.limiter.burst == 0 {
            return Err(ConfigError::Invalid {
                var: "LIMITER_BURST".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if self.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        for origin in &self.cors_trusted_origins {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    var: "CORS_TRUSTED_ORIGINS".to_string(),
                    reason: format!("'{origin}' must start with http:// or https://"),
                });
            }
        }

        if !self.in_memory && self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_env_or`], but a present, unparsable value is an error.
fn parse_env_strict<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
            var: key.to_string(),
            reason: format!("'{v}' could not be parsed"),
        }),
        Err(_) => Ok(default),
    }
}

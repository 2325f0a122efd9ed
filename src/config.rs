use std::env;
use std::fmt;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_FRONTEND_URL_PROD: &str = "http://localhost:5173";
const DEFAULT_FRONTEND_URL_DEV: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    pub frontend_url_prod: String,
    pub frontend_url_dev: String,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => {
                write!(f, "{} must be set in environment variables or .env file", key)
            }
            ConfigError::Invalid { key, value } => {
                write!(f, "{} has an invalid value: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let pool_size = match lookup("DB_POOL_SIZE") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DB_POOL_SIZE",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_POOL_SIZE,
        };

        Ok(AppConfig {
            database_url,
            host,
            port,
            pool_size,
            frontend_url_prod: lookup("FRONTEND_URL_PROD")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL_PROD.to_string()),
            frontend_url_dev: lookup("FRONTEND_URL_DEV")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL_DEV.to_string()),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

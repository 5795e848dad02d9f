use std::env;

use crate::error::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:votes.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Runtime configuration, read from the environment (and `.env` if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    /// Load `.env` then read `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(
            env::var("DATABASE_URL").ok(),
            env::var("DATABASE_MAX_CONNECTIONS").ok(),
        )
    }

    fn from_vars(database_url: Option<String>, max_connections: Option<String>) -> Result<Self> {
        let database_url = database_url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections = match max_connections {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(Error::Config(format!(
                        "DATABASE_MAX_CONNECTIONS must be a positive integer, got {raw:?}"
                    )));
                }
                Ok(n) => n,
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_vars(None, None).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn explicit_values_win() {
        let config =
            Config::from_vars(Some("sqlite::memory:".into()), Some(" 1 ".into())).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn bad_pool_size_is_rejected() {
        assert!(matches!(
            Config::from_vars(None, Some("zero".into())),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_vars(None, Some("0".into())),
            Err(Error::Config(_))
        ));
    }
}

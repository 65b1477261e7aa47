// ============================================================================
// CONFIGURATION
// ============================================================================
//
// Variables lues (après chargement du .env par dotenv):
//   - PORT                 : port HTTP (défaut 4000)
//   - APP_ENV              : development | staging | production (défaut development)
//   - DATABASE_URL         : obligatoire (postgres://... ou sqlite:...)
//   - DB_MAX_CONNECTIONS   : taille max du pool (défaut 25)
//   - DB_MIN_CONNECTIONS   : connexions gardées ouvertes (défaut 1)
//   - DB_IDLE_TIMEOUT_SECS : fermeture des connexions inactives (défaut 900)
//   - MAIL_SENDER          : expéditeur des emails d'activation
//   - LIMITER_ENABLED      : limitation de débit par IP (défaut true)
//   - LIMITER_RPS          : requêtes par seconde et par IP (défaut 2)
//   - LIMITER_BURST        : rafale tolérée par IP (défaut 4)
//
// ============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set in .env file")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout: Duration,
}

/// Seau à jetons par adresse IP du client
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub enabled: bool,
    pub rps: u32,
    pub burst: u32,
}

impl LimiterConfig {
    /// Intervalle entre deux jetons rendus au seau
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.rps.max(1)))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub env: String,
    pub database: DatabaseConfig,
    pub mail_sender: String,
    pub limiter: LimiterConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construit la configuration à partir d'une fonction de lecture,
    /// ce qui permet de tester sans toucher aux variables du processus.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_name = lookup("APP_ENV").unwrap_or_else(|| "development".to_string());
        if !matches!(env_name.as_str(), "development" | "staging" | "production") {
            return Err(ConfigError::Invalid {
                key: "APP_ENV",
                value: env_name,
            });
        }

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 25)?,
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 1)?,
            idle_timeout: Duration::from_secs(parse_or(&lookup, "DB_IDLE_TIMEOUT_SECS", 900)?),
        };

        if database.min_connections > database.max_connections {
            return Err(ConfigError::Invalid {
                key: "DB_MIN_CONNECTIONS",
                value: database.min_connections.to_string(),
            });
        }

        let limiter = LimiterConfig {
            enabled: parse_or(&lookup, "LIMITER_ENABLED", true)?,
            rps: parse_or(&lookup, "LIMITER_RPS", 2)?,
            burst: parse_or(&lookup, "LIMITER_BURST", 4)?,
        };

        for (key, value) in [("LIMITER_RPS", limiter.rps), ("LIMITER_BURST", limiter.burst)] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", 4000)?,
            env: env_name,
            database,
            mail_sender: lookup("MAIL_SENDER")
                .unwrap_or_else(|| "Replays <no-reply@replays.local>".to_string()),
            limiter,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

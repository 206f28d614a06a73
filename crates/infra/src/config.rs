//! Process configuration loaded from environment variables.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use jobrelay_core::PriorityPolicy;

use crate::jobs::EngineConfig;
use crate::notify::RetryPolicy;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://jobs.db?mode=rwc";
pub const DEFAULT_COMPLETION_DELAY_MS: u64 = 3000;
pub const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which job store the process runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Sqlite { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreConfig,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub webhook_max_retries: u32,
    pub completion_delay: Duration,
    pub strict_priority: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreConfig::Sqlite {
                url: DEFAULT_DATABASE_URL.to_string(),
            },
            webhook_url: None,
            webhook_timeout: Duration::from_millis(DEFAULT_WEBHOOK_TIMEOUT_MS),
            webhook_max_retries: 0,
            completion_delay: Duration::from_millis(DEFAULT_COMPLETION_DELAY_MS),
            strict_priority: false,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset or blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let in_memory = parse_bool("USE_IN_MEMORY_STORE", get("USE_IN_MEMORY_STORE"), false)?;
        let store = if in_memory {
            StoreConfig::InMemory
        } else {
            StoreConfig::Sqlite {
                url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            }
        };

        Ok(Self {
            port: parse_num("PORT", get("PORT"), defaults.port)?,
            store,
            webhook_url: get("WEBHOOK_URL").map(|u| u.trim().to_string()),
            webhook_timeout: Duration::from_millis(parse_num(
                "WEBHOOK_TIMEOUT_MS",
                get("WEBHOOK_TIMEOUT_MS"),
                DEFAULT_WEBHOOK_TIMEOUT_MS,
            )?),
            webhook_max_retries: parse_num(
                "WEBHOOK_MAX_RETRIES",
                get("WEBHOOK_MAX_RETRIES"),
                defaults.webhook_max_retries,
            )?,
            completion_delay: Duration::from_millis(parse_num(
                "JOB_COMPLETION_DELAY_MS",
                get("JOB_COMPLETION_DELAY_MS"),
                DEFAULT_COMPLETION_DELAY_MS,
            )?),
            strict_priority: parse_bool("STRICT_PRIORITY", get("STRICT_PRIORITY"), false)?,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    pub fn engine_config(&self) -> EngineConfig {
        let policy = if self.strict_priority {
            PriorityPolicy::Strict
        } else {
            PriorityPolicy::Loose
        };
        EngineConfig::default()
            .with_completion_delay(self.completion_delay)
            .with_priority_policy(policy)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.webhook_max_retries == 0 {
            return RetryPolicy::no_retry();
        }
        RetryPolicy::exponential(
            self.webhook_max_retries,
            Duration::from_millis(500),
            Duration::from_secs(30),
        )
    }
}

fn parse_num<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

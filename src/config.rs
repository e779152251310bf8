use std::{env, str::FromStr, time::Duration};

use url::Url;

use crate::{error::ConfigError, identity::IdentityPool};

pub const DEFAULT_SEARCH_URL: &str = "https://search.wb.ru/exactmatch/ru/common/v4/search";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub parse: ParseDefaults,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub search_url: String,
    pub timeout: Duration,
    pub identities: IdentityPool,
}

/// Values used when a caller leaves `limit` or `delay` out.
#[derive(Debug, Clone, Copy)]
pub struct ParseDefaults {
    pub limit: usize,
    pub delay: Duration,
}

impl Default for ParseDefaults {
    fn default() -> Self {
        Self {
            limit: 100,
            delay: Duration::from_secs(1),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let identities = match lookup("WB_USER_AGENTS") {
            Some(raw) => IdentityPool::new(
                raw.split('|')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )?,
            None => IdentityPool::default(),
        };

        let search_url = lookup("WB_SEARCH_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
        if Url::parse(&search_url).is_err() {
            return Err(ConfigError::Invalid {
                name: "WB_SEARCH_URL",
                value: search_url,
            });
        }

        Ok(Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 8000)?,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL")
                    .unwrap_or_else(|| "sqlite://wb_products.db".to_string()),
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            },
            upstream: UpstreamConfig {
                search_url,
                timeout: Duration::from_secs(parse_or(&lookup, "WB_TIMEOUT_SECS", 10)?),
                identities,
            },
            parse: ParseDefaults {
                limit: parse_or(&lookup, "PARSE_DEFAULT_LIMIT", 100)?,
                delay: delay_from_secs(parse_or(&lookup, "PARSE_DEFAULT_DELAY", 1.0)?)
                    .ok_or_else(|| ConfigError::Invalid {
                        name: "PARSE_DEFAULT_DELAY",
                        value: lookup("PARSE_DEFAULT_DELAY").unwrap_or_default(),
                    })?,
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Seconds to `Duration`; `None` for negative, NaN or infinite input.
pub fn delay_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

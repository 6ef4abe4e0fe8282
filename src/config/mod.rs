use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http_server: ServerConfig,
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub links: LinksConfig,
    pub clicks: ClicksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

impl FromStr for DatabaseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(DatabaseBackend::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseBackend::Postgres),
            "memory" => Ok(DatabaseBackend::Memory),
            other => bail!(
                "unknown database backend '{other}'. Supported values: sqlite, postgres, memory"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store hits needed before a link is cached; below 1 caches on create
    pub min_uses_before_caching: i64,
    pub capacity: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Length of generated short codes
    pub max_link_len: usize,
    /// Give up generating a code after this many collisions; unset retries forever
    pub max_generation_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClicksConfig {
    pub batching_period_ms: u64,
    pub buffer_capacity: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ClicksConfig {
    pub fn batching_period(&self) -> Duration {
        Duration::from_millis(self.batching_period_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http_server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            log: LogConfig {
                level: "info".to_string(),
            },
            database: DatabaseConfig {
                backend: DatabaseBackend::Sqlite,
                url: "sqlite://./shortener.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            cache: CacheConfig {
                min_uses_before_caching: 3,
                capacity: 10_000,
                ttl_secs: 300,
            },
            links: LinksConfig {
                max_link_len: 6,
                max_generation_attempts: None,
            },
            clicks: ClicksConfig {
                batching_period_ms: 10_000,
                buffer_capacity: 1000,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let backend = match lookup("SHORTENER_DATABASE_BACKEND") {
            Some(value) => value.parse()?,
            None => defaults.database.backend,
        };

        let max_link_len: usize = parse_or(&lookup, "SHORTENER_MAX_LINK_LEN", defaults.links.max_link_len)?;
        if max_link_len == 0 {
            bail!("SHORTENER_MAX_LINK_LEN must be at least 1");
        }

        let batching_period_ms: u64 = parse_or(
            &lookup,
            "SHORTENER_BATCHING_PERIOD_MS",
            defaults.clicks.batching_period_ms,
        )?;
        if batching_period_ms == 0 {
            bail!("SHORTENER_BATCHING_PERIOD_MS must be at least 1");
        }

        let max_generation_attempts = lookup("SHORTENER_MAX_GENERATION_ATTEMPTS")
            .map(|v| {
                v.parse::<u32>()
                    .with_context(|| format!("invalid SHORTENER_MAX_GENERATION_ATTEMPTS '{v}'"))
            })
            .transpose()?;

        Ok(Config {
            http_server: ServerConfig {
                host: lookup("SHORTENER_HTTP_HOST").unwrap_or(defaults.http_server.host),
                port: parse_or(&lookup, "SHORTENER_HTTP_PORT", defaults.http_server.port)?,
            },
            log: LogConfig {
                level: lookup("SHORTENER_LOG_LEVEL").unwrap_or(defaults.log.level),
            },
            database: DatabaseConfig {
                backend,
                url: lookup("SHORTENER_DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_or(
                    &lookup,
                    "SHORTENER_DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            cache: CacheConfig {
                min_uses_before_caching: parse_or(
                    &lookup,
                    "SHORTENER_CACHE_MIN_USES_BEFORE_CACHING",
                    defaults.cache.min_uses_before_caching,
                )?,
                capacity: parse_or(&lookup, "SHORTENER_CACHE_CAPACITY", defaults.cache.capacity)?,
                ttl_secs: parse_or(&lookup, "SHORTENER_CACHE_TTL_SECS", defaults.cache.ttl_secs)?,
            },
            links: LinksConfig {
                max_link_len,
                max_generation_attempts,
            },
            clicks: ClicksConfig {
                batching_period_ms,
                buffer_capacity: parse_or(
                    &lookup,
                    "SHORTENER_CLICK_BUFFER_CAPACITY",
                    defaults.clicks.buffer_capacity,
                )?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{value}'")),
        None => Ok(default),
    }
}

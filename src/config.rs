use anyhow::{bail, Context};
use tracing::Level;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "TRANSCRIPT_GPA_MAX_CONNECTIONS";
pub const LOG_LEVEL: &str = "TRANSCRIPT_GPA_LOG";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_level: Level,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL).filter(|url| !url.trim().is_empty());

        let max_connections = match lookup(MAX_CONNECTIONS) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{MAX_CONNECTIONS} must be a positive integer"))?,
            None => 5,
        };
        if max_connections == 0 {
            bail!("{MAX_CONNECTIONS} must be at least 1");
        }

        let log_level = match lookup(LOG_LEVEL) {
            Some(raw) => raw
                .trim()
                .parse::<Level>()
                .map_err(|_| anyhow::anyhow!("{LOG_LEVEL} must be one of trace, debug, info, warn, error"))?,
            None => Level::INFO,
        };

        Ok(Config {
            database_url,
            max_connections,
            log_level,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

// src/config.rs
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub book: Book,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Events between progress log lines; 0 disables progress logging.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    #[serde(default)]
    pub json_logs: bool, // structured JSON logs to stderr
}

#[derive(Debug, Clone, Deserialize)]
pub struct Book {
    /// Preallocated order slots; the book grows past this transparently.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

fn default_progress_interval() -> u64 {
    100_000
}

fn default_pool_capacity() -> usize {
    crate::orderbook::ORDER_POOL_CAPACITY
}

impl Default for General {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            json_logs: false,
        }
    }
}

impl Default for Book {
    fn default() -> Self {
        Self {
            pool_capacity: default_pool_capacity(),
        }
    }
}

impl AppConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.book.pool_capacity == 0 {
            anyhow::bail!("book.pool_capacity must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.general.progress_interval, 100_000);
        assert_eq!(cfg.book.pool_capacity, crate::orderbook::ORDER_POOL_CAPACITY);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: AppConfig = toml::from_str("[general]\njson_logs = true\n").unwrap();
        assert!(cfg.general.json_logs);
        assert_eq!(cfg.book.pool_capacity, crate::orderbook::ORDER_POOL_CAPACITY);
    }

    #[test]
    fn rejects_zero_pool() {
        let cfg: AppConfig = toml::from_str("[book]\npool_capacity = 0\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}

//! Writer configuration

use crate::error::{Result, WriterError};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_INTERVAL_MS: &str = "BLOCK_WRITER_INTERVAL_MS";
pub const ENV_MAX_TXNS: &str = "BLOCK_WRITER_MAX_TXNS";
pub const ENV_JOURNAL: &str = "BLOCK_WRITER_JOURNAL";

/// Writer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    /// Time between block writes
    pub interval: Duration,

    /// Upper bound on transactions drained into one block
    pub max_block_transactions: usize,

    /// JSON-lines file receiving every written block
    pub journal_path: Option<PathBuf>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_block_transactions: 1000,
            journal_path: None,
        }
    }
}

impl WriterConfig {
    /// Create a new config builder
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder::default()
    }

    /// Load from `BLOCK_WRITER_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_INTERVAL_MS) {
            let millis: u64 = parse_var(ENV_INTERVAL_MS, &raw)?;
            config.interval = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup(ENV_MAX_TXNS) {
            config.max_block_transactions = parse_var(ENV_MAX_TXNS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_JOURNAL) {
            if !raw.trim().is_empty() {
                config.journal_path = Some(PathBuf::from(raw.trim()));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the writer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(WriterError::ConfigError(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.max_block_transactions == 0 {
            return Err(WriterError::ConfigError(
                "max_block_transactions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| WriterError::ConfigError(format!("{} has invalid value: {:?}", key, raw)))
}

/// Builder for WriterConfig
#[derive(Default)]
pub struct WriterConfigBuilder {
    config: WriterConfig,
}

impl WriterConfigBuilder {
    /// Set write interval
    pub fn interval(mut self, duration: Duration) -> Self {
        self.config.interval = duration;
        self
    }

    /// Set write interval in milliseconds
    pub fn interval_millis(mut self, millis: u64) -> Self {
        self.config.interval = Duration::from_millis(millis);
        self
    }

    /// Set write interval in seconds
    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.config.interval = Duration::from_secs(secs);
        self
    }

    pub fn max_block_transactions(mut self, max: usize) -> Self {
        self.config.max_block_transactions = max;
        self
    }

    pub fn journal_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.journal_path = path;
        self
    }

    /// Build the config
    pub fn build(self) -> WriterConfig {
        self.config
    }
}

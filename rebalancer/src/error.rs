//! Error types for the rebalancer.

use std::path::PathBuf;

use crate::feed::FeedError;

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("failed to access settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings JSON: {0}")]
    SettingsParse(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    Invalid(#[from] etfbalance::ValidationError),

    #[error("market data unavailable: {0}")]
    Feed(#[from] FeedError),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for Storeshell
//!
//! Every failure in the notification/navigation core is local: callers log
//! these and fall back (offline view, dropped notification, default target).

use thiserror::Error;

/// Errors raised while loading shell configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configured storefront URL has no usable host.
    #[error("invalid store url: {0}")]
    InvalidStoreUrl(String),

    /// The generator config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The generator config file is not valid JSON.
    #[error("invalid app config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the durable schedule store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schedule store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("schedule store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by `LocalScheduler`. Never fatal for the app.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The alarm primitive is missing or permission was denied.
    #[error("alarm service unavailable: {0}")]
    AlarmUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from a notification surface.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("notification surface rejected alert: {0}")]
    Rejected(String),
}

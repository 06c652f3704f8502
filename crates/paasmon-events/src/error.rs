//! Error types for the app watcher.

use thiserror::Error;

/// Errors raised while opening an envelope stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("failed to subscribe to app {app}: {reason}")]
    Subscribe { app: String, reason: String },
}

/// Errors surfaced by [`crate::AppWatcher`].
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("could not open envelope stream: {0}")]
    Stream(#[from] StreamError),

    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("app watcher is closed")]
    Closed,
}

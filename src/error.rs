//! Error types for the notification engine.

/// Top-level error type for the notification engine.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Activity store read/write error.
    #[error("store error: {0}")]
    Store(String),

    /// Platform notification sink error (schedule or cancel rejected).
    #[error("sink error: {0}")]
    Sink(String),

    /// Notification permission has been revoked or was never granted.
    #[error("notification permission not granted")]
    PermissionDenied,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Refresh coordination error.
    #[error("refresh error: {0}")]
    Refresh(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Result alias that carries the custom [`LyricSyncError`] type.
pub type Result<T> = std::result::Result<T, LyricSyncError>;

/// Common error type for the core crate.
///
/// Only construction-time operations (loading documents and configuration)
/// can fail. Everything evaluated per tick is total.
#[derive(Debug, thiserror::Error)]
pub enum LyricSyncError {
    /// The input could not be turned into a lyric document.
    #[error("parse error: {0}")]
    Parse(String),
    /// A configuration value could not be interpreted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Wrapper around JSON decoding errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form error message.
    #[error("{0}")]
    Message(String),
}

impl LyricSyncError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a parse error for malformed document input.
    pub fn parse<T: Into<String>>(msg: T) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<&str> for LyricSyncError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LyricSyncError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

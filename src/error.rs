//! Error handling for crosswatch

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config error (bad environment value, unknown board mapping)
    #[error("Config error: {0}")]
    Config(String),

    /// Calibration geometry could not be loaded or is incomplete
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serial port error
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Evidence capture error (ffmpeg frame grab)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

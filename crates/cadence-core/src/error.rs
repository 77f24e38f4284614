//! Error types for Cadence.

use thiserror::Error;

/// Result type alias using Cadence's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadence.
#[derive(Error, Debug)]
pub enum Error {
    // Decoder errors
    #[error("Decoder missing or misconfigured: {0}")]
    DecoderMissing(String),

    #[error("Failed to start decoder: {0}")]
    DecoderSpawn(String),

    // Queue errors
    #[error("Queue is full (max {max} tracks)")]
    QueueFull { max: usize },

    #[error("Index {index} is out of bounds for a queue of {len} tracks")]
    IndexOutOfBounds { index: usize, len: usize },

    // Engine errors
    #[error("Volume must be between 0 and 100, got {0}")]
    InvalidVolume(u16),

    #[error("Player has been killed")]
    EngineKilled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the chat layer should echo this error to the user.
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::DecoderMissing(_)
                | Self::QueueFull { .. }
                | Self::IndexOutOfBounds { .. }
                | Self::InvalidVolume(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_user_visible() {
        assert!(Error::DecoderMissing("ffmpeg".into()).is_user_visible());
        assert!(Error::QueueFull { max: 10 }.is_user_visible());
        assert!(!Error::DecoderSpawn("boom".into()).is_user_visible());
        assert!(!Error::EngineKilled.is_user_visible());
    }

    #[test]
    fn test_io_and_json_conversions() {
        fn parse(text: &str) -> Result<u8> {
            Ok(serde_json::from_str(text)?)
        }
        assert!(matches!(parse("7"), Ok(7)));
        assert!(matches!(parse("nope"), Err(Error::Json(_))));

        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
        assert!(!err.is_user_visible());
    }

    #[test]
    fn test_error_display() {
        let err = Error::IndexOutOfBounds { index: 5, len: 3 };
        assert_eq!(
            err.to_string(),
            "Index 5 is out of bounds for a queue of 3 tracks"
        );
        assert_eq!(
            Error::InvalidVolume(150).to_string(),
            "Volume must be between 0 and 100, got 150"
        );
    }
}

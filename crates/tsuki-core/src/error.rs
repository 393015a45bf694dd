//! Error types for Tsuki Core

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid source URL '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    // Stream errors
    #[error("Codec not supported: {codec}")]
    CodecNotSupported { codec: String },

    #[error("Stream failed to load: {0}")]
    StreamFatal(String),

    #[error("No stream attached")]
    NotAttached,

    // Playback errors
    #[error("Playback rate {rate} is not in the allowed set")]
    UnsupportedRate { rate: f64 },

    // Network errors
    #[cfg(feature = "hls")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a fatal stream error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::StreamFatal(msg.into())
    }

    /// Returns true if this error terminates the playback session.
    ///
    /// Fatal errors put the player in its "failed to load" state; there is
    /// no automatic retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_)
                | Error::ManifestParse(_)
                | Error::InvalidSource { .. }
                | Error::CodecNotSupported { .. }
                | Error::StreamFatal(_)
        )
    }

    /// Returns the error code reported alongside fatal stream errors
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidSource { .. } => "INVALID_SOURCE",
            Error::CodecNotSupported { .. } => "CODEC_UNSUPPORTED",
            Error::StreamFatal(_) => "STREAM_FATAL",
            Error::NotAttached => "NOT_ATTACHED",
            Error::UnsupportedRate { .. } => "UNSUPPORTED_RATE",
            #[cfg(feature = "hls")]
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::ManifestFetch("404".into()).is_fatal());
        assert!(Error::CodecNotSupported { codec: "hev1".into() }.is_fatal());
        assert!(!Error::NotAttached.is_fatal());
        assert!(!Error::UnsupportedRate { rate: 3.0 }.is_fatal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::fatal("boom").error_code(), "STREAM_FATAL");
        assert_eq!(Error::InvalidConfig("x".into()).error_code(), "INVALID_CONFIG");
    }
}

//! Error types for Kilde.

use thiserror::Error;

/// Library-level error type for Kilde operations.
#[derive(Error, Debug)]
pub enum KildeError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transcript or search result absent for valid input.
    #[error("Not available for {video_id}: {reason}")]
    NotAvailable { video_id: String, reason: String },

    /// Upstream rejected the request because of its rate limit.
    #[error("Throttled by upstream: {0}")]
    Throttled(String),

    /// Network failure, timeout or 5xx response.
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    /// Malformed query or filters; never retried.
    #[error("Request rejected (HTTP {status}): {message}")]
    PermanentRequest { status: u16, message: String },

    /// Unreadable cache or library record.
    #[error("Corrupt local state at {location}: {reason}")]
    CorruptState { location: String, reason: String },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Audio download failed: {0}")]
    AudioDownload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl KildeError {
    /// Shorthand for a [`KildeError::NotAvailable`].
    pub fn not_available(video_id: impl Into<String>, reason: impl Into<String>) -> Self {
        KildeError::NotAvailable {
            video_id: video_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is worth another attempt after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KildeError::Throttled(_) | KildeError::Transient(_))
    }
}

/// Result type alias for Kilde operations.
pub type Result<T> = std::result::Result<T, KildeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(KildeError::Throttled("429".into()).is_retryable());
        assert!(KildeError::Transient("timeout".into()).is_retryable());
        assert!(!KildeError::PermanentRequest {
            status: 400,
            message: "bad filter".into()
        }
        .is_retryable());
        assert!(!KildeError::not_available("abc", "disabled").is_retryable());
    }
}

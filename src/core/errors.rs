//! Custom error types for translation operations

use thiserror::Error;

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// The caller sent a missing or malformed value
    #[error("{message}")]
    InvalidInput {
        message: String,
    },

    /// A document or artifact does not exist
    #[error("{message}")]
    NotFound {
        message: String,
    },

    /// Provider credential is not configured
    #[error("No API key configured for provider {provider}")]
    MissingCredential {
        provider: String,
    },

    /// Remote provider call failed
    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
    },

    /// Provider finished without producing any text
    #[error("Model returned an empty translation")]
    EmptyTranslation,

    /// The consumer went away before the run finished
    #[error("Translation cancelled")]
    Cancelled,

    /// Document store read/write failure
    #[error("Storage error: {path} - {message}")]
    Storage {
        path: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TranslationError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(path: impl AsRef<std::path::Path>, message: impl ToString) -> Self {
        Self::Storage {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// HTTP-style status class for this error: 400, 404 or 500
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::NotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Whether the message may be shown to the caller verbatim
    pub fn is_user_facing(&self) -> bool {
        self.status_code() < 500
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(TranslationError::invalid_input("Unknown model selected.").status_code(), 400);
        assert_eq!(TranslationError::not_found("Document metadata missing.").status_code(), 404);
        assert_eq!(TranslationError::provider("google", "boom").status_code(), 500);
        assert_eq!(TranslationError::storage("/tmp/x", "disk full").status_code(), 500);
        assert_eq!(TranslationError::EmptyTranslation.status_code(), 500);
    }

    #[test]
    fn test_io_failures_become_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TranslationError::storage("/data/abc.json", io);
        assert!(matches!(err, TranslationError::Storage { ref path, .. } if path == "/data/abc.json"));
        assert_eq!(err.to_string(), "Storage error: /data/abc.json - denied");
        assert!(!err.is_user_facing());
    }

    #[test]
    fn test_user_facing_messages_are_verbatim() {
        let err = TranslationError::invalid_input("Only TXT uploads are supported.");
        assert!(err.is_user_facing());
        assert_eq!(err.to_string(), "Only TXT uploads are supported.");

        let err = TranslationError::MissingCredential {
            provider: "anthropic".to_string(),
        };
        assert!(!err.is_user_facing());
    }
}

//! Error types for the alerting-receivers crate.

use alerting_templates::TemplateError;
use thiserror::Error;

/// Errors that can occur while notifying a receiver.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// A template failed to render; nothing was sent.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Receiver settings are missing or inconsistent.
    #[error("invalid settings: {reason}")]
    InvalidSettings {
        /// The reason the settings are invalid.
        reason: String,
    },

    /// The message could not be delivered.
    #[error("delivery failed: {reason}")]
    Delivery {
        /// The reason delivery failed.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ReceiverError {
    /// Creates an [`ReceiverError::InvalidSettings`] error.
    pub fn invalid_settings(reason: impl Into<String>) -> Self {
        Self::InvalidSettings {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ReceiverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for receiver operations.
pub type Result<T> = std::result::Result<T, ReceiverError>;

/// Errors returned by an [`ImageProvider`](crate::sender::ImageProvider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// No image exists for the token.
    #[error("image not found")]
    NotFound,

    /// The image exists but cannot be served yet.
    #[error("image unavailable")]
    Unavailable,

    /// The image store could not be reached.
    #[error("image store error: {reason}")]
    Transport {
        /// The reason the lookup failed.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_settings() {
        let err = ReceiverError::invalid_settings("url is required");
        assert_eq!(err.to_string(), "invalid settings: url is required");
    }

    #[test]
    fn error_display_delivery() {
        let err = ReceiverError::Delivery {
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "delivery failed: connection refused");
    }

    #[test]
    fn error_from_template_error() {
        let err: ReceiverError = TemplateError::OutputTooLarge { limit: 10 }.into();
        assert!(matches!(
            err,
            ReceiverError::Template(TemplateError::OutputTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let err: ReceiverError = json_err.unwrap_err().into();
        assert!(matches!(err, ReceiverError::Serialization(_)));
    }

    #[test]
    fn image_error_display() {
        assert_eq!(ImageError::NotFound.to_string(), "image not found");
        let err = ImageError::Transport {
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "image store error: timeout");
    }
}

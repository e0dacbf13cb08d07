//! Error types for the alerting-templates crate.

use thiserror::Error;

/// Errors that can occur while building factories or rendering templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A template kind outside the known set.
    #[error("invalid template kind: {kind}")]
    InvalidKind {
        /// The rejected kind value.
        kind: String,
    },

    /// The external URL could not be parsed.
    #[error("invalid external URL {url:?}: {reason}")]
    InvalidExternalUrl {
        /// The rejected URL.
        url: String,
        /// The parser's reason.
        reason: String,
    },

    /// A template definition is malformed (bad name, unbalanced inline blocks).
    #[error("invalid template definition {name:?}: {reason}")]
    InvalidDefinition {
        /// The definition name.
        name: String,
        /// The reason the definition is invalid.
        reason: String,
    },

    /// A definition failed to compile.
    #[error("failed to parse template {name:?}: {reason}")]
    Parse {
        /// The template that failed to compile.
        name: String,
        /// The compiler's reason.
        reason: String,
    },

    /// Template execution failed.
    #[error("failed to render template: {reason}")]
    Render {
        /// The engine's reason.
        reason: String,
    },

    /// Rendered output exceeded the configured maximum size.
    #[error("template output exceeds the maximum size of {limit} bytes")]
    OutputTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TemplateError {
    /// Returns true if this error reports oversized template output.
    #[must_use]
    pub const fn is_output_too_large(&self) -> bool {
        matches!(self, Self::OutputTooLarge { .. })
    }

    /// Returns true if this error reports an unknown template kind.
    #[must_use]
    pub const fn is_invalid_kind(&self) -> bool {
        matches!(self, Self::InvalidKind { .. })
    }
}

impl From<serde_json::Error> for TemplateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

//! Translation error types

use thiserror::Error;

/// Failure reported by a translation backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Worth retrying: network trouble, throttling, server errors, empty output
    #[error("{0}")]
    Transient(String),
    /// Retrying cannot help: rejected request or unreadable response
    #[error("{0}")]
    Permanent(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Translation that could not be produced. Carries the text that was being translated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Translation failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        original_text: String,
        attempts: u32,
        last_error: BackendError,
    },
    #[error("Translation rejected: {error}")]
    Rejected {
        original_text: String,
        error: BackendError,
    },
}

impl TranslationError {
    pub fn original_text(&self) -> &str {
        match self {
            TranslationError::RetriesExhausted { original_text, .. }
            | TranslationError::Rejected { original_text, .. } => original_text,
        }
    }
}

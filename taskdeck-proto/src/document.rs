//! Conversion from remote documents into typed in-memory entities.

use chrono::{DateTime, Utc};

use crate::value::Document;

/// Errors raised when a remote document cannot be normalized.
///
/// Most fields degrade to defaults; only fields without a sensible default
/// (foreign keys, calendar keys) produce an error, and the caller skips the
/// document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// A required field is missing or null.
    #[error("document {id}: missing field `{field}`")]
    MissingField {
        /// Document id.
        id: String,
        /// Field name.
        field: &'static str,
    },
    /// A required field is present but cannot be interpreted.
    #[error("document {id}: invalid field `{field}`: {reason}")]
    InvalidField {
        /// Document id.
        id: String,
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// An entity that can be rebuilt from a remote document.
///
/// `now` supplies the fallback for missing creation/update timestamps so
/// that normalization stays a pure function.
pub trait FromDocument: Sized + Clone + Send + Sync + 'static {
    /// Normalizes a raw document into the entity.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if a field without a default is missing or
    /// malformed.
    fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self, DocumentError>;

    /// Returns the document id of the entity.
    fn document_id(&self) -> &str;
}

//! Error taxonomy for the form model.
//!
//! Everything here is recoverable except [`FormError::DataIntegrity`]:
//! a response set that contradicts its schema snapshot must be surfaced
//! to an operator, never silently repaired.

use crate::{DuplicateGroupId, FieldId, SectionId};
use thiserror::Error;

/// Result alias for form operations
pub type FormResult<T> = Result<T, FormError>;

/// Errors produced by the form model and its operations
#[derive(Debug, Error)]
pub enum FormError {
    /// A section id that does not exist in the schema
    #[error("section not found: {0}")]
    UnknownSection(SectionId),

    /// A field id that does not exist in the referenced section
    #[error("field not found: {0}")]
    UnknownField(FieldId),

    /// A duplicate group id that matches no live section instance
    #[error("duplicate group not found: {0}")]
    UnknownGroup(DuplicateGroupId),

    /// Misuse of the section model (e.g. duplicating a non-duplicatable
    /// section, removing the only instance). The prior state is untouched.
    #[error("section invariant violated: {0}")]
    InvariantViolation(String),

    /// Responses that contradict the schema snapshot they were recorded
    /// against. Fatal for the affected request: processing halts and the
    /// condition is surfaced, never repaired.
    #[error("response data integrity error: {0}")]
    DataIntegrity(String),
}

// error.rs — Error types for the changeset subsystem.

use thiserror::Error;

use crate::field::FieldType;

/// Errors that can occur while building change sets.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// A raw value could not be read as its declared field type.
    #[error("field '{field}': value '{value}' is not a valid {field_type}")]
    InvalidFieldValue {
        field: String,
        value: String,
        field_type: FieldType,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

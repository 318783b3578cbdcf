// error.rs — Error types for the storage layer.
//
// Every collaborator (policy repository, account repository, form catalog,
// profile store) reports failures through this one enum so the engine can
// wrap them uniformly.

use std::path::PathBuf;

use apr_changeset::ChangeSetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced entity does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    /// Stored data is inconsistent or malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backend cannot serve requests (poisoned lock, lost connection).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A column name cannot be used in a query.
    #[error("invalid column identifier '{0}'")]
    InvalidIdentifier(String),

    /// A stored value does not fit its declared field type.
    #[error(transparent)]
    Field(#[from] ChangeSetError),

    /// Failed to read or write a backing file.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("fixture parse error: {0}")]
    FixtureError(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

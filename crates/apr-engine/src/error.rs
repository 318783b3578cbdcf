// error.rs — Error types for policy evaluation.

use std::path::PathBuf;

use apr_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluationError {
    /// A collaborator failed while building the profile or compiling changes.
    #[error("policy evaluation failed for identity '{identity_key}': {source}")]
    PolicyEvaluation {
        identity_key: String,
        #[source]
        source: StoreError,
    },

    /// An allowed object offers no usable way to create the account.
    #[error("no provisioning option configured for object '{object_key}' (identity '{identity_key}')")]
    Configuration {
        identity_key: String,
        object_key: String,
    },

    #[error("failed to read engine config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid engine config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Attach the identity under evaluation to collaborator failures.
pub(crate) trait ForIdentity<T> {
    fn for_identity(self, identity_key: &str) -> Result<T>;
}

impl<T, E: Into<StoreError>> ForIdentity<T> for std::result::Result<T, E> {
    fn for_identity(self, identity_key: &str) -> Result<T> {
        self.map_err(|err| EvaluationError::PolicyEvaluation {
            identity_key: identity_key.to_string(),
            source: err.into(),
        })
    }
}

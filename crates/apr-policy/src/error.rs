// error.rs — Error types for the policy model.

use thiserror::Error;

/// Errors raised while interpreting raw policy data.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The stored object action code is not one of 0, 1 or 2.
    #[error("unknown object action code '{code}'")]
    UnknownObjectAction { code: String },

    /// The stored priority is not an integer.
    #[error("invalid priority '{value}' for policy '{policy_key}'")]
    InvalidPriority { policy_key: String, value: String },
}

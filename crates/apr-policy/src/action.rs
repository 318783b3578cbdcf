// action.rs — What happens to an account once its granting policy stops applying,
// and how a new account may be created.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Disposition of an account whose object is no longer granted.
///
/// Variants are declared in escalation order so that `Ord` matches it:
/// `None < Revoke < Disable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjAction {
    #[default]
    None,
    Revoke,
    Disable,
}

impl ObjAction {
    /// Decode the numeric code used by the policy repository.
    pub fn from_code(code: &str) -> Result<Self, PolicyError> {
        match code.trim() {
            "0" | "" => Ok(ObjAction::None),
            "1" => Ok(ObjAction::Revoke),
            "2" => Ok(ObjAction::Disable),
            other => Err(PolicyError::UnknownObjectAction {
                code: other.to_string(),
            }),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ObjAction::None => 0,
            ObjAction::Revoke => 1,
            ObjAction::Disable => 2,
        }
    }

    /// Combine the actions of two policies granting the same object.
    ///
    /// The result never de-escalates: DISABLE dominates REVOKE, which
    /// dominates NONE.
    pub fn merge(self, other: ObjAction) -> ObjAction {
        self.max(other)
    }
}

impl fmt::Display for ObjAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjAction::None => "none",
            ObjAction::Revoke => "revoke",
            ObjAction::Disable => "disable",
        };
        f.write_str(label)
    }
}

/// Ways a missing account can be created for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProvisioningOption {
    Direct,
    Request,
}

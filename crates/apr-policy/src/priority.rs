// priority.rs — Policy precedence.
//
// Lower ranks win. The raw value -1 is reserved: it marks a policy that
// only ever holds an object when nothing ranked grants it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Raw value stored for an unconditioned policy.
pub const UNCONDITIONED: i64 = -1;

/// Precedence of a policy when several grant the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Priority {
    /// Ordinary precedence; lower value wins.
    Ranked(i64),
    /// Lowest precedence regardless of any ranked value.
    Unconditioned,
}

impl Priority {
    /// Parse a priority as it is stored by the policy repository.
    pub fn parse(policy_key: &str, raw: &str) -> Result<Self, PolicyError> {
        raw.trim()
            .parse::<i64>()
            .map(Priority::from)
            .map_err(|_| PolicyError::InvalidPriority {
                policy_key: policy_key.to_string(),
                value: raw.to_string(),
            })
    }

    /// Whether a challenger holding `self` displaces an incumbent holding `incumbent`.
    ///
    /// A ranked priority displaces a higher-valued ranked one and any
    /// unconditioned one. An unconditioned priority never displaces anything,
    /// so the outcome does not depend on the order policies are folded in.
    pub fn outranks(self, incumbent: Priority) -> bool {
        match (self, incumbent) {
            (Priority::Ranked(challenger), Priority::Ranked(current)) => challenger < current,
            (Priority::Ranked(_), Priority::Unconditioned) => true,
            (Priority::Unconditioned, _) => false,
        }
    }
}

impl From<i64> for Priority {
    fn from(raw: i64) -> Self {
        if raw == UNCONDITIONED {
            Priority::Unconditioned
        } else {
            Priority::Ranked(raw)
        }
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Ranked(value) => value,
            Priority::Unconditioned => UNCONDITIONED,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Ranked(value) => write!(f, "{}", value),
            Priority::Unconditioned => write!(f, "unconditioned"),
        }
    }
}

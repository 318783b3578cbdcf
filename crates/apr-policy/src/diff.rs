// diff.rs — Which previously stored policies no longer apply to an identity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::profile::{PolicyProfile, StoredProfile};

/// A policy recorded in the stored profile that the new profile no longer contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InapplicablePolicy {
    pub policy_key: String,
    /// Names of the objects the policy used to allow.
    pub object_names: BTreeSet<String>,
}

impl InapplicablePolicy {
    pub fn allowed(&self, object_name: &str) -> bool {
        self.object_names.contains(object_name)
    }
}

/// Compare the stored profile with the freshly built one.
///
/// Returns every stored policy key absent from the new per-policy lists,
/// keyed by policy.
pub fn policies_no_longer_applicable(
    stored: Option<&StoredProfile>,
    profile: &PolicyProfile,
) -> BTreeMap<String, InapplicablePolicy> {
    let Some(stored) = stored else {
        return BTreeMap::new();
    };

    stored
        .details
        .iter()
        .filter(|(policy_key, _)| !profile.policy_lists.contains_key(*policy_key))
        .map(|(policy_key, lists)| {
            let object_names = lists
                .allowed
                .iter()
                .map(|entry| object_name_of(entry))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            (
                policy_key.clone(),
                InapplicablePolicy {
                    policy_key: policy_key.clone(),
                    object_names,
                },
            )
        })
        .collect()
}

/// Strip a trailing `" [policy:...]"` annotation from an allow-list entry.
fn object_name_of(entry: &str) -> &str {
    let trimmed = entry.trim();
    match trimmed.rfind('[') {
        Some(start) if trimmed.ends_with(']') => trimmed[..start].trim_end(),
        _ => trimmed,
    }
}

// profile.rs — The per-identity policy profile, in its transient and persisted forms.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::action::ProvisioningOption;
use crate::details::{PolicyObjectDetails, SupplementalPolicy};

/// Object names a single policy allowed or denied, in the order they were considered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyObjectLists {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub denied: Vec<String>,
}

impl PolicyObjectLists {
    pub fn allow_csv(&self) -> String {
        self.allowed.join(",")
    }

    pub fn deny_csv(&self) -> String {
        self.denied.join(",")
    }

    /// Whether both lists render identically, ignoring ASCII case.
    pub fn same_as(&self, other: &PolicyObjectLists) -> bool {
        self.allow_csv().eq_ignore_ascii_case(&other.allow_csv())
            && self.deny_csv().eq_ignore_ascii_case(&other.deny_csv())
    }
}

/// Everything learned about an identity's policies during one evaluation.
///
/// Built by [`crate::PolicyProfileBuilder`]. An object key appears in at most
/// one of `allowed_objects`, `denied_objects` and `objects_denied_for_org`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyProfile {
    pub identity_key: String,
    /// Object key -> the policy holding it.
    pub allowed_objects: BTreeMap<String, PolicyObjectDetails>,
    /// Object key -> object name.
    pub denied_objects: BTreeMap<String, String>,
    /// Object key -> object name.
    pub objects_denied_for_org: BTreeMap<String, String>,
    /// Object name -> policy key -> policy that also grants the object.
    pub supplemental_policies: BTreeMap<String, BTreeMap<String, SupplementalPolicy>>,
    pub provisioning_options: BTreeMap<String, BTreeSet<ProvisioningOption>>,
    /// Policy key -> names it allowed/denied, whether or not it won.
    pub policy_lists: BTreeMap<String, PolicyObjectLists>,
    /// Policies still contributing after conflicts; empty means nothing to persist
    /// for an identity without a stored profile.
    pub tracked_policies: BTreeSet<String>,
}

impl PolicyProfile {
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            ..Default::default()
        }
    }

    pub fn is_allowed(&self, object_key: &str) -> bool {
        self.allowed_objects.contains_key(object_key)
    }

    pub fn is_denied(&self, object_key: &str) -> bool {
        self.denied_objects.contains_key(object_key)
    }

    /// Summary allow list: `"<object> [<holder>:<supplemental>...]"` per allowed object.
    pub fn summary_allow_list(&self) -> Vec<String> {
        self.allowed_objects
            .values()
            .map(|details| {
                let mut entry = format!("{} [{}", details.object_name, details.policy_name);
                if let Some(others) = self.supplemental_policies.get(&details.object_name) {
                    for other in others.values() {
                        entry.push(':');
                        entry.push_str(&other.policy_name);
                    }
                }
                entry.push(']');
                entry
            })
            .collect()
    }

    /// Summary deny list: union of policy-denied and org-denied object names.
    pub fn summary_deny_list(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .denied_objects
            .values()
            .chain(self.objects_denied_for_org.values())
            .collect();
        names.into_iter().cloned().collect()
    }

    pub fn org_deny_list(&self) -> Vec<String> {
        self.objects_denied_for_org.values().cloned().collect()
    }

    /// The persisted form of this profile.
    pub fn to_stored(&self) -> StoredProfile {
        StoredProfile {
            identity_key: self.identity_key.clone(),
            allow_list: self.summary_allow_list(),
            deny_list: self.summary_deny_list(),
            org_deny_list: self.org_deny_list(),
            details: self.policy_lists.clone(),
        }
    }
}

/// A policy profile as the profile store keeps it between evaluations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub identity_key: String,
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default)]
    pub deny_list: Vec<String>,
    #[serde(default)]
    pub org_deny_list: Vec<String>,
    /// Policy key -> object names it allowed/denied.
    #[serde(default)]
    pub details: BTreeMap<String, PolicyObjectLists>,
}

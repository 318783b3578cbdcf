// details.rs — Policy definitions as read from the repository, and the
// per-(policy, object) details produced by classification.

use serde::{Deserialize, Serialize};

use crate::action::ObjAction;
use crate::priority::Priority;

/// An access policy applicable to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub policy_key: String,
    pub policy_name: String,
    pub priority: Priority,
    #[serde(default)]
    pub approval_required: bool,
    /// Retrofit policies claim unowned reconciled or bulk-loaded accounts.
    #[serde(default)]
    pub retrofit: bool,
}

/// One resource object a policy grants or denies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyObjectGrant {
    pub object_key: String,
    pub object_name: String,
    #[serde(default)]
    pub denied_by_policy: bool,
    #[serde(default)]
    pub obj_action_inapplicable: ObjAction,
    #[serde(default)]
    pub allowed_for_all_orgs: bool,
    #[serde(default)]
    pub allow_multiple_instances: bool,
}

/// The policy/object pairing that currently holds an object for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyObjectDetails {
    pub policy_key: String,
    pub policy_name: String,
    pub priority: Priority,
    pub approval_required: bool,
    pub obj_action_inapplicable: ObjAction,
    pub object_key: String,
    pub object_name: String,
    pub allowed_for_all_orgs: bool,
    pub allow_multiple_instances: bool,
    pub denied_by_policy: bool,
    pub retrofit: bool,
}

impl PolicyObjectDetails {
    pub fn new(policy: &PolicyDefinition, grant: &PolicyObjectGrant) -> Self {
        Self {
            policy_key: policy.policy_key.clone(),
            policy_name: policy.policy_name.clone(),
            priority: policy.priority,
            approval_required: policy.approval_required,
            obj_action_inapplicable: grant.obj_action_inapplicable,
            object_key: grant.object_key.clone(),
            object_name: grant.object_name.clone(),
            allowed_for_all_orgs: grant.allowed_for_all_orgs,
            allow_multiple_instances: grant.allow_multiple_instances,
            denied_by_policy: grant.denied_by_policy,
            retrofit: policy.retrofit,
        }
    }

    /// The reference kept for a policy that grants the object but does not hold it.
    pub fn as_supplemental(&self) -> SupplementalPolicy {
        SupplementalPolicy {
            policy_key: self.policy_key.clone(),
            policy_name: self.policy_name.clone(),
            priority: self.priority,
        }
    }
}

/// A policy that also grants an object but lost the priority contest for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementalPolicy {
    pub policy_key: String,
    pub policy_name: String,
    pub priority: Priority,
}

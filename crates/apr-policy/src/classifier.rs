// classifier.rs — Allow/deny decision for one (policy, object) pair.
//
// The classifier only looks at the grant itself and the identity's
// organization allow list. Conflicts between policies granting the same
// object are resolved later by the profile builder.

use std::collections::BTreeSet;

use crate::details::PolicyObjectGrant;

/// Outcome of classifying a single grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The policy explicitly denies the object.
    Denied,
    /// The object is not available to the identity's organization.
    DeniedForOrg,
    /// The policy may provision the object.
    Grantable,
}

/// Classifies grants against one identity's organization allow list.
#[derive(Debug, Clone, Default)]
pub struct PolicyObjectClassifier {
    org_allow_list: BTreeSet<String>,
}

impl PolicyObjectClassifier {
    pub fn new(org_allow_list: BTreeSet<String>) -> Self {
        Self { org_allow_list }
    }

    pub fn org_allow_list(&self) -> &BTreeSet<String> {
        &self.org_allow_list
    }

    pub fn classify(&self, grant: &PolicyObjectGrant) -> Classification {
        if grant.denied_by_policy {
            return Classification::Denied;
        }
        if !grant.allowed_for_all_orgs && !self.org_allow_list.contains(&grant.object_key) {
            return Classification::DeniedForOrg;
        }
        Classification::Grantable
    }
}

// builder.rs — Fold all applicable policies into a PolicyProfile.
//
// Policies are folded in retrieval order. The result does not depend on that
// order: priority decides object holders, action merging only escalates, and
// denials are applied as a key-set subtraction once every policy is folded.

use std::collections::btree_map::Entry;
use std::collections::BTreeSet;

use tracing::debug;

use crate::action::ProvisioningOption;
use crate::classifier::{Classification, PolicyObjectClassifier};
use crate::details::{PolicyDefinition, PolicyObjectDetails, PolicyObjectGrant};
use crate::profile::PolicyProfile;

/// Accumulates classified grants for one identity.
pub struct PolicyProfileBuilder {
    classifier: PolicyObjectClassifier,
    profile: PolicyProfile,
}

impl PolicyProfileBuilder {
    pub fn new(identity_key: impl Into<String>, org_allow_list: BTreeSet<String>) -> Self {
        Self {
            classifier: PolicyObjectClassifier::new(org_allow_list),
            profile: PolicyProfile::new(identity_key),
        }
    }

    /// Classify every object of one policy and fold the results in.
    pub fn add_policy(&mut self, policy: &PolicyDefinition, grants: &[PolicyObjectGrant]) {
        for grant in grants {
            self.process_object(policy, grant);
        }
    }

    /// Apply the deny pass and return the finished profile.
    ///
    /// An object ends up in at most one of allowed, denied and denied-for-org.
    pub fn finish(mut self) -> PolicyProfile {
        let denied: Vec<String> = self.profile.denied_objects.keys().cloned().collect();
        for object_key in denied {
            if self.profile.allowed_objects.remove(&object_key).is_some() {
                debug!(object = %object_key, "denial overrides earlier grant");
            }
        }
        let PolicyProfile {
            allowed_objects,
            denied_objects,
            objects_denied_for_org,
            ..
        } = &mut self.profile;
        objects_denied_for_org.retain(|object_key, _| {
            !allowed_objects.contains_key(object_key) && !denied_objects.contains_key(object_key)
        });
        self.profile
    }

    fn process_object(&mut self, policy: &PolicyDefinition, grant: &PolicyObjectGrant) {
        self.record_policy_lists(&policy.policy_key, grant);

        match self.classifier.classify(grant) {
            Classification::Denied => {
                debug!(policy = %policy.policy_key, object = %grant.object_key, "denied by policy");
                self.profile
                    .denied_objects
                    .insert(grant.object_key.clone(), grant.object_name.clone());
            }
            Classification::DeniedForOrg => {
                debug!(policy = %policy.policy_key, object = %grant.object_key, "not available to organization");
                self.profile
                    .objects_denied_for_org
                    .insert(grant.object_key.clone(), grant.object_name.clone());
            }
            Classification::Grantable => {
                // Provisioning is always direct; Request is never offered here.
                self.profile
                    .provisioning_options
                    .entry(grant.object_key.clone())
                    .or_default()
                    .insert(ProvisioningOption::Direct);
                self.profile.objects_denied_for_org.remove(&grant.object_key);
                self.grant(PolicyObjectDetails::new(policy, grant));
            }
        }
    }

    fn grant(&mut self, challenger: PolicyObjectDetails) {
        let object_key = challenger.object_key.clone();
        let incumbent = match self.profile.allowed_objects.entry(object_key.clone()) {
            Entry::Vacant(slot) => {
                debug!(policy = %challenger.policy_key, object = %object_key, "granted");
                slot.insert(challenger);
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let merged = incumbent
            .obj_action_inapplicable
            .merge(challenger.obj_action_inapplicable);

        if incumbent.policy_key == challenger.policy_key {
            incumbent.obj_action_inapplicable = merged;
            return;
        }

        let loser = if challenger.priority.outranks(incumbent.priority) {
            debug!(
                object = %object_key,
                winner = %challenger.policy_key,
                displaced = %incumbent.policy_key,
                "higher priority policy takes over object"
            );
            let mut winner = challenger.clone();
            winner.obj_action_inapplicable = merged;
            std::mem::replace(incumbent, winner)
        } else {
            incumbent.obj_action_inapplicable = merged;
            challenger.clone()
        };

        self.profile.tracked_policies.remove(&challenger.policy_key);
        self.profile
            .supplemental_policies
            .entry(loser.object_name.clone())
            .or_default()
            .insert(loser.policy_key.clone(), loser.as_supplemental());
    }

    fn record_policy_lists(&mut self, policy_key: &str, grant: &PolicyObjectGrant) {
        let lists = self
            .profile
            .policy_lists
            .entry(policy_key.to_string())
            .or_default();
        if grant.denied_by_policy {
            lists.denied.push(grant.object_name.clone());
        } else {
            lists.allowed.push(grant.object_name.clone());
        }
        self.profile.tracked_policies.insert(policy_key.to_string());
    }
}

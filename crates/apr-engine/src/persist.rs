// persist.rs — ProfilePersister: write the new policy profile, archiving the old one.
//
// Order matters when a profile already exists: the current profile and its
// details are archived before any detail is deleted or rewritten, and the
// summary lists are written last.

use apr_policy::{PolicyProfile, StoredProfile};
use apr_store::ProfileStore;
use uuid::Uuid;

use crate::error::{ForIdentity, Result};

/// What the persister wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// No stored profile and nothing worth storing.
    Skipped,
    Created,
    Updated { history_key: Uuid },
}

pub struct ProfilePersister<'a> {
    store: &'a dyn ProfileStore,
}

impl<'a> ProfilePersister<'a> {
    pub fn new(store: &'a dyn ProfileStore) -> Self {
        Self { store }
    }

    /// Replace `stored` (the profile read at the start of the evaluation) with `profile`.
    pub fn update_profile(
        &self,
        profile: &PolicyProfile,
        stored: Option<&StoredProfile>,
    ) -> Result<PersistOutcome> {
        let identity = profile.identity_key.as_str();

        let Some(stored) = stored else {
            if profile.tracked_policies.is_empty() {
                return Ok(PersistOutcome::Skipped);
            }
            self.save_summary(profile)?;
            for (policy_key, lists) in &profile.policy_lists {
                self.store
                    .save_profile_detail(identity, policy_key, lists)
                    .for_identity(identity)?;
            }
            tracing::info!(identity = %identity, "created policy profile");
            return Ok(PersistOutcome::Created);
        };

        let history_key = self.store.archive_profile(identity).for_identity(identity)?;
        self.store
            .archive_profile_details(history_key, &stored.details)
            .for_identity(identity)?;

        for policy_key in stored.details.keys() {
            if !profile.policy_lists.contains_key(policy_key) {
                self.store
                    .delete_profile_detail(identity, policy_key)
                    .for_identity(identity)?;
            }
        }
        for (policy_key, lists) in &profile.policy_lists {
            let unchanged = stored
                .details
                .get(policy_key)
                .is_some_and(|old| old.same_as(lists));
            if !unchanged {
                self.store
                    .save_profile_detail(identity, policy_key, lists)
                    .for_identity(identity)?;
            }
        }
        self.save_summary(profile)?;

        tracing::info!(
            identity = %identity,
            history_key = %history_key,
            "updated policy profile"
        );
        Ok(PersistOutcome::Updated { history_key })
    }

    fn save_summary(&self, profile: &PolicyProfile) -> Result<()> {
        self.store
            .save_profile(
                &profile.identity_key,
                &profile.summary_allow_list(),
                &profile.summary_deny_list(),
                &profile.org_deny_list(),
            )
            .for_identity(&profile.identity_key)
    }
}

// context.rs — The collaborators one evaluation talks to, and per-call memoization.

use std::collections::BTreeMap;

use apr_policy::{ObjAction, PolicyObjectGrant};
use apr_store::{AccountRepository, FormCatalog, PolicyRepository, ProfileStore};

/// Borrowed handles to every collaborator.
///
/// Repositories may be separate objects or one store implementing all four traits.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub policies: &'a dyn PolicyRepository,
    pub accounts: &'a dyn AccountRepository,
    pub forms: &'a dyn FormCatalog,
    pub profiles: &'a dyn ProfileStore,
}

impl<'a> Collaborators<'a> {
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: PolicyRepository + AccountRepository + FormCatalog + ProfileStore,
    {
        Self {
            policies: store,
            accounts: store,
            forms: store,
            profiles: store,
        }
    }

    /// Same collaborators, with profiles kept elsewhere.
    pub fn with_profiles(self, profiles: &'a dyn ProfileStore) -> Self {
        Self { profiles, ..self }
    }
}

/// Objects of each policy, read once per evaluation.
#[derive(Debug, Default)]
pub struct PolicyObjects {
    by_policy: BTreeMap<String, Vec<PolicyObjectGrant>>,
}

impl PolicyObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// The policy's objects, reading them from `repository` on first use.
    pub fn fetch(
        &mut self,
        repository: &dyn PolicyRepository,
        policy_key: &str,
    ) -> apr_store::Result<&[PolicyObjectGrant]> {
        if !self.by_policy.contains_key(policy_key) {
            let grants = repository.objects_for_policy(policy_key)?;
            self.by_policy.insert(policy_key.to_string(), grants);
        }
        Ok(self
            .by_policy
            .get(policy_key)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Whether rows a policy writes for an object go away once the policy stops applying.
    pub fn revoke_flag(&self, policy_key: &str, object_key: &str) -> bool {
        self.by_policy
            .get(policy_key)
            .and_then(|grants| grants.iter().find(|grant| grant.object_key == object_key))
            .is_some_and(|grant| grant.obj_action_inapplicable == ObjAction::Revoke)
    }
}

// profile_changes.rs — The change-set returned for one identity.

use std::collections::BTreeMap;

use apr_policy::PolicyObjectDetails;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::account_change::AccountChange;

/// Bucket an existing account ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountBucket {
    Revoke,
    Disable,
    Enable,
    Modify,
}

/// Provisioning actions required to bring an identity into compliance.
///
/// New accounts are keyed by object key, existing accounts by user-account key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfileChanges {
    pub accounts_to_request: BTreeMap<String, PolicyObjectDetails>,
    pub accounts_to_provision: BTreeMap<String, PolicyObjectDetails>,
    pub accounts_to_enable: BTreeMap<String, Option<AccountChange>>,
    pub accounts_to_disable: BTreeMap<String, Option<AccountChange>>,
    pub accounts_to_revoke: BTreeMap<String, Option<AccountChange>>,
    pub accounts_to_modify: BTreeMap<String, AccountChange>,
}

/// Entry counts per bucket, for logging and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub request: usize,
    pub provision: usize,
    pub enable: usize,
    pub disable: usize,
    pub revoke: usize,
    pub modify: usize,
}

impl AccountProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.accounts_to_request.is_empty()
            && self.accounts_to_provision.is_empty()
            && self.accounts_to_enable.is_empty()
            && self.accounts_to_disable.is_empty()
            && self.accounts_to_revoke.is_empty()
            && self.accounts_to_modify.is_empty()
    }

    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            request: self.accounts_to_request.len(),
            provision: self.accounts_to_provision.len(),
            enable: self.accounts_to_enable.len(),
            disable: self.accounts_to_disable.len(),
            revoke: self.accounts_to_revoke.len(),
            modify: self.accounts_to_modify.len(),
        }
    }

    /// The strongest bucket holding `user_account_key`, if any.
    pub fn bucket_of(&self, user_account_key: &str) -> Option<AccountBucket> {
        if self.accounts_to_revoke.contains_key(user_account_key) {
            Some(AccountBucket::Revoke)
        } else if self.accounts_to_disable.contains_key(user_account_key) {
            Some(AccountBucket::Disable)
        } else if self.accounts_to_enable.contains_key(user_account_key) {
            Some(AccountBucket::Enable)
        } else if self.accounts_to_modify.contains_key(user_account_key) {
            Some(AccountBucket::Modify)
        } else {
            None
        }
    }

    /// Leave every existing account in exactly one bucket.
    ///
    /// Precedence is revoke > disable > enable > modify. A modify-bucket change
    /// moves along with its account into the stronger bucket.
    pub fn consolidate(&mut self) {
        for key in self.accounts_to_revoke.keys() {
            self.accounts_to_disable.remove(key);
            self.accounts_to_enable.remove(key);
        }
        for key in self.accounts_to_disable.keys() {
            self.accounts_to_enable.remove(key);
        }

        for bucket in [
            &mut self.accounts_to_revoke,
            &mut self.accounts_to_disable,
            &mut self.accounts_to_enable,
        ] {
            for (key, slot) in bucket.iter_mut() {
                if let Some(change) = self.accounts_to_modify.remove(key) {
                    debug!(account = %key, "modify changes folded into stronger bucket");
                    *slot = Some(change);
                }
            }
        }
    }
}

// repository.rs — Collaborator interfaces consumed by the evaluation engine.
//
// All methods take `&self` and are blocking. Implementations must be
// shareable across threads so evaluations for different identities can run
// side by side; evaluations for the same identity must be serialized by the
// caller because the profile store is last-write-wins.

use std::collections::{BTreeMap, BTreeSet};

use apr_policy::{PolicyDefinition, PolicyObjectGrant, PolicyObjectLists, StoredProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::filter::EqualityFilter;
use crate::records::{
    ChildFormDefault, FormField, FormRow, ParentFormDefault, ProvisionedAccount,
};

/// Read access to policy definitions and their defaults.
pub trait PolicyRepository: Send + Sync {
    /// Policies whose assignment criteria match the identity, in retrieval order.
    fn applicable_policies(&self, identity_key: &str) -> Result<Vec<PolicyDefinition>>;

    fn objects_for_policy(&self, policy_key: &str) -> Result<Vec<PolicyObjectGrant>>;

    fn parent_form_defaults(
        &self,
        policy_key: &str,
        object_key: &str,
    ) -> Result<Vec<ParentFormDefault>>;

    /// Default child records, one row per (form, record number, field).
    fn child_form_defaults(
        &self,
        policy_key: &str,
        object_key: &str,
        parent_form: &str,
    ) -> Result<Vec<ChildFormDefault>>;
}

/// Read access to identities and the accounts they hold.
pub trait AccountRepository: Send + Sync {
    /// Object keys available to the identity's organization.
    fn org_allow_list(&self, identity_key: &str) -> Result<BTreeSet<String>>;

    fn current_accounts(&self, identity_key: &str) -> Result<Vec<ProvisionedAccount>>;

    fn is_identity_disabled(&self, identity_key: &str) -> Result<bool>;

    /// When the identity was deprovisioned, if it was.
    fn deprovisioned_at(&self, identity_key: &str) -> Result<Option<DateTime<Utc>>>;

    /// The account's row in `form_name`, restricted to rows written by
    /// `policy_key` when one is given.
    fn provisioned_form_data(
        &self,
        form_name: &str,
        account_key: &str,
        policy_key: Option<&str>,
    ) -> Result<Option<FormRow>>;

    fn child_rows(&self, form_name: &str, account_key: &str) -> Result<Vec<FormRow>>;

    /// Child rows of the account matching every clause of `filter`.
    fn find_child_rows(
        &self,
        form_name: &str,
        account_key: &str,
        filter: &EqualityFilter,
    ) -> Result<Vec<FormRow>>;
}

/// Form metadata.
pub trait FormCatalog: Send + Sync {
    /// Fields of the form's active version.
    fn form_fields(&self, form_name: &str) -> Result<Vec<FormField>>;

    fn child_forms(&self, parent_form: &str) -> Result<Vec<String>>;

    /// Columns reconciliation uses to identify a child row. Empty when none are configured.
    fn reconciliation_keys(&self, form_name: &str) -> Result<BTreeSet<String>>;

    /// Columns that decide whether a default record matches a stored row.
    /// `None` means every column is significant.
    fn matching_attributes(&self, form_name: &str) -> Result<Option<BTreeSet<String>>>;
}

/// An archived copy of a stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub history_key: Uuid,
    pub archived_at: DateTime<Utc>,
    pub profile: StoredProfile,
}

/// Persistence of per-identity policy profiles and their history.
pub trait ProfileStore: Send + Sync {
    fn current_profile(&self, identity_key: &str) -> Result<Option<StoredProfile>>;

    /// Write the summary lists, creating the profile if needed.
    fn save_profile(
        &self,
        identity_key: &str,
        allow_list: &[String],
        deny_list: &[String],
        org_deny_list: &[String],
    ) -> Result<()>;

    /// Insert or replace the lists recorded for one policy.
    fn save_profile_detail(
        &self,
        identity_key: &str,
        policy_key: &str,
        lists: &PolicyObjectLists,
    ) -> Result<()>;

    fn delete_profile_detail(&self, identity_key: &str, policy_key: &str) -> Result<()>;

    /// Copy the current summary lists to history and return the snapshot key.
    fn archive_profile(&self, identity_key: &str) -> Result<Uuid>;

    /// Attach per-policy details to an archived snapshot.
    fn archive_profile_details(
        &self,
        history_key: Uuid,
        details: &BTreeMap<String, PolicyObjectLists>,
    ) -> Result<()>;

    /// Archived snapshots for the identity, oldest first.
    fn history(&self, identity_key: &str) -> Result<Vec<ProfileSnapshot>>;
}

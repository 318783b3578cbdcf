// memory.rs — In-memory implementation of every collaborator interface.
//
// Backs the command line and the test suites. State lives behind `RwLock`s
// so one store can be shared by evaluations running on several threads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use apr_changeset::{FieldType, FieldValue};
use apr_policy::{PolicyDefinition, PolicyObjectGrant, PolicyObjectLists, StoredProfile};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::filter::EqualityFilter;
use crate::fixture::{Fixture, FormEntry, IdentityEntry, PolicyEntry, RowEntry};
use crate::records::{
    ChildFormDefault, FormField, FormRow, ParentFormDefault, ProvisionedAccount,
};
use crate::repository::{
    AccountRepository, FormCatalog, PolicyRepository, ProfileSnapshot, ProfileStore,
};

#[derive(Default)]
struct Directory {
    identities: BTreeMap<String, IdentityEntry>,
    /// Retrieval order is insertion order.
    policies: Vec<PolicyEntry>,
    forms: BTreeMap<String, FormEntry>,
    accounts: Vec<(String, ProvisionedAccount)>,
    rows: Vec<FormRow>,
}

#[derive(Default)]
struct Profiles {
    current: BTreeMap<String, StoredProfile>,
    history: Vec<ProfileSnapshot>,
}

/// A complete directory held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    directory: RwLock<Directory>,
    profiles: RwLock<Profiles>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a fixture, typing form rows against their forms.
    pub fn from_fixture(fixture: Fixture) -> Result<Self> {
        tracing::debug!(
            identities = fixture.identities.len(),
            policies = fixture.policies.len(),
            accounts = fixture.accounts.len(),
            "seeding store"
        );
        let store = Self::new();
        for form in fixture.forms {
            store.insert_form(form)?;
        }
        for identity in fixture.identities {
            store.insert_identity(identity)?;
        }
        for policy in fixture.policies {
            store.insert_policy(policy)?;
        }
        for entry in fixture.accounts {
            store.insert_account(&entry.identity, entry.account)?;
        }
        for row in fixture.form_rows {
            store.insert_row_entry(row)?;
        }
        {
            let mut profiles = write(&store.profiles)?;
            for profile in fixture.profiles {
                profiles.current.insert(profile.identity_key.clone(), profile);
            }
        }
        Ok(store)
    }

    pub fn insert_identity(&self, identity: IdentityEntry) -> Result<()> {
        write(&self.directory)?
            .identities
            .insert(identity.key.clone(), identity);
        Ok(())
    }

    pub fn insert_policy(&self, policy: PolicyEntry) -> Result<()> {
        let mut directory = write(&self.directory)?;
        directory.policies.retain(|p| p.key != policy.key);
        directory.policies.push(policy);
        Ok(())
    }

    pub fn insert_form(&self, form: FormEntry) -> Result<()> {
        write(&self.directory)?.forms.insert(form.name.clone(), form);
        Ok(())
    }

    pub fn insert_account(&self, identity_key: &str, account: ProvisionedAccount) -> Result<()> {
        let mut directory = write(&self.directory)?;
        directory
            .accounts
            .retain(|(_, a)| a.user_account_key != account.user_account_key);
        directory.accounts.push((identity_key.to_string(), account));
        Ok(())
    }

    pub fn insert_row(&self, row: FormRow) -> Result<()> {
        let mut directory = write(&self.directory)?;
        directory
            .rows
            .retain(|r| !(r.form_name == row.form_name && r.primary_key == row.primary_key));
        directory.rows.push(row);
        Ok(())
    }

    /// Insert a row given as strings, typing each value by its form field.
    pub fn insert_row_entry(&self, entry: RowEntry) -> Result<()> {
        let types = self.field_types(&entry.form_name)?;
        let mut fields = BTreeMap::new();
        for (name, raw) in &entry.fields {
            let field_type = types.get(name).copied().unwrap_or_default();
            fields.insert(name.clone(), FieldValue::parse(name, raw, field_type)?);
        }
        self.insert_row(FormRow {
            form_name: entry.form_name,
            primary_key: entry.primary_key,
            account_key: entry.account_key,
            policy_key: entry.policy_key,
            revoke_if_inapplicable: entry.revoke_if_inapplicable,
            fields,
        })
    }

    pub fn rows(&self, form_name: &str) -> Result<Vec<FormRow>> {
        Ok(read(&self.directory)?
            .rows
            .iter()
            .filter(|row| row.form_name == form_name)
            .cloned()
            .collect())
    }

    fn field_types(&self, form_name: &str) -> Result<BTreeMap<String, FieldType>> {
        Ok(read(&self.directory)?
            .forms
            .get(form_name)
            .map(|form| {
                form.fields
                    .iter()
                    .map(|field| (field.name.clone(), field.field_type))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn identity<R>(&self, identity_key: &str, f: impl FnOnce(&IdentityEntry) -> R) -> Result<R> {
        let directory = read(&self.directory)?;
        directory
            .identities
            .get(identity_key)
            .map(f)
            .ok_or_else(|| StoreError::NotFound {
                kind: "identity",
                key: identity_key.to_string(),
            })
    }
}

impl PolicyRepository for InMemoryStore {
    fn applicable_policies(&self, identity_key: &str) -> Result<Vec<PolicyDefinition>> {
        let keys = self.identity(identity_key, |identity| identity.policies.clone())?;
        let directory = read(&self.directory)?;
        keys.iter()
            .map(|key| {
                directory
                    .policies
                    .iter()
                    .find(|policy| &policy.key == key)
                    .map(PolicyEntry::definition)
                    .ok_or_else(|| {
                        StoreError::InvalidData(format!(
                            "identity '{}' references unknown policy '{}'",
                            identity_key, key
                        ))
                    })
            })
            .collect()
    }

    fn objects_for_policy(&self, policy_key: &str) -> Result<Vec<PolicyObjectGrant>> {
        read(&self.directory)?
            .policies
            .iter()
            .find(|policy| policy.key == policy_key)
            .map(|policy| policy.objects.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "policy",
                key: policy_key.to_string(),
            })
    }

    fn parent_form_defaults(
        &self,
        policy_key: &str,
        object_key: &str,
    ) -> Result<Vec<ParentFormDefault>> {
        let directory = read(&self.directory)?;
        Ok(directory
            .policies
            .iter()
            .filter(|policy| policy.key == policy_key)
            .flat_map(|policy| policy.parent_defaults.iter())
            .filter(|default| default.object_key == object_key)
            .map(|default| ParentFormDefault {
                form_name: default.form_name.clone(),
                field_name: default.field_name.clone(),
                field_value: default.field_value.clone(),
            })
            .collect())
    }

    fn child_form_defaults(
        &self,
        policy_key: &str,
        object_key: &str,
        parent_form: &str,
    ) -> Result<Vec<ChildFormDefault>> {
        let directory = read(&self.directory)?;
        let field_type = |form: &str, field: &str| {
            directory
                .forms
                .get(form)
                .and_then(|f| f.fields.iter().find(|candidate| candidate.name == field))
                .map(|f| f.field_type)
                .unwrap_or_default()
        };
        let mut defaults: Vec<ChildFormDefault> = directory
            .policies
            .iter()
            .filter(|policy| policy.key == policy_key)
            .flat_map(|policy| policy.child_defaults.iter())
            .filter(|default| default.object_key == object_key && default.parent_form == parent_form)
            .map(|default| ChildFormDefault {
                form_name: default.form_name.clone(),
                record_number: default.record_number,
                field_name: default.field_name.clone(),
                field_value: default.field_value.clone(),
                field_type: field_type(&default.form_name, &default.field_name),
            })
            .collect();
        defaults.sort_by(|a, b| {
            (a.form_name.as_str(), a.record_number).cmp(&(b.form_name.as_str(), b.record_number))
        });
        Ok(defaults)
    }
}

impl AccountRepository for InMemoryStore {
    fn org_allow_list(&self, identity_key: &str) -> Result<BTreeSet<String>> {
        self.identity(identity_key, |identity| identity.org_objects.clone())
    }

    fn current_accounts(&self, identity_key: &str) -> Result<Vec<ProvisionedAccount>> {
        self.identity(identity_key, |_| ())?;
        Ok(read(&self.directory)?
            .accounts
            .iter()
            .filter(|(owner, _)| owner == identity_key)
            .map(|(_, account)| account.clone())
            .collect())
    }

    fn is_identity_disabled(&self, identity_key: &str) -> Result<bool> {
        self.identity(identity_key, |identity| identity.disabled)
    }

    fn deprovisioned_at(&self, identity_key: &str) -> Result<Option<DateTime<Utc>>> {
        self.identity(identity_key, |identity| identity.deprovisioned_at)
    }

    fn provisioned_form_data(
        &self,
        form_name: &str,
        account_key: &str,
        policy_key: Option<&str>,
    ) -> Result<Option<FormRow>> {
        Ok(read(&self.directory)?
            .rows
            .iter()
            .find(|row| {
                row.form_name == form_name
                    && row.account_key == account_key
                    && policy_key.map_or(true, |key| row.owned_by(key))
            })
            .cloned())
    }

    fn child_rows(&self, form_name: &str, account_key: &str) -> Result<Vec<FormRow>> {
        Ok(read(&self.directory)?
            .rows
            .iter()
            .filter(|row| row.form_name == form_name && row.account_key == account_key)
            .cloned()
            .collect())
    }

    fn find_child_rows(
        &self,
        form_name: &str,
        account_key: &str,
        filter: &EqualityFilter,
    ) -> Result<Vec<FormRow>> {
        Ok(self
            .child_rows(form_name, account_key)?
            .into_iter()
            .filter(|row| filter.matches(&row.fields))
            .collect())
    }
}

impl FormCatalog for InMemoryStore {
    fn form_fields(&self, form_name: &str) -> Result<Vec<FormField>> {
        read(&self.directory)?
            .forms
            .get(form_name)
            .map(|form| form.fields.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "form",
                key: form_name.to_string(),
            })
    }

    fn child_forms(&self, parent_form: &str) -> Result<Vec<String>> {
        Ok(read(&self.directory)?
            .forms
            .get(parent_form)
            .map(|form| form.children.clone())
            .unwrap_or_default())
    }

    fn reconciliation_keys(&self, form_name: &str) -> Result<BTreeSet<String>> {
        Ok(read(&self.directory)?
            .forms
            .get(form_name)
            .map(|form| form.reconciliation_keys.clone())
            .unwrap_or_default())
    }

    fn matching_attributes(&self, form_name: &str) -> Result<Option<BTreeSet<String>>> {
        Ok(read(&self.directory)?
            .forms
            .get(form_name)
            .and_then(|form| form.matching_attributes.clone()))
    }
}

impl ProfileStore for InMemoryStore {
    fn current_profile(&self, identity_key: &str) -> Result<Option<StoredProfile>> {
        Ok(read(&self.profiles)?.current.get(identity_key).cloned())
    }

    fn save_profile(
        &self,
        identity_key: &str,
        allow_list: &[String],
        deny_list: &[String],
        org_deny_list: &[String],
    ) -> Result<()> {
        let mut profiles = write(&self.profiles)?;
        let profile = profiles
            .current
            .entry(identity_key.to_string())
            .or_insert_with(|| StoredProfile {
                identity_key: identity_key.to_string(),
                ..Default::default()
            });
        profile.allow_list = allow_list.to_vec();
        profile.deny_list = deny_list.to_vec();
        profile.org_deny_list = org_deny_list.to_vec();
        Ok(())
    }

    fn save_profile_detail(
        &self,
        identity_key: &str,
        policy_key: &str,
        lists: &PolicyObjectLists,
    ) -> Result<()> {
        let mut profiles = write(&self.profiles)?;
        profiles
            .current
            .entry(identity_key.to_string())
            .or_insert_with(|| StoredProfile {
                identity_key: identity_key.to_string(),
                ..Default::default()
            })
            .details
            .insert(policy_key.to_string(), lists.clone());
        Ok(())
    }

    fn delete_profile_detail(&self, identity_key: &str, policy_key: &str) -> Result<()> {
        if let Some(profile) = write(&self.profiles)?.current.get_mut(identity_key) {
            profile.details.remove(policy_key);
        }
        Ok(())
    }

    fn archive_profile(&self, identity_key: &str) -> Result<Uuid> {
        let mut profiles = write(&self.profiles)?;
        let current = profiles
            .current
            .get(identity_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "profile",
                key: identity_key.to_string(),
            })?;
        let history_key = Uuid::new_v4();
        profiles.history.push(ProfileSnapshot {
            history_key,
            archived_at: Utc::now(),
            profile: StoredProfile {
                details: BTreeMap::new(),
                ..current
            },
        });
        Ok(history_key)
    }

    fn archive_profile_details(
        &self,
        history_key: Uuid,
        details: &BTreeMap<String, PolicyObjectLists>,
    ) -> Result<()> {
        let mut profiles = write(&self.profiles)?;
        let snapshot = profiles
            .history
            .iter_mut()
            .find(|snapshot| snapshot.history_key == history_key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "profile snapshot",
                key: history_key.to_string(),
            })?;
        snapshot.profile.details = details.clone();
        Ok(())
    }

    fn history(&self, identity_key: &str) -> Result<Vec<ProfileSnapshot>> {
        Ok(read(&self.profiles)?
            .history
            .iter()
            .filter(|snapshot| snapshot.profile.identity_key == identity_key)
            .cloned()
            .collect())
    }
}

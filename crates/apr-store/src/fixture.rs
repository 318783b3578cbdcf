// fixture.rs — Declarative description of a directory, loaded from YAML or JSON.
//
// Fixtures seed the in-memory store for the command line and for tests.
// Form rows are written with plain string values; they are typed against
// the form's declared fields when the store is built.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use apr_policy::{PolicyDefinition, PolicyObjectGrant, Priority, StoredProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::records::{FormField, ProvisionedAccount};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub identities: Vec<IdentityEntry>,
    /// Policies in retrieval order.
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
    #[serde(default)]
    pub forms: Vec<FormEntry>,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
    #[serde(default)]
    pub form_rows: Vec<RowEntry>,
    #[serde(default)]
    pub profiles: Vec<StoredProfile>,
}

impl Fixture {
    /// Load a fixture, choosing the format from the file extension
    /// (`.json` is JSON, anything else YAML).
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(serde_yaml::from_str(&data)?)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub key: String,
    /// Keys of the policies applicable to the identity.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Object keys available to the identity's organization.
    #[serde(default)]
    pub org_objects: BTreeSet<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub deprovisioned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub key: String,
    pub name: String,
    pub priority: i64,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub retrofit: bool,
    #[serde(default)]
    pub objects: Vec<PolicyObjectGrant>,
    #[serde(default)]
    pub parent_defaults: Vec<ParentDefaultEntry>,
    #[serde(default)]
    pub child_defaults: Vec<ChildDefaultEntry>,
}

impl PolicyEntry {
    pub fn definition(&self) -> PolicyDefinition {
        PolicyDefinition {
            policy_key: self.key.clone(),
            policy_name: self.name.clone(),
            priority: Priority::from(self.priority),
            approval_required: self.approval_required,
            retrofit: self.retrofit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentDefaultEntry {
    pub object_key: String,
    pub form_name: String,
    pub field_name: String,
    pub field_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDefaultEntry {
    pub object_key: String,
    pub parent_form: String,
    pub form_name: String,
    pub record_number: u32,
    pub field_name: String,
    pub field_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEntry {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
    /// Child forms, for a parent form.
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub reconciliation_keys: BTreeSet<String>,
    #[serde(default)]
    pub matching_attributes: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub identity: String,
    #[serde(flatten)]
    pub account: ProvisionedAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEntry {
    pub form_name: String,
    pub primary_key: String,
    pub account_key: String,
    #[serde(default)]
    pub policy_key: Option<String>,
    #[serde(default)]
    pub revoke_if_inapplicable: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

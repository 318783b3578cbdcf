// records.rs — Rows the repositories hand to the engine.

use std::collections::BTreeMap;

use apr_changeset::{FieldType, FieldValue, ProvisioningMechanism};
use apr_policy::ObjAction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Provisioned,
    Enabled,
    Disabled,
    Provisioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Primary,
    Service,
    Other,
}

/// One account instance the identity currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedAccount {
    pub user_account_key: String,
    /// Key of the account's process/form instance; absent while not yet provisioned.
    #[serde(default)]
    pub account_key: Option<String>,
    pub object_key: String,
    pub object_name: String,
    #[serde(default)]
    pub object_instance_key: String,
    #[serde(default)]
    pub status: AccountStatus,
    /// Policy that currently owns the account.
    #[serde(default)]
    pub policy_key: Option<String>,
    #[serde(default)]
    pub obj_action_inapplicable: ObjAction,
    /// Whether the account was provisioned on behalf of a policy.
    #[serde(default)]
    pub policy_allowed: bool,
    #[serde(default)]
    pub provisioning_mechanism: ProvisioningMechanism,
    #[serde(default)]
    pub account_type: AccountType,
    /// Parent form holding the account's attributes.
    #[serde(default)]
    pub form_name: Option<String>,
}

impl ProvisionedAccount {
    pub fn is_service_account(&self) -> bool {
        self.account_type == AccountType::Service
    }

    /// Owning policy, treating an empty key as none.
    pub fn owning_policy(&self) -> Option<&str> {
        self.policy_key.as_deref().filter(|key| !key.is_empty())
    }
}

/// Default value a policy supplies for a parent form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentFormDefault {
    pub form_name: String,
    pub field_name: String,
    pub field_value: String,
}

/// One cell of a policy's default child records, stored vertically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildFormDefault {
    pub form_name: String,
    pub record_number: u32,
    pub field_name: String,
    pub field_value: String,
    #[serde(default)]
    pub field_type: FieldType,
}

/// A field of the active version of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
}

/// A stored parent or child form row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRow {
    pub form_name: String,
    pub primary_key: String,
    pub account_key: String,
    /// Policy that wrote the row, if any.
    #[serde(default)]
    pub policy_key: Option<String>,
    #[serde(default)]
    pub revoke_if_inapplicable: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl FormRow {
    /// Policy keys compare case-insensitively.
    pub fn owned_by(&self, policy_key: &str) -> bool {
        self.policy_key
            .as_deref()
            .is_some_and(|owner| owner.eq_ignore_ascii_case(policy_key))
    }
}

// account_change.rs — Every pending change for one provisioned account instance.

use std::collections::{BTreeMap, BTreeSet};

use apr_policy::ObjAction;
use serde::{Deserialize, Serialize};

use crate::field::FieldValue;
use crate::record::{ChildAction, ChildTableRecord};

/// How an account came to exist on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningMechanism {
    #[default]
    Policy,
    Request,
    Administrative,
    Reconciliation,
    BulkLoad,
    /// Claimed by a retrofit policy after the fact.
    PolicyHarvested,
}

impl ProvisioningMechanism {
    /// Mechanisms whose accounts a retrofit policy may claim.
    pub fn is_harvest_eligible(self) -> bool {
        matches!(
            self,
            ProvisioningMechanism::Reconciliation | ProvisioningMechanism::BulkLoad
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyKeyChange {
    pub from: Option<String>,
    pub to: String,
}

/// Changes to the account's own bookkeeping attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccountUpdate {
    pub identity_key: String,
    pub object_key: String,
    pub object_instance_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_key: Option<PolicyKeyChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj_action_inapplicable: Option<ObjAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_mechanism: Option<ProvisioningMechanism>,
}

impl UserAccountUpdate {
    pub fn new(identity_key: &str, object_key: &str, object_instance_key: &str) -> Self {
        Self {
            identity_key: identity_key.to_string(),
            object_key: object_key.to_string(),
            object_instance_key: object_instance_key.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.policy_key.is_none()
            && self.obj_action_inapplicable.is_none()
            && self.policy_allowed.is_none()
            && self.provisioning_mechanism.is_none()
    }
}

/// New default values for the account's parent form row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentDataChange {
    pub form_name: String,
    pub primary_key_name: String,
    pub primary_key_value: String,
    /// Policy the row will be stamped with.
    pub owning_policy_key: String,
    pub field_values: BTreeMap<String, FieldValue>,
}

/// Aggregate of the changes compiled for one account instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    pub user_account_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_account: Option<UserAccountUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_data: Option<ParentDataChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_records: Vec<ChildTableRecord>,
    #[serde(default)]
    pub policy_harvestable: bool,
    #[serde(default)]
    pub child_policy_harvestable: bool,
    /// Form -> columns that identify a child row; forms absent here match on every column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matching_attributes: BTreeMap<String, BTreeSet<String>>,
}

impl AccountChange {
    pub fn new(account_key: Option<String>, user_account_key: impl Into<String>) -> Self {
        Self {
            account_key,
            user_account_key: user_account_key.into(),
            user_account: None,
            parent_data: None,
            child_records: Vec::new(),
            policy_harvestable: false,
            child_policy_harvestable: false,
            matching_attributes: BTreeMap::new(),
        }
    }

    pub fn has_user_account(&self) -> bool {
        self.user_account.is_some()
    }

    /// Whether anything in this change is worth emitting.
    pub fn is_modified(&self) -> bool {
        self.user_account.as_ref().is_some_and(|update| !update.is_empty())
            || self.parent_data.is_some()
            || !self.child_records.is_empty()
    }

    /// The account-attribute update, created from `init` on first use.
    pub fn user_account_mut(
        &mut self,
        init: impl FnOnce() -> UserAccountUpdate,
    ) -> &mut UserAccountUpdate {
        self.user_account.get_or_insert_with(init)
    }

    pub fn push_child(&mut self, record: ChildTableRecord) {
        self.child_records.push(record);
    }

    pub fn remove_child(&mut self, index: usize) -> ChildTableRecord {
        self.child_records.remove(index)
    }

    /// Index of a pending ADD in `form_name` with the same natural key as `fields`.
    pub fn pending_add_index(
        &self,
        form_name: &str,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Option<usize> {
        let matching = self.matching_attributes.get(form_name);
        self.child_records.iter().position(|record| {
            record.action == ChildAction::Add
                && record.form_name == form_name
                && record.same_natural_key(fields, matching)
        })
    }

    /// Index of a pending DELETE of the stored row `primary_key` in `form_name`.
    pub fn pending_delete_index(&self, form_name: &str, primary_key: &str) -> Option<usize> {
        self.child_records.iter().position(|record| {
            record.action == ChildAction::Delete
                && record.form_name == form_name
                && record.primary_key_value.as_deref() == Some(primary_key)
        })
    }

    /// Whether any operation is already pending for the stored row `primary_key`.
    pub fn touches_row(&self, form_name: &str, primary_key: &str) -> bool {
        self.child_records.iter().any(|record| {
            record.form_name == form_name && record.primary_key_value.as_deref() == Some(primary_key)
        })
    }

    pub fn count(&self, action: ChildAction) -> usize {
        self.child_records
            .iter()
            .filter(|record| record.action == action)
            .count()
    }
}

// record.rs — One child-table ("entitlement") row operation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::field::FieldValue;

/// Foreign key column linking a child row to its account.
pub const ACCOUNT_FOREIGN_KEY: &str = "ACCOUNT_KEY";

/// Primary key column name of a form, by naming convention.
pub fn form_key_name(form_name: &str) -> String {
    format!("{}_KEY", form_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildAction {
    Add,
    Modify,
    Delete,
}

/// An add, modify or delete of one row in an account's child form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTableRecord {
    pub form_name: String,
    pub primary_key_name: String,
    /// Key of the stored row; absent for additions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub foreign_keys: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_number: Option<u32>,
    pub action: ChildAction,
    pub field_values: BTreeMap<String, FieldValue>,
    pub owning_policy_key: String,
    /// Whether the row goes away once its policy no longer applies.
    #[serde(default)]
    pub revoke_if_inapplicable: bool,
}

impl ChildTableRecord {
    fn new(form_name: &str, action: ChildAction, owning_policy_key: &str) -> Self {
        Self {
            form_name: form_name.to_string(),
            primary_key_name: form_key_name(form_name),
            primary_key_value: None,
            foreign_keys: BTreeMap::new(),
            record_number: None,
            action,
            field_values: BTreeMap::new(),
            owning_policy_key: owning_policy_key.to_string(),
            revoke_if_inapplicable: false,
        }
    }

    pub fn add(form_name: &str, owning_policy_key: &str, fields: BTreeMap<String, FieldValue>) -> Self {
        Self::new(form_name, ChildAction::Add, owning_policy_key).with_fields(fields)
    }

    pub fn modify(
        form_name: &str,
        primary_key: &str,
        owning_policy_key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self::new(form_name, ChildAction::Modify, owning_policy_key)
            .with_primary_key(primary_key)
            .with_fields(fields)
    }

    pub fn delete(
        form_name: &str,
        primary_key: &str,
        owning_policy_key: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self::new(form_name, ChildAction::Delete, owning_policy_key)
            .with_primary_key(primary_key)
            .with_fields(fields)
    }

    pub fn with_primary_key(mut self, value: &str) -> Self {
        self.primary_key_value = Some(value.to_string());
        self
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, FieldValue>) -> Self {
        self.field_values = fields;
        self
    }

    pub fn with_foreign_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.foreign_keys.insert(name.into(), value.into());
        self
    }

    pub fn with_record_number(mut self, record_number: u32) -> Self {
        self.record_number = Some(record_number);
        self
    }

    pub fn with_revoke(mut self, revoke: bool) -> Self {
        self.revoke_if_inapplicable = revoke;
        self
    }

    /// Whether this record describes the same natural key as `fields`.
    ///
    /// Compares the `matching` columns when given and non-empty, otherwise every
    /// field on either side.
    pub fn same_natural_key(
        &self,
        fields: &BTreeMap<String, FieldValue>,
        matching: Option<&BTreeSet<String>>,
    ) -> bool {
        match matching.filter(|columns| !columns.is_empty()) {
            Some(columns) => columns.iter().all(|column| {
                match (self.field_values.get(column), fields.get(column)) {
                    (Some(a), Some(b)) => a.matches(b),
                    (None, None) => true,
                    _ => false,
                }
            }),
            None => {
                self.field_values.len() == fields.len()
                    && self
                        .field_values
                        .iter()
                        .all(|(name, value)| fields.get(name).is_some_and(|other| value.matches(other)))
            }
        }
    }
}

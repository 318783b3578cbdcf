// reconciler.rs — ChildDataReconciler: policy default child records vs. stored child rows.
//
// Defaults are stored vertically, one row per (form, record number, field).
// They are folded into logical records, then each form is reconciled by one
// of two paths:
//
//   keyed    the form has reconciliation key attributes that the policy
//            defaults; stored rows are matched on those keys in memory.
//   filtered no usable keys; each logical record becomes an equality filter
//            over its matching-eligible fields and is looked up in the store.
//
// Every applicable policy is matched first. One stale-row pass over all child
// forms of the account then runs against the rows claimed by any of them:
// unclaimed rows owned by an applicable policy are deleted, and claimed rows
// whose owner no longer defaults them are handed to the claiming policy.

use std::collections::{BTreeMap, BTreeSet};

use apr_changeset::{
    form_key_name, AccountChange, ChangeSetError, ChildTableRecord, FieldType, FieldValue,
    ACCOUNT_FOREIGN_KEY,
};
use apr_store::{ChildFormDefault, EqualityFilter, FormRow};
use tracing::debug;

use crate::context::{Collaborators, PolicyObjects};
use crate::error::{ForIdentity, Result};

/// The account whose child forms are being reconciled.
#[derive(Debug, Clone)]
pub struct AccountTarget {
    pub account_key: String,
    pub object_key: String,
    pub parent_form: String,
    /// Primary key of the account's parent form row.
    pub parent_row_key: String,
}

/// One default child record after folding the vertical rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRecord {
    pub form_name: String,
    pub record_number: u32,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Group vertical default rows by (form, record number).
///
/// Empty date values are left out of the record.
pub fn logical_records(
    defaults: &[ChildFormDefault],
) -> std::result::Result<Vec<LogicalRecord>, ChangeSetError> {
    let mut grouped: BTreeMap<(String, u32), BTreeMap<String, FieldValue>> = BTreeMap::new();
    for default in defaults {
        let fields = grouped
            .entry((default.form_name.clone(), default.record_number))
            .or_default();
        if default.field_type == FieldType::Date && default.field_value.trim().is_empty() {
            continue;
        }
        let value = FieldValue::parse(&default.field_name, &default.field_value, default.field_type)?;
        fields.insert(default.field_name.clone(), value);
    }
    Ok(grouped
        .into_iter()
        .map(|((form_name, record_number), fields)| LogicalRecord {
            form_name,
            record_number,
            fields,
        })
        .collect())
}

/// How stored rows are matched against default records for one form.
enum Matcher {
    Keys(BTreeSet<String>),
    Filter(Option<BTreeSet<String>>),
}

/// A stored row matched by at least one default record in this pass.
struct Claim {
    /// First policy whose defaults matched the row.
    policy_key: String,
    record: LogicalRecord,
    revoke: bool,
    claimed_by: BTreeSet<String>,
}

/// Claims keyed by (form, primary key).
type Claims = BTreeMap<(String, String), Claim>;

pub struct ChildDataReconciler<'a> {
    collaborators: Collaborators<'a>,
    policy_objects: &'a PolicyObjects,
    identity_key: &'a str,
    revoke_if_no_longer_applies: bool,
}

impl<'a> ChildDataReconciler<'a> {
    pub fn new(
        collaborators: Collaborators<'a>,
        policy_objects: &'a PolicyObjects,
        identity_key: &'a str,
        revoke_if_no_longer_applies: bool,
    ) -> Self {
        Self {
            collaborators,
            policy_objects,
            identity_key,
            revoke_if_no_longer_applies,
        }
    }

    /// Add, modify and delete child rows of `target` so they match the
    /// defaults of every policy in `policy_keys`.
    ///
    /// Defaults of all policies are matched before any row is deleted, so the
    /// outcome does not depend on the order of `policy_keys`.
    pub fn reconcile_child_data(
        &self,
        policy_keys: &[&str],
        target: &AccountTarget,
        change: &mut AccountChange,
    ) -> Result<()> {
        let mut claims = Claims::new();
        for policy_key in policy_keys {
            self.reconcile_policy(policy_key, target, &mut claims, change)?;
        }
        self.resolve_stale_rows(policy_keys, target, &claims, change)
    }

    /// Delete rows written by a policy that no longer applies, where revocable.
    pub fn delete_inapplicable_rows(
        &self,
        policy_key: &str,
        account_key: &str,
        parent_form: &str,
        change: &mut AccountChange,
    ) -> Result<()> {
        let id = self.identity_key;
        for form_name in self.collaborators.forms.child_forms(parent_form).for_identity(id)? {
            let rows = self
                .collaborators
                .accounts
                .child_rows(&form_name, account_key)
                .for_identity(id)?;
            for row in rows {
                if !row.owned_by(policy_key) || !self.is_revokable(&row) {
                    continue;
                }
                if change.touches_row(&form_name, &row.primary_key) {
                    continue;
                }
                debug!(
                    form = %form_name,
                    row = %row.primary_key,
                    policy = %policy_key,
                    "deleting row of inapplicable policy"
                );
                change.push_child(delete_record(&row, account_key));
            }
        }
        Ok(())
    }

    fn reconcile_policy(
        &self,
        policy_key: &str,
        target: &AccountTarget,
        claims: &mut Claims,
        change: &mut AccountChange,
    ) -> Result<()> {
        let id = self.identity_key;
        let defaults = self
            .collaborators
            .policies
            .child_form_defaults(policy_key, &target.object_key, &target.parent_form)
            .for_identity(id)?;
        if defaults.is_empty() {
            return Ok(());
        }

        let revoke = self.policy_objects.revoke_flag(policy_key, &target.object_key);
        let records = logical_records(&defaults).for_identity(id)?;

        let mut by_form: BTreeMap<&str, Vec<&LogicalRecord>> = BTreeMap::new();
        for record in &records {
            by_form.entry(record.form_name.as_str()).or_default().push(record);
        }

        for (form_name, form_records) in by_form {
            let matcher = self.matcher_for(form_name, &form_records)?;
            if let Matcher::Keys(columns) | Matcher::Filter(Some(columns)) = &matcher {
                change
                    .matching_attributes
                    .entry(form_name.to_string())
                    .or_default()
                    .extend(columns.iter().cloned());
            }
            self.reconcile_form(policy_key, target, &form_records, &matcher, revoke, claims, change)?;
        }
        Ok(())
    }

    fn matcher_for(&self, form_name: &str, records: &[&LogicalRecord]) -> Result<Matcher> {
        let id = self.identity_key;
        let defaulted: BTreeSet<&String> = records.iter().flat_map(|r| r.fields.keys()).collect();
        let keys: BTreeSet<String> = self
            .collaborators
            .forms
            .reconciliation_keys(form_name)
            .for_identity(id)?
            .into_iter()
            .filter(|key| defaulted.contains(key))
            .collect();
        if !keys.is_empty() {
            return Ok(Matcher::Keys(keys));
        }
        let columns = self
            .collaborators
            .forms
            .matching_attributes(form_name)
            .for_identity(id)?
            .filter(|columns| !columns.is_empty());
        Ok(Matcher::Filter(columns))
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile_form(
        &self,
        policy_key: &str,
        target: &AccountTarget,
        records: &[&LogicalRecord],
        matcher: &Matcher,
        revoke: bool,
        claims: &mut Claims,
        change: &mut AccountChange,
    ) -> Result<()> {
        let id = self.identity_key;
        let Some(form_name) = records.first().map(|record| record.form_name.as_str()) else {
            return Ok(());
        };
        let stored = match matcher {
            Matcher::Keys(_) => self
                .collaborators
                .accounts
                .child_rows(form_name, &target.account_key)
                .for_identity(id)?,
            Matcher::Filter(_) => Vec::new(),
        };

        for record in records {
            let existing = match matcher {
                Matcher::Keys(keys) => stored
                    .iter()
                    .find(|row| keys_match(keys, &record.fields, &row.fields))
                    .cloned(),
                Matcher::Filter(columns) => {
                    let Some(filter) = equality_filter(&record.fields, columns.as_ref()) else {
                        debug!(
                            form = %form_name,
                            record = record.record_number,
                            policy = %policy_key,
                            "default record has no values, skipped"
                        );
                        continue;
                    };
                    self.collaborators
                        .accounts
                        .find_child_rows(form_name, &target.account_key, &filter)
                        .for_identity(id)?
                        .into_iter()
                        .next()
                }
            };

            match existing {
                None => {
                    if self.is_addable(change, form_name, &record.fields, revoke) {
                        debug!(
                            form = %form_name,
                            record = record.record_number,
                            policy = %policy_key,
                            "adding default record"
                        );
                        change.push_child(
                            ChildTableRecord::add(form_name, policy_key, record.fields.clone())
                                .with_record_number(record.record_number)
                                .with_revoke(revoke)
                                .with_foreign_key(ACCOUNT_FOREIGN_KEY, target.account_key.as_str())
                                .with_foreign_key(
                                    form_key_name(&target.parent_form),
                                    target.parent_row_key.as_str(),
                                ),
                        );
                    }
                }
                Some(row) => {
                    claims
                        .entry((form_name.to_string(), row.primary_key.clone()))
                        .or_insert_with(|| Claim {
                            policy_key: policy_key.to_string(),
                            record: (*record).clone(),
                            revoke,
                            claimed_by: BTreeSet::new(),
                        })
                        .claimed_by
                        .insert(policy_key.to_string());
                    self.reconcile_existing(policy_key, target, record, &row, revoke, change);
                }
            }
        }
        Ok(())
    }

    fn reconcile_existing(
        &self,
        policy_key: &str,
        target: &AccountTarget,
        record: &LogicalRecord,
        row: &FormRow,
        revoke: bool,
        change: &mut AccountChange,
    ) {
        // A row queued for deletion by an inapplicable policy is still a
        // default here: keep it and take it over.
        if let Some(index) = change.pending_delete_index(&record.form_name, &row.primary_key) {
            change.remove_child(index);
            debug!(
                form = %record.form_name,
                row = %row.primary_key,
                policy = %policy_key,
                "row kept and taken over"
            );
            change.push_child(modify_record(record, row, policy_key, revoke, &target.account_key));
            return;
        }
        if change.touches_row(&record.form_name, &row.primary_key) {
            return;
        }

        if self.is_updatable(change, policy_key, record, row, revoke) {
            change.push_child(modify_record(record, row, policy_key, revoke, &target.account_key));
        }
    }

    /// Delete rows of applicable policies that no default claimed, and hand
    /// claimed rows over when their owner no longer defaults them.
    fn resolve_stale_rows(
        &self,
        policy_keys: &[&str],
        target: &AccountTarget,
        claims: &Claims,
        change: &mut AccountChange,
    ) -> Result<()> {
        let id = self.identity_key;
        let forms = self
            .collaborators
            .forms
            .child_forms(&target.parent_form)
            .for_identity(id)?;
        for form_name in forms {
            let rows = self
                .collaborators
                .accounts
                .child_rows(&form_name, &target.account_key)
                .for_identity(id)?;
            for row in rows {
                if !policy_keys.iter().any(|key| row.owned_by(key)) {
                    continue;
                }
                if change.touches_row(&form_name, &row.primary_key) {
                    continue;
                }
                match claims.get(&(form_name.clone(), row.primary_key.clone())) {
                    None => {
                        debug!(
                            form = %form_name,
                            row = %row.primary_key,
                            "deleting row no longer defaulted by its policy"
                        );
                        change.push_child(delete_record(&row, &target.account_key));
                    }
                    Some(claim) if claim.claimed_by.iter().any(|key| row.owned_by(key)) => {}
                    Some(claim) => {
                        debug!(
                            form = %form_name,
                            row = %row.primary_key,
                            policy = %claim.policy_key,
                            "row handed over to a policy that still defaults it"
                        );
                        change.push_child(modify_record(
                            &claim.record,
                            &row,
                            &claim.policy_key,
                            claim.revoke,
                            &target.account_key,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether a default record with no stored counterpart may be added.
    fn is_addable(
        &self,
        change: &mut AccountChange,
        form_name: &str,
        fields: &BTreeMap<String, FieldValue>,
        revoke: bool,
    ) -> bool {
        let Some(index) = change.pending_add_index(form_name, fields) else {
            return true;
        };
        let pending_revoke = change.child_records[index].revoke_if_inapplicable;
        if self.revoke_if_no_longer_applies && pending_revoke && pending_revoke != revoke {
            change.remove_child(index);
            return true;
        }
        false
    }

    /// Whether a stored row matching a default record should be rewritten.
    fn is_updatable(
        &self,
        change: &mut AccountChange,
        policy_key: &str,
        record: &LogicalRecord,
        row: &FormRow,
        revoke: bool,
    ) -> bool {
        if !self.revoke_if_no_longer_applies {
            return false;
        }
        let mut updatable = if row.owned_by(policy_key) {
            row.revoke_if_inapplicable && row.revoke_if_inapplicable != revoke
        } else {
            true
        };
        if let Some(index) = change.pending_add_index(&record.form_name, &record.fields) {
            let pending_revoke = change.child_records[index].revoke_if_inapplicable;
            if pending_revoke && pending_revoke != revoke {
                change.remove_child(index);
                updatable = true;
            } else {
                updatable = false;
            }
        }
        updatable
    }

    fn is_revokable(&self, row: &FormRow) -> bool {
        !self.revoke_if_no_longer_applies || row.revoke_if_inapplicable
    }
}

fn keys_match(
    keys: &BTreeSet<String>,
    defaults: &BTreeMap<String, FieldValue>,
    stored: &BTreeMap<String, FieldValue>,
) -> bool {
    keys.iter().all(|key| match (defaults.get(key), stored.get(key)) {
        (Some(a), Some(b)) => a.matches(b),
        _ => false,
    })
}

/// Equality filter over the record's matching columns.
///
/// Falls back to every field of the record when none of them is a matching
/// column. `None` when the record has no values at all.
fn equality_filter(
    fields: &BTreeMap<String, FieldValue>,
    columns: Option<&BTreeSet<String>>,
) -> Option<EqualityFilter> {
    let build = |columns: Option<&BTreeSet<String>>| {
        let mut filter = EqualityFilter::new();
        for (name, value) in fields {
            if columns.map_or(true, |columns| columns.contains(name)) {
                filter.push(name.clone(), value.clone());
            }
        }
        filter
    };
    let filter = build(columns);
    if !filter.clauses().is_empty() {
        return Some(filter);
    }
    let filter = build(None);
    (!filter.clauses().is_empty()).then_some(filter)
}

fn modify_record(
    record: &LogicalRecord,
    row: &FormRow,
    policy_key: &str,
    revoke: bool,
    account_key: &str,
) -> ChildTableRecord {
    ChildTableRecord::modify(&record.form_name, &row.primary_key, policy_key, record.fields.clone())
        .with_record_number(record.record_number)
        .with_revoke(revoke)
        .with_foreign_key(ACCOUNT_FOREIGN_KEY, account_key)
}

fn delete_record(row: &FormRow, account_key: &str) -> ChildTableRecord {
    ChildTableRecord::delete(
        &row.form_name,
        &row.primary_key,
        row.policy_key.as_deref().unwrap_or_default(),
        row.fields.clone(),
    )
    .with_revoke(row.revoke_if_inapplicable)
    .with_foreign_key(ACCOUNT_FOREIGN_KEY, account_key)
}

// evaluation.rs — End-to-end evaluations over the in-memory store.
//
// Every test seeds a directory, runs the full pipeline for one identity and
// inspects the returned change-set:
//
//   1. window check
//   2. profile build (classification, priority, action merge, deny pass)
//   3. diff against the stored profile, persist the new one
//   4. account changes: new, enable, inapplicable deletes, modify,
//      revoke/disable, consolidation
//
// The shared directory has one parent form (UD_ACCT) with two child forms:
// UD_GROUPS is reconciled on its GROUP key, UD_ROLES has no keys and is
// matched through an equality filter on ROLE and the GRANTED date.

use std::collections::{BTreeMap, BTreeSet};

use apr_changeset::{AccountProfileChanges, ChildAction, FieldType, FieldValue, ProvisioningMechanism};
use apr_engine::{
    AccountChangeCompiler, Collaborators, EngineConfig, EvaluationError, EvaluationOutcome,
    PolicyEvaluator, PolicyObjects, SkipReason, WindowCheck,
};
use apr_policy::{
    InapplicablePolicy, ObjAction, PolicyObjectDetails, PolicyObjectGrant, PolicyObjectLists,
    PolicyProfile, Priority, ProvisioningOption,
};
use apr_store::{
    AccountStatus, AccountType, ChildDefaultEntry, FormEntry, FormField, IdentityEntry,
    InMemoryStore, ParentDefaultEntry, PolicyEntry, ProfileStore, ProvisionedAccount, RowEntry,
};
use chrono::Utc;

// =========================================================
// Directory helpers
// =========================================================

fn grant(object_key: &str, object_name: &str) -> PolicyObjectGrant {
    PolicyObjectGrant {
        object_key: object_key.to_string(),
        object_name: object_name.to_string(),
        denied_by_policy: false,
        obj_action_inapplicable: ObjAction::None,
        allowed_for_all_orgs: false,
        allow_multiple_instances: false,
    }
}

fn deny(object_key: &str, object_name: &str) -> PolicyObjectGrant {
    PolicyObjectGrant {
        denied_by_policy: true,
        ..grant(object_key, object_name)
    }
}

fn with_action(grant: PolicyObjectGrant, action: ObjAction) -> PolicyObjectGrant {
    PolicyObjectGrant {
        obj_action_inapplicable: action,
        ..grant
    }
}

fn policy(key: &str, priority: i64, objects: Vec<PolicyObjectGrant>) -> PolicyEntry {
    PolicyEntry {
        key: key.to_string(),
        name: format!("Policy {}", key),
        priority,
        approval_required: false,
        retrofit: false,
        objects,
        parent_defaults: Vec::new(),
        child_defaults: Vec::new(),
    }
}

fn child_default(form: &str, record: u32, field: &str, value: &str) -> ChildDefaultEntry {
    ChildDefaultEntry {
        object_key: "OBJ1".to_string(),
        parent_form: "UD_ACCT".to_string(),
        form_name: form.to_string(),
        record_number: record,
        field_name: field.to_string(),
        field_value: value.to_string(),
    }
}

fn identity(key: &str, policies: &[&str]) -> IdentityEntry {
    IdentityEntry {
        key: key.to_string(),
        policies: policies.iter().map(|p| p.to_string()).collect(),
        org_objects: ["OBJ1".to_string(), "OBJ2".to_string()].into(),
        disabled: false,
        deprovisioned_at: None,
    }
}

fn account(uak: &str, object_key: &str, owner: Option<&str>) -> ProvisionedAccount {
    ProvisionedAccount {
        user_account_key: uak.to_string(),
        account_key: Some(format!("ACC-{}", uak)),
        object_key: object_key.to_string(),
        object_name: "Directory".to_string(),
        object_instance_key: format!("OI-{}", uak),
        status: AccountStatus::Provisioned,
        policy_key: owner.map(str::to_string),
        obj_action_inapplicable: ObjAction::None,
        policy_allowed: owner.is_some(),
        provisioning_mechanism: ProvisioningMechanism::Policy,
        account_type: AccountType::Primary,
        form_name: None,
    }
}

fn with_form(account: ProvisionedAccount) -> ProvisionedAccount {
    ProvisionedAccount {
        form_name: Some("UD_ACCT".to_string()),
        ..account
    }
}

fn field(name: &str, field_type: FieldType) -> FormField {
    FormField {
        name: name.to_string(),
        field_type,
    }
}

fn row(form: &str, pk: &str, owner: Option<&str>, revoke: bool, fields: &[(&str, &str)]) -> RowEntry {
    RowEntry {
        form_name: form.to_string(),
        primary_key: pk.to_string(),
        account_key: "ACC-UA1".to_string(),
        policy_key: owner.map(str::to_string),
        revoke_if_inapplicable: revoke,
        fields: fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    }
}

/// A store with the UD_ACCT form family and the UA1 parent row.
fn store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .insert_form(FormEntry {
            name: "UD_ACCT".to_string(),
            fields: vec![field("REGION", FieldType::Text), field("HIRED", FieldType::Date)],
            children: vec!["UD_GROUPS".to_string(), "UD_ROLES".to_string()],
            ..Default::default()
        })
        .unwrap();
    store
        .insert_form(FormEntry {
            name: "UD_GROUPS".to_string(),
            fields: vec![field("GROUP", FieldType::Text), field("SINCE", FieldType::Date)],
            reconciliation_keys: ["GROUP".to_string()].into(),
            ..Default::default()
        })
        .unwrap();
    store
        .insert_form(FormEntry {
            name: "UD_ROLES".to_string(),
            fields: vec![
                field("ROLE", FieldType::Text),
                field("NOTE", FieldType::Text),
                field("GRANTED", FieldType::Date),
            ],
            matching_attributes: Some(["ROLE".to_string(), "GRANTED".to_string()].into()),
            ..Default::default()
        })
        .unwrap();
    store
        .insert_row_entry(row("UD_ACCT", "PARENT1", None, false, &[("REGION", "emea")]))
        .unwrap();
    store
}

fn stored_profile(store: &InMemoryStore, identity: &str, policy_key: &str, allowed: &[&str]) {
    let lists = PolicyObjectLists {
        allowed: allowed.iter().map(|n| n.to_string()).collect(),
        denied: Vec::new(),
    };
    store.save_profile(identity, &[], &[], &[]).unwrap();
    store.save_profile_detail(identity, policy_key, &lists).unwrap();
}

fn evaluate_with(store: &InMemoryStore, config: &EngineConfig, identity: &str) -> AccountProfileChanges {
    let evaluator = PolicyEvaluator::new(Collaborators::from_store(store), config);
    match evaluator.determine_account_profile_changes(identity).unwrap() {
        EvaluationOutcome::Evaluated(changes) => changes,
        other => panic!("expected Evaluated, got {:?}", other),
    }
}

fn evaluate(store: &InMemoryStore, identity: &str) -> AccountProfileChanges {
    evaluate_with(store, &EngineConfig::default(), identity)
}

fn flag_on() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.entitlements.revoke_if_no_longer_applies = true;
    config
}

// =========================================================
// Profile building and new accounts
// =========================================================

#[test]
fn no_policies_and_no_accounts_changes_nothing() {
    let store = store();
    store
        .insert_identity(IdentityEntry {
            org_objects: BTreeSet::new(),
            ..identity("U1", &[])
        })
        .unwrap();

    let changes = evaluate(&store, "U1");
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
}

#[test]
fn single_grant_is_provisioned_directly() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();

    let changes = evaluate(&store, "U1");
    assert_eq!(changes.accounts_to_provision.len(), 1);
    assert_eq!(changes.accounts_to_provision["OBJ1"].policy_key, "P1");
    assert!(changes.accounts_to_request.is_empty());
}

#[test]
fn object_outside_org_is_not_provisioned() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ9", "Mainframe")])).unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();

    let changes = evaluate(&store, "U1");
    assert!(changes.is_empty());
    let profile = store.current_profile("U1").unwrap().unwrap();
    assert_eq!(profile.org_deny_list, vec!["Mainframe".to_string()]);
}

#[test]
fn object_granted_for_all_orgs_is_not_also_org_denied() {
    let store = store();
    let everywhere = PolicyObjectGrant {
        allowed_for_all_orgs: true,
        ..grant("OBJ9", "Mainframe")
    };
    store.insert_policy(policy("P1", 10, vec![everywhere])).unwrap();
    store.insert_policy(policy("P2", 20, vec![grant("OBJ9", "Mainframe")])).unwrap();
    store.insert_identity(identity("U1", &["P1", "P2"])).unwrap();
    store.insert_identity(identity("U2", &["P2", "P1"])).unwrap();

    for identity in ["U1", "U2"] {
        let changes = evaluate(&store, identity);
        assert!(changes.accounts_to_provision.contains_key("OBJ9"));
        let profile = store.current_profile(identity).unwrap().unwrap();
        assert_eq!(profile.allow_list, vec!["Mainframe [Policy P1]".to_string()]);
        assert!(profile.org_deny_list.is_empty(), "{}: {:?}", identity, profile.org_deny_list);
    }
}

#[test]
fn denial_wins_over_grant_in_either_order() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_policy(policy("P2", 20, vec![deny("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P1", "P2"])).unwrap();
    store.insert_identity(identity("U2", &["P2", "P1"])).unwrap();

    for identity in ["U1", "U2"] {
        let changes = evaluate(&store, identity);
        assert!(changes.accounts_to_provision.is_empty(), "{} was granted a denied object", identity);
    }
}

#[test]
fn lower_priority_value_takes_over_account() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_policy(policy("P2", 5, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P1", "P2"])).unwrap();
    store.insert_account("U1", account("UA1", "OBJ1", Some("P1"))).unwrap();

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    let key_change = change
        .user_account
        .as_ref()
        .and_then(|update| update.policy_key.as_ref())
        .unwrap();
    assert_eq!(key_change.from.as_deref(), Some("P1"));
    assert_eq!(key_change.to, "P2");
}

#[test]
fn unconditioned_policy_never_takes_over() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_policy(policy("P2", -1, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P2", "P1"])).unwrap();
    store.insert_account("U1", account("UA1", "OBJ1", Some("P1"))).unwrap();

    let changes = evaluate(&store, "U1");
    assert!(changes.is_empty(), "P1 should keep the account: {:?}", changes);

    let profile = store.current_profile("U1").unwrap().unwrap();
    assert_eq!(profile.allow_list, vec!["Directory [Policy P1:Policy P2]".to_string()]);
}

#[test]
fn merged_action_escalates_stored_value() {
    let store = store();
    store
        .insert_policy(policy(
            "P1",
            10,
            vec![with_action(grant("OBJ1", "Directory"), ObjAction::Revoke)],
        ))
        .unwrap();
    store.insert_policy(policy("P2", 5, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P1", "P2"])).unwrap();
    store.insert_account("U1", account("UA1", "OBJ1", Some("P2"))).unwrap();

    let changes = evaluate(&store, "U1");
    let update = changes.accounts_to_modify["UA1"].user_account.as_ref().unwrap();
    assert_eq!(update.obj_action_inapplicable, Some(ObjAction::Revoke));
    assert!(update.policy_key.is_none());
}

// =========================================================
// Enable / revoke / disable
// =========================================================

#[test]
fn disabled_account_is_enabled_unless_identity_is_disabled() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store
        .insert_identity(IdentityEntry {
            disabled: true,
            ..identity("U2", &["P1"])
        })
        .unwrap();
    for (identity, uak) in [("U1", "UA1"), ("U2", "UA2")] {
        store
            .insert_account(
                identity,
                ProvisionedAccount {
                    status: AccountStatus::Disabled,
                    ..account(uak, "OBJ1", Some("P1"))
                },
            )
            .unwrap();
    }

    assert!(evaluate(&store, "U1").accounts_to_enable.contains_key("UA1"));
    assert!(evaluate(&store, "U2").accounts_to_enable.is_empty());
}

#[test]
fn no_longer_applicable_accounts_follow_stored_action() {
    let store = store();
    store.insert_identity(identity("U1", &[])).unwrap();
    let revoked = ProvisionedAccount {
        obj_action_inapplicable: ObjAction::Revoke,
        ..account("UA1", "OBJ1", Some("P1"))
    };
    let disabled = ProvisionedAccount {
        obj_action_inapplicable: ObjAction::Disable,
        ..account("UA2", "OBJ2", Some("P1"))
    };
    let service = ProvisionedAccount {
        account_type: AccountType::Service,
        ..revoked.clone()
    };
    let service = ProvisionedAccount {
        user_account_key: "UA3".to_string(),
        ..service
    };
    let unmanaged = ProvisionedAccount {
        policy_allowed: false,
        ..account("UA4", "OBJ1", None)
    };
    for account in [revoked, disabled, service, unmanaged] {
        store.insert_account("U1", account).unwrap();
    }

    let changes = evaluate(&store, "U1");
    assert_eq!(changes.accounts_to_revoke.keys().collect::<Vec<_>>(), vec!["UA1"]);
    assert_eq!(changes.accounts_to_disable.keys().collect::<Vec<_>>(), vec!["UA2"]);
}

// =========================================================
// Inapplicable policies and consolidation
// =========================================================

#[test]
fn revocable_rows_of_inapplicable_policy_are_deleted() {
    let store = store();
    store.insert_identity(identity("U1", &[])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), true, &[("GROUP", "admins")]))
        .unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G2", Some("P7"), true, &[("GROUP", "ops")]))
        .unwrap();
    stored_profile(&store, "U1", "P1", &["Directory"]);

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert_eq!(change.child_records.len(), 1);
    let record = &change.child_records[0];
    assert_eq!(record.action, ChildAction::Delete);
    assert_eq!(record.primary_key_value.as_deref(), Some("G1"));
    assert_eq!(record.owning_policy_key, "P1");
}

#[test]
fn entitlement_flag_keeps_non_revocable_rows() {
    let store = store();
    store.insert_identity(identity("U1", &[])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), false, &[("GROUP", "admins")]))
        .unwrap();
    stored_profile(&store, "U1", "P1", &["Directory"]);

    assert!(evaluate_with(&store, &flag_on(), "U1").is_empty());

    // With the flag off every row of the policy goes. The first run dropped
    // P1 from the stored profile, so record it again.
    stored_profile(&store, "U1", "P1", &["Directory"]);
    assert_eq!(evaluate(&store, "U1").counts().modify, 1);
}

#[test]
fn revoke_absorbs_pending_child_deletes() {
    let store = store();
    store.insert_policy(policy("P2", 10, vec![deny("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P2"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), true, &[("GROUP", "admins")]))
        .unwrap();
    stored_profile(&store, "U1", "P1", &["Directory"]);

    let changes = evaluate(&store, "U1");
    assert!(changes.accounts_to_modify.is_empty());
    let moved = changes.accounts_to_revoke["UA1"].as_ref().unwrap();
    assert_eq!(moved.count(ChildAction::Delete), 1);
}

// =========================================================
// Child data reconciliation
// =========================================================

fn groups_policy(defaults: Vec<ChildDefaultEntry>) -> PolicyEntry {
    PolicyEntry {
        child_defaults: defaults,
        ..policy("P1", 10, vec![grant("OBJ1", "Directory")])
    }
}

#[test]
fn matching_state_is_idempotent() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![
            child_default("UD_GROUPS", 1, "GROUP", "admins"),
            child_default("UD_GROUPS", 1, "SINCE", "1995-01-01"),
        ]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row(
            "UD_GROUPS",
            "G1",
            Some("P1"),
            false,
            &[("GROUP", "admins"), ("SINCE", "1995-01-01 00:00:00")],
        ))
        .unwrap();

    assert!(evaluate(&store, "U1").is_empty());
    assert!(evaluate(&store, "U1").is_empty(), "second run must not drift");
    assert_eq!(store.history("U1").unwrap().len(), 1);
}

#[test]
fn keyed_form_adds_missing_and_deletes_stale_rows() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![
            child_default("UD_GROUPS", 1, "GROUP", "admins"),
            child_default("UD_GROUPS", 2, "GROUP", "ops"),
        ]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), false, &[("GROUP", "admins")]))
        .unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G9", Some("P1"), false, &[("GROUP", "legacy")]))
        .unwrap();

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert_eq!(change.child_records.len(), 2);

    let add = &change.child_records[0];
    assert_eq!(add.action, ChildAction::Add);
    assert_eq!(add.record_number, Some(2));
    assert_eq!(add.field_values["GROUP"], FieldValue::text("ops"));
    assert_eq!(add.foreign_keys["ACCOUNT_KEY"], "ACC-UA1");
    assert_eq!(add.foreign_keys["UD_ACCT_KEY"], "PARENT1");

    let delete = &change.child_records[1];
    assert_eq!(delete.action, ChildAction::Delete);
    assert_eq!(delete.primary_key_value.as_deref(), Some("G9"));

    assert_eq!(
        change.matching_attributes["UD_GROUPS"],
        BTreeSet::from(["GROUP".to_string()])
    );
}

#[test]
fn unkeyed_form_matches_through_filter() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![
            child_default("UD_ROLES", 1, "ROLE", "reader"),
            child_default("UD_ROLES", 1, "NOTE", "granted by policy"),
        ]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    // Same ROLE, different NOTE: still a match because only ROLE is significant.
    store
        .insert_row_entry(row(
            "UD_ROLES",
            "R1",
            Some("P1"),
            false,
            &[("ROLE", "reader"), ("NOTE", "manual")],
        ))
        .unwrap();
    store
        .insert_row_entry(row("UD_ROLES", "R2", Some("P1"), false, &[("ROLE", "writer")]))
        .unwrap();

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert_eq!(change.child_records.len(), 1);
    assert_eq!(change.child_records[0].action, ChildAction::Delete);
    assert_eq!(change.child_records[0].primary_key_value.as_deref(), Some("R2"));
}

#[test]
fn row_of_other_policy_is_updated_only_with_flag_on() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![child_default("UD_GROUPS", 1, "GROUP", "admins")]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P7"), false, &[("GROUP", "admins")]))
        .unwrap();

    assert!(evaluate(&store, "U1").is_empty());

    let changes = evaluate_with(&store, &flag_on(), "U1");
    let record = &changes.accounts_to_modify["UA1"].child_records[0];
    assert_eq!(record.action, ChildAction::Modify);
    assert_eq!(record.owning_policy_key, "P1");
    assert_eq!(record.primary_key_value.as_deref(), Some("G1"));
}

#[test]
fn pending_delete_becomes_modify_for_new_owner() {
    let store = store();
    store
        .insert_policy(PolicyEntry {
            key: "P2".to_string(),
            ..groups_policy(vec![child_default("UD_GROUPS", 1, "GROUP", "admins")])
        })
        .unwrap();
    store.insert_identity(identity("U1", &["P2"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), true, &[("GROUP", "admins")]))
        .unwrap();
    stored_profile(&store, "U1", "P1", &["Directory"]);

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert_eq!(change.child_records.len(), 1, "{:?}", change.child_records);
    let record = &change.child_records[0];
    assert_eq!(record.action, ChildAction::Modify);
    assert_eq!(record.owning_policy_key, "P2");
    assert_eq!(record.primary_key_value.as_deref(), Some("G1"));
}

#[test]
fn policy_without_child_defaults_deletes_its_rows() {
    let store = store();
    store.insert_policy(groups_policy(Vec::new())).unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), false, &[("GROUP", "admins")]))
        .unwrap();
    store
        .insert_row_entry(row("UD_ROLES", "R1", None, false, &[("ROLE", "reader")]))
        .unwrap();

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert_eq!(change.child_records.len(), 1, "{:?}", change.child_records);
    assert_eq!(change.child_records[0].action, ChildAction::Delete);
    assert_eq!(change.child_records[0].primary_key_value.as_deref(), Some("G1"));
}

#[test]
fn form_dropped_from_defaults_loses_its_rows() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![child_default("UD_ROLES", 1, "ROLE", "reader")]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("P1"), false, &[("GROUP", "admins")]))
        .unwrap();

    let changes = evaluate(&store, "U1");
    let records: Vec<(&str, ChildAction)> = changes.accounts_to_modify["UA1"]
        .child_records
        .iter()
        .map(|record| (record.form_name.as_str(), record.action))
        .collect();
    assert_eq!(
        records,
        vec![("UD_ROLES", ChildAction::Add), ("UD_GROUPS", ChildAction::Delete)]
    );
}

fn child_policy(key: &str, priority: i64, defaults: Vec<ChildDefaultEntry>) -> PolicyEntry {
    PolicyEntry {
        child_defaults: defaults,
        ..policy(key, priority, vec![grant("OBJ1", "Directory")])
    }
}

#[test]
fn row_still_defaulted_by_another_policy_is_handed_over() {
    // The claiming policy sorts both before and after the row's owner.
    for (claimer, owner) in [("PA", "PB"), ("PZ", "PB")] {
        let store = store();
        store
            .insert_policy(child_policy(
                claimer,
                5,
                vec![child_default("UD_GROUPS", 1, "GROUP", "admins")],
            ))
            .unwrap();
        store
            .insert_policy(child_policy(
                owner,
                10,
                vec![child_default("UD_GROUPS", 1, "GROUP", "ops")],
            ))
            .unwrap();
        store.insert_identity(identity("U1", &[claimer, owner])).unwrap();
        store
            .insert_account("U1", with_form(account("UA1", "OBJ1", Some(claimer))))
            .unwrap();
        store
            .insert_row_entry(row("UD_GROUPS", "G1", Some(owner), false, &[("GROUP", "admins")]))
            .unwrap();

        let changes = evaluate(&store, "U1");
        let change = &changes.accounts_to_modify["UA1"];
        assert_eq!(change.count(ChildAction::Delete), 0, "{}: {:?}", claimer, change.child_records);
        assert_eq!(change.child_records.len(), 2, "{}: {:?}", claimer, change.child_records);

        let modify = change
            .child_records
            .iter()
            .find(|record| record.action == ChildAction::Modify)
            .unwrap();
        assert_eq!(modify.primary_key_value.as_deref(), Some("G1"));
        assert_eq!(modify.owning_policy_key, claimer);

        let add = change
            .child_records
            .iter()
            .find(|record| record.action == ChildAction::Add)
            .unwrap();
        assert_eq!(add.owning_policy_key, owner);
        assert_eq!(add.field_values["GROUP"], FieldValue::text("ops"));
    }
}

#[test]
fn filtered_form_compares_default_dates_by_value() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![
            child_default("UD_ROLES", 1, "ROLE", "reader"),
            child_default("UD_ROLES", 1, "GRANTED", "1995-01-01"),
            child_default("UD_ROLES", 2, "ROLE", "writer"),
            child_default("UD_ROLES", 2, "GRANTED", "2001-06-30"),
        ]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();
    store
        .insert_row_entry(row(
            "UD_ROLES",
            "R1",
            Some("P1"),
            false,
            &[("ROLE", "reader"), ("GRANTED", "1995-01-01 00:00:00")],
        ))
        .unwrap();
    store
        .insert_row_entry(row(
            "UD_ROLES",
            "R2",
            Some("P1"),
            false,
            &[("ROLE", "writer"), ("GRANTED", "2001-07-01")],
        ))
        .unwrap();

    let changes = evaluate(&store, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert_eq!(change.child_records.len(), 2, "{:?}", change.child_records);

    let add = &change.child_records[0];
    assert_eq!(add.action, ChildAction::Add);
    assert_eq!(add.record_number, Some(2));
    match &add.field_values["GRANTED"] {
        FieldValue::Date(granted) => assert_eq!(granted.to_string(), "2001-06-30 00:00:00"),
        other => panic!("expected a date, got {:?}", other),
    }

    let delete = &change.child_records[1];
    assert_eq!(delete.action, ChildAction::Delete);
    assert_eq!(delete.primary_key_value.as_deref(), Some("R2"));
    assert_eq!(
        change.matching_attributes["UD_ROLES"],
        BTreeSet::from(["GRANTED".to_string(), "ROLE".to_string()])
    );
}

#[test]
fn policy_keys_compare_case_insensitively() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![child_default("UD_GROUPS", 1, "GROUP", "admins")]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("p1")))).unwrap();
    store
        .insert_row_entry(row("UD_GROUPS", "G1", Some("p1"), false, &[("GROUP", "admins")]))
        .unwrap();

    let changes = evaluate(&store, "U1");
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
}

#[test]
fn service_accounts_skip_child_reconciliation() {
    let store = store();
    store
        .insert_policy(groups_policy(vec![child_default("UD_GROUPS", 1, "GROUP", "admins")]))
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store
        .insert_account(
            "U1",
            ProvisionedAccount {
                account_type: AccountType::Service,
                ..with_form(account("UA1", "OBJ1", Some("P1")))
            },
        )
        .unwrap();

    assert!(evaluate(&store, "U1").is_empty());
}

// =========================================================
// Parent data and harvesting
// =========================================================

#[test]
fn drifted_parent_defaults_are_reapplied() {
    let store = store();
    store
        .insert_policy(PolicyEntry {
            parent_defaults: vec![ParentDefaultEntry {
                object_key: "OBJ1".to_string(),
                form_name: "UD_ACCT".to_string(),
                field_name: "REGION".to_string(),
                field_value: "apac".to_string(),
            }],
            ..policy("P1", 10, vec![grant("OBJ1", "Directory")])
        })
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store.insert_account("U1", with_form(account("UA1", "OBJ1", Some("P1")))).unwrap();

    let changes = evaluate(&store, "U1");
    let parent = changes.accounts_to_modify["UA1"].parent_data.as_ref().unwrap();
    assert_eq!(parent.form_name, "UD_ACCT");
    assert_eq!(parent.primary_key_name, "UD_ACCT_KEY");
    assert_eq!(parent.primary_key_value, "PARENT1");
    assert_eq!(parent.owning_policy_key, "P1");
    assert_eq!(parent.field_values["REGION"], FieldValue::text("apac"));
}

fn harvest_fixture(store: &InMemoryStore) {
    store
        .insert_policy(PolicyEntry {
            retrofit: true,
            ..policy("P1", 10, vec![grant("OBJ1", "Directory")])
        })
        .unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();
    store
        .insert_account(
            "U1",
            ProvisionedAccount {
                provisioning_mechanism: ProvisioningMechanism::Reconciliation,
                ..account("UA1", "OBJ1", None)
            },
        )
        .unwrap();
}

#[test]
fn retrofit_policy_harvests_reconciled_account() {
    let store = store();
    harvest_fixture(&store);
    let mut config = EngineConfig::default();
    config.harvesting.enabled = true;

    let changes = evaluate_with(&store, &config, "U1");
    let change = &changes.accounts_to_modify["UA1"];
    assert!(change.policy_harvestable);
    assert!(change.child_policy_harvestable);
    let update = change.user_account.as_ref().unwrap();
    assert_eq!(update.policy_key.as_ref().map(|k| k.to.as_str()), Some("P1"));
    assert_eq!(update.policy_allowed, Some(true));
    assert_eq!(update.provisioning_mechanism, Some(ProvisioningMechanism::PolicyHarvested));
}

#[test]
fn harvesting_disabled_leaves_account_alone() {
    let store = store();
    harvest_fixture(&store);
    assert!(evaluate(&store, "U1").is_empty());
}

// =========================================================
// Window check and errors
// =========================================================

#[test]
fn deprovisioned_identity_is_skipped() {
    let store = store();
    store
        .insert_identity(IdentityEntry {
            deprovisioned_at: Some(Utc::now()),
            ..identity("U1", &[])
        })
        .unwrap();
    let config = EngineConfig::default();
    let evaluator = PolicyEvaluator::new(Collaborators::from_store(&store), &config);

    match evaluator.determine_account_profile_changes("U1").unwrap() {
        EvaluationOutcome::Skipped(SkipReason::Deprovisioned) => {}
        other => panic!("expected Skipped(Deprovisioned), got {:?}", other),
    }
}

#[test]
fn unreadable_window_is_skipped_or_fatal_by_config() {
    let store = store();
    let mut config = EngineConfig::default();
    let evaluator = PolicyEvaluator::new(Collaborators::from_store(&store), &config);
    match evaluator.determine_account_profile_changes("ghost").unwrap() {
        EvaluationOutcome::Skipped(SkipReason::WindowCheckFailed) => {}
        other => panic!("expected Skipped(WindowCheckFailed), got {:?}", other),
    }

    config.provisioning.window_check = WindowCheck::Strict;
    let evaluator = PolicyEvaluator::new(Collaborators::from_store(&store), &config);
    match evaluator.determine_account_profile_changes("ghost") {
        Err(EvaluationError::PolicyEvaluation { identity_key, .. }) => {
            assert_eq!(identity_key, "ghost");
        }
        other => panic!("expected PolicyEvaluation error, got {:?}", other),
    }
}

fn hand_built_profile(options: &[ProvisioningOption]) -> PolicyProfile {
    let mut profile = PolicyProfile::new("U1");
    profile.allowed_objects.insert(
        "OBJ1".to_string(),
        PolicyObjectDetails {
            policy_key: "P1".to_string(),
            policy_name: "Policy P1".to_string(),
            priority: Priority::Ranked(10),
            approval_required: false,
            obj_action_inapplicable: ObjAction::None,
            object_key: "OBJ1".to_string(),
            object_name: "Directory".to_string(),
            allowed_for_all_orgs: false,
            allow_multiple_instances: false,
            denied_by_policy: false,
            retrofit: false,
        },
    );
    if !options.is_empty() {
        profile
            .provisioning_options
            .insert("OBJ1".to_string(), options.iter().copied().collect());
    }
    profile
}

#[test]
fn missing_provisioning_option_is_a_configuration_error() {
    let store = store();
    store.insert_identity(identity("U1", &[])).unwrap();
    let config = EngineConfig::default();
    let objects = PolicyObjects::new();
    let compiler = AccountChangeCompiler::new(Collaborators::from_store(&store), &config, &objects);

    let inapplicable: BTreeMap<String, InapplicablePolicy> = BTreeMap::new();
    match compiler.compute_changes(&hand_built_profile(&[]), &inapplicable, &[]) {
        Err(EvaluationError::Configuration { object_key, .. }) => assert_eq!(object_key, "OBJ1"),
        other => panic!("expected Configuration error, got {:?}", other),
    }
}

#[test]
fn both_options_follow_direct_by_default() {
    let store = store();
    store.insert_identity(identity("U1", &[])).unwrap();
    let objects = PolicyObjects::new();
    let inapplicable: BTreeMap<String, InapplicablePolicy> = BTreeMap::new();
    let both = hand_built_profile(&[ProvisioningOption::Direct, ProvisioningOption::Request]);

    let config = EngineConfig::default();
    let compiler = AccountChangeCompiler::new(Collaborators::from_store(&store), &config, &objects);
    let changes = compiler.compute_changes(&both, &inapplicable, &[]).unwrap();
    assert!(changes.accounts_to_provision.contains_key("OBJ1"));

    let mut config = EngineConfig::default();
    config.provisioning.direct_by_default = false;
    let compiler = AccountChangeCompiler::new(Collaborators::from_store(&store), &config, &objects);
    let changes = compiler.compute_changes(&both, &inapplicable, &[]).unwrap();
    assert!(changes.accounts_to_request.contains_key("OBJ1"));

    let request_only = hand_built_profile(&[ProvisioningOption::Request]);
    let changes = compiler.compute_changes(&request_only, &inapplicable, &[]).unwrap();
    assert!(changes.accounts_to_request.contains_key("OBJ1"));
}

// =========================================================
// Profile persistence
// =========================================================

#[test]
fn profile_is_created_then_archived() {
    let store = store();
    store.insert_policy(policy("P1", 10, vec![grant("OBJ1", "Directory")])).unwrap();
    store.insert_identity(identity("U1", &["P1"])).unwrap();

    evaluate(&store, "U1");
    let profile = store.current_profile("U1").unwrap().unwrap();
    assert_eq!(profile.allow_list, vec!["Directory [Policy P1]".to_string()]);
    assert!(store.history("U1").unwrap().is_empty());

    store.insert_identity(identity("U1", &[])).unwrap();
    evaluate(&store, "U1");
    let profile = store.current_profile("U1").unwrap().unwrap();
    assert!(profile.details.is_empty());
    let history = store.history("U1").unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].profile.details.contains_key("P1"));
}

// compiler.rs — AccountChangeCompiler: turn a policy profile into provisioning actions.
//
// Steps run in a fixed order:
//   1. new accounts (request / provision)
//   2. accounts to enable
//   3. child deletions for policies that no longer apply
//   4. accounts to modify (may extend changes started in step 3)
//   5. accounts to revoke / disable
//   6. consolidation into one bucket per account

use std::collections::{BTreeMap, BTreeSet};

use apr_changeset::{
    form_key_name, AccountChange, AccountProfileChanges, FieldType, FieldValue, ParentDataChange,
    PolicyKeyChange, ProvisioningMechanism, UserAccountUpdate,
};
use apr_policy::{
    InapplicablePolicy, ObjAction, PolicyObjectDetails, PolicyProfile, ProvisioningOption,
};
use apr_store::{AccountStatus, ProvisionedAccount};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::{Collaborators, PolicyObjects};
use crate::error::{EvaluationError, ForIdentity, Result};
use crate::reconciler::{AccountTarget, ChildDataReconciler};

pub struct AccountChangeCompiler<'a> {
    collaborators: Collaborators<'a>,
    config: &'a EngineConfig,
    policy_objects: &'a PolicyObjects,
}

impl<'a> AccountChangeCompiler<'a> {
    pub fn new(
        collaborators: Collaborators<'a>,
        config: &'a EngineConfig,
        policy_objects: &'a PolicyObjects,
    ) -> Self {
        Self {
            collaborators,
            config,
            policy_objects,
        }
    }

    /// Compute the change-set for `profile.identity_key` given its current accounts.
    pub fn compute_changes(
        &self,
        profile: &PolicyProfile,
        inapplicable: &BTreeMap<String, InapplicablePolicy>,
        current_accounts: &[ProvisionedAccount],
    ) -> Result<AccountProfileChanges> {
        let identity = profile.identity_key.as_str();
        let reconciler = ChildDataReconciler::new(
            self.collaborators,
            self.policy_objects,
            identity,
            self.config.entitlements.revoke_if_no_longer_applies,
        );
        let mut changes = AccountProfileChanges::default();

        self.new_accounts(profile, current_accounts, &mut changes)?;
        self.accounts_to_enable(profile, current_accounts, &mut changes)?;
        self.inapplicable_deletions(&reconciler, inapplicable, current_accounts, &mut changes)?;

        for account in current_accounts {
            let Some(details) = profile.allowed_objects.get(&account.object_key) else {
                continue;
            };
            let mut change = changes
                .accounts_to_modify
                .remove(&account.user_account_key)
                .unwrap_or_else(|| {
                    AccountChange::new(account.account_key.clone(), account.user_account_key.clone())
                });
            self.modify_account(&reconciler, profile, account, details, &mut change)?;
            if change.is_modified() {
                changes
                    .accounts_to_modify
                    .insert(account.user_account_key.clone(), change);
            }
        }

        self.accounts_to_revoke_or_disable(profile, current_accounts, &mut changes);
        changes.consolidate();
        Ok(changes)
    }

    fn new_accounts(
        &self,
        profile: &PolicyProfile,
        current_accounts: &[ProvisionedAccount],
        changes: &mut AccountProfileChanges,
    ) -> Result<()> {
        let held: BTreeSet<&str> = current_accounts
            .iter()
            .map(|account| account.object_key.as_str())
            .collect();

        for (object_key, details) in &profile.allowed_objects {
            if held.contains(object_key.as_str()) {
                continue;
            }
            let options = profile
                .provisioning_options
                .get(object_key)
                .filter(|options| !options.is_empty())
                .ok_or_else(|| EvaluationError::Configuration {
                    identity_key: profile.identity_key.clone(),
                    object_key: object_key.clone(),
                })?;
            let direct = options.contains(&ProvisioningOption::Direct);
            let request = options.contains(&ProvisioningOption::Request);
            let provision = match (direct, request) {
                (true, true) => self.config.provisioning.direct_by_default,
                (direct, _) => direct,
            };
            if provision {
                changes
                    .accounts_to_provision
                    .insert(object_key.clone(), details.clone());
            } else {
                changes
                    .accounts_to_request
                    .insert(object_key.clone(), details.clone());
            }
        }
        Ok(())
    }

    fn accounts_to_enable(
        &self,
        profile: &PolicyProfile,
        current_accounts: &[ProvisionedAccount],
        changes: &mut AccountProfileChanges,
    ) -> Result<()> {
        let identity = profile.identity_key.as_str();
        if self
            .collaborators
            .accounts
            .is_identity_disabled(identity)
            .for_identity(identity)?
        {
            debug!(identity = %identity, "identity is disabled, no accounts enabled");
            return Ok(());
        }
        for account in current_accounts {
            if account.status == AccountStatus::Disabled && profile.is_allowed(&account.object_key) {
                changes
                    .accounts_to_enable
                    .insert(account.user_account_key.clone(), None);
            }
        }
        Ok(())
    }

    fn inapplicable_deletions(
        &self,
        reconciler: &ChildDataReconciler<'_>,
        inapplicable: &BTreeMap<String, InapplicablePolicy>,
        current_accounts: &[ProvisionedAccount],
        changes: &mut AccountProfileChanges,
    ) -> Result<()> {
        for policy in inapplicable.values() {
            for account in current_accounts {
                if !policy.allowed(&account.object_name) {
                    continue;
                }
                let (Some(account_key), Some(parent_form)) =
                    (account.account_key.as_deref(), account.form_name.as_deref())
                else {
                    continue;
                };
                let mut change = changes
                    .accounts_to_modify
                    .remove(&account.user_account_key)
                    .unwrap_or_else(|| {
                        AccountChange::new(
                            account.account_key.clone(),
                            account.user_account_key.clone(),
                        )
                    });
                reconciler.delete_inapplicable_rows(
                    &policy.policy_key,
                    account_key,
                    parent_form,
                    &mut change,
                )?;
                if change.is_modified() {
                    changes
                        .accounts_to_modify
                        .insert(account.user_account_key.clone(), change);
                }
            }
        }
        Ok(())
    }

    fn modify_account(
        &self,
        reconciler: &ChildDataReconciler<'_>,
        profile: &PolicyProfile,
        account: &ProvisionedAccount,
        details: &PolicyObjectDetails,
        change: &mut AccountChange,
    ) -> Result<()> {
        let identity = profile.identity_key.as_str();
        let new_update = || {
            UserAccountUpdate::new(identity, &account.object_key, &account.object_instance_key)
        };

        if account.policy_allowed && account.obj_action_inapplicable != details.obj_action_inapplicable {
            change.user_account_mut(new_update).obj_action_inapplicable =
                Some(details.obj_action_inapplicable);
        }

        let Some(account_key) = account.account_key.as_deref() else {
            return Ok(());
        };

        let owner = account.owning_policy();
        match owner {
            Some(owner) if !owner.eq_ignore_ascii_case(&details.policy_key) => {
                debug!(
                    account = %account.user_account_key,
                    from = %owner,
                    to = %details.policy_key,
                    "account moves to another policy"
                );
                change.user_account_mut(new_update).policy_key = Some(PolicyKeyChange {
                    from: Some(owner.to_string()),
                    to: details.policy_key.clone(),
                });
            }
            Some(_) => {}
            None => self.try_harvest(account, details, change, new_update),
        }

        if owner.is_some() || change.policy_harvestable {
            self.parent_data(identity, account, account_key, details, change)?;
        }

        change.child_policy_harvestable = change.policy_harvestable
            || (account.provisioning_mechanism == ProvisioningMechanism::PolicyHarvested
                && owner.is_some());

        if account.is_service_account() {
            return Ok(());
        }
        let Some(parent_form) = account.form_name.as_deref() else {
            return Ok(());
        };
        let Some(parent_row) = self
            .collaborators
            .accounts
            .provisioned_form_data(parent_form, account_key, None)
            .for_identity(identity)?
        else {
            debug!(
                account = %account.user_account_key,
                form = %parent_form,
                "account has no parent form row, child data not reconciled"
            );
            return Ok(());
        };
        let target = AccountTarget {
            account_key: account_key.to_string(),
            object_key: account.object_key.clone(),
            parent_form: parent_form.to_string(),
            parent_row_key: parent_row.primary_key,
        };
        let policy_keys: Vec<&str> = profile.policy_lists.keys().map(String::as_str).collect();
        reconciler.reconcile_child_data(&policy_keys, &target, change)
    }

    /// Attribute an unowned account to a retrofit policy when harvesting allows it.
    fn try_harvest(
        &self,
        account: &ProvisionedAccount,
        details: &PolicyObjectDetails,
        change: &mut AccountChange,
        new_update: impl FnOnce() -> UserAccountUpdate,
    ) {
        if !details.retrofit {
            warn!(
                account = %account.user_account_key,
                policy = %details.policy_key,
                "account not harvested: it has no owning policy and the policy is not a retrofit policy"
            );
            return;
        }
        if !self.config.harvesting.enabled {
            warn!(
                account = %account.user_account_key,
                policy = %details.policy_key,
                "account not harvested: harvesting is disabled"
            );
            return;
        }
        if !account.provisioning_mechanism.is_harvest_eligible() {
            warn!(
                account = %account.user_account_key,
                policy = %details.policy_key,
                mechanism = ?account.provisioning_mechanism,
                "account not harvested: provisioning mechanism is not eligible"
            );
            return;
        }

        info!(
            account = %account.user_account_key,
            policy = %details.policy_key,
            "harvesting account into policy"
        );
        let update = change.user_account_mut(new_update);
        update.policy_key = Some(PolicyKeyChange {
            from: None,
            to: details.policy_key.clone(),
        });
        update.obj_action_inapplicable = Some(details.obj_action_inapplicable);
        update.policy_allowed = Some(true);
        update.provisioning_mechanism = Some(ProvisioningMechanism::PolicyHarvested);
        change.policy_harvestable = true;
    }

    /// Compile a parent-form change when the winning policy's defaults drifted.
    fn parent_data(
        &self,
        identity: &str,
        account: &ProvisionedAccount,
        account_key: &str,
        details: &PolicyObjectDetails,
        change: &mut AccountChange,
    ) -> Result<()> {
        let defaults = self
            .collaborators
            .policies
            .parent_form_defaults(&details.policy_key, &account.object_key)
            .for_identity(identity)?;
        if defaults.is_empty() {
            return Ok(());
        }
        let Some(form_name) = account
            .form_name
            .clone()
            .or_else(|| defaults.first().map(|default| default.form_name.clone()))
        else {
            return Ok(());
        };

        let field_types: BTreeMap<String, FieldType> = self
            .collaborators
            .forms
            .form_fields(&form_name)
            .for_identity(identity)?
            .into_iter()
            .map(|field| (field.name, field.field_type))
            .collect();

        let mut values: BTreeMap<String, FieldValue> = BTreeMap::new();
        for default in defaults.iter().filter(|default| default.form_name == form_name) {
            let Some(field_type) = field_types.get(&default.field_name) else {
                continue;
            };
            if *field_type == FieldType::Date && default.field_value.trim().is_empty() {
                continue;
            }
            let value = FieldValue::parse(&default.field_name, &default.field_value, *field_type)
                .for_identity(identity)?;
            values.insert(default.field_name.clone(), value);
        }
        if values.is_empty() {
            return Ok(());
        }

        let current = self
            .collaborators
            .accounts
            .provisioned_form_data(&form_name, account_key, Some(&details.policy_key))
            .for_identity(identity)?;
        let drifted = match &current {
            None => true,
            Some(row) => values.iter().any(|(name, value)| {
                row.fields.get(name).map_or(true, |stored| !value.matches(stored))
            }),
        };
        if !drifted {
            return Ok(());
        }

        let target = match current {
            Some(row) => Some(row),
            None => self
                .collaborators
                .accounts
                .provisioned_form_data(&form_name, account_key, None)
                .for_identity(identity)?,
        };
        let Some(target) = target else {
            debug!(
                account = %account.user_account_key,
                form = %form_name,
                "account has no parent form row to apply defaults to"
            );
            return Ok(());
        };

        change.parent_data = Some(ParentDataChange {
            primary_key_name: form_key_name(&form_name),
            form_name,
            primary_key_value: target.primary_key,
            owning_policy_key: details.policy_key.clone(),
            field_values: values,
        });
        Ok(())
    }

    fn accounts_to_revoke_or_disable(
        &self,
        profile: &PolicyProfile,
        current_accounts: &[ProvisionedAccount],
        changes: &mut AccountProfileChanges,
    ) {
        for account in current_accounts {
            let key = account.user_account_key.clone();
            if profile.is_denied(&account.object_key) {
                changes.accounts_to_revoke.insert(key, None);
                continue;
            }
            if profile.is_allowed(&account.object_key)
                || !account.policy_allowed
                || account.is_service_account()
            {
                continue;
            }
            match account.obj_action_inapplicable {
                ObjAction::Revoke => {
                    changes.accounts_to_revoke.insert(key, None);
                }
                ObjAction::Disable => {
                    changes.accounts_to_disable.insert(key, None);
                }
                ObjAction::None => {}
            }
        }
    }
}

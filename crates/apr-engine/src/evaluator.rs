// evaluator.rs — PolicyEvaluator: the per-identity evaluation pipeline.
//
//   window check -> build profile -> diff stored profile -> persist
//   -> compile account changes

use apr_changeset::AccountProfileChanges;
use apr_policy::{policies_no_longer_applicable, PolicyDefinition, PolicyProfile, PolicyProfileBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::compiler::AccountChangeCompiler;
use crate::config::{EngineConfig, WindowCheck};
use crate::context::{Collaborators, PolicyObjects};
use crate::error::{EvaluationError, ForIdentity, Result};
use crate::persist::{PersistOutcome, ProfilePersister};

/// Why an identity was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Deprovisioned,
    /// The deprovisioning state could not be read (lenient window check only).
    WindowCheckFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Skipped(SkipReason),
    Evaluated(AccountProfileChanges),
}

impl EvaluationOutcome {
    pub fn changes(&self) -> Option<&AccountProfileChanges> {
        match self {
            EvaluationOutcome::Evaluated(changes) => Some(changes),
            EvaluationOutcome::Skipped(_) => None,
        }
    }
}

/// Evaluates identities against their applicable policies.
///
/// Holds only shared references; each call keeps its own state, so one
/// evaluator may serve several threads as long as no two of them evaluate
/// the same identity at once.
pub struct PolicyEvaluator<'a> {
    collaborators: Collaborators<'a>,
    config: &'a EngineConfig,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(collaborators: Collaborators<'a>, config: &'a EngineConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Compute the provisioning changes for one identity and store its new profile.
    pub fn determine_account_profile_changes(&self, identity_key: &str) -> Result<EvaluationOutcome> {
        if let Some(reason) = self.check_provisioning_window(identity_key)? {
            info!(identity = %identity_key, reason = ?reason, "skipping identity");
            return Ok(EvaluationOutcome::Skipped(reason));
        }

        let policies = self
            .collaborators
            .policies
            .applicable_policies(identity_key)
            .for_identity(identity_key)?;
        let mut policy_objects = PolicyObjects::new();
        let profile = self.build_profile(identity_key, &policies, &mut policy_objects)?;

        let stored = self
            .collaborators
            .profiles
            .current_profile(identity_key)
            .for_identity(identity_key)?;
        let inapplicable = policies_no_longer_applicable(stored.as_ref(), &profile);
        if !inapplicable.is_empty() {
            info!(
                identity = %identity_key,
                count = inapplicable.len(),
                "policies no longer apply"
            );
        }

        let persisted = ProfilePersister::new(self.collaborators.profiles)
            .update_profile(&profile, stored.as_ref())?;
        if persisted == PersistOutcome::Skipped {
            tracing::debug!(identity = %identity_key, "no profile stored");
        }

        let accounts = self
            .collaborators
            .accounts
            .current_accounts(identity_key)
            .for_identity(identity_key)?;
        let changes = AccountChangeCompiler::new(self.collaborators, self.config, &policy_objects)
            .compute_changes(&profile, &inapplicable, &accounts)?;

        let counts = changes.counts();
        info!(
            identity = %identity_key,
            request = counts.request,
            provision = counts.provision,
            enable = counts.enable,
            disable = counts.disable,
            revoke = counts.revoke,
            modify = counts.modify,
            "evaluation complete"
        );
        Ok(EvaluationOutcome::Evaluated(changes))
    }

    /// Classify every object of every applicable policy into a profile.
    pub fn build_profile(
        &self,
        identity_key: &str,
        policies: &[PolicyDefinition],
        policy_objects: &mut PolicyObjects,
    ) -> Result<PolicyProfile> {
        let org_allow_list = self
            .collaborators
            .accounts
            .org_allow_list(identity_key)
            .for_identity(identity_key)?;
        let mut builder = PolicyProfileBuilder::new(identity_key, org_allow_list);
        for policy in policies {
            let grants = policy_objects
                .fetch(self.collaborators.policies, &policy.policy_key)
                .for_identity(identity_key)?;
            builder.add_policy(policy, grants);
        }
        Ok(builder.finish())
    }

    fn check_provisioning_window(&self, identity_key: &str) -> Result<Option<SkipReason>> {
        match self.collaborators.accounts.deprovisioned_at(identity_key) {
            Ok(Some(_)) => Ok(Some(SkipReason::Deprovisioned)),
            Ok(None) => Ok(None),
            Err(err) => match self.config.provisioning.window_check {
                WindowCheck::Lenient => {
                    warn!(
                        identity = %identity_key,
                        error = %err,
                        "could not read provisioning window"
                    );
                    Ok(Some(SkipReason::WindowCheckFailed))
                }
                WindowCheck::Strict => Err(EvaluationError::PolicyEvaluation {
                    identity_key: identity_key.to_string(),
                    source: err,
                }),
            },
        }
    }
}

// evaluate.rs — `apr evaluate`: run one evaluation over a fixture directory.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use apr_changeset::{AccountChange, ChildAction};
use apr_engine::{Collaborators, EngineConfig, EvaluationOutcome, PolicyEvaluator};
use apr_policy::PolicyObjectDetails;
use apr_store::{Fixture, InMemoryStore, JsonProfileStore};

use super::OutputFormat;

pub fn execute(
    fixture: &Path,
    identity: &str,
    config: Option<&Path>,
    profile_dir: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => EngineConfig::load_or_default(path)?,
        None => EngineConfig::default(),
    };
    let fixture = Fixture::load(fixture)
        .with_context(|| format!("loading fixture {}", fixture.display()))?;
    let store = InMemoryStore::from_fixture(fixture)?;

    let file_profiles = profile_dir.map(JsonProfileStore::new);
    let mut collaborators = Collaborators::from_store(&store);
    if let Some(profiles) = &file_profiles {
        tracing::info!(dir = %profiles.dir().display(), "profiles kept on disk");
        collaborators = collaborators.with_profiles(profiles);
    }

    let outcome = PolicyEvaluator::new(collaborators, &config)
        .determine_account_profile_changes(identity)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print!("{}", render_text(identity, &outcome)),
    }
    Ok(())
}

/// Human-readable change-set, one section per non-empty bucket.
pub fn render_text(identity: &str, outcome: &EvaluationOutcome) -> String {
    let mut out = String::new();
    let changes = match outcome {
        EvaluationOutcome::Skipped(reason) => {
            let _ = writeln!(out, "Identity {} skipped: {:?}", identity, reason);
            return out;
        }
        EvaluationOutcome::Evaluated(changes) => changes,
    };
    if changes.is_empty() {
        let _ = writeln!(out, "Identity {} is in compliance. No changes.", identity);
        return out;
    }

    let _ = writeln!(out, "Identity {}:", identity);
    render_new(&mut out, "Request", &changes.accounts_to_request);
    render_new(&mut out, "Provision", &changes.accounts_to_provision);
    for (title, bucket) in [
        ("Enable", &changes.accounts_to_enable),
        ("Disable", &changes.accounts_to_disable),
        ("Revoke", &changes.accounts_to_revoke),
    ] {
        if bucket.is_empty() {
            continue;
        }
        let _ = writeln!(out, "  {}:", title);
        for (key, change) in bucket {
            let _ = writeln!(out, "    {}", key);
            if let Some(change) = change {
                render_change(&mut out, change);
            }
        }
    }
    if !changes.accounts_to_modify.is_empty() {
        let _ = writeln!(out, "  Modify:");
        for (key, change) in &changes.accounts_to_modify {
            let _ = writeln!(out, "    {}", key);
            render_change(&mut out, change);
        }
    }
    out
}

fn render_new(out: &mut String, title: &str, bucket: &BTreeMap<String, PolicyObjectDetails>) {
    if bucket.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {}:", title);
    for details in bucket.values() {
        let _ = writeln!(
            out,
            "    {} ({}) via {}",
            details.object_name, details.object_key, details.policy_key
        );
    }
}

fn render_change(out: &mut String, change: &AccountChange) {
    if let Some(update) = &change.user_account {
        if let Some(key) = &update.policy_key {
            let _ = writeln!(
                out,
                "      policy: {} -> {}",
                key.from.as_deref().unwrap_or("-"),
                key.to
            );
        }
        if let Some(action) = update.obj_action_inapplicable {
            let _ = writeln!(out, "      if no longer applicable: {}", action);
        }
        if let Some(mechanism) = update.provisioning_mechanism {
            let _ = writeln!(out, "      provisioning mechanism: {:?}", mechanism);
        }
    }
    if let Some(parent) = &change.parent_data {
        let _ = writeln!(
            out,
            "      {} row {}: {} field(s) from {}",
            parent.form_name,
            parent.primary_key_value,
            parent.field_values.len(),
            parent.owning_policy_key
        );
    }
    for record in &change.child_records {
        let verb = match record.action {
            ChildAction::Add => "add",
            ChildAction::Modify => "modify",
            ChildAction::Delete => "delete",
        };
        let fields: Vec<String> = record
            .field_values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        let _ = writeln!(
            out,
            "      {} {} {} [{}] ({})",
            verb,
            record.form_name,
            record.primary_key_value.as_deref().unwrap_or("new"),
            fields.join(", "),
            record.owning_policy_key
        );
    }
}

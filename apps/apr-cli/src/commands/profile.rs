// profile.rs — Profile subcommands: show, history.

use std::path::PathBuf;

use apr_policy::StoredProfile;
use apr_store::{JsonProfileStore, ProfileStore};
use clap::Subcommand;

use super::OutputFormat;

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show the current policy profile of an identity.
    Show {
        /// Directory holding the JSON profile store.
        #[arg(long)]
        profile_dir: PathBuf,
        #[arg(long)]
        identity: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List archived profile snapshots of an identity, oldest first.
    History {
        /// Directory holding the JSON profile store.
        #[arg(long)]
        profile_dir: PathBuf,
        #[arg(long)]
        identity: String,
    },
}

pub fn execute(cmd: &ProfileCommands) -> anyhow::Result<()> {
    match cmd {
        ProfileCommands::Show {
            profile_dir,
            identity,
            format,
        } => {
            let store = JsonProfileStore::new(profile_dir.clone());
            let Some(profile) = store.current_profile(identity)? else {
                println!("No profile stored for {}", identity);
                return Ok(());
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
                OutputFormat::Text => print!("{}", render_profile(&profile)),
            }
        }

        ProfileCommands::History {
            profile_dir,
            identity,
        } => {
            let store = JsonProfileStore::new(profile_dir.clone());
            let history = store.history(identity)?;
            if history.is_empty() {
                println!("No archived profiles for {}", identity);
                return Ok(());
            }

            println!("{:<38} {:<21} {:>8} ALLOWED", "HISTORY KEY", "ARCHIVED", "POLICIES");
            println!("{}", "-".repeat(80));
            for snapshot in &history {
                println!(
                    "{:<38} {:<21} {:>8} {}",
                    snapshot.history_key,
                    snapshot.archived_at.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.profile.details.len(),
                    snapshot.profile.allow_list.join(", "),
                );
            }
        }
    }

    Ok(())
}

fn render_profile(profile: &StoredProfile) -> String {
    let mut out = format!("Profile of {}\n", profile.identity_key);
    out.push_str(&format!("  Allowed:        {}\n", dash_if_empty(&profile.allow_list)));
    out.push_str(&format!("  Denied:         {}\n", dash_if_empty(&profile.deny_list)));
    out.push_str(&format!("  Denied for org: {}\n", dash_if_empty(&profile.org_deny_list)));
    for (policy_key, lists) in &profile.details {
        out.push_str(&format!(
            "  {}: allow [{}] deny [{}]\n",
            policy_key,
            lists.allow_csv(),
            lists.deny_csv()
        ));
    }
    out
}

fn dash_if_empty(list: &[String]) -> String {
    if list.is_empty() {
        "-".to_string()
    } else {
        list.join(", ")
    }
}

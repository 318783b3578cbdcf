// json_store.rs — File-backed profile store.
//
// Layout under the store directory:
//   profiles/<identity>.json   current profile, one file per identity
//   history/<uuid>.json        archived snapshots
//
// Writes are whole-file replacements. Two evaluations of the same identity
// racing on one directory are last-write-wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use apr_policy::{PolicyObjectLists, StoredProfile};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{ProfileSnapshot, ProfileStore};

pub struct JsonProfileStore {
    dir: PathBuf,
}

impl JsonProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn profile_path(&self, identity_key: &str) -> Result<PathBuf> {
        Ok(self
            .dir
            .join("profiles")
            .join(format!("{}.json", file_stem(identity_key)?)))
    }

    fn history_dir(&self) -> PathBuf {
        self.dir.join("history")
    }

    fn snapshot_path(&self, history_key: Uuid) -> PathBuf {
        self.history_dir().join(format!("{}.json", history_key))
    }

    fn load_profile(&self, identity_key: &str) -> Result<Option<StoredProfile>> {
        read_json(&self.profile_path(identity_key)?)
    }

    fn store_profile(&self, profile: &StoredProfile) -> Result<()> {
        write_json(&self.profile_path(&profile.identity_key)?, profile)
    }

    fn load_or_new(&self, identity_key: &str) -> Result<StoredProfile> {
        Ok(self
            .load_profile(identity_key)?
            .unwrap_or_else(|| StoredProfile {
                identity_key: identity_key.to_string(),
                ..Default::default()
            }))
    }
}

/// Identity keys become file names; refuse anything that could escape the directory.
fn file_stem(identity_key: &str) -> Result<&str> {
    let unsafe_key = identity_key.is_empty()
        || identity_key.contains(['/', '\\'])
        || identity_key.contains("..");
    if unsafe_key {
        return Err(StoreError::InvalidData(format!(
            "identity key '{}' cannot be used as a file name",
            identity_key
        )));
    }
    Ok(identity_key)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(serde_json::from_str(&data)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl ProfileStore for JsonProfileStore {
    fn current_profile(&self, identity_key: &str) -> Result<Option<StoredProfile>> {
        self.load_profile(identity_key)
    }

    fn save_profile(
        &self,
        identity_key: &str,
        allow_list: &[String],
        deny_list: &[String],
        org_deny_list: &[String],
    ) -> Result<()> {
        let mut profile = self.load_or_new(identity_key)?;
        profile.allow_list = allow_list.to_vec();
        profile.deny_list = deny_list.to_vec();
        profile.org_deny_list = org_deny_list.to_vec();
        self.store_profile(&profile)
    }

    fn save_profile_detail(
        &self,
        identity_key: &str,
        policy_key: &str,
        lists: &PolicyObjectLists,
    ) -> Result<()> {
        let mut profile = self.load_or_new(identity_key)?;
        profile.details.insert(policy_key.to_string(), lists.clone());
        self.store_profile(&profile)
    }

    fn delete_profile_detail(&self, identity_key: &str, policy_key: &str) -> Result<()> {
        let Some(mut profile) = self.load_profile(identity_key)? else {
            return Ok(());
        };
        if profile.details.remove(policy_key).is_some() {
            self.store_profile(&profile)?;
        }
        Ok(())
    }

    fn archive_profile(&self, identity_key: &str) -> Result<Uuid> {
        let current = self
            .load_profile(identity_key)?
            .ok_or_else(|| StoreError::NotFound {
                kind: "profile",
                key: identity_key.to_string(),
            })?;
        let snapshot = ProfileSnapshot {
            history_key: Uuid::new_v4(),
            archived_at: Utc::now(),
            profile: StoredProfile {
                details: BTreeMap::new(),
                ..current
            },
        };
        write_json(&self.snapshot_path(snapshot.history_key), &snapshot)?;
        tracing::debug!(
            identity = %identity_key,
            history_key = %snapshot.history_key,
            "archived profile"
        );
        Ok(snapshot.history_key)
    }

    fn archive_profile_details(
        &self,
        history_key: Uuid,
        details: &BTreeMap<String, PolicyObjectLists>,
    ) -> Result<()> {
        let path = self.snapshot_path(history_key);
        let mut snapshot: ProfileSnapshot =
            read_json(&path)?.ok_or_else(|| StoreError::NotFound {
                kind: "profile snapshot",
                key: history_key.to_string(),
            })?;
        snapshot.profile.details = details.clone();
        write_json(&path, &snapshot)
    }

    fn history(&self, identity_key: &str) -> Result<Vec<ProfileSnapshot>> {
        let dir = self.history_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut snapshots = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            if let Some(snapshot) = read_json::<ProfileSnapshot>(&path)? {
                if snapshot.profile.identity_key == identity_key {
                    snapshots.push(snapshot);
                }
            }
        }
        snapshots.sort_by_key(|snapshot| snapshot.archived_at);
        Ok(snapshots)
    }
}

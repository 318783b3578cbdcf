//! Engine configuration, read from `engine.toml`.
//!
//! ```toml
//! [harvesting]
//! enabled = true
//!
//! [provisioning]
//! direct_by_default = true
//! window_check = "strict"
//!
//! [entitlements]
//! revoke_if_no_longer_applies = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvaluationError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub harvesting: HarvestingConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    #[serde(default)]
    pub entitlements: EntitlementConfig,
}

/// Retrofit policies claiming reconciled or bulk-loaded accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestingConfig {
    /// System-wide switch. Default: false.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Tie-break for objects offering both direct and request-based provisioning.
    #[serde(default = "default_direct_by_default")]
    pub direct_by_default: bool,

    #[serde(default)]
    pub window_check: WindowCheck,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            direct_by_default: default_direct_by_default(),
            window_check: WindowCheck::default(),
        }
    }
}

fn default_direct_by_default() -> bool {
    true
}

/// What to do when the deprovisioning state of an identity cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowCheck {
    /// Skip the identity, as if it were deprovisioned.
    #[default]
    Lenient,
    /// Fail the evaluation.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Let child rows change owner or revoke flag in place and let a pending
    /// addition be replaced. Default: false.
    #[serde(default)]
    pub revoke_if_no_longer_applies: bool,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EvaluationError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| EvaluationError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config, falling back to defaults when the file does not exist.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

//! # Plugin Contract
//!
//! A contract is a plugin's self-description: identity, the environment
//! variables and flags it understands, and what it requires from the cluster,
//! other plugins and modules.
//!
//! ## Two Wire Shapes
//!
//! | Shape | Where | `requirements.plugins` |
//! |-------|-------|------------------------|
//! | [`Contract`] | `plugin-contract` image label | present |
//! | [`CachedContract`] | `cache/contracts/<name>.json` | **absent** |
//!
//! The cache file carries the narrower shape. A contract loaded
//! from the cache therefore has `requirements.plugins == None`, which means
//! "unknown", not "no requirements". Consumers must treat the two differently
//! (see [`crate::requirements`]).
//!
//! ## Cache Encoding
//!
//! [`CachedContract::to_json`] writes UTF-8 JSON with two-space indentation.
//! `serde_json` never HTML-escapes, so `<`, `>` and `&` in descriptions are
//! stored verbatim.

use crate::error::{Error, Result};
use crate::version::parse_version;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Plugin contract as published in the registry label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub requirements: Requirements,
}

/// Environment variable understood by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
}

/// Command-line flag understood by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub name: String,
}

/// Requirements declared by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub kubernetes: KubernetesRequirement,
    /// `None` when the requirement list is not known (cache-loaded contract).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<PluginRequirement>>,
    #[serde(default)]
    pub modules: Vec<ModuleRequirement>,
}

/// Kubernetes version constraint; empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesRequirement {
    #[serde(default)]
    pub constraint: String,
}

/// Requirement on another plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRequirement {
    pub name: String,
    /// Semver range; empty means any installed version.
    #[serde(default)]
    pub constraint: String,
}

/// Requirement on a platform module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequirement {
    pub name: String,
    #[serde(default)]
    pub constraint: String,
}

impl Contract {
    /// Decodes a contract from the registry label value.
    ///
    /// `plugin` is only used for error context. Name and version must be
    /// non-empty and the version must parse.
    pub fn from_label(plugin: &str, label: &str) -> Result<Self> {
        let mut contract: Contract =
            serde_json::from_str(label).map_err(|e| Error::InvalidContract {
                plugin: plugin.to_string(),
                reason: e.to_string(),
            })?;

        // A label that omits the list still declares "no requirements".
        contract.requirements.plugins.get_or_insert_with(Vec::new);
        contract.validate(plugin)?;
        Ok(contract)
    }

    /// Checks the identity invariants of a registry contract.
    pub fn validate(&self, plugin: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidContract {
            plugin: plugin.to_string(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("missing name".to_string()));
        }
        if self.version.is_empty() {
            return Err(invalid("missing version".to_string()));
        }
        parse_version(&self.version).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Returns the parsed contract version.
    pub fn parsed_version(&self) -> Result<Version> {
        parse_version(&self.version)
    }

    /// Returns the plugin requirements, or an empty slice when unknown.
    pub fn plugin_requirements(&self) -> &[PluginRequirement] {
        self.requirements.plugins.as_deref().unwrap_or_default()
    }

    /// Serializes the full registry shape, pretty-printed.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

// =============================================================================
// Cache DTO
// =============================================================================

/// Contract shape stored in the on-disk cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContract {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub requirements: CachedRequirements,
}

/// Requirements as stored in the cache; no plugin list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRequirements {
    #[serde(default)]
    pub kubernetes: KubernetesRequirement,
    #[serde(default)]
    pub modules: Vec<ModuleRequirement>,
}

impl CachedContract {
    /// Encodes the cache file body: two-space indented JSON, trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut body =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        body.push('\n');
        Ok(body)
    }

    /// Decodes a cache file body.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl From<&Contract> for CachedContract {
    fn from(contract: &Contract) -> Self {
        Self {
            name: contract.name.clone(),
            version: contract.version.clone(),
            description: contract.description.clone(),
            env: contract.env.clone(),
            flags: contract.flags.clone(),
            requirements: CachedRequirements {
                kubernetes: contract.requirements.kubernetes.clone(),
                modules: contract.requirements.modules.clone(),
            },
        }
    }
}

impl From<CachedContract> for Contract {
    fn from(cached: CachedContract) -> Self {
        Self {
            name: cached.name,
            version: cached.version,
            description: cached.description,
            env: cached.env,
            flags: cached.flags,
            requirements: Requirements {
                kubernetes: cached.requirements.kubernetes,
                plugins: None,
                modules: cached.requirements.modules,
            },
        }
    }
}

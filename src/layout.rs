//! # On-Disk Layout
//!
//! Every path the manager reads or writes is derived here from a single
//! root directory:
//!
//! ```text
//! <root>/
//! ├── plugins/
//! │   └── <name>/
//! │       ├── current -> <root>/plugins/<name>/v2/<name>   (absolute)
//! │       ├── v1/
//! │       │   └── <name>
//! │       └── v2/
//! │           ├── <name>
//! │           ├── <name>.lock   (only while installing)
//! │           └── <name>.old    (previous binary, after an upgrade)
//! └── cache/
//!     └── contracts/
//!         └── <name>.json
//! ```
//!
//! ## Security
//!
//! Plugin names become path components, so [`validate_plugin_name`] must
//! accept a name before any path is built from it.

use crate::constants::{
    CACHE_DIR, CONTRACTS_DIR, CONTRACT_EXTENSION, CURRENT_LINK, LOCK_EXTENSION,
    MAX_PLUGIN_NAME_LEN, OLD_EXTENSION, PLUGINS_DIR, PLUGIN_NAME_EXTRA_CHARS,
};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Path builder for the plugin tree and contract cache.
#[derive(Debug, Clone)]
pub struct PluginLayout {
    root: PathBuf,
}

impl PluginLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/plugins`
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PLUGINS_DIR)
    }

    /// `<root>/cache/contracts`
    pub fn contracts_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR).join(CONTRACTS_DIR)
    }

    /// `<root>/plugins/<name>`
    pub fn plugin_dir(&self, name: &str) -> PathBuf {
        self.plugins_dir().join(name)
    }

    /// `<root>/plugins/<name>/v<major>`
    pub fn version_dir(&self, name: &str, major: u64) -> PathBuf {
        self.plugin_dir(name).join(format!("v{}", major))
    }

    /// `<root>/plugins/<name>/v<major>/<name>`
    pub fn binary_path(&self, name: &str, major: u64) -> PathBuf {
        self.version_dir(name, major).join(name)
    }

    /// `<root>/plugins/<name>/v<major>/<name>.lock`
    pub fn lock_path(&self, name: &str, major: u64) -> PathBuf {
        self.version_dir(name, major)
            .join(format!("{}.{}", name, LOCK_EXTENSION))
    }

    /// `<root>/plugins/<name>/v<major>/<name>.old`
    pub fn old_binary_path(&self, name: &str, major: u64) -> PathBuf {
        self.version_dir(name, major)
            .join(format!("{}.{}", name, OLD_EXTENSION))
    }

    /// `<root>/plugins/<name>/current`
    pub fn current_link(&self, name: &str) -> PathBuf {
        self.plugin_dir(name).join(CURRENT_LINK)
    }

    /// `<root>/cache/contracts/<name>.json`
    pub fn contract_path(&self, name: &str) -> PathBuf {
        self.contracts_dir()
            .join(format!("{}.{}", name, CONTRACT_EXTENSION))
    }
}

/// Validates that `name` is safe to use as a single path component and
/// image repository segment.
pub fn validate_plugin_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidPluginName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_PLUGIN_NAME_LEN {
        return Err(invalid(&format!("exceeds {} bytes", MAX_PLUGIN_NAME_LEN)));
    }
    if name == "." || name == ".." {
        return Err(invalid("reserved name"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PLUGIN_NAME_EXTRA_CHARS.contains(c))
    {
        return Err(invalid("contains invalid characters"));
    }
    Ok(())
}

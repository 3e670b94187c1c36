//! # Plugin Installer
//!
//! Orchestrates the install transaction for one plugin major version:
//!
//! ```text
//!   resolve version ──► mkdir v<major>/ ──► lock ──► fetch contract
//!                                             │            │
//!                                             │     validate requirements
//!                                             │            │
//!                                             │   back up binary → .old
//!                                             │            │
//!                                             │     extract layers
//!                                             │            │
//!                                             │   activate `current`
//!                                             │            │
//!                                             └─ unlock ◄─ cache contract
//! ```
//!
//! The lock is an RAII guard, so it is released on every exit path.
//!
//! ## Dependency Repair
//!
//! With [`InstallOptions::resolve_conflicts`], unmet plugin requirements are
//! repaired by installing each missing or mismatched dependency at its
//! latest version, then retrying the dependent. Repair is driven by a
//! worklist, not recursion:
//!
//! - a plugin is deferred for its dependencies at most once; if it is still
//!   unsatisfied on retry the install fails with
//!   [`Error::RequirementsNotSatisfied`]
//! - reaching a plugin that is itself waiting on dependencies is a
//!   [`Error::DependencyCycle`]
//! - the dependent's lock is not held while its dependencies install
//!
//! ## Failure Behavior
//!
//! | Step | Left behind on failure |
//! |------|------------------------|
//! | backup | nothing |
//! | extraction | partially populated `v<major>/`, previous binary as `.old` |
//! | activation | previous `current` untouched (symlink is swapped by rename) |
//! | contract cache | new binary active, previous contract cached |

use crate::cache::{ContractCache, FsContractCache};
use crate::config::ManagerConfig;
use crate::constants::{CONTRACT_LABEL, CURRENT_LINK};
use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::extract::{SizeBudget, create_symlink, extract_tar_with_budget};
use crate::layout::{PluginLayout, validate_plugin_name};
use crate::lock::{FileLockManager, LockGuard, LockManager};
use crate::registry::{LayerProgress, LayerStream, OciRegistryClient, RegistryClient};
use crate::requirements::{FailedConstraints, RequirementValidator};
use crate::version::{
    TaggedVersion, fetch_latest_tag, find_tag_for, parse_version, sorted_versions, version_tag,
};
use semver::Version;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for [`Installer::install_plugin`].
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Exact version to install, matched against the listed tags; latest
    /// when `None`.
    pub version: Option<String>,
    /// Restrict latest-version resolution to this major version.
    pub use_major: Option<u64>,
    /// Install unmet plugin dependencies instead of failing.
    pub resolve_conflicts: bool,
}

impl InstallOptions {
    /// Options pinning an exact version.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Default::default()
        }
    }

    /// Options selecting the latest version within `major`.
    pub fn with_major(major: u64) -> Self {
        Self {
            use_major: Some(major),
            ..Default::default()
        }
    }

    /// Enables or disables dependency repair.
    pub fn resolve_conflicts(mut self, enabled: bool) -> Self {
        self.resolve_conflicts = enabled;
        self
    }
}

/// A successfully installed plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    pub name: String,
    pub version: Version,
    /// Version-scoped binary the `current` link points at.
    pub binary: PathBuf,
}

/// Installed plugin as seen on disk.
#[derive(Debug, Clone)]
pub struct PluginStatus {
    pub name: String,
    /// Last installed contract, if cached.
    pub contract: Option<Contract>,
    /// Target of the `current` link, if present.
    pub current: Option<PathBuf>,
    /// Installed major versions, ascending.
    pub majors: Vec<u64>,
}

/// Outcome of a single install attempt.
enum InstallStep {
    Installed(InstalledPlugin),
    Unsatisfied(FailedConstraints),
}

/// Installs, updates and removes plugins under a [`PluginLayout`].
pub struct Installer {
    layout: PluginLayout,
    registry: Arc<dyn RegistryClient>,
    contracts: Arc<dyn ContractCache>,
    locks: Arc<dyn LockManager>,
}

impl Installer {
    /// Creates an installer with file-backed contract cache and locks.
    pub fn new(layout: PluginLayout, registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            contracts: Arc::new(FsContractCache::new(layout.clone())),
            locks: Arc::new(FileLockManager::new()),
            layout,
            registry,
        }
    }

    /// Creates an installer talking to the configured OCI registry.
    pub fn from_config(config: &ManagerConfig) -> Self {
        let registry = Arc::new(OciRegistryClient::new(config.registry.clone()));
        Self::new(PluginLayout::new(config.root.clone()), registry)
    }

    /// Replaces the contract cache.
    pub fn with_contract_cache(mut self, contracts: Arc<dyn ContractCache>) -> Self {
        self.contracts = contracts;
        self
    }

    /// Replaces the lock manager.
    pub fn with_lock_manager(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = locks;
        self
    }

    /// Returns the on-disk layout.
    pub fn layout(&self) -> &PluginLayout {
        &self.layout
    }

    // =========================================================================
    // Install
    // =========================================================================

    /// Installs `name`, repairing dependencies if `opts.resolve_conflicts`.
    pub async fn install_plugin(&self, name: &str, opts: &InstallOptions) -> Result<InstalledPlugin> {
        let mut pending = vec![(name.to_string(), opts.clone())];
        let mut deferred: HashSet<String> = HashSet::new();
        let mut installed_now: HashSet<String> = HashSet::new();
        let mut requested = None;

        while let Some((plugin, plugin_opts)) = pending.pop() {
            if plugin != name && installed_now.contains(&plugin) {
                debug!("Dependency {} already installed in this run", plugin);
                continue;
            }

            let step = self
                .install_once(&plugin, &plugin_opts)
                .await
                .map_err(|e| e.for_plugin("install", &plugin))?;

            match step {
                InstallStep::Installed(installed) => {
                    installed_now.insert(plugin.clone());
                    if plugin == name {
                        requested = Some(installed);
                    }
                }
                InstallStep::Unsatisfied(failed) => {
                    if !deferred.insert(plugin.clone()) {
                        return Err(Error::RequirementsNotSatisfied {
                            plugin: plugin.clone(),
                        }
                        .for_plugin("install", &plugin));
                    }

                    pending.push((plugin.clone(), plugin_opts));
                    // Reverse so dependencies install in name order.
                    for dependency in failed.keys().rev() {
                        if deferred.contains(dependency) {
                            return Err(Error::DependencyCycle {
                                plugin: plugin.clone(),
                                dependency: dependency.clone(),
                            }
                            .for_plugin("install", &plugin));
                        }
                        info!("Installing {} to satisfy {}", dependency, plugin);
                        pending.push((
                            dependency.clone(),
                            InstallOptions::default().resolve_conflicts(true),
                        ));
                    }
                }
            }
        }

        requested.ok_or_else(|| {
            Error::Internal(format!("install of {} finished without a result", name))
        })
    }

    /// One pass of the install transaction for a single plugin.
    async fn install_once(&self, name: &str, opts: &InstallOptions) -> Result<InstallStep> {
        validate_plugin_name(name)?;

        let TaggedVersion { version, tag } = self.resolve_version(name, opts).await?;
        let major = version.major;

        let version_dir = self.layout.version_dir(name, major);
        fs::create_dir_all(&version_dir).map_err(Error::fs("create directory", &version_dir))?;

        let _lock = LockGuard::acquire(self.locks.as_ref(), self.layout.lock_path(name, major))?;

        let contract = self.fetch_contract(name, &tag).await?;
        let failed = RequirementValidator::new(self.contracts.as_ref()).validate(&contract)?;
        if !failed.is_empty() {
            if !opts.resolve_conflicts {
                return Err(Error::RequirementsNotSatisfied {
                    plugin: name.to_string(),
                });
            }
            return Ok(InstallStep::Unsatisfied(failed));
        }

        let binary = self.layout.binary_path(name, major);
        if fs::symlink_metadata(&binary).is_ok() {
            let old = self.layout.old_binary_path(name, major);
            fs::rename(&binary, &old).map_err(Error::fs("back up", &binary))?;
            debug!("Moved previous binary to {}", old.display());
        }

        let mut entries = 0usize;
        let mut budget = SizeBudget::default();
        let mut handler = |layer: LayerProgress, stream: LayerStream| -> Result<()> {
            debug!(
                "Extracting layer {}/{} of {}:{}",
                layer.index, layer.total, name, tag
            );
            entries += extract_tar_with_budget(stream, &version_dir, &mut budget)?;
            Ok(())
        };
        self.registry
            .extract_image_layers(name, &tag, &mut handler)
            .await?;

        if fs::symlink_metadata(&binary).is_err() {
            return Err(Error::BinaryNotFound { path: binary });
        }

        self.activate(name, &binary)?;
        self.contracts.store(&contract)?;

        info!(
            "Installed {} {} ({} entries, {} bytes)",
            name,
            version,
            entries,
            budget.used()
        );
        Ok(InstallStep::Installed(InstalledPlugin {
            name: name.to_string(),
            version,
            binary,
        }))
    }

    /// Picks the version to install and the registry tag it is published
    /// under.
    async fn resolve_version(&self, name: &str, opts: &InstallOptions) -> Result<TaggedVersion> {
        let Some(requested) = &opts.version else {
            return fetch_latest_tag(self.registry.as_ref(), name, opts.use_major).await;
        };

        let version = parse_version(requested)?;
        if let Some(major) = opts.use_major
            && major != version.major
        {
            warn!(
                "Explicit version {} overrides major version filter v{}",
                version, major
            );
        }

        let requested = requested.trim();
        let tags = self
            .registry
            .list_tags(name)
            .await
            .map_err(|e| e.for_plugin("list tags of", name))?;
        let tag = if tags.iter().any(|t| t == requested) {
            requested.to_string()
        } else if let Some(tag) = find_tag_for(&tags, &version) {
            tag
        } else {
            warn!(
                "No tag of {} parses to {}, trying {}",
                name,
                version,
                version_tag(&version)
            );
            version_tag(&version)
        };

        debug!("Resolved {} {} to tag {}", name, version, tag);
        Ok(TaggedVersion { version, tag })
    }

    async fn fetch_contract(&self, name: &str, tag: &str) -> Result<Contract> {
        let label = self
            .registry
            .get_label(name, tag, CONTRACT_LABEL)
            .await?
            .ok_or_else(|| Error::ContractNotFound {
                plugin: name.to_string(),
                tag: tag.to_string(),
                label: CONTRACT_LABEL.to_string(),
            })?;

        let contract = Contract::from_label(name, &label)?;
        if contract.name != name {
            return Err(Error::InvalidContract {
                plugin: name.to_string(),
                reason: format!("contract names plugin '{}'", contract.name),
            });
        }
        Ok(contract)
    }

    /// Points `current` at `binary` by renaming a fresh symlink over it.
    fn activate(&self, name: &str, binary: &Path) -> Result<()> {
        let link = self.layout.current_link(name);
        let target = std::path::absolute(binary).map_err(Error::fs("resolve", binary))?;
        let staging =
            link.with_file_name(format!(".{}.{}", CURRENT_LINK, uuid::Uuid::now_v7()));

        create_symlink(&target, &staging)?;
        if let Err(e) = fs::rename(&staging, &link) {
            let _ = fs::remove_file(&staging);
            return Err(Error::fs("activate", &link)(e));
        }

        info!("Activated {} -> {}", link.display(), target.display());
        Ok(())
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Re-installs `name` at the latest registry version.
    pub async fn update(&self, name: &str) -> Result<InstalledPlugin> {
        self.install_plugin(name, &InstallOptions::default()).await
    }

    /// Updates every installed plugin in name order, stopping at the first
    /// failure.
    pub async fn update_all(&self) -> Result<Vec<InstalledPlugin>> {
        let mut updated = Vec::new();
        for name in self.installed_names()? {
            updated.push(self.update(&name).await?);
        }
        Ok(updated)
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Deletes `plugins/<name>/` and the cached contract. Removing an absent
    /// plugin succeeds.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.remove_inner(name)
            .map_err(|e| e.for_plugin("remove", name))
    }

    fn remove_inner(&self, name: &str) -> Result<()> {
        validate_plugin_name(name)?;

        let dir = self.layout.plugin_dir(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Plugin directory {} already absent", dir.display());
            }
            Err(e) => return Err(Error::fs("remove", &dir)(e)),
        }

        self.contracts.remove(name)?;
        info!("Removed plugin {}", name);
        Ok(())
    }

    /// Removes every installed plugin in name order, stopping at the first
    /// failure. Returns the removed names.
    pub fn remove_all(&self) -> Result<Vec<String>> {
        let names = self.installed_names()?;
        for name in &names {
            self.remove(name)?;
        }
        Ok(names)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Names of the entries under `plugins/`, sorted.
    pub fn installed_names(&self) -> Result<Vec<String>> {
        let dir = self.layout.plugins_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::fs("read directory", &dir)(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Error::fs("read directory", &dir))?;
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if validate_plugin_name(&name).is_ok() => names.push(name),
                Ok(name) => warn!("Ignoring unexpected entry {} in {}", name, dir.display()),
                Err(raw) => warn!("Ignoring non-UTF-8 entry {:?} in {}", raw, dir.display()),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Status of every installed plugin.
    pub fn list_installed(&self) -> Result<Vec<PluginStatus>> {
        self.installed_names()?
            .into_iter()
            .map(|name| self.status(name))
            .collect()
    }

    fn status(&self, name: String) -> Result<PluginStatus> {
        let contract = self.contracts.load(&name)?;
        let current = fs::read_link(self.layout.current_link(&name)).ok();

        let dir = self.layout.plugin_dir(&name);
        let mut majors: Vec<u64> = fs::read_dir(&dir)
            .map_err(Error::fs("read directory", &dir))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix('v'))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        majors.sort_unstable();

        Ok(PluginStatus {
            name,
            contract,
            current,
            majors,
        })
    }

    /// Every parseable version published for `name`, newest first.
    pub async fn available_versions(&self, name: &str) -> Result<Vec<Version>> {
        validate_plugin_name(name)?;
        let tags = self
            .registry
            .list_tags(name)
            .await
            .map_err(|e| e.for_plugin("list tags of", name))?;
        Ok(sorted_versions(&tags))
    }

    /// Contract published for `name` at `version` (latest when `None`).
    pub async fn registry_contract(&self, name: &str, version: Option<&str>) -> Result<Contract> {
        let fetch = async {
            validate_plugin_name(name)?;
            let opts = InstallOptions {
                version: version.map(str::to_string),
                ..Default::default()
            };
            let resolved = self.resolve_version(name, &opts).await?;
            self.fetch_contract(name, &resolved.tag).await
        };
        fetch.await.map_err(|e| e.for_plugin("fetch contract of", name))
    }

    /// Contract cached by the last successful install of `name`.
    pub fn installed_contract(&self, name: &str) -> Result<Option<Contract>> {
        validate_plugin_name(name)?;
        self.contracts.load(name)
    }
}

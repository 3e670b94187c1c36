//! # Contract Cache
//!
//! Keeps the contract of the last successful install of each plugin. The
//! requirement validator reads it to learn what is installed and at which
//! version; `list` and `contract` display paths read it too.
//!
//! Two implementations share the [`ContractCache`] trait:
//!
//! | Type | Backing | Plugin requirements after reload |
//! |------|---------|----------------------------------|
//! | [`FsContractCache`] | `cache/contracts/<name>.json` | lost (`None`) |
//! | [`MemoryContractCache`] | in-process map | kept |
//!
//! The filesystem cache writes the narrow [`CachedContract`] shape; see
//! [`crate::contract`] for why that loses `requirements.plugins`.
//!
//! A corrupt cache file is an [`Error::InvalidContract`] from both `load` and
//! `list`. Removing or reinstalling the plugin clears it.

use crate::constants::CONTRACT_EXTENSION;
use crate::contract::{CachedContract, Contract};
use crate::error::{Error, Result};
use crate::layout::PluginLayout;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Storage for installed plugin contracts.
pub trait ContractCache: Send + Sync {
    /// Loads the cached contract of `name`, or `None` if there is none.
    fn load(&self, name: &str) -> Result<Option<Contract>>;

    /// Stores `contract`, replacing any previous entry for its name.
    fn store(&self, contract: &Contract) -> Result<()>;

    /// Removes the entry for `name`. A missing entry is not an error.
    fn remove(&self, name: &str) -> Result<()>;

    /// Returns every cached contract, ordered by name.
    ///
    /// Fails like [`ContractCache::load`] on the first unreadable entry.
    fn list(&self) -> Result<Vec<Contract>>;
}

// =============================================================================
// Filesystem cache
// =============================================================================

/// Contract cache under `<root>/cache/contracts`.
pub struct FsContractCache {
    layout: PluginLayout,
}

impl FsContractCache {
    /// Creates a cache for `layout`. The directory is created on first store.
    pub fn new(layout: PluginLayout) -> Self {
        Self { layout }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.layout.contract_path(name)
    }
}

impl ContractCache for FsContractCache {
    fn load(&self, name: &str) -> Result<Option<Contract>> {
        let path = self.path(name);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::fs("read contract", &path)(e)),
        };

        let cached = CachedContract::from_json(&data).map_err(|e| Error::InvalidContract {
            plugin: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(Some(cached.into()))
    }

    fn store(&self, contract: &Contract) -> Result<()> {
        let dir = self.layout.contracts_dir();
        fs::create_dir_all(&dir).map_err(Error::fs("create directory", &dir))?;

        let path = self.path(&contract.name);
        let body = CachedContract::from(contract).to_json()?;
        fs::write(&path, body).map_err(Error::fs("write contract", &path))?;

        debug!("Cached contract {} {} at {}", contract.name, contract.version, path.display());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cached contract for {}", name);
                Ok(())
            }
            Err(e) => Err(Error::fs("remove contract", &path)(e)),
        }
    }

    fn list(&self) -> Result<Vec<Contract>> {
        let dir = self.layout.contracts_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::fs("read directory", &dir)(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(Error::fs("read directory", &dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CONTRACT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut contracts = Vec::with_capacity(names.len());
        for name in names {
            if let Some(contract) = self.load(&name)? {
                contracts.push(contract);
            }
        }
        Ok(contracts)
    }
}

// =============================================================================
// In-memory cache
// =============================================================================

/// Contract cache held in memory; keeps full contracts.
#[derive(Default)]
pub struct MemoryContractCache {
    contracts: Mutex<BTreeMap<String, Contract>>,
}

impl MemoryContractCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-populated with `contracts`.
    pub fn with_contracts(contracts: impl IntoIterator<Item = Contract>) -> Self {
        Self {
            contracts: Mutex::new(
                contracts
                    .into_iter()
                    .map(|c| (c.name.clone(), c))
                    .collect(),
            ),
        }
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Contract>>> {
        self.contracts
            .lock()
            .map_err(|_| Error::Internal("contract cache lock poisoned".to_string()))
    }
}

impl ContractCache for MemoryContractCache {
    fn load(&self, name: &str) -> Result<Option<Contract>> {
        Ok(self.map()?.get(name).cloned())
    }

    fn store(&self, contract: &Contract) -> Result<()> {
        self.map()?.insert(contract.name.clone(), contract.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.map()?.remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Contract>> {
        Ok(self.map()?.values().cloned().collect())
    }
}

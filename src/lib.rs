//! # ociplug
//!
//! **Plugin Manager Backed by an OCI Registry**
//!
//! Plugins are standalone executables published as OCI images. Each image
//! carries a JSON *contract* in the `plugin-contract` label describing the
//! plugin and what it requires. This crate resolves versions from registry
//! tags, validates requirements against what is already installed, and
//! installs the image's files into a per-major-version directory behind a
//! `current` symlink.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             ociplug                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                         Installer                           │    │
//! │  │   install_plugin · update · update_all · remove · list      │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │        │               │                │               │           │
//! │  ┌───────────┐  ┌──────────────┐  ┌───────────┐  ┌────────────┐     │
//! │  │  version  │  │ requirements │  │  extract  │  │    lock    │     │
//! │  │ tags→semver│ │ fwd + backward│ │ tar, path │  │ per major  │     │
//! │  │ constraints│ │   checks     │  │ confinement│ │  RAII guard│     │
//! │  └───────────┘  └──────────────┘  └───────────┘  └────────────┘     │
//! │        │               │                                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────┐      ┌─────────────────────────────┐  │
//! │  │  RegistryClient (trait)  │      │    ContractCache (trait)    │  │
//! │  │  OciRegistryClient       │      │    FsContractCache          │  │
//! │  │  list · label · layers   │      │    cache/contracts/*.json   │  │
//! │  └──────────────────────────┘      └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Install Lifecycle
//!
//! ```text
//!   tags ──► latest semver ──► contract label ──► requirements OK?
//!                                                    │        │
//!                                                   yes       no ──► repair deps
//!                                                    │               (optional)
//!                                                    ▼
//!                       .old backup ──► extract layers ──► swap `current`
//! ```
//!
//! # Security Model
//!
//! - **Path Traversal Protection**: plugin names are validated before they
//!   become path components, and every tar entry is confined to the version
//!   directory. Entries are never written through a symlink an earlier
//!   entry or layer planted (see [`extract::extract_tar`]).
//! - **Size Limits**: `MAX_LAYER_SIZE` (512 MiB) per compressed layer,
//!   `MAX_LAYERS` (128) per image, `MAX_EXTRACTED_SIZE` (2 GiB) of
//!   decompressed file contents per install.
//! - **Digest Verification**: every layer blob is hashed before extraction.
//! - **Timeouts**: registry calls bounded by `REGISTRY_TIMEOUT` (5 min).
//! - **Exclusive Installs**: one install per plugin major version at a time
//!   (see [`lock`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use ociplug::{InstallOptions, Installer, ManagerConfig, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> ociplug::Result<()> {
//!     let config = ManagerConfig::default()
//!         .with_registry(RegistryConfig::new("registry.example.com/plugins"));
//!     let installer = Installer::from_config(&config);
//!
//!     let installed = installer
//!         .install_plugin("demo", &InstallOptions::default())
//!         .await?;
//!     println!("{} {} -> {}", installed.name, installed.version, installed.binary.display());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod contract;
pub mod error;
pub mod extract;
pub mod installer;
pub mod layout;
pub mod lock;
pub mod registry;
pub mod requirements;
pub mod version;

// Re-exports
pub use cache::{ContractCache, FsContractCache, MemoryContractCache};
pub use config::{ManagerConfig, RegistryConfig};
pub use constants::*;
pub use contract::{CachedContract, Contract, PluginRequirement, Requirements};
pub use error::{Error, Result};
pub use installer::{InstallOptions, InstalledPlugin, Installer, PluginStatus};
pub use layout::{PluginLayout, validate_plugin_name};
pub use lock::{FileLockManager, LockGuard, LockManager, MemoryLockManager};
pub use registry::{LayerProgress, LayerStream, OciRegistryClient, RegistryClient};
pub use requirements::{FailedConstraints, RequirementValidator};
pub use version::{
    Constraint, TaggedVersion, filter_major_version, find_latest_version, parse_version,
};

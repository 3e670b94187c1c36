//! Manager configuration.
//!
//! The manager needs two things: a root directory owning the `plugins/` and
//! `cache/` trees, and the registry repository plugin images live under.
//! Plugin `name` at tag `tag` is addressed as `<repository>/<name>:<tag>`.

use crate::constants::{DEFAULT_ROOT_DIR, REGISTRY_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for an [`Installer`](crate::installer::Installer).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root directory holding `plugins/` and `cache/`.
    pub root: PathBuf,
    /// Registry access settings.
    pub registry: RegistryConfig,
}

impl ManagerConfig {
    /// Creates a configuration rooted at `root` with default registry settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: RegistryConfig::default(),
        }
    }

    /// Replaces the registry settings.
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Returns the default root directory.
    pub fn default_root() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(DEFAULT_ROOT_DIR)
        } else {
            PathBuf::from(DEFAULT_ROOT_DIR)
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

/// Registry access settings.
#[derive(Clone)]
pub struct RegistryConfig {
    /// Repository prefix, e.g. `registry.example.com/tools/plugins`.
    pub repository: String,
    /// Basic-auth username; anonymous when `None`.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Use plain HTTP instead of HTTPS.
    pub insecure: bool,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl RegistryConfig {
    /// Creates settings for `repository` with anonymous HTTPS access.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Sets basic-auth credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the image reference for `plugin` at `tag`.
    pub fn image_reference(&self, plugin: &str, tag: &str) -> String {
        format!("{}/{}:{}", self.repository, plugin, tag)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            username: None,
            password: None,
            insecure: false,
            timeout: REGISTRY_TIMEOUT,
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("repository", &self.repository)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("insecure", &self.insecure)
            .field("timeout", &self.timeout)
            .finish()
    }
}

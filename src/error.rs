//! Error types for the plugin manager.

use std::path::PathBuf;

/// Result type alias for plugin manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, installing or removing plugins.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Context
    // =========================================================================
    /// An operation on a named plugin failed.
    #[error("failed to {operation} plugin '{plugin}': {source}")]
    Plugin {
        operation: &'static str,
        plugin: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// No tag parsed as a semantic version (or none matched the filter).
    #[error("no versions found")]
    NoVersionsFound,

    /// A version string could not be parsed.
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// A requirement constraint could not be parsed.
    #[error("invalid constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    /// Plugin name is not usable as a path component.
    #[error("invalid plugin name '{name}': {reason}")]
    InvalidPluginName { name: String, reason: String },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    /// Registry call failed.
    #[error("registry {operation} failed for '{reference}': {reason}")]
    Registry {
        operation: &'static str,
        reference: String,
        reason: String,
    },

    /// Layer exceeds size or count limits.
    #[error("image exceeds limit: {size} > {limit}")]
    ImageTooLarge { size: u64, limit: u64 },

    /// Downloaded blob does not hash to its descriptor digest.
    #[error("digest mismatch for layer {digest}: computed {computed}")]
    DigestMismatch { digest: String, computed: String },

    /// Registry call timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    // =========================================================================
    // Lock Errors
    // =========================================================================
    /// Another install of the same plugin major version is in progress.
    #[error("plugin is locked by: {}", path.display())]
    PluginLocked { path: PathBuf },

    // =========================================================================
    // Contract Errors
    // =========================================================================
    /// The image carries no contract label.
    #[error("contract label '{label}' not found on {plugin}:{tag}")]
    ContractNotFound {
        plugin: String,
        tag: String,
        label: String,
    },

    /// The contract JSON is malformed or incomplete.
    #[error("invalid contract for '{plugin}': {reason}")]
    InvalidContract { plugin: String, reason: String },

    // =========================================================================
    // Requirement Errors
    // =========================================================================
    /// One or more plugin requirements are unmet and repair was not requested.
    #[error("requirements not satisfied for plugin '{plugin}'")]
    RequirementsNotSatisfied { plugin: String },

    /// Installing the candidate would break an installed plugin's requirement.
    #[error(
        "installed plugin '{dependent}' requires '{plugin}' {constraint}, \
         but version {version} would be installed"
    )]
    PluginConflict {
        plugin: String,
        version: String,
        dependent: String,
        constraint: String,
    },

    /// Dependency repair reached a plugin it is already repairing.
    #[error("dependency cycle between '{plugin}' and '{dependency}'")]
    DependencyCycle { plugin: String, dependency: String },

    // =========================================================================
    // Extraction Errors
    // =========================================================================
    /// Tar entry escapes the destination directory.
    #[error("path traversal detected in layer: {path}")]
    PathTraversal { path: String },

    /// Tar stream could not be read or unpacked.
    #[error("failed to extract layer entry '{path}': {reason}")]
    ExtractionFailed { path: String, reason: String },

    /// Image did not contain the plugin binary.
    #[error("plugin binary not found after extraction: {}", path.display())]
    BinaryNotFound { path: PathBuf },

    // =========================================================================
    // Filesystem Errors
    // =========================================================================
    /// Filesystem operation on a specific path failed.
    #[error("failed to {operation} {}: {source}", path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation not supported on this platform.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps this error with the operation and plugin it occurred in.
    pub fn for_plugin(self, operation: &'static str, plugin: impl Into<String>) -> Self {
        Self::Plugin {
            operation,
            plugin: plugin.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping [`Error::Plugin`] context layers.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Self::Plugin { source, .. } = current {
            current = source;
        }
        current
    }

    /// Builds a [`Error::Filesystem`] mapper for `map_err`.
    pub(crate) fn fs(
        operation: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Filesystem {
            operation,
            path,
            source,
        }
    }
}

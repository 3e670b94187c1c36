//! # Plugin Manager Constants
//!
//! Names, limits and timeouts shared by the installer, the registry client
//! and the on-disk layout. These constants are the single source of truth
//! for every path fragment the manager creates.
//!
//! ## Cross-References
//!
//! - [`crate::layout`]: builds all paths from the directory and suffix names
//! - [`crate::registry`]: enforces the layer limits and timeout
//! - [`crate::installer`]: reads the contract label

use std::time::Duration;

// =============================================================================
// Registry
// =============================================================================

/// Image label carrying the plugin contract as JSON.
pub const CONTRACT_LABEL: &str = "plugin-contract";

/// Timeout applied to every individual registry call.
///
/// The installer itself imposes no deadline; a stalled registry is bounded
/// here, at the transport.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum size of a single layer blob (512 MiB).
///
/// **Attack Vector**: a malicious registry could serve an unbounded blob.
pub const MAX_LAYER_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of layers in a plugin image.
pub const MAX_LAYERS: usize = 128;

/// Maximum total size of file contents extracted for one install (2 GiB).
///
/// **Attack Vector**: a small gzip layer can decompress to an unbounded
/// tar stream. [`MAX_LAYER_SIZE`] only bounds the compressed blob.
pub const MAX_EXTRACTED_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Prefix prepended to a semantic version to form an image tag.
pub const TAG_PREFIX: &str = "v";

// =============================================================================
// On-disk layout
// =============================================================================

/// Default root directory name under the user's home.
pub const DEFAULT_ROOT_DIR: &str = ".ociplug";

/// Directory holding one subdirectory per installed plugin.
pub const PLUGINS_DIR: &str = "plugins";

/// Cache directory (relative to the root).
pub const CACHE_DIR: &str = "cache";

/// Contract cache directory (relative to [`CACHE_DIR`]).
pub const CONTRACTS_DIR: &str = "contracts";

/// Name of the symlink selecting the active major version.
pub const CURRENT_LINK: &str = "current";

/// Extension of the transient per-install lock marker.
pub const LOCK_EXTENSION: &str = "lock";

/// Extension of the previous binary kept after an upgrade.
pub const OLD_EXTENSION: &str = "old";

/// Extension of cached contract files.
pub const CONTRACT_EXTENSION: &str = "json";

// =============================================================================
// Validation
// =============================================================================

/// Maximum plugin name length in bytes.
///
/// Plugin names become path components and image repository segments.
pub const MAX_PLUGIN_NAME_LEN: usize = 128;

/// Characters allowed in plugin names (besides ASCII alphanumerics).
pub const PLUGIN_NAME_EXTRA_CHARS: &str = "._-";

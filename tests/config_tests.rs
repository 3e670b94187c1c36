//! Tests for manager configuration and the on-disk layout.

use ociplug::layout::PluginLayout;
use ociplug::{
    DEFAULT_ROOT_DIR, Error, ManagerConfig, REGISTRY_TIMEOUT, RegistryConfig,
    validate_plugin_name,
};
use std::path::PathBuf;

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_default_root_under_home() {
    let root = ManagerConfig::default_root();
    assert!(root.ends_with(DEFAULT_ROOT_DIR));
    assert_eq!(ManagerConfig::default().root, root);
}

#[test]
fn test_registry_defaults() {
    let registry = RegistryConfig::new("registry.example.com/plugins");

    assert_eq!(registry.timeout, REGISTRY_TIMEOUT);
    assert!(!registry.insecure);
    assert!(registry.username.is_none());
    assert!(registry.password.is_none());
}

#[test]
fn test_registry_with_auth() {
    let config = ManagerConfig::new("/srv/tool").with_registry(
        RegistryConfig::new("registry.example.com/plugins").with_auth("ci", "s3cret"),
    );

    assert_eq!(config.root, PathBuf::from("/srv/tool"));
    assert_eq!(config.registry.username.as_deref(), Some("ci"));
    assert_eq!(
        config.registry.image_reference("demo", "v2.0.0"),
        "registry.example.com/plugins/demo:v2.0.0"
    );
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_layout_from_config_root() {
    let config = ManagerConfig::new("/srv/tool");
    let layout = PluginLayout::new(config.root.clone());

    assert_eq!(layout.plugins_dir(), PathBuf::from("/srv/tool/plugins"));
    assert_eq!(layout.contracts_dir(), PathBuf::from("/srv/tool/cache/contracts"));
    assert_eq!(
        layout.version_dir("demo", 3),
        PathBuf::from("/srv/tool/plugins/demo/v3")
    );
}

#[test]
fn test_invalid_plugin_name_error() {
    let err = validate_plugin_name("a/b").unwrap_err();
    assert!(matches!(err, Error::InvalidPluginName { .. }));
    assert!(err.to_string().contains("a/b"));
}

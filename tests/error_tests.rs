//! Tests for error rendering and wrapping.

use ociplug::Error;
use std::path::PathBuf;

#[test]
fn test_plugin_wrapper_renders_context() {
    let err = Error::NoVersionsFound.for_plugin("install", "demo");
    assert_eq!(err.to_string(), "failed to install plugin 'demo': no versions found");
}

#[test]
fn test_root_cause_unwraps_nested_context() {
    let err = Error::PluginLocked {
        path: PathBuf::from("/x/demo.lock"),
    }
    .for_plugin("install", "demo")
    .for_plugin("update", "demo");

    assert!(matches!(err.root_cause(), Error::PluginLocked { .. }));
    assert!(err.to_string().contains("plugin is locked by: /x/demo.lock"));
}

#[test]
fn test_conflict_message() {
    let err = Error::PluginConflict {
        plugin: "b".to_string(),
        version: "2.0.0".to_string(),
        dependent: "a".to_string(),
        constraint: "^1.0.0".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("'b'"));
    assert!(message.contains("'a'"));
    assert!(message.contains("^1.0.0"));
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("denied"));
}

#[test]
fn test_errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync + 'static>() {}
    assert_send_sync::<Error>();
}

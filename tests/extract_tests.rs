//! Tests for tar layer extraction.
//!
//! Includes security tests for:
//! - Path traversal via `..`
//! - Writes through symlinks planted by earlier entries
//! - Hard-link sources outside the destination
//! - Decompressed size limits

mod common;

use common::{link_layer, raw_name_layer, symlink_then_file_layer, tar_layer};
use ociplug::Error;
use ociplug::extract::{SizeBudget, extract_tar, extract_tar_with_budget};
use std::io::Cursor;
use tempfile::TempDir;

// =============================================================================
// Regular Extraction Tests
// =============================================================================

#[test]
fn test_extract_files_and_directories() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&dest).unwrap();

    let layer = tar_layer(&[
        ("demo", b"#!/bin/sh\necho demo", 0o755),
        ("share/doc/README", b"docs", 0o644),
    ]);
    let written = extract_tar(Cursor::new(layer), &dest).unwrap();

    assert_eq!(written, 2);
    assert_eq!(std::fs::read_to_string(dest.join("share/doc/README")).unwrap(), "docs");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dest.join("demo")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[test]
fn test_extract_overwrites_existing_file() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path();
    std::fs::write(dest.join("demo"), "a much longer previous binary").unwrap();

    extract_tar(Cursor::new(tar_layer(&[("demo", b"new", 0o755)])), dest).unwrap();
    assert_eq!(std::fs::read_to_string(dest.join("demo")).unwrap(), "new");
}

#[test]
fn test_extract_normalizes_inner_parent_components() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("root");
    std::fs::create_dir_all(&dest).unwrap();

    extract_tar(Cursor::new(raw_name_layer("bin/../demo", b"x")), &dest).unwrap();
    assert!(dest.join("demo").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_symlink_and_hard_link() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path();

    extract_tar(Cursor::new(tar_layer(&[("demo", b"bin", 0o755)])), dest).unwrap();
    extract_tar(
        Cursor::new(link_layer(tar::EntryType::Symlink, "alias", "demo")),
        dest,
    )
    .unwrap();
    extract_tar(
        Cursor::new(link_layer(tar::EntryType::Link, "copy", "demo")),
        dest,
    )
    .unwrap();

    assert_eq!(
        std::fs::read_link(dest.join("alias")).unwrap(),
        std::path::PathBuf::from("demo")
    );
    assert_eq!(std::fs::read_to_string(dest.join("copy")).unwrap(), "bin");
}

// =============================================================================
// Path Traversal Tests
// =============================================================================

#[test]
fn test_extract_rejects_parent_traversal() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("plugins/demo/v1");
    std::fs::create_dir_all(&dest).unwrap();

    let err = extract_tar(Cursor::new(raw_name_layer("../../etc/passwd", b"root")), &dest)
        .unwrap_err();

    assert!(matches!(err, Error::PathTraversal { .. }));
    assert!(!temp.path().join("plugins/etc/passwd").exists());
    assert!(!temp.path().join("etc/passwd").exists());
    assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
}

#[test]
fn test_extract_strips_absolute_name() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&dest).unwrap();

    extract_tar(Cursor::new(raw_name_layer("/tmp/evil", b"x")), &dest).unwrap();

    assert_eq!(std::fs::read_to_string(dest.join("tmp/evil")).unwrap(), "x");
    assert!(!temp.path().join("tmp/evil").exists());
}

#[test]
fn test_extract_rejects_hard_link_outside_destination() {
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&dest).unwrap();

    let err = extract_tar(
        Cursor::new(link_layer(tar::EntryType::Link, "shadow", "../../../etc/shadow")),
        &dest,
    )
    .unwrap_err();
    assert!(matches!(err, Error::PathTraversal { .. }));
    assert!(!dest.join("shadow").exists());
}

// =============================================================================
// Symlink Escape Tests
// =============================================================================

#[cfg(unix)]
#[test]
fn test_extract_refuses_write_through_planted_symlink() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside");
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::create_dir_all(&dest).unwrap();

    let layer = symlink_then_file_layer("evil", outside.to_str().unwrap(), "evil/pwned", b"owned");
    let err = extract_tar(Cursor::new(layer), &dest).unwrap_err();

    assert!(matches!(err, Error::PathTraversal { .. }));
    assert!(!outside.join("pwned").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_refuses_symlink_planted_by_earlier_layer() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside");
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::create_dir_all(&dest).unwrap();

    extract_tar(
        Cursor::new(link_layer(tar::EntryType::Symlink, "lib", outside.to_str().unwrap())),
        &dest,
    )
    .unwrap();
    let err = extract_tar(Cursor::new(tar_layer(&[("lib/nested/pwned", b"x", 0o644)])), &dest)
        .unwrap_err();

    assert!(matches!(err, Error::PathTraversal { .. }));
    assert!(!outside.join("nested").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_replaces_symlink_at_file_path() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("victim");
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(&outside, "original").unwrap();

    extract_tar(
        Cursor::new(link_layer(tar::EntryType::Symlink, "demo", outside.to_str().unwrap())),
        &dest,
    )
    .unwrap();
    extract_tar(Cursor::new(tar_layer(&[("demo", b"new", 0o755)])), &dest).unwrap();

    assert_eq!(std::fs::read_to_string(&outside).unwrap(), "original");
    let meta = std::fs::symlink_metadata(dest.join("demo")).unwrap();
    assert!(meta.file_type().is_file());
    assert_eq!(std::fs::read_to_string(dest.join("demo")).unwrap(), "new");
}

#[cfg(unix)]
#[test]
fn test_extract_rejects_hard_link_through_symlink() {
    let temp = TempDir::new().unwrap();
    let outside = temp.path().join("outside");
    let dest = temp.path().join("v1");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(outside.join("secret"), "s3cret").unwrap();

    extract_tar(
        Cursor::new(link_layer(tar::EntryType::Symlink, "lib", outside.to_str().unwrap())),
        &dest,
    )
    .unwrap();
    let err = extract_tar(
        Cursor::new(link_layer(tar::EntryType::Link, "copy", "lib/secret")),
        &dest,
    )
    .unwrap_err();

    assert!(matches!(err, Error::PathTraversal { .. }));
    assert!(!dest.join("copy").exists());
}

// =============================================================================
// Size Limit Tests
// =============================================================================

#[test]
fn test_extract_rejects_oversized_contents() {
    let temp = TempDir::new().unwrap();
    let mut budget = SizeBudget::new(10);

    let err = extract_tar_with_budget(
        Cursor::new(tar_layer(&[("demo", &[0u8; 16], 0o755)])),
        temp.path(),
        &mut budget,
    )
    .unwrap_err();

    assert!(matches!(err, Error::ImageTooLarge { size: 16, limit: 10 }));
    assert!(!temp.path().join("demo").exists());
}

#[test]
fn test_extract_budget_spans_layers() {
    let temp = TempDir::new().unwrap();
    let mut budget = SizeBudget::new(10);

    extract_tar_with_budget(
        Cursor::new(tar_layer(&[("a", &[1u8; 6], 0o644)])),
        temp.path(),
        &mut budget,
    )
    .unwrap();
    assert_eq!(budget.used(), 6);

    let err = extract_tar_with_budget(
        Cursor::new(tar_layer(&[("b", &[2u8; 6], 0o644)])),
        temp.path(),
        &mut budget,
    )
    .unwrap_err();

    assert!(matches!(err, Error::ImageTooLarge { size: 12, limit: 10 }));
    assert!(temp.path().join("a").exists());
    assert!(!temp.path().join("b").exists());
}

#[test]
fn test_extract_rejects_garbage_stream() {
    let temp = TempDir::new().unwrap();
    let garbage = vec![0xffu8; 1024];
    assert!(extract_tar(Cursor::new(garbage), temp.path()).is_err());
}

//! # Layer Extraction
//!
//! Unpacks an uncompressed tar layer into a destination directory.
//!
//! ## Security
//!
//! Every entry name is resolved lexically against the destination before
//! anything touches the disk. Leading `/` is stripped, so `/bin/demo` lands
//! at `destination/bin/demo`. A name whose `..` components climb above the
//! destination aborts the whole extraction with [`Error::PathTraversal`].
//! Hard-link sources are resolved under the destination with the same check.
//!
//! A lexical check alone is not enough: a layer can plant `lib -> /etc` and
//! then write `lib/passwd`. Before writing, every directory between the
//! destination and the entry is inspected, and an existing symlink there is
//! also [`Error::PathTraversal`]. A symlink at the entry's own path is
//! replaced, never written through.
//!
//! Symlink *targets* are written as-is. A layer may still plant a link
//! pointing outside the destination for later consumers to follow.
//!
//! ## Size Limit
//!
//! File contents are charged against a [`SizeBudget`], shared across all
//! layers of one install (default [`MAX_EXTRACTED_SIZE`]). Exceeding it
//! fails with [`Error::ImageTooLarge`] before the offending file is opened.
//!
//! ## Entry Types
//!
//! | Type | Action |
//! |------|--------|
//! | directory | `create_dir_all` + entry mode |
//! | regular file | create/truncate with entry mode, copy exactly `size` bytes |
//! | symlink | replace any existing path, link to the entry's link name |
//! | hard link | replace any existing path, link to `destination/<link name>` |
//! | anything else | skipped with a warning |

use crate::constants::MAX_EXTRACTED_SIZE;
use crate::error::{Error, Result};
use std::fs;
use std::io::{self, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, warn};

/// Running total of extracted file bytes against a fixed limit.
#[derive(Debug, Clone, Copy)]
pub struct SizeBudget {
    limit: u64,
    used: u64,
}

impl SizeBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Bytes charged so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    fn charge(&mut self, size: u64) -> Result<()> {
        let total = self.used.saturating_add(size);
        if total > self.limit {
            return Err(Error::ImageTooLarge {
                size: total,
                limit: self.limit,
            });
        }
        self.used = total;
        Ok(())
    }
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self::new(MAX_EXTRACTED_SIZE)
    }
}

/// Extracts every entry of the tar `stream` under `destination`.
///
/// Returns the number of entries written. Entries already written when an
/// error occurs are left in place.
pub fn extract_tar<R: Read>(stream: R, destination: &Path) -> Result<usize> {
    extract_tar_with_budget(stream, destination, &mut SizeBudget::default())
}

/// Like [`extract_tar`], charging file contents against `budget`.
///
/// Pass the same budget for every layer of an image to bound the whole
/// install.
pub fn extract_tar_with_budget<R: Read>(
    stream: R,
    destination: &Path,
    budget: &mut SizeBudget,
) -> Result<usize> {
    let mut archive = Archive::new(stream);
    let entries = archive.entries().map_err(|e| Error::ExtractionFailed {
        path: destination.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut written = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ExtractionFailed {
            path: destination.display().to_string(),
            reason: e.to_string(),
        })?;

        let name = entry
            .path()
            .map_err(|e| Error::ExtractionFailed {
                path: destination.display().to_string(),
                reason: e.to_string(),
            })?
            .into_owned();
        let relative = confine(&name)?;
        let target = destination.join(&relative);
        let mode = entry.header().mode().unwrap_or(0o644);
        let entry_type = entry.header().entry_type();

        // Only a directory entry may name the destination itself.
        if relative.as_os_str().is_empty() && entry_type != EntryType::Directory {
            return Err(Error::PathTraversal {
                path: name.display().to_string(),
            });
        }

        reject_symlinked_parents(destination, &relative, &name)?;

        match entry_type {
            EntryType::Directory => {
                if !relative.as_os_str().is_empty() && is_symlink(&target)? {
                    remove_existing(&target)?;
                }
                fs::create_dir_all(&target).map_err(Error::fs("create directory", &target))?;
                set_mode(&target, mode)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                budget.charge(entry.size())?;
                ensure_parent(&target)?;
                if is_symlink(&target)? {
                    remove_existing(&target)?;
                }
                write_file(&mut entry, &target, mode)?;
            }
            EntryType::Symlink => {
                let link = link_name(&entry, &name)?;
                ensure_parent(&target)?;
                remove_existing(&target)?;
                create_symlink(&link, &target)?;
            }
            EntryType::Link => {
                let link = link_name(&entry, &name)?;
                let source_relative = confine(&link)?;
                reject_symlinked_parents(destination, &source_relative, &link)?;
                let source = destination.join(source_relative);
                ensure_parent(&target)?;
                remove_existing(&target)?;
                fs::hard_link(&source, &target).map_err(Error::fs("hard link", &target))?;
            }
            other => {
                warn!("Skipping unsupported tar entry {} ({:?})", name.display(), other);
                continue;
            }
        }

        debug!("Extracted {}", relative.display());
        written += 1;
    }

    Ok(written)
}

/// Resolves `name` to a path that stays inside the destination.
///
/// The result is relative and free of `.`/`..`; it is empty for the
/// destination itself (`./`). A leading root is dropped.
fn confine(name: &Path) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        path: name.display().to_string(),
    };

    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok(relative)
}

/// Fails if a directory between `destination` and `relative` is a symlink.
///
/// The final component is not checked; callers replace it.
fn reject_symlinked_parents(destination: &Path, relative: &Path, name: &Path) -> Result<()> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };

    let mut current = destination.to_path_buf();
    for component in parent.components() {
        current.push(component);
        if is_symlink(&current)? {
            return Err(Error::PathTraversal {
                path: name.display().to_string(),
            });
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.file_type().is_symlink()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::fs("inspect", path)(e)),
    }
}

fn link_name<R: Read>(entry: &tar::Entry<'_, R>, name: &Path) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|e| Error::ExtractionFailed {
            path: name.display().to_string(),
            reason: e.to_string(),
        })?
        .map(|link| link.into_owned())
        .ok_or_else(|| Error::ExtractionFailed {
            path: name.display().to_string(),
            reason: "link entry without link name".to_string(),
        })
}

fn ensure_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(Error::fs("create directory", parent))?;
    }
    Ok(())
}

fn write_file<R: Read>(entry: &mut tar::Entry<'_, R>, target: &Path, mode: u32) -> Result<()> {
    let expected = entry.size();
    let mut file = open_truncate(target, mode)?;
    let copied = io::copy(entry, &mut file).map_err(Error::fs("write", target))?;

    if copied != expected {
        return Err(Error::ExtractionFailed {
            path: target.display().to_string(),
            reason: format!("short read: {} of {} bytes", copied, expected),
        });
    }
    // An existing file keeps its old mode through truncate.
    set_mode(target, mode)
}

fn remove_existing(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(target).map_err(Error::fs("remove", target))
        }
        Ok(_) => fs::remove_file(target).map_err(Error::fs("remove", target)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs("inspect", target)(e)),
    }
}

#[cfg(unix)]
fn open_truncate(target: &Path, mode: u32) -> Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(target)
        .map_err(Error::fs("create file", target))
}

#[cfg(not(unix))]
fn open_truncate(target: &Path, _mode: u32) -> Result<fs::File> {
    fs::File::create(target).map_err(Error::fs("create file", target))
}

#[cfg(unix)]
fn set_mode(target: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(Error::fs("set permissions on", target))
}

#[cfg(not(unix))]
fn set_mode(_target: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Creates a symlink at `link` pointing to `original`.
#[cfg(unix)]
pub(crate) fn create_symlink(original: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(original, link).map_err(Error::fs("create symlink", link))
}

#[cfg(not(unix))]
pub(crate) fn create_symlink(_original: &Path, link: &Path) -> Result<()> {
    Err(Error::NotSupported(format!(
        "symlinks are not supported on this platform: {}",
        link.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confine_accepts_nested_paths() {
        assert_eq!(confine(Path::new("bin/demo")).unwrap(), PathBuf::from("bin/demo"));
        assert_eq!(confine(Path::new("./bin/./demo")).unwrap(), PathBuf::from("bin/demo"));
        assert_eq!(confine(Path::new("a/../b")).unwrap(), PathBuf::from("b"));
        assert_eq!(confine(Path::new("./")).unwrap(), PathBuf::new());
    }

    #[test]
    fn test_confine_strips_root() {
        assert_eq!(confine(Path::new("/etc/passwd")).unwrap(), PathBuf::from("etc/passwd"));
        assert_eq!(confine(Path::new("/")).unwrap(), PathBuf::new());
        assert!(matches!(
            confine(Path::new("/../x")),
            Err(Error::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_size_budget_accumulates() {
        let mut budget = SizeBudget::new(10);
        budget.charge(6).unwrap();
        budget.charge(4).unwrap();
        assert_eq!(budget.used(), 10);
        assert!(matches!(
            budget.charge(1),
            Err(Error::ImageTooLarge { size: 11, limit: 10 })
        ));
        assert_eq!(budget.used(), 10);
    }

    #[test]
    fn test_confine_rejects_escapes() {
        for bad in [
            "../../etc/passwd",
            "..",
            "a/../../b",
            "./../x",
            "foo/./../../etc",
        ] {
            assert!(
                matches!(confine(Path::new(bad)), Err(Error::PathTraversal { .. })),
                "'{}' should be rejected",
                bad
            );
        }
    }
}

//! # Version Resolution
//!
//! Turns registry tags into a single semantic version.
//!
//! ## Tag Parsing
//!
//! Tags are parsed leniently, the way plugin publishers actually tag images:
//!
//! | Tag | Parsed |
//! |-----|--------|
//! | `v1.2.3` | `1.2.3` |
//! | `1.2.3-rc.1` | `1.2.3-rc.1` |
//! | `v1.2` | `1.2.0` |
//! | `2` | `2.0.0` |
//! | `latest`, `bad-tag` | skipped |
//!
//! Tags that do not parse are never candidates. They are logged at `warn`
//! and otherwise ignored, so "no releases" and "only malformed tags" both
//! surface as [`Error::NoVersionsFound`].
//!
//! ## Constraints
//!
//! [`Constraint`] accepts the range syntax plugin contracts use: comma- or
//! space-separated comparators (`>= 1.0.0, < 2.0.0`, `>=1.0 <2.0`), caret
//! and tilde ranges, wildcards, `v`-prefixed versions, and `||` alternatives.

use crate::constants::TAG_PREFIX;
use crate::error::{Error, Result};
use crate::registry::RegistryClient;
use semver::{Version, VersionReq};
use tracing::{debug, info, warn};

/// Parses a tag or contract version into a semantic version.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    match Version::parse(bare) {
        Ok(version) => Ok(version),
        Err(e) => coerce_partial(bare).ok_or_else(|| Error::InvalidVersion {
            version: input.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Pads `1` / `1.2` (with optional pre-release/build suffix) to three parts.
fn coerce_partial(bare: &str) -> Option<Version> {
    let split = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();

    if parts.len() >= 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).ok()
}

/// Returns the image tag for a version (`1.2.0` -> `v1.2.0`).
pub fn version_tag(version: &Version) -> String {
    format!("{}{}", TAG_PREFIX, version)
}

/// A registry tag and the version it parses to.
///
/// Publishers tag inconsistently (`v1.2.0`, `1.2.0`, `1.2`), so the tag an
/// image was found under is kept alongside the version instead of being
/// rebuilt from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedVersion {
    pub version: Version,
    pub tag: String,
}

/// Picks the greatest semantic version among `tags`.
///
/// Unparseable tags are skipped. Fails with [`Error::NoVersionsFound`] when
/// nothing parses.
pub fn find_latest_version<S: AsRef<str>>(tags: &[S]) -> Result<Version> {
    find_latest_tag(tags).map(|latest| latest.version)
}

/// Like [`find_latest_version`], but also returns the tag it came from.
///
/// When two tags parse to the same version the first one listed wins.
pub fn find_latest_tag<S: AsRef<str>>(tags: &[S]) -> Result<TaggedVersion> {
    let mut latest: Option<TaggedVersion> = None;
    for (tag, version) in parsed_tags(tags) {
        if latest.as_ref().is_none_or(|l| version > l.version) {
            latest = Some(TaggedVersion {
                version,
                tag: tag.to_string(),
            });
        }
    }
    latest.ok_or(Error::NoVersionsFound)
}

/// Returns the first tag in `tags` that parses to `version`.
pub fn find_tag_for<S: AsRef<str>>(tags: &[S], version: &Version) -> Option<String> {
    parsed_tags(tags)
        .find(|(_, parsed)| parsed == version)
        .map(|(tag, _)| tag.to_string())
}

/// Keeps only tags whose major version equals `major`.
///
/// Unparseable tags are dropped. Fails with [`Error::NoVersionsFound`] when
/// the filtered set is empty.
pub fn filter_major_version<S: AsRef<str>>(tags: &[S], major: u64) -> Result<Vec<String>> {
    let filtered: Vec<String> = tags
        .iter()
        .map(AsRef::as_ref)
        .filter(|tag| parse_version(tag).is_ok_and(|v| v.major == major))
        .map(str::to_string)
        .collect();

    if filtered.is_empty() {
        return Err(Error::NoVersionsFound);
    }
    Ok(filtered)
}

/// Returns every parseable version in `tags`, newest first, without duplicates.
pub fn sorted_versions<S: AsRef<str>>(tags: &[S]) -> Vec<Version> {
    let mut versions: Vec<Version> = parsed_versions(tags).collect();
    versions.sort_unstable_by(|a, b| b.cmp(a));
    versions.dedup();
    versions
}

fn parsed_versions<S: AsRef<str>>(tags: &[S]) -> impl Iterator<Item = Version> + '_ {
    parsed_tags(tags).map(|(_, version)| version)
}

fn parsed_tags<S: AsRef<str>>(tags: &[S]) -> impl Iterator<Item = (&str, Version)> + '_ {
    tags.iter().filter_map(|tag| {
        let tag = tag.as_ref();
        match parse_version(tag) {
            Ok(version) => Some((tag, version)),
            Err(e) => {
                warn!("Skipping tag '{}': {}", tag, e);
                None
            }
        }
    })
}

/// Lists the plugin's tags and returns the latest version, optionally
/// restricted to one major version.
pub async fn fetch_latest_version(
    registry: &dyn RegistryClient,
    plugin: &str,
    major: Option<u64>,
) -> Result<Version> {
    fetch_latest_tag(registry, plugin, major)
        .await
        .map(|latest| latest.version)
}

/// Like [`fetch_latest_version`], but keeps the tag the version was found
/// under so the image can be pulled by it.
pub async fn fetch_latest_tag(
    registry: &dyn RegistryClient,
    plugin: &str,
    major: Option<u64>,
) -> Result<TaggedVersion> {
    let tags = registry
        .list_tags(plugin)
        .await
        .map_err(|e| e.for_plugin("list tags of", plugin))?;
    debug!("Plugin {} has {} tags", plugin, tags.len());

    let latest = match major {
        Some(major) => find_latest_tag(&filter_major_version(&tags, major)?)?,
        None => find_latest_tag(&tags)?,
    };

    info!(
        "Resolved {} to version {} (tag {})",
        plugin, latest.version, latest.tag
    );
    Ok(latest)
}

// =============================================================================
// Constraints
// =============================================================================

/// A semver range, possibly a disjunction of ranges.
#[derive(Debug, Clone)]
pub struct Constraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    /// Parses a constraint string.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let invalid = |reason: String| Error::InvalidConstraint {
            constraint: input.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("empty constraint".to_string()));
        }

        let alternatives = raw
            .split("||")
            .map(|alt| {
                let normalized = normalize_comparators(alt);
                if normalized.is_empty() {
                    return Err(invalid("empty alternative".to_string()));
                }
                VersionReq::parse(&normalized).map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// Returns true if `version` satisfies any alternative.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Returns the constraint as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Constraint {}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

const OPERATOR_CHARS: &str = "=<>~^";

/// Rewrites `>= v1.0 <2` into the comma-joined form `semver` expects.
///
/// A bare version (`1.2.0`) means exactly that version, not the caret range
/// `semver` would otherwise read it as.
fn normalize_comparators(alternative: &str) -> String {
    let mut comparators = Vec::new();
    let mut pending_op = String::new();

    for token in alternative.split([',', ' ', '\t']).filter(|t| !t.is_empty()) {
        if token.chars().all(|c| OPERATOR_CHARS.contains(c)) {
            pending_op.push_str(token);
            continue;
        }

        let op_len = token
            .find(|c: char| !OPERATOR_CHARS.contains(c))
            .unwrap_or(token.len());
        let (op, operand) = token.split_at(op_len);
        let operand = match operand.strip_prefix(['v', 'V']) {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
            _ => operand,
        };

        let mut op = format!("{}{}", std::mem::take(&mut pending_op), op);
        if op.is_empty() && is_exact_operand(operand) {
            op.push('=');
        }
        comparators.push(format!("{}{}", op, operand));
    }

    comparators.join(", ")
}

/// True for a bare numeric version without wildcard parts.
fn is_exact_operand(operand: &str) -> bool {
    operand.starts_with(|c: char| c.is_ascii_digit())
        && !operand
            .split('.')
            .any(|part| matches!(part, "*" | "x" | "X"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_forms() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("V2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(
            parse_version("v1.2-rc.1").unwrap(),
            Version::parse("1.2.0-rc.1").unwrap()
        );
        assert!(parse_version("bad-tag").is_err());
        assert!(parse_version("latest").is_err());
        assert!(parse_version("").is_err());
    }

    #[test]
    fn test_normalize_comparators() {
        assert_eq!(normalize_comparators(">= 1.0.0 < 2.0.0"), ">=1.0.0, <2.0.0");
        assert_eq!(normalize_comparators(">=v1.0,<2"), ">=1.0, <2");
        assert_eq!(normalize_comparators("^1.2"), "^1.2");
    }

    #[test]
    fn test_normalize_bare_version_is_exact() {
        assert_eq!(normalize_comparators("1.2.0"), "=1.2.0");
        assert_eq!(normalize_comparators("v2"), "=2");
        assert_eq!(normalize_comparators(">= 1.0 1.5.0"), ">=1.0, =1.5.0");
        assert_eq!(normalize_comparators("1.x"), "1.x");
        assert_eq!(normalize_comparators("1.2.*"), "1.2.*");
        assert_eq!(normalize_comparators("*"), "*");
    }

    #[test]
    fn test_version_tag() {
        assert_eq!(version_tag(&Version::new(1, 2, 0)), "v1.2.0");
    }
}

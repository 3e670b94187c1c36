//! # Requirement Validation
//!
//! Before a candidate plugin is installed, two independent checks run
//! against the contracts of already-installed plugins:
//!
//! 1. **Forward check** ([`RequirementValidator::validate_plugin_requirements`]):
//!    is every plugin the candidate requires installed, at a satisfying
//!    version? Gaps are collected into [`FailedConstraints`] and can be
//!    repaired by installing the dependencies.
//! 2. **Backward check** ([`RequirementValidator::validate_plugin_conflicts`]):
//!    would the candidate's version break an installed plugin that requires
//!    it? An installed plugin cannot be relaxed retroactively, so this is
//!    fatal and never repairable.
//!
//! ## Unknown Requirements
//!
//! Contracts reloaded from the on-disk cache do not carry their plugin
//! requirements (`requirements.plugins == None`). The backward check cannot
//! see those plugins' constraints and logs them at `debug`.
//!
//! ## Module Requirements
//!
//! [`RequirementValidator::validate_module_requirements`] is an extension
//! point with no behavior: module requirements are accepted as declared.

use crate::cache::ContractCache;
use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::version::{Constraint, parse_version};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Unmet plugin dependencies of a candidate.
///
/// `None` means the dependency is not installed; `Some` carries the
/// constraint the installed version fails.
pub type FailedConstraints = BTreeMap<String, Option<Constraint>>;

/// Validates candidate contracts against installed contracts.
pub struct RequirementValidator<'a> {
    installed: &'a dyn ContractCache,
}

impl<'a> RequirementValidator<'a> {
    /// Creates a validator reading installed contracts from `installed`.
    pub fn new(installed: &'a dyn ContractCache) -> Self {
        Self { installed }
    }

    /// Runs all checks. A backward conflict is returned as an error; forward
    /// gaps are returned for the caller to repair or reject.
    pub fn validate(&self, candidate: &Contract) -> Result<FailedConstraints> {
        let failed = self.validate_plugin_requirements(candidate)?;
        self.validate_plugin_conflicts(candidate)?;
        self.validate_module_requirements(candidate)?;
        Ok(failed)
    }

    /// Forward check: the candidate's plugin requirements against what is
    /// installed.
    pub fn validate_plugin_requirements(&self, candidate: &Contract) -> Result<FailedConstraints> {
        let mut failed = FailedConstraints::new();

        for requirement in candidate.plugin_requirements() {
            let Some(installed) = self.installed.load(&requirement.name)? else {
                warn!(
                    "{} requires plugin {}, which is not installed",
                    candidate.name, requirement.name
                );
                failed.insert(requirement.name.clone(), None);
                continue;
            };

            // Presence alone satisfies an empty constraint.
            if requirement.constraint.trim().is_empty() {
                continue;
            }

            let constraint = Constraint::parse(&requirement.constraint)?;
            let version = parse_version(&installed.version)?;
            if !constraint.matches(&version) {
                warn!(
                    "{} requires plugin {} {}, but {} is installed",
                    candidate.name, requirement.name, constraint, version
                );
                failed.insert(requirement.name.clone(), Some(constraint));
            }
        }

        Ok(failed)
    }

    /// Backward check: installed plugins' requirements on the candidate
    /// against the candidate's own version.
    pub fn validate_plugin_conflicts(&self, candidate: &Contract) -> Result<()> {
        let version = candidate.parsed_version()?;

        for installed in self.installed.list()? {
            if installed.name == candidate.name {
                continue;
            }
            let Some(requirements) = installed.requirements.plugins.as_deref() else {
                debug!(
                    "Plugin requirements of installed {} are unknown; skipping conflict check",
                    installed.name
                );
                continue;
            };

            for requirement in requirements.iter().filter(|r| r.name == candidate.name) {
                if requirement.constraint.trim().is_empty() {
                    continue;
                }
                let constraint = Constraint::parse(&requirement.constraint)?;
                if !constraint.matches(&version) {
                    return Err(Error::PluginConflict {
                        plugin: candidate.name.clone(),
                        version: version.to_string(),
                        dependent: installed.name.clone(),
                        constraint: constraint.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Module requirements are not validated.
    pub fn validate_module_requirements(&self, candidate: &Contract) -> Result<()> {
        if !candidate.requirements.modules.is_empty() {
            debug!(
                "{} declares {} module requirements; not validated",
                candidate.name,
                candidate.requirements.modules.len()
            );
        }
        Ok(())
    }
}

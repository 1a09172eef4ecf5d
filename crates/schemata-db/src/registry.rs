use std::collections::BTreeMap;
use std::fmt;

use schemata_common::{Error, Result};

use crate::step::{FnStep, MigrationContext, MigrationStep, MigrationVersion};

const MAX_NAME_LEN: usize = 255;

/// A step together with the version and name it is recorded under.
pub struct RegisteredStep {
    pub version: MigrationVersion,
    pub name: String,
    pub step: Box<dyn MigrationStep>,
}

impl fmt::Debug for RegisteredStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredStep")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Immutable, version-ordered set of migration steps.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    steps: Vec<RegisteredStep>,
}

impl MigrationRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Steps in ascending version order.
    pub fn steps(&self) -> &[RegisteredStep] {
        &self.steps
    }

    pub fn get(&self, version: MigrationVersion) -> Option<&RegisteredStep> {
        self.steps
            .binary_search_by_key(&version, |s| s.version)
            .ok()
            .map(|i| &self.steps[i])
    }

    pub fn contains(&self, version: MigrationVersion) -> bool {
        self.get(version).is_some()
    }

    pub fn latest_version(&self) -> Option<MigrationVersion> {
        self.steps.last().map(|s| s.version)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    steps: Vec<RegisteredStep>,
}

impl RegistryBuilder {
    pub fn add(
        mut self,
        version: impl Into<MigrationVersion>,
        name: impl Into<String>,
        step: impl MigrationStep + 'static,
    ) -> Self {
        self.steps.push(RegisteredStep {
            version: version.into(),
            name: name.into(),
            step: Box::new(step),
        });
        self
    }

    /// Register a closure as a step.
    pub fn add_fn<F>(self, version: impl Into<MigrationVersion>, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add(version, name, FnStep(f))
    }

    /// Validate versions and names, then sort by version.
    pub fn build(self) -> Result<MigrationRegistry> {
        let mut by_version: BTreeMap<MigrationVersion, RegisteredStep> = BTreeMap::new();
        for step in self.steps {
            if step.version.as_u64() == 0 {
                return Err(Error::Validation(format!(
                    "migration {} must have a version greater than 0",
                    step.name
                )));
            }
            if step.name.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "migration {} has an empty name",
                    step.version
                )));
            }
            if step.name.chars().count() > MAX_NAME_LEN {
                return Err(Error::Validation(format!(
                    "migration {} name exceeds {MAX_NAME_LEN} characters",
                    step.version
                )));
            }
            if let Some(existing) = by_version.get(&step.version) {
                return Err(Error::Validation(format!(
                    "version {} registered twice ({} and {})",
                    step.version, existing.name, step.name
                )));
            }
            by_version.insert(step.version, step);
        }
        Ok(MigrationRegistry {
            steps: by_version.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut MigrationContext<'_>) -> Result<()> {
        Ok(())
    }

    #[test]
    fn build_sorts_by_version() {
        let registry = MigrationRegistry::builder()
            .add_fn(30u64, "c", noop)
            .add_fn(10u64, "a", noop)
            .add_fn(20u64, "b", noop)
            .build()
            .unwrap();

        let names: Vec<&str> = registry.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.latest_version(), Some(MigrationVersion(30)));
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(MigrationVersion(20)));
        assert!(registry.get(MigrationVersion(15)).is_none());
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let err = MigrationRegistry::builder()
            .add_fn(1u64, "first", noop)
            .add_fn(1u64, "again", noop)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn zero_version_and_blank_name_are_rejected() {
        assert!(MigrationRegistry::builder().add_fn(0u64, "zero", noop).build().is_err());
        assert!(MigrationRegistry::builder().add_fn(1u64, "  ", noop).build().is_err());
        let long = "x".repeat(256);
        assert!(MigrationRegistry::builder().add_fn(1u64, long, noop).build().is_err());
    }

    #[test]
    fn empty_registry() {
        let registry = MigrationRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.latest_version(), None);
    }
}

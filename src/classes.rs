//! Class registry.
//!
//! The registry is the fixed catalog of labels the detector may emit,
//! partitioned into three disjoint groups:
//! - equipment: PPE items that are present (`Hardhat`, `Safety Vest`, ...)
//! - missing: the negated counterparts, named with a `NO-` prefix
//! - other: everything else the model knows (`Person`, `Ladder`, ...)
//!
//! Indices used for operator selection are 1-based and follow the order
//! equipment, missing, other. A label outside the registry is an error, not
//! something to skip: it means the model and the catalog have drifted apart.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Result};

use crate::error::AccessError;

const DEFAULT_EQUIPMENT: &[&str] = &["Gloves", "Goggles", "Hardhat", "Mask", "Safety Vest"];
const DEFAULT_MISSING: &[&str] = &[
    "NO-Gloves",
    "NO-Goggles",
    "NO-Hardhat",
    "NO-Mask",
    "NO-Safety Vest",
];
const DEFAULT_OTHER: &[&str] = &["Person", "Fall-Detected", "Ladder", "Safety Cone"];

/// Prefix marking a "missing equipment" class.
pub const MISSING_PREFIX: &str = "NO-";

/// A class label that has been checked against a registry.
///
/// There is no public constructor; values come from `ClassRegistry::resolve`
/// or the registry's listings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassGroup {
    Equipment,
    Missing,
    Other,
}

/// The persisted class-manifest document: group name -> ordered class names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassManifest {
    pub equipment: Vec<String>,
    pub missing: Vec<String>,
    pub other: Vec<String>,
}

impl ClassManifest {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read class manifest {}: {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid class manifest {}: {}", path.display(), e))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| anyhow!("failed to write class manifest {}: {}", path.display(), e))
    }
}

/// Borrowed view of the three groups.
#[derive(Clone, Copy, Debug)]
pub struct ClassGroups<'a> {
    pub equipment: &'a [ClassName],
    pub missing: &'a [ClassName],
    pub other: &'a [ClassName],
}

/// Immutable catalog of known classes.
#[derive(Clone, Debug)]
pub struct ClassRegistry {
    /// All classes in selection order; groups are contiguous slices of it.
    classes: Vec<ClassName>,
    equipment_len: usize,
    missing_len: usize,
}

impl ClassRegistry {
    /// Build a registry from the three groups. Names must be unique across
    /// all groups and the catalog must not be empty.
    pub fn new<S: AsRef<str>>(
        equipment: &[S],
        missing: &[S],
        other: &[S],
    ) -> Result<Self, AccessError> {
        let mut seen = HashSet::new();
        let mut classes = Vec::with_capacity(equipment.len() + missing.len() + other.len());
        for name in equipment.iter().chain(missing).chain(other) {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(AccessError::InvalidClassCatalog(
                    "class names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(AccessError::InvalidClassCatalog(format!(
                    "class '{}' appears more than once",
                    name
                )));
            }
            classes.push(ClassName(name.to_string()));
        }
        if classes.is_empty() {
            return Err(AccessError::InvalidClassCatalog(
                "catalog has no classes".to_string(),
            ));
        }
        for name in missing {
            if !name.as_ref().trim().starts_with(MISSING_PREFIX) {
                log::warn!(
                    "missing-equipment class '{}' does not use the {} prefix",
                    name.as_ref(),
                    MISSING_PREFIX
                );
            }
        }
        Ok(Self {
            classes,
            equipment_len: equipment.len(),
            missing_len: missing.len(),
        })
    }

    /// The built-in 14-class PPE catalog.
    pub fn ppe_default() -> Self {
        Self {
            classes: DEFAULT_EQUIPMENT
                .iter()
                .chain(DEFAULT_MISSING)
                .chain(DEFAULT_OTHER)
                .map(|name| ClassName((*name).to_string()))
                .collect(),
            equipment_len: DEFAULT_EQUIPMENT.len(),
            missing_len: DEFAULT_MISSING.len(),
        }
    }

    pub fn from_manifest(manifest: &ClassManifest) -> Result<Self, AccessError> {
        Self::new(&manifest.equipment, &manifest.missing, &manifest.other)
    }

    pub fn to_manifest(&self) -> ClassManifest {
        let groups = self.groups();
        let names = |slice: &[ClassName]| slice.iter().map(|c| c.0.clone()).collect();
        ClassManifest {
            equipment: names(groups.equipment),
            missing: names(groups.missing),
            other: names(groups.other),
        }
    }

    pub fn groups(&self) -> ClassGroups<'_> {
        let missing_end = self.equipment_len + self.missing_len;
        ClassGroups {
            equipment: &self.classes[..self.equipment_len],
            missing: &self.classes[self.equipment_len..missing_end],
            other: &self.classes[missing_end..],
        }
    }

    /// All classes in selection order (index `i` here is display index `i + 1`).
    pub fn all_classes(&self) -> &[ClassName] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class at a 1-based display index.
    pub fn by_index(&self, index: usize) -> Result<&ClassName, AccessError> {
        index
            .checked_sub(1)
            .and_then(|i| self.classes.get(i))
            .ok_or(AccessError::OutOfRangeSelection {
                index,
                max: self.classes.len(),
            })
    }

    /// Validate a raw label. Case-sensitive.
    pub fn resolve(&self, label: &str) -> Result<&ClassName, AccessError> {
        self.classes
            .iter()
            .find(|c| c.0 == label)
            .ok_or_else(|| AccessError::UnknownClass {
                class: label.to_string(),
            })
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::ppe_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_fourteen_classes_in_group_order() {
        let registry = ClassRegistry::ppe_default();
        assert_eq!(registry.len(), 14);
        assert_eq!(registry.by_index(1).unwrap().as_str(), "Gloves");
        assert_eq!(registry.by_index(3).unwrap().as_str(), "Hardhat");
        assert_eq!(registry.by_index(8).unwrap().as_str(), "NO-Hardhat");
        assert_eq!(registry.by_index(14).unwrap().as_str(), "Safety Cone");

        let groups = registry.groups();
        assert_eq!(groups.equipment.len(), 5);
        assert_eq!(groups.missing.len(), 5);
        assert_eq!(groups.other.len(), 4);
        assert!(groups
            .missing
            .iter()
            .all(|c| c.as_str().starts_with(MISSING_PREFIX)));
    }

    #[test]
    fn index_out_of_range_is_rejected() {
        let registry = ClassRegistry::ppe_default();
        assert_eq!(
            registry.by_index(0).unwrap_err(),
            AccessError::OutOfRangeSelection { index: 0, max: 14 }
        );
        assert!(registry.by_index(15).is_err());
    }

    #[test]
    fn resolve_is_case_sensitive() {
        let registry = ClassRegistry::ppe_default();
        assert!(registry.resolve("Hardhat").is_ok());
        assert_eq!(
            registry.resolve("hardhat").unwrap_err(),
            AccessError::UnknownClass {
                class: "hardhat".to_string()
            }
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ClassRegistry::new(&["Hardhat"], &["NO-Hardhat"], &["Hardhat"]).unwrap_err();
        assert!(matches!(err, AccessError::InvalidClassCatalog(_)));

        let empty: [&str; 0] = [];
        assert!(ClassRegistry::new(&empty, &empty, &empty).is_err());
    }

    #[test]
    fn manifest_survives_disk() {
        let registry = ClassRegistry::ppe_default();
        let manifest = registry.to_manifest();
        let file = tempfile::NamedTempFile::new().unwrap();
        manifest.write(file.path()).unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["equipment"][2], "Hardhat");
        assert_eq!(value["other"][0], "Person");

        let loaded = ClassRegistry::from_manifest(&ClassManifest::read(file.path()).unwrap())
            .unwrap();
        assert_eq!(loaded.all_classes(), registry.all_classes());
    }
}

//! Compatibility matrix: which versions are valid for which component.
//!
//! A component maps to a [`VersionConstraint`], either a flat set of allowed
//! versions or a set keyed by the database's major version. Validator and
//! artifact resolution go through the same [`VersionConstraint::allowed`]
//! lookup regardless of shape.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("failed to read compatibility matrix: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse compatibility matrix JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("failed to parse compatibility matrix TOML: {0}")]
    ParseToml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionConstraint {
    /// Allowed regardless of the database version.
    Flat(BTreeSet<String>),
    /// Allowed set depends on the database major version.
    ByDatabaseMajor(BTreeMap<String, BTreeSet<String>>),
}

impl VersionConstraint {
    pub fn flat<'a>(versions: impl IntoIterator<Item = &'a str>) -> Self {
        VersionConstraint::Flat(versions.into_iter().map(str::to_owned).collect())
    }

    pub fn by_database_major<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
    ) -> Self {
        VersionConstraint::ByDatabaseMajor(
            entries
                .into_iter()
                .map(|(major, versions)| {
                    (
                        major.to_owned(),
                        versions.iter().map(|v| (*v).to_owned()).collect(),
                    )
                })
                .collect(),
        )
    }

    /// The allowed set for a given database major version.
    ///
    /// A flat constraint ignores `db_major`. A nested one returns `None` when
    /// `db_major` is absent or has no entry.
    pub fn allowed(&self, db_major: Option<&str>) -> Option<&BTreeSet<String>> {
        match self {
            VersionConstraint::Flat(set) => Some(set),
            VersionConstraint::ByDatabaseMajor(by_major) => db_major.and_then(|m| by_major.get(m)),
        }
    }

    pub fn permits(&self, version: &str, db_major: Option<&str>) -> bool {
        self.allowed(db_major)
            .is_some_and(|set| set.contains(version))
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, VersionConstraint::ByDatabaseMajor(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompatibilityMatrix {
    components: BTreeMap<String, VersionConstraint>,
}

impl CompatibilityMatrix {
    pub fn new(components: BTreeMap<String, VersionConstraint>) -> Self {
        Self { components }
    }

    /// The matrix shipped with stackpack.
    pub fn builtin() -> Self {
        let mut components = BTreeMap::new();
        components.insert(
            "oraclelinux".to_owned(),
            VersionConstraint::flat([
                "8.0", "8.1", "8.2", "8.3", "8.4", "8.5", "8.6", "8.7", "8.8", "8.9", "8.10", "9",
            ]),
        );
        components.insert(
            "rockylinux".to_owned(),
            VersionConstraint::flat([
                "8.4", "8.5", "8.6", "8.7", "8.8", "8.9", "8.10", "9.0", "9.1", "9.2", "9.3", "9.4",
            ]),
        );
        components.insert("postgresql".to_owned(), VersionConstraint::flat(["15.8"]));
        components.insert("pgpool".to_owned(), VersionConstraint::flat(["4.4.4"]));
        components.insert("postgis".to_owned(), VersionConstraint::flat(["3.4.0"]));
        components.insert("barman".to_owned(), VersionConstraint::flat(["3.11.1"]));
        components.insert(
            "pg_build_extension_install_utils".to_owned(),
            VersionConstraint::flat(["1.0.0"]),
        );
        components.insert(
            "pg_hint_plan".to_owned(),
            VersionConstraint::by_database_major([("15", &["1.5.2"][..])]),
        );
        components.insert("pgaudit".to_owned(), VersionConstraint::flat(["1.7"]));
        components.insert("credcheck".to_owned(), VersionConstraint::flat(["2.8.0"]));
        components.insert("system_stats".to_owned(), VersionConstraint::flat(["3.2"]));
        Self { components }
    }

    /// Load a replacement matrix. `.toml` files are TOML, anything else JSON.
    pub fn load(path: &Path) -> Result<Self, MatrixError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(toml::from_str(&content)?),
            _ => Ok(serde_json::from_str(&content)?),
        }
    }

    pub fn get(&self, component: &str) -> Option<&VersionConstraint> {
        self.components.get(component)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VersionConstraint)> {
        self.components.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Default for CompatibilityMatrix {
    fn default() -> Self {
        Self::builtin()
    }
}

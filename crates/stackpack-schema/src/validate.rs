use crate::manifest::{ComponentSpec, RawSpec};
use crate::matrix::CompatibilityMatrix;
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// OS component names the pipeline knows how to provision.
pub const SUPPORTED_OS: &[&str] = &["oraclelinux", "rockylinux"];

/// Database component names the pipeline knows how to provision.
pub const SUPPORTED_DATABASES: &[&str] = &["postgresql"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target os must be set (available os: {})", SUPPORTED_OS.join(", "))]
    MissingOs,
    #[error("target database must be set (available databases: {})", SUPPORTED_DATABASES.join(", "))]
    MissingDatabase,
    #[error("{field} '{name}' is not recognized (available: {available})")]
    UnrecognizedName {
        field: &'static str,
        name: String,
        available: String,
    },
    #[error("{field} '{name}' has no entry in the compatibility matrix")]
    NotInMatrix { field: &'static str, name: String },
    #[error("{field} {name} version {version} is not supported (available versions: {available})")]
    UnsupportedVersion {
        field: &'static str,
        name: String,
        version: String,
        available: String,
    },
    #[error("{field} '{name}' requires a flat version constraint in the compatibility matrix")]
    NestedConstraintNotAllowed { field: &'static str, name: String },
    #[error("option {name} has no versions for database major version {db_major}")]
    NoVersionsForDatabase { name: String, db_major: String },
    #[error("option '{0}' is declared more than once")]
    DuplicateOption(String),
}

/// A specification that passed every compatibility check.
///
/// Only [`SpecValidator::validate`] constructs one, so holding a
/// `Specification` means validation already ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specification {
    os: ComponentSpec,
    database: ComponentSpec,
    options: Vec<ComponentSpec>,
}

impl Specification {
    pub fn os(&self) -> &ComponentSpec {
        &self.os
    }

    pub fn database(&self) -> &ComponentSpec {
        &self.database
    }

    pub fn options(&self) -> &[ComponentSpec] {
        &self.options
    }

    pub fn os_major_version(&self) -> &str {
        self.os.version.major()
    }

    pub fn database_major_version(&self) -> &str {
        self.database.version.major()
    }

    /// OS, database, then options in declared order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentSpec> {
        [&self.os, &self.database]
            .into_iter()
            .chain(self.options.iter())
    }

    /// Plain-text manifest: one `<name> <version>` line per component.
    pub fn manifest_text(&self) -> String {
        let mut out = String::new();
        for c in self.components() {
            out.push_str(&c.name);
            out.push(' ');
            out.push_str(&c.version);
            out.push('\n');
        }
        out
    }
}

/// Checks a [`RawSpec`] against a [`CompatibilityMatrix`]. Pure; no I/O.
pub struct SpecValidator<'a> {
    matrix: &'a CompatibilityMatrix,
}

impl<'a> SpecValidator<'a> {
    pub fn new(matrix: &'a CompatibilityMatrix) -> Self {
        Self { matrix }
    }

    /// Check in order: os name, os version, database name, database version,
    /// then each option in declared order. The first failure is returned.
    pub fn validate(&self, raw: &RawSpec) -> Result<Specification, ValidationError> {
        let os = raw.os.as_ref().ok_or(ValidationError::MissingOs)?;
        check_recognized("os", os, SUPPORTED_OS)?;
        self.check_flat("os", os)?;

        let database = raw.database.as_ref().ok_or(ValidationError::MissingDatabase)?;
        check_recognized("database", database, SUPPORTED_DATABASES)?;
        self.check_flat("database", database)?;

        let db_major = database.version.major();
        let mut seen = BTreeSet::new();
        for option in &raw.options {
            self.check_option(option, db_major)?;
            if !seen.insert(option.name.as_str()) {
                return Err(ValidationError::DuplicateOption(option.name.to_string()));
            }
        }

        Ok(Specification {
            os: os.clone(),
            database: database.clone(),
            options: raw.options.clone(),
        })
    }

    fn check_flat(&self, field: &'static str, c: &ComponentSpec) -> Result<(), ValidationError> {
        let constraint = self
            .matrix
            .get(&c.name)
            .ok_or_else(|| ValidationError::NotInMatrix {
                field,
                name: c.name.to_string(),
            })?;
        if constraint.is_nested() {
            return Err(ValidationError::NestedConstraintNotAllowed {
                field,
                name: c.name.to_string(),
            });
        }
        if !constraint.permits(&c.version, None) {
            return Err(unsupported(field, c, constraint.allowed(None)));
        }
        Ok(())
    }

    fn check_option(&self, option: &ComponentSpec, db_major: &str) -> Result<(), ValidationError> {
        // An option absent from the matrix is an error, never "unconstrained".
        let constraint =
            self.matrix
                .get(&option.name)
                .ok_or_else(|| ValidationError::NotInMatrix {
                    field: "option",
                    name: option.name.to_string(),
                })?;
        let Some(allowed) = constraint.allowed(Some(db_major)) else {
            return Err(ValidationError::NoVersionsForDatabase {
                name: option.name.to_string(),
                db_major: db_major.to_owned(),
            });
        };
        if !allowed.contains(option.version.as_str()) {
            return Err(unsupported("option", option, Some(allowed)));
        }
        Ok(())
    }
}

fn check_recognized(
    field: &'static str,
    c: &ComponentSpec,
    known: &[&str],
) -> Result<(), ValidationError> {
    if known.contains(&c.name.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::UnrecognizedName {
            field,
            name: c.name.to_string(),
            available: known.join(", "),
        })
    }
}

fn unsupported(
    field: &'static str,
    c: &ComponentSpec,
    allowed: Option<&BTreeSet<String>>,
) -> ValidationError {
    let available = allowed
        .map(|set| set.iter().map(String::as_str).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    ValidationError::UnsupportedVersion {
        field,
        name: c.name.to_string(),
        version: c.version.to_string(),
        available,
    }
}

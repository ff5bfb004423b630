//! Stack specification schema for stackpack.
//!
//! This crate defines the declarative input layer: spec file parsing
//! (`RawSpec`, YAML or TOML), the `CompatibilityMatrix` of supported component
//! versions with its flat and per-database-major `VersionConstraint` shapes,
//! and the `SpecValidator` that turns a raw spec into a validated
//! `Specification` without touching any external resource.

pub mod manifest;
pub mod matrix;
pub mod types;
pub mod validate;

pub use manifest::{
    parse_spec_file, parse_spec_str, ComponentSpec, RawSpec, SpecError, SpecFormat,
    DEFAULT_SPEC_FILE,
};
pub use matrix::{CompatibilityMatrix, MatrixError, VersionConstraint};
pub use types::{ComponentName, Version};
pub use validate::{
    SpecValidator, Specification, ValidationError, SUPPORTED_DATABASES, SUPPORTED_OS,
};

//! `{placeholder}` templates and the variables they are filled from.

use crate::CoreError;
use stackpack_schema::{ComponentSpec, Specification};
use std::collections::BTreeMap;
use std::fmt;

/// Named values available to one resolution attempt.
///
/// Built fresh for every component from the specification; derived contexts
/// (a candidate number, a degraded OS version) are copies, so nothing leaks
/// between components or attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    vars: BTreeMap<String, String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for `component` within `spec`.
    ///
    /// Binds `name`, `version`, the component's `major_version`,
    /// `minor_version` and `patch_version` (where present), `os_name`,
    /// `os_version`, `os_major_version` and `db_major_version`.
    pub fn for_component(spec: &Specification, component: &ComponentSpec) -> Self {
        let mut ctx = Self::new()
            .with("name", &component.name)
            .with("version", &component.version)
            .with("major_version", component.version.major())
            .with("os_name", &spec.os().name)
            .with("os_version", &spec.os().version)
            .with("os_major_version", spec.os_major_version())
            .with("db_major_version", spec.database_major_version());
        if let Some(minor) = component.version.minor() {
            ctx.set("minor_version", minor);
        }
        if let Some(patch) = component.version.patch() {
            ctx.set("patch_version", patch);
        }
        ctx
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl fmt::Display) {
        self.vars.insert(key.to_owned(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// A string with `{name}` placeholders, rendered against a [`ResolutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactTemplate(&'static str);

impl ArtifactTemplate {
    pub const fn new(template: &'static str) -> Self {
        Self(template)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Substitute every placeholder. An unbound placeholder is an error,
    /// never left in place.
    pub fn render(&self, ctx: &ResolutionContext) -> Result<String, CoreError> {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| CoreError::Template {
                template: self.0.to_owned(),
                placeholder: after.to_owned(),
            })?;
            let key = &after[..close];
            let value = ctx.get(key).ok_or_else(|| CoreError::Template {
                template: self.0.to_owned(),
                placeholder: key.to_owned(),
            })?;
            out.push_str(value);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl fmt::Display for ArtifactTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

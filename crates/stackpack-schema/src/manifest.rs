use crate::types::{ComponentName, Version};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Spec file looked up in the working directory when none is given.
pub const DEFAULT_SPEC_FILE: &str = "input.yaml";

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("spec file not found: {0} (pass a path or create {DEFAULT_SPEC_FILE})")]
    NotFound(PathBuf),
    #[error("failed to read spec file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse spec YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse spec TOML: {0}")]
    ParseToml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Yaml,
    Toml,
}

impl SpecFormat {
    /// `.toml` files are TOML, everything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => SpecFormat::Toml,
            _ => SpecFormat::Yaml,
        }
    }
}

/// One `{name, version}` pair as written in the spec file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub name: ComponentName,
    pub version: Version,
}

impl ComponentSpec {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: ComponentName::from(name),
            version: Version::from(version),
        }
    }
}

/// The spec exactly as parsed, before any compatibility checks.
///
/// `os` and `database` are optional here so that their absence is reported
/// by the validator rather than as a parse error.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RawSpec {
    #[serde(default)]
    pub os: Option<ComponentSpec>,
    #[serde(default)]
    pub database: Option<ComponentSpec>,
    #[serde(default)]
    pub options: Vec<ComponentSpec>,
}

pub fn parse_spec_str(input: &str, format: SpecFormat) -> Result<RawSpec, SpecError> {
    match format {
        SpecFormat::Yaml => Ok(serde_yaml::from_str(input)?),
        SpecFormat::Toml => Ok(toml::from_str(input)?),
    }
}

pub fn parse_spec_file(path: impl AsRef<Path>) -> Result<RawSpec, SpecError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SpecError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    parse_spec_str(&content, SpecFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_spec() {
        let input = r#"
os:
  name: rockylinux
  version: "9.2"
database:
  name: postgresql
  version: "15.8"
options:
  - name: pgpool
    version: "4.4.4"
  - name: barman
    version: "3.11.1"
"#;
        let spec = parse_spec_str(input, SpecFormat::Yaml).unwrap();
        let os = spec.os.unwrap();
        assert_eq!(os.name, "rockylinux");
        assert_eq!(os.version, "9.2");
        assert_eq!(spec.options.len(), 2);
        assert_eq!(spec.options[0].name, "pgpool");
        assert_eq!(spec.options[1].name, "barman");
    }

    #[test]
    fn parses_toml_spec() {
        let input = r#"
os = { name = "oraclelinux", version = "8.10" }
database = { name = "postgresql", version = "15.8" }

[[options]]
name = "postgis"
version = "3.4.0"
"#;
        let spec = parse_spec_str(input, SpecFormat::Toml).unwrap();
        assert_eq!(spec.os.unwrap().version, "8.10");
        assert_eq!(spec.options[0].name, "postgis");
    }

    #[test]
    fn options_default_to_empty() {
        let input = r#"
os: { name: rockylinux, version: "9.2" }
database: { name: postgresql, version: "15.8" }
"#;
        let spec = parse_spec_str(input, SpecFormat::Yaml).unwrap();
        assert!(spec.options.is_empty());
    }

    #[test]
    fn missing_sections_parse_as_none() {
        let spec = parse_spec_str("options: []\n", SpecFormat::Yaml).unwrap();
        assert!(spec.os.is_none());
        assert!(spec.database.is_none());
    }

    #[test]
    fn plain_yaml_versions_are_kept_verbatim() {
        let input = r"
os: { name: rockylinux, version: 8.10 }
database: { name: postgresql, version: 15.8 }
";
        let spec = parse_spec_str(input, SpecFormat::Yaml).unwrap();
        assert_eq!(spec.os.unwrap().version.as_str(), "8.10");
        assert_eq!(spec.database.unwrap().version.as_str(), "15.8");
    }

    #[test]
    fn toml_numeric_versions_are_rejected() {
        let input = r#"
os = { name = "rockylinux", version = 8.10 }
"#;
        assert!(parse_spec_str(input, SpecFormat::Toml).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
os: { name: rockylinux, version: "9.2", arch: x86_64 }
"#;
        assert!(parse_spec_str(input, SpecFormat::Yaml).is_err());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            SpecFormat::from_path(Path::new("stack.toml")),
            SpecFormat::Toml
        );
        assert_eq!(
            SpecFormat::from_path(Path::new("input.yaml")),
            SpecFormat::Yaml
        );
        assert_eq!(SpecFormat::from_path(Path::new("input")), SpecFormat::Yaml);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_spec_file(dir.path().join("input.yaml")).unwrap_err();
        assert!(matches!(err, SpecError::NotFound(_)));
    }

    #[test]
    fn reads_spec_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.yaml");
        std::fs::write(
            &path,
            "os: { name: rockylinux, version: \"9.2\" }\ndatabase: { name: postgresql, version: \"15.8\" }\n",
        )
        .unwrap();
        let spec = parse_spec_file(&path).unwrap();
        assert_eq!(spec.database.unwrap().name, "postgresql");
    }
}

//! Where each component's artifacts come from.
//!
//! Repository URLs, package name templates, candidate limits and the per-OS
//! EPEL/CRB setup commands used by the pipeline and option handlers.

use crate::template::{ArtifactTemplate, ResolutionContext};
use crate::CoreError;

pub const POSTGRESQL_REPOSITORY: ArtifactTemplate = ArtifactTemplate::new(
    "https://download.postgresql.org/pub/repos/yum/reporpms/EL-{os_major_version}-x86_64/pgdg-redhat-repo-latest.noarch.rpm",
);

pub const POSTGRESQL_PACKAGES: [ArtifactTemplate; 4] = [
    ArtifactTemplate::new("postgresql{major_version}-{version}"),
    ArtifactTemplate::new("postgresql{major_version}-server-{version}"),
    ArtifactTemplate::new("postgresql{major_version}-contrib-{version}"),
    ArtifactTemplate::new("postgresql{major_version}-devel-{version}"),
];

pub const PGPOOL_REPOSITORY: ArtifactTemplate = ArtifactTemplate::new(
    "https://www.pgpool.net/yum/rpms/{major_version}.{minor_version}/redhat/rhel-{os_major_version}-x86_64/pgpool-II-release-{major_version}.{minor_version}-{number}.noarch.rpm",
);
pub const PGPOOL_REPOSITORY_LIMIT: u32 = 5;
pub const PGPOOL_PACKAGE: ArtifactTemplate =
    ArtifactTemplate::new("pgpool-II-pg{db_major_version}-{version}");

pub const POSTGIS_PACKAGE: ArtifactTemplate =
    ArtifactTemplate::new("postgis3{number}_{db_major_version}-{version}");
pub const POSTGIS_PACKAGE_LIMIT: u32 = 10;

pub const BARMAN_PACKAGE: ArtifactTemplate = ArtifactTemplate::new("barman-{version}");

pub const PG_HINT_PLAN_PACKAGE: ArtifactTemplate = ArtifactTemplate::new(
    "https://github.com/ossc-db/pg_hint_plan/releases/download/REL{db_major_version}_{major_version}_{minor_version}_{patch_version}/pg_hint_plan{db_major_version}-{version}-1.pg{db_major_version}.rhel{os_major_version}.x86_64.rpm",
);

/// Auxiliary tool directories and the package fetched into each.
pub const EXTENSION_UTILS: [(&str, &str); 2] = [
    ("extension-utils-make", "make"),
    ("extension-utils-llvm", "llvm"),
];

pub const BUILD_EXTENSION_GROUP: &str = "pg_build_extensions";
pub const BUILD_EXTENSIONS: [&str; 3] = ["pgaudit", "credcheck", "system_stats"];
pub const BUILD_EXTENSION_ARCHIVE: ArtifactTemplate = ArtifactTemplate::new(
    "https://raw.githubusercontent.com/tmaxopensql/tmax-opensql-extensions/refs/heads/main/{name}/{version}/{name}-{version}-{os_name}{os_version}-pg{db_major_version}.tar",
);

/// EPEL/CRB setup for one OS family.
#[derive(Debug, Clone, Copy)]
pub enum OsInitRule {
    /// Same commands for every major version.
    Common(&'static [ArtifactTemplate]),
    /// Commands keyed by OS major version.
    ByMajor(&'static [(&'static str, &'static [ArtifactTemplate])]),
}

const ORACLE_INIT: &[ArtifactTemplate] = &[
    ArtifactTemplate::new("dnf -y install epel-release"),
    ArtifactTemplate::new("dnf config-manager --enable ol{os_major_version}_codeready_builder"),
];

const ROCKY_8_INIT: &[ArtifactTemplate] = &[
    ArtifactTemplate::new("dnf -y install epel-release"),
    ArtifactTemplate::new("dnf config-manager --set-enabled powertools"),
];

const ROCKY_9_INIT: &[ArtifactTemplate] = &[
    ArtifactTemplate::new("dnf -y install epel-release"),
    ArtifactTemplate::new("crb enable"),
    ArtifactTemplate::new("dnf config-manager --set-enabled crb"),
];

const OS_INIT_RULES: &[(&str, OsInitRule)] = &[
    ("oraclelinux", OsInitRule::Common(ORACLE_INIT)),
    (
        "rockylinux",
        OsInitRule::ByMajor(&[("8", ROCKY_8_INIT), ("9", ROCKY_9_INIT)]),
    ),
];

pub fn os_init_rule(os_name: &str) -> Option<OsInitRule> {
    OS_INIT_RULES
        .iter()
        .find(|(name, _)| *name == os_name)
        .map(|(_, rule)| *rule)
}

/// Rendered OS init commands. An OS without a rule needs none; a known OS
/// without an entry for its major version is a configuration error.
pub fn os_init_commands(os_name: &str, ctx: &ResolutionContext) -> Result<Vec<String>, CoreError> {
    let Some(rule) = os_init_rule(os_name) else {
        return Ok(Vec::new());
    };
    let templates = match rule {
        OsInitRule::Common(templates) => templates,
        OsInitRule::ByMajor(by_major) => {
            let major = ctx.get("os_major_version").unwrap_or_default();
            by_major
                .iter()
                .find(|(m, _)| *m == major)
                .map(|(_, t)| *t)
                .ok_or_else(|| {
                    CoreError::Configuration(format!(
                        "no EPEL/CRB setup known for {os_name} {major}"
                    ))
                })?
        }
    };
    templates.iter().map(|t| t.render(ctx)).collect()
}

pub fn is_build_extension(name: &str) -> bool {
    BUILD_EXTENSIONS.contains(&name)
}

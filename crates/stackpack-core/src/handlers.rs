//! Per-component install handlers and the registry that dispatches to them.
//!
//! Options are matched by exact component name first, then by membership in
//! a named group. A name that matches nothing is an error; it is never
//! skipped.

use crate::catalog::{
    BARMAN_PACKAGE, BUILD_EXTENSIONS, BUILD_EXTENSION_ARCHIVE, BUILD_EXTENSION_GROUP,
    EXTENSION_UTILS, PGPOOL_PACKAGE, PGPOOL_REPOSITORY, PGPOOL_REPOSITORY_LIMIT,
    PG_HINT_PLAN_PACKAGE, POSTGIS_PACKAGE, POSTGIS_PACKAGE_LIMIT, POSTGRESQL_PACKAGES,
    POSTGRESQL_REPOSITORY,
};
use crate::resolver::{ArtifactProbe, ArtifactResolver, Resolution, Strategy};
use crate::template::{ArtifactTemplate, ResolutionContext};
use crate::CoreError;
use stackpack_runtime::{ExecOutput, SandboxExecutor};
use stackpack_schema::{ComponentSpec, Specification};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Component directories under the sandbox work directory.
///
/// Each directory is created on first request and handed out once; asking
/// for the same component twice is an error.
#[derive(Debug)]
pub struct Workspace {
    root: String,
    created: BTreeSet<String>,
}

impl Workspace {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_owned(),
            created: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn path_of(&self, component: &str) -> String {
        format!("{}/{component}", self.root)
    }
}

/// Everything a handler needs for one step.
pub struct StepContext<'a> {
    pub executor: &'a mut SandboxExecutor,
    pub workspace: &'a mut Workspace,
    pub spec: &'a Specification,
    pub step: String,
}

impl StepContext<'_> {
    /// Run `command`; a non-zero exit is a [`CoreError::Command`] for this step.
    pub fn run(&mut self, command: &str) -> Result<ExecOutput, CoreError> {
        let out = self.executor.exec(command)?;
        self.check(command, out)
    }

    pub fn run_in(&mut self, command: &str, workdir: &str) -> Result<ExecOutput, CoreError> {
        let out = self.executor.exec_in(command, workdir)?;
        self.check(command, out)
    }

    fn check(&self, command: &str, out: ExecOutput) -> Result<ExecOutput, CoreError> {
        if out.success() {
            Ok(out)
        } else {
            Err(CoreError::Command {
                step: self.step.clone(),
                command: command.to_owned(),
                exit_code: out.exit_code,
                output: out.text().into_owned(),
            })
        }
    }

    /// Create the directory for `component` and return its path.
    pub fn component_dir(&mut self, component: &str) -> Result<String, CoreError> {
        if self.workspace.created.contains(component) {
            return Err(CoreError::Configuration(format!(
                "workspace directory for {component} already used"
            )));
        }
        let dir = self.workspace.path_of(component);
        self.run(&format!("mkdir -p {dir}"))?;
        self.workspace.created.insert(component.to_owned());
        Ok(dir)
    }

    /// Download `artifact` and its dependency closure into `dir`.
    pub fn repotrack(&mut self, dir: &str, artifact: &str) -> Result<(), CoreError> {
        self.run(&format!("repotrack --destdir {dir} {artifact}"))?;
        Ok(())
    }

    pub fn context(&self, component: &ComponentSpec) -> ResolutionContext {
        ResolutionContext::for_component(self.spec, component)
    }

    /// Resolve through `resolver`, running `action` for each numbered
    /// candidate and probing with curl for degradation.
    pub fn resolve(
        &mut self,
        resolver: &ArtifactResolver,
        ctx: &ResolutionContext,
        action: &dyn Fn(&str) -> String,
    ) -> Result<Resolution, CoreError> {
        resolver.resolve(ctx, &mut CommandProbe { cx: self, action })
    }

    /// Resolve a single-artifact template for `component`.
    pub fn direct(
        &mut self,
        component: &ComponentSpec,
        template: ArtifactTemplate,
        ctx: &ResolutionContext,
    ) -> Result<String, CoreError> {
        let resolver = ArtifactResolver::direct(&component.name, template);
        Ok(self.resolve(&resolver, ctx, &no_action)?.reference)
    }
}

fn no_action(_: &str) -> String {
    String::new()
}

/// [`ArtifactProbe`] backed by sandbox commands.
///
/// `attempt` runs the command built by `action`; `exists` issues a HEAD
/// request with curl.
struct CommandProbe<'s, 'a> {
    cx: &'s mut StepContext<'a>,
    action: &'s dyn Fn(&str) -> String,
}

impl ArtifactProbe for CommandProbe<'_, '_> {
    fn attempt(&mut self, reference: &str) -> Result<bool, CoreError> {
        let command = (self.action)(reference);
        Ok(self.cx.executor.exec(&command)?.success())
    }

    fn exists(&mut self, reference: &str) -> Result<bool, CoreError> {
        Ok(self
            .cx
            .executor
            .exec(&format!("curl -s -f -I {reference}"))?
            .success())
    }
}

pub trait OptionHandler: Send + Sync {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError>;
}

struct HandlerGroup {
    name: String,
    members: BTreeSet<String>,
    handler: Box<dyn OptionHandler>,
}

pub struct HandlerRegistry {
    databases: BTreeMap<String, Box<dyn OptionHandler>>,
    options: BTreeMap<String, Box<dyn OptionHandler>>,
    groups: Vec<HandlerGroup>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            databases: BTreeMap::new(),
            options: BTreeMap::new(),
            groups: Vec::new(),
        }
    }

    /// Handlers for every component stackpack ships support for.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register_database("postgresql", PostgresqlHandler);
        r.register("pgpool", PgpoolHandler);
        r.register("postgis", PostgisHandler);
        r.register("barman", BarmanHandler);
        r.register("pg_hint_plan", PgHintPlanHandler);
        r.register("pg_build_extension_install_utils", ExtensionUtilsHandler);
        r.register_group(BUILD_EXTENSION_GROUP, BUILD_EXTENSIONS, BuildExtensionHandler);
        r
    }

    pub fn register_database(&mut self, name: &str, handler: impl OptionHandler + 'static) {
        self.databases.insert(name.to_owned(), Box::new(handler));
    }

    pub fn register(&mut self, name: &str, handler: impl OptionHandler + 'static) {
        self.options.insert(name.to_owned(), Box::new(handler));
    }

    pub fn register_group<'m>(
        &mut self,
        group: &str,
        members: impl IntoIterator<Item = &'m str>,
        handler: impl OptionHandler + 'static,
    ) {
        self.groups.push(HandlerGroup {
            name: group.to_owned(),
            members: members.into_iter().map(str::to_owned).collect(),
            handler: Box::new(handler),
        });
    }

    pub fn database(&self, name: &str) -> Result<&dyn OptionHandler, CoreError> {
        self.databases
            .get(name)
            .map(|h| &**h)
            .ok_or_else(|| CoreError::Configuration(format!("no installer for database '{name}'")))
    }

    /// Handler for option `name`: exact match, then group membership.
    pub fn option(&self, name: &str) -> Result<&dyn OptionHandler, CoreError> {
        if let Some(h) = self.options.get(name) {
            return Ok(&**h);
        }
        self.groups
            .iter()
            .find(|g| g.members.contains(name))
            .map(|g| {
                debug!("{name} dispatched through group {}", g.name);
                &*g.handler
            })
            .ok_or_else(|| CoreError::UnhandledOption(name.to_owned()))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

pub struct PostgresqlHandler;

impl OptionHandler for PostgresqlHandler {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError> {
        info!("postgresql repository setup");
        let ctx = cx.context(component);
        let repo = cx.direct(component, POSTGRESQL_REPOSITORY, &ctx)?;
        cx.run(&format!("dnf -y install {repo}"))?;
        cx.run("dnf -qy module disable postgresql")?;

        info!("postgresql download");
        let dir = cx.component_dir(&component.name)?;
        for template in POSTGRESQL_PACKAGES {
            let artifact = cx.direct(component, template, &ctx)?;
            cx.repotrack(&dir, &artifact)?;
        }
        Ok(())
    }
}

pub struct PgpoolHandler;

impl OptionHandler for PgpoolHandler {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError> {
        info!("pgpool repository setup");
        let ctx = cx.context(component);
        let resolver = ArtifactResolver::new(
            &component.name,
            PGPOOL_REPOSITORY,
            Strategy::NumberedCandidate {
                limit: PGPOOL_REPOSITORY_LIMIT,
            },
        );
        cx.resolve(&resolver, &ctx, &|url: &str| format!("dnf -y install {url}"))?;

        info!("pgpool download");
        let dir = cx.component_dir(&component.name)?;
        let artifact = cx.direct(component, PGPOOL_PACKAGE, &ctx)?;
        cx.repotrack(&dir, &artifact)
    }
}

pub struct PostgisHandler;

impl OptionHandler for PostgisHandler {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError> {
        info!("postgis download");
        let ctx = cx.context(component);
        let dir = cx.component_dir(&component.name)?;
        let resolver = ArtifactResolver::new(
            &component.name,
            POSTGIS_PACKAGE,
            Strategy::NumberedCandidate {
                limit: POSTGIS_PACKAGE_LIMIT,
            },
        );
        let action = |package: &str| format!("repotrack --destdir {dir} {package}");
        cx.resolve(&resolver, &ctx, &action)?;
        Ok(())
    }
}

pub struct BarmanHandler;

impl OptionHandler for BarmanHandler {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError> {
        info!("barman download");
        let ctx = cx.context(component);
        let dir = cx.component_dir(&component.name)?;
        let artifact = cx.direct(component, BARMAN_PACKAGE, &ctx)?;
        cx.repotrack(&dir, &artifact)
    }
}

pub struct PgHintPlanHandler;

impl OptionHandler for PgHintPlanHandler {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError> {
        info!("pg_hint_plan download");
        let ctx = cx.context(component);
        let dir = cx.component_dir(&component.name)?;
        let artifact = cx.direct(component, PG_HINT_PLAN_PACKAGE, &ctx)?;
        cx.repotrack(&dir, &artifact)
    }
}

/// Build tooling needed to compile extensions on the target.
pub struct ExtensionUtilsHandler;

impl OptionHandler for ExtensionUtilsHandler {
    fn install(&self, cx: &mut StepContext<'_>, _component: &ComponentSpec) -> Result<(), CoreError> {
        for (dir_name, package) in EXTENSION_UTILS {
            info!("extension util ({package}) download");
            let dir = cx.component_dir(dir_name)?;
            cx.repotrack(&dir, package)?;
        }
        Ok(())
    }
}

/// Prebuilt extension tarballs, unpacked into the component directory.
pub struct BuildExtensionHandler;

impl OptionHandler for BuildExtensionHandler {
    fn install(&self, cx: &mut StepContext<'_>, component: &ComponentSpec) -> Result<(), CoreError> {
        info!("build extension [{}] download", component.name);
        let ctx = cx.context(component);
        let dir = cx.component_dir(&component.name)?;

        let resolver = ArtifactResolver::new(
            &component.name,
            BUILD_EXTENSION_ARCHIVE,
            Strategy::VersionDegradation,
        );
        let resolution = cx.resolve(&resolver, &ctx, &no_action)?;

        cx.run(&format!("curl -s -o {dir}/tmp.tar {}", resolution.reference))?;
        cx.run_in("tar -xvf tmp.tar", &dir)?;
        cx.run_in("rm tmp.tar", &dir)?;
        Ok(())
    }
}

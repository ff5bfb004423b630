//! The fail-fast provisioning run.
//!
//! `Idle → Validating → Bootstrapping → InitializingOs → InstallingDatabase
//! → InstallingOption(0..n) → Assembling → Completed`, with `Failed`
//! reachable from every non-terminal state. Each state does one unit of work
//! and records its own [`ProvisioningOutcome`]; the first failure ends the
//! run. No sandbox, image or log is touched until validation has passed, and
//! once a sandbox is launched it is torn down exactly once on every path.

use crate::bundle::{BundleAssembler, BundleReport};
use crate::catalog::os_init_commands;
use crate::concurrency::shutdown_requested;
use crate::handlers::{HandlerRegistry, StepContext, Workspace};
use crate::lifecycle::validate_transition;
use crate::template::ResolutionContext;
use crate::{CoreError, ErrorKind};
use serde::Serialize;
use stackpack_runtime::{resolve_os_image, ExecutionLog, RuntimeBackend, SandboxExecutor};
use stackpack_schema::{CompatibilityMatrix, RawSpec, SpecValidator, Specification};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const DEFAULT_WORK_DIR: &str = "/stackpack";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_OUTPUT: &str = "stackpack.tar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Validating,
    Bootstrapping,
    InitializingOs,
    InstallingDatabase,
    InstallingOption(usize),
    Assembling,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Validating => f.write_str("validating"),
            PipelineState::Bootstrapping => f.write_str("bootstrapping"),
            PipelineState::InitializingOs => f.write_str("initializing-os"),
            PipelineState::InstallingDatabase => f.write_str("installing-database"),
            PipelineState::InstallingOption(i) => write!(f, "installing-option[{i}]"),
            PipelineState::Assembling => f.write_str("assembling"),
            PipelineState::Completed => f.write_str("completed"),
            PipelineState::Failed => f.write_str("failed"),
        }
    }
}

/// Result of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvisioningOutcome {
    Success {
        step: String,
    },
    Failed {
        step: String,
        kind: ErrorKind,
        output: String,
    },
}

impl ProvisioningOutcome {
    pub fn step(&self) -> &str {
        match self {
            ProvisioningOutcome::Success { step } | ProvisioningOutcome::Failed { step, .. } => {
                step
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProvisioningOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Absolute directory inside the sandbox that collects all artifacts.
    pub work_dir: String,
    /// Host directory for per-run execution logs.
    pub log_dir: PathBuf,
    /// Host path of the output archive.
    pub output: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            work_dir: DEFAULT_WORK_DIR.to_owned(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl PipelineOptions {
    /// The work directory is interpolated into shell commands unquoted, so it
    /// is restricted to an absolute path of plain characters.
    pub fn check(&self) -> Result<(), CoreError> {
        let plain = self
            .work_dir
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.'));
        if !self.work_dir.starts_with('/') || self.work_dir.len() < 2 || !plain {
            return Err(CoreError::Configuration(format!(
                "work directory must be an absolute path of [A-Za-z0-9/_.-], got '{}'",
                self.work_dir
            )));
        }
        Ok(())
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub specification: Specification,
    pub bundle: BundleReport,
    pub log_path: Option<PathBuf>,
    pub outcomes: Vec<ProvisioningOutcome>,
}

type Observer<'a> = Box<dyn FnMut(PipelineState, &str) + 'a>;
type InterruptCheck<'a> = Box<dyn Fn() -> bool + 'a>;

pub struct ProvisioningPipeline<'a> {
    backend: &'a dyn RuntimeBackend,
    matrix: &'a CompatibilityMatrix,
    registry: HandlerRegistry,
    options: PipelineOptions,
    state: PipelineState,
    step: String,
    history: Vec<PipelineState>,
    outcomes: Vec<ProvisioningOutcome>,
    observer: Option<Observer<'a>>,
    interrupted: InterruptCheck<'a>,
}

impl<'a> ProvisioningPipeline<'a> {
    pub fn new(
        backend: &'a dyn RuntimeBackend,
        matrix: &'a CompatibilityMatrix,
        options: PipelineOptions,
    ) -> Self {
        Self {
            backend,
            matrix,
            registry: HandlerRegistry::builtin(),
            options,
            state: PipelineState::Idle,
            step: String::new(),
            history: vec![PipelineState::Idle],
            outcomes: Vec::new(),
            observer: None,
            interrupted: Box::new(shutdown_requested),
        }
    }

    /// Called on every state change with the new state and step label.
    #[must_use]
    pub fn on_step(mut self, observer: impl FnMut(PipelineState, &str) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Replace the Ctrl-C check consulted between steps.
    #[must_use]
    pub fn with_interrupt(mut self, check: impl Fn() -> bool + 'a) -> Self {
        self.interrupted = Box::new(check);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn outcomes(&self) -> &[ProvisioningOutcome] {
        &self.outcomes
    }

    /// Run the whole pipeline for `raw`.
    pub fn run(&mut self, raw: &RawSpec) -> Result<PipelineReport, CoreError> {
        match self.execute(raw) {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("step '{}' failed: {e}", self.step);
                self.outcomes.push(ProvisioningOutcome::Failed {
                    step: self.step.clone(),
                    kind: e.kind(),
                    output: e.to_string(),
                });
                let label = self.step.clone();
                if let Err(t) = self.advance(PipelineState::Failed, &label) {
                    debug!("{t}");
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, raw: &RawSpec) -> Result<PipelineReport, CoreError> {
        self.advance(PipelineState::Validating, "validate")?;
        let spec = self.validate(raw)?;
        self.succeed();

        self.checkpoint()?;
        self.advance(PipelineState::Bootstrapping, "bootstrap")?;
        let image = resolve_os_image(&spec.os().name, &spec.os().version)
            .map_err(|e| CoreError::Environment(e.to_string()))?;
        self.backend
            .ensure_image(&image)
            .map_err(|e| CoreError::Environment(e.to_string()))?;

        let sandbox = self.backend.launch(&image)?;
        info!("sandbox {} launched from {image}", sandbox.id());
        let log = match ExecutionLog::create(&self.options.log_dir) {
            Ok(log) => log,
            Err(e) => {
                if let Err(d) = sandbox.destroy() {
                    warn!("sandbox cleanup failed: {d}");
                }
                return Err(e.into());
            }
        };
        let log_path = log.path().map(std::path::Path::to_path_buf);
        let mut executor = SandboxExecutor::new(sandbox, log);

        let provisioned = self.provision(&spec, &mut executor);
        if let Err(e) = executor.close() {
            warn!("sandbox cleanup failed: {e}");
        }
        let bundle = provisioned?;

        Ok(PipelineReport {
            specification: spec,
            bundle,
            log_path,
            outcomes: self.outcomes.clone(),
        })
    }

    fn validate(&self, raw: &RawSpec) -> Result<Specification, CoreError> {
        self.options.check()?;
        let spec = validate_spec(raw, self.matrix, &self.registry)?;
        info!("specification valid:\n{}", spec.manifest_text().trim_end());
        Ok(spec)
    }

    fn provision(
        &mut self,
        spec: &Specification,
        executor: &mut SandboxExecutor,
    ) -> Result<BundleReport, CoreError> {
        let mut workspace = Workspace::new(&self.options.work_dir);

        let mut cx = StepContext {
            executor: &mut *executor,
            workspace: &mut workspace,
            spec,
            step: self.step.clone(),
        };
        cx.run(&format!("mkdir {}", self.options.work_dir))?;
        bootstrap(&mut cx)?;
        self.succeed();

        self.checkpoint()?;
        self.advance(PipelineState::InitializingOs, "os-init")?;
        let os_ctx = ResolutionContext::for_component(spec, spec.os());
        let commands = os_init_commands(&spec.os().name, &os_ctx)?;
        let mut cx = self.context(executor, &mut workspace, spec);
        for command in &commands {
            cx.run(command)?;
        }
        self.succeed();

        self.checkpoint()?;
        let database = spec.database();
        self.advance(
            PipelineState::InstallingDatabase,
            &format!("database:{}", database.name),
        )?;
        let mut cx = self.context(executor, &mut workspace, spec);
        self.registry.database(&database.name)?.install(&mut cx, database)?;
        self.succeed();

        for (i, option) in spec.options().iter().enumerate() {
            self.checkpoint()?;
            self.advance(
                PipelineState::InstallingOption(i),
                &format!("option:{}", option.name),
            )?;
            let mut cx = self.context(executor, &mut workspace, spec);
            self.registry.option(&option.name)?.install(&mut cx, option)?;
            self.succeed();
        }

        self.checkpoint()?;
        self.advance(PipelineState::Assembling, "assemble")?;
        info!("all downloads completed, assembling bundle");
        let report =
            BundleAssembler::new(workspace.root(), &self.options.output).assemble(executor, spec)?;
        self.succeed();

        self.advance(PipelineState::Completed, "completed")?;
        Ok(report)
    }

    fn context<'c>(
        &self,
        executor: &'c mut SandboxExecutor,
        workspace: &'c mut Workspace,
        spec: &'c Specification,
    ) -> StepContext<'c> {
        StepContext {
            executor,
            workspace,
            spec,
            step: self.step.clone(),
        }
    }

    fn advance(&mut self, to: PipelineState, label: &str) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        debug!("pipeline: {} -> {to}", self.state);
        self.state = to;
        label.clone_into(&mut self.step);
        self.history.push(to);
        if let Some(observer) = self.observer.as_mut() {
            observer(to, label);
        }
        Ok(())
    }

    fn succeed(&mut self) {
        self.outcomes.push(ProvisioningOutcome::Success {
            step: self.step.clone(),
        });
    }

    fn checkpoint(&self) -> Result<(), CoreError> {
        if (self.interrupted)() {
            return Err(CoreError::Interrupted);
        }
        Ok(())
    }
}

/// Validate `raw` against `matrix` and make sure `registry` can install every
/// component in it. Touches nothing outside the process.
pub fn validate_spec(
    raw: &RawSpec,
    matrix: &CompatibilityMatrix,
    registry: &HandlerRegistry,
) -> Result<Specification, CoreError> {
    let spec = SpecValidator::new(matrix).validate(raw)?;
    registry.database(&spec.database().name)?;
    for option in spec.options() {
        registry.option(&option.name)?;
    }
    Ok(spec)
}

/// Make sure `repotrack` is available, installing yum-utils if needed.
fn bootstrap(cx: &mut StepContext<'_>) -> Result<(), CoreError> {
    info!("checking for repotrack");
    if cx.executor.exec("command -v repotrack")?.success() {
        return Ok(());
    }
    info!("repotrack not found, installing yum-utils");
    cx.run("dnf install -y yum-utils")?;
    cx.run("command -v repotrack")?;
    Ok(())
}

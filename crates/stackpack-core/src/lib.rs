//! Core provisioning engine for stackpack.
//!
//! This crate ties the validated `Specification` from `stackpack-schema` to
//! the sandbox layer in `stackpack-runtime`: the component catalog of
//! artifact templates, the `ArtifactResolver` and its numbered-candidate and
//! version-degradation search strategies, the option handler registry, the
//! fail-fast `ProvisioningPipeline` state machine, and the `BundleAssembler`
//! that turns the sandbox workspace into an offline archive.

pub mod bundle;
pub mod catalog;
pub mod concurrency;
pub mod handlers;
pub mod lifecycle;
pub mod pipeline;
pub mod resolver;
pub mod template;

pub use bundle::{BundleAssembler, BundleReport, MANIFEST_FILE};
pub use concurrency::{install_signal_handler, request_shutdown, shutdown_requested};
pub use handlers::{HandlerRegistry, OptionHandler, StepContext, Workspace};
pub use lifecycle::validate_transition;
pub use pipeline::{
    validate_spec, PipelineOptions, PipelineReport, PipelineState, ProvisioningOutcome,
    ProvisioningPipeline, DEFAULT_LOG_DIR, DEFAULT_OUTPUT, DEFAULT_WORK_DIR,
};
pub use resolver::{ArtifactProbe, ArtifactResolver, Resolution, Strategy};
pub use template::{ArtifactTemplate, ResolutionContext};

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("spec error: {0}")]
    Spec(#[from] stackpack_schema::SpecError),
    #[error("matrix error: {0}")]
    Matrix(#[from] stackpack_schema::MatrixError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation error: {0}")]
    Validation(#[from] stackpack_schema::ValidationError),
    #[error("environment error: {0}")]
    Environment(String),
    #[error("step '{step}' failed: `{command}` exited with status {exit_code}\n{output}")]
    Command {
        step: String,
        command: String,
        exit_code: i32,
        output: String,
    },
    #[error("no available artifact for {component} after {attempts} attempt(s) (last tried: {last})")]
    ArtifactUnavailable {
        component: String,
        attempts: usize,
        last: String,
    },
    #[error("no handler registered for option '{0}'")]
    UnhandledOption(String),
    #[error("template '{template}' references unbound placeholder '{placeholder}'")]
    Template {
        template: String,
        placeholder: String,
    },
    #[error("bundle error: {0}")]
    Bundle(String),
    #[error("interrupted")]
    Interrupted,
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime error: {0}")]
    Runtime(#[from] stackpack_runtime::RuntimeError),
}

/// Error categories a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input, or nothing knows how to handle it.
    Configuration,
    /// Unrecognized component or unsupported version.
    Validation,
    /// Base image or sandbox engine unavailable.
    Environment,
    /// A sandbox command or pipeline step failed.
    Command,
    /// Every candidate for an artifact was exhausted.
    ArtifactUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::Environment => "environment",
            ErrorKind::Command => "command",
            ErrorKind::ArtifactUnavailable => "artifact-unavailable",
        };
        f.write_str(s)
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        use stackpack_runtime::RuntimeError;
        match self {
            CoreError::Spec(_)
            | CoreError::Matrix(_)
            | CoreError::Configuration(_)
            | CoreError::UnhandledOption(_)
            | CoreError::Template { .. } => ErrorKind::Configuration,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Environment(_)
            | CoreError::Runtime(
                RuntimeError::ImageNotFound(_)
                | RuntimeError::BackendUnavailable(_)
                | RuntimeError::LaunchFailed(_),
            ) => ErrorKind::Environment,
            CoreError::ArtifactUnavailable { .. } => ErrorKind::ArtifactUnavailable,
            CoreError::Command { .. }
            | CoreError::Bundle(_)
            | CoreError::Interrupted
            | CoreError::InvalidTransition { .. }
            | CoreError::Io(_)
            | CoreError::Runtime(_) => ErrorKind::Command,
        }
    }
}

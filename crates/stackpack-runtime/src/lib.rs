//! Sandbox layer for stackpack.
//!
//! This crate implements the execution side of a run: the `RuntimeBackend`
//! and `Sandbox` capability traits, a container CLI backend (docker or
//! podman), a scripted mock backend for tests, OS base image resolution,
//! the append-only per-run `ExecutionLog`, and `SandboxExecutor`, which owns
//! a launched sandbox plus its log and releases both exactly once.

pub mod backend;
pub mod container;
pub mod executor;
pub mod image;
pub mod log;
pub mod mock;
pub mod prereq;
pub mod shell;

pub use backend::{select_backend, ExecOutput, ImageRef, RuntimeBackend, Sandbox};
pub use executor::SandboxExecutor;
pub use image::resolve_os_image;
pub use log::{ExecutionLog, ExecutionLogEntry};
pub use mock::MockBackend;
pub use prereq::{check_backend_prereqs, format_missing, MissingPrereq};
pub use shell::shell_quote;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("sandbox launch failed: {0}")]
    LaunchFailed(String),
    #[error("sandbox execution failed: {0}")]
    ExecFailed(String),
    #[error("archive retrieval failed: {0}")]
    ArchiveFailed(String),
}

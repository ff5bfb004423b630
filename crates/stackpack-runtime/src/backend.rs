use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A container image reference, `repository:tag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Exit status and combined stdout/stderr of one sandbox command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub output: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// A launched, isolated execution environment.
///
/// Commands are shell strings run with `sh -c`; success is judged by the
/// exit status alone.
pub trait Sandbox: Send {
    fn id(&self) -> &str;

    fn exec(&self, command: &str, workdir: Option<&str>) -> Result<ExecOutput, RuntimeError>;

    /// Write `contents` to `path` inside the sandbox.
    fn write_file(&self, path: &str, contents: &[u8]) -> Result<ExecOutput, RuntimeError>;

    /// Retrieve the directory tree at `path` as a tar stream.
    fn archive(&self, path: &str) -> Result<Vec<u8>, RuntimeError>;

    fn destroy(&self) -> Result<(), RuntimeError>;
}

pub trait RuntimeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Make sure `image` exists locally, pulling it if needed.
    fn ensure_image(&self, image: &ImageRef) -> Result<(), RuntimeError>;

    fn launch(&self, image: &ImageRef) -> Result<Box<dyn Sandbox>, RuntimeError>;
}

pub fn select_backend(name: &str) -> Result<Box<dyn RuntimeBackend>, RuntimeError> {
    match name {
        "docker" | "podman" => Ok(Box::new(crate::container::ContainerCliBackend::new(name))),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

//! Sandbox backend driving a docker-compatible container CLI.
//!
//! Each sandbox is a detached container running an idle shell; commands are
//! issued with `<cli> exec`, the workspace is retrieved with `<cli> cp`, and
//! teardown kills and removes the container.

use crate::backend::{ExecOutput, ImageRef, RuntimeBackend, Sandbox};
use crate::shell::shell_quote;
use crate::RuntimeError;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tracing::{debug, info, warn};

pub struct ContainerCliBackend {
    program: String,
}

impl ContainerCliBackend {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
        }
    }

    fn image_present(&self, image: &ImageRef) -> bool {
        Command::new(&self.program)
            .args(["image", "inspect", &image.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl RuntimeBackend for ContainerCliBackend {
    fn name(&self) -> &str {
        &self.program
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn ensure_image(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        if self.image_present(image) {
            debug!("image {image} found locally");
            return Ok(());
        }

        warn!("image {image} does not exist on this machine, pulling");
        let output = Command::new(&self.program)
            .args(["pull", &image.to_string()])
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{} pull failed: {e}", self.program)))?;

        if !output.status.success() {
            return Err(RuntimeError::ImageNotFound(format!(
                "{image}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!("image {image} pull completed");
        Ok(())
    }

    fn launch(&self, image: &ImageRef) -> Result<Box<dyn Sandbox>, RuntimeError> {
        let output = Command::new(&self.program)
            .args(["run", "-d", "-t", &image.to_string(), "/bin/bash"])
            .output()
            .map_err(|e| RuntimeError::LaunchFailed(format!("{} run: {e}", self.program)))?;

        if !output.status.success() {
            return Err(RuntimeError::LaunchFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if container_id.is_empty() {
            return Err(RuntimeError::LaunchFailed(format!(
                "{} run returned no container id",
                self.program
            )));
        }
        info!("launched container {}", short(&container_id));

        Ok(Box::new(ContainerSandbox {
            program: self.program.clone(),
            container_id,
        }))
    }
}

pub struct ContainerSandbox {
    program: String,
    container_id: String,
}

impl ContainerSandbox {
    fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

fn short(id: &str) -> &str {
    &id[..12.min(id.len())]
}

fn combined(output: &Output) -> ExecOutput {
    let mut bytes = output.stdout.clone();
    bytes.extend_from_slice(&output.stderr);
    ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        output: bytes,
    }
}

impl Sandbox for ContainerSandbox {
    fn id(&self) -> &str {
        &self.container_id
    }

    fn exec(&self, command: &str, workdir: Option<&str>) -> Result<ExecOutput, RuntimeError> {
        let mut cmd = self.command();
        cmd.arg("exec");
        if let Some(dir) = workdir {
            cmd.args(["-w", dir]);
        }
        cmd.args([self.container_id.as_str(), "sh", "-c", command]);

        let output = cmd
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{} exec: {e}", self.program)))?;
        Ok(combined(&output))
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> Result<ExecOutput, RuntimeError> {
        let script = format!("cat > {}", shell_quote(path));
        let mut child = self
            .command()
            .args(["exec", "-i", self.container_id.as_str(), "sh", "-c", &script])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::ExecFailed(format!("{} exec: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents)?;
        }
        let output = child.wait_with_output()?;
        Ok(combined(&output))
    }

    fn archive(&self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let source = format!("{}:{path}", self.container_id);
        let output = self
            .command()
            .args(["cp", &source, "-"])
            .output()
            .map_err(|e| RuntimeError::ArchiveFailed(format!("{} cp: {e}", self.program)))?;

        if !output.status.success() {
            return Err(RuntimeError::ArchiveFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }
        Ok(output.stdout)
    }

    fn destroy(&self) -> Result<(), RuntimeError> {
        let _ = self
            .command()
            .args(["kill", self.container_id.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let output = self
            .command()
            .args(["rm", "-f", self.container_id.as_str()])
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{} rm: {e}", self.program)))?;
        if !output.status.success() {
            return Err(RuntimeError::ExecFailed(format!(
                "failed to remove container {}: {}",
                short(&self.container_id),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("removed container {}", short(&self.container_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_name_is_program() {
        assert_eq!(ContainerCliBackend::new("podman").name(), "podman");
    }

    #[test]
    fn missing_program_is_unavailable() {
        let backend = ContainerCliBackend::new("stackpack-no-such-container-cli");
        assert!(!backend.available());
    }

    #[test]
    fn missing_program_fails_launch() {
        let backend = ContainerCliBackend::new("stackpack-no-such-container-cli");
        let image = ImageRef {
            repository: "rockylinux/rockylinux".to_owned(),
            tag: "9.2".to_owned(),
        };
        assert!(matches!(
            backend.launch(&image),
            Err(RuntimeError::LaunchFailed(_))
        ));
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
        assert_eq!(short("abc"), "abc");
    }
}

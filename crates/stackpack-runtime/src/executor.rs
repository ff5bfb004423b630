//! Scoped ownership of a launched sandbox and its execution log.
//!
//! `SandboxExecutor` is the only way the pipeline talks to a sandbox. Every
//! command goes through it so it is logged in issue order, and teardown of
//! both resources happens exactly once: on [`SandboxExecutor::close`] or, if
//! the executor is dropped on an error path, in `Drop`.

use crate::backend::{ExecOutput, Sandbox};
use crate::log::ExecutionLog;
use crate::RuntimeError;
use tracing::{debug, warn};

pub struct SandboxExecutor {
    sandbox: Box<dyn Sandbox>,
    log: ExecutionLog,
    closed: bool,
}

impl SandboxExecutor {
    pub fn new(sandbox: Box<dyn Sandbox>, log: ExecutionLog) -> Self {
        Self {
            sandbox,
            log,
            closed: false,
        }
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn exec(&mut self, command: &str) -> Result<ExecOutput, RuntimeError> {
        self.run(command, None)
    }

    /// Run `command` with `workdir` as its working directory.
    pub fn exec_in(&mut self, command: &str, workdir: &str) -> Result<ExecOutput, RuntimeError> {
        self.run(command, Some(workdir))
    }

    fn run(&mut self, command: &str, workdir: Option<&str>) -> Result<ExecOutput, RuntimeError> {
        debug!("exec: {command}");
        self.log.begin(command)?;
        let result = self.sandbox.exec(command, workdir);
        let out = self.record(result, |out| out.text().into_owned())?;
        if !out.success() {
            debug!("exit {}: {command}", out.exit_code);
        }
        Ok(out)
    }

    pub fn write_file(&mut self, path: &str, contents: &[u8]) -> Result<ExecOutput, RuntimeError> {
        self.log.begin(&format!("write {path}"))?;
        let result = self.sandbox.write_file(path, contents);
        self.record(result, |_| String::from_utf8_lossy(contents).into_owned())
    }

    pub fn archive(&mut self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        self.log.begin(&format!("archive {path}"))?;
        let result = self.sandbox.archive(path);
        self.record(result, |bytes| format!("{} bytes", bytes.len()))
    }

    /// Finish the open log entry with the output, or the error text.
    fn record<T>(
        &mut self,
        result: Result<T, RuntimeError>,
        describe: impl FnOnce(&T) -> String,
    ) -> Result<T, RuntimeError> {
        match result {
            Ok(value) => {
                self.log.finish(&describe(&value))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(l) = self.log.finish(&format!("error: {e}\n")) {
                    warn!("execution log write failed: {l}");
                }
                Err(e)
            }
        }
    }

    /// Tear down the sandbox and close the log, reporting failures.
    pub fn close(mut self) -> Result<(), RuntimeError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), RuntimeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let destroyed = self.sandbox.destroy();
        let closed = self.log.close();
        destroyed.and(closed)
    }
}

impl Drop for SandboxExecutor {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("sandbox cleanup failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ImageRef, RuntimeBackend};
    use crate::mock::MockBackend;

    fn launch(backend: &MockBackend) -> SandboxExecutor {
        let image = ImageRef {
            repository: "oraclelinux".to_owned(),
            tag: "8.10".to_owned(),
        };
        SandboxExecutor::new(backend.launch(&image).unwrap(), ExecutionLog::in_memory())
    }

    #[test]
    fn commands_are_logged_in_order() {
        let backend = MockBackend::new();
        let mut exec = launch(&backend);
        exec.exec("mkdir /stackpack").unwrap();
        exec.exec_in("rm tmp.tar", "/stackpack/pgaudit").unwrap();
        let commands: Vec<_> = exec.log().entries().iter().map(|e| e.command.as_str()).collect();
        assert_eq!(commands, ["mkdir /stackpack", "rm tmp.tar"]);
        assert_eq!(
            backend.recorded()[1].workdir.as_deref(),
            Some("/stackpack/pgaudit")
        );
    }

    #[test]
    fn failing_command_is_logged_and_returned() {
        let backend = MockBackend::new().with_script("false", 1);
        let mut exec = launch(&backend);
        let out = exec.exec("false").unwrap();
        assert_eq!(out.exit_code, 1);
        assert_eq!(exec.log().entries().len(), 1);
    }

    struct VanishedEngine;

    impl Sandbox for VanishedEngine {
        fn id(&self) -> &str {
            "gone"
        }

        fn exec(&self, _: &str, _: Option<&str>) -> Result<ExecOutput, RuntimeError> {
            Err(RuntimeError::ExecFailed("engine not running".to_owned()))
        }

        fn write_file(&self, _: &str, _: &[u8]) -> Result<ExecOutput, RuntimeError> {
            Err(RuntimeError::ExecFailed("engine not running".to_owned()))
        }

        fn archive(&self, _: &str) -> Result<Vec<u8>, RuntimeError> {
            Err(RuntimeError::ArchiveFailed("engine not running".to_owned()))
        }

        fn destroy(&self) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    #[test]
    fn exec_error_is_still_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::create(dir.path()).unwrap();
        let path = log.path().unwrap().to_path_buf();
        let mut exec = SandboxExecutor::new(Box::new(VanishedEngine), log);

        assert!(exec.exec("dnf -qy module disable postgresql").is_err());
        assert!(exec.write_file("/stackpack/METADATA", b"x").is_err());
        assert!(exec.archive("/stackpack").is_err());

        let entries = exec.log().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].command, "dnf -qy module disable postgresql");
        assert!(entries[0].output.contains("engine not running"));
        assert_eq!(entries[2].command, "archive /stackpack");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("] dnf -qy module disable postgresql\nerror: "));
    }

    #[test]
    fn close_tears_down_once() {
        let backend = MockBackend::new();
        let exec = launch(&backend);
        exec.close().unwrap();
        assert_eq!(backend.teardowns(), 1);
    }

    #[test]
    fn drop_tears_down_once() {
        let backend = MockBackend::new();
        {
            let mut exec = launch(&backend);
            exec.exec("true").unwrap();
        }
        assert_eq!(backend.teardowns(), 1);
    }
}

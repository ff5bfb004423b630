//! Append-only record of every command issued to a sandbox during one run.
//!
//! A file-backed log lives at `<dir>/<timestamp>.log`. A command's header is
//! flushed before the command runs and its output after it returns, so a
//! hung or failed command is still on record.

use crate::RuntimeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub output: String,
}

impl ExecutionLogEntry {
    fn header(&self) -> String {
        format!("\n[{}] {}\n", self.timestamp.to_rfc3339(), self.command)
    }
}

#[derive(Debug)]
pub struct ExecutionLog {
    path: Option<PathBuf>,
    file: Option<File>,
    entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
    /// Create `dir` if needed and open a fresh timestamp-named log file in it.
    pub fn create(dir: &Path) -> Result<Self, RuntimeError> {
        std::fs::create_dir_all(dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let mut path = dir.join(format!("{stamp}.log"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}-{n}.log"));
            n += 1;
        }

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;
        tracing::debug!("execution log: {}", path.display());

        Ok(Self {
            path: Some(path),
            file: Some(file),
            entries: Vec::new(),
        })
    }

    /// A log that keeps entries in memory only.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: None,
            entries: Vec::new(),
        }
    }

    /// Record `command` before it runs. Its output follows via [`Self::finish`].
    pub fn begin(&mut self, command: &str) -> Result<(), RuntimeError> {
        let entry = ExecutionLogEntry {
            timestamp: Utc::now(),
            command: command.to_owned(),
            output: String::new(),
        };
        let header = entry.header();
        self.entries.push(entry);
        self.write(&header)
    }

    /// Attach `output` to the most recent entry.
    pub fn finish(&mut self, output: &str) -> Result<(), RuntimeError> {
        if let Some(entry) = self.entries.last_mut() {
            entry.output.push_str(output);
        }
        self.write(output)
    }

    pub fn append(&mut self, command: &str, output: &str) -> Result<(), RuntimeError> {
        self.begin(command)?;
        self.finish(output)
    }

    fn write(&mut self, text: &str) -> Result<(), RuntimeError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(text.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and close the file. Further appends are kept in memory only.
    pub fn close(&mut self) -> Result<(), RuntimeError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}

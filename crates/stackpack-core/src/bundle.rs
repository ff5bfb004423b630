use crate::CoreError;
use serde::Serialize;
use stackpack_runtime::SandboxExecutor;
use stackpack_schema::Specification;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Name of the manifest written at the root of the work directory.
pub const MANIFEST_FILE: &str = "METADATA";

/// What ended up on disk.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BundleReport {
    pub path: PathBuf,
    pub size: u64,
    pub entries: usize,
    pub blake3: String,
}

/// Writes the manifest into the sandbox workspace and pulls the workspace
/// tree out as the output archive.
pub struct BundleAssembler<'a> {
    work_dir: &'a str,
    output: &'a Path,
}

impl<'a> BundleAssembler<'a> {
    pub fn new(work_dir: &'a str, output: &'a Path) -> Self {
        Self { work_dir, output }
    }

    pub fn assemble(
        &self,
        executor: &mut SandboxExecutor,
        spec: &Specification,
    ) -> Result<BundleReport, CoreError> {
        let manifest_path = format!("{}/{MANIFEST_FILE}", self.work_dir);
        let out = executor.write_file(&manifest_path, spec.manifest_text().as_bytes())?;
        if !out.success() {
            return Err(CoreError::Command {
                step: "assemble".to_owned(),
                command: format!("write {manifest_path}"),
                exit_code: out.exit_code,
                output: out.text().into_owned(),
            });
        }

        info!("retrieving {} from sandbox", self.work_dir);
        let archive = executor
            .archive(self.work_dir)
            .map_err(|e| CoreError::Bundle(e.to_string()))?;
        let entries = count_entries(&archive)?;

        write_atomic(self.output, &archive)
            .map_err(|e| CoreError::Bundle(format!("{}: {e}", self.output.display())))?;
        info!(
            "wrote {} ({} bytes, {entries} entries)",
            self.output.display(),
            archive.len()
        );

        Ok(BundleReport {
            path: self.output.to_path_buf(),
            size: archive.len() as u64,
            entries,
            blake3: blake3::hash(&archive).to_hex().to_string(),
        })
    }
}

fn count_entries(archive: &[u8]) -> Result<usize, CoreError> {
    let mut ar = tar::Archive::new(archive);
    let entries = ar
        .entries()
        .map_err(|e| CoreError::Bundle(format!("invalid archive stream: {e}")))?;
    let mut n = 0;
    for entry in entries {
        entry.map_err(|e| CoreError::Bundle(format!("invalid archive entry: {e}")))?;
        n += 1;
    }
    Ok(n)
}

fn write_atomic(dest: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

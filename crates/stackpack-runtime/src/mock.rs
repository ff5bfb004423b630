use crate::backend::{ExecOutput, ImageRef, RuntimeBackend, Sandbox};
use crate::RuntimeError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scripted outcome for commands containing `pattern`.
#[derive(Debug, Clone)]
struct Script {
    pattern: String,
    exit_code: i32,
    output: String,
    /// Remaining matches before the script stops applying. `None` = forever.
    remaining: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub command: String,
    pub workdir: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    scripts: Vec<Script>,
    missing_images: BTreeSet<String>,
    refuse_launch: bool,
    image_lookups: Vec<String>,
    launches: usize,
    teardowns: usize,
    commands: Vec<RecordedCommand>,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// In-process backend for tests.
///
/// Every command succeeds unless a script says otherwise. `mkdir` commands
/// and `write_file` calls are reflected in a simulated filesystem, so
/// `archive` returns a real tar stream of the workspace tree. All handles
/// share state, so a test can keep the backend and inspect what happened
/// after the sandbox was consumed.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
    state
        .lock()
        .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `exit_code`.
    #[must_use]
    pub fn with_script(self, pattern: &str, exit_code: i32) -> Self {
        self.push_script(pattern, exit_code, None)
    }

    /// Like [`with_script`](Self::with_script) but only for the first `times` matches.
    #[must_use]
    pub fn with_script_times(self, pattern: &str, exit_code: i32, times: usize) -> Self {
        self.push_script(pattern, exit_code, Some(times))
    }

    /// `ensure_image` fails for this `repository:tag`.
    #[must_use]
    pub fn with_missing_image(self, image: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.missing_images.insert(image.to_owned());
        }
        self
    }

    /// `launch` fails, as when the engine cannot start a container.
    #[must_use]
    pub fn with_failing_launch(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.refuse_launch = true;
        }
        self
    }

    fn push_script(self, pattern: &str, exit_code: i32, remaining: Option<usize>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.scripts.push(Script {
                pattern: pattern.to_owned(),
                exit_code,
                output: format!("mock: scripted exit {exit_code}\n"),
                remaining,
            });
        }
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.commands.iter().map(|c| c.command.clone()).collect())
            .unwrap_or_default()
    }

    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    pub fn image_lookups(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.image_lookups.clone())
            .unwrap_or_default()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().map(|s| s.launches).unwrap_or(0)
    }

    pub fn teardowns(&self) -> usize {
        self.state.lock().map(|s| s.teardowns).unwrap_or(0)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.files.get(path).cloned())
    }
}

impl RuntimeBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn ensure_image(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        let mut state = lock(&self.state)?;
        let key = image.to_string();
        state.image_lookups.push(key.clone());
        if state.missing_images.contains(&key) {
            return Err(RuntimeError::ImageNotFound(key));
        }
        Ok(())
    }

    fn launch(&self, image: &ImageRef) -> Result<Box<dyn Sandbox>, RuntimeError> {
        let mut state = lock(&self.state)?;
        if state.refuse_launch {
            return Err(RuntimeError::LaunchFailed(format!("mock refused to run {image}")));
        }
        state.launches += 1;
        Ok(Box::new(MockSandbox {
            id: format!("mock-{}", state.launches),
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockSandbox {
    id: String,
    state: Arc<Mutex<MockState>>,
}

fn strip_quotes(arg: &str) -> &str {
    arg.trim_matches('\'').trim_matches('"')
}

fn record_mkdir(state: &mut MockState, command: &str) {
    let mut args = command.split_whitespace();
    if args.next() != Some("mkdir") {
        return;
    }
    for arg in args.filter(|a| !a.starts_with('-')) {
        let path = strip_quotes(arg).trim_end_matches('/');
        // `mkdir -p` semantics: every ancestor exists too.
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            prefix.push('/');
            prefix.push_str(part);
            state.dirs.insert(prefix.clone());
        }
    }
}

fn under<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if path == root {
        Some("")
    } else {
        path.strip_prefix(root).filter(|rest| rest.starts_with('/'))
    }
}

impl Sandbox for MockSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn exec(&self, command: &str, workdir: Option<&str>) -> Result<ExecOutput, RuntimeError> {
        let mut state = lock(&self.state)?;
        state.commands.push(RecordedCommand {
            command: command.to_owned(),
            workdir: workdir.map(str::to_owned),
        });

        let scripted = state
            .scripts
            .iter_mut()
            .find(|s| s.remaining != Some(0) && command.contains(&s.pattern));
        if let Some(script) = scripted {
            if let Some(n) = script.remaining.as_mut() {
                *n -= 1;
            }
            let out = ExecOutput {
                exit_code: script.exit_code,
                output: script.output.clone().into_bytes(),
            };
            if out.success() {
                record_mkdir(&mut state, command);
            }
            return Ok(out);
        }

        record_mkdir(&mut state, command);
        Ok(ExecOutput {
            exit_code: 0,
            output: format!("mock-exec: {command}\n").into_bytes(),
        })
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> Result<ExecOutput, RuntimeError> {
        let mut state = lock(&self.state)?;
        state.commands.push(RecordedCommand {
            command: format!("write {path}"),
            workdir: None,
        });
        state.files.insert(path.to_owned(), contents.to_vec());
        Ok(ExecOutput {
            exit_code: 0,
            output: Vec::new(),
        })
    }

    fn archive(&self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let state = lock(&self.state)?;
        let root = path.trim_end_matches('/');
        if !state.dirs.contains(root) {
            return Err(RuntimeError::ArchiveFailed(format!(
                "no such directory in sandbox: {root}"
            )));
        }
        let base = root.rsplit('/').next().unwrap_or(root);

        let mut ar = tar::Builder::new(Vec::new());
        for dir in &state.dirs {
            if let Some(rest) = under(root, dir) {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                header.set_mtime(0);
                header.set_cksum();
                ar.append_data(&mut header, format!("{base}{rest}/"), std::io::empty())?;
            }
        }
        for (file, contents) in &state.files {
            if let Some(rest) = under(root, file) {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(contents.len() as u64);
                header.set_mtime(0);
                header.set_cksum();
                ar.append_data(&mut header, format!("{base}{rest}"), contents.as_slice())?;
            }
        }
        Ok(ar.into_inner()?)
    }

    fn destroy(&self) -> Result<(), RuntimeError> {
        let mut state = lock(&self.state)?;
        state.teardowns += 1;
        Ok(())
    }
}

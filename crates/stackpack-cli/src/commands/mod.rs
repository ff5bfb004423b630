pub mod build;
pub mod check;
pub mod completions;
pub mod versions;

use indicatif::{ProgressBar, ProgressStyle};
use stackpack_core::{CoreError, ErrorKind};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_ENVIRONMENT_ERROR: u8 = 3;

/// A failed command: the message for stderr and the process exit code.
#[derive(Debug)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

impl From<CoreError> for CommandError {
    fn from(e: CoreError) -> Self {
        Self {
            code: exit_code_for(e.kind()),
            message: e.to_string(),
        }
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self {
            code: EXIT_FAILURE,
            message,
        }
    }
}

pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Configuration | ErrorKind::Validation => EXIT_CONFIG_ERROR,
        ErrorKind::Environment => EXIT_ENVIRONMENT_ERROR,
        ErrorKind::Command | ErrorKind::ArtifactUnavailable => EXIT_FAILURE,
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "success" | "ok" => Style::new().green().apply_to(status).to_string(),
        "failed" => Style::new().red().bold().apply_to(status).to_string(),
        "nested" => Style::new().cyan().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
        assert_ne!(EXIT_CONFIG_ERROR, EXIT_ENVIRONMENT_ERROR);
    }

    #[test]
    fn exit_code_per_kind() {
        assert_eq!(exit_code_for(ErrorKind::Configuration), EXIT_CONFIG_ERROR);
        assert_eq!(exit_code_for(ErrorKind::Validation), EXIT_CONFIG_ERROR);
        assert_eq!(
            exit_code_for(ErrorKind::Environment),
            EXIT_ENVIRONMENT_ERROR
        );
        assert_eq!(exit_code_for(ErrorKind::Command), EXIT_FAILURE);
        assert_eq!(exit_code_for(ErrorKind::ArtifactUnavailable), EXIT_FAILURE);
    }

    #[test]
    fn core_error_maps_to_exit_code() {
        let e = CommandError::from(CoreError::UnhandledOption("pgbouncer".to_owned()));
        assert_eq!(e.code, EXIT_CONFIG_ERROR);
        assert!(e.message.contains("pgbouncer"));

        let e = CommandError::from(CoreError::Environment("no image".to_owned()));
        assert_eq!(e.code, EXIT_ENVIRONMENT_ERROR);
    }

    #[test]
    fn colorize_status_keeps_text() {
        assert!(colorize_status("success").contains("success"));
        assert!(colorize_status("failed").contains("failed"));
        assert_eq!(colorize_status("unknown"), "unknown");
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}

use std::fmt;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn engine_responds(program: &str) -> bool {
    Command::new(program)
        .arg("info")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check prerequisites for the named backend.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_backend_prereqs(backend: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    match backend {
        "mock" => {}
        "docker" | "podman" => {
            if !command_exists(backend) {
                missing.push(MissingPrereq {
                    name: backend.to_owned(),
                    purpose: "container sandbox for package collection",
                    install_hint: if backend == "docker" {
                        "apt install docker.io | dnf install docker-ce | see https://docs.docker.com/engine/install/"
                    } else {
                        "apt install podman | dnf install podman | zypper install podman"
                    },
                });
            } else if !engine_responds(backend) {
                missing.push(MissingPrereq {
                    name: format!("{backend} engine"),
                    purpose: "running sandbox containers",
                    install_hint: if backend == "docker" {
                        "start the daemon (systemctl start docker) and check socket permissions"
                    } else {
                        "check `podman info` output for storage or cgroup errors"
                    },
                });
            }
        }
        other => missing.push(MissingPrereq {
            name: other.to_owned(),
            purpose: "unknown sandbox backend",
            install_hint: "use one of: docker, podman, mock",
        }),
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nstackpack needs a working container engine to collect packages.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "podman".to_owned(),
            purpose: "container sandbox",
            install_hint: "dnf install podman",
        };
        let s = format!("{m}");
        assert!(s.contains("podman"));
        assert!(s.contains("container sandbox"));
        assert!(s.contains("dnf install podman"));
    }

    #[test]
    fn mock_backend_has_no_prereqs() {
        assert!(check_backend_prereqs("mock").is_empty());
    }

    #[test]
    fn unknown_backend_is_reported() {
        let missing = check_backend_prereqs("lxc");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "lxc");
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![MissingPrereq {
            name: "docker engine".to_owned(),
            purpose: "running sandbox containers",
            install_hint: "systemctl start docker",
        }];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("docker engine"));
    }
}

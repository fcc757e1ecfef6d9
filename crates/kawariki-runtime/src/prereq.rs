use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
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

/// Whether `path` is a regular file with any execute bit set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn user_namespaces_work() -> bool {
    Command::new("unshare")
        .args(["--user", "--map-root-user", "--mount", "--fork", "true"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check what namespace file overlays need.
/// Returns a list of missing items. Empty list means overlays will work.
pub fn check_overlay_prereqs(helper: Option<&Path>) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    match helper {
        None => missing.push(MissingPrereq {
            name: "overlayns",
            purpose: "per-process file overlays",
            install_hint: "only bundled for linux-x86_64 hosts",
        }),
        Some(path) if !is_executable(path) => missing.push(MissingPrereq {
            name: "overlayns-static",
            purpose: "per-process file overlays",
            install_hint: "place an executable overlayns-static in the application root",
        }),
        Some(_) => {}
    }

    if !user_namespaces_work() {
        missing.push(MissingPrereq {
            name: "user namespaces",
            purpose: "unprivileged mount namespaces for overlays",
            install_hint:
                "enable CONFIG_USER_NS=y in kernel, or: sysctl kernel.unprivileged_userns_clone=1",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str(
        "\nWithout them Kawariki patches game files in place and restores them after the session.",
    );
    msg
}

use super::{CommandResult, EXIT_SUCCESS};
use std::io::Write;

/// Rewrite a Windows-style path with forward slashes, dropping empty and
/// `.` components.
pub fn fix_path(path: &str) -> String {
    let rooted = path.starts_with(['\\', '/']);
    let parts: Vec<&str> = path
        .split(['\\', '/'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

pub fn run(path: &str) -> CommandResult {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(fix_path(path).as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| format!("failed to write path: {e}"))?;
    Ok(EXIT_SUCCESS)
}

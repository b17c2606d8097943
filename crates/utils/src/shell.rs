//! Executable lookup

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Resolve an executable by name, falling back to a login-shell PATH if needed.
///
/// The search order is:
/// 1. Explicit absolute paths.
/// 2. The current process PATH via `which`.
/// 3. The PATH reported by the user's login shell, merged after the process PATH.
pub fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    if let Ok(found) = which::which(executable) {
        return Some(found);
    }

    let existing = std::env::var_os("PATH").unwrap_or_default();
    let refreshed = login_shell_path()?;
    let merged = merge_paths(&existing, refreshed);
    if merged == existing {
        return None;
    }
    tracing::debug!(?existing, ?merged, "Searching refreshed PATH for {executable}");
    let cwd = std::env::current_dir().ok()?;
    which::which_in(executable, Some(merged), cwd).ok()
}

/// Merge two PATH strings into a single, de-duplicated PATH.
///
/// - Keeps the order of entries from `primary`.
/// - Appends only *unseen* entries from `secondary`.
/// - Ignores empty components.
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

#[cfg(not(windows))]
fn login_shell_path() -> Option<OsString> {
    use std::process::{Command, Stdio};

    let shell = std::env::var_os("SHELL").unwrap_or_else(|| OsString::from("/bin/sh"));
    let output = Command::new(shell)
        .args(["-l", "-c", "printf '%s' \"$PATH\""])
        .env("TERM", "dumb")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(OsString::from(path))
    }
}

#[cfg(windows)]
fn login_shell_path() -> Option<OsString> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_paths_keeps_primary_order_and_dedups() {
        let primary = join_paths(["/usr/bin", "/bin"]).unwrap();
        let secondary = join_paths(["/bin", "/opt/bin", ""]).unwrap();
        let merged = merge_paths(&primary, &secondary);
        let parts: Vec<PathBuf> = split_paths(&merged).collect();
        assert_eq!(
            parts,
            vec![
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
                PathBuf::from("/opt/bin")
            ]
        );
    }

    #[test]
    fn empty_name_is_not_resolved() {
        assert!(resolve_executable_path("  ").is_none());
    }
}

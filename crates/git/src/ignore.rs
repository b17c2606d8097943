//! Ignore rules: matching paths, and rule files kept out of version control.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use utils::log::traced;

use crate::{RepoError, repo::GitRepo};

impl GitRepo {
    /// Rules local to this repository that are never committed
    /// (`info/exclude`, shared by all worktrees).
    pub fn untracked_ignore_path(&self) -> PathBuf {
        self.common_dir().join("info").join("exclude")
    }

    /// Whether the ignore rules match `path`, absolute or relative to the
    /// work tree. Tracked files are matched too.
    pub fn check_ignore(&self, path: &Path) -> Result<bool, RepoError> {
        let rel = self.workdir_relative(path)?;
        let ignored = self.backend().is_ignored(&rel)?;
        tracing::debug!(
            "{} is {}ignored",
            rel.display(),
            if ignored { "" } else { "not " }
        );
        Ok(ignored)
    }

    /// Append the `rules` that `config_path` does not have yet.
    pub fn ignore<I, S>(&self, rules: I, config_path: &Path) -> Result<(), RepoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let existing = read_ignore_rules(config_path)?;
        let mut added: Vec<String> = Vec::new();
        for rule in rules {
            let rule = rule.as_ref().trim();
            if rule.contains(['\n', '\r']) {
                return Err(RepoError::InvalidArgument(format!(
                    "ignore rule {rule:?} spans several lines"
                )));
            }
            if rule.is_empty() || existing.iter().chain(&added).any(|r| r == rule) {
                continue;
            }
            added.push(rule.to_string());
        }
        if added.is_empty() {
            return Ok(());
        }
        traced(
            format!("Add ignore rules {added:?} to {}", config_path.display()),
            || append_rules(config_path, &added),
        )
    }

    /// Rules in `config_path`, without comments or blank lines.
    pub fn ignore_rules(&self, config_path: &Path) -> Result<Vec<String>, RepoError> {
        read_ignore_rules(config_path)
    }
}

fn read_ignore_rules(path: &Path) -> Result<Vec<String>, RepoError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn append_rules(path: &Path, rules: &[String]) -> Result<(), RepoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let needs_newline = fs::read(path)
        .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
        .unwrap_or(false);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_newline {
        file.write_all(b"\n")?;
    }
    for rule in rules {
        writeln!(file, "{rule}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_skip_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclude");
        fs::write(&path, "# local only\n\n*.log\n  build/  \n").unwrap();
        assert_eq!(read_ignore_rules(&path).unwrap(), vec!["*.log", "build/"]);
        assert!(read_ignore_rules(&dir.path().join("none")).unwrap().is_empty());
    }

    #[test]
    fn appended_rules_start_on_a_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info").join("exclude");
        append_rules(&path, &["a".to_string()]).unwrap();
        fs::write(&path, "a\nno-newline").unwrap();
        append_rules(&path, &["b".to_string()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nno-newline\nb\n");
    }
}

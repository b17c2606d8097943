//! Working tree cleanup, resets, config and object alternates.

use std::path::{Path, PathBuf};

use utils::log::traced;

use crate::{RepoError, backend::ResetMode, pointer::GitPointer, repo::GitRepo};

/// How deep [`GitRepo::all_alternates`] follows chained alternates by default.
pub const DEFAULT_ALTERNATES_DEPTH: usize = 5;

impl GitRepo {
    /// Remove untracked files, and with the flags untracked directories and
    /// ignored files too.
    pub fn clean(&self, include_directories: bool, include_ignored: bool) -> Result<(), RepoError> {
        traced("Clean the work tree", || {
            self.backend().clean(include_directories, include_ignored)
        })
    }

    /// Force the index and working tree back to HEAD.
    pub fn discard_changes(&self) -> Result<(), RepoError> {
        traced("Discard local changes", || self.backend().discard_changes())
    }

    /// Reset to HEAD, discarding working tree changes when `hard`.
    pub fn reset(&self, hard: bool) -> Result<(), RepoError> {
        let head = self.commit_for(&GitPointer::Unknown("HEAD".to_string()))?;
        self.reset_to(&head, hard)
    }

    pub fn reset_to(&self, commit: &str, hard: bool) -> Result<(), RepoError> {
        let mode = if hard { ResetMode::Hard } else { ResetMode::Mixed };
        traced(format!("Reset to {commit} ({mode:?})"), || {
            let oid = self.commit_for(&GitPointer::Commit(commit.to_string()))?;
            self.backend().reset(&oid, mode)
        })
    }

    pub fn config(&self, key: &str) -> Result<Option<String>, RepoError> {
        self.backend().config_get(key)
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), RepoError> {
        traced(format!("Set config `{key}`"), || {
            self.backend().config_set(key, value)
        })
    }

    pub fn unset_config(&self, key: &str) -> Result<(), RepoError> {
        self.backend().config_unset(key)
    }

    /// `author.name`, falling back to the user's global config.
    pub fn author_name(&self) -> Result<Option<String>, RepoError> {
        self.config_or_global("author.name")
    }

    /// `author.email`, falling back to the user's global config.
    pub fn author_email(&self) -> Result<Option<String>, RepoError> {
        self.config_or_global("author.email")
    }

    fn config_or_global(&self, key: &str) -> Result<Option<String>, RepoError> {
        if let Some(value) = self.config(key)? {
            return Ok(Some(value));
        }
        let global = git2::Config::open_default()?;
        match global.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Include the config file at `path`. Linked worktrees get it in their
    /// own `config.worktree` so other checkouts are unaffected.
    pub fn include_config(&self, path: &Path) -> Result<(), RepoError> {
        let value = path.to_string_lossy();
        if !self.is_worktree() {
            if self.config("include.path")?.as_deref() == Some(value.as_ref()) {
                return Ok(());
            }
            return self.set_config("include.path", &value);
        }
        traced(format!("Include config {value} in worktree"), || {
            self.backend().config_set("extensions.worktreeConfig", "true")?;
            let mut config = git2::Config::open(&self.git_dir().join("config.worktree"))?;
            config.set_str("include.path", &value)?;
            Ok(())
        })
    }

    /// Object directories borrowed directly through `objects/info/alternates`.
    pub fn alternates(&self) -> Result<Vec<PathBuf>, RepoError> {
        self.all_alternates(1)
    }

    /// Alternates followed through up to `max_depth` levels, without repeats.
    pub fn all_alternates(&self, max_depth: usize) -> Result<Vec<PathBuf>, RepoError> {
        let mut found: Vec<PathBuf> = Vec::new();
        let mut frontier = vec![self.common_dir().join("objects")];
        for _ in 0..max_depth {
            let mut next = Vec::new();
            for objects in &frontier {
                for alternate in read_alternates(objects)? {
                    if !found.contains(&alternate) {
                        found.push(alternate.clone());
                        next.push(alternate);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(found)
    }
}

/// Entries of `<objects>/info/alternates`; relative ones resolve against `objects`.
fn read_alternates(objects: &Path) -> Result<Vec<PathBuf>, RepoError> {
    let file = objects.join("info").join("alternates");
    let content = match std::fs::read_to_string(&file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let path = Path::new(line);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                objects.join(path)
            }
        })
        .collect())
}

use std::path::{Path, PathBuf};

use utils::log::traced;

use crate::{RepoError, backend::WorktreeInfo, repo::GitRepo, validation::ensure_branch_name};

impl GitRepo {
    /// Add a linked worktree at `path`, named after its final component.
    ///
    /// Checks out `branch` when given; otherwise a branch named after the
    /// worktree is created at HEAD.
    pub fn add_worktree(&self, path: &Path, branch: Option<&str>) -> Result<(), RepoError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RepoError::InvalidArgument(format!("worktree path `{}` has no name", path.display()))
            })?;
        if branch.is_none() {
            ensure_branch_name(name)?;
        }
        let description = match branch {
            Some(branch) => format!("Add worktree `{name}` at {} on `{branch}`", path.display()),
            None => format!("Add worktree `{name}` at {}", path.display()),
        };
        traced(description, || self.backend().worktree_add(path, branch))
    }

    /// Linked worktrees, sorted by name.
    pub fn worktrees(&self) -> Result<Vec<WorktreeInfo>, RepoError> {
        self.backend().worktrees()
    }

    /// Forget the worktree `name`. Without `force`, one whose directory still
    /// exists is kept. Returns the path that was pruned.
    pub fn prune_worktree(&self, name: &str, force: bool) -> Result<Option<PathBuf>, RepoError> {
        let pruned = traced(format!("Prune worktree `{name}`"), || {
            self.backend().worktree_prune(name, force)
        })?;
        if pruned.is_none() {
            tracing::debug!("Worktree `{name}` is still in use, skip prune.");
        }
        Ok(pruned)
    }

    /// Remove all linked worktree metadata. Worktree directories are left alone.
    pub fn clean_worktrees(&self) -> Result<(), RepoError> {
        let dir = self.worktrees_metadata_dir();
        if !dir.is_dir() {
            return Ok(());
        }
        traced(format!("Remove {}", dir.display()), || {
            std::fs::remove_dir_all(&dir).map_err(RepoError::from)
        })
    }
}

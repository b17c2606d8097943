//! Working tree status and the description of HEAD.

use std::path::Path;

use utils::log::traced;

use crate::{
    RepoError,
    backend::{HeadState, StatusEntry},
    pointer::GitPointer,
    repo::GitRepo,
};

impl GitRepo {
    pub fn head(&self) -> Result<HeadState, RepoError> {
        self.backend().head()
    }

    /// Changed paths; untracked files only when `include_untracked`.
    pub fn status(&self, include_untracked: bool) -> Result<Vec<StatusEntry>, RepoError> {
        self.backend().status(include_untracked)
    }

    /// Re-read the index from disk, then report status.
    pub fn fresh_status(&mut self, include_untracked: bool) -> Result<Vec<StatusEntry>, RepoError> {
        self.backend_mut().refresh()?;
        self.backend().status(include_untracked)
    }

    /// Start (`track`) or stop reporting working tree changes to `file` by
    /// toggling its skip-worktree bit. A no-op when already in that state.
    pub fn change_tracking(&self, file: &Path, track: bool) -> Result<(), RepoError> {
        let rel = self.workdir_relative(file)?;
        if self.skips_worktree(&rel)? == !track {
            return Ok(());
        }
        traced(
            format!(
                "{} tracking changes to {}",
                if track { "Resume" } else { "Stop" },
                rel.display()
            ),
            || self.backend().set_skip_worktree(&rel, !track),
        )
    }

    /// Whether the index entry for `file` has its skip-worktree bit set.
    pub fn skips_worktree(&self, file: &Path) -> Result<bool, RepoError> {
        let rel = self.workdir_relative(file)?;
        self.backend()
            .skip_worktree(&rel)?
            .ok_or_else(|| RepoError::NotFound(format!("{} in the index", rel.display())))
    }

    /// No staged, unstaged or untracked changes.
    pub fn is_clean(&self) -> Result<bool, RepoError> {
        Ok(self.status(true)?.is_empty())
    }

    pub fn has_conflicts(&self) -> Result<bool, RepoError> {
        let conflicted = self.status(false)?.iter().any(|e| e.conflicted);
        if conflicted {
            tracing::debug!("There are some conflicts.");
        }
        Ok(conflicted)
    }

    pub fn is_unborn(&self) -> Result<bool, RepoError> {
        Ok(matches!(self.head()?, HeadState::Unborn(_)))
    }

    pub fn current_branch(&self) -> Result<Option<String>, RepoError> {
        Ok(self.head()?.branch().map(str::to_string))
    }

    /// `None` while HEAD is unborn.
    pub fn current_commit(&self) -> Result<Option<String>, RepoError> {
        Ok(self.head()?.oid().map(str::to_string))
    }

    /// The first tag, by name, on the detached HEAD commit.
    pub fn current_tag(&self) -> Result<Option<String>, RepoError> {
        match self.head()? {
            HeadState::Detached(oid) => self.tag_for(&oid),
            _ => Ok(None),
        }
    }

    /// Where HEAD is, most specific name first: the branch (born or not),
    /// else a tag on the detached commit, else the commit itself.
    pub fn current_describe(&self) -> Result<GitPointer, RepoError> {
        let pointer = match self.head()? {
            HeadState::Unborn(name) | HeadState::Branch { name, .. } => GitPointer::Branch(name),
            HeadState::Detached(oid) => match self.tag_for(&oid)? {
                Some(tag) => GitPointer::Tag(tag),
                None => GitPointer::Commit(oid),
            },
        };
        tracing::debug!("Current HEAD is the {pointer}");
        Ok(pointer)
    }
}

//! Named stashes.
//!
//! Stash ids are positions in the stash list and shift on every mutation, so
//! each operation here looks its stash up by name immediately before acting.

use utils::log::traced;

use crate::{RepoError, backend::Stash, repo::GitRepo};

/// `On main: wip` -> `wip`. Messages without the prefix are returned whole.
pub fn strip_stash_prefix(message: &str) -> &str {
    message
        .strip_prefix("On ")
        .and_then(|rest| rest.split_once(": "))
        .map(|(_, name)| name)
        .unwrap_or(message)
}

impl GitRepo {
    pub fn stashes(&mut self) -> Result<Vec<Stash>, RepoError> {
        self.backend_mut().stash_list()
    }

    /// The most recent stash saved under `name`.
    pub fn find_stash(&mut self, name: &str) -> Result<Option<Stash>, RepoError> {
        Ok(self
            .backend_mut()
            .stash_list()?
            .into_iter()
            .find(|s| strip_stash_prefix(&s.message) == name))
    }

    /// Stash pending changes under `name`. Returns `None` when there was
    /// nothing to save.
    pub fn stash_save(
        &mut self,
        name: &str,
        include_untracked: bool,
    ) -> Result<Option<Stash>, RepoError> {
        let entries = self.fresh_status(include_untracked)?;
        if entries.is_empty() {
            tracing::debug!("No local changes to save.");
            return Ok(None);
        }
        if entries.iter().any(|e| e.conflicted) {
            return Err(RepoError::PreconditionFailed(
                "There are some conflicts, could not stash.".to_string(),
            ));
        }
        let description = format!(
            "Save stash `{name}`{}",
            if include_untracked { " (include untracked)" } else { "" }
        );
        traced(description, || {
            self.backend_mut().stash_save(name, include_untracked)
        })
    }

    /// Apply the stash saved as `name`, dropping it afterwards when `drop`.
    /// A missing stash is not an error.
    pub fn stash_apply(&mut self, name: &str, drop: bool) -> Result<(), RepoError> {
        let operation = if drop { "pop" } else { "apply" };
        self.backend_mut().refresh()?;
        let Some(stash) = self.find_stash(name)? else {
            tracing::debug!("Could not find the stash `{name}`, skip {operation}.");
            return Ok(());
        };
        tracing::debug!("Stash {operation} `{name}` (stash@{{{}}})", stash.id);

        let result = match self.backend_mut().stash_apply(stash.id, true, drop) {
            Err(e) if e.is_retryable() => {
                tracing::debug!("Stash {operation} with index failed ({e}), retry without index.");
                self.backend_mut().refresh()?;
                // A failed apply leaves the list untouched, but look up again anyway.
                match self.find_stash(name)? {
                    Some(stash) => self.backend_mut().stash_apply(stash.id, false, drop),
                    None => Ok(()),
                }
            }
            other => other,
        };
        result.map_err(|e| e.into_repo_error(&format!("stash {operation}")))?;
        self.backend_mut().refresh()
    }

    /// Drop the stash saved as `name`. A missing stash is not an error.
    pub fn stash_delete(&mut self, name: &str) -> Result<(), RepoError> {
        let Some(stash) = self.find_stash(name)? else {
            tracing::debug!("Could not find the stash `{name}`, skip drop.");
            return Ok(());
        };
        traced(format!("Drop stash `{name}` (stash@{{{}}})", stash.id), || {
            self.backend_mut().stash_drop(stash.id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_prefix_is_stripped() {
        assert_eq!(strip_stash_prefix("On main: wip"), "wip");
        assert_eq!(strip_stash_prefix("On feature/x: a: b"), "a: b");
        assert_eq!(strip_stash_prefix("wip"), "wip");
        assert_eq!(strip_stash_prefix("On main"), "On main");
    }
}

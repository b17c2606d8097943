//! Merge analysis and execution.

use std::fmt;

use serde::Serialize;
use utils::log::traced;

use crate::{
    RepoError,
    backend::{HeadState, MergeOutcome},
    pointer::GitPointer,
    repo::GitRepo,
    validation::ensure_oid,
};

/// How one history relates to another through their merge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    UpToDate,
    /// Current has commits the target lacks.
    Forward,
    /// Target has commits current lacks.
    Behind,
    Diverged,
}

impl MergeStatus {
    /// `base` is `None` for unrelated histories, which count as diverged.
    pub fn classify(current: &str, target: &str, base: Option<&str>) -> Self {
        let current_is_base = base == Some(current);
        let target_is_base = base == Some(target);
        match (current_is_base, target_is_base) {
            (true, true) => MergeStatus::UpToDate,
            (true, false) => MergeStatus::Behind,
            (false, true) => MergeStatus::Forward,
            (false, false) => MergeStatus::Diverged,
        }
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeStatus::UpToDate => "up to date",
            MergeStatus::Forward => "forward",
            MergeStatus::Behind => "behind",
            MergeStatus::Diverged => "diverged",
        })
    }
}

impl GitRepo {
    /// Classify `current` (a branch name, default the checked-out branch)
    /// against `target` (default that branch's upstream).
    pub fn check_merge_status(
        &self,
        current: Option<&str>,
        target: Option<&GitPointer>,
    ) -> Result<MergeStatus, RepoError> {
        let (branch, current_oid) = match current {
            Some(name) => (
                name.to_string(),
                self.commit_for(&GitPointer::Branch(name.to_string()))?,
            ),
            None => match self.head()? {
                HeadState::Branch { name, oid } => (name, oid),
                HeadState::Unborn(name) => {
                    return Err(RepoError::PreconditionFailed(format!(
                        "branch `{name}` has no commits yet"
                    )));
                }
                HeadState::Detached(_) => {
                    return Err(RepoError::PreconditionFailed(
                        "Current git is not in a branch.".to_string(),
                    ));
                }
            },
        };
        let target_oid = match target {
            Some(target) => self.commit_for(target)?,
            None => {
                let upstream = self.backend().upstream(&branch)?.ok_or_else(|| {
                    RepoError::PreconditionFailed(format!("branch `{branch}` has no upstream"))
                })?;
                self.commit_for(&GitPointer::Branch(upstream))?
            }
        };
        let base = self.backend().merge_base(&current_oid, &target_oid)?;
        let status = MergeStatus::classify(&current_oid, &target_oid, base.as_deref());
        tracing::debug!("The merge status of `{branch}` is {status}.");
        Ok(status)
    }

    /// `(ahead, behind)`: commits only in `a`, and commits only in `b`.
    pub fn ahead_behind(
        &self,
        a: &GitPointer,
        b: &GitPointer,
    ) -> Result<(usize, usize), RepoError> {
        let (a, b) = (self.commit_for(a)?, self.commit_for(b)?);
        self.backend().ahead_behind(&a, &b)
    }

    /// The most recent of `commits` if they all lie on one line of history.
    ///
    /// Inputs may be abbreviated; duplicates collapse by full oid. Returns
    /// `None` for an empty input or when any two commits are unrelated.
    pub fn calculate_latest_commit<S: AsRef<str>>(
        &self,
        commits: &[S],
    ) -> Result<Option<String>, RepoError> {
        let mut unique: Vec<String> = Vec::new();
        for commit in commits {
            let commit = commit.as_ref();
            ensure_oid(commit)?;
            let oid = self
                .backend()
                .resolve_commit(commit)?
                .ok_or_else(|| RepoError::NotFound(format!("commit `{commit}`")))?;
            if !unique.contains(&oid) {
                unique.push(oid);
            }
        }

        // Newest first.
        let mut chain: Vec<String> = Vec::with_capacity(unique.len());
        for candidate in &unique {
            let Some(position) = self.chain_position(&chain, candidate)? else {
                tracing::debug!("Commit {candidate} is not on the same line of history");
                return Ok(None);
            };
            chain.insert(position, candidate.clone());
        }
        Ok((chain.len() == unique.len())
            .then(|| chain.first().cloned())
            .flatten())
    }

    /// Index where `candidate` is a descendant of the element to its right and
    /// an ancestor of the element to its left.
    fn chain_position(&self, chain: &[String], candidate: &str) -> Result<Option<usize>, RepoError> {
        let backend = self.backend();
        let mut position = chain.len();
        for (i, existing) in chain.iter().enumerate() {
            if backend.is_descendant_of(candidate, existing)? {
                position = i;
                break;
            }
        }
        if position < chain.len() || chain.is_empty() {
            let left_ok = match position.checked_sub(1) {
                Some(left) => backend.is_descendant_of(&chain[left], candidate)?,
                None => true,
            };
            return Ok(left_ok.then_some(position));
        }
        // Older than everything so far.
        let oldest = &chain[chain.len() - 1];
        Ok(backend
            .is_descendant_of(oldest, candidate)?
            .then_some(position))
    }

    /// The branch has commits its track branch lacks.
    pub fn is_forward(&self, branch: Option<&str>) -> Result<bool, RepoError> {
        Ok(self.status_against_track(branch)? == MergeStatus::Forward)
    }

    /// The track branch has commits the branch lacks.
    pub fn is_behind(&self, branch: Option<&str>) -> Result<bool, RepoError> {
        Ok(self.status_against_track(branch)? == MergeStatus::Behind)
    }

    fn status_against_track(&self, branch: Option<&str>) -> Result<MergeStatus, RepoError> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.current_branch()?.ok_or_else(|| {
                RepoError::PreconditionFailed(
                    "Git is not in branch, could not check the merge status.".to_string(),
                )
            })?,
        };
        let track = self.track_branch(Some(&branch), true)?.ok_or_else(|| {
            RepoError::PreconditionFailed(format!("Could not get the track branch of `{branch}`."))
        })?;
        self.check_merge_status(Some(&branch), Some(&GitPointer::Branch(track)))
    }

    /// Merge `pointer` into HEAD.
    pub fn merge(&self, pointer: &GitPointer) -> Result<MergeOutcome, RepoError> {
        if pointer.is_commit() {
            ensure_oid(pointer.value())?;
        }
        traced(format!("Merge with {pointer}"), || {
            let oid = self.commit_for(pointer)?;
            tracing::debug!("Merge from oid {oid}");
            let into = self
                .current_branch()?
                .unwrap_or_else(|| "HEAD".to_string());
            let message = format!("Merge {pointer} into {into}");
            self.backend().merge(&oid, &message)
        })
    }

    /// Whether merging `pointer` into HEAD would conflict. The working tree is
    /// not touched.
    pub fn has_merge_conflict(&self, pointer: &GitPointer) -> Result<bool, RepoError> {
        traced(format!("Check merge conflict with {pointer}"), || {
            let oid = self.commit_for(pointer)?;
            self.backend().would_conflict(&oid)
        })
    }
}

//! Branch listing, creation, checkout and tracking.

use utils::log::traced;

use crate::{
    RepoError,
    backend::{BranchInfo, BranchScope, HeadState},
    pointer::GitPointer,
    repo::GitRepo,
    resolve::ResolveScope,
    validation::ensure_branch_name,
};

impl GitRepo {
    pub fn local_branches(&self) -> Result<Vec<String>, RepoError> {
        Ok(self
            .backend()
            .branches(BranchScope::Local)?
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    /// Remote-tracking branches as `<remote>/<name>`.
    pub fn remote_branches(&self) -> Result<Vec<String>, RepoError> {
        let branches = self.backend().branches(BranchScope::Remote)?;
        tracing::debug!("Found {} remote branch(es)", branches.len());
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    /// Local branches whose tip is `name` or descends from it.
    pub fn local_branches_containing(&self, name: &str) -> Result<Vec<String>, RepoError> {
        self.branches_containing(name, BranchScope::Local)
    }

    /// Remote-tracking branches whose tip is `name` or descends from it.
    pub fn remote_branches_containing(&self, name: &str) -> Result<Vec<String>, RepoError> {
        self.branches_containing(name, BranchScope::Remote)
    }

    fn branches_containing(
        &self,
        name: &str,
        scope: BranchScope,
    ) -> Result<Vec<String>, RepoError> {
        let oid = self.commit_for(&GitPointer::Unknown(name.to_string()))?;
        let mut containing = Vec::new();
        for branch in self.backend().branches(scope)? {
            if branch.oid == oid || self.backend().is_descendant_of(&branch.oid, &oid)? {
                containing.push(branch.name);
            }
        }
        Ok(containing)
    }

    pub fn local_branch(&self, name: &str) -> Result<Option<BranchInfo>, RepoError> {
        Ok(self
            .backend()
            .branches(BranchScope::Local)?
            .into_iter()
            .find(|b| b.name == name))
    }

    /// `<remote>/<name>` under the first remote, by name, that has it.
    pub fn remote_branch(&self, name: &str) -> Result<Option<BranchInfo>, RepoError> {
        let branches = self.backend().branches(BranchScope::Remote)?;
        for remote in self.backend().remotes()? {
            let scoped = format!("{}/{name}", remote.name);
            if let Some(found) = branches.iter().find(|b| b.name == scoped) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    }

    /// Create `name` at `base`, or at HEAD when `None`.
    pub fn create_branch(&self, name: &str, base: Option<&GitPointer>) -> Result<(), RepoError> {
        ensure_branch_name(name)?;
        let description = format!(
            "Create the branch `{name}` (base {})",
            base.map(ToString::to_string)
                .unwrap_or_else(|| "HEAD".to_string())
        );
        traced(description, || {
            let oid = self.base_commit(base)?;
            self.backend().create_branch(name, &oid, false)
        })
    }

    /// Force `name` to point where `point_to` does. `Unknown` is ignored.
    pub fn change_branch(&self, name: &str, point_to: &GitPointer) -> Result<(), RepoError> {
        if point_to.is_unknown() {
            return Ok(());
        }
        ensure_branch_name(name)?;
        traced(format!("Point branch `{name}` at {point_to}"), || {
            let oid = self.commit_for(point_to)?;
            self.backend().create_branch(name, &oid, true)
        })
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        traced(format!("Delete branch `{name}`"), || {
            self.backend().delete_branch(name)
        })
    }

    /// Move HEAD without touching the working tree.
    pub fn set_head(&self, head: &GitPointer) -> Result<(), RepoError> {
        traced(format!("Change HEAD to {head}"), || match head {
            GitPointer::Branch(name) => self.backend().set_head_branch(name),
            GitPointer::Commit(_) | GitPointer::Tag(_) | GitPointer::Unknown(_) => {
                let oid = self.commit_for(head)?;
                self.backend().set_head_detached(&oid)
            }
        })
    }

    /// Check out `target`, optionally creating it as a branch from `base`.
    ///
    /// A no-op when HEAD already is `target`. With an unborn HEAD, checking out
    /// a branch just renames the unborn branch.
    pub fn checkout(
        &self,
        target: &GitPointer,
        base: Option<&GitPointer>,
        create: bool,
        force: bool,
    ) -> Result<(), RepoError> {
        let current = self.current_describe()?;
        if target.matches(&current) {
            tracing::debug!("Current status is the {target}, skip checkout.");
            return Ok(());
        }
        let unborn = self.is_unborn()?;

        if create && target.is_branch() {
            ensure_branch_name(target.value())?;
            match base {
                Some(base) if base != target => {
                    traced(format!("Create the new {target} based on {base}"), || {
                        let oid = self.base_commit(Some(base))?;
                        self.backend().create_branch(target.value(), &oid, false)
                    })?;
                }
                _ if unborn => {
                    tracing::debug!("HEAD is in an unborn {current}, will not create branch based on it.");
                }
                _ => {
                    traced(format!("Create the new {target} based on current {current}"), || {
                        let oid = self.base_commit(None)?;
                        self.backend().create_branch(target.value(), &oid, false)
                    })?;
                }
            }
        }

        let force_suffix = if force { " (Force)" } else { "" };
        traced(
            format!("Checkout to {target} from {current}{force_suffix}"),
            || {
                if unborn && !target.is_commit() {
                    return self.backend().set_head_branch(target.value());
                }
                match target {
                    GitPointer::Commit(oid) => self.backend().checkout_detached(oid, force),
                    _ => self.checkout_named(target, force),
                }
            },
        )
    }

    fn checkout_named(&self, target: &GitPointer, force: bool) -> Result<(), RepoError> {
        let name = target.value();
        if target.is_branch() || target.is_unknown() {
            if self.local_branch(name)?.is_some() {
                return self.backend().checkout_branch(name, force);
            }
            // A branch that only exists on a remote gets a local tracking copy.
            if let Some(remote) = self.remote_branch(name)? {
                self.backend().create_branch(name, &remote.oid, false)?;
                self.backend().set_upstream(name, Some(&remote.name))?;
                return self.backend().checkout_branch(name, force);
            }
        }
        let resolution = self
            .resolve(target, ResolveScope::LOCAL)?
            .ok_or_else(|| RepoError::NotFound(format!("Could not find the {target}")))?;
        self.backend().checkout_detached(&resolution.oid, force)
    }

    /// The upstream of `local` (default: the current branch). With
    /// `auto_match`, a missing upstream falls back to the same-named branch on
    /// the first remote that has one, which is then recorded as the upstream.
    pub fn track_branch(
        &self,
        local: Option<&str>,
        auto_match: bool,
    ) -> Result<Option<String>, RepoError> {
        let local = match local {
            Some(l) => l.to_string(),
            None => match self.current_branch()? {
                Some(b) => b,
                None => return Ok(None),
            },
        };
        if let Some(upstream) = self.backend().upstream(&local)? {
            tracing::debug!("The track branch is `{upstream}`.");
            return Ok(Some(upstream));
        }
        if !auto_match {
            return Ok(None);
        }
        match self.remote_branch(&local)? {
            Some(remote) => {
                self.set_track_branch(&local, Some(&remote.name))?;
                Ok(Some(remote.name))
            }
            None => {
                tracing::debug!("Could not get the track branch.");
                Ok(None)
            }
        }
    }

    /// Set or, with `None`, unset the upstream of `local`.
    pub fn set_track_branch(&self, local: &str, remote: Option<&str>) -> Result<(), RepoError> {
        let message = match remote {
            Some(remote) => format!("Set branch `{local}`'s track branch `{remote}`"),
            None => format!("Unset branch `{local}`'s track branch"),
        };
        traced(message, || self.backend().set_upstream(local, remote))
    }

    fn base_commit(&self, base: Option<&GitPointer>) -> Result<String, RepoError> {
        match base {
            None => match self.head()? {
                HeadState::Unborn(name) => Err(RepoError::PreconditionFailed(format!(
                    "branch `{name}` has no commits to branch from"
                ))),
                head => head
                    .oid()
                    .map(str::to_string)
                    .ok_or_else(|| RepoError::NotFound("HEAD".to_string())),
            },
            Some(GitPointer::Unknown(value)) => Err(RepoError::InvalidArgument(format!(
                "No support base `{value}` of unknown type"
            ))),
            Some(base) => self.commit_for(base),
        }
    }
}

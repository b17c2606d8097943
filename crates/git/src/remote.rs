//! Remotes and the network operations that talk to them.

use std::sync::Arc;

use utils::log::traced;

use crate::{
    RepoError,
    backend::{MergeOutcome, RefKind, RemoteInfo},
    context::RunContext,
    pointer::GitPointer,
    repo::GitRepo,
};

impl GitRepo {
    /// Configured remotes, sorted by name.
    pub fn remotes(&self) -> Result<Vec<RemoteInfo>, RepoError> {
        self.backend().remotes()
    }

    /// Fetch the preferred remote. A repository without remotes, or whose
    /// preferred remote has no URL, has nothing to fetch.
    pub fn fetch(&self) -> Result<(), RepoError> {
        let remote = match self.select_remote(None) {
            Ok(remote) => remote,
            Err(RepoError::NotFound(_)) => {
                tracing::debug!("No remote to fetch from");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let Some(url) = remote.url.clone() else {
            tracing::debug!("Remote `{}` has no url, skip fetch", remote.name);
            return Ok(());
        };
        traced(format!("Fetch from `{}` ({url})", remote.name), || {
            self.backend()
                .fetch(&remote)
                .map_err(|e| e.over_network("fetch", &url))
        })
    }

    /// Fetch, then merge the current branch's track branch into it.
    pub fn pull(&self) -> Result<MergeOutcome, RepoError> {
        let Some(track) = self.track_branch(None, true)? else {
            return Err(RepoError::PreconditionFailed(
                "Could not get the track branch.".to_string(),
            ));
        };
        self.fetch()?;
        self.merge(&GitPointer::Branch(track))
    }

    /// Push the current branch to its track branch, or to a branch of the
    /// same name on the preferred remote.
    pub fn push(&self) -> Result<(), RepoError> {
        let current = self.current_describe()?;
        let GitPointer::Branch(branch) = current else {
            return Err(RepoError::PreconditionFailed(format!(
                "Could not push the {current}, it is not a branch."
            )));
        };
        let (remote, target) = match self.track_branch(Some(&branch), false)? {
            Some(track) => self.split_remote_branch(&track)?,
            None => (None, branch.clone()),
        };
        self.push_refs(&branch, &target, remote.as_deref(), false)
    }

    /// Push `reference` to a ref of the same name on `remote`.
    pub fn push_ref(&self, reference: &str, remote: Option<&str>) -> Result<(), RepoError> {
        self.push_refs(reference, reference, remote, false)
    }

    /// Push `src` to `dst` on `remote` (default: the preferred remote). Short
    /// names are expanded to full ref names first; a `dst` unknown locally
    /// lands in the same namespace as `src`.
    pub fn push_refs(
        &self,
        src: &str,
        dst: &str,
        remote: Option<&str>,
        force: bool,
    ) -> Result<(), RepoError> {
        let remote = self.select_remote(remote)?;
        let url = remote.url.clone().unwrap_or_else(|| remote.name.clone());
        let source = self
            .backend()
            .find_reference(src)?
            .filter(|r| matches!(r.kind, RefKind::LocalBranch | RefKind::Tag))
            .ok_or_else(|| RepoError::NotFound(format!("reference `{src}`")))?;
        let destination = match self.backend().find_reference(dst)? {
            Some(r) if matches!(r.kind, RefKind::LocalBranch | RefKind::Tag) => r.full_name,
            _ if source.kind == RefKind::Tag => format!("refs/tags/{dst}"),
            _ => format!("refs/heads/{dst}"),
        };
        traced(
            format!(
                "Push `{}` to `{}` `{destination}`{}",
                source.full_name,
                remote.name,
                if force { " (Force)" } else { "" }
            ),
            || {
                self.backend()
                    .push(&remote, &source.full_name, &destination, force)
                    .map_err(|e| e.over_network("push", &url))
            },
        )
    }

    /// Remote ref names at `url` without their `refs/<kind>/` prefix.
    pub fn ls_remote(
        ctx: &Arc<RunContext>,
        url: &str,
        heads: bool,
        tags: bool,
    ) -> Result<Vec<String>, RepoError> {
        ctx.settings()
            .backend
            .transport(ctx)
            .ls_remote(url, heads, tags)
            .map_err(|e| e.over_network("ls-remote", url))
    }

    /// `origin/feature/x` -> (`origin`, `feature/x`) for a configured remote.
    fn split_remote_branch(&self, name: &str) -> Result<(Option<String>, String), RepoError> {
        for remote in self.backend().remotes()? {
            if let Some(rest) = name
                .strip_prefix(remote.name.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return Ok((Some(remote.name), rest.to_string()));
            }
        }
        Ok((None, name.to_string()))
    }
}

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use utils::log::traced;

use crate::{
    RepoError,
    backend::{BackendKind, GitBackend, RemoteInfo, RepoLayout},
    context::RunContext,
};

/// One open repository.
///
/// Exclusively owns its backend handle; the work tree and git directory paths
/// are read once when the handle is created.
pub struct GitRepo {
    backend: Box<dyn GitBackend>,
    layout: RepoLayout,
    ctx: Arc<RunContext>,
}

impl GitRepo {
    /// Open with the backend selected in the context's settings.
    pub fn open(ctx: &Arc<RunContext>, path: &Path) -> Result<Self, RepoError> {
        Self::open_with(ctx, path, ctx.settings().backend)
    }

    pub fn open_with(
        ctx: &Arc<RunContext>,
        path: &Path,
        kind: BackendKind,
    ) -> Result<Self, RepoError> {
        let backend = kind.open(ctx, path)?;
        let layout = backend.layout()?;
        tracing::debug!(
            backend = ?kind,
            git_dir = %layout.git_dir.display(),
            "Opened repository {}",
            path.display()
        );
        Ok(Self {
            backend,
            layout,
            ctx: Arc::clone(ctx),
        })
    }

    /// Create a repository whose HEAD is `main` and open it.
    pub fn init(
        ctx: &Arc<RunContext>,
        path: &Path,
        initial_commit: bool,
    ) -> Result<Self, RepoError> {
        let kind = ctx.settings().backend;
        traced(&format!("Init repository at {}", path.display()), || {
            kind.transport(ctx).init(path, initial_commit)
        })?;
        Self::open_with(ctx, path, kind)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// The work tree, or the git directory of a bare repository.
    pub fn path(&self) -> &Path {
        self.layout
            .workdir
            .as_deref()
            .unwrap_or(&self.layout.git_dir)
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.layout.workdir.as_deref()
    }

    pub fn git_dir(&self) -> &Path {
        &self.layout.git_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.layout.common_dir
    }

    pub fn is_bare(&self) -> bool {
        self.layout.workdir.is_none()
    }

    /// True for linked worktrees.
    pub fn is_worktree(&self) -> bool {
        self.layout.git_dir != self.layout.common_dir
    }

    /// Fetch URL of the preferred remote.
    pub fn url(&self) -> Result<Option<String>, RepoError> {
        match self.select_remote(None) {
            Ok(remote) => Ok(remote.url),
            Err(RepoError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The named remote (case-insensitive), else `origin`, else the first.
    pub fn select_remote(&self, name: Option<&str>) -> Result<RemoteInfo, RepoError> {
        let remotes = self.backend.remotes()?;
        let chosen = match name {
            Some(name) => remotes
                .iter()
                .find(|r| r.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| RepoError::NotFound(format!("remote `{name}`")))?,
            None => remotes
                .iter()
                .find(|r| r.name == "origin")
                .or_else(|| remotes.first())
                .ok_or_else(|| RepoError::NotFound("no remotes configured".to_string()))?,
        };
        Ok(chosen.clone())
    }

    pub(crate) fn backend(&self) -> &dyn GitBackend {
        self.backend.as_ref()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn GitBackend {
        self.backend.as_mut()
    }

    /// `path` relative to the work tree; relative input is taken as given.
    pub(crate) fn workdir_relative(&self, path: &Path) -> Result<PathBuf, RepoError> {
        let Some(workdir) = self.workdir() else {
            return Err(RepoError::PreconditionFailed(format!(
                "{} has no work tree",
                self.git_dir().display()
            )));
        };
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        if let Ok(rel) = path.strip_prefix(workdir) {
            return Ok(rel.to_path_buf());
        }
        // The work tree may have been reported through a resolved symlink.
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        resolved
            .strip_prefix(workdir.canonicalize()?)
            .map(Path::to_path_buf)
            .map_err(|_| {
                RepoError::InvalidArgument(format!("{} is outside the work tree", path.display()))
            })
    }

    pub(crate) fn worktrees_metadata_dir(&self) -> PathBuf {
        self.layout.common_dir.join("worktrees")
    }
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("backend", &self.backend.kind())
            .field("layout", &self.layout)
            .finish()
    }
}

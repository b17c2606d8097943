//! Cloning through a staging directory.
//!
//! A clone is written to a hidden temporary directory next to the target and
//! renamed into place only once it is complete, so the target never holds a
//! half-finished repository. Partial (blob-less) clones are used when both
//! ends support them, and can be upgraded to full clones after the run.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use utils::log::traced;

use crate::{
    RepoError,
    backend::{BackendKind, CloneRequest},
    context::RunContext,
    pointer::GitPointer,
    repo::GitRepo,
    version::MIN_LOCAL_FILTER_VERSION,
};

const STAGING_PREFIX: &str = ".clone-";
const STAGING_REPO_DIR: &str = "repo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneOptions {
    pub checkout: bool,
    pub recurse_submodules: bool,
    /// `None` defers to [`crate::GitSettings::partial_clone`].
    pub partial_clone: Option<bool>,
    /// A local repository to borrow objects from.
    pub reference: Option<PathBuf>,
    /// Commit to leave HEAD at once cloned.
    pub commit: Option<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            checkout: true,
            recurse_submodules: false,
            partial_clone: None,
            reference: None,
            commit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneState {
    NotStarted,
    CloningToTemp,
    Relocating,
    Ready,
    Failed,
}

impl fmt::Display for CloneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CloneState::NotStarted => "not started",
            CloneState::CloningToTemp => "cloning to temp",
            CloneState::Relocating => "relocating",
            CloneState::Ready => "ready",
            CloneState::Failed => "failed",
        })
    }
}

/// Clone `url` into `target` with the backend from the context's settings.
pub fn clone_repository(
    ctx: &Arc<RunContext>,
    url: &str,
    target: &Path,
    options: &CloneOptions,
) -> Result<GitRepo, RepoError> {
    CloneOrchestrator::new(ctx, url, target, options.clone()).run()
}

/// One clone, tracking where it got to.
pub struct CloneOrchestrator {
    ctx: Arc<RunContext>,
    kind: BackendKind,
    url: String,
    target: PathBuf,
    options: CloneOptions,
    state: CloneState,
}

impl CloneOrchestrator {
    pub fn new(ctx: &Arc<RunContext>, url: &str, target: &Path, options: CloneOptions) -> Self {
        Self {
            kind: ctx.settings().backend,
            ctx: Arc::clone(ctx),
            url: url.to_string(),
            target: target.to_path_buf(),
            options,
            state: CloneState::NotStarted,
        }
    }

    pub fn with_backend(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn state(&self) -> CloneState {
        self.state
    }

    pub fn run(&mut self) -> Result<GitRepo, RepoError> {
        if self.state != CloneState::NotStarted {
            return Err(RepoError::PreconditionFailed(format!(
                "clone of {} is already {}",
                self.url, self.state
            )));
        }
        match self.stage_and_relocate() {
            Ok(repo) => {
                self.transition(CloneState::Ready);
                Ok(repo)
            }
            Err(e) => {
                self.transition(CloneState::Failed);
                Err(e)
            }
        }
    }

    fn stage_and_relocate(&mut self) -> Result<GitRepo, RepoError> {
        ensure_target_free(&self.target)?;
        let parent = self
            .target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;

        let partial = should_partial_clone(&self.ctx, self.kind, &self.url, self.options.partial_clone);

        // Removed on drop, so every early return below cleans up after itself.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)?;
        let staged = staging.path().join(STAGING_REPO_DIR);

        self.transition(CloneState::CloningToTemp);
        let request = CloneRequest {
            url: self.url.clone(),
            dest: staged.clone(),
            checkout: self.options.checkout,
            recurse_submodules: self.options.recurse_submodules,
            filter: partial,
            reference: self.options.reference.clone(),
        };
        let description = format!(
            "Clone {} into {}{}",
            self.url,
            staged.display(),
            if partial { " (partial)" } else { "" }
        );
        traced(description, || {
            self.kind
                .transport(&self.ctx)
                .clone_repo(&request)
                .map_err(|e| e.over_network("clone", &self.url))
        })?;

        if let Some(commit) = &self.options.commit {
            let repo = GitRepo::open_with(&self.ctx, &staged, self.kind)?;
            position_head(&repo, commit, self.options.checkout)?;
        }

        self.transition(CloneState::Relocating);
        if self.target.is_dir() {
            // Only an empty directory gets this far.
            std::fs::remove_dir(&self.target)?;
        }
        std::fs::rename(&staged, &self.target)?;
        drop(staging);

        let repo = GitRepo::open_with(&self.ctx, &self.target, self.kind)?;
        if partial && self.ctx.settings().full_clone {
            schedule_full_fetch(&self.ctx, &self.target);
        }
        Ok(repo)
    }

    fn transition(&mut self, next: CloneState) {
        tracing::debug!("Clone {}: {} -> {next}", self.url, self.state);
        self.state = next;
    }
}

/// Whether to clone with `--filter=blob:none`.
///
/// Requires a backend that can filter, a local git of at least 2.36.1 and a
/// server that advertises support. Any failure while checking means no.
pub fn should_partial_clone(
    ctx: &RunContext,
    kind: BackendKind,
    url: &str,
    requested: Option<bool>,
) -> bool {
    if !requested.unwrap_or(ctx.settings().partial_clone) {
        return false;
    }
    if !kind.supports_filter() {
        tracing::debug!("{kind:?} backend cannot filter objects, use a full clone");
        return false;
    }
    match ctx.local_git_version() {
        Some(v) if v >= MIN_LOCAL_FILTER_VERSION => {}
        Some(v) => {
            tracing::info!("Local git {v} is older than {MIN_LOCAL_FILTER_VERSION}, use a full clone");
            return false;
        }
        None => return false,
    }
    match ctx.cli().remote_version(url) {
        Ok(Some(remote)) => {
            let supported = remote.supports_filter();
            tracing::debug!("Remote {url} is {remote:?}, partial clone: {supported}");
            supported
        }
        Ok(None) => {
            tracing::debug!("Remote {url} did not advertise a version, use a full clone");
            false
        }
        Err(e) => {
            tracing::warn!("Could not check the git version of {url}: {e}");
            false
        }
    }
}

fn ensure_target_free(target: &Path) -> Result<(), RepoError> {
    if !target.exists() {
        return Ok(());
    }
    let empty_dir = target.is_dir() && std::fs::read_dir(target)?.next().is_none();
    if empty_dir {
        Ok(())
    } else {
        Err(RepoError::PreconditionFailed(format!(
            "clone target {} already exists",
            target.display()
        )))
    }
}

fn position_head(repo: &GitRepo, commit: &str, checkout: bool) -> Result<(), RepoError> {
    let pointer = GitPointer::Commit(commit.to_string());
    if checkout {
        repo.checkout(&pointer, None, false, true)
    } else {
        repo.set_head(&pointer)
    }
}

/// After the run, drop the partial-clone filter and refetch everything in the
/// background. Skipped when the repository is gone by then.
fn schedule_full_fetch(ctx: &Arc<RunContext>, path: &Path) {
    let cli = ctx.cli();
    let path = path.to_path_buf();
    ctx.defer(move || {
        if !path.is_dir() {
            tracing::debug!("{} is gone, skip full fetch", path.display());
            return;
        }
        if let Err(e) = cli.config_unset(&path, "remote.origin.partialclonefilter") {
            tracing::warn!("Failed to unset the partial clone filter in {}: {e}", path.display());
        }
        match cli.spawn_detached(&path, ["fetch", "--refetch", "origin"]) {
            Ok(()) => tracing::info!("Fetching full objects for {} in the background", path.display()),
            Err(e) => tracing::warn!("Failed to start the full fetch in {}: {e}", path.display()),
        }
    });
}

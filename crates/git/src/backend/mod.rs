//! Backend dispatch.
//!
//! Every repository operation goes through [`GitBackend`]; clone and remote
//! listing, which need no open repository, go through [`GitTransport`]. Each
//! has a libgit2 implementation ([`native`]) and a `git` CLI implementation
//! ([`cli`]), chosen once via [`BackendKind`] when a handle is created.
//!
//! Backends speak in full oids and full or short ref names; pointer semantics,
//! resolution order and merge classification live above this layer so both
//! implementations share them.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{RepoError, context::RunContext};

pub mod cli;
pub mod native;

/// Identity used for commits when neither `user.name` nor `user.email` is configured.
pub(crate) const FALLBACK_NAME: &str = "Workspace Git";
pub(crate) const FALLBACK_EMAIL: &str = "noreply@workspace.local";
/// Message of the empty commit created by [`GitTransport::init`].
pub(crate) const INITIAL_COMMIT_MESSAGE: &str = "Init commit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// libgit2 through the `git2` crate.
    Native,
    /// The `git` executable.
    #[default]
    Cli,
}

impl BackendKind {
    pub fn open(self, ctx: &Arc<RunContext>, path: &Path) -> Result<Box<dyn GitBackend>, RepoError> {
        Ok(match self {
            BackendKind::Native => Box::new(native::NativeBackend::open(path)?),
            BackendKind::Cli => Box::new(cli::CliBackend::open(ctx, path)?),
        })
    }

    pub fn transport(self, ctx: &Arc<RunContext>) -> Box<dyn GitTransport> {
        match self {
            BackendKind::Native => Box::new(native::NativeTransport),
            BackendKind::Cli => Box::new(cli::CliTransport::new(ctx)),
        }
    }

    /// Whether this backend can clone with an object filter.
    pub fn supports_filter(self) -> bool {
        matches!(self, BackendKind::Cli)
    }
}

/// Paths derived from an open repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    /// `None` for bare repositories.
    pub workdir: Option<PathBuf>,
    pub git_dir: PathBuf,
    /// Shared across linked worktrees; equal to `git_dir` otherwise.
    pub common_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    LocalBranch,
    RemoteBranch,
    Tag,
    /// `HEAD`, notes, stash and anything else outside heads/remotes/tags.
    Other,
}

impl RefKind {
    pub fn from_full_name(full_name: &str) -> Self {
        if full_name.starts_with("refs/heads/") {
            RefKind::LocalBranch
        } else if full_name.starts_with("refs/remotes/") {
            RefKind::RemoteBranch
        } else if full_name.starts_with("refs/tags/") {
            RefKind::Tag
        } else {
            RefKind::Other
        }
    }
}

/// A reference and the commit it peels to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    pub full_name: String,
    pub kind: RefKind,
    pub oid: String,
}

impl RefInfo {
    pub fn new(full_name: impl Into<String>, oid: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            kind: RefKind::from_full_name(&full_name),
            full_name,
            oid: oid.into(),
        }
    }

    /// `main` for `refs/heads/main`, `origin/main` for `refs/remotes/origin/main`.
    pub fn short_name(&self) -> &str {
        ["refs/heads/", "refs/remotes/", "refs/tags/", "refs/"]
            .iter()
            .find_map(|prefix| self.full_name.strip_prefix(prefix))
            .unwrap_or(&self.full_name)
    }
}

/// Candidate full names for a short ref name, in git's lookup order.
pub fn dwim_ref_candidates(name: &str) -> [String; 6] {
    [
        name.to_string(),
        format!("refs/{name}"),
        format!("refs/tags/{name}"),
        format!("refs/heads/{name}"),
        format!("refs/remotes/{name}"),
        format!("refs/remotes/{name}/HEAD"),
    ]
}

/// A raw object named by a revision expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectInfo {
    Commit(String),
    /// An annotated tag object; `oid` is the commit it peels to.
    Tag { name: String, oid: String },
}

impl ObjectInfo {
    pub fn oid(&self) -> &str {
        match self {
            ObjectInfo::Commit(oid) | ObjectInfo::Tag { oid, .. } => oid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD names a branch with no commits yet.
    Unborn(String),
    Branch { name: String, oid: String },
    Detached(String),
}

impl HeadState {
    pub fn branch(&self) -> Option<&str> {
        match self {
            HeadState::Unborn(name) | HeadState::Branch { name, .. } => Some(name),
            HeadState::Detached(_) => None,
        }
    }

    pub fn oid(&self) -> Option<&str> {
        match self {
            HeadState::Branch { oid, .. } | HeadState::Detached(oid) => Some(oid),
            HeadState::Unborn(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchScope {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    /// Short name; remote branches keep their remote prefix.
    pub name: String,
    pub oid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub name: String,
    /// The commit the tag peels to.
    pub oid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteInfo {
    pub name: String,
    pub url: Option<String>,
    pub push_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
    Renamed,
    TypeChange,
    Ignored,
}

/// One path in `git status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub path: String,
    /// HEAD to index.
    pub index: Option<ChangeKind>,
    /// Index to working tree. Untracked files are `New` here.
    pub worktree: Option<ChangeKind>,
    pub conflicted: bool,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.index.is_none() && self.worktree == Some(ChangeKind::New) && !self.conflicted
    }
}

/// A stash entry. `id` is positional and shifts whenever the stash list changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stash {
    pub id: usize,
    pub message: String,
    pub commit: String,
}

/// Failure of a stash apply or pop, split by the signals that warrant a retry.
#[derive(Debug, Error)]
pub enum StashApplyError {
    #[error("stash conflicts with the working tree: {0}")]
    Conflict(String),
    #[error("uncommitted changes prevent applying the stash: {0}")]
    Uncommitted(String),
    #[error(transparent)]
    Other(#[from] RepoError),
}

impl StashApplyError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StashApplyError::Conflict(_) | StashApplyError::Uncommitted(_)
        )
    }

    pub fn into_repo_error(self, operation: &str) -> RepoError {
        match self {
            StashApplyError::Conflict(detail) | StashApplyError::Uncommitted(detail) => {
                RepoError::Backend {
                    operation: operation.to_string(),
                    detail,
                }
            }
            StashApplyError::Other(e) => e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Mixed,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward(String),
    Merged(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeInfo {
    pub name: String,
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// Everything a backend needs to clone into a staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub url: String,
    /// Must not exist yet; its parent must.
    pub dest: PathBuf,
    pub checkout: bool,
    pub recurse_submodules: bool,
    /// Clone with `--filter=blob:none`.
    pub filter: bool,
    pub reference: Option<PathBuf>,
}

/// Operations on one open repository.
pub trait GitBackend: Send {
    fn kind(&self) -> BackendKind;
    fn layout(&self) -> Result<RepoLayout, RepoError>;

    // References and objects
    /// Look up `name` the way `git rev-parse` expands short ref names.
    fn find_reference(&self, name: &str) -> Result<Option<RefInfo>, RepoError>;
    /// Look up a raw commit or annotated tag object by revision expression.
    fn find_object(&self, spec: &str) -> Result<Option<ObjectInfo>, RepoError>;
    /// Full oid of the commit `spec` peels to.
    fn resolve_commit(&self, spec: &str) -> Result<Option<String>, RepoError>;
    fn head(&self) -> Result<HeadState, RepoError>;
    /// Sorted by name; symbolic refs such as `origin/HEAD` are skipped.
    fn branches(&self, scope: BranchScope) -> Result<Vec<BranchInfo>, RepoError>;
    /// Sorted by name; tags not pointing at a commit are skipped.
    fn tags(&self) -> Result<Vec<TagInfo>, RepoError>;
    /// Sorted by name.
    fn remotes(&self) -> Result<Vec<RemoteInfo>, RepoError>;
    /// Short name of the configured upstream, e.g. `origin/main`.
    fn upstream(&self, branch: &str) -> Result<Option<String>, RepoError>;
    fn set_upstream(&self, branch: &str, upstream: Option<&str>) -> Result<(), RepoError>;

    // Commit graph
    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, RepoError>;
    /// Commits reachable from `a` but not `b`, and from `b` but not `a`.
    fn ahead_behind(&self, a: &str, b: &str) -> Result<(usize, usize), RepoError>;
    /// Strict: a commit is not its own descendant.
    fn is_descendant_of(&self, commit: &str, ancestor: &str) -> Result<bool, RepoError>;

    // Refs and working tree
    fn create_branch(&self, name: &str, oid: &str, force: bool) -> Result<(), RepoError>;
    fn delete_branch(&self, name: &str) -> Result<(), RepoError>;
    fn create_tag(&self, name: &str, oid: &str, force: bool) -> Result<(), RepoError>;
    /// Point HEAD at `refs/heads/<name>` without touching the working tree.
    fn set_head_branch(&self, name: &str) -> Result<(), RepoError>;
    fn set_head_detached(&self, oid: &str) -> Result<(), RepoError>;
    fn checkout_branch(&self, name: &str, force: bool) -> Result<(), RepoError>;
    fn checkout_detached(&self, oid: &str, force: bool) -> Result<(), RepoError>;
    fn reset(&self, oid: &str, mode: ResetMode) -> Result<(), RepoError>;
    fn merge(&self, oid: &str, message: &str) -> Result<MergeOutcome, RepoError>;
    /// Whether merging `oid` into HEAD would conflict. Leaves the tree untouched.
    fn would_conflict(&self, oid: &str) -> Result<bool, RepoError>;
    fn clean(&self, directories: bool, ignored: bool) -> Result<(), RepoError>;
    /// Force the working tree and index back to HEAD.
    fn discard_changes(&self) -> Result<(), RepoError>;
    fn status(&self, include_untracked: bool) -> Result<Vec<StatusEntry>, RepoError>;
    /// Drop any cached index or status state so the next read hits disk.
    fn refresh(&mut self) -> Result<(), RepoError>;
    /// Whether the ignore rules match `path` (relative to the work tree),
    /// tracked or not.
    fn is_ignored(&self, path: &Path) -> Result<bool, RepoError>;
    /// The skip-worktree bit of the index entry for `path`; `None` when the
    /// path is not in the index.
    fn skip_worktree(&self, path: &Path) -> Result<Option<bool>, RepoError>;
    fn set_skip_worktree(&self, path: &Path, skip: bool) -> Result<(), RepoError>;

    // Stash
    fn stash_list(&mut self) -> Result<Vec<Stash>, RepoError>;
    /// `Ok(None)` when there was nothing to save.
    fn stash_save(
        &mut self,
        message: &str,
        include_untracked: bool,
    ) -> Result<Option<Stash>, RepoError>;
    fn stash_apply(
        &mut self,
        id: usize,
        reinstate_index: bool,
        drop: bool,
    ) -> Result<(), StashApplyError>;
    fn stash_drop(&mut self, id: usize) -> Result<(), RepoError>;

    // Network
    fn fetch(&self, remote: &RemoteInfo) -> Result<(), RepoError>;
    /// `src` and `dst` are full ref names.
    fn push(&self, remote: &RemoteInfo, src: &str, dst: &str, force: bool)
    -> Result<(), RepoError>;

    // Config
    fn config_get(&self, key: &str) -> Result<Option<String>, RepoError>;
    fn config_set(&self, key: &str, value: &str) -> Result<(), RepoError>;
    /// Missing keys are not an error.
    fn config_unset(&self, key: &str) -> Result<(), RepoError>;

    // Worktrees
    /// The worktree is named after the final component of `path`.
    fn worktree_add(&self, path: &Path, branch: Option<&str>) -> Result<(), RepoError>;
    /// Linked worktrees only.
    fn worktrees(&self) -> Result<Vec<WorktreeInfo>, RepoError>;
    /// Returns the pruned worktree's path, or `None` when nothing was pruned.
    fn worktree_prune(&self, name: &str, force: bool) -> Result<Option<PathBuf>, RepoError>;
}

/// Operations that need no open repository.
pub trait GitTransport: Send {
    fn kind(&self) -> BackendKind;
    fn clone_repo(&self, request: &CloneRequest) -> Result<(), RepoError>;
    /// Create a repository whose HEAD is `main`, optionally with an empty first commit.
    fn init(&self, path: &Path, initial_commit: bool) -> Result<(), RepoError>;
    /// Remote ref names with their `refs/<kind>/` prefix dropped.
    fn ls_remote(&self, url: &str, heads: bool, tags: bool) -> Result<Vec<String>, RepoError>;
}

/// `refs/heads/feature/x` -> `feature/x`. Names with fewer than three
/// segments are returned whole.
pub(crate) fn strip_ref_namespace(name: &str) -> String {
    let name = name.strip_suffix("^{}").unwrap_or(name);
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() > 2 {
        segments[2..].join("/")
    } else {
        name.to_string()
    }
}

//! Repository operations over two interchangeable git backends.
//!
//! [`GitRepo`] is the entry point: it owns one open repository through a
//! [`backend::GitBackend`] (libgit2 or the `git` executable, picked by
//! [`GitSettings::backend`]) and layers pointer resolution, merge analysis,
//! stash coordination and the rest on top, so callers see the same results
//! whichever backend runs. Cloning goes through [`clone::clone_repository`].

use thiserror::Error;

pub mod backend;
pub mod branch;
mod cli;
pub mod clone;
pub mod context;
pub mod ignore;
pub mod lock;
pub mod maintenance;
pub mod merge;
pub mod pointer;
pub mod remote;
pub mod repo;
pub mod resolve;
pub mod settings;
pub mod stash;
pub mod status;
pub mod tag;
pub mod validation;
pub mod version;
pub mod worktree;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    BackendKind, BranchInfo, ChangeKind, HeadState, MergeOutcome, RemoteInfo, Stash, StatusEntry,
    TagInfo, WorktreeInfo,
};
pub use cli::{GitCli, GitCliError};
pub use clone::{CloneOptions, CloneState, clone_repository};
pub use context::RunContext;
pub use lock::{IndexLock, LockError};
pub use merge::MergeStatus;
pub use pointer::{GitPointer, PointerKind};
pub use repo::GitRepo;
pub use resolve::{Resolution, ResolveScope};
pub use settings::GitSettings;
pub use validation::{is_valid_branch_name, is_valid_oid_prefix, is_valid_tag_name};
pub use version::{GitVersion, RemoteVersion};

/// The coarse failure classes every [`RepoError`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    PreconditionFailed,
    BackendFailure,
    NetworkFailure,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Cli(#[from] GitCliError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("{operation} failed: {detail}")]
    Backend { operation: String, detail: String },
    #[error("{operation} `{url}` failed: {detail}")]
    Network {
        operation: String,
        url: String,
        detail: String,
    },
    #[error("Merge conflicts: {message}")]
    MergeConflicts {
        message: String,
        conflicted_files: Vec<String>,
    },
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::NotFound(_) => ErrorKind::NotFound,
            RepoError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RepoError::PreconditionFailed(_) | RepoError::MergeConflicts { .. } => {
                ErrorKind::PreconditionFailed
            }
            RepoError::Network { .. } => ErrorKind::NetworkFailure,
            RepoError::Git(e) => match (e.code(), e.class()) {
                (git2::ErrorCode::NotFound, _) => ErrorKind::NotFound,
                (git2::ErrorCode::InvalidSpec, _) => ErrorKind::InvalidArgument,
                (git2::ErrorCode::Auth, _)
                | (_, git2::ErrorClass::Net)
                | (_, git2::ErrorClass::Http)
                | (_, git2::ErrorClass::Ssh) => ErrorKind::NetworkFailure,
                _ => ErrorKind::BackendFailure,
            },
            RepoError::Cli(GitCliError::AuthFailed(_) | GitCliError::PushRejected(_)) => {
                ErrorKind::NetworkFailure
            }
            RepoError::Cli(_) | RepoError::Io(_) | RepoError::Lock(_) | RepoError::Backend { .. } => {
                ErrorKind::BackendFailure
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Attach the operation description to a raw backend failure.
    pub fn in_operation(self, operation: &str) -> Self {
        match self {
            RepoError::Git(_) | RepoError::Cli(_) | RepoError::Io(_) if !self.is_not_found() => {
                RepoError::Backend {
                    operation: operation.to_string(),
                    detail: self.to_string(),
                }
            }
            other => other,
        }
    }

    /// Attach the operation and remote URL to a transport failure.
    pub fn over_network(self, operation: &str, url: &str) -> Self {
        match self {
            RepoError::Git(_) | RepoError::Cli(_) | RepoError::Io(_) => RepoError::Network {
                operation: operation.to_string(),
                url: url.to_string(),
                detail: self.to_string(),
            },
            RepoError::Backend { detail, .. } => RepoError::Network {
                operation: operation.to_string(),
                url: url.to_string(),
                detail,
            },
            other => other,
        }
    }
}

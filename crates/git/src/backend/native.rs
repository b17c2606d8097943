//! [`GitBackend`] over libgit2.

use std::{
    fs,
    path::{Path, PathBuf},
};

use git2::{
    AutotagOption, BranchType, Cred, Direction, ErrorCode, FetchOptions, FetchPrune,
    IndexEntryExtendedFlag, Oid,
    PushOptions, RemoteCallbacks, Repository, ResetType, Signature, StashApplyOptions, StashFlags,
    Status, StatusOptions, WorktreeAddOptions, WorktreePruneOptions, build::CheckoutBuilder,
};

use super::{
    BackendKind, BranchInfo, BranchScope, ChangeKind, CloneRequest, FALLBACK_EMAIL,
    FALLBACK_NAME, GitBackend, GitTransport, HeadState, INITIAL_COMMIT_MESSAGE, MergeOutcome,
    ObjectInfo, RefInfo, RemoteInfo, RepoLayout, ResetMode, Stash, StashApplyError, StatusEntry,
    TagInfo, WorktreeInfo, strip_ref_namespace,
};
use crate::RepoError;

/// SSH agent first, then `~/.ssh/id_rsa`.
fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, _allowed_types| {
        if let Some(username) = username_from_url
            && let Ok(cred) = Cred::ssh_key_from_agent(username)
        {
            return Ok(cred);
        }
        let home = dirs::home_dir()
            .ok_or_else(|| git2::Error::from_str("Could not find home directory"))?;
        let key_path = home.join(".ssh").join("id_rsa");
        Cred::ssh_key(username_from_url.unwrap_or("git"), None, &key_path, None)
    });
    callbacks
}

/// Get a signature for libgit2 commits with a safe fallback identity.
fn signature_with_fallback(repo: &Repository) -> Result<Signature<'static>, git2::Error> {
    match repo.signature() {
        Ok(sig) => Ok(sig),
        Err(_) => Signature::now(FALLBACK_NAME, FALLBACK_EMAIL),
    }
}

/// Lookups that fail because the name does not exist or does not parse.
fn is_missing(e: &git2::Error) -> bool {
    matches!(
        e.code(),
        ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous | ErrorCode::Peel
    )
}

/// Only `Conflict` and `Uncommitted` warrant the index-less retry.
fn stash_apply_error(e: git2::Error) -> StashApplyError {
    match e.code() {
        ErrorCode::Conflict => StashApplyError::Conflict(e.message().to_string()),
        ErrorCode::Uncommitted => StashApplyError::Uncommitted(e.message().to_string()),
        _ => StashApplyError::Other(e.into()),
    }
}

/// libgit2 reports directories with a trailing separator.
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

fn change_kind_index(status: Status) -> Option<ChangeKind> {
    if status.is_index_new() {
        Some(ChangeKind::New)
    } else if status.is_index_modified() {
        Some(ChangeKind::Modified)
    } else if status.is_index_deleted() {
        Some(ChangeKind::Deleted)
    } else if status.is_index_renamed() {
        Some(ChangeKind::Renamed)
    } else if status.is_index_typechange() {
        Some(ChangeKind::TypeChange)
    } else {
        None
    }
}

fn change_kind_worktree(status: Status) -> Option<ChangeKind> {
    if status.is_wt_new() {
        Some(ChangeKind::New)
    } else if status.is_wt_modified() {
        Some(ChangeKind::Modified)
    } else if status.is_wt_deleted() {
        Some(ChangeKind::Deleted)
    } else if status.is_wt_renamed() {
        Some(ChangeKind::Renamed)
    } else if status.is_wt_typechange() {
        Some(ChangeKind::TypeChange)
    } else if status.is_ignored() {
        Some(ChangeKind::Ignored)
    } else {
        None
    }
}

pub struct NativeBackend {
    repo: Repository,
}

impl NativeBackend {
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                RepoError::NotFound(format!("{} is not a git repository", path.display()))
            } else {
                e.into()
            }
        })?;
        Ok(Self { repo })
    }

    fn commit_oid(&self, spec: &str) -> Result<Oid, RepoError> {
        let object = self.repo.revparse_single(spec).map_err(|e| {
            if is_missing(&e) {
                RepoError::NotFound(format!("commit {spec}"))
            } else {
                e.into()
            }
        })?;
        Ok(object.peel_to_commit()?.id())
    }

    fn checkout_builder<'cb>(force: bool) -> CheckoutBuilder<'cb> {
        let mut builder = CheckoutBuilder::new();
        if force {
            builder.force();
        } else {
            builder.safe();
        }
        builder
    }

    fn workdir(&self) -> Result<&Path, RepoError> {
        self.repo.workdir().ok_or_else(|| {
            RepoError::PreconditionFailed("bare repository has no working tree".to_string())
        })
    }

    fn conflicted_paths(&self) -> Result<Vec<String>, RepoError> {
        let index = self.repo.index()?;
        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(paths)
    }

    fn fast_forward(&self, target: Oid) -> Result<(), RepoError> {
        let commit = self.repo.find_commit(target)?;
        let message = format!("merge {target}: Fast-forward");
        match self.repo.head() {
            Ok(mut head) => {
                self.repo
                    .checkout_tree(commit.as_object(), Some(&mut Self::checkout_builder(false)))?;
                if head.is_branch() {
                    head.set_target(target, &message)?;
                } else {
                    self.repo.set_head_detached(target)?;
                }
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                let name = head
                    .symbolic_target()
                    .ok_or_else(|| RepoError::NotFound("unborn HEAD target".to_string()))?
                    .to_string();
                self.repo.reference(&name, target, true, &message)?;
                self.repo
                    .checkout_head(Some(&mut Self::checkout_builder(true)))?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl GitBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn layout(&self) -> Result<RepoLayout, RepoError> {
        Ok(RepoLayout {
            workdir: self.repo.workdir().map(normalize),
            git_dir: normalize(self.repo.path()),
            common_dir: normalize(self.repo.commondir()),
        })
    }

    fn find_reference(&self, name: &str) -> Result<Option<RefInfo>, RepoError> {
        let reference = match self.repo.resolve_reference_from_short_name(name) {
            Ok(r) => r,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(full_name) = reference.name().map(str::to_string) else {
            return Ok(None);
        };
        match reference.peel_to_commit() {
            Ok(commit) => Ok(Some(RefInfo::new(full_name, commit.id().to_string()))),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_object(&self, spec: &str) -> Result<Option<ObjectInfo>, RepoError> {
        let object = match self.repo.revparse_single(spec) {
            Ok(o) => o,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if let Some(tag) = object.as_tag() {
            let Some(name) = tag.name().map(str::to_string) else {
                return Ok(None);
            };
            return match object.peel_to_commit() {
                Ok(commit) => Ok(Some(ObjectInfo::Tag {
                    name,
                    oid: commit.id().to_string(),
                })),
                Err(e) if is_missing(&e) => Ok(None),
                Err(e) => Err(e.into()),
            };
        }
        Ok(object
            .as_commit()
            .map(|c| ObjectInfo::Commit(c.id().to_string())))
    }

    fn resolve_commit(&self, spec: &str) -> Result<Option<String>, RepoError> {
        match self.commit_oid(spec) {
            Ok(oid) => Ok(Some(oid.to_string())),
            Err(RepoError::NotFound(_)) => Ok(None),
            Err(RepoError::Git(e)) if is_missing(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn head(&self) -> Result<HeadState, RepoError> {
        match self.repo.head() {
            Ok(head) => {
                let oid = head.peel_to_commit()?.id().to_string();
                match head.shorthand() {
                    Some(name) if head.is_branch() => Ok(HeadState::Branch {
                        name: name.to_string(),
                        oid,
                    }),
                    _ => Ok(HeadState::Detached(oid)),
                }
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                let target = head.symbolic_target().unwrap_or("refs/heads/main");
                Ok(HeadState::Unborn(
                    target
                        .strip_prefix("refs/heads/")
                        .unwrap_or(target)
                        .to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn branches(&self, scope: BranchScope) -> Result<Vec<BranchInfo>, RepoError> {
        let branch_type = match scope {
            BranchScope::Local => BranchType::Local,
            BranchScope::Remote => BranchType::Remote,
        };
        let mut branches = Vec::new();
        for entry in self.repo.branches(Some(branch_type))? {
            let (branch, _) = entry?;
            if branch.get().symbolic_target().is_some() {
                continue;
            }
            let Some(name) = branch.name()?.map(str::to_string) else {
                continue;
            };
            let oid = branch.get().peel_to_commit()?.id().to_string();
            branches.push(BranchInfo { name, oid });
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    fn tags(&self) -> Result<Vec<TagInfo>, RepoError> {
        let mut tags = Vec::new();
        for name in self.repo.tag_names(None)?.iter().flatten() {
            let reference = self.repo.find_reference(&format!("refs/tags/{name}"))?;
            if let Ok(commit) = reference.peel_to_commit() {
                tags.push(TagInfo {
                    name: name.to_string(),
                    oid: commit.id().to_string(),
                });
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    fn remotes(&self) -> Result<Vec<RemoteInfo>, RepoError> {
        let mut remotes = Vec::new();
        for name in self.repo.remotes()?.iter().flatten() {
            let remote = self.repo.find_remote(name)?;
            remotes.push(RemoteInfo {
                name: name.to_string(),
                url: remote.url().map(str::to_string),
                push_url: remote.pushurl().map(str::to_string),
            });
        }
        remotes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(remotes)
    }

    fn upstream(&self, branch: &str) -> Result<Option<String>, RepoError> {
        let local = match self.repo.find_branch(branch, BranchType::Local) {
            Ok(b) => b,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match local.upstream() {
            Ok(upstream) => Ok(upstream.name()?.map(str::to_string)),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_upstream(&self, branch: &str, upstream: Option<&str>) -> Result<(), RepoError> {
        let mut local = self.repo.find_branch(branch, BranchType::Local)?;
        match local.set_upstream(upstream) {
            Ok(()) => Ok(()),
            // Unsetting an upstream that was never configured.
            Err(e) if upstream.is_none() && e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, RepoError> {
        let (a, b) = (self.commit_oid(a)?, self.commit_oid(b)?);
        match self.repo.merge_base(a, b) {
            Ok(base) => Ok(Some(base.to_string())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ahead_behind(&self, a: &str, b: &str) -> Result<(usize, usize), RepoError> {
        let (a, b) = (self.commit_oid(a)?, self.commit_oid(b)?);
        Ok(self.repo.graph_ahead_behind(a, b)?)
    }

    fn is_descendant_of(&self, commit: &str, ancestor: &str) -> Result<bool, RepoError> {
        let (commit, ancestor) = (self.commit_oid(commit)?, self.commit_oid(ancestor)?);
        Ok(self.repo.graph_descendant_of(commit, ancestor)?)
    }

    fn create_branch(&self, name: &str, oid: &str, force: bool) -> Result<(), RepoError> {
        let commit = self.repo.find_commit(self.commit_oid(oid)?)?;
        self.repo.branch(name, &commit, force)?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        self.repo.find_branch(name, BranchType::Local)?.delete()?;
        Ok(())
    }

    fn create_tag(&self, name: &str, oid: &str, force: bool) -> Result<(), RepoError> {
        let commit = self.repo.find_commit(self.commit_oid(oid)?)?;
        self.repo.tag_lightweight(name, commit.as_object(), force)?;
        Ok(())
    }

    fn set_head_branch(&self, name: &str) -> Result<(), RepoError> {
        self.repo.set_head(&format!("refs/heads/{name}"))?;
        Ok(())
    }

    fn set_head_detached(&self, oid: &str) -> Result<(), RepoError> {
        self.repo.set_head_detached(self.commit_oid(oid)?)?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str, force: bool) -> Result<(), RepoError> {
        let refname = format!("refs/heads/{name}");
        let tree = self.repo.find_reference(&refname)?.peel_to_tree()?;
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut Self::checkout_builder(force)))?;
        self.repo.set_head(&refname)?;
        Ok(())
    }

    fn checkout_detached(&self, oid: &str, force: bool) -> Result<(), RepoError> {
        let commit = self.repo.find_commit(self.commit_oid(oid)?)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut Self::checkout_builder(force)))?;
        self.repo.set_head_detached(commit.id())?;
        Ok(())
    }

    fn reset(&self, oid: &str, mode: ResetMode) -> Result<(), RepoError> {
        let commit = self.repo.find_commit(self.commit_oid(oid)?)?;
        let reset_type = match mode {
            ResetMode::Mixed => ResetType::Mixed,
            ResetMode::Hard => ResetType::Hard,
        };
        self.repo.reset(commit.as_object(), reset_type, None)?;
        Ok(())
    }

    fn merge(&self, oid: &str, message: &str) -> Result<MergeOutcome, RepoError> {
        let target = self.commit_oid(oid)?;
        let their = self.repo.find_annotated_commit(target)?;
        let (analysis, _) = self.repo.merge_analysis(&[&their])?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }
        if analysis.is_fast_forward() || analysis.is_unborn() {
            self.fast_forward(target)?;
            return Ok(MergeOutcome::FastForward(target.to_string()));
        }

        let head_commit = self.repo.head()?.peel_to_commit()?;
        self.repo
            .merge(&[&their], None, Some(&mut Self::checkout_builder(false)))?;
        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let conflicted_files = self.conflicted_paths()?;
            self.repo.cleanup_state()?;
            self.repo
                .reset(head_commit.as_object(), ResetType::Hard, None)?;
            return Err(RepoError::MergeConflicts {
                message: format!(
                    "merging {target} conflicts in {} file(s)",
                    conflicted_files.len()
                ),
                conflicted_files,
            });
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let their_commit = self.repo.find_commit(target)?;
        let signature = signature_with_fallback(&self.repo)?;
        let merged = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit, &their_commit],
        )?;
        self.repo.cleanup_state()?;
        Ok(MergeOutcome::Merged(merged.to_string()))
    }

    fn would_conflict(&self, oid: &str) -> Result<bool, RepoError> {
        let ours = self.repo.head()?.peel_to_commit()?;
        let theirs = self.repo.find_commit(self.commit_oid(oid)?)?;
        let index = self.repo.merge_commits(&ours, &theirs, None)?;
        Ok(index.has_conflicts())
    }

    fn clean(&self, directories: bool, ignored: bool) -> Result<(), RepoError> {
        let workdir = self.workdir()?.to_path_buf();
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(ignored)
            .recurse_ignored_dirs(false)
            .exclude_submodules(true);
        for entry in self.repo.statuses(Some(&mut opts))?.iter() {
            let status = entry.status();
            if !(status.is_wt_new() || status.is_ignored()) {
                continue;
            }
            let Some(rel) = entry.path() else { continue };
            let path = workdir.join(rel);
            if rel.ends_with('/') {
                if directories {
                    tracing::trace!("Removing directory {}", path.display());
                    fs::remove_dir_all(&path)?;
                }
            } else {
                tracing::trace!("Removing {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn discard_changes(&self) -> Result<(), RepoError> {
        self.repo
            .checkout_head(Some(&mut Self::checkout_builder(true)))?;
        Ok(())
    }

    fn status(&self, include_untracked: bool) -> Result<Vec<StatusEntry>, RepoError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(include_untracked)
            .recurse_untracked_dirs(include_untracked)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .filter_map(|entry| {
                let path = entry.path()?.to_string();
                let status = entry.status();
                if status.is_conflicted() {
                    return Some(StatusEntry {
                        path,
                        index: None,
                        worktree: None,
                        conflicted: true,
                    });
                }
                let index = change_kind_index(status);
                let worktree = change_kind_worktree(status);
                (index.is_some() || worktree.is_some()).then_some(StatusEntry {
                    path,
                    index,
                    worktree,
                    conflicted: false,
                })
            })
            .collect())
    }

    fn refresh(&mut self) -> Result<(), RepoError> {
        if self.repo.is_bare() {
            return Ok(());
        }
        self.repo.index()?.read(true)?;
        Ok(())
    }

    fn is_ignored(&self, path: &Path) -> Result<bool, RepoError> {
        Ok(self.repo.is_path_ignored(path)?)
    }

    fn skip_worktree(&self, path: &Path) -> Result<Option<bool>, RepoError> {
        let mut index = self.repo.index()?;
        index.read(true)?;
        Ok(index
            .get_path(path, 0)
            .map(|entry| entry.flags_extended & IndexEntryExtendedFlag::SKIP_WORKTREE.bits() != 0))
    }

    fn set_skip_worktree(&self, path: &Path, skip: bool) -> Result<(), RepoError> {
        let mut index = self.repo.index()?;
        index.read(true)?;
        let Some(mut entry) = index.get_path(path, 0) else {
            return Err(RepoError::NotFound(format!("{} in the index", path.display())));
        };
        // libgit2 sets the entry's EXTENDED flag itself when writing.
        let bit = IndexEntryExtendedFlag::SKIP_WORKTREE.bits();
        if skip {
            entry.flags_extended |= bit;
        } else {
            entry.flags_extended &= !bit;
        }
        index.add(&entry)?;
        index.write()?;
        Ok(())
    }

    fn stash_list(&mut self) -> Result<Vec<Stash>, RepoError> {
        let mut stashes = Vec::new();
        self.repo.stash_foreach(|id, message, oid| {
            stashes.push(Stash {
                id,
                message: message.to_string(),
                commit: oid.to_string(),
            });
            true
        })?;
        Ok(stashes)
    }

    fn stash_save(
        &mut self,
        message: &str,
        include_untracked: bool,
    ) -> Result<Option<Stash>, RepoError> {
        let signature = signature_with_fallback(&self.repo)?;
        let flags = if include_untracked {
            StashFlags::INCLUDE_UNTRACKED
        } else {
            StashFlags::DEFAULT
        };
        match self
            .repo
            .stash_save2(&signature, Some(message), Some(flags))
        {
            Ok(_) => Ok(self.stash_list()?.into_iter().next()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stash_apply(
        &mut self,
        id: usize,
        reinstate_index: bool,
        drop: bool,
    ) -> Result<(), StashApplyError> {
        let mut opts = StashApplyOptions::new();
        if reinstate_index {
            opts.reinstantiate_index();
        }
        let result = if drop {
            self.repo.stash_pop(id, Some(&mut opts))
        } else {
            self.repo.stash_apply(id, Some(&mut opts))
        };
        result.map_err(stash_apply_error)
    }

    fn stash_drop(&mut self, id: usize) -> Result<(), RepoError> {
        self.repo.stash_drop(id)?;
        Ok(())
    }

    fn fetch(&self, remote: &RemoteInfo) -> Result<(), RepoError> {
        let mut git_remote = self.repo.find_remote(&remote.name)?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts
            .remote_callbacks(remote_callbacks())
            .prune(FetchPrune::On)
            .download_tags(AutotagOption::All);
        git_remote.fetch::<&str>(&[], Some(&mut fetch_opts), None)?;
        Ok(())
    }

    fn push(
        &self,
        remote: &RemoteInfo,
        src: &str,
        dst: &str,
        force: bool,
    ) -> Result<(), RepoError> {
        let mut git_remote = self.repo.find_remote(&remote.name)?;
        let refspec = format!("{}{src}:{dst}", if force { "+" } else { "" });
        let mut callbacks = remote_callbacks();
        callbacks.push_update_reference(|refname, status| match status {
            Some(msg) => Err(git2::Error::from_str(&format!(
                "push rejected for {refname}: {msg}"
            ))),
            None => Ok(()),
        });
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        git_remote.push(&[refspec.as_str()], Some(&mut push_opts))?;
        Ok(())
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, RepoError> {
        match self.repo.config()?.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), RepoError> {
        self.repo.config()?.set_str(key, value)?;
        Ok(())
    }

    fn config_unset(&self, key: &str) -> Result<(), RepoError> {
        match self.repo.config()?.remove(key) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn worktree_add(&self, path: &Path, branch: Option<&str>) -> Result<(), RepoError> {
        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            RepoError::InvalidArgument(format!("{} has no final component", path.display()))
        })?;
        let reference = branch
            .map(|b| self.repo.find_reference(&format!("refs/heads/{b}")))
            .transpose()?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(reference.as_ref());
        self.repo.worktree(name, path, Some(&opts))?;
        Ok(())
    }

    fn worktrees(&self) -> Result<Vec<WorktreeInfo>, RepoError> {
        let mut worktrees = Vec::new();
        for name in self.repo.worktrees()?.iter().flatten() {
            let worktree = self.repo.find_worktree(name)?;
            let branch = Repository::open_from_worktree(&worktree)
                .ok()
                .and_then(|repo| {
                    let head = repo.head().ok()?;
                    head.is_branch()
                        .then(|| head.shorthand().map(str::to_string))
                        .flatten()
                });
            worktrees.push(WorktreeInfo {
                name: name.to_string(),
                path: normalize(worktree.path()),
                branch,
            });
        }
        worktrees.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(worktrees)
    }

    fn worktree_prune(&self, name: &str, force: bool) -> Result<Option<PathBuf>, RepoError> {
        let worktree = match self.repo.find_worktree(name) {
            Ok(w) => w,
            Err(e) if is_missing(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut opts = WorktreePruneOptions::new();
        opts.valid(force).locked(force).working_tree(force);
        if !worktree.is_prunable(Some(&mut opts))? {
            return Ok(None);
        }
        let path = normalize(worktree.path());
        worktree.prune(Some(&mut opts))?;
        Ok(Some(path))
    }
}

/// Clone and remote listing through libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTransport;

impl NativeTransport {
    fn update_submodules(repo: &Repository) -> Result<(), git2::Error> {
        for mut submodule in repo.submodules()? {
            let mut opts = git2::SubmoduleUpdateOptions::new();
            let mut fetch_opts = FetchOptions::new();
            fetch_opts.remote_callbacks(remote_callbacks());
            opts.fetch(fetch_opts);
            submodule.update(true, Some(&mut opts))?;
            let nested = submodule.open()?;
            Self::update_submodules(&nested)?;
        }
        Ok(())
    }

    /// Borrow objects from `reference` the way `git clone --reference` does.
    fn write_alternates(repo: &Repository, reference: &Path) -> Result<(), RepoError> {
        let nested = reference.join(".git").join("objects");
        let objects = if nested.is_dir() {
            nested
        } else {
            reference.join("objects")
        };
        let objects = fs::canonicalize(&objects)?;
        let info = repo.path().join("objects").join("info");
        fs::create_dir_all(&info)?;
        fs::write(
            info.join("alternates"),
            format!("{}\n", objects.to_string_lossy()),
        )?;
        Ok(())
    }
}

impl GitTransport for NativeTransport {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn clone_repo(&self, request: &CloneRequest) -> Result<(), RepoError> {
        if request.filter {
            tracing::debug!("libgit2 cannot filter objects; cloning {} in full", request.url);
        }
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(remote_callbacks());

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        if !request.checkout {
            let mut checkout = CheckoutBuilder::new();
            checkout.dry_run();
            builder.with_checkout(checkout);
        }
        let repo = builder.clone(&request.url, &request.dest)?;

        if let Some(reference) = &request.reference {
            Self::write_alternates(&repo, reference)?;
        }
        if request.recurse_submodules && request.checkout {
            Self::update_submodules(&repo)?;
        }
        Ok(())
    }

    fn init(&self, path: &Path, initial_commit: bool) -> Result<(), RepoError> {
        let repo = Repository::init_opts(
            path,
            git2::RepositoryInitOptions::new()
                .initial_head("main")
                .mkdir(true),
        )?;
        if initial_commit {
            let signature = signature_with_fallback(&repo)?;
            let tree_id = repo.treebuilder(None)?.write()?;
            let tree = repo.find_tree(tree_id)?;
            repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                INITIAL_COMMIT_MESSAGE,
                &tree,
                &[],
            )?;
        }
        Ok(())
    }

    fn ls_remote(&self, url: &str, heads: bool, tags: bool) -> Result<Vec<String>, RepoError> {
        let mut remote = git2::Remote::create_detached(url)?;
        let connection = remote.connect_auth(Direction::Fetch, Some(remote_callbacks()), None)?;
        let names = connection
            .list()?
            .iter()
            .map(|head| head.name())
            .filter(|name| name.starts_with("refs/") && !name.ends_with("^{}"))
            .filter(|name| match (heads, tags) {
                (false, false) => true,
                (true, false) => name.starts_with("refs/heads/"),
                (false, true) => name.starts_with("refs/tags/"),
                (true, true) => {
                    name.starts_with("refs/heads/") || name.starts_with("refs/tags/")
                }
            })
            .map(strip_ref_namespace)
            .collect();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags_map_to_change_kinds() {
        assert_eq!(change_kind_index(Status::INDEX_NEW), Some(ChangeKind::New));
        assert_eq!(
            change_kind_worktree(Status::WT_MODIFIED),
            Some(ChangeKind::Modified)
        );
        assert_eq!(change_kind_worktree(Status::INDEX_NEW), None);
    }

    #[test]
    fn stash_retry_signals_are_conflict_and_uncommitted() {
        let error = |code| git2::Error::new(code, git2::ErrorClass::Stash, "stash failed");
        assert!(stash_apply_error(error(ErrorCode::Conflict)).is_retryable());
        assert!(stash_apply_error(error(ErrorCode::Uncommitted)).is_retryable());
        assert!(!stash_apply_error(error(ErrorCode::MergeConflict)).is_retryable());
        assert!(!stash_apply_error(error(ErrorCode::NotFound)).is_retryable());
    }

    #[test]
    fn paths_lose_trailing_separator() {
        assert_eq!(
            normalize(Path::new("/repo/.git/")),
            PathBuf::from("/repo/.git")
        );
    }
}

//! [`GitBackend`] over the `git` executable.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{
    BackendKind, BranchInfo, BranchScope, CloneRequest, FALLBACK_EMAIL, FALLBACK_NAME,
    GitBackend, GitTransport, HeadState, INITIAL_COMMIT_MESSAGE, MergeOutcome, ObjectInfo,
    RefInfo, RemoteInfo, RepoLayout, ResetMode, Stash, StashApplyError, StatusEntry, TagInfo,
    WorktreeInfo,
};
use crate::{
    RepoError,
    cli::{GitCli, GitCliError},
    context::RunContext,
    lock::IndexLock,
};

pub struct CliBackend {
    cli: GitCli,
    /// Where commands run: the work tree, or the git dir when bare.
    path: PathBuf,
    layout: RepoLayout,
}

impl CliBackend {
    pub fn open(ctx: &Arc<RunContext>, path: &Path) -> Result<Self, RepoError> {
        let cli = ctx.cli();
        let layout = cli.layout(path).map_err(|e| match e {
            GitCliError::CommandFailed(msg) => RepoError::NotFound(format!(
                "{} is not a git repository: {msg}",
                path.display()
            )),
            other => other.into(),
        })?;
        let path = layout
            .workdir
            .clone()
            .unwrap_or_else(|| layout.git_dir.clone());
        Ok(Self { cli, path, layout })
    }

    fn git<I, S>(&self, args: I) -> Result<String, RepoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Ok(self.cli.git(&self.path, args)?)
    }

    /// Author and committer overrides for commands that create commits in a
    /// repository with no configured identity.
    fn identity_envs(&self) -> Result<Vec<(&'static str, &'static str)>, RepoError> {
        let has_name = self.cli.config_get(&self.path, "user.name")?.is_some();
        let has_email = self.cli.config_get(&self.path, "user.email")?.is_some();
        if has_name && has_email {
            return Ok(Vec::new());
        }
        Ok(vec![
            ("GIT_AUTHOR_NAME", FALLBACK_NAME),
            ("GIT_AUTHOR_EMAIL", FALLBACK_EMAIL),
            ("GIT_COMMITTER_NAME", FALLBACK_NAME),
            ("GIT_COMMITTER_EMAIL", FALLBACK_EMAIL),
        ])
    }

    fn worktrees_dir(&self) -> PathBuf {
        self.layout.common_dir.join("worktrees")
    }

    /// Working tree recorded in `<common>/worktrees/<name>/gitdir`.
    fn worktree_path(&self, name: &str) -> Option<PathBuf> {
        let gitdir = fs::read_to_string(self.worktrees_dir().join(name).join("gitdir")).ok()?;
        let gitdir = PathBuf::from(gitdir.trim());
        gitdir.parent().map(Path::to_path_buf)
    }

    fn repair_remote_head(&self, remote: &str) {
        let head_ref = format!("refs/remotes/{remote}/HEAD");
        let target = match self
            .cli
            .run_raw(Some(&self.path), ["symbolic-ref", "-q", &head_ref], &[])
        {
            Ok(out) if out.success() => Some(out.stdout_lossy().trim().to_string()),
            _ => None,
        };
        if let Some(target) = target {
            match self.cli.rev_parse_commit(&self.path, &target) {
                Ok(Some(_)) => return,
                _ => tracing::debug!("{head_ref} points at missing {target}"),
            }
        }
        tracing::debug!("Repairing {head_ref}");
        if let Err(e) = self.git(["remote", "set-head", remote, "-a"]) {
            tracing::warn!("Could not determine default branch of {remote}: {e}");
        }
    }

    fn classify_stash_failure(msg: String) -> StashFailure {
        let lower = msg.to_ascii_lowercase();
        // Refusals below happen before the working tree is touched.
        if lower.contains("conflicts in index") {
            StashFailure::Refused(StashApplyError::Conflict(msg))
        } else if lower.contains("would be overwritten") {
            StashFailure::Refused(StashApplyError::Uncommitted(msg))
        } else if lower.contains("conflict (") {
            StashFailure::AppliedWithConflicts
        } else {
            StashFailure::Refused(StashApplyError::Other(GitCliError::CommandFailed(msg).into()))
        }
    }
}

/// How a failed `git stash apply` left the repository.
#[derive(Debug)]
enum StashFailure {
    Refused(StashApplyError),
    /// The merge ran and wrote conflict markers; git keeps the entry even on pop.
    AppliedWithConflicts,
}

impl GitBackend for CliBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cli
    }

    fn layout(&self) -> Result<RepoLayout, RepoError> {
        Ok(self.layout.clone())
    }

    fn find_reference(&self, name: &str) -> Result<Option<RefInfo>, RepoError> {
        Ok(self.cli.find_reference(&self.path, name)?)
    }

    fn find_object(&self, spec: &str) -> Result<Option<ObjectInfo>, RepoError> {
        Ok(self.cli.find_object(&self.path, spec)?)
    }

    fn resolve_commit(&self, spec: &str) -> Result<Option<String>, RepoError> {
        Ok(self.cli.rev_parse_commit(&self.path, spec)?)
    }

    fn head(&self) -> Result<HeadState, RepoError> {
        Ok(self.cli.head(&self.path)?)
    }

    fn branches(&self, scope: BranchScope) -> Result<Vec<BranchInfo>, RepoError> {
        Ok(self.cli.branches(&self.path, scope)?)
    }

    fn tags(&self) -> Result<Vec<TagInfo>, RepoError> {
        Ok(self.cli.tags(&self.path)?)
    }

    fn remotes(&self) -> Result<Vec<RemoteInfo>, RepoError> {
        Ok(self.cli.list_remotes(&self.path)?)
    }

    fn upstream(&self, branch: &str) -> Result<Option<String>, RepoError> {
        Ok(self.cli.upstream(&self.path, branch)?)
    }

    fn set_upstream(&self, branch: &str, upstream: Option<&str>) -> Result<(), RepoError> {
        match upstream {
            Some(upstream) => {
                self.git(["branch", &format!("--set-upstream-to={upstream}"), branch])?;
            }
            None => {
                self.cli
                    .config_unset(&self.path, &format!("branch.{branch}.remote"))?;
                self.cli
                    .config_unset(&self.path, &format!("branch.{branch}.merge"))?;
            }
        }
        Ok(())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, RepoError> {
        Ok(self.cli.merge_base(&self.path, a, b)?)
    }

    fn ahead_behind(&self, a: &str, b: &str) -> Result<(usize, usize), RepoError> {
        Ok(self.cli.ahead_behind(&self.path, a, b)?)
    }

    fn is_descendant_of(&self, commit: &str, ancestor: &str) -> Result<bool, RepoError> {
        if commit == ancestor {
            return Ok(false);
        }
        Ok(self.cli.is_ancestor(&self.path, ancestor, commit)?)
    }

    fn create_branch(&self, name: &str, oid: &str, force: bool) -> Result<(), RepoError> {
        let mut args = vec!["branch"];
        if force {
            args.push("-f");
        }
        args.extend(["--no-track", name, oid]);
        self.git(args)?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        self.git(["branch", "-D", name])?;
        Ok(())
    }

    fn create_tag(&self, name: &str, oid: &str, force: bool) -> Result<(), RepoError> {
        let mut args = vec!["tag"];
        if force {
            args.push("-f");
        }
        args.extend([name, oid]);
        self.git(args)?;
        Ok(())
    }

    fn set_head_branch(&self, name: &str) -> Result<(), RepoError> {
        self.git(["symbolic-ref", "HEAD", &format!("refs/heads/{name}")])?;
        Ok(())
    }

    fn set_head_detached(&self, oid: &str) -> Result<(), RepoError> {
        self.git(["update-ref", "--no-deref", "HEAD", oid])?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str, force: bool) -> Result<(), RepoError> {
        let mut args = vec!["checkout"];
        if force {
            args.push("-f");
        }
        args.extend([name, "--"]);
        self.git(args)?;
        Ok(())
    }

    fn checkout_detached(&self, oid: &str, force: bool) -> Result<(), RepoError> {
        let mut args = vec!["checkout"];
        if force {
            args.push("-f");
        }
        args.extend(["--detach", oid]);
        self.git(args)?;
        Ok(())
    }

    fn reset(&self, oid: &str, mode: ResetMode) -> Result<(), RepoError> {
        let flag = match mode {
            ResetMode::Mixed => "--mixed",
            ResetMode::Hard => "--hard",
        };
        self.git(["reset", "-q", flag, oid])?;
        Ok(())
    }

    fn merge(&self, oid: &str, message: &str) -> Result<MergeOutcome, RepoError> {
        let _guard = IndexLock::acquire(&self.layout.git_dir)?;
        let before = self.cli.rev_parse_commit(&self.path, "HEAD")?;
        let target = self
            .cli
            .rev_parse_commit(&self.path, oid)?
            .ok_or_else(|| RepoError::NotFound(format!("commit {oid}")))?;
        let envs = self.identity_envs()?;
        let result = self.cli.git_with_env(
            &self.path,
            ["merge", "--no-edit", "-m", message, &target],
            &envs,
        );
        if let Err(e) = result {
            let conflicted = self.cli.get_conflicted_files(&self.path)?;
            if conflicted.is_empty() {
                return Err(e.into());
            }
            if let Err(abort) = self.git(["merge", "--abort"]) {
                tracing::warn!("Failed to abort conflicted merge: {abort}");
            }
            return Err(RepoError::MergeConflicts {
                message: format!("merging {target} conflicts in {} file(s)", conflicted.len()),
                conflicted_files: conflicted,
            });
        }
        let after = self
            .cli
            .rev_parse_commit(&self.path, "HEAD")?
            .ok_or_else(|| RepoError::NotFound("HEAD after merge".to_string()))?;
        Ok(if before.as_deref() == Some(after.as_str()) {
            MergeOutcome::UpToDate
        } else if after == target {
            MergeOutcome::FastForward(after)
        } else {
            MergeOutcome::Merged(after)
        })
    }

    fn would_conflict(&self, oid: &str) -> Result<bool, RepoError> {
        Ok(self.cli.merge_would_conflict(&self.path, oid)?)
    }

    fn clean(&self, directories: bool, ignored: bool) -> Result<(), RepoError> {
        let mut args = vec!["clean", "-f", "-q"];
        if directories {
            args.push("-d");
        }
        if ignored {
            args.push("-x");
        }
        self.git(args)?;
        Ok(())
    }

    fn discard_changes(&self) -> Result<(), RepoError> {
        self.git(["checkout", "-f", "-q"])?;
        Ok(())
    }

    fn status(&self, include_untracked: bool) -> Result<Vec<StatusEntry>, RepoError> {
        Ok(self
            .cli
            .get_worktree_status(&self.path, include_untracked)?)
    }

    fn refresh(&mut self) -> Result<(), RepoError> {
        // Exit 1 only reports entries needing an update.
        self.cli.run_raw(
            Some(&self.path),
            ["update-index", "-q", "--refresh"],
            &[],
        )?;
        Ok(())
    }

    fn is_ignored(&self, path: &Path) -> Result<bool, RepoError> {
        Ok(self.cli.check_ignore(&self.path, path)?)
    }

    fn skip_worktree(&self, path: &Path) -> Result<Option<bool>, RepoError> {
        Ok(self.cli.skip_worktree(&self.path, path)?)
    }

    fn set_skip_worktree(&self, path: &Path, skip: bool) -> Result<(), RepoError> {
        Ok(self.cli.set_skip_worktree(&self.path, path, skip)?)
    }

    fn stash_list(&mut self) -> Result<Vec<Stash>, RepoError> {
        Ok(self.cli.stash_list(&self.path)?)
    }

    fn stash_save(
        &mut self,
        message: &str,
        include_untracked: bool,
    ) -> Result<Option<Stash>, RepoError> {
        let mut args = vec!["stash", "push"];
        if include_untracked {
            args.push("--include-untracked");
        }
        args.extend(["-m", message]);
        let envs = self.identity_envs()?;
        let out = self.cli.git_with_env(&self.path, args, &envs)?;
        if out.contains("No local changes to save") {
            return Ok(None);
        }
        Ok(self.stash_list()?.into_iter().next())
    }

    fn stash_apply(
        &mut self,
        id: usize,
        reinstate_index: bool,
        drop: bool,
    ) -> Result<(), StashApplyError> {
        let selector = format!("stash@{{{id}}}");
        let mut args = vec![if drop { "pop" } else { "apply" }];
        if reinstate_index {
            args.push("--index");
        }
        args.push(&selector);
        let out = self
            .cli
            .run_raw(Some(&self.path), std::iter::once("stash").chain(args), &[])
            .map_err(RepoError::from)?;
        if out.success() {
            return Ok(());
        }
        match Self::classify_stash_failure(utils::text::combine_output(&out.stdout, &out.stderr))
        {
            StashFailure::AppliedWithConflicts => {
                tracing::debug!("{selector} applied with conflicts");
                if drop {
                    self.stash_drop(id)?;
                }
                Ok(())
            }
            StashFailure::Refused(e) => Err(e),
        }
    }

    fn stash_drop(&mut self, id: usize) -> Result<(), RepoError> {
        self.git(["stash", "drop", "-q", &format!("stash@{{{id}}}")])?;
        Ok(())
    }

    fn fetch(&self, remote: &RemoteInfo) -> Result<(), RepoError> {
        self.cli.fetch(&self.path, &remote.name)?;
        self.repair_remote_head(&remote.name);
        Ok(())
    }

    fn push(
        &self,
        remote: &RemoteInfo,
        src: &str,
        dst: &str,
        force: bool,
    ) -> Result<(), RepoError> {
        Ok(self.cli.push(&self.path, &remote.name, src, dst, force)?)
    }

    fn config_get(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.cli.config_get(&self.path, key)?)
    }

    fn config_set(&self, key: &str, value: &str) -> Result<(), RepoError> {
        self.git(["config", key, value])?;
        Ok(())
    }

    fn config_unset(&self, key: &str) -> Result<(), RepoError> {
        Ok(self.cli.config_unset(&self.path, key)?)
    }

    fn worktree_add(&self, path: &Path, branch: Option<&str>) -> Result<(), RepoError> {
        let mut args: Vec<OsString> = vec!["worktree".into(), "add".into()];
        match branch {
            Some(branch) => {
                args.push(path.into());
                args.push(branch.into());
            }
            None => {
                let name = path.file_name().ok_or_else(|| {
                    RepoError::InvalidArgument(format!("{} has no final component", path.display()))
                })?;
                args.extend(["-b".into(), name.to_os_string(), path.into()]);
            }
        }
        self.git(args)?;
        Ok(())
    }

    fn worktrees(&self) -> Result<Vec<WorktreeInfo>, RepoError> {
        let listed = self.cli.list_worktrees(&self.path)?;
        let entries = match fs::read_dir(self.worktrees_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut worktrees = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            let Some(path) = self.worktree_path(&name) else {
                continue;
            };
            let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            let branch = listed
                .iter()
                .find(|w| {
                    let listed = PathBuf::from(&w.path);
                    fs::canonicalize(&listed).unwrap_or(listed) == canonical
                })
                .and_then(|w| w.branch.clone());
            worktrees.push(WorktreeInfo { name, path, branch });
        }
        worktrees.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(worktrees)
    }

    fn worktree_prune(&self, name: &str, force: bool) -> Result<Option<PathBuf>, RepoError> {
        let Some(path) = self.worktree_path(name) else {
            return Ok(None);
        };
        if path.exists() {
            if !force {
                return Ok(None);
            }
            // Doubled so locked worktrees go too.
            let mut args: Vec<OsString> = vec!["worktree".into(), "remove".into()];
            args.extend(["--force".into(), "--force".into(), path.clone().into()]);
            self.git(args)?;
        }
        self.git(["worktree", "prune"])?;
        Ok(Some(path))
    }
}

pub struct CliTransport {
    cli: GitCli,
}

impl CliTransport {
    pub fn new(ctx: &Arc<RunContext>) -> Self {
        Self { cli: ctx.cli() }
    }
}

impl GitTransport for CliTransport {
    fn kind(&self) -> BackendKind {
        BackendKind::Cli
    }

    fn clone_repo(&self, request: &CloneRequest) -> Result<(), RepoError> {
        let (Some(parent), Some(dir_name)) = (request.dest.parent(), request.dest.file_name())
        else {
            return Err(RepoError::InvalidArgument(format!(
                "clone destination {} has no parent",
                request.dest.display()
            )));
        };
        let mut args: Vec<OsString> = vec!["--progress".into()];
        if !request.checkout {
            args.push("--no-checkout".into());
        }
        if request.recurse_submodules {
            args.push("--recurse-submodules".into());
        }
        if request.filter {
            args.push("--filter=blob:none".into());
        }
        if let Some(reference) = &request.reference {
            args.push("--reference".into());
            args.push(reference.into());
        }
        args.push("--".into());
        args.push(request.url.clone().into());
        args.push(dir_name.to_os_string());
        Ok(self.cli.clone_into(parent, &args)?)
    }

    fn init(&self, path: &Path, initial_commit: bool) -> Result<(), RepoError> {
        fs::create_dir_all(path)?;
        self.cli.git(path, ["init", "-q", "-b", "main"])?;
        if initial_commit {
            let has_name = self.cli.config_get(path, "user.name")?.is_some();
            let has_email = self.cli.config_get(path, "user.email")?.is_some();
            let envs: &[(&str, &str)] = if has_name && has_email {
                &[]
            } else {
                &[
                    ("GIT_AUTHOR_NAME", FALLBACK_NAME),
                    ("GIT_AUTHOR_EMAIL", FALLBACK_EMAIL),
                    ("GIT_COMMITTER_NAME", FALLBACK_NAME),
                    ("GIT_COMMITTER_EMAIL", FALLBACK_EMAIL),
                ]
            };
            self.cli.git_with_env(
                path,
                ["commit", "-q", "--allow-empty", "-m", INITIAL_COMMIT_MESSAGE],
                envs,
            )?;
        }
        Ok(())
    }

    fn ls_remote(&self, url: &str, heads: bool, tags: bool) -> Result<Vec<String>, RepoError> {
        Ok(self.cli.ls_remote(url, heads, tags)?)
    }
}

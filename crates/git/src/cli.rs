//! `git` command-line invocation and output parsing.
//!
//! All argument building and plain-text parsing for the CLI backend lives here,
//! so the command choices can change without touching callers. Commands run
//! through the context's [`ProcessRunner`] with the pager disabled and color
//! forced off unless settings ask otherwise, so output is always parseable.
//!
//! Exit codes that carry meaning (`merge-base` without a base, `config --get`
//! on a missing key, `merge-base --is-ancestor`) are inspected through
//! [`GitCli::run_raw`]; every other non-zero exit becomes
//! [`GitCliError::CommandFailed`] with the captured output.
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use thiserror::Error;
use utils::{
    process::{CommandSpec, ProcessOutput, ProcessRunner},
    shell::resolve_executable_path,
    text::combine_output,
};

use crate::{
    backend::{
        BranchInfo, BranchScope, ChangeKind, HeadState, ObjectInfo, RefInfo, RemoteInfo,
        RepoLayout, Stash, StatusEntry, TagInfo, dwim_ref_candidates, strip_ref_namespace,
    },
    settings::GitSettings,
    version::{GitVersion, RemoteVersion},
};

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("push rejected: {0}")]
    PushRejected(String),
}

/// Parsed worktree entry from `git worktree list --porcelain`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: String,
    pub branch: Option<String>,
}

/// One line of `for-each-ref` output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RefRecord {
    name: String,
    /// Commit the ref peels to; `None` for refs to trees or blobs.
    commit: Option<String>,
    symref: bool,
}

const REF_FORMAT: &str =
    "--format=%(refname)%00%(objectname)%00%(*objectname)%00%(objecttype)%00%(symref)";

fn git_program() -> PathBuf {
    static PROGRAM: OnceLock<PathBuf> = OnceLock::new();
    PROGRAM
        .get_or_init(|| resolve_executable_path("git").unwrap_or_else(|| PathBuf::from("git")))
        .clone()
}

#[derive(Clone)]
pub struct GitCli {
    runner: Arc<dyn ProcessRunner>,
    program: PathBuf,
    color: bool,
    pager: bool,
}

impl GitCli {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: &GitSettings) -> Self {
        Self {
            runner,
            program: git_program(),
            color: settings.color,
            pager: settings.pager,
        }
    }

    /// `git --version`
    pub fn version(&self) -> Result<GitVersion, GitCliError> {
        let out = self.git_impl(None, ["--version"], &[], None)?;
        let text = String::from_utf8_lossy(&out);
        GitVersion::from_version_output(&text)
            .ok_or_else(|| GitCliError::CommandFailed(format!("unrecognised version `{text}`")))
    }

    /// Query the server's advertised agent over protocol v2.
    pub fn remote_version(&self, url: &str) -> Result<Option<RemoteVersion>, GitCliError> {
        let out = self.run_raw(
            None,
            ["-c", "protocol.version=2", "ls-remote", "--heads", url],
            &[("GIT_TRACE_PACKET", "1"), ("GIT_TERMINAL_PROMPT", "0")],
        )?;
        if !out.success() {
            return Err(self.classify_cli_error(combine_output(&out.stdout, &out.stderr)));
        }
        Ok(RemoteVersion::from_packet_trace(&out.stderr_lossy()))
    }

    pub fn layout(&self, repo_path: &Path) -> Result<RepoLayout, GitCliError> {
        let out = self.git(
            repo_path,
            [
                "rev-parse",
                "--path-format=absolute",
                "--git-dir",
                "--git-common-dir",
                "--is-bare-repository",
            ],
        )?;
        let mut lines = out.lines().map(str::trim);
        let (Some(git_dir), Some(common_dir), Some(bare)) =
            (lines.next(), lines.next(), lines.next())
        else {
            return Err(GitCliError::CommandFailed(format!(
                "unexpected rev-parse output: {out}"
            )));
        };
        let workdir = if bare == "true" {
            None
        } else {
            let top = self.git(repo_path, ["rev-parse", "--show-toplevel"])?;
            Some(PathBuf::from(top.trim()))
        };
        Ok(RepoLayout {
            workdir,
            git_dir: PathBuf::from(git_dir),
            common_dir: PathBuf::from(common_dir),
        })
    }

    /// Look up a short ref name in git's DWIM order.
    pub fn find_reference(
        &self,
        repo_path: &Path,
        name: &str,
    ) -> Result<Option<RefInfo>, GitCliError> {
        if is_pseudo_ref(name) {
            return Ok(self
                .rev_parse_commit(repo_path, name)?
                .map(|oid| RefInfo::new(name, oid)));
        }
        let candidates = dwim_ref_candidates(name);
        let patterns: Vec<&str> = candidates
            .iter()
            .map(String::as_str)
            .filter(|c| c.starts_with("refs/"))
            .collect();
        let records = self.for_each_ref(repo_path, &patterns)?;
        for candidate in &candidates {
            if let Some(record) = records.iter().find(|r| &r.name == candidate) {
                return Ok(record
                    .commit
                    .as_ref()
                    .map(|oid| RefInfo::new(&record.name, oid)));
            }
        }
        Ok(None)
    }

    /// Look up a raw commit or annotated tag object.
    pub fn find_object(
        &self,
        repo_path: &Path,
        spec: &str,
    ) -> Result<Option<ObjectInfo>, GitCliError> {
        let out = self.run_raw(
            Some(repo_path),
            ["rev-parse", "--verify", "--quiet", "--end-of-options", spec],
            &[],
        )?;
        if !out.success() {
            return Ok(None);
        }
        let oid = out.stdout_lossy().trim().to_string();
        let kind = self.git(repo_path, ["cat-file", "-t", &oid])?;
        match kind.trim() {
            "commit" => Ok(Some(ObjectInfo::Commit(oid))),
            "tag" => {
                let body = self.git(repo_path, ["cat-file", "tag", &oid])?;
                let Some(name) = body
                    .lines()
                    .find_map(|l| l.strip_prefix("tag "))
                    .map(str::to_string)
                else {
                    return Ok(None);
                };
                Ok(self
                    .rev_parse_commit(repo_path, &oid)?
                    .map(|oid| ObjectInfo::Tag { name, oid }))
            }
            _ => Ok(None),
        }
    }

    /// Full oid of the commit `spec` peels to.
    pub fn rev_parse_commit(
        &self,
        repo_path: &Path,
        spec: &str,
    ) -> Result<Option<String>, GitCliError> {
        let peeled = format!("{spec}^{{commit}}");
        let out = self.run_raw(
            Some(repo_path),
            ["rev-parse", "--verify", "--quiet", "--end-of-options", &peeled],
            &[],
        )?;
        if out.success() {
            Ok(Some(out.stdout_lossy().trim().to_string()))
        } else {
            Ok(None)
        }
    }

    pub fn head(&self, repo_path: &Path) -> Result<HeadState, GitCliError> {
        let sym = self.run_raw(Some(repo_path), ["symbolic-ref", "-q", "HEAD"], &[])?;
        match sym.status {
            Some(0) => {
                let full = sym.stdout_lossy().trim().to_string();
                let name = full
                    .strip_prefix("refs/heads/")
                    .unwrap_or(&full)
                    .to_string();
                match self.rev_parse_commit(repo_path, "HEAD")? {
                    Some(oid) => Ok(HeadState::Branch { name, oid }),
                    None => Ok(HeadState::Unborn(name)),
                }
            }
            Some(1) => {
                let oid = self
                    .rev_parse_commit(repo_path, "HEAD")?
                    .ok_or_else(|| GitCliError::CommandFailed("HEAD is invalid".to_string()))?;
                Ok(HeadState::Detached(oid))
            }
            _ => Err(GitCliError::CommandFailed(combine_output(
                &sym.stdout,
                &sym.stderr,
            ))),
        }
    }

    pub fn branches(
        &self,
        repo_path: &Path,
        scope: BranchScope,
    ) -> Result<Vec<BranchInfo>, GitCliError> {
        let prefix = match scope {
            BranchScope::Local => "refs/heads/",
            BranchScope::Remote => "refs/remotes/",
        };
        let mut branches: Vec<BranchInfo> = self
            .for_each_ref(repo_path, &[prefix.trim_end_matches('/')])?
            .into_iter()
            .filter(|r| !r.symref)
            .filter_map(|r| {
                let name = r.name.strip_prefix(prefix)?.to_string();
                Some(BranchInfo {
                    name,
                    oid: r.commit?,
                })
            })
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    pub fn tags(&self, repo_path: &Path) -> Result<Vec<TagInfo>, GitCliError> {
        let mut tags: Vec<TagInfo> = self
            .for_each_ref(repo_path, &["refs/tags"])?
            .into_iter()
            .filter_map(|r| {
                let name = r.name.strip_prefix("refs/tags/")?.to_string();
                Some(TagInfo {
                    name,
                    oid: r.commit?,
                })
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// List all remotes with their URLs using `git remote -v`, sorted by name.
    pub fn list_remotes(&self, repo_path: &Path) -> Result<Vec<RemoteInfo>, GitCliError> {
        let output = self.git(repo_path, ["remote", "-v"])?;
        Ok(parse_remote_verbose(&output))
    }

    /// Short upstream name such as `origin/main`, if configured and present.
    pub fn upstream(&self, repo_path: &Path, branch: &str) -> Result<Option<String>, GitCliError> {
        let spec = format!("{branch}@{{upstream}}");
        let out = self.run_raw(
            Some(repo_path),
            ["rev-parse", "--abbrev-ref", "--symbolic-full-name", &spec],
            &[],
        )?;
        if !out.success() {
            return Ok(None);
        }
        let name = out.stdout_lossy().trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    /// `None` when the histories share no commit.
    pub fn merge_base(
        &self,
        repo_path: &Path,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, GitCliError> {
        let out = self.run_raw(Some(repo_path), ["merge-base", a, b], &[])?;
        match out.status {
            Some(0) => Ok(Some(out.stdout_lossy().trim().to_string())),
            Some(1) if out.stdout.is_empty() && out.stderr.is_empty() => Ok(None),
            _ => Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            ))),
        }
    }

    /// `(ahead, behind)` of `a` relative to `b`.
    pub fn ahead_behind(
        &self,
        repo_path: &Path,
        a: &str,
        b: &str,
    ) -> Result<(usize, usize), GitCliError> {
        let range = format!("{a}...{b}");
        let out = self.git(repo_path, ["rev-list", "--left-right", "--count", &range])?;
        parse_ahead_behind(&out)
            .ok_or_else(|| GitCliError::CommandFailed(format!("unexpected rev-list output: {out}")))
    }

    /// True when `ancestor` is reachable from `commit` (inclusive).
    pub fn is_ancestor(
        &self,
        repo_path: &Path,
        ancestor: &str,
        commit: &str,
    ) -> Result<bool, GitCliError> {
        let out = self.run_raw(
            Some(repo_path),
            ["merge-base", "--is-ancestor", ancestor, commit],
            &[],
        )?;
        match out.status {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            ))),
        }
    }

    /// True if merging `oid` into HEAD would conflict. Needs git 2.38+.
    pub fn merge_would_conflict(&self, repo_path: &Path, oid: &str) -> Result<bool, GitCliError> {
        let out = self.run_raw(
            Some(repo_path),
            ["merge-tree", "--write-tree", "--no-messages", "HEAD", oid],
            &[],
        )?;
        match out.status {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            ))),
        }
    }

    /// Return `git status --porcelain` parsed into structured entries.
    pub fn get_worktree_status(
        &self,
        worktree_path: &Path,
        include_untracked: bool,
    ) -> Result<Vec<StatusEntry>, GitCliError> {
        // -z: NUL-separated, no quoting. --no-renames keeps one path per entry.
        let untracked = if include_untracked {
            "--untracked-files=all"
        } else {
            "--untracked-files=no"
        };
        let out = self.git_impl(
            Some(worktree_path),
            [
                "--no-optional-locks",
                "status",
                "--porcelain",
                "-z",
                "--no-renames",
                "--ignore-submodules=all",
                untracked,
            ],
            &[],
            None,
        )?;
        Ok(parse_status_z(&out))
    }

    /// List files currently in a conflicted (unmerged) state in the worktree.
    pub fn get_conflicted_files(&self, worktree_path: &Path) -> Result<Vec<String>, GitCliError> {
        // `--diff-filter=U` lists paths with unresolved conflicts
        let out = self.git(worktree_path, ["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Match `path` against the ignore rules only, tracked or not.
    pub fn check_ignore(&self, repo_path: &Path, path: &Path) -> Result<bool, GitCliError> {
        let args = [
            OsStr::new("check-ignore"),
            OsStr::new("-q"),
            OsStr::new("--no-index"),
            OsStr::new("--"),
            path.as_os_str(),
        ];
        let out = self.run_raw(Some(repo_path), args, &[])?;
        match out.status {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            ))),
        }
    }

    /// Skip-worktree bit of the index entry for `path`, read from `ls-files -v`.
    pub fn skip_worktree(
        &self,
        repo_path: &Path,
        path: &Path,
    ) -> Result<Option<bool>, GitCliError> {
        let args = [
            OsStr::new("ls-files"),
            OsStr::new("-v"),
            OsStr::new("--"),
            path.as_os_str(),
        ];
        let out = self.git(repo_path, args)?;
        Ok(parse_ls_files_skip_worktree(&out, &path.to_string_lossy()))
    }

    pub fn set_skip_worktree(
        &self,
        repo_path: &Path,
        path: &Path,
        skip: bool,
    ) -> Result<(), GitCliError> {
        let flag = if skip {
            "--skip-worktree"
        } else {
            "--no-skip-worktree"
        };
        let args = [
            OsStr::new("update-index"),
            OsStr::new(flag),
            OsStr::new("--"),
            path.as_os_str(),
        ];
        self.git(repo_path, args)?;
        Ok(())
    }

    pub fn stash_list(&self, repo_path: &Path) -> Result<Vec<Stash>, GitCliError> {
        let out = self.git(
            repo_path,
            ["stash", "list", "--format=%gd%x09%H%x09%gs"],
        )?;
        Ok(parse_stash_list(&out))
    }

    /// `None` for unset keys.
    pub fn config_get(&self, repo_path: &Path, key: &str) -> Result<Option<String>, GitCliError> {
        let out = self.run_raw(Some(repo_path), ["config", "--get", key], &[])?;
        match out.status {
            Some(0) => Ok(Some(out.stdout_lossy().trim_end_matches('\n').to_string())),
            Some(1) => Ok(None),
            _ => Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            ))),
        }
    }

    pub fn config_unset(&self, repo_path: &Path, key: &str) -> Result<(), GitCliError> {
        let out = self.run_raw(Some(repo_path), ["config", "--unset", key], &[])?;
        match out.status {
            // 5: key was not set
            Some(0) | Some(5) => Ok(()),
            _ => Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            ))),
        }
    }

    pub fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<WorktreeEntry>, GitCliError> {
        let out = self.git(repo_path, ["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }

    /// `git ls-remote --refs -q` with names reduced to their short form.
    pub fn ls_remote(&self, url: &str, heads: bool, tags: bool) -> Result<Vec<String>, GitCliError> {
        let mut args: Vec<&str> = vec!["ls-remote", "--refs", "-q"];
        if heads {
            args.push("--heads");
        }
        if tags {
            args.push("--tags");
        }
        args.push(url);
        let envs = [("GIT_TERMINAL_PROMPT", "0")];
        match self.git_impl(None, args, &envs, None) {
            Ok(out) => Ok(parse_ls_remote(&String::from_utf8_lossy(&out))),
            Err(GitCliError::CommandFailed(msg)) => Err(self.classify_cli_error(msg)),
            Err(err) => Err(err),
        }
    }

    /// Fetch all configured refspecs of `remote`, pruning and forcing tags.
    pub fn fetch(&self, repo_path: &Path, remote: &str) -> Result<(), GitCliError> {
        let envs = [("GIT_TERMINAL_PROMPT", "0")];
        let args = ["fetch", "--prune", "--tags", "--force", "--progress", remote];
        match self.git_impl(Some(repo_path), args, &envs, None) {
            Ok(_) => Ok(()),
            Err(GitCliError::CommandFailed(msg)) => Err(self.classify_cli_error(msg)),
            Err(err) => Err(err),
        }
    }

    /// Push `src:dst` to the named remote.
    pub fn push(
        &self,
        repo_path: &Path,
        remote: &str,
        src: &str,
        dst: &str,
        force: bool,
    ) -> Result<(), GitCliError> {
        let refspec = format!("{src}:{dst}");
        let mut args: Vec<&str> = vec!["push", remote, &refspec];
        if force {
            args.push("--force");
        }
        let envs = [("GIT_TERMINAL_PROMPT", "0")];
        match self.git_impl(Some(repo_path), args, &envs, None) {
            Ok(_) => Ok(()),
            Err(GitCliError::CommandFailed(msg)) => Err(self.classify_cli_error(msg)),
            Err(err) => Err(err),
        }
    }

    /// `git clone` run from `parent`, creating `parent/<dir_name>`.
    pub fn clone_into(
        &self,
        parent: &Path,
        args: &[OsString],
    ) -> Result<(), GitCliError> {
        let spec = self
            .command(None)
            .arg("clone")
            .args(args)
            .current_dir(parent)
            .env("GIT_TERMINAL_PROMPT", "0");
        let out = self.execute(&spec)?;
        if out.success() {
            Ok(())
        } else {
            Err(self.classify_cli_error(combine_output(&out.stdout, &out.stderr)))
        }
    }

    /// Start `git -C <repo> <args>` without waiting for it.
    pub fn spawn_detached<I, S>(&self, repo_path: &Path, args: I) -> Result<(), GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spec = self
            .command(Some(repo_path))
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0");
        self.runner.spawn_detached(&spec).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GitCliError::NotAvailable,
            _ => GitCliError::CommandFailed(e.to_string()),
        })
    }

    /// Run `git -C <repo_path> <args...>` and return stdout on success.
    /// Prefer adding a dedicated helper above over calling this directly, so
    /// parsing and command choices stay in this module.
    pub fn git<I, S>(&self, repo_path: &Path, args: I) -> Result<String, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.git_impl(Some(repo_path), args, &[], None)?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }

    pub fn git_with_env<I, S>(
        &self,
        repo_path: &Path,
        args: I,
        envs: &[(&str, &str)],
    ) -> Result<String, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.git_impl(Some(repo_path), args, envs, None)?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }

    /// Run and return the output whatever the exit code.
    pub fn run_raw<I, S>(
        &self,
        repo_path: Option<&Path>,
        args: I,
        envs: &[(&str, &str)],
    ) -> Result<ProcessOutput, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut spec = self.command(repo_path).args(args);
        for (k, v) in envs {
            spec = spec.env(k, v);
        }
        self.execute(&spec)
    }
}

// Private methods
impl GitCli {
    fn classify_cli_error(&self, msg: String) -> GitCliError {
        let lower = msg.to_ascii_lowercase();
        if lower.contains("authentication failed")
            || lower.contains("could not read username")
            || lower.contains("invalid username or password")
            || lower.contains("permission denied (publickey)")
        {
            GitCliError::AuthFailed(msg)
        } else if lower.contains("non-fast-forward")
            || lower.contains("failed to push some refs")
            || lower.contains("fetch first")
            || lower.contains("updates were rejected because the tip")
        {
            GitCliError::PushRejected(msg)
        } else {
            GitCliError::CommandFailed(msg)
        }
    }

    fn command(&self, repo_path: Option<&Path>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program);
        if !self.pager {
            spec = spec.arg("--no-pager");
        }
        spec = spec.args(["-c", if self.color { "color.ui=always" } else { "color.ui=never" }]);
        if let Some(path) = repo_path {
            spec = spec.arg("-C").arg(path);
        }
        spec
    }

    fn execute(&self, spec: &CommandSpec) -> Result<ProcessOutput, GitCliError> {
        tracing::trace!(cwd = ?spec.cwd, "Running git command: {}", spec);
        self.runner.run(spec).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GitCliError::NotAvailable,
            _ => GitCliError::CommandFailed(e.to_string()),
        })
    }

    fn git_impl<I, S>(
        &self,
        repo_path: Option<&Path>,
        args: I,
        envs: &[(&str, &str)],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut spec = self.command(repo_path).args(args);
        for (k, v) in envs {
            spec = spec.env(k, v);
        }
        if let Some(input) = stdin {
            spec = spec.stdin(input.to_vec());
        }
        let out = self.execute(&spec)?;
        if !out.success() {
            return Err(GitCliError::CommandFailed(combine_output(
                &out.stdout,
                &out.stderr,
            )));
        }
        Ok(out.stdout)
    }

    fn for_each_ref(
        &self,
        repo_path: &Path,
        patterns: &[&str],
    ) -> Result<Vec<RefRecord>, GitCliError> {
        let mut args = vec!["for-each-ref", REF_FORMAT];
        args.extend_from_slice(patterns);
        let out = self.git(repo_path, args)?;
        Ok(parse_ref_records(&out))
    }
}

/// `HEAD`, `FETCH_HEAD`, `ORIG_HEAD` and friends.
fn is_pseudo_ref(name: &str) -> bool {
    name == "HEAD"
        || (name.ends_with("_HEAD")
            && name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_'))
}

fn parse_ref_records(output: &str) -> Vec<RefRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\0');
            let name = fields.next()?.to_string();
            let object = fields.next()?;
            let peeled = fields.next()?;
            let kind = fields.next()?;
            let symref = fields.next().is_some_and(|s| !s.is_empty());
            if name.is_empty() {
                return None;
            }
            let commit = match kind {
                "commit" => Some(object.to_string()),
                "tag" if !peeled.is_empty() => Some(peeled.to_string()),
                _ => None,
            };
            Some(RefRecord {
                name,
                commit,
                symref,
            })
        })
        .collect()
}

fn parse_remote_verbose(output: &str) -> Vec<RemoteInfo> {
    let mut remotes: Vec<RemoteInfo> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Format: "name\turl (fetch)" or "name\turl (push)"
        let Some((name, rest)) = line.split_once('\t') else {
            continue;
        };
        let (url, is_push) = if let Some(url) = rest.strip_suffix(" (fetch)") {
            (url, false)
        } else if let Some(url) = rest.strip_suffix(" (push)") {
            (url, true)
        } else {
            (rest, false)
        };
        let idx = match remotes.iter().position(|r| r.name == name) {
            Some(idx) => idx,
            None => {
                remotes.push(RemoteInfo {
                    name: name.to_string(),
                    url: None,
                    push_url: None,
                });
                remotes.len() - 1
            }
        };
        let remote = &mut remotes[idx];
        if is_push {
            remote.push_url = Some(url.to_string());
        } else {
            remote.url = Some(url.to_string());
        }
    }
    // `remote -v` always prints a push line; keep `push_url` only when it differs.
    for remote in &mut remotes {
        if remote.push_url == remote.url {
            remote.push_url = None;
        }
    }
    remotes.sort_by(|a, b| a.name.cmp(&b.name));
    remotes
}

fn parse_ahead_behind(output: &str) -> Option<(usize, usize)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

fn status_code(code: char) -> Option<ChangeKind> {
    match code {
        'M' => Some(ChangeKind::Modified),
        'A' | 'C' => Some(ChangeKind::New),
        'D' => Some(ChangeKind::Deleted),
        'R' => Some(ChangeKind::Renamed),
        'T' => Some(ChangeKind::TypeChange),
        _ => None,
    }
}

// Format: XY<space>PATH<NUL>[ORIGPATH<NUL>] where ORIGPATH only present for R/C.
fn parse_status_z(out: &[u8]) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut parts = out.split(|b| *b == 0);
    while let Some(part) = parts.next() {
        if part.len() < 4 {
            continue;
        }
        let staged = part[0] as char;
        let unstaged = part[1] as char;
        let path = String::from_utf8_lossy(&part[3..]).into_owned();
        if matches!(staged, 'R' | 'C') || matches!(unstaged, 'R' | 'C') {
            let _orig = parts.next();
        }
        let entry = match (staged, unstaged) {
            ('?', '?') => StatusEntry {
                path,
                index: None,
                worktree: Some(ChangeKind::New),
                conflicted: false,
            },
            ('!', '!') => StatusEntry {
                path,
                index: None,
                worktree: Some(ChangeKind::Ignored),
                conflicted: false,
            },
            ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A')
            | ('U', 'U') => StatusEntry {
                path,
                index: None,
                worktree: None,
                conflicted: true,
            },
            (x, y) => StatusEntry {
                path,
                index: status_code(x),
                worktree: status_code(y),
                conflicted: false,
            },
        };
        entries.push(entry);
    }
    entries
}

fn parse_stash_list(output: &str) -> Vec<Stash> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let selector = fields.next()?;
            let commit = fields.next()?.to_string();
            let message = fields.next().unwrap_or_default().to_string();
            let id = selector
                .strip_prefix("stash@{")?
                .strip_suffix('}')?
                .parse()
                .ok()?;
            Some(Stash {
                id,
                message,
                commit,
            })
        })
        .collect()
}

// `ls-files -v` tags skip-worktree entries `S` (`s` when also assume-unchanged).
fn parse_ls_files_skip_worktree(output: &str, path: &str) -> Option<bool> {
    output.lines().find_map(|line| {
        let (tag, name) = line.split_once(' ')?;
        (name == path).then(|| tag.eq_ignore_ascii_case("S"))
    })
}

fn parse_ls_remote(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .filter_map(|line| line.split('\t').next_back())
        .map(strip_ref_namespace)
        .collect()
}

fn parse_worktree_list(out: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current_path: Option<String> = None;
    let mut current_head: Option<String> = None;
    let mut current_branch: Option<String> = None;

    for line in out.lines() {
        let line = line.trim();

        if line.is_empty() {
            // End of current worktree entry, save it if we have required data
            if let (Some(path), Some(_head)) = (current_path.take(), current_head.take()) {
                entries.push(WorktreeEntry {
                    path,
                    branch: current_branch.take(),
                });
            }
            current_branch = None;
        } else if let Some(path) = line.strip_prefix("worktree ") {
            current_path = Some(path.to_string());
        } else if let Some(head) = line.strip_prefix("HEAD ") {
            current_head = Some(head.to_string());
        } else if let Some(branch_ref) = line.strip_prefix("branch ") {
            current_branch = branch_ref
                .strip_prefix("refs/heads/")
                .map(|name| name.to_string());
        }
    }

    // Handle the last entry if no trailing empty line
    if let (Some(path), Some(_head)) = (current_path, current_head) {
        entries.push(WorktreeEntry {
            path,
            branch: current_branch,
        });
    }

    entries
}

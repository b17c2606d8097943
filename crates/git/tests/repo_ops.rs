use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use git2::Repository;
use tempfile::TempDir;
use workspace_git::{
    BackendKind, ErrorKind, GitPointer, GitRepo, GitSettings, MergeOutcome, MergeStatus,
    ResolveScope, RunContext,
};

const BACKENDS: [BackendKind; 2] = [BackendKind::Native, BackendKind::Cli];

fn context(kind: BackendKind) -> Arc<RunContext> {
    // Only the first call installs the subscriber.
    let _ = utils::log::init_tracing("debug");
    Arc::new(RunContext::new(GitSettings {
        backend: kind,
        ..Default::default()
    }))
}

fn write_file<P: AsRef<Path>>(base: P, rel: &str, content: &str) {
    let path = base.as_ref().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

fn configure_user(repo_path: &Path) {
    let repo = Repository::open(repo_path).unwrap();
    let mut cfg = repo.config().unwrap();
    cfg.set_str("user.name", "Test User").unwrap();
    cfg.set_str("user.email", "test@example.com").unwrap();
}

/// Commit `rel` with `content` on top of HEAD and return the new oid.
fn commit_file(repo_path: &Path, rel: &str, content: &str, message: &str) -> String {
    write_file(repo_path, rel, content);
    let repo = Repository::open(repo_path).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(rel)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = repo.signature().unwrap();
    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
        .to_string()
}

fn stage_file(repo_path: &Path, rel: &str, content: &str) {
    write_file(repo_path, rel, content);
    let repo = Repository::open(repo_path).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(rel)).unwrap();
    index.write().unwrap();
}

fn init_repo_main(root: &TempDir, kind: BackendKind) -> (PathBuf, GitRepo) {
    let path = root.path().join("repo");
    let ctx = context(kind);
    GitRepo::init(&ctx, &path, true).unwrap();
    configure_user(&path);
    let repo = GitRepo::open(&ctx, &path).unwrap();
    (path, repo)
}

#[test]
fn init_creates_main_with_initial_commit() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (_, repo) = init_repo_main(&td, kind);
        assert_eq!(repo.backend_kind(), kind);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert!(repo.current_commit().unwrap().is_some());
        assert!(repo.is_clean().unwrap());
        assert!(!repo.is_worktree());
    }
}

#[test]
fn unborn_head_is_described_as_its_branch() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let path = td.path().join("empty");
        let ctx = context(kind);
        let repo = GitRepo::init(&ctx, &path, false).unwrap();
        assert!(repo.is_unborn().unwrap());
        assert_eq!(
            repo.current_describe().unwrap(),
            GitPointer::Branch("main".into())
        );
        assert_eq!(repo.current_commit().unwrap(), None);
    }
}

#[test]
fn resolution_keeps_variant_and_rejects_mismatches() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let c1 = commit_file(&path, "a.txt", "a", "add a");
        repo.create_tag("v1.0", None, false).unwrap();
        repo.create_branch("feature/x", None).unwrap();

        let found = repo
            .resolve(&GitPointer::Branch("main".into()), ResolveScope::ALL)
            .unwrap()
            .unwrap();
        assert_eq!(found.pointer, GitPointer::Branch("main".into()));
        assert!(found.is_local);
        assert_eq!(found.oid, c1);

        // A branch asked for as a tag does not exist.
        assert!(repo
            .resolve(&GitPointer::Tag("main".into()), ResolveScope::ALL)
            .unwrap()
            .is_none());

        let tag = repo.resolve_name("v1.0", ResolveScope::LOCAL).unwrap().unwrap();
        assert_eq!(tag.pointer, GitPointer::Tag("v1.0".into()));

        let nested = repo.resolve_name("feature/x", ResolveScope::LOCAL).unwrap().unwrap();
        assert_eq!(nested.pointer, GitPointer::Branch("feature/x".into()));

        let commit = repo.resolve_name(&c1[..8], ResolveScope::LOCAL).unwrap().unwrap();
        assert_eq!(commit.pointer, GitPointer::Commit(c1.clone()));
        assert_eq!(commit.pointer.to_string(), format!("commit `{}`", &c1[..10]));

        assert!(!repo
            .exists(&GitPointer::Branch("missing".into()), ResolveScope::ALL)
            .unwrap());
        let err = repo
            .commit_for(&GitPointer::Branch("missing".into()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

#[test]
fn branch_and_tag_sharing_a_name_resolve_separately() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let tagged = commit_file(&path, "a.txt", "a", "tagged");
        repo.create_tag("dup", None, false).unwrap();
        let tip = commit_file(&path, "a.txt", "b", "tip");
        repo.create_branch("dup", None).unwrap();

        let branch = repo
            .resolve(&GitPointer::Branch("dup".into()), ResolveScope::LOCAL)
            .unwrap()
            .unwrap();
        assert_eq!(branch.pointer, GitPointer::Branch("dup".into()), "{kind:?}");
        assert_eq!(branch.oid, tip);

        let tag = repo
            .resolve(&GitPointer::Tag("dup".into()), ResolveScope::LOCAL)
            .unwrap()
            .unwrap();
        assert_eq!(tag.pointer, GitPointer::Tag("dup".into()));
        assert_eq!(tag.oid, tagged);

        assert_eq!(repo.commit_for(&GitPointer::Branch("dup".into())).unwrap(), tip);
        assert_eq!(repo.commit_for(&GitPointer::Tag("dup".into())).unwrap(), tagged);
    }
}

#[test]
fn describe_prefers_tag_on_detached_head() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let c1 = commit_file(&path, "a.txt", "a", "add a");
        commit_file(&path, "b.txt", "b", "add b");
        repo.create_tag("v1.0", Some(&GitPointer::Commit(c1.clone())), false)
            .unwrap();

        repo.checkout(&GitPointer::Tag("v1.0".into()), None, false, false)
            .unwrap();
        assert_eq!(
            repo.current_describe().unwrap(),
            GitPointer::Tag("v1.0".into())
        );
        assert_eq!(repo.current_branch().unwrap(), None);
        assert_eq!(repo.current_tag().unwrap().as_deref(), Some("v1.0"));
        assert_eq!(repo.current_commit().unwrap().as_deref(), Some(c1.as_str()));
        assert_eq!(repo.tag_for(&c1[..7]).unwrap().as_deref(), Some("v1.0"));
    }
}

#[test]
fn checkout_creates_and_switches_branches() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let base = commit_file(&path, "a.txt", "a", "add a");

        let feature = GitPointer::Branch("feature".into());
        repo.checkout(&feature, None, true, false).unwrap();
        assert_eq!(repo.current_describe().unwrap(), feature);
        let head = commit_file(&path, "b.txt", "b", "add b");

        // Already there.
        repo.checkout(&GitPointer::Unknown("feature".into()), None, false, false)
            .unwrap();
        assert_eq!(repo.current_commit().unwrap().as_deref(), Some(head.as_str()));

        repo.checkout(&GitPointer::Branch("main".into()), None, false, false)
            .unwrap();
        assert_eq!(repo.current_commit().unwrap().as_deref(), Some(base.as_str()));
        assert!(!path.join("b.txt").exists());

        assert_eq!(repo.local_branches().unwrap(), vec!["feature", "main"]);
        assert_eq!(repo.local_branches_containing("feature").unwrap(), vec!["feature"]);
        assert_eq!(
            repo.local_branches_containing(&base).unwrap(),
            vec!["feature", "main"]
        );

        repo.change_branch("main", &GitPointer::Branch("feature".into()))
            .unwrap_err();
        repo.change_branch("other", &GitPointer::Commit(head.clone()))
            .unwrap();
        assert_eq!(repo.local_branch("other").unwrap().unwrap().oid, head);
        repo.delete_branch("other").unwrap();
        assert!(repo.local_branch("other").unwrap().is_none());
    }
}

#[test]
fn invalid_names_are_rejected() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (_, repo) = init_repo_main(&td, kind);
        let err = repo.create_branch("bad..name", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = repo
            .create_branch("ok", Some(&GitPointer::Unknown("main".into())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = repo
            .merge(&GitPointer::Commit("not-hex".into()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn latest_commit_requires_one_line_of_history() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let c1 = commit_file(&path, "a.txt", "1", "one");
        let c2 = commit_file(&path, "a.txt", "2", "two");
        let c3 = commit_file(&path, "a.txt", "3", "three");

        let latest = repo
            .calculate_latest_commit(&[c1.as_str(), &c3[..9], c2.as_str(), c1.as_str()])
            .unwrap();
        assert_eq!(latest.as_deref(), Some(c3.as_str()));
        assert_eq!(repo.calculate_latest_commit::<&str>(&[]).unwrap(), None);

        repo.checkout(
            &GitPointer::Branch("side".into()),
            Some(&GitPointer::Commit(c1.clone())),
            true,
            false,
        )
        .unwrap();
        let side = commit_file(&path, "b.txt", "side", "side");
        assert_eq!(
            repo.calculate_latest_commit(&[c2.as_str(), side.as_str()])
                .unwrap(),
            None
        );

        let err = repo.calculate_latest_commit(&["xyz"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn merge_status_between_local_branches() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let base = commit_file(&path, "a.txt", "a", "base");
        repo.create_branch("target", None).unwrap();
        let target = GitPointer::Branch("target".into());

        assert_eq!(
            repo.check_merge_status(Some("main"), Some(&target)).unwrap(),
            MergeStatus::UpToDate
        );

        commit_file(&path, "b.txt", "b", "ahead");
        assert_eq!(
            repo.check_merge_status(None, Some(&target)).unwrap(),
            MergeStatus::Forward
        );

        repo.checkout(&target, None, false, false).unwrap();
        commit_file(&path, "c.txt", "c", "other side");
        assert_eq!(
            repo.check_merge_status(Some("main"), Some(&target)).unwrap(),
            MergeStatus::Diverged
        );
        assert_eq!(
            repo.ahead_behind(&GitPointer::Branch("main".into()), &target)
                .unwrap(),
            (1, 1)
        );

        repo.create_branch("old", Some(&GitPointer::Commit(base))).unwrap();
        assert_eq!(
            repo.check_merge_status(Some("old"), Some(&target)).unwrap(),
            MergeStatus::Behind
        );

        // No upstream configured.
        let err = repo.check_merge_status(Some("old"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }
}

#[test]
fn merge_fast_forwards_and_commits() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "a", "base");
        repo.create_branch("topic", None).unwrap();
        repo.checkout(&GitPointer::Branch("topic".into()), None, false, false)
            .unwrap();
        let topic = commit_file(&path, "t.txt", "t", "topic work");
        repo.checkout(&GitPointer::Branch("main".into()), None, false, false)
            .unwrap();

        let outcome = repo.merge(&GitPointer::Branch("topic".into())).unwrap();
        assert_eq!(outcome, MergeOutcome::FastForward(topic.clone()));
        assert!(path.join("t.txt").exists());
        assert_eq!(
            repo.merge(&GitPointer::Branch("topic".into())).unwrap(),
            MergeOutcome::UpToDate
        );

        repo.checkout(&GitPointer::Branch("topic".into()), None, false, false)
            .unwrap();
        commit_file(&path, "u.txt", "u", "more topic");
        repo.checkout(&GitPointer::Branch("main".into()), None, false, false)
            .unwrap();
        commit_file(&path, "m.txt", "m", "main work");
        assert!(!repo
            .has_merge_conflict(&GitPointer::Branch("topic".into()))
            .unwrap());
        let outcome = repo.merge(&GitPointer::Branch("topic".into())).unwrap();
        assert!(matches!(outcome, MergeOutcome::Merged(_)));
        assert!(path.join("u.txt").exists() && path.join("m.txt").exists());
        assert!(repo.is_clean().unwrap());
    }
}

#[test]
fn conflicting_merge_is_aborted() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "base\n", "base");
        repo.create_branch("topic", None).unwrap();
        commit_file(&path, "a.txt", "main\n", "main edit");
        let main_head = repo.current_commit().unwrap();
        repo.checkout(&GitPointer::Branch("topic".into()), None, false, false)
            .unwrap();
        commit_file(&path, "a.txt", "topic\n", "topic edit");
        repo.checkout(&GitPointer::Branch("main".into()), None, false, false)
            .unwrap();

        let topic = GitPointer::Branch("topic".into());
        assert!(repo.has_merge_conflict(&topic).unwrap());
        let err = repo.merge(&topic).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(repo.current_commit().unwrap(), main_head);
        assert!(!repo.has_conflicts().unwrap());
        assert_eq!(fs::read_to_string(path.join("a.txt")).unwrap(), "main\n");
    }
}

#[test]
fn stash_round_trip_by_name() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, mut repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "committed\n", "base");

        assert_eq!(repo.stash_save("nothing", false).unwrap(), None);

        write_file(&path, "a.txt", "changed\n");
        let saved = repo.stash_save("wip", false).unwrap().unwrap();
        assert_eq!(saved.id, 0);
        assert!(repo.is_clean().unwrap());
        assert!(repo.find_stash("wip").unwrap().is_some());

        // Unknown names are ignored.
        repo.stash_apply("missing", true).unwrap();
        repo.stash_delete("missing").unwrap();

        repo.stash_apply("wip", false).unwrap();
        assert_eq!(fs::read_to_string(path.join("a.txt")).unwrap(), "changed\n");
        assert!(repo.find_stash("wip").unwrap().is_some());

        repo.discard_changes().unwrap();
        repo.stash_apply("wip", true).unwrap();
        assert_eq!(fs::read_to_string(path.join("a.txt")).unwrap(), "changed\n");
        assert!(repo.find_stash("wip").unwrap().is_none());
        assert!(repo.stashes().unwrap().is_empty());
    }
}

#[test]
fn conflicting_pop_leaves_conflicts_and_drops_the_stash() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, mut repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "base\n", "base");

        write_file(&path, "a.txt", "stashed\n");
        repo.stash_save("wip", false).unwrap().unwrap();
        commit_file(&path, "a.txt", "committed\n", "diverge");

        repo.stash_apply("wip", true).unwrap();
        assert!(repo.has_conflicts().unwrap(), "{kind:?}");
        assert!(repo.stashes().unwrap().is_empty(), "{kind:?}");
        let content = fs::read_to_string(path.join("a.txt")).unwrap();
        assert!(content.contains("stashed") && content.contains("committed"));
    }
}

#[test]
fn stash_apply_retries_without_index_when_it_cannot_be_restored() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, mut repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "one\n", "base");

        stage_file(&path, "a.txt", "two\n");
        repo.stash_save("staged", false).unwrap().unwrap();
        commit_file(&path, "a.txt", "three\n", "diverge");

        // The staged side clashes with the new HEAD, so only the second,
        // index-less attempt gets through.
        repo.stash_apply("staged", false).unwrap();
        assert!(repo.has_conflicts().unwrap(), "{kind:?}");
        assert!(repo.find_stash("staged").unwrap().is_some(), "{kind:?}");
    }
}

#[test]
fn stash_save_refuses_while_conflicted() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, mut repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "base\n", "base");
        write_file(&path, "a.txt", "stashed\n");
        repo.stash_save("wip", false).unwrap().unwrap();
        commit_file(&path, "a.txt", "committed\n", "diverge");
        repo.stash_apply("wip", false).unwrap();
        assert!(repo.has_conflicts().unwrap());

        let err = repo.stash_save("again", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed, "{kind:?}");
        assert_eq!(repo.stashes().unwrap().len(), 1);
    }
}

#[test]
fn stash_delete_drops_only_the_named_entry() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, mut repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "base\n", "base");

        write_file(&path, "a.txt", "first\n");
        repo.stash_save("first", false).unwrap().unwrap();
        write_file(&path, "a.txt", "second\n");
        repo.stash_save("second", false).unwrap().unwrap();

        repo.stash_delete("first").unwrap();
        let remaining = repo.stashes().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].message.ends_with("second"));
    }
}

#[test]
fn untracked_files_are_stashed_only_on_request() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, mut repo) = init_repo_main(&td, kind);
        write_file(&path, "new.txt", "untracked\n");

        assert_eq!(repo.stash_save("tracked-only", false).unwrap(), None);
        assert!(repo.stash_save("all", true).unwrap().is_some());
        assert!(!path.join("new.txt").exists());
        repo.stash_apply("all", true).unwrap();
        assert!(path.join("new.txt").exists());
    }
}

#[test]
fn status_reports_index_and_worktree_sides() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "a\n", "base");
        write_file(&path, "a.txt", "edited\n");
        write_file(&path, "n.txt", "new\n");

        let entries = repo.status(false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "a.txt");
        assert_eq!(entries[0].index, None);
        assert_eq!(entries[0].worktree, Some(workspace_git::ChangeKind::Modified));

        let entries = repo.status(true).unwrap();
        let untracked = entries.iter().find(|e| e.path == "n.txt").unwrap();
        assert!(untracked.is_untracked());

        repo.clean(true, false).unwrap();
        assert!(!path.join("n.txt").exists());
        repo.reset(true).unwrap();
        assert!(repo.is_clean().unwrap());
    }
}

#[test]
fn tags_sort_by_version() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "a", "a");
        for tag in ["v1.9.0", "v1.10.0", "release", "2.0-beta"] {
            repo.create_tag(tag, None, false).unwrap();
        }
        assert_eq!(repo.tags().unwrap().len(), 4);
        let (name, _) = repo.max_version_tag().unwrap().unwrap();
        assert_eq!(name, "2.0-beta");
        assert!(repo.create_tag("v1.9.0", None, false).is_err());
        repo.create_tag("v1.9.0", None, true).unwrap();
    }
}

#[test]
fn worktrees_are_added_listed_and_pruned() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "a", "a");
        let wt_path = td.path().join("wt-one");

        repo.add_worktree(&wt_path, None).unwrap();
        let worktrees = repo.worktrees().unwrap();
        assert_eq!(worktrees.len(), 1);
        assert_eq!(worktrees[0].name, "wt-one");
        assert_eq!(worktrees[0].branch.as_deref(), Some("wt-one"));

        {
            let linked = GitRepo::open(repo.context(), &wt_path).unwrap();
            assert!(linked.is_worktree());
            assert_eq!(linked.current_branch().unwrap().as_deref(), Some("wt-one"));
        }

        // Still on disk.
        assert_eq!(repo.prune_worktree("wt-one", false).unwrap(), None);
        assert!(repo.prune_worktree("wt-one", true).unwrap().is_some());
        assert!(repo.worktrees().unwrap().is_empty());

        repo.clean_worktrees().unwrap();
        assert!(!repo.common_dir().join("worktrees").exists());
    }
}

#[test]
fn config_values_round_trip() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (_, repo) = init_repo_main(&td, kind);
        assert_eq!(repo.config("workspace.key").unwrap(), None);
        repo.set_config("workspace.key", "value").unwrap();
        assert_eq!(repo.config("workspace.key").unwrap().as_deref(), Some("value"));
        repo.unset_config("workspace.key").unwrap();
        repo.unset_config("workspace.key").unwrap();
        assert_eq!(repo.config("workspace.key").unwrap(), None);

        let extra = td.path().join("extra.gitconfig");
        repo.include_config(&extra).unwrap();
        repo.include_config(&extra).unwrap();
        assert_eq!(
            repo.config("include.path").unwrap().as_deref(),
            Some(extra.to_string_lossy().as_ref())
        );
    }
}

#[test]
fn ignore_rules_are_added_once_and_matched() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        let exclude = repo.untracked_ignore_path();
        assert!(exclude.starts_with(repo.common_dir()));
        assert!(!repo.check_ignore(Path::new("debug.log")).unwrap());

        repo.ignore(["*.log", "/secret.txt"], &exclude).unwrap();
        repo.ignore(["*.log"], &exclude).unwrap();
        let rules = repo.ignore_rules(&exclude).unwrap();
        assert_eq!(rules.iter().filter(|r| r.as_str() == "*.log").count(), 1);
        assert!(rules.iter().any(|r| r == "/secret.txt"));
        let err = repo.ignore(["a\nb"], &exclude).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(repo.check_ignore(Path::new("debug.log")).unwrap(), "{kind:?}");
        assert!(repo.check_ignore(&path.join("logs").join("run.log")).unwrap());
        assert!(repo.check_ignore(Path::new("secret.txt")).unwrap());
        assert!(!repo.check_ignore(Path::new("src/secret.txt")).unwrap());
        assert!(!repo.check_ignore(Path::new("src/lib.rs")).unwrap());

        let outside = TempDir::new().unwrap();
        let err = repo.check_ignore(&outside.path().join("x.log")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn change_tracking_toggles_skip_worktree() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (path, repo) = init_repo_main(&td, kind);
        commit_file(&path, "a.txt", "a\n", "base");
        let file = Path::new("a.txt");
        assert!(!repo.skips_worktree(file).unwrap());

        repo.change_tracking(file, false).unwrap();
        assert!(repo.skips_worktree(&path.join("a.txt")).unwrap(), "{kind:?}");
        let index = Repository::open(&path).unwrap().index().unwrap();
        let entry = index.get_path(file, 0).unwrap();
        let bit = git2::IndexEntryExtendedFlag::SKIP_WORKTREE.bits();
        assert_ne!(entry.flags_extended & bit, 0);

        // Already untracked.
        repo.change_tracking(file, false).unwrap();
        repo.change_tracking(file, true).unwrap();
        assert!(!repo.skips_worktree(file).unwrap());

        let err = repo
            .change_tracking(Path::new("missing.txt"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

#[test]
fn author_identity_comes_from_repository_config() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (_, repo) = init_repo_main(&td, kind);
        repo.set_config("author.name", "Repo Author").unwrap();
        repo.set_config("author.email", "author@example.com").unwrap();
        assert_eq!(repo.author_name().unwrap().as_deref(), Some("Repo Author"));
        assert_eq!(
            repo.author_email().unwrap().as_deref(),
            Some("author@example.com")
        );
    }
}

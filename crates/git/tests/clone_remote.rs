use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use git2::Repository;
use tempfile::TempDir;
use workspace_git::{
    BackendKind, CloneOptions, CloneState, ErrorKind, GitPointer, GitRepo, GitSettings,
    MergeOutcome, MergeStatus, ResolveScope, RunContext, clone::CloneOrchestrator,
    clone_repository, maintenance::DEFAULT_ALTERNATES_DEPTH,
};

const BACKENDS: [BackendKind; 2] = [BackendKind::Native, BackendKind::Cli];

fn context(kind: BackendKind) -> Arc<RunContext> {
    // Only the first call installs the subscriber.
    let _ = utils::log::init_tracing("debug");
    Arc::new(RunContext::new(GitSettings {
        backend: kind,
        partial_clone: false,
        ..Default::default()
    }))
}

fn full_clone() -> CloneOptions {
    CloneOptions {
        partial_clone: Some(false),
        ..Default::default()
    }
}

fn configure_user(repo_path: &Path) {
    let repo = Repository::open(repo_path).unwrap();
    let mut cfg = repo.config().unwrap();
    cfg.set_str("user.name", "Test User").unwrap();
    cfg.set_str("user.email", "test@example.com").unwrap();
}

/// Commit a file straight onto `refs/heads/main`, bare or not.
fn commit_on_main(repo_path: &Path, rel: &str, content: &str, message: &str) -> String {
    let repo = Repository::open(repo_path).unwrap();
    let parent = repo
        .find_reference("refs/heads/main")
        .ok()
        .map(|r| r.peel_to_commit().unwrap());
    let mut builder = repo
        .treebuilder(parent.as_ref().map(|p| p.tree().unwrap()).as_ref())
        .unwrap();
    let blob = repo.blob(content.as_bytes()).unwrap();
    builder.insert(rel, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let sig = git2::Signature::now("Test User", "test@example.com").unwrap();
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    let oid = repo
        .commit(Some("refs/heads/main"), &sig, &sig, message, &tree, &parents)
        .unwrap();
    if !repo.is_bare() {
        let mut co = git2::build::CheckoutBuilder::new();
        co.force();
        repo.checkout_head(Some(&mut co)).unwrap();
    }
    oid.to_string()
}

/// A bare `origin` with two commits on `main`. Returns its path and the oids.
fn bare_origin(root: &TempDir) -> (PathBuf, Vec<String>) {
    let seed = root.path().join("seed");
    let ctx = context(BackendKind::Native);
    GitRepo::init(&ctx, &seed, false).unwrap();
    configure_user(&seed);
    let first = commit_on_main(&seed, "a.txt", "one\n", "first");
    let second = commit_on_main(&seed, "b.txt", "two\n", "second");

    let origin = root.path().join("origin.git");
    git2::build::RepoBuilder::new()
        .bare(true)
        .clone(seed.to_str().unwrap(), &origin)
        .unwrap();
    (origin, vec![first, second])
}

fn origin_main(origin: &Path) -> String {
    Repository::open_bare(origin)
        .unwrap()
        .find_reference("refs/heads/main")
        .unwrap()
        .peel_to_commit()
        .unwrap()
        .id()
        .to_string()
}

#[test]
fn clone_lands_at_target_with_tracking() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, commits) = bare_origin(&td);
        let target = td.path().join("work");
        let ctx = context(kind);

        let repo = clone_repository(&ctx, origin.to_str().unwrap(), &target, &full_clone()).unwrap();
        assert_eq!(repo.backend_kind(), kind);
        assert!(target.join("a.txt").exists());
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("main"));
        assert_eq!(repo.current_commit().unwrap().as_deref(), Some(commits[1].as_str()));
        assert_eq!(repo.remote_branches().unwrap(), vec!["origin/main"]);
        assert_eq!(repo.url().unwrap().as_deref(), origin.to_str());
        assert_eq!(
            repo.track_branch(None, false).unwrap().as_deref(),
            Some("origin/main")
        );

        // Nothing but the clone is left next to it.
        let siblings: Vec<_> = fs::read_dir(td.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".clone-"))
            .collect();
        assert!(siblings.is_empty());
        assert_eq!(ctx.pending_hooks(), 0);
    }
}

#[test]
fn clone_positions_head_at_requested_commit() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, commits) = bare_origin(&td);
        let target = td.path().join("pinned");
        let options = CloneOptions {
            commit: Some(commits[0].clone()),
            ..full_clone()
        };

        let repo = clone_repository(&context(kind), origin.to_str().unwrap(), &target, &options)
            .unwrap();
        assert_eq!(
            repo.current_describe().unwrap(),
            GitPointer::Commit(commits[0].clone())
        );
        assert!(target.join("a.txt").exists());
        assert!(!target.join("b.txt").exists());
    }
}

#[test]
fn clone_into_empty_directory_is_allowed() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, _) = bare_origin(&td);
        let target = td.path().join("empty");
        fs::create_dir(&target).unwrap();

        clone_repository(&context(kind), origin.to_str().unwrap(), &target, &full_clone())
            .unwrap();
        assert!(target.join(".git").exists());
    }
}

#[test]
fn failed_clone_leaves_target_untouched() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let missing = td.path().join("no-such-repo");
        let target = td.path().join("work");
        let ctx = context(kind);

        let mut orchestrator =
            CloneOrchestrator::new(&ctx, missing.to_str().unwrap(), &target, full_clone());
        assert_eq!(orchestrator.state(), CloneState::NotStarted);
        let err = orchestrator.run().unwrap_err();
        assert_eq!(orchestrator.state(), CloneState::Failed);
        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
        assert!(!target.exists());
        assert_eq!(fs::read_dir(td.path()).unwrap().count(), 0);

        // A finished orchestrator does not run again.
        assert!(orchestrator.run().is_err());
    }
}

#[test]
fn remote_branches_resolve_with_their_remote() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, commits) = bare_origin(&td);
        let repo = clone_repository(
            &context(kind),
            origin.to_str().unwrap(),
            &td.path().join("work"),
            &full_clone(),
        )
        .unwrap();

        let found = repo
            .resolve(&GitPointer::Branch("main".into()), ResolveScope::REMOTE)
            .unwrap()
            .unwrap();
        assert_eq!(found.pointer, GitPointer::Branch("origin/main".into()));
        assert!(!found.is_local);
        assert_eq!(found.remote.as_deref(), Some("origin"));
        assert_eq!(found.local_name(), "main");
        assert_eq!(found.oid, commits[1]);

        let remote = repo.remote_branch("main").unwrap().unwrap();
        assert_eq!(remote.name, "origin/main");
        assert_eq!(
            repo.remote_branches_containing(&commits[0]).unwrap(),
            vec!["origin/main"]
        );

        // Remote-only branch: checkout creates a local tracking copy.
        repo.checkout(&GitPointer::Branch("side".into()), None, true, false)
            .unwrap();
        repo.push_ref("side", None).unwrap();
        repo.fetch().unwrap();
        repo.checkout(&GitPointer::Branch("main".into()), None, false, false)
            .unwrap();
        repo.delete_branch("side").unwrap();
        repo.checkout(&GitPointer::Branch("side".into()), None, false, false)
            .unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("side"));
        assert_eq!(
            repo.track_branch(Some("side"), false).unwrap().as_deref(),
            Some("origin/side")
        );
    }
}

#[test]
fn fetch_reports_behind_and_pull_catches_up() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, _) = bare_origin(&td);
        let work = td.path().join("work");
        let repo =
            clone_repository(&context(kind), origin.to_str().unwrap(), &work, &full_clone())
                .unwrap();

        assert_eq!(repo.check_merge_status(None, None).unwrap(), MergeStatus::UpToDate);

        let upstream = commit_on_main(&origin, "c.txt", "three\n", "third");
        repo.fetch().unwrap();
        assert_eq!(repo.check_merge_status(None, None).unwrap(), MergeStatus::Behind);
        assert_eq!(
            repo.ahead_behind(
                &GitPointer::Branch("main".into()),
                &GitPointer::Branch("origin/main".into())
            )
            .unwrap(),
            (0, 1)
        );
        assert!(repo.is_behind(None).unwrap());
        assert!(!repo.is_forward(None).unwrap());

        assert_eq!(repo.pull().unwrap(), MergeOutcome::FastForward(upstream.clone()));
        assert!(work.join("c.txt").exists());
        assert_eq!(repo.check_merge_status(None, None).unwrap(), MergeStatus::UpToDate);
    }
}

#[test]
fn push_sends_current_branch_to_its_track_branch() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, _) = bare_origin(&td);
        let work = td.path().join("work");
        let repo =
            clone_repository(&context(kind), origin.to_str().unwrap(), &work, &full_clone())
                .unwrap();
        configure_user(&work);

        let local = commit_on_main(&work, "d.txt", "four\n", "fourth");
        assert!(repo.is_forward(None).unwrap());
        repo.push().unwrap();
        assert_eq!(origin_main(&origin), local);

        repo.create_tag("v2.0", None, false).unwrap();
        repo.push_refs("v2.0", "v2.0", Some("ORIGIN"), false).unwrap();
        let tags = Repository::open_bare(&origin).unwrap().tag_names(None).unwrap();
        assert!(tags.iter().flatten().any(|t| t == "v2.0"));

        repo.checkout(&GitPointer::Tag("v2.0".into()), None, false, false)
            .unwrap();
        let err = repo.push().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let err = repo.push_refs("main", "main", Some("upstream"), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

#[test]
fn ls_remote_lists_short_names() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, _) = bare_origin(&td);
        {
            let repo = Repository::open_bare(&origin).unwrap();
            let head = repo.head().unwrap().peel_to_commit().unwrap();
            repo.tag_lightweight("v1.0", head.as_object(), false).unwrap();
            repo.branch("feature/x", &head, false).unwrap();
        }
        let ctx = context(kind);
        let url = origin.to_str().unwrap();

        let mut heads = GitRepo::ls_remote(&ctx, url, true, false).unwrap();
        heads.sort();
        assert_eq!(heads, vec!["feature/x", "main"]);
        assert_eq!(GitRepo::ls_remote(&ctx, url, false, true).unwrap(), vec!["v1.0"]);

        let err = GitRepo::ls_remote(&ctx, td.path().join("nope").to_str().unwrap(), true, true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    }
}

#[test]
fn alternates_are_written_for_reference_clones() {
    for kind in BACKENDS {
        let td = TempDir::new().unwrap();
        let (origin, _) = bare_origin(&td);
        let options = CloneOptions {
            reference: Some(origin.clone()),
            ..full_clone()
        };
        let repo = clone_repository(
            &context(kind),
            origin.to_str().unwrap(),
            &td.path().join("borrowing"),
            &options,
        )
        .unwrap();

        let alternates = repo.alternates().unwrap();
        assert_eq!(alternates.len(), 1);
        let expected = fs::canonicalize(origin.join("objects")).unwrap();
        assert_eq!(fs::canonicalize(&alternates[0]).unwrap(), expected);
        assert_eq!(repo.all_alternates(DEFAULT_ALTERNATES_DEPTH).unwrap(), alternates);
    }
}

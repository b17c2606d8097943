//! Per-invocation state shared by every repository handle.

use std::{
    fmt,
    sync::{Arc, Mutex, OnceLock},
};

use utils::process::{ProcessRunner, SystemRunner};

use crate::{cli::GitCli, settings::GitSettings, version::GitVersion};

/// Deferred work drained once the orchestrating run finishes.
pub type PostRunHook = Box<dyn FnOnce() + Send + 'static>;

/// Created once per tool invocation and passed to every operation.
///
/// Owns the memoized local git version and the post-run hook queue.
pub struct RunContext {
    settings: GitSettings,
    runner: Arc<dyn ProcessRunner>,
    git_version: OnceLock<Option<GitVersion>>,
    hooks: Mutex<Vec<PostRunHook>>,
}

impl RunContext {
    pub fn new(settings: GitSettings) -> Self {
        Self::with_runner(settings, Arc::new(SystemRunner))
    }

    pub fn with_runner(settings: GitSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            settings,
            runner,
            git_version: OnceLock::new(),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &GitSettings {
        &self.settings
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }

    pub fn cli(&self) -> GitCli {
        GitCli::new(self.runner(), &self.settings)
    }

    /// Local `git --version`, read once. Failures yield `None`.
    pub fn local_git_version(&self) -> Option<GitVersion> {
        *self.git_version.get_or_init(|| match self.cli().version() {
            Ok(v) => {
                tracing::debug!("Local git version {v}");
                Some(v)
            }
            Err(e) => {
                tracing::warn!("Could not determine local git version: {e}");
                None
            }
        })
    }

    /// Queue work to run after the current invocation's primary work.
    pub fn defer(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Drain and run queued hooks in the order they were added. Hooks queued
    /// while draining run in the same call.
    pub fn run_post_hooks(&self) {
        loop {
            let batch: Vec<PostRunHook> = std::mem::take(
                &mut *self
                    .hooks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            if batch.is_empty() {
                break;
            }
            tracing::debug!("Running {} post-run hook(s)", batch.len());
            for hook in batch {
                hook();
            }
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("settings", &self.settings)
            .field("git_version", &self.git_version.get())
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}

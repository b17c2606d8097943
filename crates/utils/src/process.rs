//! Process execution seam.
//!
//! Everything that shells out goes through [`ProcessRunner`] so callers can
//! swap the system implementation for a recording fake in tests.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    io::{self, Write as _},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// A fully described external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(OsString, OsString)>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Arguments as lossy UTF-8, for matching in tests and logs.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Shell-quoted command line for logging.
    pub fn display(&self) -> String {
        let program = self.program.to_string_lossy();
        std::iter::once(program)
            .chain(self.args.iter().map(|a| a.to_string_lossy()))
            .map(|part| {
                shlex::try_quote(&part)
                    .map(|quoted| quoted.into_owned())
                    .unwrap_or_else(|_| part.to_string())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr.
    fn run(&self, spec: &CommandSpec) -> io::Result<ProcessOutput>;

    /// Start the process and return immediately. The child is never awaited.
    fn spawn_detached(&self, spec: &CommandSpec) -> io::Result<()>;
}

/// [`ProcessRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.envs {
            cmd.env(k, v);
        }
        cmd
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<ProcessOutput> {
        let mut cmd = Self::command(spec);
        cmd.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::trace!(cwd = ?spec.cwd, "Running command: {}", spec);

        let mut child = cmd.spawn()?;
        let write_result = match (&spec.stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => pipe.write_all(input),
            _ => Ok(()),
        };
        let out = child.wait_with_output()?;
        write_result?;

        Ok(ProcessOutput {
            status: out.status.code(),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> io::Result<()> {
        let mut cmd = Self::command(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // Own process group so the child outlives the parent's terminal session.
            cmd.process_group(0);
        }
        tracing::debug!(cwd = ?spec.cwd, "Spawning detached command: {}", spec);
        cmd.spawn().map(|_| ())
    }
}

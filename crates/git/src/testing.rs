use std::{fs, io, sync::Mutex};

use utils::process::{CommandSpec, ProcessOutput, ProcessRunner};

struct Rule {
    needles: Vec<String>,
    output: ProcessOutput,
}

/// Recording [`ProcessRunner`] with canned responses.
///
/// A call gets the output of the most recently added rule whose needles all
/// appear among its arguments; unmatched calls succeed with empty output.
#[derive(Default)]
pub(crate) struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
    detached: Mutex<Vec<CommandSpec>>,
    creates_dir: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn respond(&self, needles: &[&str], status: i32, stdout: &str, stderr: &str) {
        self.rules.lock().unwrap().push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            output: ProcessOutput {
                status: Some(status),
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            },
        });
    }

    /// Calls containing `needle` create their last argument as a directory
    /// under the call's working directory, like `git clone <url> <dir>` would.
    pub(crate) fn create_dir_on(&self, needle: &str) {
        self.creates_dir.lock().unwrap().push(needle.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn detached(&self) -> Vec<CommandSpec> {
        self.detached.lock().unwrap().clone()
    }

    /// First recorded call whose arguments contain `needle`.
    pub(crate) fn call_with(&self, needle: &str) -> Option<CommandSpec> {
        self.calls()
            .into_iter()
            .find(|c| c.args_lossy().iter().any(|a| a == needle))
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let args = spec.args_lossy();
        let creates_dir = self
            .creates_dir
            .lock()
            .unwrap()
            .iter()
            .any(|needle| args.contains(needle));
        if creates_dir && let (Some(cwd), Some(last)) = (&spec.cwd, args.last()) {
            fs::create_dir_all(cwd.join(last))?;
        }
        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .rev()
            .find(|r| r.needles.iter().all(|n| args.contains(n)))
            .map(|r| r.output.clone())
            .unwrap_or(ProcessOutput {
                status: Some(0),
                ..Default::default()
            });
        Ok(output)
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> io::Result<()> {
        self.detached.lock().unwrap().push(spec.clone());
        Ok(())
    }
}

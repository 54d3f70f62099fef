//! External process execution
//!
//! Abstracts build-tool invocations for testability. Provides:
//! - CommandRunner trait: synchronous invocation with captured output
//! - SystemRunner: real subprocess execution for production
//! - MockRunner: scripted responses for unit tests
//!
//! Tool selection (which command to run) is deliberately kept out of this
//! module; callers decide the command line, this module only executes it
//! and captures the result.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Result of one external process invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code (-1 if terminated by signal)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined stdout and stderr, for attaching to errors
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Process execution errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no scripted response for '{0}'")]
    Unscripted(String),
}

/// Abstraction over synchronous external process execution
pub trait CommandRunner: Send + Sync {
    /// Run a program with arguments in the given working directory,
    /// capturing stdout and stderr.
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, ProcessError>;
}

/// Production runner backed by std::process::Command
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, ProcessError> {
        use std::process::Command;

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| ProcessError::Spawn {
                program: program.to_string(),
                source: e,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// One recorded invocation seen by a MockRunner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Scripted runner for tests
///
/// Responses are matched by program name in FIFO order per program, so a
/// test can script `ant` succeeding and `aapt` returning recorded badging
/// output independently. Unmatched programs fall back to a default
/// successful empty output unless strict mode is enabled.
#[derive(Default)]
pub struct MockRunner {
    scripted: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<RecordedCall>>,
    strict: bool,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that errors on any program without a scripted response
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Queue a response for the next invocation of `program`
    pub fn script(&self, program: &str, output: CommandOutput) {
        let mut scripted = self.scripted.lock().unwrap();
        if let Some((_, queue)) = scripted.iter_mut().find(|(p, _)| p == program) {
            queue.push_back(output);
        } else {
            scripted.push((program.to_string(), VecDeque::from([output])));
        }
    }

    /// Queue a successful invocation of `program` with the given stdout
    pub fn script_ok(&self, program: &str, stdout: &str) {
        self.script(
            program,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Queue a failing invocation of `program`
    pub fn script_fail(&self, program: &str, exit_code: i32, stderr: &str) {
        self.script(
            program,
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// All invocations seen so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any invocation of `program` was seen
    pub fn was_called(&self, program: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.program == program)
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.to_path_buf(),
        });

        let mut scripted = self.scripted.lock().unwrap();
        if let Some((_, queue)) = scripted.iter_mut().find(|(p, _)| p == program) {
            if let Some(output) = queue.pop_front() {
                return Ok(output);
            }
        }

        if self.strict {
            return Err(ProcessError::Unscripted(program.to_string()));
        }

        Ok(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

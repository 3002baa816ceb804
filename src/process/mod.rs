//! External tool execution.
//!
//! Every tool call goes through a [`ToolInvocation`]: a program, a structured
//! argument vector, the files it must be able to read, and the file it is
//! expected to produce. [`ToolRunner`] is the seam; [`ProcessRunner`] is the
//! real implementation and bounds each call with a timeout.

mod preflight;

pub use preflight::{check_required_tools, command_exists, resolve_program};

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{FdsError, Result};

/// Default wall-clock bound for a single tool run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One call of an external build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Files the tool reads. Checked for existence before spawning.
    pub inputs: Vec<PathBuf>,
    /// File the tool must leave behind on success.
    pub output: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ToolInvocation {
            program: program.into(),
            args: Vec::new(),
            inputs: Vec::new(),
            output: None,
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

    /// Pass `path` as an argument and record it as an input.
    pub fn input_arg(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self.inputs.push(path.to_path_buf());
        self
    }

    /// Record `path` as an input without putting it on the command line.
    pub fn input(mut self, path: &Path) -> Self {
        self.inputs.push(path.to_path_buf());
        self
    }

    /// Pass `flag path` and record `path` as the expected output.
    pub fn output_arg(mut self, flag: &str, path: &Path) -> Self {
        self.args.push(flag.into());
        self.args.push(path.as_os_str().to_os_string());
        self.output = Some(path.to_path_buf());
        self
    }

    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes tool invocations. Implementations must treat a nonzero exit, a
/// missing program or a missing declared output as [`FdsError::BuildTool`].
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs tools as child processes with captured output and a timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let tool = invocation.tool_name();
        check_inputs(invocation)?;
        log::debug!("{}", invocation);

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FdsError::tool(&tool, format!("failed to spawn: {e}")))?;

        // Drain both pipes on their own threads so a chatty tool can't
        // block on a full pipe while we poll for exit.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let status: ExitStatus = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FdsError::tool(&tool, format!("waiting for exit: {e}")));
                }
            }
            if start.elapsed() > self.timeout {
                log::warn!(
                    "{} exceeded {}s, killing it",
                    tool,
                    self.timeout.as_secs_f64()
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(FdsError::tool(
                    &tool,
                    format!("timed out after {:.1}s", self.timeout.as_secs_f64()),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A background child of the tool can hold the pipes open after the
        // tool itself exits; the readers share the same deadline.
        let deadline = start + self.timeout;
        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
        else {
            log::warn!("{} left its output pipes open, abandoning readers", tool);
            return Err(FdsError::tool(
                &tool,
                format!(
                    "timed out after {:.1}s waiting for output to close",
                    self.timeout.as_secs_f64()
                ),
            ));
        };
        let output = ToolOutput { stdout, stderr };

        if !status.success() {
            return Err(FdsError::tool(
                &tool,
                format!(
                    "{} failed ({}): {}\n{}",
                    invocation,
                    status,
                    output.stdout.trim(),
                    output.stderr.trim()
                ),
            ));
        }
        check_output(invocation)?;
        Ok(output)
    }
}

/// Fail before spawning if any declared input is missing.
pub(crate) fn check_inputs(invocation: &ToolInvocation) -> Result<()> {
    for input in &invocation.inputs {
        if !input.is_file() {
            return Err(FdsError::tool(
                invocation.tool_name(),
                format!("missing input '{}'", input.display()),
            ));
        }
    }
    Ok(())
}

/// Fail if the tool exited cleanly but left no output behind.
pub(crate) fn check_output(invocation: &ToolInvocation) -> Result<()> {
    if let Some(output) = &invocation.output {
        if !output.is_file() {
            return Err(FdsError::tool(
                invocation.tool_name(),
                format!("produced no output at '{}'", output.display()),
            ));
        }
    }
    Ok(())
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Wait for a pipe reader until `deadline`. `None` means it is still
/// blocked; the reader thread is left detached.
fn collect(reader: Option<mpsc::Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(rx) = reader else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(mpsc::RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(mpsc::RecvTimeoutError::Timeout) => None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn captures_stdout() {
        let out = ProcessRunner::default()
            .run(&ToolInvocation::new("echo").arg("GenFv"))
            .unwrap();
        assert_eq!(out.stdout.trim(), "GenFv");
    }

    #[test]
    fn nonzero_exit_is_build_tool_error() {
        let err = ProcessRunner::default()
            .run(&ToolInvocation::new("sh").args(["-c", "echo broken >&2; exit 3"]))
            .unwrap_err();
        match err {
            FdsError::BuildTool { tool, message } => {
                assert_eq!(tool, "sh");
                assert!(message.contains("broken"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_build_tool_error() {
        let err = ProcessRunner::default()
            .run(&ToolInvocation::new("definitely_not_a_real_command_12345"))
            .unwrap_err();
        assert!(matches!(err, FdsError::BuildTool { .. }));
    }

    #[test]
    fn timeout_kills_the_tool() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let start = Instant::now();
        let err = runner
            .run(&ToolInvocation::new("sleep").arg("5"))
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn background_child_holding_pipes_times_out() {
        let runner = ProcessRunner::new(Duration::from_millis(300));
        let start = Instant::now();
        let err = runner
            .run(&ToolInvocation::new("sh").args(["-c", "sleep 6 & exit 0"]))
            .unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(matches!(err, FdsError::BuildTool { ref message, .. } if message.contains("timed out")));
    }

    #[test]
    fn missing_input_fails_before_spawn() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("ran");
        let inv = ToolInvocation::new("touch")
            .arg(&marker)
            .input(&tmp.path().join("absent.ffs"));
        let err = ProcessRunner::default().run(&inv).unwrap_err();
        assert!(err.to_string().contains("absent.ffs"));
        assert!(!marker.exists());
    }

    #[test]
    fn missing_output_is_build_tool_error() {
        let tmp = TempDir::new().unwrap();
        let inv = ToolInvocation::new("true").output_arg("-o", &tmp.path().join("never.Fv"));
        let err = ProcessRunner::default().run(&inv).unwrap_err();
        assert!(err.to_string().contains("produced no output"));

        let made = tmp.path().join("made.Fv");
        let inv = ToolInvocation::new("touch").arg(&made);
        let inv = ToolInvocation {
            output: Some(made.clone()),
            ..inv
        };
        ProcessRunner::default().run(&inv).unwrap();
        assert!(fs::metadata(&made).is_ok());
    }
}

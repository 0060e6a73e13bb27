//! External tool invocation.
//!
//! Everything heavyweight (allocation, formatting, mounting, bootstrapping,
//! chroot) is delegated to host tools. Components build an [`Invocation`]
//! and hand it to a [`ToolRunner`]; the orchestrator is generic over the
//! runner so its sequencing can be exercised without touching real mounts.

use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// How often a deadline-bounded child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single external tool invocation: program name plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The invocation rendered as a shell-style line, for logs and errors.
    pub fn command_line(&self) -> String {
        let mut line = self.tool.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Outcome of a finished tool run.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Exit code, `None` when the child was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout; empty for streamed runs.
    pub stdout: String,
    /// Captured stderr; empty for streamed runs.
    pub stderr: String,
    /// The child was killed because the deadline passed.
    pub timed_out: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }
}

/// Runs external tools on behalf of the lifecycle components.
pub trait ToolRunner {
    /// Run to completion, capturing stdout and stderr.
    fn run(&self, inv: &Invocation) -> io::Result<RunOutput>;

    /// Run with stdio inherited, for interactive sessions and long
    /// bootstraps whose progress the user should see. A `timeout` of
    /// `None` waits indefinitely; otherwise the child is killed once the
    /// deadline passes and the output is marked timed out.
    fn run_streamed(&self, inv: &Invocation, timeout: Option<Duration>) -> io::Result<RunOutput>;
}

/// [`ToolRunner`] that spawns real processes on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRunner;

impl ToolRunner for HostRunner {
    fn run(&self, inv: &Invocation) -> io::Result<RunOutput> {
        debug!(cmd = %inv.command_line(), "running tool");
        let output = Command::new(&inv.tool).args(&inv.args).output()?;
        Ok(RunOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        })
    }

    fn run_streamed(&self, inv: &Invocation, timeout: Option<Duration>) -> io::Result<RunOutput> {
        debug!(cmd = %inv.command_line(), ?timeout, "running tool (streamed)");
        let mut child = Command::new(&inv.tool)
            .args(&inv.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        let Some(limit) = timeout else {
            let status = child.wait()?;
            return Ok(RunOutput {
                code: status.code(),
                ..RunOutput::default()
            });
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(RunOutput {
                    code: status.code(),
                    ..RunOutput::default()
                });
            }
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(RunOutput {
                    timed_out: true,
                    ..RunOutput::default()
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_renders_tool_and_args() {
        let inv = Invocation::new("mkfs.ext4").arg("/tmp/test.img");
        assert_eq!(inv.command_line(), "mkfs.ext4 /tmp/test.img");
    }

    #[test]
    fn captured_run_collects_stdout() {
        let out = HostRunner.run(&Invocation::new("echo").arg("hello")).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn missing_tool_is_an_io_error() {
        let err = HostRunner.run(&Invocation::new("definitely-not-a-real-tool-1234"));
        assert!(err.is_err());
    }

    #[test]
    fn streamed_run_without_deadline_waits_for_exit() {
        let out = HostRunner
            .run_streamed(&Invocation::new("true"), None)
            .unwrap();
        assert!(out.success());
    }

    #[test]
    fn streamed_run_kills_child_past_deadline() {
        let out = HostRunner
            .run_streamed(
                &Invocation::new("sleep").arg("5"),
                Some(Duration::from_millis(50)),
            )
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }
}

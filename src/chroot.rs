//! Change-of-root execution inside a mounted environment.
//!
//! Runs a command with the mountpoint as its apparent root, blocking until
//! it exits. Mount/unmount bracketing is the orchestrator's job; this
//! module performs no cleanup of its own.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{ChrootErrorKind, Error, Result};
use crate::process::{Invocation, ToolRunner};

/// Command run when the caller asks for an interactive session.
pub const DEFAULT_SHELL: &str = "/bin/bash";

// GNU chroot exit codes: 125 = chroot itself failed, 126 = command found
// but not executable, 127 = command not found.
const CHROOT_FAILED: i32 = 125;
const NOT_EXECUTABLE: i32 = 126;
const NOT_FOUND: i32 = 127;

/// Execute `command` with `mountpoint` as its root, with stdio inherited.
///
/// Returns the command's exit code; the caller decides whether a non-zero
/// exit is an error for its operation. Failing to change root or to launch
/// the command is always an error here.
pub fn run<R: ToolRunner + ?Sized>(
    runner: &R,
    mountpoint: &Path,
    command: &[String],
    timeout: Option<Duration>,
) -> Result<i32> {
    debug!(mountpoint = %mountpoint.display(), cmd = %command.join(" "), "entering chroot");

    let inv = Invocation::new("chroot")
        .arg(mountpoint.display().to_string())
        .args(command.iter().cloned());
    let out = runner
        .run_streamed(&inv, timeout)
        .map_err(|e| Error::Chroot {
            mountpoint: mountpoint.to_path_buf(),
            kind: ChrootErrorKind::Exec,
            detail: format!("launching chroot: {e}"),
        })?;

    match out.code {
        Some(CHROOT_FAILED) => Err(Error::Chroot {
            mountpoint: mountpoint.to_path_buf(),
            kind: ChrootErrorKind::Privilege,
            detail: "chroot could not change root (not mounted or insufficient privilege)"
                .to_string(),
        }),
        Some(code @ (NOT_EXECUTABLE | NOT_FOUND)) => Err(Error::Chroot {
            mountpoint: mountpoint.to_path_buf(),
            kind: ChrootErrorKind::Exec,
            detail: format!("'{}' could not be executed (exit {code})", command.join(" ")),
        }),
        Some(code) => Ok(code),
        None => Err(Error::Chroot {
            mountpoint: mountpoint.to_path_buf(),
            kind: ChrootErrorKind::Exec,
            detail: if out.timed_out {
                "chroot command killed after deadline".to_string()
            } else {
                "chroot command killed by signal".to_string()
            },
        }),
    }
}

/// Convenience for `run` with the default interactive shell.
pub fn run_shell<R: ToolRunner + ?Sized>(runner: &R, mountpoint: &Path) -> Result<i32> {
    run(runner, mountpoint, &[DEFAULT_SHELL.to_string()], None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeRunner;
    use crate::process::RunOutput;
    use std::path::PathBuf;

    fn mnt() -> PathBuf {
        PathBuf::from("/var/lib/rootbox/mount/dev01-mount")
    }

    fn shell() -> Vec<String> {
        vec![DEFAULT_SHELL.to_string()]
    }

    #[test]
    fn runs_the_command_under_the_mountpoint_root() {
        let runner = FakeRunner::new();
        let code = run(
            &runner,
            &mnt(),
            &["apt-get".to_string(), "update".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(code, 0);

        let calls = runner.calls.borrow();
        assert_eq!(calls[0].tool, "chroot");
        assert_eq!(
            calls[0].args,
            vec![mnt().display().to_string(), "apt-get".into(), "update".into()]
        );
    }

    #[test]
    fn chroot_refusal_is_a_privilege_error() {
        let runner = FakeRunner::new();
        runner.force(
            "chroot",
            RunOutput {
                code: Some(CHROOT_FAILED),
                ..RunOutput::default()
            },
        );

        let err = run(&runner, &mnt(), &shell(), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Chroot {
                kind: ChrootErrorKind::Privilege,
                ..
            }
        ));
    }

    #[test]
    fn missing_command_is_an_exec_error() {
        let runner = FakeRunner::new();
        runner.force(
            "chroot",
            RunOutput {
                code: Some(NOT_FOUND),
                ..RunOutput::default()
            },
        );

        let err = run(&runner, &mnt(), &shell(), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Chroot {
                kind: ChrootErrorKind::Exec,
                ..
            }
        ));
    }

    #[test]
    fn guest_exit_codes_are_surfaced_not_raised() {
        let runner = FakeRunner::new();
        runner.force(
            "chroot",
            RunOutput {
                code: Some(2),
                ..RunOutput::default()
            },
        );
        assert_eq!(run(&runner, &mnt(), &shell(), None).unwrap(), 2);
    }
}

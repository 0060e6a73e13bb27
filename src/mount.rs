//! Attaching and detaching backing images.
//!
//! Mounting goes through the host `mount` tool (loop-backed under the
//! hood); unmounting uses `umount -l` so busy-but-idle references detach
//! lazily instead of blocking the operation. Unmounting a path that is not
//! mounted is a no-op, which makes the orchestrator's unconditional
//! release safe on every exit path.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, MountErrorKind, Result};
use crate::process::{Invocation, RunOutput, ToolRunner};

/// Attach `image` as the filesystem rooted at `mountpoint`, creating the
/// mountpoint directory if absent.
pub fn mount<R: ToolRunner + ?Sized>(runner: &R, image: &Path, mountpoint: &Path) -> Result<()> {
    fs::create_dir_all(mountpoint)?;

    let inv = Invocation::new("mount")
        .arg(image.display().to_string())
        .arg(mountpoint.display().to_string());
    let out = runner.run(&inv)?;
    if !out.success() {
        let detail = out.stderr.trim().to_string();
        return Err(Error::Mount {
            image: image.to_path_buf(),
            mountpoint: mountpoint.to_path_buf(),
            kind: classify_mount_failure(&detail),
            detail,
        });
    }

    info!(mountpoint = %mountpoint.display(), "mounted");
    Ok(())
}

/// Detach `mountpoint` lazily. Idempotent: an already-unmounted path
/// succeeds quietly.
pub fn unmount<R: ToolRunner + ?Sized>(runner: &R, mountpoint: &Path) -> Result<()> {
    let inv = Invocation::new("umount")
        .arg("-l")
        .arg(mountpoint.display().to_string());
    let out = runner.run(&inv)?;
    if out.success() {
        info!(mountpoint = %mountpoint.display(), "unmounted");
        return Ok(());
    }
    if is_not_mounted(&out) {
        debug!(mountpoint = %mountpoint.display(), "already unmounted");
        return Ok(());
    }
    Err(Error::Unmount {
        mountpoint: mountpoint.to_path_buf(),
        detail: out.stderr.trim().to_string(),
    })
}

fn is_not_mounted(out: &RunOutput) -> bool {
    out.stderr.contains("not mounted")
        || out.stderr.contains("no mount point specified")
        || out.stderr.contains("not currently mounted")
}

fn classify_mount_failure(stderr: &str) -> MountErrorKind {
    if stderr.contains("busy") || stderr.contains("already mounted") {
        MountErrorKind::Busy
    } else if stderr.contains("wrong fs type")
        || stderr.contains("bad superblock")
        || stderr.contains("unknown filesystem type")
    {
        MountErrorKind::MalformedImage
    } else if stderr.contains("mount point does not exist")
        || stderr.contains("No such file or directory")
    {
        MountErrorKind::MissingMountpoint
    } else {
        MountErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeRunner;
    use tempfile::TempDir;

    #[test]
    fn mount_creates_the_mountpoint_and_invokes_the_tool() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let image = tmp.path().join("dev01.img");
        let mountpoint = tmp.path().join("dev01-mount");

        mount(&runner, &image, &mountpoint).unwrap();

        assert!(mountpoint.is_dir());
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].tool, "mount");
        assert_eq!(
            calls[0].args,
            vec![
                image.display().to_string(),
                mountpoint.display().to_string()
            ]
        );
    }

    #[test]
    fn unmount_is_lazy_and_idempotent() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let image = tmp.path().join("dev01.img");
        let mountpoint = tmp.path().join("dev01-mount");

        mount(&runner, &image, &mountpoint).unwrap();
        unmount(&runner, &mountpoint).unwrap();
        // Second unmount hits the tool's "not mounted" diagnostic.
        unmount(&runner, &mountpoint).unwrap();

        let calls = runner.calls.borrow();
        let umounts: Vec<_> = calls.iter().filter(|c| c.tool == "umount").collect();
        assert_eq!(umounts.len(), 2);
        assert_eq!(umounts[0].args[0], "-l");
    }

    #[test]
    fn mount_failures_are_classified() {
        let cases = [
            ("mount: /mnt: /img is already mounted.", MountErrorKind::Busy),
            (
                "mount: /mnt: wrong fs type, bad option, bad superblock on /dev/loop0.",
                MountErrorKind::MalformedImage,
            ),
            (
                "mount: /mnt: mount point does not exist.",
                MountErrorKind::MissingMountpoint,
            ),
            ("mount: unknown error", MountErrorKind::Other),
        ];
        for (stderr, expected) in cases {
            assert_eq!(classify_mount_failure(stderr), expected, "{stderr}");
        }
    }

    #[test]
    fn failed_mount_surfaces_kind_and_diagnostic() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.fail("mount", "mount: /mnt: /img is already mounted.");

        let err = mount(&runner, &tmp.path().join("a.img"), &tmp.path().join("m")).unwrap_err();
        match err {
            Error::Mount { kind, detail, .. } => {
                assert_eq!(kind, MountErrorKind::Busy);
                assert!(detail.contains("already mounted"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_unmount_is_an_error_when_actually_mounted() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.fail("umount", "umount: /mnt: target is busy.");

        let err = unmount(&runner, &tmp.path().join("m")).unwrap_err();
        assert!(matches!(err, Error::Unmount { .. }));
    }
}

//! Backing image allocation and formatting.
//!
//! An image is a zero-filled regular file of exactly `size_mb` MiB,
//! formatted as ext4. There is no in-place resize: callers that need a
//! different size delete and recreate, which destroys existing contents.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::process::{Invocation, ToolRunner};

/// Journaling filesystem the image is formatted with.
pub const IMAGE_FS: &str = "ext4";

/// Requested megabytes converted to the exact byte size of the image.
pub const fn size_bytes(size_mb: u64) -> u64 {
    size_mb * 1024 * 1024
}

/// Allocate and format a backing image at `path`.
///
/// Fails with [`Error::InsufficientSpace`] when the filesystem holding
/// `path` cannot fit the image, and with [`Error::FormatFailed`] when
/// allocation or formatting errors. A half-created file is removed before
/// returning an error.
pub fn create_image<R: ToolRunner + ?Sized>(runner: &R, path: &Path, size_mb: u64) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let available = fs2::available_space(parent)?;
    check_capacity(parent, size_mb, available)?;

    info!(image = %path.display(), size_mb, "allocating image");
    let dd = Invocation::new("dd")
        .arg("if=/dev/zero")
        .arg(format!("of={}", path.display()))
        .arg("bs=1M")
        .arg(format!("count={size_mb}"));
    let out = runner.run(&dd)?;
    if !out.success() {
        let _ = delete_image(path);
        let detail = out.stderr.trim().to_string();
        if detail.contains("No space left on device") {
            return Err(Error::InsufficientSpace {
                path: parent.to_path_buf(),
                needed_mb: size_mb,
                available,
            });
        }
        return Err(Error::FormatFailed {
            path: path.to_path_buf(),
            detail: format!("allocation failed: {detail}"),
        });
    }

    info!(image = %path.display(), fs = IMAGE_FS, "formatting image");
    let mkfs = Invocation::new(format!("mkfs.{IMAGE_FS}")).arg(path.display().to_string());
    let out = runner.run(&mkfs)?;
    if !out.success() {
        let _ = delete_image(path);
        return Err(Error::FormatFailed {
            path: path.to_path_buf(),
            detail: out.stderr.trim().to_string(),
        });
    }

    Ok(())
}

/// Remove the backing image. A missing file is a no-op, not an error.
pub fn delete_image(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn check_capacity(parent: &Path, size_mb: u64, available: u64) -> Result<()> {
    if size_bytes(size_mb) > available {
        return Err(Error::InsufficientSpace {
            path: parent.to_path_buf(),
            needed_mb: size_mb,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeRunner;
    use crate::process::RunOutput;
    use tempfile::TempDir;

    #[test]
    fn size_is_exactly_mb_times_mib() {
        assert_eq!(size_bytes(500), 524_288_000);
        assert_eq!(size_bytes(1), 1_048_576);
    }

    #[test]
    fn create_allocates_then_formats() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let path = tmp.path().join("dev01.img");

        create_image(&runner, &path, 500).unwrap();

        assert_eq!(path.metadata().unwrap().len(), 524_288_000);
        assert_eq!(runner.tool_sequence(), vec!["dd", "mkfs.ext4"]);
        let calls = runner.calls.borrow();
        assert!(calls[0].args.contains(&"bs=1M".to_string()));
        assert!(calls[0].args.contains(&"count=500".to_string()));
    }

    #[test]
    fn capacity_check_rejects_oversized_images() {
        let err = check_capacity(Path::new("/img"), 500, size_bytes(500) - 1).unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { .. }));
        check_capacity(Path::new("/img"), 500, size_bytes(500)).unwrap();
    }

    #[test]
    fn full_device_surfaces_insufficient_space() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.fail("dd", "dd: error writing: No space left on device");
        let path = tmp.path().join("dev01.img");

        let err = create_image(&runner, &path, 4).unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn format_failure_removes_the_allocation() {
        let tmp = TempDir::new().unwrap();
        let runner = FakeRunner::new();
        runner.force(
            "mkfs.ext4",
            RunOutput {
                code: Some(1),
                stderr: "mkfs.ext4: Device size reported to be zero".to_string(),
                ..RunOutput::default()
            },
        );
        let path = tmp.path().join("dev01.img");

        let err = create_image(&runner, &path, 4).unwrap_err();
        assert!(matches!(err, Error::FormatFailed { .. }));
        assert!(!path.exists(), "failed format must not leave the allocation");
    }

    #[test]
    fn delete_is_a_no_op_for_missing_images() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone.img");
        delete_image(&path).unwrap();

        fs::write(&path, b"x").unwrap();
        delete_image(&path).unwrap();
        assert!(!path.exists());
    }
}

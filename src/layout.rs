//! On-disk layout of the rootbox state directory.
//!
//! One base directory holds everything, partitioned by environment name:
//!
//! ```text
//! <base>/
//!   cfg/<name>.toml       configuration records (source of truth)
//!   img/<name>.img        backing images
//!   mount/<name>-mount/   mountpoints
//!   locks/<name>.lock     per-name advisory locks
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default state directory when the CLI is not told otherwise.
pub const DEFAULT_BASE_DIR: &str = "/var/lib/rootbox";

/// Extension of backing image files.
pub const IMAGE_EXT: &str = "img";

/// Suffix of per-environment mountpoint directories.
pub const MOUNT_SUFFIX: &str = "-mount";

/// Derives every per-environment path from the base directory.
#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base.join("cfg")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.base.join("img")
    }

    pub fn mount_dir(&self) -> PathBuf {
        self.base.join("mount")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.base.join("locks")
    }

    /// Create the base directory tree if any of it is missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.config_dir(),
            self.image_dir(),
            self.mount_dir(),
            self.locks_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir().join(format!("{name}.toml"))
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.image_dir().join(format!("{name}.{IMAGE_EXT}"))
    }

    pub fn mount_path(&self, name: &str) -> PathBuf {
        self.mount_dir().join(format!("{name}{MOUNT_SUFFIX}"))
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir().join(format!("{name}.lock"))
    }
}

/// Environment names become filenames in every subdirectory, so they must
/// be safe single path segments.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| Error::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > 64 {
        return Err(invalid("must be at most 64 characters"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "may only contain ASCII letters, digits, '-', '_', and '.'",
        ));
    }
    Ok(())
}

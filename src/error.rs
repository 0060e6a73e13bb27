//! Typed errors for environment lifecycle operations.
//!
//! Component failures are never swallowed: each component surfaces a variant
//! carrying the paths and tool diagnostics involved, and the orchestrator
//! propagates them after releasing whatever it already acquired.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The filesystem holding the image directory cannot fit the image.
    #[error(
        "not enough space for a {needed_mb} MiB image under '{}' ({available} bytes available)",
        path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        needed_mb: u64,
        available: u64,
    },

    /// Allocating or formatting the backing image failed.
    #[error("creating image '{}' failed: {detail}", path.display())]
    FormatFailed { path: PathBuf, detail: String },

    /// Attaching the image at the mountpoint failed.
    #[error(
        "mounting '{}' at '{}' failed ({kind}): {detail}",
        image.display(),
        mountpoint.display()
    )]
    Mount {
        image: PathBuf,
        mountpoint: PathBuf,
        kind: MountErrorKind,
        detail: String,
    },

    /// Detaching the mountpoint failed (an unmounted path is not an error).
    #[error("unmounting '{}' failed: {detail}", mountpoint.display())]
    Unmount { mountpoint: PathBuf, detail: String },

    /// The distro identifier is not one of the supported variants.
    #[error("unsupported distro '{0}' (expected 'debian' or 'arch')")]
    UnsupportedDistro(String),

    /// Bootstrapping or package installation failed.
    #[error("install failed for environment '{name}' ({kind}): {detail}")]
    Install {
        name: String,
        kind: InstallErrorKind,
        detail: String,
    },

    /// Changing root into the mounted tree failed.
    #[error("chroot into '{}' failed ({kind}): {detail}", mountpoint.display())]
    Chroot {
        mountpoint: PathBuf,
        kind: ChrootErrorKind,
        detail: String,
    },

    /// No configuration record exists for the environment.
    #[error("no configuration record for environment '{0}'")]
    ConfigNotFound(String),

    /// The record exists but is missing required keys or is unreadable.
    #[error("configuration record for '{name}' is corrupt: {detail}")]
    ConfigCorrupt { name: String, detail: String },

    /// The process lacks the privilege mount/chroot require.
    #[error("insufficient privilege: {0}")]
    Permission(String),

    /// mount/chroot semantics are unavailable on this host.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Another operation on the same environment holds the lock.
    #[error("environment '{0}' is locked by another operation in progress")]
    LockHeld(String),

    /// The environment name is not a safe filename segment.
    #[error("invalid environment name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Required host tools are not installed.
    #[error("missing required host tools:\n{}", missing.join("\n"))]
    MissingTools { missing: Vec<String> },

    /// Delete removed only part of the environment's state. The config
    /// record is kept so the cleanup can be retried.
    #[error("delete of '{name}' incomplete; still present:\n{}", remaining.join("\n"))]
    PartialDelete {
        name: String,
        remaining: Vec<String>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a mount attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountErrorKind {
    /// The mountpoint or image is busy or already mounted.
    Busy,
    /// The image has no recognizable filesystem.
    MalformedImage,
    /// The mountpoint path is missing.
    MissingMountpoint,
    Other,
}

impl fmt::Display for MountErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MountErrorKind::Busy => "busy",
            MountErrorKind::MalformedImage => "malformed image",
            MountErrorKind::MissingMountpoint => "missing mountpoint",
            MountErrorKind::Other => "mount error",
        };
        f.write_str(s)
    }
}

/// Why bootstrapping or package installation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallErrorKind {
    /// The bootstrap or package tool itself reported failure.
    Tool,
    /// The failure looks network-bound (mirror or resolver unreachable).
    Network,
    /// The configured bootstrap deadline passed.
    TimedOut,
}

impl fmt::Display for InstallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallErrorKind::Tool => "tool failure",
            InstallErrorKind::Network => "network failure",
            InstallErrorKind::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Why a change-of-root execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChrootErrorKind {
    /// chroot itself was refused (typically missing privilege).
    Privilege,
    /// The command inside the new root could not be launched.
    Exec,
}

impl fmt::Display for ChrootErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChrootErrorKind::Privilege => "privilege",
            ChrootErrorKind::Exec => "exec failure",
        };
        f.write_str(s)
    }
}

//! Disk-image-backed chroot environments.
//!
//! Each environment is a raw ext4 image that can be created, mounted,
//! bootstrapped with a base distribution, entered via chroot, reconfigured,
//! and destroyed. The heavy lifting is delegated to host tools (`dd`,
//! `mkfs.ext4`, `mount`, `umount`, `debootstrap`, `pacstrap`, `chroot`);
//! this crate owns the sequencing, the state, and the cleanup guarantees:
//!
//! - **store** - per-environment TOML records, the source of truth
//! - **image** - zero-filled allocation and ext4 formatting
//! - **mount** - attach/detach with idempotent lazy unmount
//! - **distro** - bootstrap and package-install capabilities per variant
//! - **chroot** - blocking change-of-root execution
//! - **lifecycle** - the orchestrator: create, enter, install, reconfigure
//!
//! ```text
//!  CLI (src/bin/rootbox.rs)
//!      │  one operation per invocation
//!      ▼
//!  Lifecycle ──► per-name advisory lock
//!      │
//!      ├── image    ──► dd, mkfs.ext4
//!      ├── store    ──► cfg/<name>.toml (atomic writes)
//!      ├── mount    ──► mount / umount -l   (paired on every exit path)
//!      ├── distro   ──► debootstrap / pacstrap
//!      └── chroot   ──► chroot <mountpoint> <command>
//! ```
//!
//! Operations run to completion synchronously; the only long waits are the
//! external bootstrap and package tools, which may run for minutes.

pub mod chroot;
pub mod distro;
pub mod error;
pub mod image;
pub mod layout;
pub mod lifecycle;
pub mod lock;
pub mod mount;
pub mod preflight;
pub mod process;
pub mod store;

pub use distro::Distro;
pub use error::{ChrootErrorKind, Error, InstallErrorKind, MountErrorKind, Result};
pub use layout::Layout;
pub use lifecycle::{Lifecycle, LifecycleOptions, Reconfigure};
pub use process::{HostRunner, Invocation, RunOutput, ToolRunner};
pub use store::{ConfigStore, Environment};

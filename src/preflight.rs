//! Host checks before any lifecycle operation.
//!
//! Mount and chroot need root on a Linux host, and every operation shells
//! out to a handful of tools. Validating all of that up front turns cryptic
//! mid-operation failures into one actionable message.

use crate::distro::Distro;
use crate::error::{Error, Result};

/// Host tools every lifecycle operation may need, as `(command, package)`.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("dd", "coreutils"),
    ("mkfs.ext4", "e2fsprogs"),
    ("mount", "util-linux"),
    ("umount", "util-linux"),
    ("chroot", "coreutils"),
];

/// Check if a command can be found in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available; the error lists every missing
/// tool with the package providing it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {tool} (install: {package})"))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingTools { missing })
    }
}

/// mount/chroot semantics require a Linux host.
pub fn check_platform() -> Result<()> {
    if cfg!(target_os = "linux") {
        Ok(())
    } else {
        Err(Error::UnsupportedPlatform(
            "rootbox requires Linux mount and chroot semantics".to_string(),
        ))
    }
}

/// mount and chroot require an effective UID of 0.
pub fn check_privilege() -> Result<()> {
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        Ok(())
    } else {
        Err(Error::Permission(format!(
            "mount and chroot require root (running as uid {euid})"
        )))
    }
}

/// Full preflight for a state-mutating operation. When `distro` is given,
/// its bootstrap tool is checked as well.
pub fn check_host(distro: Option<Distro>) -> Result<()> {
    check_platform()?;
    check_privilege()?;

    let mut tools: Vec<(&str, &str)> = REQUIRED_TOOLS.to_vec();
    if let Some(d) = distro {
        tools.push(d.bootstrap_tool());
    }
    check_required_tools(&tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_commands_are_found() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn required_tools_check_passes_for_coreutils() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        check_required_tools(tools).unwrap();
    }

    #[test]
    fn missing_tools_are_listed_with_their_packages() {
        let tools = &[("nonexistent_command_xyz", "fake-package")];
        match check_required_tools(tools).unwrap_err() {
            Error::MissingTools { missing } => {
                assert_eq!(missing.len(), 1);
                assert!(missing[0].contains("fake-package"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn platform_check_passes_on_linux() {
        #[cfg(target_os = "linux")]
        check_platform().unwrap();
    }

    #[test]
    fn privilege_check_matches_effective_uid() {
        let is_root = unsafe { libc::geteuid() } == 0;
        assert_eq!(check_privilege().is_ok(), is_root);
    }
}

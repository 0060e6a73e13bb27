//! Supported guest distributions.
//!
//! Each variant bundles the two capabilities the lifecycle needs: how to
//! bootstrap a base system into an empty tree, and which commands install
//! packages inside the resulting chroot. Adding a distribution means adding
//! a variant here; the orchestrator never branches on distro identifiers.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, InstallErrorKind};
use crate::process::Invocation;

/// Release installed by debootstrap.
pub const DEBIAN_RELEASE: &str = "bookworm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    Debian,
    Arch,
}

impl Distro {
    pub const ALL: &'static [Distro] = &[Distro::Debian, Distro::Arch];

    pub fn id(&self) -> &'static str {
        match self {
            Distro::Debian => "debian",
            Distro::Arch => "arch",
        }
    }

    /// The other supported distribution, used by the switch-distro
    /// reconfigure action.
    pub fn alternate(&self) -> Distro {
        match self {
            Distro::Debian => Distro::Arch,
            Distro::Arch => Distro::Debian,
        }
    }

    /// Bootstrap tool as a `(command, package)` pair for preflight checks.
    pub fn bootstrap_tool(&self) -> (&'static str, &'static str) {
        match self {
            Distro::Debian => ("debootstrap", "debootstrap"),
            Distro::Arch => ("pacstrap", "arch-install-scripts"),
        }
    }

    /// Invocation that populates `mountpoint` with a minimal base system.
    pub fn bootstrap_invocation(&self, mountpoint: &Path) -> Invocation {
        match self {
            Distro::Debian => Invocation::new("debootstrap")
                .arg(DEBIAN_RELEASE)
                .arg(mountpoint.display().to_string()),
            // -K initializes a fresh pacman keyring inside the target.
            Distro::Arch => Invocation::new("pacstrap")
                .arg("-K")
                .arg(mountpoint.display().to_string()),
        }
    }

    /// Command sequence run inside the chroot to install `packages`.
    ///
    /// Debian refreshes the index and installs in two steps; Arch does both
    /// in one `pacman -Sy`. `--noconfirm`/`-y` keep the guest tool from
    /// prompting, since user intent was already collected by the front end.
    pub fn package_install_commands(&self, packages: &[String]) -> Vec<Vec<String>> {
        let pkgs = packages.iter().cloned();
        match self {
            Distro::Debian => {
                let mut install: Vec<String> = vec![
                    "apt-get".to_string(),
                    "install".to_string(),
                    "-y".to_string(),
                ];
                install.extend(pkgs);
                vec![
                    vec!["apt-get".to_string(), "update".to_string()],
                    install,
                ]
            }
            Distro::Arch => {
                let mut sync: Vec<String> = vec![
                    "pacman".to_string(),
                    "-Sy".to_string(),
                    "--noconfirm".to_string(),
                ];
                sync.extend(pkgs);
                vec![sync]
            }
        }
    }
}

impl FromStr for Distro {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debian" => Ok(Distro::Debian),
            "arch" => Ok(Distro::Arch),
            other => Err(Error::UnsupportedDistro(other.to_string())),
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Classify a failed bootstrap or package run from its diagnostics.
///
/// Streamed runs surface no stderr, so an empty diagnostic stays a plain
/// tool failure.
pub(crate) fn classify_install_failure(stderr: &str) -> InstallErrorKind {
    const NETWORK_MARKERS: &[&str] = &[
        "Temporary failure resolving",
        "Failed to fetch",
        "failed retrieving file",
        "Connection timed out",
        "Network is unreachable",
        "Could not resolve",
    ];

    if NETWORK_MARKERS.iter().any(|m| stderr.contains(m)) {
        InstallErrorKind::Network
    } else {
        InstallErrorKind::Tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_known_identifiers() {
        assert_eq!("debian".parse::<Distro>().unwrap(), Distro::Debian);
        assert_eq!("Arch".parse::<Distro>().unwrap(), Distro::Arch);
    }

    #[test]
    fn rejects_unknown_identifiers() {
        for bad in ["gentoo", "", "debian bookworm"] {
            assert!(matches!(
                bad.parse::<Distro>(),
                Err(Error::UnsupportedDistro(_))
            ));
        }
    }

    #[test]
    fn alternate_flips_between_the_two_families() {
        assert_eq!(Distro::Debian.alternate(), Distro::Arch);
        assert_eq!(Distro::Arch.alternate(), Distro::Debian);
    }

    #[test]
    fn debian_bootstrap_pins_the_release() {
        let inv = Distro::Debian.bootstrap_invocation(Path::new("/mnt/dev01-mount"));
        assert_eq!(inv.tool, "debootstrap");
        assert_eq!(inv.args, vec![DEBIAN_RELEASE, "/mnt/dev01-mount"]);
    }

    #[test]
    fn arch_bootstrap_initializes_the_keyring() {
        let inv = Distro::Arch.bootstrap_invocation(Path::new("/mnt/dev01-mount"));
        assert_eq!(inv.tool, "pacstrap");
        assert_eq!(inv.args, vec!["-K", "/mnt/dev01-mount"]);
    }

    #[test]
    fn debian_installs_in_two_steps() {
        let cmds = Distro::Debian.package_install_commands(&strings(&["curl", "git"]));
        assert_eq!(
            cmds,
            vec![
                strings(&["apt-get", "update"]),
                strings(&["apt-get", "install", "-y", "curl", "git"]),
            ]
        );
    }

    #[test]
    fn arch_installs_in_one_sync() {
        let cmds = Distro::Arch.package_install_commands(&strings(&["curl"]));
        assert_eq!(cmds, vec![strings(&["pacman", "-Sy", "--noconfirm", "curl"])]);
    }

    #[test]
    fn network_diagnostics_are_classified() {
        assert_eq!(
            classify_install_failure("E: Failed to fetch http://deb.debian.org/..."),
            InstallErrorKind::Network
        );
        assert_eq!(
            classify_install_failure("E: broken packages"),
            InstallErrorKind::Tool
        );
        assert_eq!(classify_install_failure(""), InstallErrorKind::Tool);
    }
}

//! Environment lifecycle orchestration.
//!
//! Composes the config store, image manager, mount manager, distro
//! bootstrapper, and chroot executor into the user-facing operations:
//! create, enter, install packages, reconfigure, list. Two contracts hold
//! on every path through this module:
//!
//! - every successful mount is paired with exactly one unmount before the
//!   operation returns, error paths included;
//! - every state-mutating operation holds the environment's advisory lock
//!   from before its first side effect until it returns.

use std::fs;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::chroot;
use crate::distro::{classify_install_failure, Distro};
use crate::error::{Error, InstallErrorKind, Result};
use crate::image;
use crate::layout::{validate_name, Layout};
use crate::lock::EnvLock;
use crate::mount;
use crate::process::{HostRunner, ToolRunner};
use crate::store::{ConfigStore, Environment};

/// Knobs for the network-bound bootstrap step.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Kill a bootstrap that runs longer than this; `None` waits forever.
    pub bootstrap_timeout: Option<Duration>,
    /// Additional bootstrap attempts after the first failure.
    pub bootstrap_retries: u32,
    /// Delay before the first retry; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            bootstrap_timeout: None,
            bootstrap_retries: 2,
            retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Reconfigure actions. Resize and switch-distro are destructive: the old
/// image is discarded and rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigure {
    Resize { size_mb: u64 },
    SwitchDistro { size_mb: u64 },
    Delete,
}

/// The orchestrator. Generic over the tool runner so sequencing can be
/// tested without real mounts.
#[derive(Debug)]
pub struct Lifecycle<R = HostRunner> {
    layout: Layout,
    store: ConfigStore,
    runner: R,
    opts: LifecycleOptions,
}

impl<R: ToolRunner> Lifecycle<R> {
    pub fn new(layout: Layout, runner: R, opts: LifecycleOptions) -> Result<Self> {
        layout.ensure()?;
        let store = ConfigStore::open(layout.config_dir())?;
        Ok(Self {
            layout,
            store,
            runner,
            opts,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Create an environment: allocate and format the image, persist the
    /// record, bootstrap the base system, and open an initial setup shell.
    ///
    /// The record is persisted as soon as the image exists, so an
    /// environment whose bootstrap failed is still discoverable and can be
    /// deleted or rebuilt.
    pub fn create(&self, name: &str, distro: Distro, size_mb: u64) -> Result<Environment> {
        validate_name(name)?;
        let _lock = self.lock(name)?;
        self.create_locked(name, distro, size_mb)
    }

    /// Mount an environment and open an interactive shell inside it.
    /// Returns the shell's exit code; the unmount runs regardless of it.
    pub fn enter(&self, name: &str) -> Result<i32> {
        validate_name(name)?;
        let _lock = self.lock(name)?;
        let env = self.store.load(name)?;

        info!(name, "entering environment");
        self.with_mounted(&env, |lc| chroot::run_shell(&lc.runner, &env.mountpoint))
    }

    /// Install packages with the guest distribution's own package tool,
    /// inside the mounted tree.
    pub fn install_packages(&self, name: &str, packages: &[String]) -> Result<()> {
        validate_name(name)?;
        if packages.is_empty() {
            return Ok(());
        }
        let _lock = self.lock(name)?;
        let env = self.store.load(name)?;

        info!(name, packages = %packages.join(" "), "installing packages");
        self.with_mounted(&env, |lc| {
            for command in env.distro.package_install_commands(packages) {
                let code = chroot::run(&lc.runner, &env.mountpoint, &command, None)?;
                if code != 0 {
                    return Err(Error::Install {
                        name: env.name.clone(),
                        kind: InstallErrorKind::Tool,
                        detail: format!("'{}' exited with status {code}", command.join(" ")),
                    });
                }
            }
            Ok(())
        })
    }

    /// Resize, switch distro, or delete. Returns the rebuilt environment
    /// for the first two, `None` after a delete.
    pub fn reconfigure(&self, name: &str, op: Reconfigure) -> Result<Option<Environment>> {
        validate_name(name)?;
        let _lock = self.lock(name)?;

        match op {
            Reconfigure::Resize { size_mb } => {
                let env = self.store.load(name)?;
                info!(name, size_mb, "resizing (destructive rebuild)");
                image::delete_image(&env.image)?;
                self.create_locked(name, env.distro, size_mb).map(Some)
            }
            Reconfigure::SwitchDistro { size_mb } => {
                let env = self.store.load(name)?;
                let next = env.distro.alternate();
                info!(name, from = %env.distro, to = %next, "switching distro (destructive rebuild)");
                image::delete_image(&env.image)?;
                self.store.delete(name)?;
                self.create_locked(name, next, size_mb).map(Some)
            }
            Reconfigure::Delete => {
                self.delete_locked(name)?;
                Ok(None)
            }
        }
    }

    /// Names of all known environments.
    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Load the record for display purposes.
    pub fn load(&self, name: &str) -> Result<Environment> {
        validate_name(name)?;
        self.store.load(name)
    }

    fn lock(&self, name: &str) -> Result<EnvLock> {
        EnvLock::acquire(&self.layout.lock_path(name), name)
    }

    fn create_locked(&self, name: &str, distro: Distro, size_mb: u64) -> Result<Environment> {
        let env = Environment {
            name: name.to_string(),
            distro,
            image: self.layout.image_path(name),
            mountpoint: self.layout.mount_path(name),
            size_mb,
        };

        info!(name, distro = %distro, size_mb, "creating environment");
        image::create_image(&self.runner, &env.image, size_mb)?;
        // From here the environment is discoverable even if bootstrap fails.
        self.store.save(&env)?;
        fs::create_dir_all(&env.mountpoint)?;

        self.with_mounted(&env, |lc| {
            lc.bootstrap(&env)?;
            info!(name, "base system installed; opening setup shell");
            let code = chroot::run_shell(&lc.runner, &env.mountpoint)?;
            if code != 0 {
                warn!(name, code, "setup shell exited non-zero");
            }
            Ok(())
        })?;

        Ok(env)
    }

    /// Run the distro's bootstrap tool against the mounted tree, with a
    /// bounded number of retries and doubling backoff. A timeout is not
    /// retried: a wedged mirror should surface, not burn more time.
    fn bootstrap(&self, env: &Environment) -> Result<()> {
        let inv = env.distro.bootstrap_invocation(&env.mountpoint);
        let mut backoff = self.opts.retry_backoff;
        let attempts = self.opts.bootstrap_retries + 1;

        for attempt in 1..=attempts {
            info!(name = %env.name, attempt, cmd = %inv.command_line(), "bootstrapping");
            let out = self
                .runner
                .run_streamed(&inv, self.opts.bootstrap_timeout)
                .map_err(|e| Error::Install {
                    name: env.name.clone(),
                    kind: InstallErrorKind::Tool,
                    detail: format!("launching '{}': {e}", inv.tool),
                })?;

            if out.success() {
                return Ok(());
            }
            if out.timed_out {
                return Err(Error::Install {
                    name: env.name.clone(),
                    kind: InstallErrorKind::TimedOut,
                    detail: format!("'{}' exceeded the bootstrap deadline", inv.command_line()),
                });
            }
            if attempt == attempts {
                let detail = if out.stderr.trim().is_empty() {
                    format!(
                        "'{}' failed after {attempts} attempt(s) (exit {:?})",
                        inv.command_line(),
                        out.code
                    )
                } else {
                    out.stderr.trim().to_string()
                };
                return Err(Error::Install {
                    name: env.name.clone(),
                    kind: classify_install_failure(&out.stderr),
                    detail,
                });
            }

            warn!(
                name = %env.name,
                attempt,
                backoff_secs = backoff.as_secs_f64(),
                "bootstrap failed, retrying"
            );
            thread::sleep(backoff);
            backoff *= 2;
        }
        unreachable!("bootstrap loop returns on success or final attempt")
    }

    /// Mount the environment, run `body`, and always unmount before
    /// returning. A failure in `body` wins over a failure in the unmount.
    fn with_mounted<T>(
        &self,
        env: &Environment,
        body: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T> {
        mount::mount(&self.runner, &env.image, &env.mountpoint)?;
        let result = body(self);
        let released = mount::unmount(&self.runner, &env.mountpoint);

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(unmount_err)) => Err(unmount_err),
            (Err(op_err), Ok(())) => Err(op_err),
            (Err(op_err), Err(unmount_err)) => {
                warn!(name = %env.name, %unmount_err, "unmount after failure also failed");
                Err(op_err)
            }
        }
    }

    /// Remove mount directory, image, and record together. When part of
    /// the removal fails, the record is kept and the error names what is
    /// still present, so the cleanup can be retried.
    fn delete_locked(&self, name: &str) -> Result<()> {
        let env = self.store.load(name)?;
        info!(name, "deleting environment");

        // The environment may still be mounted from an interrupted
        // operation; detach before removing the directory.
        if let Err(e) = mount::unmount(&self.runner, &env.mountpoint) {
            warn!(name, error = %e, "pre-delete unmount failed");
        }

        let mut remaining = Vec::new();
        if env.mountpoint.exists() {
            if let Err(e) = fs::remove_dir_all(&env.mountpoint) {
                remaining.push(format!(
                    "  mount directory '{}': {e}",
                    env.mountpoint.display()
                ));
            }
        }
        if let Err(e) = image::delete_image(&env.image) {
            remaining.push(format!("  image '{}': {e}", env.image.display()));
        }

        if !remaining.is_empty() {
            remaining.push("  config record (kept so the delete can be retried)".to_string());
            return Err(Error::PartialDelete {
                name: name.to_string(),
                remaining,
            });
        }

        self.store.delete(name)?;
        Ok(())
    }
}

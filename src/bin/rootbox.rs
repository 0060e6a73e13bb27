//! rootbox CLI: one lifecycle operation per invocation.
//!
//! This front end only collects intent and renders results; lifecycle
//! correctness (locking, mount pairing, rollback) lives in the library.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rootbox::layout::DEFAULT_BASE_DIR;
use rootbox::{preflight, Distro, HostRunner, Layout, Lifecycle, LifecycleOptions, Reconfigure};

#[derive(Parser)]
#[command(
    name = "rootbox",
    version,
    about = "Manage disk-image-backed chroot environments"
)]
struct Cli {
    /// State directory holding configs, images, and mountpoints.
    #[arg(long, global = true, default_value = DEFAULT_BASE_DIR)]
    base_dir: PathBuf,

    /// Abort a bootstrap that runs longer than this many seconds.
    #[arg(long, global = true)]
    bootstrap_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an environment and bootstrap a base system into it.
    Create {
        name: String,
        /// Base distribution: debian or arch.
        distro: String,
        /// Image size in megabytes.
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        size_mb: u64,
    },
    /// Mount an environment and open a shell inside it.
    Enter { name: String },
    /// Install packages with the guest's own package manager.
    Install {
        name: String,
        #[arg(required = true, num_args = 1..)]
        packages: Vec<String>,
    },
    /// Resize, switch distro, or delete an environment. Resize and
    /// switch-distro discard the existing image contents.
    Reconfigure {
        name: String,
        #[command(subcommand)]
        action: ReconfigureAction,
    },
    /// List known environments.
    List,
}

#[derive(Subcommand)]
enum ReconfigureAction {
    /// Rebuild the image at a new size (existing contents are lost).
    Resize {
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        size_mb: u64,
    },
    /// Rebuild with the other supported distro (existing contents are lost).
    SwitchDistro {
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        size_mb: u64,
    },
    /// Remove image, mountpoint, and config record together.
    Delete,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rootbox=info")),
        )
        .init();

    let cli = Cli::parse();

    let opts = LifecycleOptions {
        bootstrap_timeout: cli.bootstrap_timeout.map(std::time::Duration::from_secs),
        ..LifecycleOptions::default()
    };
    let lifecycle = Lifecycle::new(Layout::new(&cli.base_dir), HostRunner, opts)
        .with_context(|| format!("opening state directory '{}'", cli.base_dir.display()))?;

    match cli.command {
        Command::Create {
            name,
            distro,
            size_mb,
        } => {
            let distro: Distro = distro.parse()?;
            preflight::check_host(Some(distro))?;
            let env = lifecycle
                .create(&name, distro, size_mb)
                .with_context(|| format!("creating environment '{name}'"))?;
            println!(
                "Created '{}' ({} MB, {}) at {}",
                env.name,
                env.size_mb,
                env.distro,
                env.image.display()
            );
        }
        Command::Enter { name } => {
            preflight::check_host(None)?;
            let code = lifecycle
                .enter(&name)
                .with_context(|| format!("entering environment '{name}'"))?;
            if code != 0 {
                println!("Shell exited with status {code}");
            }
        }
        Command::Install { name, packages } => {
            preflight::check_host(None)?;
            lifecycle
                .install_packages(&name, &packages)
                .with_context(|| {
                    format!(
                        "installing {} in environment '{name}'",
                        packages.join(" ")
                    )
                })?;
            println!("Installed {} in '{name}'", packages.join(" "));
        }
        Command::Reconfigure { name, action } => {
            let op = match action {
                ReconfigureAction::Resize { size_mb } => Reconfigure::Resize { size_mb },
                ReconfigureAction::SwitchDistro { size_mb } => {
                    Reconfigure::SwitchDistro { size_mb }
                }
                ReconfigureAction::Delete => Reconfigure::Delete,
            };
            preflight::check_host(None)?;
            let rebuilt = lifecycle
                .reconfigure(&name, op)
                .with_context(|| format!("reconfiguring environment '{name}'"))?;
            match rebuilt {
                Some(env) => println!(
                    "Rebuilt '{}' ({} MB, {})",
                    env.name, env.size_mb, env.distro
                ),
                None => println!("Deleted '{name}'"),
            }
        }
        Command::List => {
            let names = lifecycle.list().context("listing environments")?;
            if names.is_empty() {
                println!("No environments.");
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
    }

    Ok(())
}

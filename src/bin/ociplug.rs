//! ociplug - OCI Plugin Manager CLI
//!
//! Installs, updates and removes executable plugins published as OCI images.
//!
//! ## Usage
//!
//! ```sh
//! ociplug --repository registry.example.com/plugins install demo
//! ociplug install demo --version 1.2.0
//! ociplug install demo --major 1 --resolve-conflicts
//! ociplug update --all
//! ociplug remove demo
//! ociplug list
//! ociplug versions demo
//! ociplug contract demo [--installed]
//! ```
//!
//! ## Environment
//!
//! Every global flag has an environment fallback: `OCIPLUG_ROOT`,
//! `OCIPLUG_REPOSITORY`, `OCIPLUG_USERNAME`, `OCIPLUG_PASSWORD`,
//! `OCIPLUG_INSECURE`. Log filtering follows `RUST_LOG`.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ociplug::{InstallOptions, Installer, ManagerConfig, RegistryConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "ociplug", version, about = "Manage plugins published as OCI images")]
struct Cli {
    /// Root directory holding plugins/ and cache/
    #[arg(long, global = true, env = "OCIPLUG_ROOT")]
    root: Option<PathBuf>,

    /// Registry repository plugin images live under
    #[arg(long, global = true, env = "OCIPLUG_REPOSITORY", default_value = "")]
    repository: String,

    /// Registry username
    #[arg(long, global = true, env = "OCIPLUG_USERNAME")]
    username: Option<String>,

    /// Registry password
    #[arg(long, global = true, env = "OCIPLUG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Talk to the registry over plain HTTP
    #[arg(long, global = true, env = "OCIPLUG_INSECURE")]
    insecure: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List installed plugins
    #[command(visible_alias = "ls")]
    List,

    /// List versions published in the registry
    Versions {
        /// Plugin name
        name: String,
    },

    /// Print a plugin contract
    Contract {
        /// Plugin name
        name: String,

        /// Registry version to read (defaults to latest)
        #[arg(long, conflicts_with = "installed")]
        version: Option<String>,

        /// Read the cached contract of the installed plugin
        #[arg(long)]
        installed: bool,
    },

    /// Install a plugin
    #[command(visible_alias = "add")]
    Install {
        /// Plugin name
        name: String,

        /// Exact version (defaults to latest)
        #[arg(long)]
        version: Option<String>,

        /// Pick the latest version within this major version
        #[arg(long)]
        major: Option<u64>,

        /// Install missing or mismatched plugin dependencies
        #[arg(long)]
        resolve_conflicts: bool,
    },

    /// Update a plugin, or every installed plugin
    Update {
        /// Plugin name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Update every installed plugin
        #[arg(long)]
        all: bool,
    },

    /// Remove a plugin, or every installed plugin
    #[command(visible_aliases = ["rm", "uninstall"])]
    Remove {
        /// Plugin name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,

        /// Remove every installed plugin
        #[arg(long)]
        all: bool,
    },
}

impl Cli {
    fn config(&self) -> ManagerConfig {
        let mut registry = RegistryConfig::new(self.repository.clone());
        registry.insecure = self.insecure;
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            registry = registry.with_auth(user.clone(), pass.clone());
        }

        let root = self.root.clone().unwrap_or_else(ManagerConfig::default_root);
        ManagerConfig::new(root).with_registry(registry)
    }

    fn needs_registry(&self) -> bool {
        match &self.command {
            Command::List | Command::Remove { .. } => false,
            Command::Contract { installed, .. } => !installed,
            _ => true,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.needs_registry() && cli.repository.is_empty() {
        bail!("no registry repository configured (use --repository or OCIPLUG_REPOSITORY)");
    }

    let config = cli.config();
    tracing::debug!("Using {:?}", config);
    let installer = Installer::from_config(&config);

    match cli.command {
        Command::List => cmd_list(&installer),
        Command::Versions { name } => {
            for version in installer.available_versions(&name).await? {
                println!("{}", version);
            }
            Ok(())
        }
        Command::Contract {
            name,
            version,
            installed,
        } => cmd_contract(&installer, &name, version.as_deref(), installed).await,
        Command::Install {
            name,
            version,
            major,
            resolve_conflicts,
        } => {
            let opts = InstallOptions {
                version,
                use_major: major,
                resolve_conflicts,
            };
            let installed = installer.install_plugin(&name, &opts).await?;
            println!("installed {} {}", installed.name, installed.version);
            Ok(())
        }
        Command::Update { all: true, .. } => {
            for updated in installer.update_all().await? {
                println!("updated {} {}", updated.name, updated.version);
            }
            Ok(())
        }
        Command::Update { name, .. } => {
            let name = name.context("plugin name required")?;
            let updated = installer.update(&name).await?;
            println!("updated {} {}", updated.name, updated.version);
            Ok(())
        }
        Command::Remove { all: true, .. } => {
            for removed in installer.remove_all()? {
                println!("removed {}", removed);
            }
            Ok(())
        }
        Command::Remove { name, .. } => {
            let name = name.context("plugin name required")?;
            installer.remove(&name)?;
            println!("removed {}", name);
            Ok(())
        }
    }
}

fn cmd_list(installer: &Installer) -> anyhow::Result<()> {
    let plugins = installer.list_installed()?;
    if plugins.is_empty() {
        println!("no plugins installed");
        return Ok(());
    }

    println!("{:<24} {:<12} {:<10} CURRENT", "NAME", "VERSION", "MAJORS");
    for plugin in plugins {
        let version = plugin
            .contract
            .as_ref()
            .map(|c| c.version.clone())
            .unwrap_or_else(|| "-".to_string());
        let majors = plugin
            .majors
            .iter()
            .map(|m| format!("v{}", m))
            .collect::<Vec<_>>()
            .join(",");
        let current = plugin
            .current
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<24} {:<12} {:<10} {}", plugin.name, version, majors, current);
    }
    Ok(())
}

async fn cmd_contract(
    installer: &Installer,
    name: &str,
    version: Option<&str>,
    installed: bool,
) -> anyhow::Result<()> {
    let contract = if installed {
        installer
            .installed_contract(name)?
            .with_context(|| format!("plugin '{}' is not installed", name))?
    } else {
        installer.registry_contract(name, version).await?
    };
    println!("{}", contract.to_json_pretty()?);
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

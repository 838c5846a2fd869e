//! plugbay - inspect plugin manifests and registry ordering.
//!
//! Loads the configured manifests into a registry and shows what a container
//! would see: which plugins provide each capability, in which order.

#![allow(clippy::single_match_else)]

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plugbay::core::{Container, ContainerConfig};
use plugbay::plugin::{Capability, PluginDescriptor, PluginManifest, Priority};

/// Plugin registry inspector
#[derive(Parser)]
#[command(name = "plugbay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to .plugbay.toml or the user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Extra manifest sources on top of the configured ones.
#[derive(clap::Args, Default)]
struct Sources {
    /// Manifest file to load
    #[arg(short, long = "manifest")]
    manifests: Vec<PathBuf>,

    /// Directory searched recursively for plugins.toml
    #[arg(short = 'd', long = "dir")]
    dirs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every plugin, grouped by capability
    List {
        #[command(flatten)]
        sources: Sources,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the order in which plugins of one capability are tried
    Query {
        /// Capability to query
        capability: String,

        #[command(flatten)]
        sources: Sources,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Parse and validate manifest files or directories
    Validate {
        /// Manifests or directories to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::List { sources, format } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_list(config, sources, &format)?;
        }
        Commands::Query { capability, sources, format } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_query(config, sources, &capability, &format)?;
        }
        Commands::Validate { paths } => {
            cmd_validate(&paths)?;
        }
        Commands::Config { path } => {
            cmd_config(cli.config.as_deref(), path)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<ContainerConfig> {
    match explicit {
        Some(path) => {
            let mut config = ContainerConfig::load_from_file(path)?;
            config.apply_env_overrides()?;
            Ok(config)
        }
        None => ContainerConfig::load(),
    }
}

/// Build a container holding only descriptors; nothing is resolved.
fn open(mut config: ContainerConfig, sources: Sources) -> Result<Container> {
    config.eager.clear();
    config.plugins.manifests.extend(sources.manifests);
    config.plugins.manifest_dirs.extend(sources.dirs);
    Ok(Container::from_config(config)?)
}

/// List every plugin grouped by capability.
fn cmd_list(config: ContainerConfig, sources: Sources, format: &str) -> Result<()> {
    let container = open(config, sources)?;
    let registry = container.registry();

    let mut groups: BTreeMap<Capability, Vec<PluginDescriptor>> = BTreeMap::new();
    for capability in registry.capabilities() {
        let own: Vec<_> = registry
            .query(&capability)
            .into_iter()
            .filter(|d| d.capability == capability)
            .map(|d| d.as_ref().clone())
            .collect();
        if !own.is_empty() {
            groups.insert(capability, own);
        }
    }

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&groups)?;
            println!("{json}");
        }
        _ => {
            let mut total = 0;
            for (capability, descriptors) in &groups {
                println!("{capability}");
                for d in descriptors {
                    println!("  {:>12}  {}  ({})", d.priority.to_string(), d.implementation, d.display_name());
                }
                total += descriptors.len();
            }
            println!("\nTotal: {total} plugins in {} capabilities", groups.len());
        }
    }

    Ok(())
}

/// Show the query order for a capability.
fn cmd_query(config: ContainerConfig, sources: Sources, capability: &str, format: &str) -> Result<()> {
    let container = open(config, sources)?;
    let descriptors = container.registry().query(&Capability::from(capability));

    match format {
        "json" => {
            let list: Vec<&PluginDescriptor> = descriptors.iter().map(AsRef::as_ref).collect();
            let json = serde_json::to_string_pretty(&list)?;
            println!("{json}");
        }
        _ => {
            if descriptors.is_empty() {
                println!("No plugins provide '{capability}'");
                return Ok(());
            }
            let mut previous: Option<Priority> = None;
            for (i, d) in descriptors.iter().enumerate() {
                if previous.is_some_and(|p| Priority::warrants_separator(p, d.priority)) {
                    println!("  ----");
                }
                println!("{:>3}. {d}", i + 1);
                previous = Some(d.priority);
            }
        }
    }

    Ok(())
}

/// Validate manifests, reporting every failure before exiting.
fn cmd_validate(paths: &[PathBuf]) -> Result<()> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(PluginManifest::discover(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let mut failures = 0;
    for file in &files {
        match PluginManifest::from_file(file).and_then(|m| m.validate().map(|()| m)) {
            Ok(manifest) => {
                println!("ok    {} ({} plugins)", file.display(), manifest.plugins.len());
            }
            Err(e) => {
                println!("error {}: {e}", file.display());
                failures += 1;
            }
        }
    }

    if files.is_empty() {
        anyhow::bail!("No manifests found");
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} manifests are invalid", files.len());
    }
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "plugbay", &mut io::stdout());
}

/// Show configuration.
fn cmd_config(explicit: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        let path = explicit.map(Path::to_path_buf).or_else(ContainerConfig::locate);
        match path {
            Some(path) => println!("{}", path.display()),
            None => {
                if let Some(dir) = ContainerConfig::config_dir() {
                    println!("{}", dir.join("config.toml").display());
                }
            }
        }
        return Ok(());
    }

    let config = load_config(explicit)?;
    println!("{}", config.to_toml()?);

    Ok(())
}

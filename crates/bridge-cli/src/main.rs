use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{bail, Context, Result};
use bridge_core::{
    config::Config,
    reference::{self, ReferenceModule},
    registry::CapabilityRegistry,
    server::Server,
    PluginHost,
};
use bridge_plugin_sdk::{PluginManifest, PluginModule};
use clap::{Parser, Subcommand};
use regex::Regex;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

const EXAMPLE_CONFIG: &str = include_str!("../../../config/bridge.example.toml");

#[derive(Parser, Debug)]
#[command(
    name = "bridge",
    author,
    version,
    about = "Headless host exposing a data source plugin over gRPC and HTTP"
)]
struct Cli {
    /// Sets the log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the configured plugin and serve it until Ctrl+C.
    Run {
        /// Configuration file; built-in defaults apply when omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Interact with configuration files (validate, sample output).
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Inspect built-in plugin modules.
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
    /// Dump the resolved configuration as JSON.
    Diag {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validates the provided configuration file.
    Validate {
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },
    /// Prints the bundled example configuration.
    Example,
}

#[derive(Subcommand, Debug)]
enum PluginCommands {
    /// Shows a module's manifest and how each declared dependency resolves.
    Inspect {
        #[arg(long, value_name = "NAME", default_value = reference::MODULE_ID)]
        module: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    match cli.command {
        Commands::Run { config } => handle_run(config.as_deref()).await,
        Commands::Config { command } => handle_config(command),
        Commands::Plugins { command } => handle_plugins(command),
        Commands::Diag { config } => handle_diag(config.as_deref()),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().ok();
    Ok(())
}

async fn handle_run(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    config.validate()?;

    let host = PluginHost::default();
    let module = builtin_module(&config.plugin.module)?;
    host.loader()
        .load(module)
        .with_context(|| format!("failed to load plugin module `{}`", config.plugin.module))?;

    let dispatcher = host.dispatcher();
    match dispatcher.check_health().await {
        Ok(health) if health.is_success() => {
            tracing::info!(message = %health.message, "plugin self-test passed")
        }
        Ok(health) => tracing::warn!(message = %health.message, "plugin self-test failed"),
        Err(err) => tracing::warn!(error = %err, "plugin self-test errored"),
    }

    Server::new(config, dispatcher)?.run().await
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { config } => {
            let cfg = load_config(&config)?;
            cfg.validate()?;
            builtin_module(&cfg.plugin.module)?;
            println!("configuration OK: {}", config.display());
        }
        ConfigCommands::Example => {
            println!("{EXAMPLE_CONFIG}");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct DependencyReport {
    name: String,
    resolves_to: &'static str,
}

#[derive(Debug, Serialize)]
struct ModuleReport {
    manifest: PluginManifest,
    dependencies: Vec<DependencyReport>,
}

fn handle_plugins(command: PluginCommands) -> Result<()> {
    match command {
        PluginCommands::Inspect { module } => {
            let report = inspect_module(&module, &CapabilityRegistry::default())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn inspect_module(name: &str, registry: &CapabilityRegistry) -> Result<ModuleReport> {
    let manifest = builtin_module(name)?.manifest();
    let dependencies = registry
        .resolve_all(manifest.dependencies.as_slice())
        .iter()
        .map(|(name, capability)| DependencyReport {
            name: name.to_owned(),
            resolves_to: capability.kind(),
        })
        .collect();
    Ok(ModuleReport {
        manifest,
        dependencies,
    })
}

fn handle_diag(path: Option<&Path>) -> Result<()> {
    let cfg = resolve_config(path)?;
    let json = serde_json::to_string_pretty(&cfg)?;
    println!("{json}");
    Ok(())
}

fn builtin_module(name: &str) -> Result<Box<dyn PluginModule>> {
    match name {
        reference::MODULE_ID => Ok(Box::new(ReferenceModule)),
        other => bail!(
            "unknown plugin module `{other}` (built-in modules: {})",
            reference::MODULE_ID
        ),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_config(raw: &str) -> Result<Config> {
    let expanded = interpolate_env(raw);
    Ok(toml::from_str::<Config>(&expanded)?)
}

fn interpolate_env(input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let regex = RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Z0-9_]+)(?::([^}]+))?\}").expect("interpolation pattern is valid")
    });
    regex
        .replace_all(input, |caps: &regex::Captures| {
            let key = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use passport_capture::bootstrap::{build_state, build_validator};
use passport_capture::config::{Config, DEFAULT_CONFIG_PATH};
use passport_capture::validator::EventValidator;
use passport_capture::{logging, metrics, server};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "passport-capture")]
#[command(about = "Idempotent EPCIS event capture gate")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture HTTP server
    Serve {
        /// Path to the TOML config file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate an events JSON file offline
    Validate {
        /// JSON file holding an event array or an object with an `events` array
        path: PathBuf,
        /// Validate against this JSON Schema instead of the built-in EPCIS rules
        #[arg(long)]
        schema: Option<PathBuf>,
    },
}

async fn serve(config_path: PathBuf, port: Option<u16>) -> Result<()> {
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let _guard = logging::init_logging(&config.logging.dir);
    if config.metrics.enabled {
        metrics::init_metrics();
    }

    info!("Initializing capture service...");
    let state = build_state(&config).await?;
    server::start_server(state, config.server.port).await?;
    info!("Server shut down");
    Ok(())
}

fn validate(path: PathBuf, schema: Option<PathBuf>) -> Result<bool> {
    let data =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let json: Value = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;
    let events = match json {
        Value::Array(events) => events,
        Value::Object(mut map) => match map.remove("events") {
            Some(Value::Array(events)) => events,
            _ => anyhow::bail!("{} has no `events` array", path.display()),
        },
        _ => anyhow::bail!("{} is not an event array", path.display()),
    };

    let mut config = Config::default();
    config.validation.schema = schema;
    let report = build_validator(&config)?.validate(&events)?;

    if report.is_valid && !events.is_empty() {
        println!("valid ({} events)", events.len());
        return Ok(true);
    }
    eprintln!("invalid:");
    if events.is_empty() {
        eprintln!("- events must not be empty");
    }
    for error in &report.errors {
        eprintln!("- {error}");
    }
    Ok(false)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => serve(config, port).await,
        Commands::Validate { path, schema } => {
            if !validate(path, schema)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

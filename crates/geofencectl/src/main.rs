// # geofencectl - Geofence Store Tool
//
// Thin inspection and maintenance shell over geofence-core. It opens the
// configured store directly and never talks to a location provider, so it
// can be run against a device's store file offline.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `GEOFENCE_STORE_TYPE`: Type of store (file, memory)
// - `GEOFENCE_STORE_PATH`: Path to store file (for file store)
// - `GEOFENCE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Commands
//
// - `list`: Print active geofences (prunes expired ones)
// - `erroneous`: Print geofences queued for re-registration (prunes expired ones)
// - `prune`: Delete expired records from both namespaces
// - `mark-erroneous <id>`: Queue a stored geofence for re-registration
// - `forget <id>`: Delete the stored and erroneous records for an id
// - `show-config`: Print the webhook and notification configuration
//
// ## Example
//
// ```bash
// export GEOFENCE_STORE_TYPE=file
// export GEOFENCE_STORE_PATH=/var/lib/geofence/store.json
//
// geofencectl list
// ```

use anyhow::{Context, Result};
use geofence_core::{Geofence, GeofenceStore, StoreConfig};
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum CtlExitCode {
    /// Command completed
    Success = 0,
    /// Configuration or usage error
    ConfigError = 1,
    /// Store error while running the command
    RuntimeError = 2,
}

impl From<CtlExitCode> for ExitCode {
    fn from(code: CtlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command to run
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List,
    Erroneous,
    Prune,
    MarkErroneous(String),
    Forget(String),
    ShowConfig,
}

impl Command {
    /// Parse the command from arguments (without the program name)
    fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let command = match args.next() {
            Some("list") => Command::List,
            Some("erroneous") => Command::Erroneous,
            Some("prune") => Command::Prune,
            Some("mark-erroneous") => Command::MarkErroneous(required_id(args.next())?),
            Some("forget") => Command::Forget(required_id(args.next())?),
            Some("show-config") => Command::ShowConfig,
            Some(other) => anyhow::bail!("Unknown command '{}'.\n{}", other, USAGE),
            None => anyhow::bail!("No command given.\n{}", USAGE),
        };

        if let Some(extra) = args.next() {
            anyhow::bail!("Unexpected argument '{}'.\n{}", extra, USAGE);
        }
        Ok(command)
    }
}

const USAGE: &str = "Usage: geofencectl <list|erroneous|prune|mark-erroneous <id>|forget <id>|show-config>";

fn required_id(arg: Option<&str>) -> Result<String> {
    match arg.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => anyhow::bail!("A geofence id is required.\n{}", USAGE),
    }
}

/// Application configuration
struct Config {
    store_type: String,
    store_path: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self {
            store_type: env::var("GEOFENCE_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("GEOFENCE_STORE_PATH").ok(),
            log_level: env::var("GEOFENCE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "file" => match self.store_path.as_deref() {
                Some(path) if !path.trim().is_empty() => {
                    if !std::path::Path::new(path).exists() {
                        anyhow::bail!("GEOFENCE_STORE_PATH does not exist: {}", path);
                    }
                }
                _ => anyhow::bail!(
                    "GEOFENCE_STORE_PATH is required when GEOFENCE_STORE_TYPE=file. \
                    Set it via: export GEOFENCE_STORE_PATH=/var/lib/geofence/store.json"
                ),
            },
            "memory" => {}
            _ => anyhow::bail!(
                "GEOFENCE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GEOFENCE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn store_config(&self) -> StoreConfig {
        match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return CtlExitCode::ConfigError.into();
        }
    };

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CtlExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // Logs go to stderr so command output stays parseable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CtlExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CtlExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(config, command).await {
            Ok(()) => CtlExitCode::Success,
            Err(e) => {
                error!("Command failed: {:#}", e);
                eprintln!("Error: {:#}", e);
                CtlExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Open the store and run one command
async fn run(config: Config, command: Command) -> Result<()> {
    let store_config = config.store_config();
    debug!(store = store_config.type_name(), "Opening geofence store");
    let backend = store_config
        .open()
        .await
        .context("Failed to open geofence store")?;
    let store = GeofenceStore::new(backend);

    match command {
        Command::List => {
            let active = store.active_geofences().await?;
            print_geofences(&active)?;
        }
        Command::Erroneous => {
            let erroneous = store.erroneous_geofences().await?;
            print_geofences(&erroneous)?;
        }
        Command::Prune => {
            let geofences = store.scan_geofences().await?;
            let erroneous = store.scan_erroneous_geofences().await?;
            info!(
                geofences = geofences.expired.len(),
                erroneous = erroneous.expired.len(),
                "Pruned expired records"
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "expired": geofences.expired,
                    "expiredErroneous": erroneous.expired,
                    "malformed": geofences
                        .malformed
                        .iter()
                        .chain(erroneous.malformed.iter())
                        .collect::<Vec<_>>(),
                }))?
            );
        }
        Command::MarkErroneous(id) => {
            let geofence = store
                .get_geofence(&id)
                .await?
                .with_context(|| format!("No stored geofence with id {}", id))?;
            store.save_erroneous_geofence(&geofence).await?;
            info!(geofence_id = %id, "Geofence marked erroneous");
            println!("Marked {} erroneous", id);
        }
        Command::Forget(id) => {
            store.remove_geofence(&id).await?;
            store.remove_erroneous_geofence(&id).await?;
            info!(geofence_id = %id, "Geofence records deleted");
            println!("Forgot {}", id);
        }
        Command::ShowConfig => {
            let webhook = store.webhook_configuration().await?;
            let notification = store.notification_configuration().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "webhook": webhook,
                    "notification": notification,
                }))?
            );
        }
    }

    Ok(())
}

/// Print geofences as a JSON array of their stored records
fn print_geofences(geofences: &[Geofence]) -> Result<()> {
    let records = geofences
        .iter()
        .map(|geofence| -> Result<serde_json::Value> {
            let record = geofence.to_record()?;
            Ok(serde_json::from_str::<serde_json::Value>(&record)?)
        })
        .collect::<Result<Vec<_>>>()?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

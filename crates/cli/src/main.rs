//! tripsync command line.
//!
//! Operator front end for the sync engine: issue requests, inspect the queue
//! and cache, trigger replay, and run a watch loop that feeds reachability
//! probes into the connectivity monitor.
//! Logging goes to stderr so command output on stdout stays machine readable.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use tripsync_client::{EngineOptions, HttpConfig, HttpTransport, SyncEngine, Transport};
use tripsync_core::cache::age_label;
use tripsync_core::{Method, RequestSpec, SqliteStore, SyncConfig};

mod error;
mod signal;

use error::CliError;

#[derive(Parser, Debug)]
#[command(name = "tripsync")]
#[command(about = "Offline-first sync for the trip planner API")]
#[command(version)]
struct Cli {
    /// Treat the backend as unreachable for this invocation
    #[arg(long, global = true)]
    offline: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show connectivity, pending mutations and login state
    Status,
    /// GET a resource, falling back to the cache
    Get {
        path: String,
        /// Cache key (default: derived from the path)
        #[arg(long)]
        key: Option<String>,
    },
    /// Send a mutation; queued when offline
    Send {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Inspect or purge the write queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Inspect or purge the cache mirror
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Replay pending mutations now
    Sync,
    /// Store a bearer token
    Login {
        #[arg(long)]
        token: String,
        /// JSON user profile
        #[arg(long)]
        user: Option<String>,
    },
    /// Forget credentials and cached data
    Logout,
    /// Probe reachability and replay on reconnect until interrupted
    Watch,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    List,
    Clear,
    /// Show abandoned mutations
    Dead {
        /// Purge the dead-letter list
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    List,
    Show { key: String },
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            error::exit_code(&err)
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = SyncConfig::load()?;
    let engine = open_engine(&config, cli.offline).await?;

    match cli.command {
        Command::Status => {
            let status = engine.refresh_status().await?;
            let dead = engine.dead_letters().await?.len();
            let authenticated = engine.credentials().is_authenticated().await?;
            print_json(&json!({"status": status, "deadLetters": dead, "authenticated": authenticated}))?;
        }
        Command::Get { path, key } => {
            let mut spec = RequestSpec::get(path);
            if let Some(key) = key {
                spec = spec.with_cache_key(key);
            }
            let outcome = engine.dispatch(spec).await?;
            print_json(&outcome.to_json())?;
        }
        Command::Send { method, path, body } => {
            let spec = mutation(&method, path, body.as_deref())?;
            let outcome = engine.dispatch(spec).await?;
            let out = outcome.synthetic_body().unwrap_or_else(|| outcome.to_json());
            print_json(&out)?;
        }
        Command::Queue { action } => match action {
            QueueAction::List => print_json(&engine.queue_status().await?)?,
            QueueAction::Clear => print_json(&json!({"discarded": engine.discard_pending().await?}))?,
            QueueAction::Dead { clear: false } => print_json(&engine.dead_letters().await?)?,
            QueueAction::Dead { clear: true } => print_json(&json!({"purged": engine.clear_dead_letters().await?}))?,
        },
        Command::Cache { action } => match action {
            CacheAction::List => print_json(&engine.cache_keys().await?)?,
            CacheAction::Show { key } => {
                let entry = engine.cache_read(&key).await?;
                print_json(&json!({
                    "key": key,
                    "age": age_label(entry.as_ref(), Utc::now()),
                    "stale": engine.is_stale(entry.as_ref()),
                    "entry": entry,
                }))?;
            }
            CacheAction::Clear => print_json(&json!({"removed": engine.clear_cache().await?}))?,
        },
        Command::Sync => print_json(&engine.replay_now().await?)?,
        Command::Login { token, user } => {
            let user = user.as_deref().map(parse_json).transpose()?;
            engine.login(&token, user).await?;
            print_json(&json!({"authenticated": true}))?;
        }
        Command::Logout => {
            engine.logout().await?;
            print_json(&json!({"authenticated": false}))?;
        }
        Command::Watch => watch(&engine, &config, cli.offline).await?,
    }

    Ok(())
}

async fn open_engine(config: &SyncConfig, offline: bool) -> Result<SyncEngine> {
    let store = SqliteStore::open(&config.db_path, config.origin()?).await?;
    let transport: Arc<dyn Transport> = if offline {
        Arc::new(signal::OfflineTransport)
    } else {
        Arc::new(HttpTransport::new(HttpConfig::from_sync_config(config)?)?)
    };
    let initially_online = initially_online(config, offline).await?;
    let options = EngineOptions { initially_online, ..EngineOptions::from(config) };
    Ok(SyncEngine::new(Arc::new(store), transport, options).await?)
}

/// Seed the monitor with one reachability probe so one-shot commands queue
/// mutations against an unreachable backend.
async fn initially_online(config: &SyncConfig, offline: bool) -> Result<bool> {
    if offline {
        return Ok(false);
    }
    let online = signal::reachable(&config.base_url()?, config.timeout()).await;
    tracing::debug!(online, "initial reachability probe");
    Ok(online)
}

fn mutation(method: &str, path: String, body: Option<&str>) -> Result<RequestSpec> {
    let method: Method = method.parse().map_err(|e| CliError::InvalidInput(format!("{e}")))?;
    if !method.is_mutation() {
        return Err(CliError::InvalidInput("use `get` for reads".into()).into());
    }
    let spec = RequestSpec::new(method, path);
    match body {
        Some(raw) => Ok(spec.with_json(&parse_json(raw)?)?),
        None => Ok(spec),
    }
}

fn parse_json(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::InvalidInput(format!("invalid JSON: {e}")))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(engine: &SyncEngine, config: &SyncConfig, offline: bool) -> Result<()> {
    let base_url = config.base_url()?;
    let driver = engine.start();
    let _status = engine.on_sync_status_change(|status| {
        if let Ok(line) = serde_json::to_string(&status) {
            println!("{line}");
        }
    });

    let mut ticker = tokio::time::interval(config.probe_interval());
    tracing::info!(interval_ms = config.probe_interval_ms, offline, "watching connectivity");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let online = !offline && signal::reachable(&base_url, config.timeout()).await;
                engine.report_connectivity(online);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    driver.abort();
    Ok(())
}

//! Command Hub: routes business commands to integration backends.
//!
//! A single-process hub that keeps a registry of business integrations
//! (Slack, Jobber, Gmail, Twilio, Google Calendar, ...), dispatches commands
//! to them through a bridge subprocess, monitors their health and can run an
//! autonomous decision loop.
//!
//! Usage:
//!   command-hub                                  # Built-in servers, heartbeat on
//!   command-hub --config hub.json                # Custom server list and timeouts
//!   command-hub --autonomous 300                 # Decision loop every 5 minutes
//!   command-hub --print-events                   # Stream hub events to stdout

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use hub_bridge::{Bridge, BridgeConfig};
use hub_core::{CommandHub, HubConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "command-hub", about = "Command Hub: business integration command router")]
struct Cli {
    /// Hub configuration file (JSON). Defaults to the built-in server list.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Runtime used to launch the bridge script (bun, node, deno)
    #[arg(long, default_value = "bun")]
    runtime: String,

    /// Bridge entry point
    #[arg(long, default_value = "hub-bridge/index.ts")]
    script: PathBuf,

    /// Working directory handed to the bridge
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Run the autonomous loop every N seconds
    #[arg(long, value_name = "SECS")]
    autonomous: Option<u64>,

    /// Disable periodic health checks
    #[arg(long)]
    no_heartbeat: bool,

    /// Print every hub event to stdout as a JSON line
    #[arg(long)]
    print_events: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.command-hub/logs/hub.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) -> Result<(), String> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(log_file_arg) = &cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    };

    let log_path = if log_file_arg == "DEFAULT" {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".command-hub/logs/hub.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to open log file {}: {e}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = match &cli.config {
        Some(path) => HubConfig::load(path).map_err(|e| e.to_string())?,
        None => HubConfig::default(),
    };
    if cli.no_heartbeat {
        config.enable_heartbeat = false;
    }
    if let Some(secs) = cli.autonomous {
        config.autonomous_interval_ms = secs.saturating_mul(1000);
    }

    let bridge = Arc::new(
        Bridge::spawn(BridgeConfig {
            script_path: cli.script.clone(),
            runtime: cli.runtime.clone(),
            workspace_root: cli.workspace.clone(),
            request_timeout_ms: config.command_timeout_ms,
        })
        .await
        .map_err(|e| e.to_string())?,
    );

    let hub = Arc::new(
        CommandHub::builder(config)
            .context_provider(bridge.clone())
            .decision_provider(bridge.clone())
            .analyzer(bridge.clone())
            .build(),
    );

    let registered = hub.register_configured(bridge.clone()).map_err(|e| e.to_string())?;
    info!("Registered {registered} servers");

    let connected = hub.connect_enabled().await;
    if connected.is_empty() {
        warn!("No servers connected; commands will fail until a heartbeat or reconnect succeeds");
    }

    if cli.print_events {
        let mut notifications = hub.notifications();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(line) => println!("{line}"),
                    Err(RecvError::Lagged(n)) => warn!("Event printer lagged, {n} events dropped"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    hub.start_heartbeat();
    if cli.autonomous.is_some() {
        hub.start_autonomous_loop().map_err(|e| e.to_string())?;
    }

    info!(
        "Command hub ready: {} workflows, {}/{} servers connected",
        hub.workflow_names().len(),
        connected.len(),
        registered
    );

    // Wait for Ctrl+C or stdin EOF (parent process gone).
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    {
        let notify = shutdown_notify.clone();
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = [0u8; 1];
            loop {
                match std::io::stdin().read(&mut buf) {
                    Ok(0) | Err(_) => {
                        notify.notify_one();
                        return;
                    }
                    Ok(_) => continue,
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = shutdown_notify.notified() => {
            info!("stdin closed, shutting down");
        }
    }

    hub.shutdown().await;
    bridge.shutdown().await;
    info!("Command hub stopped");
    Ok(())
}

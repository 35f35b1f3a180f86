//! Netconnect daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

use netconnect::config::Settings;
use netconnect::ipc::{Dispatch, IpcServer};
use netconnect::services::manager::ConnectionManager;
use netconnect::tracing_config;

#[derive(Debug, Parser)]
#[command(name = "netconnectd", about = "Network connection supervisor")]
struct Args {
    /// Path to a TOML settings file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also log to rotated files in the configured log directory.
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if args.log_file {
        std::fs::create_dir_all(&settings.log_dir)?;
        tracing_config::init_with_file(&settings.log_dir)?;
    } else {
        tracing_config::init()?;
    }

    info!("Starting netconnect[{}]", std::process::id());

    std::fs::create_dir_all(&settings.networkd_dir)?;
    for file in [&settings.resolv_conf, &settings.socket_path] {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let settings = Arc::new(settings);
    let manager = ConnectionManager::new(Arc::clone(&settings));

    let server = IpcServer::bind(&settings.socket_path)?;
    let dispatcher: Arc<dyn Dispatch> = manager;
    let endpoint = tokio::spawn(server.serve(dispatcher));

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
        result = endpoint => {
            if let Ok(Err(e)) = result {
                return Err(e.into());
            }
        }
    }

    info!("Exiting netconnect[{}]", std::process::id());
    Ok(())
}

//! Kiosk Daemon - Main entry point
//!
//! Connects the stand's serial boards, runs the demo host loop and serves
//! the HTTP/WebSocket adapter the kiosk UI talks to.

mod api;
mod config;
mod host;
mod router;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use kiosk_core::topics;
use kiosk_serial::SystemPortOpener;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "kiosk")]
#[command(about = "Exhibition stand kiosk daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kiosk.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Skip serial hardware and go straight to dev mode
    #[arg(long)]
    no_hardware: bool,

    /// Print the serial ports on this machine and exit
    #[arg(long)]
    list_ports: bool,
}

/// Resolves once the stop flag is raised or its sender is gone
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if args.list_ports {
        let ports = kiosk_serial::available_ports()?;
        println!("Found {} serial ports:", ports.len());
        for port in ports {
            println!("  - {}", port);
        }
        return Ok(());
    }

    info!("Kiosk v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        devices = config.devices.len(),
        slides = config.slides.len(),
        interval_ms = config.demo.interval_ms,
        "Configuration loaded"
    );

    let bind = config.daemon.bind.clone();
    let (state, commands) = state::AppState::new(config, Arc::new(SystemPortOpener))?;
    router::install(&state);

    let (stop_tx, stop_rx) = watch::channel(false);
    let host_task = tokio::spawn(host::Host::new(state.clone(), commands).run(stopped(stop_rx.clone())));
    let mut server_task = tokio::spawn(server::run(state.clone(), bind, stopped(stop_rx)));

    if args.no_hardware {
        info!("Hardware disabled on the command line");
        state.bus.publish_empty(topics::DEV_MODE_ACTIVATED);
    } else {
        let manager = state.manager.clone();
        tokio::task::spawn_blocking(move || manager.connect_all());
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Could not listen for ctrl-c");
            }
            info!("Interrupt received");
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Web server failed"),
                Err(e) => error!(error = %e, "Web server task failed"),
            }
        }
    }

    let _ = stop_tx.send(true);
    if !server_task.is_finished() {
        server_task.await??;
    }
    host_task.await??;
    info!("Kiosk stopped");
    Ok(())
}

//! `remote-link` command-line entry point.
//!
//! ```text
//! remote-link discover --seconds 10
//! remote-link send --device GlobalCache_000C1E024239 --tag 7 'sendir,1:1,<tag>,38000,1,1,...'
//! remote-link status
//! remote-link set-default GlobalCache_000C1E024239
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use remote_link::infrastructure::storage::config::{config_file_path, load_config_from};
use remote_link::{ConnectionManager, LinkEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Discover and drive Global Caché iTach IR blasters.
#[derive(Debug, Parser)]
#[command(name = "remote-link", about = "iTach discovery and command dispatch", version)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, env = "REMOTE_LINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for device beacons and list what was found.
    Discover {
        /// How long to listen.
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Send one command and print the device's reply.
    Send {
        /// Target device id; the configured default when omitted.
        #[arg(long)]
        device: Option<String>,
        /// Correlation tag substituted for `<tag>` in the command.
        #[arg(long, default_value_t = 1)]
        tag: u32,
        /// Raw command line, e.g. `getversion`.
        command: String,
    },
    /// Print the known devices and the default selection.
    Status,
    /// Make a known device the default target and save it to the config file.
    SetDefault {
        device: String,
        /// Listen this long for beacons first, so a new device can be chosen.
        #[arg(long, default_value_t = 0)]
        discover_seconds: u64,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("locating config file")?,
    };
    let config = load_config_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // RUST_LOG wins; otherwise the configured level applies.
    let level = config.general.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let manager = ConnectionManager::with_config_path(config, config_path);

    let result = run(&manager, cli.command).await;
    manager.shutdown().await;
    result
}

async fn run(manager: &ConnectionManager, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Discover { seconds } => {
            discover_for(manager, seconds).await?;
            for device in manager.devices().await {
                println!("{}\t{}\t{}", device.id, device.address, device.name);
            }
        }
        Command::Send {
            device,
            tag,
            command,
        } => {
            let outcome = manager.dispatch(&command, tag, device.as_deref()).await.await;
            let reply = outcome
                .result
                .with_context(|| format!("command {} failed", outcome.tag))?;
            println!("{reply}");
        }
        Command::Status => {
            println!("{}", manager.status_description().await);
            for device in manager.devices().await {
                println!("  {}\t{}\t{}", device.id, device.address, device.state);
            }
        }
        Command::SetDefault {
            device,
            discover_seconds,
        } => {
            if discover_seconds > 0 {
                discover_for(manager, discover_seconds).await?;
            }
            if manager.device(&device).await.is_none() {
                anyhow::bail!("device {device} is not known; try --discover-seconds");
            }
            manager.set_default_device(Some(device.clone())).await?;
            println!("default device: {device}");
        }
    }
    Ok(())
}

/// Listens for beacons for `seconds`, logging each new device, or until
/// Ctrl+C.
async fn discover_for(manager: &ConnectionManager, seconds: u64) -> anyhow::Result<()> {
    let mut events = manager.subscribe();
    manager.detect_network_devices().await?;
    info!("listening for beacons for {seconds}s");

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, stopping discovery");
                break;
            }
            event = events.recv() => {
                if let Ok(LinkEvent::DeviceDiscovered { id, address }) = event {
                    info!("found {id} at {address}");
                }
            }
        }
    }

    manager.stop_network_device_detection().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

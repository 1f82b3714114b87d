//! vtrack - Real-time tracking service for virtual avatars
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vtrack::{output::VmcSender, Config, Tracker};

/// vtrack - Real-time face/hand tracking streamed over VMC
#[derive(Parser, Debug)]
#[command(name = "vtrack", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index (overrides config)
    #[arg(long)]
    camera: Option<u32>,

    /// Target capture rate in frames per second (overrides config)
    #[arg(long)]
    fps: Option<u32>,

    /// VMC receiver address (overrides config)
    #[arg(long)]
    vmc_addr: Option<String>,

    /// VMC receiver port (overrides config)
    #[arg(long)]
    vmc_port: Option<u16>,

    /// Disable VMC output
    #[arg(long)]
    no_vmc: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", vtrack::NAME, vtrack::VERSION);

    // Load configuration and apply CLI overrides
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        config.camera.device_id = camera;
    }
    if let Some(fps) = args.fps {
        config.camera.fps = fps;
    }
    if let Some(addr) = args.vmc_addr {
        config.vmc.address = addr;
    }
    if let Some(port) = args.vmc_port {
        config.vmc.port = port;
    }
    if args.no_vmc {
        config.vmc.enabled = false;
    }
    config.validate()?;

    info!("Camera device: {}", config.camera.device_id);
    info!("Target rate: {} fps", config.camera.fps);
    info!(
        "VMC output: {}",
        if config.vmc.enabled {
            format!("{}:{}", config.vmc.address, config.vmc.port)
        } else {
            "disabled".to_string()
        }
    );

    let tracker = Arc::new(Tracker::new(config.clone())?);

    if config.vmc.enabled {
        let sender = VmcSender::new(&config.vmc.address, config.vmc.port)?;
        tracker.set_vmc_sender(sender).await?;
    }

    // A local subscriber for progress visibility; logs a heartbeat every
    // 30 frames so the console shows the pipeline is alive
    if args.verbose {
        let mut rx = tracker.subscribe().await;
        tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                if data.frame_number % 30 == 0 {
                    debug!(
                        "Frame {}: face={} left_hand={} right_hand={} pose={}",
                        data.frame_number,
                        data.face.is_some(),
                        data.left_hand.is_some(),
                        data.right_hand.is_some(),
                        data.pose.is_some(),
                    );
                }
            }
        });
    }

    tracker.start().await?;
    info!("Tracking started, press Ctrl+C to stop");

    shutdown_signal().await;
    info!("Shutdown signal received");

    if let Err(e) = tracker.close().await {
        error!("Error during shutdown: {}", e);
    }

    info!("vtrack stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

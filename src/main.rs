//! mosaic - serial LED matrix driver
//!
//! ```bash
//! # Defaults, or the config file if it exists
//! mosaic
//!
//! # Another port and a bigger panel
//! mosaic --port /dev/ttyUSB0 --width 16 --height 16
//!
//! # Drive it
//! echo '{"scroll": {"text": "hello", "color": "orange"}}' | nc -q1 127.0.0.1 8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{error, info};

use mosaic::config::Config;
use mosaic::device::SerialDevice;
use mosaic::power::SystemPower;
use mosaic::scheduler::{ModeContext, ModeScheduler};
use mosaic::shutdown::ShutdownSignals;
use mosaic::surface::RasterSurface;
use mosaic::transport::{Bypass, FrameTransport};
use mosaic::{bypass, control};

/// Serial LED matrix driver
#[derive(Parser, Debug)]
#[command(name = "mosaic")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "MOSAIC_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device
    #[arg(short = 'p', long, env = "MOSAIC_PORT", value_name = "PATH")]
    port: Option<String>,

    #[arg(short = 'b', long, env = "MOSAIC_BAUD")]
    baud: Option<u32>,

    /// Panel width in pixels
    #[arg(long, env = "MOSAIC_WIDTH")]
    width: Option<u32>,

    /// Panel height in pixels
    #[arg(long, env = "MOSAIC_HEIGHT")]
    height: Option<u32>,

    /// Frames per second sent to the device
    #[arg(short = 'r', long, env = "MOSAIC_FRAME_RATE")]
    frame_rate: Option<u32>,

    /// Address of the JSON control socket
    #[arg(long, env = "MOSAIC_CONTROL", value_name = "ADDR")]
    control: Option<SocketAddr>,

    /// Address of the raw frame bypass socket
    #[arg(long, env = "MOSAIC_BYPASS", value_name = "ADDR")]
    bypass: Option<SocketAddr>,

    /// Disable the bypass socket
    #[arg(long)]
    no_bypass: bool,

    /// Directory holding the sprite strips
    #[arg(long, env = "MOSAIC_IMAGE_DIR", value_name = "DIR")]
    image_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "MOSAIC_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.device.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.device.baud_rate = baud;
        }
        if let Some(width) = self.width {
            config.display.width = width;
        }
        if let Some(height) = self.height {
            config.display.height = height;
        }
        if let Some(frame_rate) = self.frame_rate {
            config.display.frame_rate = frame_rate;
        }
        if let Some(listen) = self.control {
            config.control.listen = listen;
        }
        if let Some(listen) = self.bypass {
            config.bypass.listen = listen;
        }
        if self.no_bypass {
            config.bypass.enabled = false;
        }
        if let Some(dir) = &self.image_dir {
            config.animations.image_dir = dir.clone();
        }
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mosaic={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let device = SerialDevice::open(&config.device).context("Failed to open serial device")?;
    info!(
        port = device.name(),
        width = config.display.width,
        height = config.display.height,
        frame_rate = config.display.frame_rate,
        "Starting mosaic"
    );

    LocalSet::new().run_until(run(config, device)).await
}

async fn run(config: Config, device: SerialDevice) -> Result<()> {
    let surface = RasterSurface::shared(config.display.width, config.display.height);
    let frames = Bypass::shared(config.bypass.queue_depth);

    let ctx = ModeContext::new(
        surface.clone(),
        config.animations.catalog(),
        config.animations.image_dir.clone(),
        config.animations.extension.clone(),
        Rc::new(SystemPower::new(config.power.clone())),
    );
    let (commands, inbox) = mpsc::channel(32);
    tokio::task::spawn_local(ModeScheduler::new(ctx).run(inbox));

    let listener = TcpListener::bind(config.control.listen)
        .await
        .with_context(|| format!("Failed to bind control socket {}", config.control.listen))?;
    let control = tokio::task::spawn_local(control::serve(listener, commands));

    let bypass = if config.bypass.enabled {
        let listener = TcpListener::bind(config.bypass.listen)
            .await
            .with_context(|| format!("Failed to bind bypass socket {}", config.bypass.listen))?;
        Some(tokio::task::spawn_local(bypass::serve(listener, frames.clone())))
    } else {
        None
    };

    let transport = FrameTransport::new(device, surface, frames, config.display.frame_interval());
    let mut signals = ShutdownSignals::install().context("Failed to install signal handlers")?;

    let outcome = tokio::select! {
        result = transport.run() => result.context("Frame transport stopped"),
        result = control => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e).context("Control socket failed"),
            Err(e) => Err(e).context("Control task failed"),
        },
        request = signals.recv() => {
            info!(?request, "Stop requested, shutting down");
            Ok(())
        }
    };

    if let Some(task) = bypass {
        task.abort();
    }
    if let Err(e) = &outcome {
        error!(error = %format!("{e:#}"), "Shutting down");
    }
    outcome
}

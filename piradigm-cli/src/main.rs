// piradigm - run a robot challenge from the command line
// Buttons are read from stdin, one per line (home, select, l1, l2, r1, r2)

mod demo;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam::channel::Sender;
use piradigm_challenge::{
    CalibrationChallenge, ChallengeHandle, ChallengeSupervisor, ChannelInput, FrameHandler,
    JsonFileStore, LoggingDrivetrain, PiNoonChallenge,
};
use piradigm_core::{Button, PiradigmConfig, VisionBackend};
use piradigm_eye::{Camera, SyntheticCamera, Vision};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "piradigm")]
#[command(about = "Run piradigm robot challenges", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Challenge timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Frame source
    #[arg(long, value_enum, default_value = "synthetic", global = true)]
    camera: CameraKind,

    /// Image processing backend; overrides the configured one
    #[arg(long, value_enum, global = true)]
    vision: Option<VisionKind>,

    /// File holding saved colour ranges
    #[arg(long, global = true)]
    calibration_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate a colour range
    Calibrate {
        /// Name the range is loaded from and saved under
        #[arg(long)]
        colour_key: Option<String>,
    },

    /// Chase balloons
    PiNoon {
        /// Compute and log steering without driving the motors
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CameraKind {
    /// Generated frames, no hardware needed
    Synthetic,
    /// Video device through OpenCV
    Opencv,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VisionKind {
    /// Pure Rust image processing
    Native,
    /// OpenCV image processing
    Opencv,
}

impl From<VisionKind> for VisionBackend {
    fn from(kind: VisionKind) -> Self {
        match kind {
            VisionKind::Native => VisionBackend::Native,
            VisionKind::Opencv => VisionBackend::Opencv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(&cli)?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let vision = Vision::new(config.vision.backend)?;
    let camera = build_camera(cli.camera, &cli.command, &config)?;
    let (name, handler): (&str, Box<dyn FrameHandler>) = match &cli.command {
        Commands::Calibrate { .. } => {
            let store = JsonFileStore::new(&config.calibration.store_path);
            (
                "calibration",
                Box::new(
                    CalibrationChallenge::new(&config.calibration, Box::new(store))?
                        .with_vision(vision),
                ),
            )
        }
        Commands::PiNoon { .. } => (
            "pi-noon",
            Box::new(PiNoonChallenge::with_vision(
                &config.tracking,
                &config.steering,
                vision,
            )),
        ),
    };

    let (input, buttons) = ChannelInput::new();
    let supervisor = ChallengeSupervisor::new(
        name,
        config.challenge.timeout(),
        camera,
        handler,
        Box::new(LoggingDrivetrain::new()),
    )
    .with_timing(&config.challenge)
    .with_input(Box::new(input))
    .with_max_camera_failures(config.camera.max_consecutive_failures);

    let handle = supervisor.handle();
    spawn_button_reader(buttons, handle.clone())?;

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            handle.interrupt();
        }
    });

    let report = tokio::task::spawn_blocking(move || supervisor.run())
        .await
        .context("challenge thread panicked")??;

    println!("{}", report);
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("piradigm={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn load_config(cli: &Cli) -> Result<PiradigmConfig> {
    let mut config = match &cli.config {
        Some(path) => PiradigmConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PiradigmConfig::default(),
    };
    config.apply_env();

    // flags win over file and environment
    if let Some(timeout) = cli.timeout {
        config.challenge.timeout_secs = timeout;
    }
    if let Some(kind) = cli.vision {
        config.vision.backend = kind.into();
    }
    if let Some(path) = &cli.calibration_file {
        config.calibration.store_path = path.clone();
    }
    match &cli.command {
        Commands::Calibrate { colour_key } => {
            if let Some(key) = colour_key {
                config.calibration.colour_key = key.clone();
            }
        }
        Commands::PiNoon { dry_run } => {
            if *dry_run {
                config.tracking.driving = false;
            }
        }
    }
    Ok(config)
}

fn build_camera(kind: CameraKind, command: &Commands, config: &PiradigmConfig) -> Result<Box<dyn Camera>> {
    match kind {
        CameraKind::Synthetic => {
            let (width, height) = config.camera.resolution;
            let camera = SyntheticCamera::new(width, height, config.camera.frame_rate);
            let camera = match command {
                Commands::Calibrate { .. } => camera.with_painter(demo::calibration_scene()),
                Commands::PiNoon { .. } => camera.with_painter(demo::balloon_scene()),
            };
            Ok(Box::new(camera))
        }
        CameraKind::Opencv => opencv_camera(config),
    }
}

#[cfg(feature = "opencv")]
fn opencv_camera(config: &PiradigmConfig) -> Result<Box<dyn Camera>> {
    Ok(Box::new(piradigm_eye::OpenCvCamera::new(config.camera.clone())))
}

#[cfg(not(feature = "opencv"))]
fn opencv_camera(_config: &PiradigmConfig) -> Result<Box<dyn Camera>> {
    Err(anyhow!("built without OpenCV support; rebuild with --features opencv"))
}

/// Feed stdin lines to the challenge as button presses; `q` stops the run
fn spawn_button_reader(buttons: Sender<Button>, handle: ChallengeHandle) -> Result<()> {
    thread::Builder::new()
        .name("piradigm-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "q" || line == "quit" {
                    handle.stop();
                    break;
                }
                match line.parse::<Button>() {
                    Ok(button) => {
                        info!(%button, "Button pressed");
                        if buttons.send(button).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        })?;
    Ok(())
}

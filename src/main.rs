use anyhow::{bail, Context, Result};
use camctl::acquisition::{AcquisitionMode, AcquisitionSettings, Camera, StopFlag};
use camctl::bridge::{DeviceBridge, PropertyValue, SimulatedBridge};
use camctl::config::CameraConfig;
use camctl::output::{DisplaySink, LoopbackDisplay, SnapshotDisplay, Viewer};
use camctl::processing::normalize_to_u8;
use camctl::storage::ManifestLogger;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-process simulated camera
    Demo,
    /// V4L webcam (requires the `webcam` feature)
    Webcam,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera configuration file (JSON with `name` and `MMconfig`)
    #[arg(short, long)]
    config: PathBuf,

    /// Extra property assignment applied after connecting, as KEY=VALUE
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, PropertyValue)>,

    /// snap_image, continuous_stream or snap_video
    #[arg(short, long, default_value = "snap_video")]
    mode: String,

    /// Frames captured by snap_video
    #[arg(short = 'n', long, default_value_t = 10)]
    frames: usize,

    /// Pooling factor for buffered frames
    #[arg(long, default_value_t = 3)]
    downscale: usize,

    /// Sleep between empty polls, in milliseconds
    #[arg(long, default_value_t = 1)]
    poll_interval_ms: u64,

    /// Abort when no frame arrives for this many seconds (0 waits forever)
    #[arg(long, default_value_t = 10.0)]
    idle_timeout_secs: f64,

    /// Directory searched for driver adapters
    #[arg(long)]
    adapter_dir: Vec<PathBuf>,

    /// Device bridge implementation
    #[arg(long, value_enum, default_value_t = Backend::Demo)]
    backend: Backend,

    /// Demo sensor width
    #[arg(long, default_value_t = 640)]
    demo_width: usize,

    /// Demo sensor height
    #[arg(long, default_value_t = 480)]
    demo_height: usize,

    /// Demo sensor channels
    #[arg(long, default_value_t = 1)]
    demo_channels: usize,

    /// Demo frame rate
    #[arg(long, default_value_t = 30.0)]
    demo_fps: f64,

    /// Webcam device index
    #[arg(long, default_value_t = 0)]
    webcam_index: u32,

    /// v4l2loopback device used as live display
    #[arg(long)]
    display_device: Option<PathBuf>,

    /// Live display width
    #[arg(long, default_value_t = 1280)]
    display_width: u32,

    /// Live display height
    #[arg(long, default_value_t = 720)]
    display_height: u32,

    /// PNG file kept up to date with the latest frame
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Directory for video.tiff and video_timing.csv
    #[arg(short, long, default_value = "test_output")]
    output: PathBuf,

    /// JSON manifest that records saved artifacts
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Output image for snap_image
    #[arg(long, default_value = "snap.png")]
    snapshot: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_param(raw: &str) -> Result<(String, PropertyValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in {raw:?}"));
    }
    Ok((key.to_string(), PropertyValue::parse(value.trim())))
}

fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => Ok(duration),
        Err(err) => bail!("{flag} gives an unusable duration of {secs}s: {err}"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("camctl starting");

    let config = CameraConfig::load(&args.config).context("Failed to load camera config")?;
    let idle_timeout = if args.idle_timeout_secs > 0.0 {
        Some(seconds("--idle-timeout-secs", args.idle_timeout_secs)?)
    } else {
        None
    };
    let settings = AcquisitionSettings {
        downscale: args.downscale,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        idle_timeout,
        adapter_dirs: args.adapter_dir.clone(),
    };

    match args.backend {
        Backend::Demo => {
            if args.demo_fps.is_nan() || args.demo_fps <= 0.0 {
                bail!("--demo-fps must be positive");
            }
            let frame_interval = seconds("--demo-fps", 1.0 / args.demo_fps)?;
            let mut bridge = SimulatedBridge::new(&config.name, args.demo_height, args.demo_width)
                .with_frame_interval(frame_interval);
            if args.demo_channels > 1 {
                bridge = bridge.with_channels(args.demo_channels);
            }
            tracing::info!(
                "Demo sensor: {}x{}x{} at {} fps",
                args.demo_width,
                args.demo_height,
                args.demo_channels,
                args.demo_fps
            );
            run(bridge, &config, settings, &args)
        }
        Backend::Webcam => run_webcam(&config, settings, &args),
    }
}

#[cfg(feature = "webcam")]
fn run_webcam(config: &CameraConfig, settings: AcquisitionSettings, args: &Args) -> Result<()> {
    let bridge = camctl::bridge::WebcamBridge::new(&config.name, args.webcam_index);
    run(bridge, config, settings, args)
}

#[cfg(not(feature = "webcam"))]
fn run_webcam(_config: &CameraConfig, _settings: AcquisitionSettings, args: &Args) -> Result<()> {
    bail!(
        "webcam {} requested but camctl was built without the `webcam` feature",
        args.webcam_index
    )
}

fn run<B: DeviceBridge>(
    bridge: B,
    config: &CameraConfig,
    settings: AcquisitionSettings,
    args: &Args,
) -> Result<()> {
    let mut camera =
        Camera::connect(config, bridge, settings).context("Failed to connect camera")?;

    // Overrides are best effort: a rejected value is reported and skipped
    for (key, value) in &args.params {
        if let Err(err) = camera.update_param(key, value.clone()) {
            tracing::error!("{:#}", anyhow::Error::from(err));
            continue;
        }
        match camera.get_param(key) {
            Ok(current) => tracing::info!("{} is now {}", key, current),
            Err(err) => tracing::error!("{:#}", anyhow::Error::from(err)),
        }
    }

    if args.mode == "snap_image" {
        let image = camera.snap_image().context("Failed to snap image")?;
        normalize_to_u8(image)
            .save(&args.snapshot)
            .with_context(|| format!("Failed to write {}", args.snapshot.display()))?;
        tracing::info!("Snapshot written to {}", args.snapshot.display());
        return Ok(());
    }

    let mode = args
        .mode
        .parse::<AcquisitionMode>()
        .context("Unknown acquisition mode")?
        .with_frames(args.frames);

    let quit = StopFlag::new();
    let handler_quit = quit.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_quit.raise()) {
        tracing::warn!("Failed to install Ctrl+C handler: {err}");
    }
    tracing::info!("Press Ctrl+C to stop");

    let mut display: Option<Box<dyn DisplaySink>> = match (&args.display_device, &args.preview) {
        (Some(device), _) => Some(Box::new(
            LoopbackDisplay::new(device, args.display_width, args.display_height)
                .context("Failed to initialize v4l2loopback display")?,
        )),
        (None, Some(preview)) => Some(Box::new(SnapshotDisplay::new(preview))),
        (None, None) => None,
    };
    let viewer = display.as_deref_mut().map(|sink| Viewer::new(sink));

    let report = camera
        .run(mode, viewer, &mut quit.clone())
        .context("Acquisition failed")?;
    tracing::info!(
        "Session finished: {} frames in {:.2}s ({:?})",
        report.frames,
        report.elapsed.as_secs_f64(),
        report.stop
    );

    if let AcquisitionMode::SnapVideo { .. } = mode {
        let mut manifest = args
            .manifest
            .as_ref()
            .map(ManifestLogger::open)
            .transpose()
            .context("Failed to open artifact manifest")?;
        let saved = camera
            .save_video(
                &args.output,
                manifest.as_mut().map(|m| m as &mut dyn camctl::storage::ArtifactLogger),
            )
            .context("Failed to save video")?;
        tracing::info!(
            "Video saved to {} ({} timestamps)",
            saved.video_path.display(),
            saved.timestamps.len()
        );
    }

    Ok(())
}

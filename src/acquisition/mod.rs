//! Camera controller and the frame acquisition loop.
//!
//! A [`Camera`] is built in two steps: load a [`CameraConfig`], then
//! [`Camera::connect`] it to a device bridge. Connecting either succeeds
//! completely or returns an error, so there is no half-initialised camera.
//!
//! Each call to [`Camera::continuous_stream`] or [`Camera::snap_video`] is one
//! session. The loop polls the bridge's ready count, dequeues at most one
//! frame per iteration, pools it into the session buffers and optionally
//! shows it. Quit and frame-count checks run on every iteration whether or
//! not a frame arrived.

mod session;
mod signal;
mod worker;

pub use session::{Session, SessionReport, StopReason, TerminationPolicy};
pub use signal::{QuitSignal, StopFlag};
pub use worker::spawn_session;

use crate::bridge::{DeviceBridge, PropertyValue};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::output::Viewer;
use crate::processing::{collapse_channels, downscale_local_mean, Frame};
use crate::storage::{self, ArtifactLogger, SavedVideo};
use session::SessionClock;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Interval handed to the bridge when streaming starts
const SEQUENCE_INTERVAL_MS: f64 = 1.0;

/// Frames captured by `snap_video` mode when no count is given
pub const DEFAULT_VIDEO_FRAMES: usize = 10;

/// Controller-side acquisition settings
#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    /// Pooling window for buffered frames
    pub downscale: usize,
    /// Sleep between polls that find no frame ready; zero busy-polls
    pub poll_interval: Duration,
    /// Fail the session when no frame arrives for this long
    pub idle_timeout: Option<Duration>,
    /// Where the bridge looks for driver adapters
    pub adapter_dirs: Vec<PathBuf>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            downscale: 3,
            poll_interval: Duration::from_millis(1),
            idle_timeout: None,
            adapter_dirs: Vec::new(),
        }
    }
}

impl AcquisitionSettings {
    fn validate(&self) -> Result<()> {
        if self.downscale == 0 {
            return Err(CameraError::InvalidSetting(
                "downscale factor must be at least 1".into(),
            ));
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(CameraError::InvalidSetting(
                "idle timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Which session `Camera::run` starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Show frames until the quit signal
    ContinuousStream,
    /// Capture a fixed number of frames, then reset the device
    SnapVideo { frames: usize },
}

impl AcquisitionMode {
    /// Replace the frame count of a `SnapVideo` mode
    pub fn with_frames(self, frames: usize) -> Self {
        match self {
            Self::SnapVideo { .. } => Self::SnapVideo { frames },
            other => other,
        }
    }
}

impl FromStr for AcquisitionMode {
    type Err = CameraError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "continuous_stream" => Ok(Self::ContinuousStream),
            "snap_video" => Ok(Self::SnapVideo {
                frames: DEFAULT_VIDEO_FRAMES,
            }),
            other => Err(CameraError::InvalidMode(other.to_string())),
        }
    }
}

/// A connected camera and the buffers of its most recent session
#[derive(Debug)]
pub struct Camera<B> {
    name: String,
    bridge: B,
    settings: AcquisitionSettings,
    session: Session,
    last_image: Option<Frame>,
}

impl<B: DeviceBridge> Camera<B> {
    /// Load the driver configuration and apply the configured properties
    pub fn connect(config: &CameraConfig, mut bridge: B, settings: AcquisitionSettings) -> Result<Self> {
        settings.validate()?;

        let device = config.name.as_str();
        tracing::info!(
            "Connecting to {} with {}",
            device,
            config.driver_config.display()
        );

        let init = |source: anyhow::Error| CameraError::DeviceInit {
            device: device.to_string(),
            source,
        };
        bridge
            .set_adapter_search_paths(&settings.adapter_dirs)
            .map_err(init)?;
        bridge
            .load_configuration(&config.driver_config)
            .map_err(|source| {
                tracing::error!(
                    "Error accessing {} through the device bridge. Check that the driver is installed \
                     and that the camera is connected.",
                    device
                );
                init(source)
            })?;

        let mut camera = Self {
            name: config.name.clone(),
            bridge,
            settings,
            session: Session::default(),
            last_image: None,
        };

        for (key, value) in &config.properties {
            camera.update_param(key, value.clone())?;
        }

        tracing::info!("{} connected", camera.name);
        Ok(camera)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Buffers of the most recent session
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn last_image(&self) -> Option<&Frame> {
        self.last_image.as_ref()
    }

    pub fn update_param(&mut self, key: &str, value: impl Into<PropertyValue>) -> Result<()> {
        let value = value.into();
        tracing::info!("{}: {} = {}", self.name, key, value);
        self.bridge
            .set_property(&self.name, key, &value)
            .map_err(|source| CameraError::PropertySet {
                device: self.name.clone(),
                key: key.to_string(),
                value: value.to_string(),
                source,
            })
    }

    pub fn get_param(&self, key: &str) -> Result<PropertyValue> {
        self.bridge
            .get_property(&self.name, key)
            .map_err(|source| CameraError::PropertyGet {
                device: self.name.clone(),
                key: key.to_string(),
                source,
            })
    }

    /// Capture one frame outside of any session
    pub fn snap_image(&mut self) -> Result<&Frame> {
        let raw = self
            .bridge
            .snap_image()
            .map_err(CameraError::FrameRetrieval)?;
        let frame = collapse_channels(&raw)?;
        tracing::info!("Snapped {}x{} image", frame.ncols(), frame.nrows());
        Ok(self.last_image.insert(frame))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.bridge
            .reset()
            .map_err(|source| CameraError::Acquisition {
                action: "reset",
                source,
            })
    }

    /// Start the session selected by `mode`
    pub fn run(
        &mut self,
        mode: AcquisitionMode,
        viewer: Option<Viewer<'_>>,
        quit: &mut dyn QuitSignal,
    ) -> Result<SessionReport> {
        match mode {
            AcquisitionMode::ContinuousStream => self.continuous_stream(viewer, quit),
            AcquisitionMode::SnapVideo { frames } => self.snap_video(frames, viewer, quit),
        }
    }

    /// Stream until `quit` is raised
    pub fn continuous_stream(
        &mut self,
        viewer: Option<Viewer<'_>>,
        quit: &mut dyn QuitSignal,
    ) -> Result<SessionReport> {
        self.run_session(TerminationPolicy::Unbounded, viewer, quit)
    }

    /// Capture `frames` frames, then stop and reset the device
    ///
    /// Raising `quit` ends the capture early.
    pub fn snap_video(
        &mut self,
        frames: usize,
        viewer: Option<Viewer<'_>>,
        quit: &mut dyn QuitSignal,
    ) -> Result<SessionReport> {
        if frames == 0 {
            return Err(CameraError::InvalidSetting(
                "snap_video needs at least one frame".into(),
            ));
        }
        self.run_session(TerminationPolicy::Count(frames), viewer, quit)
    }

    /// Write the last session to `video.tiff` and `video_timing.csv`
    pub fn save_video<P: AsRef<Path>>(
        &self,
        dir: P,
        logger: Option<&mut dyn ArtifactLogger>,
    ) -> Result<SavedVideo> {
        storage::save_video(dir.as_ref(), &self.session, logger)
    }

    fn run_session(
        &mut self,
        policy: TerminationPolicy,
        mut viewer: Option<Viewer<'_>>,
        quit: &mut dyn QuitSignal,
    ) -> Result<SessionReport> {
        let _span = tracing::info_span!("session", device = %self.name, ?policy).entered();

        self.session.clear();
        if let Err(source) = self
            .bridge
            .start_continuous_acquisition(SEQUENCE_INTERVAL_MS)
        {
            if let Some(Err(err)) = viewer.as_mut().map(|viewer| viewer.close()) {
                tracing::warn!("Failed to close display after failed start: {:#}", err);
            }
            return Err(CameraError::Acquisition {
                action: "start continuous acquisition",
                source,
            });
        }
        tracing::info!("Acquisition started");

        let started = Instant::now();
        let outcome = self.poll_frames(policy, viewer.as_mut(), quit);

        let closed = match viewer.as_mut() {
            Some(viewer) => viewer.close().map_err(CameraError::Display),
            None => Ok(()),
        };
        let stopped = self
            .bridge
            .stop_acquisition()
            .map_err(|source| CameraError::Acquisition {
                action: "stop acquisition",
                source,
            });
        let reset = if policy.is_bounded() {
            self.reset()
        } else {
            Ok(())
        };

        let stop = match outcome {
            Ok(stop) => stop,
            Err(err) => {
                for cleanup in [closed, stopped, reset] {
                    if let Err(cleanup) = cleanup {
                        tracing::warn!("Cleanup after failed session: {}", cleanup);
                    }
                }
                tracing::error!("Session aborted: {}", err);
                return Err(err);
            }
        };
        closed?;
        stopped?;
        reset?;

        let report = SessionReport {
            frames: self.session.len(),
            stop,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Acquisition stopped ({:?}) after {} frames in {:.2}s",
            report.stop,
            report.frames,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    fn poll_frames(
        &mut self,
        policy: TerminationPolicy,
        mut viewer: Option<&mut Viewer<'_>>,
        quit: &mut dyn QuitSignal,
    ) -> Result<StopReason> {
        let clock = SessionClock::start();
        let clip = policy.display_clip();
        let started = Instant::now();
        let mut last_frame = Instant::now();
        let mut retrieved = 0usize;

        loop {
            let ready = self
                .bridge
                .pending_frame_count()
                .map_err(CameraError::FrameRetrieval)?;

            if ready > 0 {
                let raw = self
                    .bridge
                    .pop_next_frame()
                    .map_err(CameraError::FrameRetrieval)?;
                let frame = collapse_channels(&raw)?;
                let pooled = downscale_local_mean(&frame, self.settings.downscale);
                self.session.push(pooled, clock.now());
                retrieved += 1;
                last_frame = Instant::now();

                if let Some(viewer) = viewer.as_mut() {
                    viewer.render(&frame, clip).map_err(CameraError::Display)?;
                }

                // Log stats every 30 frames
                if retrieved % 30 == 0 {
                    let fps = retrieved as f64 / started.elapsed().as_secs_f64();
                    tracing::info!("Frame {}: fps={:.1}, queued={}", retrieved, fps, ready - 1);
                } else {
                    tracing::debug!("Frame {} retrieved", retrieved);
                }
            } else {
                if let Some(timeout) = self.settings.idle_timeout {
                    if last_frame.elapsed() >= timeout {
                        return Err(CameraError::Starved {
                            device: self.name.clone(),
                            timeout,
                        });
                    }
                }
                if !self.settings.poll_interval.is_zero() {
                    std::thread::sleep(self.settings.poll_interval);
                }
            }

            if quit.should_quit() {
                return Ok(StopReason::QuitSignal);
            }
            if policy.reached(retrieved) {
                return Ok(StopReason::FrameCount);
            }
        }
    }
}

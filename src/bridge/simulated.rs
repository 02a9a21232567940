use super::{DeviceBridge, PropertyValue, RawFrame};
use anyhow::{bail, Context, Result};
use ndarray::{ArrayD, Dimension, IxDyn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const READ_ONLY: &[&str] = &["CameraName"];

/// In-process stand-in for a camera driver
///
/// Frames are a deterministic gradient that shifts with every frame so that
/// consecutive frames differ. The queue fills at `frame_interval`; a zero
/// interval keeps exactly one frame ready at all times.
#[derive(Debug)]
pub struct SimulatedBridge {
    device: String,
    shape: Vec<usize>,
    frame_interval: Duration,
    frame_limit: Option<usize>,
    properties: HashMap<String, PropertyValue>,
    config_path: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
    stream: Option<Stream>,
    sequence: u64,
}

#[derive(Debug)]
struct Stream {
    started: Instant,
    popped: usize,
}

impl SimulatedBridge {
    /// Monochrome sensor of `height` x `width` pixels
    pub fn new(device: impl Into<String>, height: usize, width: usize) -> Self {
        let device = device.into();
        Self {
            properties: default_properties(&device),
            device,
            shape: vec![height, width],
            frame_interval: Duration::ZERO,
            frame_limit: None,
            config_path: None,
            search_paths: Vec::new(),
            stream: None,
            sequence: 0,
        }
    }

    /// Deliver `channels`-deep colour frames instead of monochrome ones
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.shape.truncate(2);
        self.shape.push(channels);
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Stop producing frames after `limit` frames per streaming session
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    fn check_device(&self, device: &str) -> Result<()> {
        if device != self.device {
            bail!("no device with label {device:?}");
        }
        Ok(())
    }

    fn check_loaded(&self) -> Result<()> {
        if self.config_path.is_none() {
            bail!("no system configuration loaded");
        }
        Ok(())
    }

    fn next_frame(&mut self) -> RawFrame {
        let offset = (self.sequence * 7) as usize;
        self.sequence += 1;
        ArrayD::from_shape_fn(IxDyn(&self.shape), |idx| {
            let channel = if idx.ndim() > 2 { idx[2] } else { 0 };
            ((idx[0] + idx[1] + offset + channel * 100) % 4096) as u16
        })
    }
}

fn default_properties(device: &str) -> HashMap<String, PropertyValue> {
    HashMap::from([
        ("CameraName".to_string(), PropertyValue::from(device)),
        ("Exposure".to_string(), PropertyValue::Float(10.0)),
        ("Binning".to_string(), PropertyValue::Integer(1)),
        ("PixelType".to_string(), PropertyValue::from("16bit")),
        ("TriggerMode".to_string(), PropertyValue::from("Off")),
        ("TriggerSource".to_string(), PropertyValue::from("Software")),
        ("Trigger".to_string(), PropertyValue::from("internal")),
    ])
}

impl DeviceBridge for SimulatedBridge {
    fn set_adapter_search_paths(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.search_paths = paths.to_vec();
        Ok(())
    }

    fn load_configuration(&mut self, path: &Path) -> Result<()> {
        tracing::debug!("Simulated bridge loading {}", path.display());
        self.config_path = Some(path.to_path_buf());
        Ok(())
    }

    fn set_property(&mut self, device: &str, key: &str, value: &PropertyValue) -> Result<()> {
        self.check_device(device)?;
        if READ_ONLY.contains(&key) {
            bail!("property {key:?} is read-only");
        }
        let slot = self
            .properties
            .get_mut(key)
            .with_context(|| format!("device {device:?} has no property {key:?}"))?;
        if key == "Exposure" && value.as_f64().map_or(true, |v| v < 0.0) {
            bail!("exposure must be a non-negative number, got {value}");
        }
        *slot = value.clone();
        Ok(())
    }

    fn get_property(&self, device: &str, key: &str) -> Result<PropertyValue> {
        self.check_device(device)?;
        self.properties
            .get(key)
            .cloned()
            .with_context(|| format!("device {device:?} has no property {key:?}"))
    }

    fn start_continuous_acquisition(&mut self, _interval_ms: f64) -> Result<()> {
        self.check_loaded()?;
        if self.stream.is_some() {
            bail!("sequence acquisition already running");
        }
        self.stream = Some(Stream {
            started: Instant::now(),
            popped: 0,
        });
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    fn pending_frame_count(&self) -> Result<usize> {
        let Some(stream) = &self.stream else {
            return Ok(0);
        };
        let produced = if self.frame_interval.is_zero() {
            stream.popped + 1
        } else {
            (stream.started.elapsed().as_nanos() / self.frame_interval.as_nanos()) as usize
        };
        let produced = self.frame_limit.map_or(produced, |limit| produced.min(limit));
        Ok(produced.saturating_sub(stream.popped))
    }

    fn pop_next_frame(&mut self) -> Result<RawFrame> {
        if self.pending_frame_count()? == 0 {
            bail!("circular buffer is empty");
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.popped += 1;
        }
        Ok(self.next_frame())
    }

    fn snap_image(&mut self) -> Result<RawFrame> {
        self.check_loaded()?;
        if self.stream.is_some() {
            bail!("cannot snap while a sequence acquisition is running");
        }
        Ok(self.next_frame())
    }

    fn reset(&mut self) -> Result<()> {
        self.stream = None;
        self.properties = default_properties(&self.device);
        Ok(())
    }
}

mod simulated;
pub mod types;
#[cfg(feature = "webcam")]
mod webcam;

pub use simulated::SimulatedBridge;
pub use types::{PropertyValue, RawFrame};
#[cfg(feature = "webcam")]
pub use webcam::WebcamBridge;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Trait for device bridges
///
/// A bridge owns the hardware: device enumeration, triggering and the frame
/// queue. The acquisition loop only ever polls `pending_frame_count` and
/// dequeues with `pop_next_frame`; it never assumes either call blocks.
pub trait DeviceBridge {
    /// Directories searched for driver adapters
    fn set_adapter_search_paths(&mut self, paths: &[PathBuf]) -> Result<()> {
        let _ = paths;
        Ok(())
    }

    /// Load the driver-specific system configuration
    fn load_configuration(&mut self, path: &Path) -> Result<()>;

    fn set_property(&mut self, device: &str, key: &str, value: &PropertyValue) -> Result<()>;

    fn get_property(&self, device: &str, key: &str) -> Result<PropertyValue>;

    /// Begin streaming into the bridge's frame queue
    fn start_continuous_acquisition(&mut self, interval_ms: f64) -> Result<()>;

    fn stop_acquisition(&mut self) -> Result<()>;

    /// Number of frames waiting in the queue
    fn pending_frame_count(&self) -> Result<usize>;

    /// Dequeue the oldest waiting frame
    fn pop_next_frame(&mut self) -> Result<RawFrame>;

    /// Capture a single frame outside of a streaming session
    fn snap_image(&mut self) -> Result<RawFrame>;

    /// Return the device to its power-on state
    fn reset(&mut self) -> Result<()>;
}

//! Acquire, display and save frames from cameras behind a device bridge.
//!
//! ```text
//! CameraConfig ──► Camera::connect(bridge) ──► snap_video / continuous_stream
//!                                                  │
//!                        DisplaySink ◄── Viewer ◄──┤
//!                                                  ▼
//!                                   Session ──► storage::save_video
//! ```

pub mod acquisition;
pub mod bridge;
pub mod config;
pub mod error;
pub mod output;
pub mod processing;
pub mod storage;

pub use acquisition::{AcquisitionMode, AcquisitionSettings, Camera, Session, StopFlag};
pub use bridge::{DeviceBridge, PropertyValue, SimulatedBridge};
pub use config::CameraConfig;
pub use error::CameraError;

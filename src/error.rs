use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the camera controller
///
/// Bridge, display and artifact implementations report `anyhow::Error`; the
/// controller wraps them here together with the device and key involved.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("config file {path:?} not found")]
    ConfigNotFound { path: PathBuf },

    #[error("failed to read config file {path:?}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path:?}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("failed to initialise device bridge for {device:?}")]
    DeviceInit {
        device: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to set property {key:?} to {value:?} on {device:?}")]
    PropertySet {
        device: String,
        key: String,
        value: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read property {key:?} from {device:?}")]
    PropertyGet {
        device: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("frame retrieval failed")]
    FrameRetrieval(#[source] anyhow::Error),

    #[error("frame has {ndim} dimensions, expected 2 or 3")]
    InvalidFrame { ndim: usize },

    #[error("no frame arrived from {device:?} within {timeout:?}")]
    Starved { device: String, timeout: Duration },

    #[error("device bridge failed to {action}")]
    Acquisition {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid acquisition mode {0:?}")]
    InvalidMode(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("display sink failed")]
    Display(#[source] anyhow::Error),

    #[error("no frames to save")]
    EmptyVideo,

    #[error("frame {index} has shape {found:?}, expected {expected:?}")]
    FrameShape {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("failed to write {path:?}")]
    Persist {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to register artifact {name:?}")]
    Artifact {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = CameraError> = std::result::Result<T, E>;

mod pool;
mod preview;

pub use pool::{collapse_channels, downscale_local_mean};
pub use preview::{clip_percentiles, normalize_to_u8, side_by_side, ClipRange};

use ndarray::Array2;

/// Single-channel image, row-major `(height, width)`
pub type Frame = Array2<f32>;

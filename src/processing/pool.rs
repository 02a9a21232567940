use super::Frame;
use crate::bridge::RawFrame;
use crate::error::{CameraError, Result};
use ndarray::{s, Array2, Axis, Ix2};

/// Reduce a raw frame to a single channel
///
/// 2-D frames pass through; 3-D frames are averaged across the last axis.
pub fn collapse_channels(raw: &RawFrame) -> Result<Frame> {
    let samples = raw.mapv(f32::from);
    match samples.ndim() {
        2 => samples
            .into_dimensionality::<Ix2>()
            .map_err(|_| CameraError::InvalidFrame { ndim: 2 }),
        3 => samples
            .mean_axis(Axis(2))
            .ok_or(CameraError::InvalidFrame { ndim: 3 })?
            .into_dimensionality::<Ix2>()
            .map_err(|_| CameraError::InvalidFrame { ndim: 3 }),
        ndim => Err(CameraError::InvalidFrame { ndim }),
    }
}

/// Local-mean pooling over `factor` x `factor` blocks
///
/// Output shape is `(ceil(h / factor), ceil(w / factor))`. Edge blocks are
/// zero-padded, so padded cells pull the edge means down rather than being
/// excluded.
pub fn downscale_local_mean(frame: &Frame, factor: usize) -> Frame {
    let _span = tracing::debug_span!("downscale").entered();

    let factor = factor.max(1);
    if factor == 1 {
        return frame.clone();
    }

    let (height, width) = frame.dim();
    let area = (factor * factor) as f64;

    Array2::from_shape_fn(
        (height.div_ceil(factor), width.div_ceil(factor)),
        |(row, col)| {
            let rows = row * factor..((row + 1) * factor).min(height);
            let cols = col * factor..((col + 1) * factor).min(width);
            let sum: f64 = frame
                .slice(s![rows, cols])
                .iter()
                .map(|&v| f64::from(v))
                .sum();
            (sum / area) as f32
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    #[test]
    fn grayscale_frames_pass_through() {
        let raw = Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as u16).into_dyn();
        let frame = collapse_channels(&raw).unwrap();
        assert_eq!(frame, arr2(&[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]));
    }

    #[test]
    fn colour_frames_average_the_channel_axis() {
        let raw = Array3::from_shape_fn((1, 2, 3), |(_, c, ch)| (c * 10 + ch * 3) as u16).into_dyn();
        let frame = collapse_channels(&raw).unwrap();
        assert_eq!(frame, arr2(&[[3.0, 13.0]]));
    }

    #[test]
    fn one_dimensional_frames_are_rejected() {
        let raw = ndarray::Array1::<u16>::zeros(4).into_dyn();
        assert!(matches!(
            collapse_channels(&raw),
            Err(CameraError::InvalidFrame { ndim: 1 })
        ));
    }

    #[test]
    fn output_shape_rounds_up() {
        let frame = Frame::ones((100, 100));
        assert_eq!(downscale_local_mean(&frame, 3).dim(), (34, 34));

        let frame = Frame::ones((7, 4));
        assert_eq!(downscale_local_mean(&frame, 2).dim(), (4, 2));
    }

    #[test]
    fn averages_blocks_with_zero_padding() {
        let frame = arr2(&[
            [1.0, 3.0, 5.0],
            [1.0, 3.0, 5.0],
            [2.0, 2.0, 8.0],
        ]);
        let pooled = downscale_local_mean(&frame, 2);
        assert_eq!(pooled, arr2(&[[2.0, 2.5], [1.0, 2.0]]));
    }

    #[test]
    fn is_deterministic() {
        let frame = Frame::from_shape_fn((31, 17), |(r, c)| ((r * 13 + c * 7) % 11) as f32);
        assert_eq!(
            downscale_local_mean(&frame, 4),
            downscale_local_mean(&frame, 4)
        );
    }

    #[test]
    fn factor_one_is_identity() {
        let frame = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(downscale_local_mean(&frame, 1), frame);
    }
}

//! Display-side image preparation.
//!
//! Nothing here touches the acquisition buffers: every function takes a frame
//! by reference and returns a new image.

use super::Frame;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{concatenate, Array2, Axis};

/// Percentile window used to clip outliers before normalisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRange {
    pub low: f64,
    pub high: f64,
}

impl Default for ClipRange {
    fn default() -> Self {
        Self {
            low: 0.001,
            high: 99.99,
        }
    }
}

/// Clamp values to the `low`..`high` percentiles of the frame
///
/// The bounds may be given in either order.
pub fn clip_percentiles(frame: &Frame, range: ClipRange) -> Frame {
    let mut sorted: Vec<f32> = frame.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return frame.clone();
    }
    sorted.sort_by(f32::total_cmp);

    let a = percentile(&sorted, range.low);
    let b = percentile(&sorted, range.high);
    let (low, high) = (a.min(b), a.max(b));
    frame.mapv(|v| v.clamp(low, high))
}

/// Linear interpolation between closest ranks
fn percentile(sorted: &[f32], pct: f64) -> f32 {
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = (rank - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Min-max stretch into the full 8-bit range
///
/// A flat frame maps to black.
pub fn normalize_to_u8(frame: &Frame) -> GrayImage {
    let (min, max) = value_range(frame);
    let span = max - min;
    let (height, width) = frame.dim();

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = frame[[y as usize, x as usize]];
        let scaled = if span > 0.0 {
            ((v - min) / span * 255.0).round()
        } else {
            0.0
        };
        Luma([scaled.clamp(0.0, 255.0) as u8])
    })
}

/// Resize `frame` to the shape of `transformed` and place them side by side
pub fn side_by_side(frame: &Frame, transformed: &Frame) -> Frame {
    let (height, width) = transformed.dim();
    let resized = resize(frame, height, width);
    // Shapes match on the row axis by construction.
    concatenate(Axis(1), &[resized.view(), transformed.view()])
        .unwrap_or_else(|_| transformed.clone())
}

fn value_range(frame: &Frame) -> (f32, f32) {
    frame
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Triangle-filtered resize through `imageops`
///
/// `imageops` clamps float pixels to `0.0..=1.0`, so the frame is stretched
/// into that range for the resize and mapped back afterwards.
fn resize(frame: &Frame, height: usize, width: usize) -> Frame {
    if frame.dim() == (height, width) {
        return frame.clone();
    }
    if frame.is_empty() {
        return Array2::zeros((height, width));
    }

    let (min, max) = value_range(frame);
    let span = max - min;
    if !(span > 0.0 && span.is_finite()) {
        return Array2::from_elem((height, width), min);
    }

    let (src_h, src_w) = frame.dim();
    let unit: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(src_w as u32, src_h as u32, |x, y| {
            Luma([(frame[[y as usize, x as usize]] - min) / span])
        });
    let resized = imageops::resize(&unit, width as u32, height as u32, FilterType::Triangle);

    Array2::from_shape_fn((height, width), |(row, col)| {
        resized.get_pixel(col as u32, row as u32)[0] * span + min
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn normalizes_to_full_range() {
        let frame = arr2(&[[10.0, 20.0], [30.0, 50.0]]);
        let image = normalize_to_u8(&frame);
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(1, 1)[0], 255);
        assert_eq!(image.get_pixel(0, 1)[0], 128);
    }

    #[test]
    fn flat_frames_normalize_to_black() {
        let image = normalize_to_u8(&Frame::from_elem((3, 2), 7.0));
        assert!(image.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn clipping_tames_outliers() {
        let mut frame = Frame::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f32);
        frame[[9, 9]] = 1.0e6;
        let clipped = clip_percentiles(&frame, ClipRange { low: 0.0, high: 98.0 });

        assert!(clipped[[9, 9]] < 1.0e6);
        assert_eq!(clipped[[0, 0]], 0.0);
        assert_eq!(clipped[[5, 5]], 55.0);
    }

    #[test]
    fn clipping_does_not_modify_the_source() {
        let frame = arr2(&[[0.0, 100.0]]);
        let _ = clip_percentiles(&frame, ClipRange { low: 10.0, high: 90.0 });
        assert_eq!(frame, arr2(&[[0.0, 100.0]]));
    }

    #[test]
    fn reversed_clip_bounds_are_reordered() {
        let frame = Frame::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32);
        let clipped = clip_percentiles(&frame, ClipRange { low: 90.0, high: 10.0 });
        let expected = clip_percentiles(&frame, ClipRange { low: 10.0, high: 90.0 });
        assert_eq!(clipped, expected);
        assert_eq!(clipped[[0, 0]], 1.5);
        assert_eq!(clipped[[3, 3]], 13.5);
    }

    #[test]
    fn resize_keeps_values_outside_the_unit_range() {
        let frame = arr2(&[[0.0, 4000.0]]);
        let wide = resize(&frame, 1, 4);
        assert_eq!(wide.dim(), (1, 4));
        assert!(wide[[0, 0]].abs() < 1e-2);
        assert!((wide[[0, 3]] - 4000.0).abs() < 1e-2);
        assert!(wide[[0, 1]] > 0.0 && wide[[0, 1]] < wide[[0, 2]]);
    }

    #[test]
    fn resizing_a_flat_frame_stays_flat() {
        let wide = resize(&Frame::from_elem((2, 2), -3.0), 4, 4);
        assert!(wide.iter().all(|&v| v == -3.0));
    }

    #[test]
    fn side_by_side_matches_transformed_height() {
        let frame = Frame::ones((8, 8));
        let transformed = Frame::zeros((4, 4));
        let combined = side_by_side(&frame, &transformed);
        assert_eq!(combined.dim(), (4, 8));
        assert!((combined[[2, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(combined[[2, 6]], 0.0);
    }
}

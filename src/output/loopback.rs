use super::DisplaySink;
use anyhow::{ensure, Context, Result};
use image::{imageops, GrayImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Live view through a v4l2loopback device
///
/// Any V4L viewer opened on the loopback device shows the stream.
pub struct LoopbackDisplay {
    file: File,
    width: u32,
    height: u32,
}

impl LoopbackDisplay {
    /// YUYV packs two pixels per macropixel, so `width` must be even
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        ensure!(
            width > 0 && height > 0 && width % 2 == 0,
            "v4l2loopback YUYV output needs a non-empty frame with even width, got {}x{}",
            width,
            height
        );
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
        })
    }

    /// Pack a grayscale frame of even width as YUYV with neutral chroma
    fn gray_to_yuyv(frame: &GrayImage) -> Vec<u8> {
        let (width, height) = frame.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for row in frame.as_raw().chunks_exact(width as usize) {
            // YUYV format: Y0 U Y1 V
            for pair in row.chunks_exact(2) {
                yuyv.extend_from_slice(&[pair[0], 128, pair[1], 128]);
            }
        }

        yuyv
    }
}

impl DisplaySink for LoopbackDisplay {
    fn show(&mut self, frame: &GrayImage) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = imageops::resize(
                frame,
                self.width,
                self.height,
                imageops::FilterType::Lanczos3,
            );
            &resized
        } else {
            frame
        };

        self.file
            .write_all(&Self::gray_to_yuyv(frame))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush().context("Failed to flush v4l2loopback device")?;
        tracing::info!("v4l2loopback display closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_carries_luma_with_neutral_chroma() {
        let frame = GrayImage::from_raw(4, 1, vec![10, 20, 30, 40]).unwrap();
        assert_eq!(
            LoopbackDisplay::gray_to_yuyv(&frame),
            vec![10, 128, 20, 128, 30, 128, 40, 128]
        );
    }

    #[test]
    fn odd_widths_are_rejected() {
        let device = tempfile::NamedTempFile::new().unwrap();
        assert!(LoopbackDisplay::new(device.path(), 3, 2).is_err());
        assert!(LoopbackDisplay::new(device.path(), 0, 2).is_err());
    }

    #[test]
    fn each_frame_is_two_bytes_per_pixel() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let mut display = LoopbackDisplay::new(device.path(), 6, 3).unwrap();
        display.show(&GrayImage::new(6, 3)).unwrap();
        display.show(&GrayImage::new(5, 3)).unwrap();
        display.close().unwrap();

        let written = std::fs::read(device.path()).unwrap();
        assert_eq!(written.len(), 2 * 6 * 3 * 2);
    }

    #[test]
    fn writes_resized_frames_to_the_device_file() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let mut display = LoopbackDisplay::new(device.path(), 4, 2).unwrap();
        display.show(&GrayImage::new(8, 4)).unwrap();
        display.close().unwrap();

        let written = std::fs::read(device.path()).unwrap();
        assert_eq!(written.len(), 4 * 2 * 2);
    }
}

use super::{DeviceBridge, PropertyValue, RawFrame};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::Array3;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::path::Path;

/// V4L webcam exposed through the device bridge contract
///
/// nokhwa blocks inside `frame()` until the sensor delivers, so a running
/// stream always reports one frame ready.
pub struct WebcamBridge {
    device: String,
    index: u32,
    camera: Option<Camera>,
    streaming: bool,
}

impl WebcamBridge {
    pub fn new(device: impl Into<String>, index: u32) -> Self {
        Self {
            device: device.into(),
            index,
            camera: None,
            streaming: false,
        }
    }

    fn camera(&self, device: &str) -> Result<&Camera> {
        if device != self.device {
            bail!("no device with label {device:?}");
        }
        self.camera.as_ref().context("webcam is not open")
    }

    fn camera_mut(&mut self) -> Result<&mut Camera> {
        self.camera.as_mut().context("webcam is not open")
    }

    fn grab(&mut self) -> Result<RawFrame> {
        let frame = self
            .camera_mut()?
            .frame()
            .context("Failed to capture frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;
        rgb_to_raw(&decoded)
    }
}

fn rgb_to_raw(image: &RgbImage) -> Result<RawFrame> {
    let (width, height) = image.dimensions();
    let samples: Vec<u16> = image.as_raw().iter().map(|&v| u16::from(v)).collect();
    let frame = Array3::from_shape_vec((height as usize, width as usize, 3), samples)
        .context("RGB buffer does not match its dimensions")?;
    Ok(frame.into_dyn())
}

impl DeviceBridge for WebcamBridge {
    fn load_configuration(&mut self, path: &Path) -> Result<()> {
        tracing::info!(
            "Opening webcam {} for {} ({})",
            self.index,
            self.device,
            path.display()
        );
        let index = CameraIndex::Index(self.index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let camera = Camera::new(index, requested).context("Failed to open camera")?;
        self.camera = Some(camera);
        Ok(())
    }

    fn set_property(&mut self, device: &str, key: &str, value: &PropertyValue) -> Result<()> {
        self.camera(device)?;
        match key {
            "FrameRate" => {
                let fps = value
                    .as_f64()
                    .with_context(|| format!("frame rate must be numeric, got {value}"))?;
                self.camera_mut()?
                    .set_frame_rate(fps.round() as u32)
                    .context("Failed to set frame rate")?;
                Ok(())
            }
            _ => bail!("webcam does not support setting {key:?}"),
        }
    }

    fn get_property(&self, device: &str, key: &str) -> Result<PropertyValue> {
        let camera = self.camera(device)?;
        match key {
            "FrameRate" => Ok(PropertyValue::Integer(i64::from(camera.frame_rate()))),
            "Resolution" => {
                let resolution = camera.resolution();
                Ok(format!("{}x{}", resolution.width(), resolution.height()).into())
            }
            "CameraName" => Ok(camera.info().human_name().into()),
            _ => bail!("webcam has no property {key:?}"),
        }
    }

    fn start_continuous_acquisition(&mut self, _interval_ms: f64) -> Result<()> {
        self.camera_mut()?
            .open_stream()
            .context("Failed to open camera stream")?;
        self.streaming = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        if self.streaming {
            self.camera_mut()?
                .stop_stream()
                .context("Failed to stop camera stream")?;
            self.streaming = false;
        }
        Ok(())
    }

    fn pending_frame_count(&self) -> Result<usize> {
        Ok(usize::from(self.streaming))
    }

    fn pop_next_frame(&mut self) -> Result<RawFrame> {
        if !self.streaming {
            bail!("webcam stream is not running");
        }
        self.grab()
    }

    fn snap_image(&mut self) -> Result<RawFrame> {
        if self.streaming {
            return self.grab();
        }
        self.camera_mut()?
            .open_stream()
            .context("Failed to open camera stream")?;
        let frame = self.grab();
        self.camera_mut()?
            .stop_stream()
            .context("Failed to stop camera stream")?;
        frame
    }

    fn reset(&mut self) -> Result<()> {
        self.stop_acquisition()?;
        self.camera = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_frames_keep_channel_axis_last() {
        let image = RgbImage::from_fn(4, 2, |x, y| image::Rgb([x as u8, y as u8, 9]));
        let raw = rgb_to_raw(&image).unwrap();
        assert_eq!(raw.shape(), &[2, 4, 3]);
        let raw = raw.into_dimensionality::<ndarray::Ix3>().unwrap();
        assert_eq!(raw[[1, 3, 0]], 3);
        assert_eq!(raw[[1, 3, 1]], 1);
        assert_eq!(raw[[1, 3, 2]], 9);
    }
}

use super::DisplaySink;
use anyhow::{Context, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};

/// Keeps the latest frame as a PNG file
///
/// Each frame is written beside the target and renamed over it, so an image
/// viewer watching the file never reads a partial write.
pub struct SnapshotDisplay {
    path: PathBuf,
    staging: PathBuf,
    frames: u64,
}

impl SnapshotDisplay {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let staging = path.with_extension("partial.png");
        tracing::info!("Preview frames go to {}", path.display());
        Self {
            path,
            staging,
            frames: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames
    }
}

impl DisplaySink for SnapshotDisplay {
    fn show(&mut self, frame: &GrayImage) -> Result<()> {
        frame
            .save_with_format(&self.staging, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write preview {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("Failed to publish preview {}", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        tracing::debug!("Preview closed after {} frames", self.frames);
        Ok(())
    }
}

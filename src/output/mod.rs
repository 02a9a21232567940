mod loopback;
mod snapshot;

pub use loopback::LoopbackDisplay;
pub use snapshot::SnapshotDisplay;

use crate::processing::{clip_percentiles, normalize_to_u8, side_by_side, ClipRange, Frame};
use anyhow::Result;
use image::GrayImage;
use std::borrow::Cow;

/// Trait for display destinations
pub trait DisplaySink {
    /// Show an 8-bit normalised frame
    fn show(&mut self, frame: &GrayImage) -> Result<()>;

    /// Release the display; called once when a session ends
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Caller-supplied image transform shown next to the live frame
pub type FrameTransform<'a> = Box<dyn FnMut(&Frame) -> Frame + Send + 'a>;

/// A display sink plus the preparation applied before each frame is shown
pub struct Viewer<'a> {
    sink: &'a mut dyn DisplaySink,
    transform: Option<FrameTransform<'a>>,
}

impl<'a> Viewer<'a> {
    pub fn new(sink: &'a mut dyn DisplaySink) -> Self {
        Self {
            sink,
            transform: None,
        }
    }

    /// Show `transform(frame)` to the right of the (resized) live frame
    pub fn with_transform(mut self, transform: FrameTransform<'a>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Prepare and show one frame
    ///
    /// Works on copies; `frame` itself is never modified.
    pub fn render(&mut self, frame: &Frame, clip: Option<ClipRange>) -> Result<()> {
        let base = match clip {
            Some(range) => Cow::Owned(clip_percentiles(frame, range)),
            None => Cow::Borrowed(frame),
        };

        let shown = match self.transform.as_mut() {
            Some(transform) => {
                let transformed = transform(&*base);
                Cow::Owned(side_by_side(&base, &transformed))
            }
            None => base,
        };

        self.sink.show(&normalize_to_u8(&shown))
    }

    pub fn close(&mut self) -> Result<()> {
        self.sink.close()
    }
}

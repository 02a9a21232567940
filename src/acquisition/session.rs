use crate::processing::{ClipRange, Frame};
use chrono::Utc;
use std::time::{Duration, Instant};

/// Frames and capture times of one acquisition run
///
/// Both buffers only grow through [`Session::push`], so they always have the
/// same length.
#[derive(Debug, Clone, Default)]
pub struct Session {
    frames: Vec<Frame>,
    timestamps: Vec<f64>,
}

impl Session {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Capture instants in seconds since the Unix epoch
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn push(&mut self, frame: Frame, timestamp: f64) {
        self.frames.push(frame);
        self.timestamps.push(timestamp);
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
        self.timestamps.clear();
    }
}

/// Wall-clock timestamps that never step backwards within a session
///
/// The epoch offset is read once; later readings add monotonic elapsed time.
pub(crate) struct SessionClock {
    origin: Instant,
    origin_secs: f64,
}

impl SessionClock {
    pub(crate) fn start() -> Self {
        Self {
            origin: Instant::now(),
            origin_secs: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
        }
    }

    pub(crate) fn now(&self) -> f64 {
        self.origin_secs + self.origin.elapsed().as_secs_f64()
    }
}

/// When the polling loop ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Run until the quit signal is raised
    Unbounded,
    /// Stop once this many frames were retrieved
    Count(usize),
}

impl TerminationPolicy {
    pub fn is_bounded(self) -> bool {
        matches!(self, Self::Count(_))
    }

    /// Bounded captures show outlier-clipped frames
    pub(crate) fn display_clip(self) -> Option<ClipRange> {
        self.is_bounded().then(ClipRange::default)
    }

    pub(crate) fn reached(self, retrieved: usize) -> bool {
        matches!(self, Self::Count(limit) if retrieved >= limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuitSignal,
    FrameCount,
}

/// Summary of a finished session
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub frames: usize,
    pub stop: StopReason,
    pub elapsed: Duration,
}

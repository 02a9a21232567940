//! Writing finished sessions to disk.
//!
//! A session becomes two files: `video.tiff`, a multi-page grayscale stack
//! with one 32-bit float page per frame, and `video_timing.csv` with one row
//! per frame. Both keep capture order.

mod manifest;

pub use manifest::{Artifact, ManifestLogger};

use crate::acquisition::Session;
use crate::error::{CameraError, Result};
use anyhow::Context;
use ndarray::{Array1, Array3, Axis};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};

pub const VIDEO_FILE: &str = "video.tiff";
pub const TIMING_FILE: &str = "video_timing.csv";

/// Trait for experiment loggers that track output files
pub trait ArtifactLogger {
    fn add_artifact(&mut self, path: &Path, name: &str) -> anyhow::Result<()>;
}

/// Files written by [`save_video`] and the buffers they hold
#[derive(Debug, Clone)]
pub struct SavedVideo {
    pub video_path: PathBuf,
    pub timing_path: PathBuf,
    /// Frames stacked as `(frame, row, column)`
    pub frames: Array3<f32>,
    pub timestamps: Array1<f64>,
}

/// Persist a session into `dir`, creating the directory if needed
///
/// The buffers are validated before anything is written: an empty session
/// or frames of differing shape produce an error and no files.
pub fn save_video(
    dir: &Path,
    session: &Session,
    logger: Option<&mut dyn ArtifactLogger>,
) -> Result<SavedVideo> {
    let _span = tracing::info_span!("save_video", dir = %dir.display()).entered();

    let frames = stack_frames(session)?;
    let timestamps = Array1::from(session.timestamps().to_vec());

    std::fs::create_dir_all(dir).map_err(|e| CameraError::Persist {
        path: dir.to_path_buf(),
        source: e.into(),
    })?;

    let video_path = dir.join(VIDEO_FILE);
    write_stack(&video_path, &frames).map_err(|source| CameraError::Persist {
        path: video_path.clone(),
        source,
    })?;

    let timing_path = dir.join(TIMING_FILE);
    write_timing(&timing_path, session.timestamps()).map_err(|source| CameraError::Persist {
        path: timing_path.clone(),
        source,
    })?;

    tracing::info!(
        "Saved {} frames to {} and {}",
        frames.len_of(Axis(0)),
        video_path.display(),
        timing_path.display()
    );

    if let Some(logger) = logger {
        for (path, name) in [(&video_path, VIDEO_FILE), (&timing_path, TIMING_FILE)] {
            logger
                .add_artifact(path, name)
                .map_err(|source| CameraError::Artifact {
                    name: name.to_string(),
                    source,
                })?;
        }
    }

    Ok(SavedVideo {
        video_path,
        timing_path,
        frames,
        timestamps,
    })
}

fn stack_frames(session: &Session) -> Result<Array3<f32>> {
    let frames = session.frames();
    let first = frames.first().ok_or(CameraError::EmptyVideo)?;
    let expected = first.dim();

    if let Some((index, frame)) = frames
        .iter()
        .enumerate()
        .find(|(_, frame)| frame.dim() != expected)
    {
        return Err(CameraError::FrameShape {
            index,
            expected,
            found: frame.dim(),
        });
    }

    let (height, width) = expected;
    Ok(Array3::from_shape_fn(
        (frames.len(), height, width),
        |(index, row, col)| frames[index][[row, col]],
    ))
}

fn write_stack(path: &Path, frames: &Array3<f32>) -> anyhow::Result<()> {
    let file = File::create(path).context("Failed to create TIFF file")?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).context("Failed to start TIFF")?;
    let (_, height, width) = frames.dim();

    for (index, page) in frames.axis_iter(Axis(0)).enumerate() {
        let samples: Vec<f32> = page.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray32Float>(width as u32, height as u32, &samples)
            .with_context(|| format!("Failed to write TIFF page {index}"))?;
    }
    Ok(())
}

fn write_timing(path: &Path, timestamps: &[f64]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path).context("Failed to create CSV file")?;
    writer
        .write_record(["frame", "timestamp"])
        .context("Failed to write CSV header")?;
    for (index, timestamp) in timestamps.iter().enumerate() {
        writer
            .write_record([index.to_string(), timestamp.to_string()])
            .context("Failed to write timestamp row")?;
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Frame;

    fn session(frames: Vec<Frame>) -> Session {
        let mut session = Session::default();
        for (i, frame) in frames.into_iter().enumerate() {
            session.push(frame, 1_700_000_000.0 + i as f64 * 0.25);
        }
        session
    }

    #[derive(Default)]
    struct Recorder(Vec<(PathBuf, String)>);

    impl ArtifactLogger for Recorder {
        fn add_artifact(&mut self, path: &Path, name: &str) -> anyhow::Result<()> {
            self.0.push((path.to_path_buf(), name.to_string()));
            Ok(())
        }
    }

    #[test]
    fn empty_session_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_video(dir.path(), &Session::default(), None).unwrap_err();
        assert!(matches!(err, CameraError::EmptyVideo));
        assert!(!dir.path().join(VIDEO_FILE).exists());
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(vec![Frame::zeros((2, 2)), Frame::zeros((3, 2))]);
        let err = save_video(dir.path(), &session, None).unwrap_err();
        assert!(matches!(err, CameraError::FrameShape { index: 1, .. }));
    }

    #[test]
    fn returns_buffers_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            Frame::from_elem((2, 3), 1.5),
            Frame::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f32),
        ];
        let session = session(frames.clone());
        let saved = save_video(dir.path(), &session, None).unwrap();

        assert_eq!(saved.frames.dim(), (2, 2, 3));
        assert_eq!(saved.frames.index_axis(Axis(0), 1), frames[1]);
        assert_eq!(saved.timestamps.to_vec(), session.timestamps().to_vec());
    }

    #[test]
    fn registers_both_artifacts_under_their_own_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::default();
        let saved = save_video(
            &dir.path().join("run-1"),
            &session(vec![Frame::zeros((2, 2))]),
            Some(&mut recorder),
        )
        .unwrap();

        assert_eq!(
            recorder.0,
            vec![
                (saved.video_path.clone(), VIDEO_FILE.to_string()),
                (saved.timing_path.clone(), TIMING_FILE.to_string()),
            ]
        );
        assert!(saved.timing_path.exists());
    }

    #[test]
    fn sub_microsecond_timestamps_read_back_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::default();
        let base = 1_700_000_000.25_f64;
        for step in 0..3 {
            session.push(Frame::zeros((1, 1)), base + f64::from(step) * 4.0e-7);
        }
        let saved = save_video(dir.path(), &session, None).unwrap();

        let mut reader = csv::Reader::from_path(&saved.timing_path).unwrap();
        let read: Vec<f64> = reader
            .records()
            .map(|r| r.unwrap()[1].parse().unwrap())
            .collect();
        assert_eq!(read, session.timestamps().to_vec());
        assert!(read.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn timing_table_has_one_row_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(vec![Frame::zeros((1, 1)); 3]);
        let saved = save_video(dir.path(), &session, None).unwrap();

        let mut reader = csv::Reader::from_path(&saved.timing_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["frame", "timestamp"]);

        let rows: Vec<(usize, f64)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].parse().unwrap(), r[1].parse().unwrap())
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                (0, 1_700_000_000.0),
                (1, 1_700_000_000.25),
                (2, 1_700_000_000.5)
            ]
        );
    }
}

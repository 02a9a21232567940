use super::{AcquisitionMode, Camera, SessionReport, StopFlag};
use crate::bridge::DeviceBridge;
use crate::error::Result;
use crate::output::{DisplaySink, FrameTransform, Viewer};
use std::thread::{self, JoinHandle};

/// Run one session on a dedicated thread
///
/// The camera moves onto the worker and comes back through the join handle
/// together with the session result, so the caller can save or reuse it.
/// Raise `quit` from any thread to end the session.
pub fn spawn_session<B>(
    mut camera: Camera<B>,
    mode: AcquisitionMode,
    mut display: Option<Box<dyn DisplaySink + Send>>,
    transform: Option<FrameTransform<'static>>,
    mut quit: StopFlag,
) -> std::io::Result<JoinHandle<(Camera<B>, Result<SessionReport>)>>
where
    B: DeviceBridge + Send + 'static,
{
    thread::Builder::new()
        .name(format!("acquire-{}", camera.name()))
        .spawn(move || {
            let viewer = display.as_deref_mut().map(|sink| {
                let viewer = Viewer::new(sink);
                match transform {
                    Some(transform) => viewer.with_transform(transform),
                    None => viewer,
                }
            });
            let result = camera.run(mode, viewer, &mut quit);
            (camera, result)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AcquisitionSettings, StopReason};
    use crate::bridge::SimulatedBridge;
    use crate::config::CameraConfig;
    use std::path::PathBuf;
    use std::time::Duration;

    fn camera() -> Camera<SimulatedBridge> {
        let config = CameraConfig {
            name: "Worker".into(),
            driver_config: PathBuf::from("demo.cfg"),
            properties: Vec::new(),
        };
        let bridge = SimulatedBridge::new("Worker", 16, 16)
            .with_frame_interval(Duration::from_millis(2));
        Camera::connect(&config, bridge, AcquisitionSettings::default()).unwrap()
    }

    #[test]
    fn bounded_session_returns_the_camera() {
        let handle = spawn_session(
            camera(),
            AcquisitionMode::SnapVideo { frames: 4 },
            None,
            None,
            StopFlag::new(),
        )
        .unwrap();

        let (camera, result) = handle.join().unwrap();
        let report = result.unwrap();
        assert_eq!(report.frames, 4);
        assert_eq!(camera.session().len(), 4);
    }

    #[test]
    fn stream_stops_when_flag_is_raised() {
        let quit = StopFlag::new();
        let handle = spawn_session(
            camera(),
            AcquisitionMode::ContinuousStream,
            None,
            None,
            quit.clone(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        quit.raise();

        let (camera, result) = handle.join().unwrap();
        assert_eq!(result.unwrap().stop, StopReason::QuitSignal);
        assert!(!camera.bridge().is_streaming());
    }
}

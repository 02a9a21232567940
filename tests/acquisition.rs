use camctl::acquisition::{AcquisitionMode, AcquisitionSettings, Camera, StopFlag, StopReason};
use camctl::bridge::{PropertyValue, SimulatedBridge};
use camctl::config::CameraConfig;
use camctl::error::CameraError;
use camctl::storage::{ArtifactLogger, ManifestLogger, TIMING_FILE, VIDEO_FILE};
use ndarray::Axis;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tiff::decoder::{Decoder, DecodingResult};

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("camera.json");
    std::fs::write(&path, body).unwrap();
    path
}

fn connect(dir: &Path) -> Camera<SimulatedBridge> {
    let path = write_config(
        dir,
        r#"{"name": "CamA", "MMconfig": "cfg.json", "Exposure": 5.0}"#,
    );
    let config = CameraConfig::load(&path).unwrap();
    let bridge =
        SimulatedBridge::new(&config.name, 100, 100).with_frame_interval(Duration::from_millis(2));
    Camera::connect(&config, bridge, AcquisitionSettings::default()).unwrap()
}

#[test]
fn snap_video_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = connect(dir.path());
    assert_eq!(camera.get_param("Exposure").unwrap(), PropertyValue::Float(5.0));

    let report = camera
        .run(AcquisitionMode::SnapVideo { frames: 5 }, None, &mut StopFlag::new())
        .unwrap();

    assert_eq!(report.frames, 5);
    assert_eq!(report.stop, StopReason::FrameCount);
    assert_eq!(camera.session().len(), 5);
    for frame in camera.session().frames() {
        assert_eq!(frame.dim(), (34, 34));
    }
    assert!(camera
        .session()
        .timestamps()
        .windows(2)
        .all(|pair| pair[0] < pair[1]));
    assert!(!camera.bridge().is_streaming());
}

#[test]
fn missing_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = CameraConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, CameraError::ConfigNotFound { .. }));
}

#[test]
fn rejected_config_property_fails_connect() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{"name": "CamA", "MMconfig": "cfg.json", "Gain": 3}"#,
    );
    let config = CameraConfig::load(&path).unwrap();
    let bridge = SimulatedBridge::new("CamA", 8, 8);
    let err = Camera::connect(&config, bridge, AcquisitionSettings::default()).unwrap_err();
    assert!(matches!(err, CameraError::PropertySet { ref key, .. } if key == "Gain"));
}

#[test]
fn saved_video_reads_back_in_capture_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = connect(dir.path());
    camera
        .snap_video(4, None, &mut StopFlag::new())
        .unwrap();

    let out = dir.path().join("out");
    let manifest_path = dir.path().join("artifacts.json");
    let mut manifest = ManifestLogger::open(&manifest_path).unwrap();
    let saved = camera
        .save_video(&out, Some(&mut manifest as &mut dyn ArtifactLogger))
        .unwrap();
    assert_eq!(saved.video_path, out.join(VIDEO_FILE));
    assert_eq!(saved.timing_path, out.join(TIMING_FILE));

    let mut decoder = Decoder::new(File::open(&saved.video_path).unwrap()).unwrap();
    let mut pages = Vec::new();
    loop {
        assert_eq!(decoder.dimensions().unwrap(), (34, 34));
        match decoder.read_image().unwrap() {
            DecodingResult::F32(samples) => pages.push(samples),
            _ => panic!("expected 32-bit float samples"),
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().unwrap();
    }

    assert_eq!(pages.len(), 4);
    for (page, frame) in pages.iter().zip(camera.session().frames()) {
        assert_eq!(page, &frame.iter().copied().collect::<Vec<f32>>());
    }
    assert_ne!(pages[0], pages[1]);
    assert_eq!(saved.frames.len_of(Axis(0)), 4);

    let reopened = ManifestLogger::open(&manifest_path).unwrap();
    let registered: Vec<_> = reopened
        .artifacts()
        .iter()
        .map(|a| (a.name.as_str(), a.path.clone()))
        .collect();
    assert_eq!(
        registered,
        vec![
            (VIDEO_FILE, saved.video_path.clone()),
            (TIMING_FILE, saved.timing_path.clone()),
        ]
    );
}

#[test]
fn stream_ends_on_quit_and_keeps_its_frames() {
    let dir = tempfile::tempdir().unwrap();
    let camera = connect(dir.path());
    let quit = StopFlag::new();
    let handle = camctl::acquisition::spawn_session(
        camera,
        AcquisitionMode::ContinuousStream,
        None,
        None,
        quit.clone(),
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(40));
    quit.raise();
    let (camera, result) = handle.join().unwrap();
    let report = result.unwrap();

    assert_eq!(report.stop, StopReason::QuitSignal);
    assert_eq!(report.frames, camera.session().len());
    assert!(!camera.bridge().is_streaming());
}

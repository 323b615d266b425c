use std::io::Cursor;

use approx::assert_relative_eq;
use marker_relay::backend::{ReplayBackend, ReplaySource};
use marker_relay::core::{
    CameraIntrinsics, CameraModel, DictionaryId, RadialTangentialDistortion, SessionConfig,
};
use marker_relay::telemetry::{MemorySink, TelemetryLog, TelemetryMessage, TelemetryPublisher};
use marker_relay::{FrameLoop, LoopExit, StopSignal};

/// Empty frame, object marker 0 at (0.1, 0, 1) m facing the camera, unknown marker 7.
const FRAMES: &str = r#"{"markers": []}
{"markers": [{"id": 0, "corners": [[345, 215], [395, 215], [395, 265], [345, 265]]}]}
{"markers": [{"id": 7, "corners": [[10, 10], [60, 10], [60, 60], [10, 60]]}]}
"#;

fn camera() -> CameraModel {
    CameraModel::new(
        CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        },
        RadialTangentialDistortion::default(),
    )
}

fn run(config: &SessionConfig, log: Option<TelemetryLog>) -> Vec<TelemetryMessage> {
    let mut source = ReplaySource::new(Cursor::new(FRAMES));
    let mut backend = ReplayBackend::new();
    let mut publisher = TelemetryPublisher::new(MemorySink::new());
    if let Some(log) = log {
        publisher = publisher.with_log(log);
    }

    let summary = FrameLoop::new(config).run(
        &mut source,
        &mut backend,
        &mut publisher,
        &StopSignal::new(),
    );
    assert_eq!(summary.exit, LoopExit::EndOfStream);
    assert_eq!(summary.frames, 3);

    let messages = publisher
        .sink()
        .messages()
        .iter()
        .map(|m| serde_json::from_str(m).expect("wire message is JSON"))
        .collect();
    let stats = publisher.finish();
    assert_eq!(stats.published, 3);
    messages
}

#[test]
fn object_with_pose_is_reported_between_non_detections() {
    let mut config = SessionConfig::new(DictionaryId::Dict4x4_50);
    config.camera = Some(camera());

    let messages = run(&config, None);
    assert_eq!(messages.len(), 3);

    assert_eq!(messages[0], TelemetryMessage::not_detected());
    assert_eq!(messages[2], TelemetryMessage::not_detected());

    let hit = messages[1];
    assert!(hit.detect);
    assert_relative_eq!(hit.pos[0], 0.1, epsilon = 1e-6);
    assert_relative_eq!(hit.pos[1], 0.0, epsilon = 1e-6);
    assert_relative_eq!(hit.pos[2], 1.0, epsilon = 1e-6);
    // axis-aligned square: the +45 offset cancels the diagonal
    assert_relative_eq!(hit.angle, 0.0, epsilon = 1e-6);
}

#[test]
fn top_mount_flips_vertical_axis_and_depth() {
    let mut config = SessionConfig::new(DictionaryId::Dict4x4_50);
    config.camera = Some(camera());
    config.camera_mounted_on_top = true;

    let hit = run(&config, None)[1];
    assert!(hit.detect);
    assert_relative_eq!(hit.pos[0], 0.1, epsilon = 1e-6);
    assert_relative_eq!(hit.pos[2], -1.0, epsilon = 1e-6);
}

#[test]
fn without_intrinsics_nothing_is_detected() {
    let config = SessionConfig::new(DictionaryId::Dict4x4_50);
    let messages = run(&config, None);
    assert_eq!(messages.len(), 3);
    assert!(messages
        .iter()
        .all(|m| *m == TelemetryMessage::not_detected()));
}

#[test]
fn log_has_header_and_one_row_per_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("relay.csv");
    let mut config = SessionConfig::new(DictionaryId::Dict4x4_50);
    config.camera = Some(camera());

    run(&config, Some(TelemetryLog::create(&path).expect("log")));

    let text = std::fs::read_to_string(&path).expect("read log");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "x, y, z, angle");
    assert_eq!(lines[1], "0, 0, 0, 0");
    assert_eq!(lines[3], "0, 0, 0, 0");

    let row: Vec<f64> = lines[2]
        .split(", ")
        .map(|v| v.parse().expect("numeric row"))
        .collect();
    assert_eq!(row.len(), 4);
    assert_relative_eq!(row[0], 0.1, epsilon = 1e-6);
    assert_relative_eq!(row[2], 1.0, epsilon = 1e-6);
}

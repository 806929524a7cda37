use serial_test::serial;
use std::path::PathBuf;
use tempfile::tempdir;
use visionflow::config::{config_path, load_config, load_config_from, Config};
use visionflow::Mode;

const MODEL_VARS: [&str; 4] = [
    "VISIONFLOW_DETECTION_MODEL",
    "VISIONFLOW_SEGMENTATION_MODEL",
    "VISIONFLOW_POSE_MODEL",
    "VISIONFLOW_MODEL_REPO",
];

fn clear_env() {
    for var in MODEL_VARS {
        std::env::remove_var(var);
    }
    std::env::remove_var("VISIONFLOW_CONFIG");
}

#[test]
#[serial]
fn config_path_uses_env_variable() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("vf.json");
    std::env::set_var("VISIONFLOW_CONFIG", &path);
    assert_eq!(config_path(), path);
    clear_env();
    assert_eq!(config_path(), PathBuf::from("visionflow.json"));
}

#[test]
#[serial]
fn missing_file_gives_defaults() {
    clear_env();
    let dir = tempdir().unwrap();
    std::env::set_var("VISIONFLOW_CONFIG", dir.path().join("absent.json"));
    let cfg = load_config();
    assert_eq!(cfg, Config::default());
    assert_eq!(cfg.models.for_mode(Mode::Pose), &PathBuf::from("models/yolo11n-pose.onnx"));
    clear_env();
}

#[test]
#[serial]
fn partial_file_keeps_other_defaults() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("vf.json");
    std::fs::write(
        &path,
        r#"{"confidence": 0.6, "models": {"segmentation": "/weights/seg.onnx"}}"#,
    )
    .unwrap();
    let cfg = load_config_from(&path);
    assert_eq!(cfg.confidence, 0.6);
    assert_eq!(cfg.iou, 0.45);
    assert_eq!(cfg.models.segmentation, PathBuf::from("/weights/seg.onnx"));
    assert_eq!(cfg.models.detection, PathBuf::from("models/yolo11n.onnx"));
}

#[test]
#[serial]
fn invalid_file_is_ignored() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("vf.json");
    std::fs::write(&path, b"{not json").unwrap();
    assert_eq!(load_config_from(&path), Config::default());
}

#[test]
#[serial]
fn env_overrides_weight_locations() {
    clear_env();
    let dir = tempdir().unwrap();
    std::env::set_var("VISIONFLOW_DETECTION_MODEL", "/opt/det.onnx");
    std::env::set_var("VISIONFLOW_POSE_MODEL", "/opt/pose.onnx");
    std::env::set_var("VISIONFLOW_MODEL_REPO", "someone/yolo-onnx");
    let cfg = load_config_from(&dir.path().join("absent.json"));
    assert_eq!(cfg.models.detection, PathBuf::from("/opt/det.onnx"));
    assert_eq!(cfg.models.pose, PathBuf::from("/opt/pose.onnx"));
    assert_eq!(cfg.models.segmentation, PathBuf::from("models/yolo11n-seg.onnx"));
    assert_eq!(cfg.model_repo.as_deref(), Some("someone/yolo-onnx"));
    clear_env();
}

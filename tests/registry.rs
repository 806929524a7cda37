mod common;

use common::CenterObjectModel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use visionflow::config::Config;
use visionflow::{Mode, ModelRegistry, PipelineError, SharedModel};

fn counting_registry() -> (ModelRegistry, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let registry = ModelRegistry::new(move |mode: Mode| -> Result<SharedModel, PipelineError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CenterObjectModel::new(mode)))
    });
    (registry, loads)
}

fn same_instance(a: &SharedModel, b: &SharedModel) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[test]
fn resolve_caches_per_mode() {
    let (registry, loads) = counting_registry();
    let first = registry.resolve(Mode::Pose).unwrap();
    let second = registry.resolve(Mode::Pose).unwrap();
    assert!(same_instance(&first, &second));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(first.mode(), Mode::Pose);
    assert!(!registry.is_loaded(Mode::Detection));
}

#[test]
fn warm_loads_every_mode_once() {
    let (registry, loads) = counting_registry();
    registry.warm().unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);
    for mode in Mode::ALL {
        assert!(registry.is_loaded(mode));
        assert_eq!(registry.resolve(mode).unwrap().mode(), mode);
    }
    registry.warm().unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[test]
fn distinct_modes_get_distinct_models() {
    let (registry, _) = counting_registry();
    let det = registry.resolve(Mode::Detection).unwrap();
    let seg = registry.resolve(Mode::Segmentation).unwrap();
    assert!(!same_instance(&det, &seg));
}

#[test]
fn load_failure_is_not_cached() {
    let registry = ModelRegistry::new(|mode: Mode| -> Result<SharedModel, PipelineError> {
        Err(PipelineError::Initialization {
            mode,
            path: "missing.onnx".into(),
            reason: "not found".into(),
        })
    });
    let err = registry.resolve(Mode::Segmentation).err().unwrap();
    assert!(matches!(err, PipelineError::Initialization { mode: Mode::Segmentation, .. }));
    assert!(!registry.is_loaded(Mode::Segmentation));
    assert!(registry.warm().is_err());
}

#[test]
fn missing_weights_without_repo_fail_initialization() {
    let dir = tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.models.detection = dir.path().join("nope.onnx");
    cfg.model_repo = None;
    let registry = ModelRegistry::from_config(&cfg);
    match registry.resolve(Mode::Detection) {
        Err(PipelineError::Initialization { mode, path, .. }) => {
            assert_eq!(mode, Mode::Detection);
            assert_eq!(path, dir.path().join("nope.onnx"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("model loaded from a missing file"),
    }
}

#[test]
fn corrupt_weights_fail_initialization() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pose.onnx");
    std::fs::write(&path, b"definitely not an onnx graph").unwrap();
    let mut cfg = Config::default();
    cfg.models.pose = path;
    let registry = ModelRegistry::from_config(&cfg);
    assert!(matches!(
        registry.resolve(Mode::Pose),
        Err(PipelineError::Initialization { mode: Mode::Pose, .. })
    ));
}

#[test]
fn invalid_input_size_fails_initialization() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("det.onnx");
    std::fs::write(&path, b"unused").unwrap();
    for input_size in [0, 100] {
        let mut cfg = Config::default();
        cfg.models.detection = path.clone();
        cfg.input_size = input_size;
        let registry = ModelRegistry::from_config(&cfg);
        match registry.resolve(Mode::Detection) {
            Err(PipelineError::Initialization { reason, .. }) => {
                assert!(reason.contains("input size"), "{reason}");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("model loaded with input size {input_size}"),
        }
    }
}

//! End-to-end pipeline runs against an in-memory store on the host backend.

use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use ndarray::Array3;
use voxform_core::error::{StageFailure, StoreError, TransformError};
use voxform_core::telemetry::{TelemetrySnapshot, TelemetrySource};
use voxform_core::{
    Affine, HostBackend, HostVolume, PipelineError, PipelineParameters, StageName,
    TransformPipeline, Volume, VolumeStore,
};

#[derive(Default)]
struct MemoryStore {
    volumes: RefCell<HashMap<PathBuf, HostVolume<String>>>,
}

impl MemoryStore {
    fn with(path: &str, volume: HostVolume<String>) -> Self {
        let store = Self::default();
        store.volumes.borrow_mut().insert(PathBuf::from(path), volume);
        store
    }

    fn get(&self, path: &str) -> Option<HostVolume<String>> {
        self.volumes.borrow().get(Path::new(path)).cloned()
    }
}

impl VolumeStore for MemoryStore {
    type Header = String;

    fn load(&self, path: &Path) -> Result<HostVolume<String>, StoreError> {
        self.volumes
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    fn save(&self, volume: &HostVolume<String>, path: &Path) -> Result<(), StoreError> {
        self.volumes
            .borrow_mut()
            .insert(path.to_path_buf(), volume.clone());
        Ok(())
    }
}

/// Constant readings; each snapshot takes a millisecond so stages have a
/// measurable duration.
struct SteadySource {
    calls: usize,
}

impl TelemetrySource for SteadySource {
    fn snapshot(&mut self) -> TelemetrySnapshot {
        self.calls += 1;
        thread::sleep(Duration::from_millis(1));
        TelemetrySnapshot {
            memory_mb: 64.0 + self.calls as f64,
            cpu_percent: 12.5,
            device: None,
        }
    }
}

fn scan_affine() -> Affine {
    Affine::from_rows([
        [1.5, 0.0, 0.0, -60.0],
        [0.0, 1.5, 0.0, -80.0],
        [0.0, 0.0, 3.0, -20.0],
    ])
}

fn test_scan() -> HostVolume<String> {
    let data = Array3::from_shape_fn((8, 6, 4), |(x, y, z)| {
        ((x * 37 + y * 11 + z * 5) % 23) as f32 * 4.0 - 10.0
    });
    Volume::new(data, scan_affine(), "scan header".to_string())
}

fn run(
    store: &MemoryStore,
    params: PipelineParameters,
) -> Result<voxform_core::RunReport, PipelineError> {
    let backend = HostBackend;
    let mut source = SteadySource { calls: 0 };
    TransformPipeline::new(&backend, params).run(
        store,
        &mut source,
        Path::new("in.nii"),
        Path::new("out.nii"),
    )
}

#[test]
fn test_identity_run_preserves_shape_and_metadata() {
    let store = MemoryStore::with("in.nii", test_scan());
    let report = run(&store, PipelineParameters::default()).unwrap();

    let out = store.get("out.nii").expect("output saved");
    assert_eq!(out.data.dim(), (8, 6, 4));
    assert_eq!(out.header, "scan header");
    assert_eq!(out.affine, scan_affine());
    assert!(
        out.data.iter().all(|&v| (-1e-5..=1.0 + 1e-5).contains(&v)),
        "smoothed output left the unit interval"
    );

    let stages: Vec<StageName> = report.stages.iter().map(|r| r.stage).collect();
    assert_eq!(stages, StageName::ALL);
    assert!(report.stages.iter().all(|r| r.memory_delta_mb == 1.0));
    assert!(report.summary.total_elapsed_secs >= report.summary.total_stage_secs);
    assert!((report.summary.weighted_memory_mb - 1.0).abs() < 1e-12);
    assert_eq!(report.summary.weighted_cpu_percent, 0.0);
}

#[test]
fn test_expansion_and_resampling_set_output_dims() {
    let store = MemoryStore::with("in.nii", test_scan());
    let params = PipelineParameters::new(NonZeroU32::new(3).unwrap(), 2.0, false).unwrap();
    let report = run(&store, params).unwrap();

    let out = store.get("out.nii").expect("output saved");
    assert_eq!(out.data.dim(), (16, 12, 12));
    assert_eq!(report.properties.original_dims, [8, 6, 4]);
    assert_eq!(report.properties.expanded_slices, 12);
    assert_eq!(report.properties.scaled_dims, [16, 12]);
    // Saved with the input's affine even though the grid changed.
    assert_eq!(out.affine, scan_affine());
}

#[test]
fn test_constant_volume_fails_at_normalize_without_saving() {
    let flat = Volume::new(
        Array3::from_elem((4, 4, 4), 7.0),
        Affine::IDENTITY,
        "flat".to_string(),
    );
    let store = MemoryStore::with("in.nii", flat);
    let err = run(&store, PipelineParameters::default()).unwrap_err();

    assert_eq!(err.stage(), Some(StageName::Normalize));
    assert!(matches!(
        err,
        PipelineError::Stage {
            source: StageFailure::Transform(TransformError::DegenerateRange { .. }),
            ..
        }
    ));
    assert!(store.get("out.nii").is_none());
}

#[test]
fn test_missing_input_fails_at_load() {
    let store = MemoryStore::default();
    let err = run(&store, PipelineParameters::default()).unwrap_err();

    assert_eq!(err.stage(), Some(StageName::Load));
    assert!(matches!(
        err,
        PipelineError::Stage {
            source: StageFailure::Store(StoreError::NotFound(_)),
            ..
        }
    ));
}

#[test]
fn test_report_renders_text_and_json() {
    let store = MemoryStore::with("in.nii", test_scan());
    let report = run(&store, PipelineParameters::default()).unwrap();

    let text = report.to_string();
    assert!(text.contains("Original dimensions (x, y, z): (8, 6, 4)"), "{text}");
    assert!(text.contains("Weighted Average Memory Usage"));
    assert!(text.contains("Total Execution Time"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["backend"], "host");
    assert_eq!(json["stages"].as_array().map(Vec::len), Some(6));
    assert_eq!(json["stages"][3]["stage"], "normalize");
    assert_eq!(json["parameters"]["multiplier"], 1);
}

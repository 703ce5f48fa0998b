use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use privid_common::config::AnalysisConfig;
use privid_common::error::{PrividError, PrividResult};
use privid_model::chunk::ChunkValue;
use privid_model::detection::Frame;
use privid_model::privacy::{PrivacyParams, SplitCombine, WindowFn};
use privid_model::source::DataSource;
use privid_query::aggregator::ChunkAggregator;
use privid_query::noise::MonteCarlo;
use privid_query::query::{Query, QuerySpec};
use privid_query::sensitivity::NoiseUnit;
use tempfile::TempDir;

/// Counts detection rows; the correction is half the rows in the first frame.
#[derive(Clone, Default)]
struct RowCount {
    calls: Arc<AtomicUsize>,
}

impl ChunkAggregator for RowCount {
    fn descriptor(&self) -> String {
        "ROWS".to_string()
    }

    fn invoke(&self, chunk: &[Frame]) -> PrividResult<ChunkValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rows: usize = chunk.iter().map(Vec::len).sum();
        let correction = chunk.first().map_or(0, Vec::len) as f64 * 0.5;
        Ok(ChunkValue::adjusted(rows as f64, correction))
    }
}

/// Writes `per_frame` detections for every frame below `until`.
fn write_raw(path: &Path, until: u64, per_frame: usize) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut content = String::new();
    for frame in 0..until {
        for i in 0..per_frame {
            content.push_str(&format!("{frame},{i},0,10,20,0.9,0.1,0.2\n"));
        }
    }
    std::fs::write(path, content).unwrap();
}

/// One hour of "cam" at 1 fps: 3600 analyzed frames.
fn fixture() -> (TempDir, AnalysisConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write_raw(&root.join("features/cam/cam0.csv"), 1800, 1);
    write_raw(&root.join("masked_features/cam/cam0.csv"), 1800, 1);
    write_raw(&root.join("masked_features/cam/cam0_m0.csv"), 1800, 1);
    write_raw(&root.join("masked_features/cam/cam0_m1.csv"), 600, 2);

    let persistence = root.join("persistence_distributions/cam");
    std::fs::create_dir_all(&persistence).unwrap();
    std::fs::write(persistence.join("cam10_hybrid.json"), "[120, 900, 300]").unwrap();

    let mut config = AnalysisConfig::default();
    config.data_root = root.to_path_buf();
    config.native_fps = 1;
    config.analysis_fps = 1;
    config.videos.insert("cam".to_string(), vec![0]);
    (dir, config)
}

fn spec(source: DataSource, privacy: Option<PrivacyParams>) -> QuerySpec {
    QuerySpec {
        video: "cam".to_string(),
        source,
        frames_per_chunk: 600,
        chunks_per_window: 2,
        window_fn: WindowFn::Sum,
        privacy,
        smart_adjust: false,
    }
}

fn split_params() -> PrivacyParams {
    PrivacyParams::new(vec![0.0, 0.0], vec![700.0, 700.0]).with_splits(2, SplitCombine::Sum)
}

#[test]
fn original_windows_sum_raw_chunks() {
    let (_dir, config) = fixture();
    let mut query = Query::new(&config, spec(DataSource::Original, None), RowCount::default()).unwrap();

    let chunks: Vec<f64> = query
        .ensure_per_chunk_results()
        .unwrap()
        .iter()
        .map(|r| r.as_single().unwrap().value())
        .collect();
    assert_eq!(chunks, vec![600.0, 600.0, 600.0, 0.0, 0.0, 0.0]);

    let windows = query.generate_per_window_results(false).unwrap();
    assert_eq!(windows, vec![1200.0, 600.0, 0.0]);
}

#[test]
fn just_hybrid_clips_to_bounds() {
    let (_dir, config) = fixture();
    let params = PrivacyParams::new(0.0, 500.0);
    let mut query =
        Query::new(&config, spec(DataSource::JustHybrid, Some(params)), RowCount::default()).unwrap();
    assert_eq!(
        query.generate_per_window_results(false).unwrap(),
        vec![1000.0, 500.0, 0.0]
    );
}

#[test]
fn smart_adjust_subtracts_boundary_correction() {
    let (_dir, config) = fixture();
    let mut s = spec(DataSource::JustHybrid, Some(PrivacyParams::new(0.0, 1000.0)));
    s.smart_adjust = true;
    let mut query = Query::new(&config, s, RowCount::default()).unwrap();
    // Each populated chunk starts with one row: 600 - 0.5.
    assert_eq!(
        query.generate_per_window_results(false).unwrap(),
        vec![1199.0, 599.5, 0.0]
    );
}

#[test]
fn spatial_hybrid_clip_before_and_after_combination() {
    let (_dir, config) = fixture();
    let mut query = Query::new(
        &config,
        spec(DataSource::SpatialHybrid, Some(split_params())),
        RowCount::default(),
    )
    .unwrap();

    // Split 1 holds 1200 rows in chunk 0, clipped to 700 on its own.
    assert_eq!(
        query.generate_per_window_results(false).unwrap(),
        vec![1900.0, 600.0, 0.0]
    );
    // Combined chunk 0 is 1800, clipped to the reduced range [0, 700].
    assert_eq!(
        query.generate_per_window_results(true).unwrap(),
        vec![1300.0, 600.0, 0.0]
    );
}

#[test]
fn cached_results_are_reused_across_queries() {
    let (_dir, config) = fixture();
    let first_agg = RowCount::default();
    let mut first =
        Query::new(&config, spec(DataSource::Original, None), first_agg.clone()).unwrap();
    let first_windows = first.generate_per_window_results(false).unwrap();
    assert_eq!(first_agg.calls.load(Ordering::SeqCst), 6);

    let cache_file = config
        .query_results_dir()
        .join(format!("{}.json", first.cache_key()));
    assert!(cache_file.exists());

    let second_agg = RowCount::default();
    let mut second =
        Query::new(&config, spec(DataSource::Original, None), second_agg.clone()).unwrap();
    assert_eq!(second.generate_per_window_results(false).unwrap(), first_windows);
    assert_eq!(second_agg.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn parallel_execution_matches_sequential() {
    let (_seq_dir, sequential) = fixture();
    let (_par_dir, mut parallel) = fixture();
    parallel.execution.parallel_chunks = true;
    parallel.execution.parallel_splits = true;

    for source in [DataSource::Original, DataSource::SpatialHybrid] {
        let privacy = (source == DataSource::SpatialHybrid).then(split_params);
        let mut a = Query::new(&sequential, spec(source, privacy.clone()), RowCount::default()).unwrap();
        let mut b = Query::new(&parallel, spec(source, privacy), RowCount::default()).unwrap();
        assert_eq!(
            a.ensure_per_chunk_results().unwrap(),
            b.ensure_per_chunk_results().unwrap()
        );
    }

    let (_dir, mut chunks_only) = fixture();
    chunks_only.execution.parallel_chunks = true;
    let mut a = Query::new(
        &sequential,
        spec(DataSource::SpatialHybrid, Some(split_params())),
        RowCount::default(),
    )
    .unwrap();
    let mut c = Query::new(
        &chunks_only,
        spec(DataSource::SpatialHybrid, Some(split_params())),
        RowCount::default(),
    )
    .unwrap();
    assert_eq!(
        a.generate_per_window_results(false).unwrap(),
        c.generate_per_window_results(false).unwrap()
    );
}

#[test]
fn identical_queries_are_deterministic() {
    let (_dir, config) = fixture();
    let params = PrivacyParams::new(0.0, 500.0).with_epsilon(0.5);
    let run = || {
        let mut query =
            Query::new(&config, spec(DataSource::JustHybrid, Some(params.clone())), RowCount::default())
                .unwrap();
        let windows = query.generate_per_window_results(false).unwrap();
        let scale = query.noise_scale(NoiseUnit::Chunks).unwrap();
        let noise = query.noise(windows.len(), 11, scale).unwrap();
        (windows, scale, noise)
    };
    assert_eq!(run(), run());
}

#[test]
fn noise_scale_uses_measured_persistence() {
    let (_dir, config) = fixture();
    let params = PrivacyParams::new(0.0, 500.0);
    let mut query =
        Query::new(&config, spec(DataSource::JustHybrid, Some(params)), RowCount::default()).unwrap();

    // Max persistence 900 frames: ceil(900 / 600) + 1 = 3 chunks.
    assert_eq!(query.ensure_persistence().unwrap(), 900.0);
    assert_eq!(query.noise_scale(NoiseUnit::Chunks).unwrap(), 1500.0);
    assert_eq!(query.noise_scale(NoiseUnit::Frames).unwrap(), 1500.0 * 600.0);
    assert_eq!(
        query.noise_scale_with_persistence(0.0, NoiseUnit::Chunks).unwrap(),
        500.0
    );

    let ribbon = query.noise_ribbon(1500.0).unwrap();
    assert!((ribbon - 1500.0 * 50f64.ln()).abs() < 1e-9);
    let matrix = query.noise_multiple(1500.0, MonteCarlo::default()).unwrap();
    assert_eq!(matrix.len(), 100);
}

#[test]
fn single_chunk_windows_match_chunk_values() {
    let (_dir, config) = fixture();
    let mut s = spec(DataSource::Original, None);
    s.chunks_per_window = 1;
    let mut query = Query::new(&config, s, RowCount::default()).unwrap();
    let windows = query.generate_per_window_results(false).unwrap();
    let chunks: Vec<f64> = query
        .ensure_per_chunk_results()
        .unwrap()
        .iter()
        .map(|r| r.as_single().unwrap().value())
        .collect();
    assert_eq!(windows, chunks);
}

#[test]
fn missing_raw_file_fails_without_caching() {
    let (_dir, config) = fixture();
    std::fs::remove_file(config.data_root.join("features/cam/cam0.csv")).unwrap();

    let mut query = Query::new(&config, spec(DataSource::Original, None), RowCount::default()).unwrap();
    let err = query.generate_per_window_results(false).unwrap_err();
    assert!(matches!(err, PrividError::FileNotFound { .. }));
    assert!(!config
        .query_results_dir()
        .join(format!("{}.json", query.cache_key()))
        .exists());
}

//! Persistent memoization of per-chunk results.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use privid_common::config::AnalysisConfig;
use privid_common::error::{PrividError, PrividResult};
use privid_model::chunk::ChunkResult;
use privid_model::source::DataSource;

/// Deterministic cache key for one per-chunk result sequence.
///
/// The split count is part of the key only for spatial-hybrid sources.
pub fn cache_key(
    video: &str,
    source: DataSource,
    frames_per_chunk: usize,
    descriptor: &str,
    num_splits: Option<usize>,
) -> String {
    let mut key = format!(
        "{video}_{}_FPC-{frames_per_chunk}_{descriptor}",
        source.tag()
    );
    if let (true, Some(n)) = (source.is_split(), num_splits) {
        key.push_str(&format!("_NSPLIT-{n}"));
    }
    key
}

/// On-disk record of one cached sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,

    pub results: Vec<ChunkResult>,
}

/// Directory of JSON cache records, one file per key.
#[derive(Debug, Clone)]
pub struct ChunkResultCache {
    dir: PathBuf,
}

impl ChunkResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.query_results_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load a cached sequence. `Ok(None)` when nothing is stored under `key`.
    pub fn load(&self, key: &str) -> PrividResult<Option<Vec<ChunkResult>>> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PrividError::from_io(&path, e)),
        };
        let record: CacheRecord = serde_json::from_str(&content).map_err(|e| {
            PrividError::processing(format!("Corrupt cache record {}: {e}", path.display()))
        })?;
        Ok(Some(record.results))
    }

    /// Persist a complete sequence. The record appears under its final name
    /// only once fully written.
    pub fn store(&self, key: &str, results: &[ChunkResult]) -> PrividResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PrividError::from_io(&self.dir, e))?;

        let record = CacheRecord {
            key: key.to_string(),
            computed_at: Some(Utc::now()),
            results: results.to_vec(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &record)?;
            writer.flush()?;
        }
        let path = self.path_for(key);
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::info!(
            "Stored {} chunk results under {}",
            results.len(),
            path.display()
        );
        Ok(())
    }

    /// Load `key`, or run `compute`, store its output and return it.
    ///
    /// Nothing is stored when `compute` fails.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> PrividResult<Vec<ChunkResult>>
    where
        F: FnOnce() -> PrividResult<Vec<ChunkResult>>,
    {
        if let Some(results) = self.load(key)? {
            tracing::info!("Cache hit for {} ({} chunks)", key, results.len());
            return Ok(results);
        }

        tracing::info!("Cache miss for {}, computing", key);
        let results = compute()?;
        self.store(key, &results)?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privid_model::chunk::ChunkValue;

    fn sample() -> Vec<ChunkResult> {
        vec![
            ChunkValue::adjusted(3.0, 1.0).into(),
            ChunkValue::Scalar(0.0).into(),
            ChunkResult::split(vec![ChunkValue::Scalar(1.0), ChunkValue::Scalar(2.0)]),
        ]
    }

    #[test]
    fn keys_include_split_count_only_for_spatial_hybrid() {
        assert_eq!(
            cache_key("auburn", DataSource::JustHybrid, 8, "COUNT_X", Some(4)),
            "auburn_JUST_HYBRID_FPC-8_COUNT_X"
        );
        assert_eq!(
            cache_key("auburn", DataSource::SpatialHybrid, 8, "COUNT_X", Some(4)),
            "auburn_SPATIAL_HYBRID_FPC-8_COUNT_X_NSPLIT-4"
        );
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkResultCache::new(dir.path().join("query_results"));

        assert_eq!(cache.load("k").unwrap(), None);
        cache.store("k", &sample()).unwrap();
        assert_eq!(cache.load("k").unwrap(), Some(sample()));

        let leftovers: Vec<_> = std::fs::read_dir(cache.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("k.json")]);
    }

    #[test]
    fn compute_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkResultCache::new(dir.path());
        let mut calls = 0;

        let first = cache
            .get_or_compute("k", || {
                calls += 1;
                Ok(sample())
            })
            .unwrap();
        let second = cache
            .get_or_compute("k", || panic!("cached value should be used"))
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn failed_compute_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkResultCache::new(dir.path());

        let err = cache.get_or_compute("k", || Err(PrividError::aggregator("tracker fault")));
        assert!(err.is_err());
        assert!(!cache.path_for("k").exists());
    }

    #[test]
    fn bare_records_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkResultCache::new(dir.path());
        std::fs::write(cache.path_for("k"), r#"{"results": [1, [2, 0.5]]}"#).unwrap();

        assert_eq!(
            cache.load("k").unwrap(),
            Some(vec![
                ChunkValue::Scalar(1.0).into(),
                ChunkValue::adjusted(2.0, 0.5).into()
            ])
        );
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkResultCache::new(dir.path());
        std::fs::write(cache.path_for("k"), "{\"results\": [").unwrap();
        assert!(matches!(cache.load("k"), Err(PrividError::Processing { .. })));
    }
}

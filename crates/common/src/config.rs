//! Analysis configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::clock::FrameDecimator;
use crate::error::{PrividError, PrividResult};

/// Global analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root directory holding raw features, persistence distributions and
    /// cached query results.
    pub data_root: PathBuf,

    /// Native frame rate of the source recordings.
    pub native_fps: u32,

    /// Rate at which frames are analyzed.
    pub analysis_fps: u32,

    /// Recorded hours per video. One raw file exists per listed hour.
    pub videos: BTreeMap<String, Vec<u32>>,

    /// Optional data-parallel execution.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data-parallel execution switches. Output is identical either way.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Invoke the per-chunk aggregator on chunks concurrently.
    #[serde(default)]
    pub parallel_chunks: bool,

    /// Load and aggregate spatial splits concurrently.
    #[serde(default)]
    pub parallel_splits: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "privid_query=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let mut videos = BTreeMap::new();
        videos.insert("auburn".to_string(), (7..19).collect());
        videos.insert("hampton".to_string(), (1..13).collect());
        videos.insert("shibuya".to_string(), (1..13).collect());

        Self {
            data_root: default_data_root(),
            native_fps: 30,
            analysis_fps: 8,
            videos,
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AnalysisConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Errors are propagated.
    pub fn load_from(path: impl AsRef<Path>) -> PrividResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PrividError::from_io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> PrividResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Recorded hours for `video`.
    pub fn hours(&self, video: &str) -> PrividResult<&[u32]> {
        self.videos
            .get(video)
            .map(Vec::as_slice)
            .ok_or_else(|| PrividError::config(format!("Unknown video '{video}'")))
    }

    /// Number of analyzed frames over the whole recording of `video`.
    pub fn analysis_frames(&self, video: &str) -> PrividResult<u64> {
        let hours = self.hours(video)?.len() as u64;
        Ok(hours * 3600 * self.analysis_fps as u64)
    }

    /// Decimator converting the native rate to the analysis rate.
    pub fn decimator(&self) -> PrividResult<FrameDecimator> {
        FrameDecimator::new(self.native_fps, self.analysis_fps)
    }

    pub fn query_results_dir(&self) -> PathBuf {
        self.data_root.join("query_results")
    }

    pub fn persistence_dir(&self) -> PathBuf {
        self.data_root.join("persistence_distributions")
    }

    pub fn features_dir(&self) -> PathBuf {
        self.data_root.join("features")
    }

    pub fn masked_features_dir(&self) -> PathBuf {
        self.data_root.join("masked_features")
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("privid").join("config.json")
}

/// Default data root.
fn default_data_root() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("privid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_twelve_hour_recordings() {
        let config = AnalysisConfig::default();
        for video in ["auburn", "hampton", "shibuya"] {
            assert_eq!(config.hours(video).unwrap().len(), 12);
            assert_eq!(config.analysis_frames(video).unwrap(), 8 * 3600 * 12);
        }
        assert_eq!(config.hours("auburn").unwrap().first(), Some(&7));
    }

    #[test]
    fn unknown_video_is_config_error() {
        let config = AnalysisConfig::default();
        assert!(matches!(
            config.hours("nowhere"),
            Err(PrividError::Config { .. })
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AnalysisConfig::default();
        config.data_root = PathBuf::from("/srv/privid");
        config.execution.parallel_chunks = true;
        config.save_to(&path).unwrap();

        let loaded = AnalysisConfig::load_from(&path).unwrap();
        assert_eq!(loaded.data_root, PathBuf::from("/srv/privid"));
        assert!(loaded.execution.parallel_chunks);
        assert!(!loaded.execution.parallel_splits);
        assert_eq!(loaded.videos, config.videos);
    }

    #[test]
    fn legacy_file_without_execution_section_loads() {
        let raw = r#"{
            "data_root": "/data",
            "native_fps": 30,
            "analysis_fps": 8,
            "videos": {"auburn": [7, 8]}
        }"#;
        let parsed: AnalysisConfig = serde_json::from_str(raw).unwrap();
        assert!(!parsed.execution.parallel_chunks);
        assert_eq!(parsed.logging.level, "info");
        assert_eq!(parsed.query_results_dir(), PathBuf::from("/data/query_results"));
    }

    #[test]
    fn load_from_missing_path_reports_path() {
        let err = AnalysisConfig::load_from("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PrividError::FileNotFound { .. }));
    }
}

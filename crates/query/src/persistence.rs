//! Persistence distributions: how long objects stay in the scene.

use std::path::{Path, PathBuf};

use privid_common::config::AnalysisConfig;
use privid_common::error::{PrividError, PrividResult};
use privid_model::source::DataSource;

/// Heat-square size the distributions were measured with.
const HEAT_SQUARE: u32 = 10;

/// Location of the persistence distribution of `video` for `source`.
pub fn persistence_path(
    config: &AnalysisConfig,
    video: &str,
    source: DataSource,
) -> PrividResult<PathBuf> {
    let kind = source.persistence_kind()?;
    Ok(config
        .persistence_dir()
        .join(video)
        .join(format!("{video}{HEAT_SQUARE}_{kind}.json")))
}

/// Maximum staying duration, in frames, from a JSON array of durations.
pub fn load_max_persistence(path: &Path) -> PrividResult<f64> {
    let content = std::fs::read_to_string(path).map_err(|e| PrividError::from_io(path, e))?;
    let durations: Vec<f64> = serde_json::from_str(&content)?;

    let max = durations
        .iter()
        .copied()
        .reduce(f64::max)
        .ok_or_else(|| {
            PrividError::processing(format!(
                "Empty persistence distribution {}",
                path.display()
            ))
        })?;

    tracing::debug!(
        "Max persistence {} frames over {} objects ({})",
        max,
        durations.len(),
        path.display()
    );
    Ok(max)
}

//! Print or write the effective configuration.

use std::path::{Path, PathBuf};

use privid_common::config::{config_file_path, AnalysisConfig};

pub fn run(config: &AnalysisConfig, write: bool, path: Option<&Path>) -> anyhow::Result<()> {
    if write {
        let target = write_config(config, path)?;
        eprintln!("Wrote configuration to {}", target.display());
        return Ok(());
    }

    eprintln!("Default config location: {}", config_file_path().display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Save `config` to `path`, or to the standard location when none is given.
fn write_config(config: &AnalysisConfig, path: Option<&Path>) -> anyhow::Result<PathBuf> {
    let target = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    config.save_to(&target)?;
    tracing::info!("Saved configuration to {:?}", target);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("privid").join("config.json");

        let mut config = AnalysisConfig::default();
        config.analysis_fps = 5;
        let target = write_config(&config, Some(&path)).unwrap();
        assert_eq!(target, path);

        let loaded = AnalysisConfig::load_from(&path).unwrap();
        assert_eq!(loaded.analysis_fps, 5);
        assert_eq!(loaded.videos, config.videos);
    }
}

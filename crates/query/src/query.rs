//! A windowed differential-privacy query over one video.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use privid_common::config::AnalysisConfig;
use privid_common::error::{PrividError, PrividResult};
use privid_model::chunk::{ChunkResult, ChunkValue};
use privid_model::detection::Chunk;
use privid_model::privacy::{PrivacyParams, WindowFn};
use privid_model::source::DataSource;

use crate::aggregator::ChunkAggregator;
use crate::cache::{cache_key, ChunkResultCache};
use crate::loader::RawChunkLoader;
use crate::noise::{self, MonteCarlo, DEFAULT_RIBBON_CONFIDENCE};
use crate::persistence::{load_max_persistence, persistence_path};
use crate::sensitivity::{self, NoiseUnit};
use crate::window::WindowAggregator;

/// Parameters of a query, independent of the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub video: String,
    pub source: DataSource,
    pub frames_per_chunk: usize,
    pub chunks_per_window: usize,
    pub window_fn: WindowFn,

    #[serde(default)]
    pub privacy: Option<PrivacyParams>,

    /// Subtract the aggregator's boundary correction from each chunk value.
    #[serde(default)]
    pub smart_adjust: bool,
}

/// A query bound to its data, aggregator and privacy parameters.
///
/// Per-chunk results and the persistence value are computed on first use and
/// kept for the lifetime of the query.
pub struct Query<A> {
    spec: QuerySpec,
    aggregator: A,
    config: AnalysisConfig,
    cache: ChunkResultCache,
    num_chunks: usize,
    per_chunk_results: Option<Vec<ChunkResult>>,
    persistence: Option<f64>,
}

impl<A: ChunkAggregator> Query<A> {
    pub fn new(config: &AnalysisConfig, spec: QuerySpec, aggregator: A) -> PrividResult<Self> {
        if spec.frames_per_chunk == 0 {
            return Err(PrividError::config("frames_per_chunk must be positive"));
        }
        if spec.chunks_per_window == 0 {
            return Err(PrividError::config("chunks_per_window must be positive"));
        }

        match spec.source {
            DataSource::Original | DataSource::JustHybrid => {}
            DataSource::SpatialHybrid => {
                if spec.privacy.is_none() {
                    return Err(PrividError::config(
                        "Spatial-hybrid queries need privacy parameters",
                    ));
                }
            }
            DataSource::OriginalWithHybrid => return Err(spec.source.unsupported()),
        }
        if let Some(privacy) = &spec.privacy {
            privacy.validate_for(spec.source)?;
        }

        let frames = config.analysis_frames(&spec.video)?;
        let num_chunks = (frames / spec.frames_per_chunk as u64) as usize;
        if num_chunks == 0 {
            return Err(PrividError::config(format!(
                "Chunks of {} frames do not fit in {frames} analyzed frames",
                spec.frames_per_chunk
            )));
        }
        if num_chunks % spec.chunks_per_window != 0 {
            return Err(PrividError::config(format!(
                "{num_chunks} chunks do not divide into windows of {}",
                spec.chunks_per_window
            )));
        }

        Ok(Self {
            spec,
            aggregator,
            config: config.clone(),
            cache: ChunkResultCache::from_config(config),
            num_chunks,
            per_chunk_results: None,
            persistence: None,
        })
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    /// Whole chunks in the recording; a trailing partial chunk is not released.
    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn num_windows(&self) -> usize {
        self.num_chunks / self.spec.chunks_per_window
    }

    pub fn cache_key(&self) -> String {
        cache_key(
            &self.spec.video,
            self.spec.source,
            self.spec.frames_per_chunk,
            &self.aggregator.descriptor(),
            self.spec.privacy.as_ref().and_then(|p| p.num_splits),
        )
    }

    /// Per-chunk results, loaded from the cache or computed from raw data.
    pub fn ensure_per_chunk_results(&mut self) -> PrividResult<&[ChunkResult]> {
        let results = match self.per_chunk_results.take() {
            Some(results) => results,
            None => {
                let key = self.cache_key();
                self.cache
                    .get_or_compute(&key, || self.compute_per_chunk_results())?
            }
        };
        Ok(self.per_chunk_results.insert(results).as_slice())
    }

    /// Maximum persistence of the video, in frames.
    pub fn ensure_persistence(&mut self) -> PrividResult<f64> {
        if let Some(persistence) = self.persistence {
            return Ok(persistence);
        }
        let path = persistence_path(&self.config, &self.spec.video, self.spec.source)?;
        let persistence = load_max_persistence(&path)?;
        self.persistence = Some(persistence);
        Ok(persistence)
    }

    /// Released (pre-noise) value of every window, in order.
    pub fn generate_per_window_results(
        &mut self,
        apply_bounds_after_split: bool,
    ) -> PrividResult<Vec<f64>> {
        self.ensure_per_chunk_results()?;
        let results = self.per_chunk_results.as_deref().unwrap_or_default();

        if results.len() < self.num_chunks {
            return Err(PrividError::processing(format!(
                "Expected {} chunk results for {}, found {}",
                self.num_chunks,
                self.spec.video,
                results.len()
            )));
        }
        if results.len() > self.num_chunks {
            tracing::debug!(
                "Dropping {} trailing partial chunk(s)",
                results.len() - self.num_chunks
            );
        }

        let windows = WindowAggregator {
            chunks_per_window: self.spec.chunks_per_window,
            source: self.spec.source,
            privacy: self.spec.privacy.as_ref(),
            smart_adjust: self.spec.smart_adjust,
            window_fn: self.spec.window_fn,
        }
        .aggregate(&results[..self.num_chunks], apply_bounds_after_split)?;

        tracing::debug!("Aggregated {} windows for {}", windows.len(), self.spec.video);
        Ok(windows)
    }

    /// Laplace scale calibrated to the video's measured persistence.
    pub fn noise_scale(&mut self, unit: NoiseUnit) -> PrividResult<f64> {
        let persistence = self.ensure_persistence()?;
        self.noise_scale_with_persistence(persistence, unit)
    }

    /// Laplace scale for an explicit persistence, in frames.
    pub fn noise_scale_with_persistence(
        &self,
        persistence_frames: f64,
        unit: NoiseUnit,
    ) -> PrividResult<f64> {
        let privacy = self.privacy()?;
        sensitivity::noise_scale(
            privacy,
            persistence_frames,
            self.spec.frames_per_chunk,
            self.spec.chunks_per_window,
            self.spec.window_fn,
            unit,
        )
    }

    /// 99% noise ribbon radius at `scale`.
    pub fn noise_ribbon(&self, scale: f64) -> PrividResult<f64> {
        noise::ribbon(scale, DEFAULT_RIBBON_CONFIDENCE)
    }

    pub fn noise(&self, count: usize, seed: u64, scale: f64) -> PrividResult<Vec<f64>> {
        noise::sample(count, seed, scale)
    }

    pub fn noise_multiple(&self, scale: f64, monte_carlo: MonteCarlo) -> PrividResult<Vec<Vec<f64>>> {
        noise::sample_matrix(scale, monte_carlo)
    }

    fn privacy(&self) -> PrividResult<&PrivacyParams> {
        self.spec
            .privacy
            .as_ref()
            .ok_or_else(|| PrividError::config("Query has no privacy parameters"))
    }

    fn compute_per_chunk_results(&self) -> PrividResult<Vec<ChunkResult>> {
        let loader = RawChunkLoader::new(
            &self.config,
            &self.spec.video,
            self.spec.source,
            self.spec.frames_per_chunk,
        )?;
        let execution = self.config.execution;

        match self.spec.source {
            DataSource::Original | DataSource::JustHybrid => {
                let values = self.aggregate_chunks(loader.chunks(None)?, execution.parallel_chunks)?;
                Ok(values.into_iter().map(ChunkResult::from).collect())
            }
            DataSource::SpatialHybrid => {
                let num_splits = self.privacy()?.num_splits.ok_or_else(|| {
                    PrividError::config("Spatial-hybrid queries need a split count")
                })?;

                if execution.parallel_splits {
                    let per_split = (0..num_splits)
                        .into_par_iter()
                        .map(|split| {
                            self.aggregate_chunks(
                                loader.chunks(Some(split))?,
                                execution.parallel_chunks,
                            )
                        })
                        .collect::<PrividResult<Vec<_>>>()?;
                    Ok(zip_splits(&per_split))
                } else if execution.parallel_chunks {
                    let steps = loader
                        .lockstep_chunks(num_splits)?
                        .collect::<PrividResult<Vec<_>>>()?;
                    steps.par_iter().map(|step| self.invoke_splits(step)).collect()
                } else {
                    loader
                        .lockstep_chunks(num_splits)?
                        .map(|step| self.invoke_splits(&step?))
                        .collect()
                }
            }
            DataSource::OriginalWithHybrid => Err(self.spec.source.unsupported()),
        }
    }

    /// Aggregate one chunk stream, in order, stopping at the first error.
    fn aggregate_chunks<I>(&self, chunks: I, parallel: bool) -> PrividResult<Vec<ChunkValue>>
    where
        I: Iterator<Item = PrividResult<Chunk>>,
    {
        if parallel {
            let chunks = chunks.collect::<PrividResult<Vec<_>>>()?;
            chunks
                .par_iter()
                .map(|chunk| self.aggregator.invoke(chunk))
                .collect()
        } else {
            chunks
                .map(|chunk| self.aggregator.invoke(&chunk?))
                .collect()
        }
    }

    fn invoke_splits(&self, step: &[Chunk]) -> PrividResult<ChunkResult> {
        let splits = step
            .iter()
            .map(|chunk| self.aggregator.invoke(chunk))
            .collect::<PrividResult<Vec<_>>>()?;
        Ok(ChunkResult::split(splits))
    }
}

/// Join independently computed split sequences positionally, stopping at the
/// shortest.
fn zip_splits(per_split: &[Vec<ChunkValue>]) -> Vec<ChunkResult> {
    let len = per_split.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .map(|chunk| ChunkResult::split(per_split.iter().map(|s| s[chunk]).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::NullAggregator;
    use privid_model::privacy::SplitCombine;

    fn config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.data_root = std::path::PathBuf::from("/nonexistent");
        config.native_fps = 1;
        config.analysis_fps = 1;
        config.videos.insert("cam".to_string(), vec![0]);
        config
    }

    fn spec(source: DataSource, privacy: Option<PrivacyParams>) -> QuerySpec {
        QuerySpec {
            video: "cam".to_string(),
            source,
            frames_per_chunk: 60,
            chunks_per_window: 6,
            window_fn: WindowFn::Sum,
            privacy,
            smart_adjust: false,
        }
    }

    #[test]
    fn construction_counts_chunks_and_windows() {
        let query = Query::new(&config(), spec(DataSource::Original, None), NullAggregator).unwrap();
        assert_eq!(query.num_chunks(), 60);
        assert_eq!(query.num_windows(), 10);
        assert_eq!(query.cache_key(), "cam_ORIGINAL_FPC-60_");
    }

    #[test]
    fn uneven_windows_fail_at_construction() {
        let mut s = spec(DataSource::Original, None);
        s.chunks_per_window = 7;
        assert!(matches!(
            Query::new(&config(), s, NullAggregator),
            Err(PrividError::Config { .. })
        ));
    }

    #[test]
    fn spatial_hybrid_requires_privacy_params() {
        let err = Query::new(&config(), spec(DataSource::SpatialHybrid, None), NullAggregator);
        assert!(matches!(err, Err(PrividError::Config { .. })));

        let params = PrivacyParams::new(vec![0.0; 3], vec![1.0; 3]).with_splits(3, SplitCombine::Sum);
        let query =
            Query::new(&config(), spec(DataSource::SpatialHybrid, Some(params)), NullAggregator)
                .unwrap();
        assert!(query.cache_key().ends_with("_NSPLIT-3"));
    }

    #[test]
    fn reserved_source_fails_at_construction() {
        let err = Query::new(&config(), spec(DataSource::OriginalWithHybrid, None), NullAggregator);
        assert!(matches!(err, Err(PrividError::Unsupported { .. })));
    }

    #[test]
    fn noise_scale_needs_privacy_params() {
        let query = Query::new(&config(), spec(DataSource::Original, None), NullAggregator).unwrap();
        assert!(query.noise_scale_with_persistence(10.0, NoiseUnit::Chunks).is_err());

        let params = PrivacyParams::new(0.0, 10.0);
        let query =
            Query::new(&config(), spec(DataSource::JustHybrid, Some(params)), NullAggregator).unwrap();
        // ceil(100 / 60) + 1 = 3 chunks.
        assert_eq!(
            query.noise_scale_with_persistence(100.0, NoiseUnit::Chunks).unwrap(),
            30.0
        );

        let params = PrivacyParams::new(0.0, 10.0).with_k_segments(4);
        let query =
            Query::new(&config(), spec(DataSource::JustHybrid, Some(params)), NullAggregator).unwrap();
        assert_eq!(
            query.noise_scale_with_persistence(100.0, NoiseUnit::Chunks).unwrap(),
            120.0
        );
    }

    #[test]
    fn splits_zip_to_shortest() {
        let a = vec![ChunkValue::Scalar(1.0), ChunkValue::Scalar(2.0)];
        let b = vec![ChunkValue::Scalar(3.0)];
        assert_eq!(
            zip_splits(&[a, b]),
            vec![ChunkResult::split(vec![ChunkValue::Scalar(1.0), ChunkValue::Scalar(3.0)])]
        );
    }
}

//! Grouping per-chunk results into released windows.

use privid_common::error::{PrividError, PrividResult};
use privid_model::chunk::{ChunkResult, ChunkValue};
use privid_model::privacy::{PrivacyParams, WindowFn};
use privid_model::source::DataSource;

/// Shapes and reduces windows of `chunks_per_window` chunks.
#[derive(Debug, Clone, Copy)]
pub struct WindowAggregator<'a> {
    pub chunks_per_window: usize,
    pub source: DataSource,
    pub privacy: Option<&'a PrivacyParams>,
    pub smart_adjust: bool,
    pub window_fn: WindowFn,
}

impl WindowAggregator<'_> {
    /// One value per window, in chunk order.
    ///
    /// With `apply_bounds_after_split`, spatial-hybrid splits are combined
    /// first and the combined sequence is clipped to the reduced range;
    /// otherwise each split is clipped to its own bounds before combining.
    pub fn aggregate(
        &self,
        results: &[ChunkResult],
        apply_bounds_after_split: bool,
    ) -> PrividResult<Vec<f64>> {
        let cpw = self.chunks_per_window;
        if cpw == 0 {
            return Err(PrividError::config("chunks_per_window must be positive"));
        }
        if results.len() % cpw != 0 {
            return Err(PrividError::config(format!(
                "{} chunks do not divide into windows of {cpw}",
                results.len()
            )));
        }

        results
            .chunks(cpw)
            .map(|window| {
                let shaped = self.shape(window, apply_bounds_after_split)?;
                Ok(self.window_fn.apply(&shaped))
            })
            .collect()
    }

    /// Per-chunk values of one window after source-specific shaping.
    fn shape(&self, window: &[ChunkResult], after_split: bool) -> PrividResult<Vec<f64>> {
        match self.source {
            DataSource::Original => window
                .iter()
                .map(|r| single(r, self.source).map(ChunkValue::value))
                .collect(),
            DataSource::JustHybrid => {
                let range = self.privacy.map(PrivacyParams::reduced_range);
                window
                    .iter()
                    .map(|r| {
                        let v = single(r, self.source)?.shaped(self.smart_adjust);
                        Ok(match range {
                            Some((lower, upper)) => clip(v, lower, upper),
                            None => v,
                        })
                    })
                    .collect()
            }
            DataSource::SpatialHybrid => self.shape_spatial(window, after_split),
            DataSource::OriginalWithHybrid => Err(self.source.unsupported()),
        }
    }

    fn shape_spatial(&self, window: &[ChunkResult], after_split: bool) -> PrividResult<Vec<f64>> {
        let privacy = self.privacy.ok_or_else(|| {
            PrividError::config("Spatial-hybrid windows need privacy parameters")
        })?;
        let num_splits = privacy.num_splits.ok_or_else(|| {
            PrividError::config("Spatial-hybrid windows need a split count")
        })?;

        // splits[s][c]: shaped value of split s in chunk c.
        let mut splits = vec![Vec::with_capacity(window.len()); num_splits];
        for result in window {
            let values = result.as_splits().ok_or_else(|| {
                PrividError::processing("Expected per-split chunk results for SPATIAL_HYBRID")
            })?;
            if values.len() != num_splits {
                return Err(PrividError::processing(format!(
                    "Chunk has {} splits, expected {num_splits}",
                    values.len()
                )));
            }
            for (split, value) in values.iter().enumerate() {
                splits[split].push(value.shaped(self.smart_adjust));
            }
        }

        if !after_split {
            for (split, values) in splits.iter_mut().enumerate() {
                let (lower, upper) = match (
                    privacy.lower.for_split(split),
                    privacy.upper.for_split(split),
                ) {
                    (Some(lower), Some(upper)) => (lower, upper),
                    _ => {
                        return Err(PrividError::config(format!(
                            "Clipping before combination needs per-split bounds (split {split})"
                        )))
                    }
                };
                for v in values.iter_mut() {
                    *v = clip(*v, lower, upper);
                }
            }
        }

        let mut combined: Vec<f64> = (0..window.len())
            .map(|chunk| {
                let column: Vec<f64> = splits.iter().map(|s| s[chunk]).collect();
                privacy.split_combine.combine(&column)
            })
            .collect();

        if after_split {
            let (lower, upper) = privacy.reduced_range();
            for v in &mut combined {
                *v = clip(*v, lower, upper);
            }
        }
        Ok(combined)
    }
}

fn single(result: &ChunkResult, source: DataSource) -> PrividResult<&ChunkValue> {
    result.as_single().ok_or_else(|| {
        PrividError::processing(format!("Unexpected per-split chunk result for {source}"))
    })
}

fn clip(v: f64, lower: f64, upper: f64) -> f64 {
    v.max(lower).min(upper)
}

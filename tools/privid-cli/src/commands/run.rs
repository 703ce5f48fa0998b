//! Run a windowed query and report its release.

use serde::Serialize;

use privid_common::config::AnalysisConfig;
use privid_model::privacy::{PrivacyParams, SplitCombine, WindowFn};
use privid_model::source::DataSource;
use privid_query::aggregator::{
    ChunkAggregator, DetectionFilter, NullAggregator, TrackCountAggregator,
    UpwardTrajectoryAggregator,
};
use privid_query::noise::{self, DEFAULT_RIBBON_CONFIDENCE};
use privid_query::query::{Query, QuerySpec};
use privid_query::sensitivity::NoiseUnit;
use privid_query::tracker::IouTrackerConfig;

use super::bound;
use crate::{AggregatorKind, RunArgs};

#[derive(Serialize)]
struct Report {
    video: String,
    source: DataSource,
    cache_key: String,
    windows: Vec<f64>,
    noise_scale: Option<f64>,
    noise_unit: NoiseUnit,
    ribbon: Option<f64>,
    released: Option<Vec<f64>>,
}

pub fn run(config: &AnalysisConfig, args: RunArgs) -> anyhow::Result<()> {
    let source: DataSource = args.source.parse()?;
    let spec = query_spec(&args, source)?;

    let filter = DetectionFilter {
        confidence_threshold: args.tracker.confidence,
        nms_max_overlap: args.tracker.nms_max_overlap,
    };
    let tracker = IouTrackerConfig {
        max_cosine_distance: args.tracker.max_cosine_distance,
        max_iou_distance: args.tracker.max_iou_distance,
        max_age: args.tracker.max_age,
        n_init: args.tracker.n_init,
    };

    match args.aggregator {
        AggregatorKind::Null => execute(config, spec, NullAggregator, &args),
        AggregatorKind::Count => {
            execute(config, spec, TrackCountAggregator::new(filter, tracker), &args)
        }
        AggregatorKind::Upward => execute(
            config,
            spec,
            UpwardTrajectoryAggregator::new(filter, tracker, args.tracker.min_dist),
            &args,
        ),
    }
}

fn query_spec(args: &RunArgs, source: DataSource) -> anyhow::Result<QuerySpec> {
    let window_fn: WindowFn = args.window.window_fn.parse()?;

    let privacy = if args.window.lower.is_empty() && args.window.upper.is_empty() {
        None
    } else {
        let mut params = PrivacyParams::new(
            bound(&args.window.lower, "lower")?,
            bound(&args.window.upper, "upper")?,
        )
        .with_epsilon(args.window.epsilon)
        .with_k_segments(args.window.k_segments);
        if let Some(splits) = args.splits {
            let combine: SplitCombine = args.split_combine.parse()?;
            params = params.with_splits(splits, combine);
        }
        Some(params)
    };

    Ok(QuerySpec {
        video: args.video.clone(),
        source,
        frames_per_chunk: args.window.frames_per_chunk,
        chunks_per_window: args.window.chunks_per_window,
        window_fn,
        privacy,
        smart_adjust: args.smart_adjust,
    })
}

fn execute<A: ChunkAggregator>(
    config: &AnalysisConfig,
    spec: QuerySpec,
    aggregator: A,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let mut query = Query::new(config, spec, aggregator)?;
    tracing::info!(
        "Query {}: {} chunks, {} windows",
        query.cache_key(),
        query.num_chunks(),
        query.num_windows()
    );

    let windows = query.generate_per_window_results(args.bounds_after_split)?;

    let unit = if args.window.frame_units {
        NoiseUnit::Frames
    } else {
        NoiseUnit::Chunks
    };
    let (noise_scale, ribbon, released) = if query.spec().privacy.is_some() {
        let scale = match args.persistence {
            Some(persistence) => query.noise_scale_with_persistence(persistence, NoiseUnit::Chunks)?,
            None => query.noise_scale(NoiseUnit::Chunks)?,
        };
        let released = match args.release_seed {
            Some(seed) => {
                let noise = query.noise(windows.len(), seed, scale)?;
                Some(windows.iter().zip(noise).map(|(w, n)| w + n).collect())
            }
            None => None,
        };
        let (reported, ribbon) = scale_in_unit(scale, unit, query.spec().frames_per_chunk)?;
        (Some(reported), Some(ribbon), released)
    } else {
        (None, None, None)
    };

    let report = Report {
        video: query.spec().video.clone(),
        source: query.spec().source,
        cache_key: query.cache_key(),
        windows,
        noise_scale,
        noise_unit: unit,
        ribbon,
        released,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Query: {}", report.cache_key);
    println!("  Video: {} ({})", report.video, report.source);
    println!("  Windows: {}", report.windows.len());
    if let (Some(scale), Some(ribbon)) = (report.noise_scale, report.ribbon) {
        println!("  Noise scale: {scale:.4} ({})", report.noise_unit);
        println!(
            "  Ribbon ({}%): +/-{ribbon:.4} ({})",
            DEFAULT_RIBBON_CONFIDENCE * 100.0,
            report.noise_unit
        );
    } else {
        println!("  No privacy parameters; values are not private");
    }
    println!();

    for (i, value) in report.windows.iter().enumerate() {
        match report.released.as_ref().and_then(|r| r.get(i)) {
            Some(released) => println!("{i:>6}  {value:>12.3}  {released:>12.3}"),
            None => println!("{i:>6}  {value:>12.3}"),
        }
    }
    Ok(())
}

/// Noise scale and ribbon radius, both expressed in `unit`.
///
/// Released noise is always drawn at the chunk-unit scale; frame units only
/// change what is reported.
fn scale_in_unit(
    scale_chunks: f64,
    unit: NoiseUnit,
    frames_per_chunk: usize,
) -> anyhow::Result<(f64, f64)> {
    let scale = match unit {
        NoiseUnit::Chunks => scale_chunks,
        NoiseUnit::Frames => scale_chunks * frames_per_chunk as f64,
    };
    Ok((scale, noise::ribbon(scale, DEFAULT_RIBBON_CONFIDENCE)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ribbon_follows_the_reported_unit() {
        let (chunk_scale, chunk_ribbon) = scale_in_unit(2.5, NoiseUnit::Chunks, 8).unwrap();
        assert_eq!(chunk_scale, 2.5);
        assert_eq!(chunk_ribbon, noise::ribbon(2.5, DEFAULT_RIBBON_CONFIDENCE).unwrap());

        let (frame_scale, frame_ribbon) = scale_in_unit(2.5, NoiseUnit::Frames, 8).unwrap();
        assert_eq!(frame_scale, 20.0);
        assert_eq!(frame_ribbon, noise::ribbon(20.0, DEFAULT_RIBBON_CONFIDENCE).unwrap());
        assert!((frame_ribbon - 8.0 * chunk_ribbon).abs() < 1e-9);
    }
}

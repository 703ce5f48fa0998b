//! Noise calibration without raw data.

use privid_model::privacy::{PrivacyParams, WindowFn};
use privid_model::source::DataSource;
use privid_query::noise::{self, MonteCarlo, DEFAULT_RIBBON_CONFIDENCE};
use privid_query::sensitivity::{self, NoiseUnit};

use super::bound;
use crate::NoiseArgs;

pub fn run(args: NoiseArgs) -> anyhow::Result<()> {
    let window = &args.window;
    let window_fn: WindowFn = window.window_fn.parse()?;
    let mut params = PrivacyParams::new(
        bound(&window.lower, "lower")?,
        bound(&window.upper, "upper")?,
    )
    .with_epsilon(window.epsilon)
    .with_k_segments(window.k_segments);
    params.num_splits = params.lower.split_count();
    params.validate_for(DataSource::Original)?;

    let sensitivity = sensitivity::sensitivity(
        &params.lower,
        &params.upper,
        args.persistence,
        params.k_segments,
        window.frames_per_chunk,
        window.chunks_per_window,
        window_fn,
    )?;
    let scale = sensitivity::noise_scale(
        &params,
        args.persistence,
        window.frames_per_chunk,
        window.chunks_per_window,
        window_fn,
        NoiseUnit::Chunks,
    )?;
    let ribbon = noise::ribbon(scale, DEFAULT_RIBBON_CONFIDENCE)?;

    println!(
        "Persistence: {} frames ({} chunks, {} segment(s))",
        args.persistence,
        sensitivity::persistence_chunks(args.persistence, window.frames_per_chunk)?,
        params.k_segments
    );
    println!("Sensitivity: {sensitivity}");
    println!("Noise scale: {scale} (epsilon {})", params.epsilon);
    println!(
        "Ribbon ({}%): +/-{ribbon:.4} (chunks)",
        DEFAULT_RIBBON_CONFIDENCE * 100.0
    );
    if window.frame_units {
        let frames = window.frames_per_chunk as f64;
        println!("Noise scale: {} (frames)", scale * frames);
        println!(
            "Ribbon ({}%): +/-{:.4} (frames)",
            DEFAULT_RIBBON_CONFIDENCE * 100.0,
            noise::ribbon(scale * frames, DEFAULT_RIBBON_CONFIDENCE)?
        );
    }

    if let Some(truth) = args.truth {
        let monte_carlo = MonteCarlo {
            iterations: args.iterations,
            samples_per_iteration: args.samples,
            seed: args.seed,
        };
        let acc = noise::monte_carlo_accuracy(truth, scale, monte_carlo)?;
        println!(
            "Accuracy over {} releases: {:.4} +/- {:.4}",
            args.iterations * args.samples,
            acc.mean,
            acc.std
        );
    }
    Ok(())
}

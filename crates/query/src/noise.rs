//! Seeded Laplace noise and its reporting helpers.

use rand::distr::Open01;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use privid_common::error::{PrividError, PrividResult};

/// Confidence mass of the reported noise ribbon.
pub const DEFAULT_RIBBON_CONFIDENCE: f64 = 0.99;

/// Shape of a Monte-Carlo noise matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonteCarlo {
    pub iterations: usize,
    pub samples_per_iteration: usize,
    pub seed: u64,
}

impl Default for MonteCarlo {
    fn default() -> Self {
        Self {
            iterations: 100,
            samples_per_iteration: 1,
            seed: 2,
        }
    }
}

/// Mean and population standard deviation of per-release accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub mean: f64,
    pub std: f64,
}

fn check_scale(scale: f64) -> PrividResult<()> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(PrividError::config(format!(
            "Noise scale must be finite and non-negative, got {scale}"
        )));
    }
    Ok(())
}

/// Inverse CDF of the zero-mean Laplace distribution.
fn laplace_inverse_cdf(p: f64, scale: f64) -> f64 {
    let centered = p - 0.5;
    -scale * centered.signum() * (1.0 - 2.0 * centered.abs()).ln()
}

fn draw(rng: &mut StdRng, scale: f64) -> f64 {
    if scale == 0.0 {
        return 0.0;
    }
    let u: f64 = rng.sample(Open01);
    laplace_inverse_cdf(u, scale)
}

/// `count` independent Laplace(0, `scale`) draws.
pub fn sample(count: usize, seed: u64, scale: f64) -> PrividResult<Vec<f64>> {
    check_scale(scale)?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count).map(|_| draw(&mut rng, scale)).collect())
}

/// `iterations` rows of `samples_per_iteration` draws from one seeded stream.
pub fn sample_matrix(scale: f64, monte_carlo: MonteCarlo) -> PrividResult<Vec<Vec<f64>>> {
    check_scale(scale)?;
    let mut rng = StdRng::seed_from_u64(monte_carlo.seed);
    Ok((0..monte_carlo.iterations)
        .map(|_| {
            (0..monte_carlo.samples_per_iteration)
                .map(|_| draw(&mut rng, scale))
                .collect()
        })
        .collect())
}

/// Radius around zero holding `confidence` of the noise mass (one-sided
/// quantile of the Laplace distribution).
pub fn ribbon(scale: f64, confidence: f64) -> PrividResult<f64> {
    check_scale(scale)?;
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(PrividError::config(format!(
            "Ribbon confidence must lie in (0, 1), got {confidence}"
        )));
    }
    Ok(laplace_inverse_cdf(confidence, scale))
}

/// Accuracy `1 - |released - truth| / truth` over a set of releases.
pub fn accuracy(truth: f64, released: &[f64]) -> PrividResult<Accuracy> {
    if truth == 0.0 {
        return Err(PrividError::processing(
            "Accuracy is undefined for a zero ground truth",
        ));
    }
    if released.is_empty() {
        return Err(PrividError::processing("No releases to score"));
    }

    let scores: Vec<f64> = released
        .iter()
        .map(|r| 1.0 - (r - truth).abs() / truth)
        .collect();
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Ok(Accuracy {
        mean,
        std: var.sqrt(),
    })
}

/// Accuracy of noised releases of `truth` at `scale`.
pub fn monte_carlo_accuracy(
    truth: f64,
    scale: f64,
    monte_carlo: MonteCarlo,
) -> PrividResult<Accuracy> {
    let released: Vec<f64> = sample_matrix(scale, monte_carlo)?
        .into_iter()
        .flatten()
        .map(|noise| truth + noise)
        .collect();
    accuracy(truth, &released)
}

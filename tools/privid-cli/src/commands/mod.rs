pub mod config;
pub mod frames;
pub mod noise;
pub mod run;

use privid_model::privacy::Bound;

/// One value is a scene-wide bound; several are per-split bounds.
pub fn bound(values: &[f64], name: &str) -> anyhow::Result<Bound> {
    match values {
        [] => anyhow::bail!("--{name} is required"),
        [single] => Ok(Bound::Scalar(*single)),
        many => Ok(Bound::PerSplit(many.to_vec())),
    }
}

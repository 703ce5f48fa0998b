//! # privid-query
//!
//! Windowed differential-privacy queries over per-frame detection output.
//!
//! Raw detections are decimated to the analysis rate, cut into fixed-size
//! chunks, reduced to one statistic per chunk by a [`ChunkAggregator`],
//! cached, grouped into windows and released with Laplace noise calibrated to
//! how long a single object can stay in view.

pub mod aggregator;
pub mod cache;
pub mod loader;
pub mod noise;
pub mod persistence;
pub mod query;
pub mod sensitivity;
pub mod tracker;
pub mod window;

pub use aggregator::{
    ChunkAggregator, DetectionFilter, NullAggregator, TrackCountAggregator,
    UpwardTrajectoryAggregator,
};
pub use cache::{cache_key, ChunkResultCache};
pub use loader::RawChunkLoader;
pub use noise::{Accuracy, MonteCarlo};
pub use query::{Query, QuerySpec};
pub use sensitivity::NoiseUnit;
pub use tracker::{IouTracker, IouTrackerConfig, Tracker, TrackerFactory};
pub use window::WindowAggregator;

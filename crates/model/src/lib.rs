//! Privid Data Model
//!
//! Defines the data contracts shared by the query pipeline:
//! - **Detections:** Raw per-frame detector rows and the frame/chunk groupings
//! - **Sources:** Which variant of the recorded scene a query reads
//! - **Privacy:** Bounds, epsilon, split combination, window functions
//! - **Chunk results:** What a per-chunk aggregator produces and the cache stores

pub mod chunk;
pub mod detection;
pub mod privacy;
pub mod source;

pub use chunk::*;
pub use detection::*;
pub use privacy::*;
pub use source::*;

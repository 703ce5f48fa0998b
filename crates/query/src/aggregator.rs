//! Per-chunk aggregators.
//!
//! An aggregator turns one chunk of frames into one [`ChunkValue`]. It must be
//! a pure function of its input chunk: any tracking state is rebuilt on every
//! invocation, which is what lets chunks be processed in any order.

use std::collections::{BTreeMap, BTreeSet};

use privid_common::error::PrividResult;
use privid_model::chunk::ChunkValue;
use privid_model::detection::{DetectionRow, Frame};

use crate::tracker::{non_max_suppression, Detection, IouTrackerConfig, Tracker, TrackerFactory};

/// Statistic computed once per chunk (or once per chunk per split).
pub trait ChunkAggregator: Send + Sync {
    /// Stable identifier folded into cache keys. Two aggregators with the
    /// same descriptor must produce the same results.
    fn descriptor(&self) -> String;

    /// Compute the statistic of one chunk.
    fn invoke(&self, chunk: &[Frame]) -> PrividResult<ChunkValue>;
}

/// Aggregator for accounting-only queries; every chunk yields zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAggregator;

impl ChunkAggregator for NullAggregator {
    fn descriptor(&self) -> String {
        String::new()
    }

    fn invoke(&self, _chunk: &[Frame]) -> PrividResult<ChunkValue> {
        Ok(ChunkValue::Scalar(0.0))
    }
}

/// Confidence filtering and non-max suppression ahead of tracking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionFilter {
    pub confidence_threshold: f64,
    pub nms_max_overlap: f64,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            nms_max_overlap: 1.0,
        }
    }
}

impl DetectionFilter {
    pub fn apply(&self, rows: &[DetectionRow]) -> Vec<Detection> {
        let detections: Vec<Detection> = rows
            .iter()
            .filter(|r| r.confidence() >= self.confidence_threshold)
            .map(Detection::from_row)
            .collect();
        non_max_suppression(&detections, self.nms_max_overlap)
            .into_iter()
            .map(|i| detections[i].clone())
            .collect()
    }

    fn descriptor(&self) -> String {
        format!(
            "CF:{:.2}_NMS:{:.2}",
            self.confidence_threshold, self.nms_max_overlap
        )
    }
}

/// Counts distinct confirmed tracks per chunk.
///
/// Also reports a smart-adjust correction: the mean of the detection counts
/// in the first and last frame, which estimates objects cut in two by the
/// chunk boundaries.
#[derive(Debug, Clone)]
pub struct TrackCountAggregator<F = IouTrackerConfig> {
    filter: DetectionFilter,
    tracker: F,
}

impl<F: TrackerFactory> TrackCountAggregator<F> {
    pub fn new(filter: DetectionFilter, tracker: F) -> Self {
        Self { filter, tracker }
    }
}

impl Default for TrackCountAggregator {
    fn default() -> Self {
        Self::new(DetectionFilter::default(), IouTrackerConfig::default())
    }
}

impl<F: TrackerFactory> ChunkAggregator for TrackCountAggregator<F> {
    fn descriptor(&self) -> String {
        format!(
            "COUNT_{}_{}",
            self.filter.descriptor(),
            self.tracker.descriptor()
        )
    }

    fn invoke(&self, chunk: &[Frame]) -> PrividResult<ChunkValue> {
        let mut tracker = self.tracker.build();
        let mut ids = BTreeSet::new();
        let mut detections_per_frame = Vec::with_capacity(chunk.len());

        for rows in chunk {
            let detections = self.filter.apply(rows);
            detections_per_frame.push(detections.len());
            tracker.predict();
            tracker.update(&detections);
            ids.extend(tracker.visible_tracks().into_iter().map(|t| t.id));
        }

        let correction = match (detections_per_frame.first(), detections_per_frame.last()) {
            (Some(first), Some(last)) => (first + last) as f64 * 0.5,
            _ => 0.0,
        };
        Ok(ChunkValue::adjusted(ids.len() as f64, correction))
    }
}

/// Counts confirmed tracks whose top edge rose by more than `min_dist`
/// pixels between their first and last appearance in the chunk.
#[derive(Debug, Clone)]
pub struct UpwardTrajectoryAggregator<F = IouTrackerConfig> {
    filter: DetectionFilter,
    tracker: F,
    min_dist: f64,
}

impl<F: TrackerFactory> UpwardTrajectoryAggregator<F> {
    pub const DEFAULT_MIN_DIST: f64 = 10.0;

    pub fn new(filter: DetectionFilter, tracker: F, min_dist: f64) -> Self {
        Self {
            filter,
            tracker,
            min_dist,
        }
    }
}

impl<F: TrackerFactory> ChunkAggregator for UpwardTrajectoryAggregator<F> {
    fn descriptor(&self) -> String {
        let mut descriptor = format!(
            "UPWARD_{}_{}",
            self.filter.descriptor(),
            self.tracker.descriptor()
        );
        // Older cache keys omit the default.
        if self.min_dist != Self::DEFAULT_MIN_DIST {
            descriptor.push_str(&format!("_MD:{}", self.min_dist));
        }
        descriptor
    }

    fn invoke(&self, chunk: &[Frame]) -> PrividResult<ChunkValue> {
        let mut tracker = self.tracker.build();
        let mut tops: BTreeMap<u64, (f64, f64)> = BTreeMap::new();

        for rows in chunk {
            let detections = self.filter.apply(rows);
            tracker.predict();
            tracker.update(&detections);
            for track in tracker.visible_tracks() {
                tops.entry(track.id)
                    .and_modify(|(_, last)| *last = track.top())
                    .or_insert((track.top(), track.top()));
            }
        }

        let upward = tops
            .values()
            .filter(|(first, last)| first - last > self.min_dist)
            .count();
        Ok(ChunkValue::Scalar(upward as f64))
    }
}

//! Multi-object tracking behind the built-in aggregators.
//!
//! The pipeline only needs "which track ids are visible at each frame".
//! [`Tracker`] is that seam; [`IouTracker`] is a small greedy implementation:
//! - IoU matching, gated by cosine distance of appearance features
//! - Tracks confirm after `n_init` consecutive hits
//! - Tentative tracks die on their first miss, confirmed ones after `max_age`

use privid_model::detection::DetectionRow;

/// A detection as the tracker consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// `[left, top, width, height]`.
    pub tlwh: [f64; 4],
    pub confidence: f64,
    pub feature: Vec<f64>,
}

impl Detection {
    pub fn from_row(row: &DetectionRow) -> Self {
        Self {
            tlwh: row.tlwh(),
            confidence: row.confidence(),
            feature: row.appearance_feature().to_vec(),
        }
    }

    /// `[left, top, right, bottom]`.
    pub fn tlbr(&self) -> [f64; 4] {
        tlwh_to_tlbr(self.tlwh)
    }
}

/// A track visible at the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleTrack {
    pub id: u64,
    pub tlwh: [f64; 4],
}

impl VisibleTrack {
    pub fn top(&self) -> f64 {
        self.tlwh[1]
    }
}

/// Frame-by-frame multi-object tracker.
pub trait Tracker {
    /// Advance every track by one frame.
    fn predict(&mut self);

    /// Associate this frame's detections with existing tracks.
    fn update(&mut self, detections: &[Detection]);

    /// Confirmed tracks matched at the latest update.
    fn visible_tracks(&self) -> Vec<VisibleTrack>;
}

/// Builds a fresh tracker; aggregators call it once per chunk.
pub trait TrackerFactory: Send + Sync {
    type Tracker: Tracker;

    fn build(&self) -> Self::Tracker;

    /// Parameter string folded into aggregator descriptors.
    fn descriptor(&self) -> String;
}

/// Parameters of [`IouTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IouTrackerConfig {
    /// Appearance gate: pairs farther apart than this never match.
    pub max_cosine_distance: f64,
    /// Pairs with `1 - IoU` above this never match.
    pub max_iou_distance: f64,
    /// Frames a confirmed track survives without a match.
    pub max_age: u32,
    /// Hits required to confirm a track.
    pub n_init: u32,
}

impl Default for IouTrackerConfig {
    fn default() -> Self {
        Self {
            max_cosine_distance: 0.5,
            max_iou_distance: 0.7,
            max_age: 96,
            n_init: 9,
        }
    }
}

impl TrackerFactory for IouTrackerConfig {
    type Tracker = IouTracker;

    fn build(&self) -> IouTracker {
        IouTracker::new(*self)
    }

    fn descriptor(&self) -> String {
        format!(
            "CO:{:.2}_IO:{:.2}_MA:{}_NI:{}",
            self.max_cosine_distance, self.max_iou_distance, self.max_age, self.n_init
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

#[derive(Debug, Clone)]
struct Track {
    id: u64,
    tlwh: [f64; 4],
    feature: Vec<f64>,
    hits: u32,
    time_since_update: u32,
    state: TrackState,
}

/// Greedy IoU tracker with an appearance gate.
#[derive(Debug, Clone)]
pub struct IouTracker {
    config: IouTrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl IouTracker {
    pub fn new(config: IouTrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    fn start_track(&mut self, detection: &Detection) {
        self.tracks.push(Track {
            id: self.next_id,
            tlwh: detection.tlwh,
            feature: detection.feature.clone(),
            hits: 1,
            time_since_update: 0,
            state: TrackState::Tentative,
        });
        self.next_id += 1;
    }

    fn is_candidate(&self, track: &Track, detection: &Detection) -> Option<f64> {
        let cost = 1.0 - iou(track.tlwh, detection.tlwh);
        if cost > self.config.max_iou_distance {
            return None;
        }
        if cosine_distance(&track.feature, &detection.feature) > self.config.max_cosine_distance {
            return None;
        }
        Some(cost)
    }
}

impl Tracker for IouTracker {
    fn predict(&mut self) {
        for track in &mut self.tracks {
            track.time_since_update += 1;
        }
    }

    fn update(&mut self, detections: &[Detection]) {
        let mut pairs = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, detection) in detections.iter().enumerate() {
                if let Some(cost) = self.is_candidate(track, detection) {
                    pairs.push((cost, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut detection_matched = vec![false; detections.len()];
        for (_, ti, di) in pairs {
            if track_matched[ti] || detection_matched[di] {
                continue;
            }
            track_matched[ti] = true;
            detection_matched[di] = true;

            let track = &mut self.tracks[ti];
            let detection = &detections[di];
            track.tlwh = detection.tlwh;
            track.feature.clone_from(&detection.feature);
            track.hits += 1;
            track.time_since_update = 0;
            if track.state == TrackState::Tentative && track.hits >= self.config.n_init {
                track.state = TrackState::Confirmed;
            }
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if *matched {
                continue;
            }
            if track.state == TrackState::Tentative
                || track.time_since_update > self.config.max_age
            {
                track.state = TrackState::Deleted;
            }
        }
        self.tracks.retain(|t| t.state != TrackState::Deleted);

        for (detection, matched) in detections.iter().zip(&detection_matched) {
            if !matched {
                self.start_track(detection);
            }
        }
    }

    fn visible_tracks(&self) -> Vec<VisibleTrack> {
        self.tracks
            .iter()
            .filter(|t| t.state == TrackState::Confirmed && t.time_since_update == 0)
            .map(|t| VisibleTrack {
                id: t.id,
                tlwh: t.tlwh,
            })
            .collect()
    }
}

/// Suppress detections covered by a higher-scoring one.
///
/// Overlap is the intersection over the area of the lower-scoring box, with
/// pixel-inclusive extents. Returns kept indices, highest score first.
pub fn non_max_suppression(detections: &[Detection], max_overlap: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[a]
            .confidence
            .total_cmp(&detections[b].confidence)
            .then(a.cmp(&b))
    });

    let mut keep = Vec::new();
    while let Some(best) = order.pop() {
        keep.push(best);
        let [x1, y1, x2, y2] = detections[best].tlbr();
        order.retain(|&other| {
            let [ox1, oy1, ox2, oy2] = detections[other].tlbr();
            let w = (x2.min(ox2) - x1.max(ox1) + 1.0).max(0.0);
            let h = (y2.min(oy2) - y1.max(oy1) + 1.0).max(0.0);
            let area = (ox2 - ox1 + 1.0) * (oy2 - oy1 + 1.0);
            w * h / area <= max_overlap
        });
    }
    keep
}

pub fn tlwh_to_tlbr(tlwh: [f64; 4]) -> [f64; 4] {
    [tlwh[0], tlwh[1], tlwh[0] + tlwh[2], tlwh[1] + tlwh[3]]
}

/// Intersection over union of two `tlwh` boxes.
pub fn iou(a: [f64; 4], b: [f64; 4]) -> f64 {
    let [ax1, ay1, ax2, ay2] = tlwh_to_tlbr(a);
    let [bx1, by1, bx2, by2] = tlwh_to_tlbr(b);
    let w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter = w * h;
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// `1 - cos(a, b)`; zero when either vector is empty, zero, or lengths differ.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    1.0 - dot / (na * nb)
}

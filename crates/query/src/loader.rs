//! Raw detection loading and chunking.
//!
//! One CSV file exists per recorded hour (and per spatial split). Each file is
//! walked at the analysis rate via [`FrameDecimator`], the hours are
//! concatenated into a single frame stream, and the stream is cut into chunks
//! of `frames_per_chunk` analyzed frames.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use privid_common::clock::{DecimatedFrames, FrameDecimator};
use privid_common::config::AnalysisConfig;
use privid_common::error::{PrividError, PrividResult};
use privid_model::detection::{Chunk, DetectionRow, Frame, FrameIndex};
use privid_model::source::DataSource;

/// Locates and streams the raw files of one video.
#[derive(Debug, Clone)]
pub struct RawChunkLoader {
    features_dir: PathBuf,
    masked_features_dir: PathBuf,
    video: String,
    source: DataSource,
    hours: Vec<u32>,
    decimator: FrameDecimator,
    frames_per_chunk: usize,
}

impl RawChunkLoader {
    pub fn new(
        config: &AnalysisConfig,
        video: &str,
        source: DataSource,
        frames_per_chunk: usize,
    ) -> PrividResult<Self> {
        if frames_per_chunk == 0 {
            return Err(PrividError::config("frames_per_chunk must be positive"));
        }
        Ok(Self {
            features_dir: config.features_dir(),
            masked_features_dir: config.masked_features_dir(),
            video: video.to_string(),
            source,
            hours: config.hours(video)?.to_vec(),
            decimator: config.decimator()?,
            frames_per_chunk,
        })
    }

    /// Path of the raw file for one hour (and split, for spatial-hybrid).
    pub fn raw_file_path(&self, hour: u32, split: Option<usize>) -> PrividResult<PathBuf> {
        let video = &self.video;
        let (dir, suffix) = match (self.source, split) {
            (DataSource::Original, None) => (&self.features_dir, String::new()),
            (DataSource::JustHybrid, None) => (&self.masked_features_dir, String::new()),
            (DataSource::SpatialHybrid, Some(split)) => {
                (&self.masked_features_dir, format!("_m{split}"))
            }
            (DataSource::SpatialHybrid, None) => {
                return Err(PrividError::config(
                    "Spatial-hybrid raw files are per split; no split given",
                ))
            }
            (DataSource::Original | DataSource::JustHybrid, Some(_)) => {
                return Err(PrividError::config(format!(
                    "Data source {} has no spatial splits",
                    self.source
                )))
            }
            (DataSource::OriginalWithHybrid, _) => return Err(self.source.unsupported()),
        };
        Ok(dir.join(video).join(format!("{video}{hour}{suffix}.csv")))
    }

    /// Decimated frames of every hour, in order.
    pub fn frames(&self, split: Option<usize>) -> PrividResult<FrameStream> {
        let paths = self
            .hours
            .iter()
            .map(|&hour| self.raw_file_path(hour, split))
            .collect::<PrividResult<VecDeque<_>>>()?;
        Ok(FrameStream::new(paths, self.decimator))
    }

    /// Chunks of one stream (the whole scene, or one split).
    pub fn chunks(&self, split: Option<usize>) -> PrividResult<Chunks<FrameStream>> {
        Ok(Chunks::new(self.frames(split)?, self.frames_per_chunk))
    }

    /// Chunks of every split, advanced together.
    pub fn lockstep_chunks(&self, num_splits: usize) -> PrividResult<LockstepChunks> {
        let streams = (0..num_splits)
            .map(|split| self.chunks(Some(split)))
            .collect::<PrividResult<Vec<_>>>()?;
        Ok(LockstepChunks::new(streams))
    }

    pub fn frames_per_chunk(&self) -> usize {
        self.frames_per_chunk
    }
}

/// Read one hour of detections grouped by frame index.
pub fn read_hour_file(path: &Path) -> PrividResult<BTreeMap<FrameIndex, Frame>> {
    let file = File::open(path).map_err(|e| PrividError::from_io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut frames: BTreeMap<FrameIndex, Frame> = BTreeMap::new();
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|source| PrividError::RawData {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let values = record
            .iter()
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                PrividError::processing(format!("{}:{line}: {e}", path.display()))
            })?;
        let row = DetectionRow::new(values).map_err(|e| {
            PrividError::processing(format!("{}:{line}: {e}", path.display()))
        })?;
        frames.entry(row.frame_index()).or_default().push(row);
        rows += 1;
    }

    tracing::debug!("Loaded {} detections from {}", rows, path.display());
    Ok(frames)
}

/// Decimated frames across a sequence of hour files.
///
/// Files are opened lazily, one at a time. After the first error the stream
/// ends.
#[derive(Debug)]
pub struct FrameStream {
    paths: VecDeque<PathBuf>,
    decimator: FrameDecimator,
    current: Option<(BTreeMap<FrameIndex, Frame>, DecimatedFrames)>,
}

impl FrameStream {
    pub fn new(paths: VecDeque<PathBuf>, decimator: FrameDecimator) -> Self {
        Self {
            paths,
            decimator,
            current: None,
        }
    }
}

impl Iterator for FrameStream {
    type Item = PrividResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((rows, frames)) = &mut self.current {
                if let Some(index) = frames.next() {
                    return Some(Ok(rows.remove(&index).unwrap_or_default()));
                }
                self.current = None;
            }

            let path = self.paths.pop_front()?;
            match read_hour_file(&path) {
                Ok(rows) => self.current = Some((rows, self.decimator.frames())),
                Err(e) => {
                    self.paths.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Groups a frame stream into chunks of `frames_per_chunk` frames.
///
/// The final partial chunk is emitted. An empty stream yields one empty
/// chunk. An error is yielded once and ends the stream.
#[derive(Debug)]
pub struct Chunks<I> {
    frames: I,
    frames_per_chunk: usize,
    emitted: usize,
    done: bool,
}

impl<I> Chunks<I>
where
    I: Iterator<Item = PrividResult<Frame>>,
{
    pub fn new(frames: I, frames_per_chunk: usize) -> Self {
        Self {
            frames,
            frames_per_chunk: frames_per_chunk.max(1),
            emitted: 0,
            done: false,
        }
    }
}

impl<I> Iterator for Chunks<I>
where
    I: Iterator<Item = PrividResult<Frame>>,
{
    type Item = PrividResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.frames_per_chunk);
        while chunk.len() < self.frames_per_chunk {
            match self.frames.next() {
                Some(Ok(frame)) => chunk.push(frame),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    if chunk.is_empty() && self.emitted > 0 {
                        return None;
                    }
                    break;
                }
            }
        }

        self.emitted += 1;
        Some(Ok(chunk))
    }
}

/// Per-split chunk streams advanced together, one chunk per split per step.
///
/// Ends as soon as any split runs out.
#[derive(Debug)]
pub struct LockstepChunks {
    streams: Vec<Chunks<FrameStream>>,
    done: bool,
}

impl LockstepChunks {
    pub fn new(streams: Vec<Chunks<FrameStream>>) -> Self {
        Self {
            streams,
            done: false,
        }
    }
}

impl Iterator for LockstepChunks {
    type Item = PrividResult<Vec<Chunk>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.streams.is_empty() {
            return None;
        }

        let mut step = Vec::with_capacity(self.streams.len());
        for stream in &mut self.streams {
            match stream.next() {
                Some(Ok(chunk)) => step.push(chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
        Some(Ok(step))
    }
}

//! Privid CLI: windowed differential-privacy queries over detection output.
//!
//! Usage:
//!   privid run [OPTIONS]       Run a query and print its windows and noise
//!   privid noise [OPTIONS]     Calibrate noise without touching raw data
//!   privid frames [OPTIONS]    Show frame decimation statistics
//!   privid config [--write]    Print or save the effective configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use privid_common::config::AnalysisConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "privid",
    about = "Windowed differential-privacy queries over video detection output",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query over one video
    Run(RunArgs),

    /// Sensitivity, noise scale, ribbon and accuracy for given bounds
    Noise(NoiseArgs),

    /// Frame decimation statistics
    Frames {
        /// Native frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Analysis frame rate
        #[arg(long, default_value = "8")]
        analysis_fps: u32,

        /// Number of leading frame indices to print
        #[arg(long, default_value = "16")]
        head: usize,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Write it to `--config` (or the standard location) instead
        #[arg(long)]
        write: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AggregatorKind {
    /// Zero per chunk; accounting only
    Null,
    /// Distinct confirmed tracks per chunk
    Count,
    /// Tracks moving up the frame per chunk
    Upward,
}

/// Window and privacy options shared by `run` and `noise`.
#[derive(Args)]
pub struct WindowArgs {
    /// Analyzed frames per chunk
    #[arg(long, default_value = "8")]
    pub frames_per_chunk: usize,

    /// Chunks per released window
    #[arg(long, default_value = "1800")]
    pub chunks_per_window: usize,

    /// Window function: sum|mean|max|median
    #[arg(long, default_value = "sum")]
    pub window_fn: String,

    /// Privacy budget
    #[arg(long, default_value = "1.0")]
    pub epsilon: f64,

    /// Lower bound(s); one value, or one per split separated by commas
    #[arg(long, value_delimiter = ',')]
    pub lower: Vec<f64>,

    /// Upper bound(s); one value, or one per split separated by commas
    #[arg(long, value_delimiter = ',')]
    pub upper: Vec<f64>,

    /// Segments of the recording one individual may appear in
    #[arg(long, default_value = "1")]
    pub k_segments: u32,

    /// Report the noise scale and ribbon in frame units
    #[arg(long)]
    pub frame_units: bool,
}

/// Detector filter and tracker options.
#[derive(Args)]
pub struct TrackerArgs {
    /// Minimum detection confidence
    #[arg(long, default_value = "0.8")]
    pub confidence: f64,

    /// Non-max suppression overlap threshold
    #[arg(long, default_value = "1.0")]
    pub nms_max_overlap: f64,

    /// Appearance gate for matching
    #[arg(long, default_value = "0.5")]
    pub max_cosine_distance: f64,

    /// Maximum IoU distance for matching
    #[arg(long, default_value = "0.7")]
    pub max_iou_distance: f64,

    /// Frames a confirmed track survives without a match
    #[arg(long, default_value = "96")]
    pub max_age: u32,

    /// Hits before a track is confirmed
    #[arg(long, default_value = "9")]
    pub n_init: u32,

    /// Minimum upward movement in pixels (upward aggregator)
    #[arg(long, default_value = "10.0")]
    pub min_dist: f64,
}

#[derive(Args)]
pub struct RunArgs {
    /// Video name, as listed in the configuration
    #[arg(long)]
    pub video: String,

    /// Data source: original|just-hybrid|spatial-hybrid
    #[arg(long, default_value = "just-hybrid")]
    pub source: String,

    /// Per-chunk aggregator
    #[arg(long, value_enum, default_value = "count")]
    pub aggregator: AggregatorKind,

    #[command(flatten)]
    pub window: WindowArgs,

    #[command(flatten)]
    pub tracker: TrackerArgs,

    /// Number of spatial splits (spatial-hybrid)
    #[arg(long)]
    pub splits: Option<usize>,

    /// Merge of per-split values: sum|mean|max
    #[arg(long, default_value = "sum")]
    pub split_combine: String,

    /// Subtract the boundary correction from chunk counts
    #[arg(long)]
    pub smart_adjust: bool,

    /// Clip after combining splits instead of per split
    #[arg(long)]
    pub bounds_after_split: bool,

    /// Override the measured persistence (frames)
    #[arg(long)]
    pub persistence: Option<f64>,

    /// Add seeded Laplace noise to every window
    #[arg(long)]
    pub release_seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct NoiseArgs {
    #[command(flatten)]
    pub window: WindowArgs,

    /// Maximum persistence in frames
    #[arg(long)]
    pub persistence: f64,

    /// Ground truth for Monte-Carlo accuracy
    #[arg(long)]
    pub truth: Option<f64>,

    /// Monte-Carlo iterations
    #[arg(long, default_value = "100")]
    pub iterations: usize,

    /// Draws per iteration
    #[arg(long, default_value = "1")]
    pub samples: usize,

    /// Noise seed
    #[arg(long, default_value = "2")]
    pub seed: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `config --write` may target a file that does not exist yet.
    let creating = matches!(cli.command, Commands::Config { write: true });
    let config = match &cli.config {
        Some(path) if !creating || path.exists() => AnalysisConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        _ => AnalysisConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    privid_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Run(args) => commands::run::run(&config, args),
        Commands::Noise(args) => commands::noise::run(args),
        Commands::Frames {
            fps,
            analysis_fps,
            head,
        } => commands::frames::run(fps, analysis_fps, head),
        Commands::Config { write } => commands::config::run(&config, write, cli.config.as_deref()),
    }
}

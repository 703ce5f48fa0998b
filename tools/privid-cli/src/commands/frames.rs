//! Show how the native frame rate is decimated to the analysis rate.

use privid_common::clock::FrameDecimator;

pub fn run(fps: u32, analysis_fps: u32, head: usize) -> anyhow::Result<()> {
    let decimator = FrameDecimator::new(fps, analysis_fps)?;

    let head_frames: Vec<String> = decimator.frames().take(head).map(|f| f.to_string()).collect();
    let (count, total, min, max) = decimator.steps().fold(
        (0u64, 0u64, u64::MAX, 0u64),
        |(count, total, min, max), step| (count + 1, total + step, min.min(step), max.max(step)),
    );

    println!("Decimation {fps} fps -> {analysis_fps} fps");
    println!("  Mean stride: {:.4}", decimator.mean_stride());
    println!("  Stride range: {min}..={max}");
    println!("  Frames per hour: {count}");
    println!(
        "  Native frames covered: {total} (expected {})",
        decimator.native_frames_per_hour()
    );
    println!("  First frames: {}", head_frames.join(", "));

    if total != decimator.native_frames_per_hour() {
        anyhow::bail!("Decimation drifted by {} frames", total as i64 - decimator.native_frames_per_hour() as i64);
    }
    Ok(())
}

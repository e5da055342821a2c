//! Framecast demo host
//!
//! Plays the role of a render host: submits synthetic color bars to an
//! [`OutputStream`] at the configured frame rate and logs what the sender sees.
//!
//! Usage: `framecast [config.json] [frame-count]`

use anyhow::{Context, Result};
use framecast_core::{color_bars, FramecastError, OutputConfig};
use framecast_stream::{LogSink, OutputStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;
const DEFAULT_FRAMES: u64 = 250;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next().map(PathBuf::from) {
        Some(path) => load_config(&path)?,
        None => OutputConfig {
            enabled: true,
            ..Default::default()
        },
    };
    let frames = match args.next() {
        Some(n) => n.parse().context("frame count must be a positive integer")?,
        None => DEFAULT_FRAMES,
    };

    info!(
        source = %config.source_name,
        format = config.wire_format().fourcc_str(),
        rate = %config.rate(),
        gpu = config.gpu_acceleration,
        async_sending = config.async_sending,
        "Framecast starting"
    );

    // One log line per second of video.
    let log_interval = config.rate().to_fps_f64().round().max(1.0) as u64;
    let mut stream = OutputStream::new(Box::new(LogSink::new(log_interval)), &config);
    run(&mut stream, &config, frames)?;

    stream.flush(Duration::from_secs(5));
    let stats = stream.stats();
    info!(
        sent = stats.frames_sent,
        send_failures = stats.send_failures,
        gpu = stats.dispatch.gpu_conversions,
        cpu = stats.dispatch.cpu_conversions,
        fallbacks = stats.dispatch.gpu_fallbacks,
        "Framecast finished"
    );
    stream.stop();
    Ok(())
}

fn load_config(path: &Path) -> Result<OutputConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = OutputConfig::from_json_str(&json)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

/// Submit `frames` frames, paced to the configured rate.
fn run(stream: &mut OutputStream, config: &OutputConfig, frames: u64) -> Result<()> {
    let pixels = color_bars(WIDTH, HEIGHT);
    let frame_duration = config.rate().frame_duration();
    let start = Instant::now();

    for n in 0..frames {
        match stream.submit_frame(&pixels, WIDTH, HEIGHT, config) {
            Ok(()) => {}
            Err(e @ FramecastError::InvalidConfig(_)) => {
                return Err(e).context("submitting frame");
            }
            Err(e) => warn!(frame = n, error = %e, "frame not sent"),
        }

        let due = start + frame_duration.mul_f64((n + 1) as f64);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }
    Ok(())
}

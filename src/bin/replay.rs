//! replay - run a recorded detection log through the engine
//!
//! Frames are synthesized (or taken from one background image) and stamped
//! with the log's `t` offsets, so dwell and cooldown timing is reproducible
//! regardless of how fast the log is read. Alerts are appended to
//! `<out>/alerts.jsonl` and evidence lands in `<out>/evidence`. Nothing is
//! sent over the network.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use railguard_engine::{EngineConfig, Frame, FrameCycle, ReplayDetector};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detection log (JSON lines). "-" reads stdin.
    input: String,
    /// Output directory for alerts and evidence.
    #[arg(long, default_value = "replay_out")]
    out: PathBuf,
    /// Optional engine config; network endpoints in it are ignored.
    #[arg(long, env = "RAILGUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Frame rate assumed for lines without a `t` field.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Background image for every frame (evidence is drawn on it).
    #[arg(long)]
    background: Option<PathBuf>,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 720)]
    height: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("create output dir {}", args.out.display()))?;
    let out_dir = fs::canonicalize(&args.out)?;
    let alerts_path = out_dir.join("alerts.jsonl");

    let mut cfg = EngineConfig::load_from(args.config.as_deref())?;
    cfg.evidence.dir = out_dir.join("evidence");
    cfg.alert.url = url::Url::from_file_path(&alerts_path)
        .map_err(|_| anyhow!("cannot express {} as a file url", alerts_path.display()))?
        .to_string();
    cfg.alert.outbox_dir = None;
    cfg.stream.url = None;

    let background = match &args.background {
        Some(path) => image::open(path)
            .with_context(|| format!("open background {}", path.display()))?
            .into_rgb8(),
        None => RgbImage::from_pixel(args.width, args.height, Rgb([48, 48, 48])),
    };

    let mut detector = ReplayDetector::open(&args.input)?;
    let mut cycle = FrameCycle::from_config(&cfg)?;

    let base = Instant::now();
    let wall_base = Utc::now();
    let frame_step = Duration::from_secs_f64(1.0 / args.fps as f64);
    let mut sequence = 0u64;
    let mut skipped = 0u64;
    let mut alerts = 0usize;

    loop {
        let batch = match detector.next_batch() {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(err) => {
                log::warn!("{}; skipping line", err);
                skipped += 1;
                continue;
            }
        };
        let offset = batch
            .offset
            .unwrap_or_else(|| frame_step.mul_f64(sequence as f64));
        sequence += 1;
        let captured_at = base
            .checked_add(offset)
            .context("replay offset out of range")?;
        let wall_clock = chrono::Duration::from_std(offset)
            .ok()
            .and_then(|offset| wall_base.checked_add_signed(offset))
            .context("replay offset out of range")?;
        let frame = Frame::with_times(background.clone(), sequence, captured_at, wall_clock);

        let report = cycle.process(&frame, batch.detections);
        for alert in &report.alerts {
            println!(
                "t={:>8.3}s ALERT track={} class={} dwell={:.2}s evidence={}",
                offset.as_secs_f64(),
                alert.object_id,
                alert.class_label,
                alert.dwell.as_secs_f64(),
                alert
                    .evidence
                    .as_ref()
                    .map(|e| e.filename.as_str())
                    .unwrap_or("-")
            );
        }
        alerts += report.alerts.len();
    }

    let stats = cycle.dispatcher().stats();
    println!(
        "replayed {} frames ({} skipped): {} alerts, {} suppressed by cooldown",
        sequence, skipped, alerts, stats.suppressed
    );
    println!("alerts:   {}", alerts_path.display());
    println!("evidence: {}", cfg.evidence.dir.display());
    Ok(())
}

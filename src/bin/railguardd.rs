//! railguardd - per-camera RailGuard engine daemon
//!
//! One process per camera. The daemon:
//! 1. Opens the configured capture source (failure here is fatal)
//! 2. Reads one line of tracked detections per captured frame from the
//!    external tracker (JSON lines on stdin or a file)
//! 3. Tracks zone dwell, fires cooldown-gated alerts with local evidence
//! 4. Publishes an annotated live view when a stream URL is configured
//! 5. Stops on Ctrl-C/SIGTERM or when either input ends

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use railguard_engine::{open_source, EngineConfig, FrameCycle, ReplayDetector};

#[derive(Parser, Debug)]
#[command(author, version, about = "Zone dwell-time and alert engine for one camera")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "RAILGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Capture source; overrides source.url from the config.
    /// Supported: stub://NAME, http(s)://HOST/stream, a local image file or directory.
    #[arg(long)]
    source: Option<String>,

    /// Tracked detections, one JSON object per frame. "-" reads stdin.
    #[arg(long, env = "RAILGUARD_DETECTIONS", default_value = "-")]
    detections: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = EngineConfig::load_from(args.config.as_deref()).context("load configuration")?;
    if let Some(url) = args.source {
        cfg.source.url = url;
    }

    log::info!(
        "railguardd {} starting: camera={} source={}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera_id.as_deref().unwrap_or("-"),
        cfg.source.url
    );
    log::info!(
        "dwell threshold {:.1}s, cooldown {:.1}s, exit policy {:?}, classes [{}]",
        cfg.dwell.threshold_secs,
        cfg.alert.cooldown_secs,
        cfg.dwell.exit_policy,
        cfg.alert.classes.join(", ")
    );
    log::info!(
        "alerts -> {}, evidence -> {}",
        cfg.alert.url,
        cfg.evidence.dir.display()
    );

    let mut source = open_source(&cfg.source)?;
    source
        .connect()
        .with_context(|| format!("open capture source {}", cfg.source.url))?;

    let mut detector = ReplayDetector::open(&args.detections)?;
    let mut cycle = FrameCycle::from_config(&cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("install shutdown handler")?;
    }

    let summary = cycle
        .run(source.as_mut(), &mut detector, &shutdown)
        .context("frame loop failed")?;

    let stats = cycle.dispatcher().stats();
    log::info!(
        "railguardd stopped: frames={} skipped={} alerts={} delivered={} delivery_failures={}",
        summary.frames,
        summary.skipped,
        summary.alerts,
        stats.delivered,
        stats.delivery_failures
    );
    Ok(())
}

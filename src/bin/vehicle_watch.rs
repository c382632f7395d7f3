//! vehicle_watch - Detect and count vehicles on a live MJPEG camera stream.
//!
//! Configuration comes from the JSON file named by VEHICLE_WATCH_CONFIG, then
//! VEHICLE_WATCH_* environment overrides, then the flags below.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use vehicle_watch::config::WatchConfig;
use vehicle_watch::detect::{load_model, DetectionEngine};
use vehicle_watch::health::{ConnectionHealthMonitor, ThreadSleeper};
use vehicle_watch::ingest::{
    probe_stream, FallbackStreamReader, FrameAcquirer, PrimaryStreamReader, ProbeOutcome,
};
use vehicle_watch::pipeline::WatchLoop;
use vehicle_watch::render::{Annotator, LogDisplay};
use vehicle_watch::schedule::FrameScheduler;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect and count vehicles on a live MJPEG camera stream"
)]
struct Args {
    /// MJPEG stream URL.
    #[arg(long)]
    url: Option<String>,

    /// Run detection on every Nth frame.
    #[arg(long)]
    decimation: Option<u32>,

    /// Path to the ONNX detector weights.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Optional JSON model descriptor.
    #[arg(long)]
    model_config: Option<PathBuf>,

    /// Newline-separated class names.
    #[arg(long)]
    class_names: Option<PathBuf>,

    /// TrueType font for labels and HUD text.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Skip the startup connection probe.
    #[arg(long)]
    skip_probe: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = WatchConfig::load()?;
    if let Some(url) = args.url {
        cfg.stream.url = url;
    }
    if let Some(decimation) = args.decimation {
        cfg.detection.decimation = decimation;
    }
    if let Some(model) = args.model {
        cfg.model.weights = model;
    }
    if let Some(model_config) = args.model_config {
        cfg.model.config = Some(model_config);
    }
    if let Some(class_names) = args.class_names {
        cfg.model.class_names = class_names;
    }
    if let Some(font) = args.font {
        cfg.display.label_font = Some(font);
    }
    cfg.validate()?;

    let (mut model, class_names) = match load_model(&cfg.model) {
        Ok(loaded) => loaded,
        Err(err) => {
            log::error!(
                "failed to load detector from {}: {:#}",
                cfg.model.weights.display(),
                err
            );
            return Err(err.context("detector unavailable; refusing to start"));
        }
    };
    log::info!(
        "detector {} ready ({} classes, input {}px)",
        model.name(),
        class_names.len(),
        model.input_size()
    );
    if let Err(err) = model.warm_up() {
        log::warn!("detector warm-up failed: {:#}", err);
    }

    if !args.skip_probe {
        probe(&cfg);
    }

    let annotator = Annotator::from_font_file(cfg.display.label_font.as_deref())?;
    if cfg.display.label_font.is_none() {
        log::info!("no label font configured; drawing boxes without text");
    }
    let engine = DetectionEngine::new(model, class_names, &cfg.detection, annotator)?;
    let scheduler = FrameScheduler::new(engine, cfg.detection.decimation);
    let acquirer = FrameAcquirer::new(
        PrimaryStreamReader::from_settings(&cfg.stream),
        FallbackStreamReader::from_settings(&cfg.stream)
            .context("prepare fallback capture backend")?,
    );
    let display = LogDisplay::with_ctrlc()?;

    log::info!(
        "watching {} (detect every {} frames)",
        cfg.stream.url,
        cfg.detection.decimation
    );
    let mut watch = WatchLoop::new(
        acquirer,
        scheduler,
        ConnectionHealthMonitor::from_settings(&cfg.health),
        display,
        ThreadSleeper,
    );
    let stats = watch.run()?;
    log::info!(
        "stopped after {} iterations: {} frames, {} detection runs, {} without a frame",
        stats.iterations,
        stats.frames,
        stats.detections_run,
        stats.disconnected
    );
    Ok(())
}

/// A failed probe is only a warning; the loop keeps retrying on its own.
fn probe(cfg: &WatchConfig) {
    match probe_stream(
        &cfg.stream.url,
        cfg.stream.connect_timeout,
        cfg.stream.probe_read_timeout,
    ) {
        Ok(ProbeOutcome::Ready { content_type }) => {
            log::info!("camera stream reachable ({})", content_type);
        }
        Ok(ProbeOutcome::UnexpectedContentType(content_type)) => {
            log::warn!(
                "camera answered with content type '{}', expected an MJPEG stream",
                content_type
            );
        }
        Ok(ProbeOutcome::Status(code)) => {
            log::warn!("camera answered with HTTP {}", code);
        }
        Err(err) => {
            log::warn!("camera probe failed: {:#}", err);
            log::warn!(
                "check that the camera is powered, on this network, and serving {}",
                cfg.stream.url
            );
        }
    }
}

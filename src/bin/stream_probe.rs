//! stream_probe - One-shot connectivity check against an MJPEG camera endpoint.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use vehicle_watch::config::WatchConfig;
use vehicle_watch::frame::Frame;
use vehicle_watch::ingest::{probe_stream, PrimaryStreamReader, ProbeOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "Check that a camera serves an MJPEG stream")]
struct Args {
    /// MJPEG stream URL (defaults to the configured one).
    #[arg(long)]
    url: Option<String>,

    /// Seconds to wait for the response headers.
    #[arg(long, default_value = "5")]
    read_timeout_secs: u64,

    /// Also pull and decode one frame.
    #[arg(long)]
    fetch_frame: bool,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = WatchConfig::load()?;
    if let Some(url) = args.url {
        cfg.stream.url = url;
    }
    cfg.validate()?;
    let url = cfg.stream.url.clone();

    let outcome = match probe_stream(
        &url,
        cfg.stream.connect_timeout,
        Duration::from_secs(args.read_timeout_secs),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("unreachable: {:#}", err);
            println!("hints:");
            println!("  - check that the camera is powered and on the same network");
            println!("  - check the IP address in {}", url);
            println!("  - try opening the URL in a browser");
            return Ok(ExitCode::FAILURE);
        }
    };

    match &outcome {
        ProbeOutcome::Ready { content_type } => println!("ok: {} ({})", url, content_type),
        ProbeOutcome::UnexpectedContentType(content_type) => {
            println!("unexpected content type '{}'", content_type);
            println!("hint: the URL may point at a web page instead of the stream endpoint");
        }
        ProbeOutcome::Status(code) => {
            println!("HTTP {}", code);
            println!("hint: check the stream path in {}", url);
        }
    }
    if !outcome.is_ready() {
        return Ok(ExitCode::FAILURE);
    }

    if args.fetch_frame {
        let mut reader = PrimaryStreamReader::from_settings(&cfg.stream);
        match reader.fetch() {
            Ok(frame) => print_frame(&frame),
            Err(err) => {
                println!("stream answered but no frame decoded: {}", err);
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_frame(frame: &Frame) {
    println!("frame: {}x{}", frame.width(), frame.height());
}

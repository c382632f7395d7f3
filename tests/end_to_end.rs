use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use vehicle_watch::config::DetectionSettings;
use vehicle_watch::detect::{ClassNames, DetectionEngine, RawCandidate, StubModel};
use vehicle_watch::error::{AcquireError, AcquireResult};
use vehicle_watch::frame::{AnnotatedFrame, Frame};
use vehicle_watch::health::{ConnectionHealthMonitor, Sleeper};
use vehicle_watch::ingest::{
    CaptureBackend, CaptureSession, FallbackStreamReader, FrameAcquirer, PrimaryStreamReader,
    RetryPolicy, StreamBoundaryParser, StreamTransport,
};
use vehicle_watch::pipeline::{Iteration, WatchLoop};
use vehicle_watch::render::{Annotator, Display};
use vehicle_watch::schedule::{FrameScheduler, Outcome};

fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&image)
        .expect("encode jpeg");
    bytes
}

fn car_model() -> StubModel {
    StubModel::new(
        32,
        vec![RawCandidate {
            center_x: 0.5,
            center_y: 0.5,
            width: 0.5,
            height: 0.5,
            class_scores: vec![0.0, 0.0, 0.9],
        }],
    )
}

fn engine(model: StubModel) -> DetectionEngine<StubModel> {
    DetectionEngine::new(
        model,
        ClassNames::new([
            "person", "bicycle", "car", "motorbike", "aeroplane", "bus", "train", "truck",
        ]),
        &DetectionSettings::default(),
        Annotator::default(),
    )
    .expect("engine")
}

/// Serves one body per open; refuses connections once the bodies run out.
struct QueueTransport {
    bodies: VecDeque<Vec<u8>>,
}

impl StreamTransport for QueueTransport {
    fn open(&mut self, _url: &str) -> AcquireResult<Box<dyn Read + Send>> {
        match self.bodies.pop_front() {
            Some(body) => Ok(Box::new(Cursor::new(body))),
            None => Err(AcquireError::Transport("connection refused".into())),
        }
    }
}

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&mut self, _duration: Duration) {}
}

struct DeadSession;

impl CaptureSession for DeadSession {
    fn is_open(&self) -> bool {
        false
    }

    fn read_latest(&mut self) -> Result<Frame> {
        Err(anyhow!("no capture device"))
    }
}

struct UnavailableBackend;

impl CaptureBackend for UnavailableBackend {
    type Session = DeadSession;

    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn open(&mut self, _url: &str) -> Result<DeadSession> {
        Err(anyhow!("backend offline"))
    }
}

struct StopAfter {
    limit: usize,
    shown: Vec<(u32, u32, usize)>,
}

impl Display for StopAfter {
    fn show(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        let (width, height) = frame.image().dimensions();
        self.shown.push((width, height, frame.vehicle_count()));
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        self.shown.len() >= self.limit
    }
}

#[test]
fn concatenated_stream_runs_detection_on_every_frame() {
    let mut stream = Vec::new();
    for shade in [10, 60, 110, 160, 210] {
        stream.extend_from_slice(&jpeg(80, 60, shade));
    }

    let mut parser = StreamBoundaryParser::new();
    let mut scheduler = FrameScheduler::new(engine(car_model()), 1);
    let mut results = Vec::new();
    for chunk in stream.chunks(333) {
        parser.push(chunk);
        while let Some(encoded) = parser.next_frame() {
            let frame = Frame::decode_jpeg(&encoded).expect("decode");
            results.push(scheduler.process(frame));
        }
    }

    assert_eq!(results.len(), 5);
    assert_eq!(scheduler.engine().model().invocations(), 5);
    for (i, processed) in results.iter().enumerate() {
        assert_eq!(processed.index, i as u64 + 1);
        assert_eq!(processed.outcome, Outcome::Detected);
        assert_eq!(processed.result.detections.len(), 1);
        assert_eq!(processed.result.detections[0].label, "car");
    }
}

#[test]
fn watch_loop_counts_vehicles_then_shows_placeholder_when_camera_drops() {
    let transport = QueueTransport {
        bodies: (0..4).map(|i| jpeg(120, 90, 40 * i as u8)).collect(),
    };
    let primary = PrimaryStreamReader::new(
        "http://camera.local/stream",
        transport,
        NoSleep,
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        },
    );
    let fallback = FallbackStreamReader::new("http://camera.local/stream", UnavailableBackend);
    let display = StopAfter {
        limit: 6,
        shown: Vec::new(),
    };
    let mut watch = WatchLoop::new(
        FrameAcquirer::new(primary, fallback),
        FrameScheduler::new(engine(car_model()), 2),
        ConnectionHealthMonitor::default(),
        display,
        NoSleep,
    );

    let stats = watch.run().expect("run");
    assert_eq!(stats.iterations, 6);
    assert_eq!(stats.frames, 4);
    assert_eq!(stats.detections_run, 2);
    assert_eq!(stats.disconnected, 2);

    let shown = &watch.display().shown;
    // Frame 1 is a cold start; 2 detects; 3 reuses; 4 detects.
    assert_eq!(
        &shown[..4],
        &[(120, 90, 0), (120, 90, 1), (120, 90, 1), (120, 90, 1)]
    );
    assert_eq!(&shown[4..], &[(640, 480, 0), (640, 480, 0)]);
    assert_eq!(watch.health().consecutive_failures(), 2);

    assert_eq!(
        watch.step().expect("step"),
        Iteration::Disconnected {
            consecutive_failures: 3,
            cooldown: None,
        }
    );
}

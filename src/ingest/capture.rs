//! Fallback capture session.
//!
//! The fallback reader keeps one long-lived capture session against the camera and
//! hands back only the freshest frame per call. The session is opened lazily, reused
//! across calls, and reopened whenever it reports that it is no longer open. Any
//! error while opening or reading becomes an `AcquireError::Session`.
//!
//! Backends:
//! - `HttpCapture`: a persistent MJPEG connection (default).
//! - `GstreamerCapture`: a GStreamer pipeline with a one-buffer dropping appsink
//!   (feature: capture-gstreamer).

use std::io::{ErrorKind, Read};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::http::{HttpTransport, StreamTransport};
use super::mjpeg::StreamBoundaryParser;
use super::FrameSource;
use crate::config::StreamSettings;
use crate::error::{AcquireError, AcquireResult};
use crate::frame::Frame;

/// An open capture against the camera.
pub trait CaptureSession {
    /// False once the underlying capture has stopped delivering.
    fn is_open(&self) -> bool;

    /// Read the most recent frame, discarding anything older.
    fn read_latest(&mut self) -> Result<Frame>;
}

/// Opens capture sessions.
pub trait CaptureBackend {
    type Session: CaptureSession;

    fn name(&self) -> &'static str;

    fn open(&mut self, url: &str) -> Result<Self::Session>;
}

#[cfg(feature = "capture-gstreamer")]
pub type DefaultCaptureBackend = GstreamerCapture;
#[cfg(not(feature = "capture-gstreamer"))]
pub type DefaultCaptureBackend = HttpCapture;

/// Secondary reader backed by a persistent capture session.
pub struct FallbackStreamReader<B: CaptureBackend = DefaultCaptureBackend> {
    url: String,
    backend: B,
    session: Option<B::Session>,
    opens: u64,
}

impl FallbackStreamReader<DefaultCaptureBackend> {
    pub fn from_settings(settings: &StreamSettings) -> Result<Self> {
        #[cfg(feature = "capture-gstreamer")]
        let backend = GstreamerCapture::new(settings.read_timeout)?;
        #[cfg(not(feature = "capture-gstreamer"))]
        let backend = HttpCapture::new(
            HttpTransport::new(settings.connect_timeout, settings.read_timeout),
            settings.chunk_size,
            settings.read_timeout,
        );
        Ok(Self::new(settings.url.clone(), backend))
    }
}

impl<B: CaptureBackend> FallbackStreamReader<B> {
    pub fn new(url: impl Into<String>, backend: B) -> Self {
        Self {
            url: url.into(),
            backend,
            session: None,
            opens: 0,
        }
    }

    /// Number of times a session open has been attempted.
    pub fn opens(&self) -> u64 {
        self.opens
    }

    pub fn fetch(&mut self) -> AcquireResult<Frame> {
        self.read().map_err(|err| {
            log::warn!("fallback {} capture failed: {:#}", self.backend.name(), err);
            AcquireError::Session(format!("{:#}", err))
        })
    }

    fn read(&mut self) -> Result<Frame> {
        let needs_open = self.session.as_ref().map_or(true, |s| !s.is_open());
        if needs_open {
            if self.session.take().is_some() {
                log::info!("fallback capture session closed; reopening {}", self.url);
            }
            self.opens += 1;
            let session = self
                .backend
                .open(&self.url)
                .with_context(|| format!("open {} capture session", self.backend.name()))?;
            log::info!(
                "fallback {} capture session opened for {}",
                self.backend.name(),
                self.url
            );
            self.session = Some(session);
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("capture session missing after open"))?;
        session.read_latest()
    }
}

impl<B: CaptureBackend> FrameSource for FallbackStreamReader<B> {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn fetch(&mut self) -> AcquireResult<Frame> {
        FallbackStreamReader::fetch(self)
    }
}

// ----------------------------------------------------------------------------
// Persistent HTTP MJPEG session
// ----------------------------------------------------------------------------

/// Opens long-lived MJPEG connections through a `StreamTransport`.
///
/// Each session gets a reader thread that keeps draining the body and holds only
/// the newest complete frame, the same one-slot dropping behavior as the GStreamer
/// appsink.
pub struct HttpCapture<T = HttpTransport> {
    transport: T,
    chunk_size: usize,
    frame_timeout: Duration,
}

impl<T: StreamTransport> HttpCapture<T> {
    /// `frame_timeout` bounds how long `read_latest` waits for a first frame.
    pub fn new(transport: T, chunk_size: usize, frame_timeout: Duration) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
            frame_timeout,
        }
    }
}

impl<T: StreamTransport> CaptureBackend for HttpCapture<T> {
    type Session = HttpMjpegSession;

    fn name(&self) -> &'static str {
        "http-mjpeg"
    }

    fn open(&mut self, url: &str) -> Result<HttpMjpegSession> {
        let reader = self
            .transport
            .open(url)
            .map_err(|err| anyhow!("connect to {}: {}", url, err))?;
        let shared = Arc::new(Shared {
            state: Mutex::new(Latest {
                frame: None,
                stale: 0,
                open: true,
                cancelled: false,
                end: None,
            }),
            ready: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        let chunk_size = self.chunk_size;
        thread::Builder::new()
            .name("mjpeg-fallback".to_string())
            .spawn(move || pump(reader, chunk_size, &worker))
            .context("spawn mjpeg reader thread")?;
        Ok(HttpMjpegSession {
            shared,
            frame_timeout: self.frame_timeout,
        })
    }
}

/// One-slot mailbox between the reader thread and the session.
struct Latest {
    frame: Option<Vec<u8>>,
    /// Frames overwritten before anyone took them.
    stale: u64,
    /// False once the body ended or failed.
    open: bool,
    /// Set when the session is dropped; the reader thread exits after its next read.
    cancelled: bool,
    end: Option<String>,
}

struct Shared {
    state: Mutex<Latest>,
    ready: Condvar,
}

fn pump(mut reader: Box<dyn Read + Send>, chunk_size: usize, shared: &Shared) {
    let mut parser = StreamBoundaryParser::new();
    let mut chunk = vec![0u8; chunk_size];
    let end = loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break "mjpeg session ended".to_string(),
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => break format!("read mjpeg session: {}", err),
        };
        parser.push(&chunk[..read]);
        let mut newest = None;
        let mut skipped = 0u64;
        while let Some(encoded) = parser.next_frame() {
            if newest.replace(encoded).is_some() {
                skipped += 1;
            }
        }
        let Ok(mut state) = shared.state.lock() else {
            return;
        };
        if state.cancelled {
            return;
        }
        if let Some(encoded) = newest {
            if state.frame.replace(encoded).is_some() {
                skipped += 1;
            }
            state.stale += skipped;
            shared.ready.notify_all();
        }
    };
    if let Ok(mut state) = shared.state.lock() {
        state.open = false;
        state.end = Some(end);
        shared.ready.notify_all();
    }
}

/// One persistent MJPEG body. Only the newest complete frame is ever returned.
pub struct HttpMjpegSession {
    shared: Arc<Shared>,
    frame_timeout: Duration,
}

impl HttpMjpegSession {
    fn wait_newest(&self, deadline: Instant) -> Result<Vec<u8>> {
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| anyhow!("mjpeg session state poisoned"))?;
        loop {
            if let Some(encoded) = state.frame.take() {
                if state.stale > 0 {
                    log::debug!("fallback session dropped {} stale frames", state.stale);
                    state.stale = 0;
                }
                return Ok(encoded);
            }
            if !state.open {
                let end = state.end.as_deref().unwrap_or("mjpeg session closed");
                return Err(anyhow!("{}", end));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(anyhow!("no mjpeg frame within {:?}", self.frame_timeout));
            }
            let (guard, _) = self
                .shared
                .ready
                .wait_timeout(state, deadline - now)
                .map_err(|_| anyhow!("mjpeg session state poisoned"))?;
            state = guard;
        }
    }
}

impl CaptureSession for HttpMjpegSession {
    /// Still usable while the body is live or a frame is waiting.
    fn is_open(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.open || state.frame.is_some())
            .unwrap_or(false)
    }

    fn read_latest(&mut self) -> Result<Frame> {
        let deadline = Instant::now() + self.frame_timeout;
        loop {
            let encoded = self.wait_newest(deadline)?;
            match Frame::decode_jpeg(&encoded) {
                Ok(frame) => return Ok(frame),
                Err(err) => log::debug!("fallback session skipped frame: {}", err),
            }
        }
    }
}

impl Drop for HttpMjpegSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.cancelled = true;
        }
    }
}

// ----------------------------------------------------------------------------
// GStreamer session
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-gstreamer")]
pub use gst::{GstreamerCapture, GstreamerSession};

#[cfg(feature = "capture-gstreamer")]
mod gst {
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use gstreamer::prelude::*;
    use image::RgbImage;

    use super::{CaptureBackend, CaptureSession};
    use crate::frame::Frame;

    /// Builds `souphttpsrc ! multipartdemux ! jpegdec` pipelines ending in an appsink
    /// that holds at most one buffer and drops older ones.
    pub struct GstreamerCapture {
        pull_timeout: Duration,
    }

    impl GstreamerCapture {
        pub fn new(pull_timeout: Duration) -> Result<Self> {
            gstreamer::init().context("initialize gstreamer")?;
            Ok(Self { pull_timeout })
        }
    }

    impl CaptureBackend for GstreamerCapture {
        type Session = GstreamerSession;

        fn name(&self) -> &'static str {
            "gstreamer"
        }

        fn open(&mut self, url: &str) -> Result<GstreamerSession> {
            let description = format!(
                "souphttpsrc location=\"{}\" is-live=true do-timestamp=true ! multipartdemux ! \
                 jpegdec ! videoconvert ! video/x-raw,format=RGB ! \
                 appsink name=appsink sync=false max-buffers=1 drop=true",
                url
            );
            let pipeline = gstreamer::parse::launch(&description)
                .context("build capture pipeline")?
                .downcast::<gstreamer::Pipeline>()
                .map_err(|_| anyhow!("capture pipeline is not a Pipeline"))?;
            let appsink = pipeline
                .by_name("appsink")
                .context("appsink element missing from pipeline")?
                .downcast::<gstreamer_app::AppSink>()
                .map_err(|_| anyhow!("appsink element has unexpected type"))?;
            appsink.set_max_buffers(1);
            appsink.set_drop(true);
            appsink.set_sync(false);

            pipeline
                .set_state(gstreamer::State::Playing)
                .context("set capture pipeline to Playing")?;

            Ok(GstreamerSession {
                pipeline,
                appsink,
                pull_timeout: self.pull_timeout,
                failed: false,
            })
        }
    }

    pub struct GstreamerSession {
        pipeline: gstreamer::Pipeline,
        appsink: gstreamer_app::AppSink,
        pull_timeout: Duration,
        failed: bool,
    }

    impl GstreamerSession {
        fn poll_bus(&mut self) {
            let Some(bus) = self.pipeline.bus() else {
                return;
            };
            while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
                use gstreamer::MessageView;
                match message.view() {
                    MessageView::Error(err) => {
                        log::warn!(
                            "gstreamer error from {:?}: {}",
                            err.src().map(|s| s.path_string()),
                            err.error()
                        );
                        self.failed = true;
                    }
                    MessageView::Eos(..) => {
                        log::warn!("gstreamer capture reached EOS");
                        self.failed = true;
                    }
                    _ => {}
                }
            }
        }
    }

    impl CaptureSession for GstreamerSession {
        fn is_open(&self) -> bool {
            !self.failed && self.pipeline.current_state() != gstreamer::State::Null
        }

        fn read_latest(&mut self) -> Result<Frame> {
            self.poll_bus();
            if self.failed {
                return Err(anyhow!("capture pipeline failed"));
            }
            let timeout = gstreamer::ClockTime::from_mseconds(self.pull_timeout.as_millis() as u64);
            let sample = self
                .appsink
                .try_pull_sample(timeout)
                .ok_or_else(|| anyhow!("capture stream stalled"))?;
            let (pixels, width, height) = sample_to_pixels(&sample)?;
            let image = RgbImage::from_raw(width, height, pixels)
                .ok_or_else(|| anyhow!("capture buffer smaller than {}x{}", width, height))?;
            Ok(Frame::from_rgb(image))
        }
    }

    impl Drop for GstreamerSession {
        fn drop(&mut self) {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }

    fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
        let buffer = sample.buffer().context("capture sample missing buffer")?;
        let caps = sample.caps().context("capture sample missing caps")?;
        let info = gstreamer_video::VideoInfo::from_caps(caps)
            .context("parse capture caps as video info")?;

        let width = info.width();
        let height = info.height();
        let row_bytes = (width as usize) * 3;
        let stride = info.stride()[0] as usize;

        let map = buffer.map_readable().context("map capture buffer")?;
        let data = map.as_slice();

        if stride == row_bytes {
            return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .context("capture buffer row is out of bounds")?,
            );
        }
        Ok((pixels, width, height))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use image::RgbImage;

    use super::*;
    use crate::frame::test_support::encode_jpeg;
    use crate::ingest::http::test_support::{Script, ScriptedTransport};

    struct MockSession {
        open: Rc<Cell<bool>>,
        fail_reads: bool,
    }

    impl CaptureSession for MockSession {
        fn is_open(&self) -> bool {
            self.open.get()
        }

        fn read_latest(&mut self) -> Result<Frame> {
            if self.fail_reads {
                return Err(anyhow!("read timed out"));
            }
            Ok(Frame::from_rgb(RgbImage::new(4, 4)))
        }
    }

    #[derive(Default)]
    struct MockBackend {
        session_open: Rc<Cell<bool>>,
        fail_open: bool,
        fail_reads: bool,
    }

    impl CaptureBackend for MockBackend {
        type Session = MockSession;

        fn name(&self) -> &'static str {
            "mock"
        }

        fn open(&mut self, _url: &str) -> Result<MockSession> {
            if self.fail_open {
                return Err(anyhow!("connection refused"));
            }
            self.session_open.set(true);
            Ok(MockSession {
                open: self.session_open.clone(),
                fail_reads: self.fail_reads,
            })
        }
    }

    #[test]
    fn session_is_opened_lazily_and_reused() {
        let mut reader = FallbackStreamReader::new("http://cam/stream", MockBackend::default());
        assert_eq!(reader.opens(), 0);
        for _ in 0..3 {
            assert!(reader.fetch().is_ok());
        }
        assert_eq!(reader.opens(), 1);
    }

    #[test]
    fn closed_session_is_reopened() {
        let backend = MockBackend::default();
        let flag = backend.session_open.clone();
        let mut reader = FallbackStreamReader::new("http://cam/stream", backend);
        reader.fetch().unwrap();
        flag.set(false);
        reader.fetch().unwrap();
        assert_eq!(reader.opens(), 2);
    }

    #[test]
    fn open_and_read_errors_become_session_failures() {
        let mut reader = FallbackStreamReader::new(
            "http://cam/stream",
            MockBackend {
                fail_open: true,
                ..MockBackend::default()
            },
        );
        assert!(matches!(reader.fetch(), Err(AcquireError::Session(_))));
        assert!(matches!(reader.fetch(), Err(AcquireError::Session(_))));
        assert_eq!(reader.opens(), 2);

        let mut reader = FallbackStreamReader::new(
            "http://cam/stream",
            MockBackend {
                fail_reads: true,
                ..MockBackend::default()
            },
        );
        assert!(matches!(reader.fetch(), Err(AcquireError::Session(_))));
        assert_eq!(reader.opens(), 1);
    }

    fn session_drained(session: &HttpMjpegSession) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.shared.state.lock().unwrap().open {
            assert!(Instant::now() < deadline, "reader thread never reached end of body");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn http_session_keeps_only_the_newest_frame_across_chunks() {
        let older = encode_jpeg(400, 300, [255, 0, 0]);
        let newer = encode_jpeg(320, 200, [0, 255, 0]);
        assert!(older.len() > 1024 && newer.len() > 1024);
        let mut body = older;
        body.extend(newer);

        let mut backend = HttpCapture::new(
            ScriptedTransport::new(vec![Script::Body(body)]),
            1024,
            Duration::from_secs(5),
        );
        let mut session = backend.open("http://cam/stream").unwrap();
        session_drained(&session);

        assert!(session.is_open());
        let frame = session.read_latest().unwrap();
        assert_eq!((frame.width(), frame.height()), (320, 200));

        assert!(!session.is_open());
        let err = session.read_latest().err().expect("body is exhausted");
        assert!(err.to_string().contains("ended"));
    }

    #[test]
    fn exhausted_http_session_is_reopened() {
        let transport =
            ScriptedTransport::new(vec![Script::Body(encode_jpeg(24, 12, [0, 0, 255]))]);
        let mut reader = FallbackStreamReader::new(
            "http://cam/stream",
            HttpCapture::new(transport, 1024, Duration::from_secs(5)),
        );

        let frame = reader.fetch().expect("frame");
        assert_eq!((frame.width(), frame.height()), (24, 12));
        assert_eq!(reader.opens(), 1);

        // The scripted body is gone and further connections are refused.
        for _ in 0..3 {
            assert!(matches!(reader.fetch(), Err(AcquireError::Session(_))));
        }
        assert!(reader.opens() >= 2);
    }
}

//! Primary HTTP MJPEG reader.
//!
//! Each `fetch` opens a fresh streaming GET, reads the body in fixed-size chunks into
//! a `StreamBoundaryParser`, and returns the first frame that decodes. Transport
//! failures are retried a bounded number of times with a fixed delay between
//! attempts; every attempt starts from an empty accumulation buffer.

use std::io::{ErrorKind, Read};
use std::time::Duration;

use anyhow::{Context, Result};

use super::mjpeg::StreamBoundaryParser;
use super::FrameSource;
use crate::config::StreamSettings;
use crate::error::{AcquireError, AcquireResult};
use crate::frame::Frame;
use crate::health::{Sleeper, ThreadSleeper};

/// Content type served by MJPEG cameras.
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace";

/// Opens a byte stream for a URL.
pub trait StreamTransport {
    fn open(&mut self, url: &str) -> AcquireResult<Box<dyn Read + Send>>;
}

/// `ureq`-backed transport with separate connect and read timeouts.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .build();
        Self { agent }
    }
}

impl StreamTransport for HttpTransport {
    fn open(&mut self, url: &str) -> AcquireResult<Box<dyn Read + Send>> {
        match self.agent.get(url).set("Accept", MJPEG_CONTENT_TYPE).call() {
            Ok(response) => Ok(response.into_reader()),
            Err(ureq::Error::Status(code, _)) => Err(AcquireError::Status(code)),
            Err(ureq::Error::Transport(err)) => Err(AcquireError::Transport(err.to_string())),
        }
    }
}

/// Bounded retry schedule for the primary reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Fetches single frames over a fresh HTTP stream per call.
pub struct PrimaryStreamReader<T = HttpTransport, S = ThreadSleeper> {
    url: String,
    transport: T,
    sleeper: S,
    retry: RetryPolicy,
    chunk_size: usize,
}

impl PrimaryStreamReader<HttpTransport, ThreadSleeper> {
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self::new(
            settings.url.clone(),
            HttpTransport::new(settings.connect_timeout, settings.read_timeout),
            ThreadSleeper,
            RetryPolicy {
                attempts: settings.attempts,
                delay: settings.retry_delay,
            },
        )
        .with_chunk_size(settings.chunk_size)
    }
}

impl<T: StreamTransport, S: Sleeper> PrimaryStreamReader<T, S> {
    pub fn new(url: impl Into<String>, transport: T, sleeper: S, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            transport,
            sleeper,
            retry,
            chunk_size: 1024,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Acquire one frame, retrying transport failures per the retry policy.
    pub fn fetch(&mut self) -> AcquireResult<Frame> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt() {
                Ok(frame) => return Ok(frame),
                Err(err) if err.is_transient() && attempt < attempts => {
                    log::warn!(
                        "primary stream attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        err,
                        self.retry.delay
                    );
                    self.sleeper.sleep(self.retry.delay);
                }
                Err(err) => {
                    log::warn!(
                        "primary stream gave up after attempt {}/{}: {}",
                        attempt,
                        attempts,
                        err
                    );
                    return Err(err);
                }
            }
        }
    }

    fn attempt(&mut self) -> AcquireResult<Frame> {
        let mut reader = self.transport.open(&self.url)?;
        let mut parser = StreamBoundaryParser::new();
        let mut chunk = vec![0u8; self.chunk_size];
        let mut last_decode_error = None;
        loop {
            let read = match reader.read(&mut chunk) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                return Err(last_decode_error.unwrap_or(AcquireError::StreamEnded));
            }
            parser.push(&chunk[..read]);
            while let Some(encoded) = parser.next_frame() {
                match Frame::decode_jpeg(&encoded) {
                    Ok(frame) => return Ok(frame),
                    Err(err) => {
                        log::debug!("skipping undecodable mjpeg frame: {}", err);
                        last_decode_error = Some(err);
                    }
                }
            }
        }
    }
}

impl<T: StreamTransport, S: Sleeper> FrameSource for PrimaryStreamReader<T, S> {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch(&mut self) -> AcquireResult<Frame> {
        PrimaryStreamReader::fetch(self)
    }
}

/// Result of a startup connection probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 200 with a multipart content type.
    Ready { content_type: String },
    /// 200 but not an MJPEG stream.
    UnexpectedContentType(String),
    /// Any other status.
    Status(u16),
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }
}

/// Check that the endpoint answers with an MJPEG stream without reading the body.
///
/// Transport errors (unreachable host, timeout) are returned as `Err`.
pub fn probe_stream(url: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<ProbeOutcome> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(read_timeout)
        .build();
    let response = match agent.get(url).set("Accept", MJPEG_CONTENT_TYPE).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Ok(ProbeOutcome::Status(code)),
        Err(err) => return Err(err).with_context(|| format!("connect to {}", url)),
    };
    Ok(classify_probe(response.status(), response.header("Content-Type")))
}

fn classify_probe(status: u16, content_type: Option<&str>) -> ProbeOutcome {
    if status != 200 {
        return ProbeOutcome::Status(status);
    }
    let content_type = content_type.unwrap_or("").to_string();
    if content_type.to_lowercase().contains(MJPEG_CONTENT_TYPE) {
        ProbeOutcome::Ready { content_type }
    } else {
        ProbeOutcome::UnexpectedContentType(content_type)
    }
}

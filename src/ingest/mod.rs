//! Frame acquisition.
//!
//! - `mjpeg`: boundary parsing over an accumulating byte buffer
//! - `http`: primary reader, a fresh streaming GET per frame with bounded retries
//! - `capture`: fallback reader, a persistent capture session returning the freshest frame
//!
//! `FrameAcquirer` chains the two readers: the fallback is consulted only when the
//! primary has exhausted its attempts.

pub mod capture;
pub mod http;
pub mod mjpeg;

pub use capture::{CaptureBackend, CaptureSession, FallbackStreamReader, HttpCapture};
pub use http::{probe_stream, HttpTransport, PrimaryStreamReader, ProbeOutcome, RetryPolicy, StreamTransport};
pub use mjpeg::StreamBoundaryParser;

use crate::error::AcquireResult;
use crate::frame::Frame;

/// Anything that can produce a decoded frame on demand.
pub trait FrameSource {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn fetch(&mut self) -> AcquireResult<Frame>;
}

/// A frame plus the reader that produced it.
pub struct Acquired {
    pub frame: Frame,
    pub source: &'static str,
}

/// Primary-then-fallback acquisition.
pub struct FrameAcquirer<P, F> {
    primary: P,
    fallback: F,
}

impl<P: FrameSource, F: FrameSource> FrameAcquirer<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Try the primary reader, then the fallback. The error returned is the
    /// fallback's, since it is the last word on this iteration.
    pub fn acquire(&mut self) -> AcquireResult<Acquired> {
        match self.primary.fetch() {
            Ok(frame) => {
                return Ok(Acquired {
                    frame,
                    source: self.primary.name(),
                })
            }
            Err(err) => log::debug!("{} reader produced no frame: {}", self.primary.name(), err),
        }
        let frame = self.fallback.fetch()?;
        Ok(Acquired {
            frame,
            source: self.fallback.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::error::AcquireError;

    struct Fixed {
        name: &'static str,
        ok: bool,
        calls: usize,
    }

    impl FrameSource for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch(&mut self) -> AcquireResult<Frame> {
            self.calls += 1;
            if self.ok {
                Ok(Frame::from_rgb(RgbImage::new(2, 2)))
            } else {
                Err(AcquireError::Transport(format!("{} down", self.name)))
            }
        }
    }

    fn source(name: &'static str, ok: bool) -> Fixed {
        Fixed { name, ok, calls: 0 }
    }

    #[test]
    fn fallback_is_skipped_when_primary_succeeds() {
        let mut acquirer = FrameAcquirer::new(source("http", true), source("fallback", true));
        let acquired = acquirer.acquire().unwrap();
        assert_eq!(acquired.source, "http");
        assert_eq!(acquirer.fallback().calls, 0);
    }

    #[test]
    fn fallback_is_used_when_primary_fails() {
        let mut acquirer = FrameAcquirer::new(source("http", false), source("fallback", true));
        let acquired = acquirer.acquire().unwrap();
        assert_eq!(acquired.source, "fallback");
        assert_eq!(acquirer.primary().calls, 1);
    }

    #[test]
    fn both_failing_reports_the_fallback_error() {
        let mut acquirer = FrameAcquirer::new(source("http", false), source("fallback", false));
        let err = acquirer.acquire().err().expect("both readers fail");
        assert_eq!(err.to_string(), "transport failure: fallback down");
    }
}

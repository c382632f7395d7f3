//! Acquisition failure taxonomy.
//!
//! Both stream readers return `AcquireResult<Frame>`. The control loop branches on
//! the result instead of unwinding through handlers: the primary reader retries
//! transient variants, the acquirer falls through to the fallback reader on any
//! variant, and the loop renders the connection-lost placeholder when both fail.

use thiserror::Error;

/// Result type for frame acquisition.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Reasons a reader produced no frame.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Connection refused, timed out, reset, or a body read failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The endpoint answered with something other than 200.
    #[error("unexpected http status {0}")]
    Status(u16),

    /// The body ended before a complete frame arrived.
    #[error("stream ended before a complete frame")]
    StreamEnded,

    /// Bytes between the markers did not decode as an image.
    #[error("decode failure: {0}")]
    Decode(String),

    /// The fallback capture session could not be opened or read.
    #[error("capture session failure: {0}")]
    Session(String),
}

impl AcquireError {
    /// Transport-level failures are retried by the primary reader; everything else
    /// ends the attempt sequence.
    pub fn is_transient(&self) -> bool {
        matches!(self, AcquireError::Transport(_))
    }
}

impl From<std::io::Error> for AcquireError {
    fn from(err: std::io::Error) -> Self {
        AcquireError::Transport(err.to_string())
    }
}

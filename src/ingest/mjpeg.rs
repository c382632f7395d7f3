//! MJPEG boundary parsing.
//!
//! An MJPEG body is a concatenation of JPEG images with no container framing beyond
//! the multipart headers. Frames are recovered by scanning an accumulation buffer for
//! the start-of-image marker and the first end-of-image marker after it. Chunks are
//! appended as they arrive, so markers split across two reads are found once the
//! second half lands.

use std::ops::Range;

/// JPEG start-of-image marker.
pub const JPEG_START: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const JPEG_END: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on buffered bytes while waiting for a frame to complete.
pub const MAX_BUFFER_BYTES: usize = crate::frame::MAX_JPEG_BYTES * 2;

/// Outcome of scanning the accumulation buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// `frame` covers both markers inclusively; scanning resumes at `resume`.
    Complete { frame: Range<usize>, resume: usize },
    /// Append more bytes and scan again.
    Incomplete,
}

/// Locate the first complete frame in `buffer`.
///
/// The end marker is only searched for after the start marker, so a stray end marker
/// in leading garbage cannot produce an inverted range.
pub fn find_frame(buffer: &[u8], start_marker: &[u8], end_marker: &[u8]) -> Boundary {
    let Some(start) = find_subsequence(buffer, start_marker, 0) else {
        return Boundary::Incomplete;
    };
    let Some(end) = find_subsequence(buffer, end_marker, start + start_marker.len()) else {
        return Boundary::Incomplete;
    };
    let resume = end + end_marker.len();
    Boundary::Complete {
        frame: start..resume,
        resume,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Accumulating frame extractor over an unbounded byte stream.
#[derive(Debug)]
pub struct StreamBoundaryParser {
    buffer: Vec<u8>,
    start_marker: Vec<u8>,
    end_marker: Vec<u8>,
}

impl Default for StreamBoundaryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBoundaryParser {
    /// Parser for JPEG start/end-of-image markers.
    pub fn new() -> Self {
        Self::with_markers(&JPEG_START, &JPEG_END)
    }

    pub fn with_markers(start_marker: &[u8], end_marker: &[u8]) -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            start_marker: start_marker.to_vec(),
            end_marker: end_marker.to_vec(),
        }
    }

    /// Append one network chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > MAX_BUFFER_BYTES {
            // Keep a tail that may hold the first half of a split marker.
            let keep = (self.start_marker.len().saturating_sub(1)).min(self.buffer.len());
            let drain_len = self.buffer.len() - keep;
            self.buffer.drain(..drain_len);
            log::warn!(
                "mjpeg buffer exceeded {} bytes without a complete frame; discarded {} bytes",
                MAX_BUFFER_BYTES,
                drain_len
            );
        }
    }

    /// Take the next complete encoded frame, or `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        match find_frame(&self.buffer, &self.start_marker, &self.end_marker) {
            Boundary::Complete { frame, resume } => {
                let encoded = self.buffer[frame].to_vec();
                self.buffer.drain(..resume);
                Some(encoded)
            }
            Boundary::Incomplete => {
                // Bytes before a pending start marker can never become part of a frame.
                if let Some(start) = find_subsequence(&self.buffer, &self.start_marker, 0) {
                    self.buffer.drain(..start);
                }
                None
            }
        }
    }

    /// Bytes currently held while waiting for a frame to complete.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }
}

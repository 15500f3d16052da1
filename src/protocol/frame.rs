//! Line framing for the device byte stream.
//!
//! Every message the device sends, telemetry or command response, is a line of ASCII
//! text that starts with a `$` marker and ends with `\n`:
//!
//! ```text
//! noise$12.3,45.6,78.9\n$0,ok\n$2,50,1,ok\n$1,o    <- "$1,o" stays buffered
//! ```
//!
//! [`FrameExtractor`] owns the reassembly buffer. It is fed raw chunks exactly as the
//! transport returns them and yields complete frames; anything before a `$` is noise and
//! is discarded, anything after the last complete line is kept for the next chunk.

use std::fmt;

/// Start-of-frame marker.
pub const FRAME_MARKER: u8 = b'$';

/// End-of-frame terminator.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// One extracted line, without its terminating newline.
///
/// Always starts with `$`. The text may be empty after the marker (`"$"`); rejecting
/// such frames is the classifier's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    /// Wrap a line that is known to start with the frame marker.
    fn from_line(bytes: &[u8]) -> Self {
        Frame(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Full frame text, including the leading `$`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text after the leading `$`.
    pub fn payload(&self) -> &str {
        &self.0[1..]
    }

    /// `true` when nothing follows the marker.
    pub fn is_empty(&self) -> bool {
        self.payload().trim().is_empty()
    }

    /// Text before the first comma, marker included (`"$2"` for `"$2,50,1,ok"`).
    pub fn prefix(&self) -> &str {
        self.0.split(',').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Frame {
    /// Build a frame from a literal line; a missing marker is added.
    fn from(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with('$') {
            Frame(line.to_string())
        } else {
            Frame(format!("${line}"))
        }
    }
}

/// Stateful `$ ... \n` frame reassembler.
///
/// Owned by the reader loop; needs no locking.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
}

impl FrameExtractor {
    /// Create an extractor with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly read chunk and drain every complete frame it finishes.
    ///
    /// Frames come out in arrival order. A trailing `$...` without newline is retained
    /// until a later chunk completes it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == FRAME_MARKER) else {
                // No marker anywhere: all of it is noise.
                self.buffer.clear();
                break;
            };
            if start > 0 {
                self.buffer.drain(..start);
            }

            let Some(end) = self.buffer.iter().position(|&b| b == FRAME_TERMINATOR) else {
                break;
            };

            frames.push(Frame::from_line(&self.buffer[..end]));
            self.buffer.drain(..=end);
        }
        frames
    }

    /// Bytes currently held back as an incomplete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, StreamError};

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Accumulation ceiling before the demuxer discards its buffer.
///
/// A corrupt or reordered stream can fill the buffer without ever producing
/// a complete frame; past this bound the buffered bytes are dropped and
/// demuxing resumes from the next input, sacrificing the frames in that
/// window instead of memory.
pub const DEFAULT_BUFFER_CEILING: usize = 512 * 1024;

const READ_CHUNK: usize = 4096;

/// Scans a byte stream for JPEG frame boundaries and yields discrete frames.
///
/// Input arrives in arbitrary chunks via [`push`](Self::push) — file reads on
/// the server, datagram payloads on the client. Chunk boundaries are
/// irrelevant: a marker split across two pushes is still found, because only
/// the accumulated buffer is scanned.
///
/// A frame is the byte run `[SOI, EOI + 2)`, inclusive of both markers. Any
/// bytes before the SOI are discarded together with the consumed frame.
/// Frames come out in stream order and are never produced twice.
#[derive(Debug)]
pub struct FrameDemuxer {
    buf: Vec<u8>,
    ceiling: usize,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_BUFFER_CEILING)
    }

    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            buf: Vec::new(),
            ceiling,
        }
    }

    /// Append incoming bytes to the accumulation buffer.
    ///
    /// If the previous pushes exceeded the ceiling without yielding a frame,
    /// the stale buffer is discarded first.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.buf.len() > self.ceiling {
            tracing::warn!(
                buffered = self.buf.len(),
                ceiling = self.ceiling,
                "accumulation buffer overflow, discarding"
            );
            self.buf.clear();
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = find_marker(&self.buf, SOI)?;
        let end = find_marker(&self.buf, EOI)?;
        if end <= start {
            return None;
        }

        let frame = self.buf[start..end + 2].to_vec();
        self.buf.drain(..end + 2);
        Some(frame)
    }

    /// Bytes currently buffered without forming a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

/// A stored MJPEG video: a sequential byte producer demuxed into frames.
///
/// The server opens one per session during SETUP and pulls frames from it on
/// the sender task. The byte source is abstracted as [`Read`] so tests can
/// drive it from memory.
#[derive(Debug)]
pub struct VideoSource<R> {
    reader: R,
    demux: FrameDemuxer,
    frame_number: u32,
}

impl VideoSource<File> {
    /// Open a video file. A missing or unreadable file maps to
    /// [`StreamError::SourceNotFound`], which SETUP answers with 404.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|_| StreamError::SourceNotFound(path.display().to_string()))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> VideoSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            demux: FrameDemuxer::new(),
            frame_number: 0,
        }
    }

    /// Next complete frame, reading more from the source as needed.
    ///
    /// `Ok(None)` means the source is exhausted (end of stream).
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.demux.next_frame() {
                self.frame_number += 1;
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.demux.push(&chunk[..n]);
        }
    }

    /// 1-based index of the last frame returned. Used as the outgoing
    /// packet sequence number.
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }
}

//! Event-stream frame reader.
//!
//! Splits a chunked byte stream into blank-line-delimited frames:
//!
//! ```text
//! event: completion\n
//! data: {"completion":"Hi"}\n
//! \n
//! ```
//!
//! Bytes are buffered raw and only split on `\n`, so chunk boundaries may
//! fall anywhere, including inside a multi-byte UTF-8 sequence.
//!
//! A line that is not a field the reader knows (`event:`, `data:`, `id:`,
//! `retry:`, or a `:` comment) is noise. Each noise line is surfaced as an
//! empty frame so the empty-frame guard can count it; the blank line that
//! closes a block made only of noise adds nothing further.

use crate::error::StreamError;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use tracing::debug;

/// Largest line or frame payload the reader buffers: 4 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// One blank-line-delimited frame as it appeared on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Value of the `event:` line, empty when the frame had none.
    pub event: String,
    /// Concatenated `data:` lines, without separators.
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Line-level state: the frame being assembled.
#[derive(Debug, Default)]
struct FrameBuilder {
    pending: RawFrame,
    /// The current block already produced a noise frame.
    noisy: bool,
}

impl FrameBuilder {
    fn feed_line(
        &mut self,
        line: &[u8],
        max_bytes: usize,
    ) -> Result<Option<RawFrame>, StreamError> {
        if line.is_empty() {
            let noisy = std::mem::take(&mut self.noisy);
            if noisy && self.pending == RawFrame::default() {
                return Ok(None);
            }
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        if line.starts_with(b":") || line.starts_with(b"id:") || line.starts_with(b"retry:") {
            return Ok(None);
        }
        if let Some(name) = line.strip_prefix(b"event:") {
            self.pending.event = String::from_utf8_lossy(name).trim().to_string();
        } else if let Some(data) = line.strip_prefix(b"data:") {
            let data = data.strip_prefix(b" ").unwrap_or(data);
            if self.pending.data.len() + data.len() > max_bytes {
                return Err(StreamError::FrameTooLarge { limit: max_bytes });
            }
            self.pending.data.extend_from_slice(data);
        } else {
            debug!(
                "Unrecognized event-stream line: {}",
                String::from_utf8_lossy(line)
            );
            self.noisy = true;
            return Ok(Some(RawFrame::default()));
        }
        Ok(None)
    }
}

/// Pulls [`RawFrame`]s out of a byte stream, one at a time.
///
/// The reader owns the underlying stream; dropping the reader drops the
/// stream (and with it the HTTP connection).
pub struct FrameReader<S> {
    inner: Pin<Box<S>>,
    buf: Vec<u8>,
    /// Start of the unconsumed bytes in `buf`.
    pos: usize,
    /// Bytes after `pos` already known to contain no `\n`.
    scanned: usize,
    builder: FrameBuilder,
    max_frame_bytes: usize,
    finished: bool,
}

impl<S, B, E> FrameReader<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: Box::pin(stream),
            buf: Vec::new(),
            pos: 0,
            scanned: 0,
            builder: FrameBuilder::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            finished: false,
        }
    }

    /// Cap on a single unterminated line and on a frame's `data` payload.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Next complete frame, or `None` once the stream has ended.
    ///
    /// Cancel-safe: dropping the returned future never loses buffered bytes.
    /// After `None` or an error every further call returns `None`.
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>, StreamError> {
        loop {
            while let Some(offset) = self.buf[self.pos + self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
            {
                let start = self.pos;
                let mut end = start + self.scanned + offset;
                self.pos = end + 1;
                self.scanned = 0;
                if end > start && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }
                match self
                    .builder
                    .feed_line(&self.buf[start..end], self.max_frame_bytes)
                {
                    Ok(Some(frame)) => return Ok(Some(frame)),
                    Ok(None) => {}
                    Err(e) => {
                        self.finish();
                        return Err(e);
                    }
                }
            }
            self.scanned = self.buf.len() - self.pos;

            if self.finished {
                return Ok(None);
            }
            if self.scanned > self.max_frame_bytes {
                self.finish();
                return Err(StreamError::FrameTooLarge {
                    limit: self.max_frame_bytes,
                });
            }

            // Compact once the consumed prefix outweighs the partial line.
            if self.pos > 0 && self.pos >= self.scanned {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    self.finish();
                    return Err(StreamError::Transport(e.to_string()));
                }
                None => {
                    if self.scanned > 0 || self.builder.pending != RawFrame::default() {
                        debug!("Stream ended mid-frame, dropping partial frame");
                    }
                    self.finish();
                    return Ok(None);
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.buf.clear();
        self.pos = 0;
        self.scanned = 0;
        self.builder = FrameBuilder::default();
    }
}

//! Server-sent event frame decoder.
//!
//! Turns the upstream byte stream into [`RawFrame`]s: one per `data:`
//! line, plus a final [`RawFrame::Done`] for the `[DONE]` sentinel.
//! Chunk boundaries are arbitrary; bytes are buffered until a full line is
//! available. Lines are split on `\n`, which never occurs inside a
//! multi-byte UTF-8 sequence, so a code point split across two chunks is
//! reassembled before decoding.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use turnstream::EngineError;

/// Maximum size of an unterminated line before we abort the stream.
const MAX_BUF: usize = 16 * 1024 * 1024; // 16 MiB

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// The payload of a `data:` line.
    Data(String),
    /// The `[DONE]` sentinel. Nothing follows it.
    Done,
}

/// Incremental line decoder.
///
/// ```rust
/// use turnstream_openrouter::sse::{RawFrame, SseDecoder};
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"data: {\"a\"").unwrap().is_empty());
/// let frames = decoder.push(b":1}\n\ndata: [DONE]\n\n").unwrap();
/// assert_eq!(frames, vec![RawFrame::Data("{\"a\":1}".into()), RawFrame::Done]);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds one chunk and returns every frame it completes.
    ///
    /// Input after the sentinel is ignored.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResponseFormat`] if a single line grows past 16 MiB.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<RawFrame>, EngineError> {
        if self.done {
            return Ok(Vec::new());
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let frame = decode_line(&self.buf[start..end]);
            start = end + 1;
            if let Some(frame) = frame {
                let done = frame == RawFrame::Done;
                frames.push(frame);
                if done {
                    self.done = true;
                    self.buf.clear();
                    return Ok(frames);
                }
            }
        }
        self.buf.drain(..start);

        if self.buf.len() > MAX_BUF {
            self.buf.clear();
            return Err(EngineError::ResponseFormat {
                message: "SSE line exceeded 16 MiB".into(),
                raw: String::new(),
            });
        }
        Ok(frames)
    }

    /// Flushes a trailing line that ended without a newline.
    pub fn finish(&mut self) -> Option<RawFrame> {
        if self.done || self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        let frame = decode_line(&line);
        self.done = frame == Some(RawFrame::Done);
        frame
    }
}

/// Decodes one line without its `\n`. Only `data:` lines carry frames.
fn decode_line(line: &[u8]) -> Option<RawFrame> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(b"data:")?;
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);
    let payload = String::from_utf8_lossy(payload);
    let payload = payload.trim();
    if payload.is_empty() {
        None
    } else if payload == DONE_SENTINEL {
        Some(RawFrame::Done)
    } else {
        Some(RawFrame::Data(payload.to_string()))
    }
}

/// Decodes a byte stream into frames.
///
/// The stream ends after [`RawFrame::Done`], after the first error, or
/// when the input ends. Transport errors are passed through unchanged, so
/// a broken connection surfaces as an `Err` item rather than a silent end.
pub fn frames<S>(bytes: S) -> impl Stream<Item = Result<RawFrame, EngineError>> + Send
where
    S: Stream<Item = Result<Bytes, EngineError>> + Send,
{
    bytes
        .map(Some)
        .chain(stream::once(async { None }))
        .scan(
            (SseDecoder::new(), false),
            |(decoder, stopped), chunk| {
                if *stopped {
                    return futures::future::ready(None);
                }
                let batch = match chunk {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => Err(e),
                    None => Ok(decoder.finish().into_iter().collect()),
                };
                let items: Vec<_> = match batch {
                    Ok(frames) => frames.into_iter().map(Ok).collect(),
                    Err(e) => {
                        *stopped = true;
                        vec![Err(e)]
                    }
                };
                if decoder.is_done() {
                    *stopped = true;
                }
                futures::future::ready(Some(items))
            },
        )
        .flat_map(stream::iter)
}

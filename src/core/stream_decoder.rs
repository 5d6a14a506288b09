//! Server-sent-event decoding for streamed chat completions.
//!
//! [`decode_chunk`] is the stateless form: it assumes every event line is
//! fully contained in the chunk it is given. Network chunk boundaries do not
//! respect line boundaries, so the streaming path uses [`SseDecoder`], which
//! carries an unterminated trailing line (as raw bytes, so split UTF-8
//! sequences survive too) into the next call.

use memchr::memchr;
use serde::Deserialize;
use tracing::debug;

use crate::api::ChatResponse;
use crate::core::error::error_summary_from_value;

const DONE_SENTINEL: &str = "[DONE]";

/// Result of feeding bytes to the decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedChunk {
    /// Concatenation of every delta found.
    pub text: String,
    /// The `[DONE]` sentinel (or a server error event) ended the stream.
    pub done: bool,
    /// Summary of an error event sent in place of deltas.
    pub server_error: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Skip,
    Done,
    Delta(String),
    ServerError(String),
}

fn extract_data_payload(line: &str) -> &str {
    line.strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line)
}

fn decode_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    let payload = extract_data_payload(line);
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    let value = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, line = payload, "skipping malformed stream line");
            return LineOutcome::Skip;
        }
    };

    if let Ok(response) = ChatResponse::deserialize(&value) {
        if let Some(text) = response.delta_text() {
            return LineOutcome::Delta(text.to_string());
        }
    }

    if value.get("error").is_some_and(|error| !error.is_null()) {
        let summary = error_summary_from_value(&value).unwrap_or_else(|| value.to_string());
        return LineOutcome::ServerError(summary);
    }

    LineOutcome::Skip
}

fn decode_line_bytes(line: &[u8]) -> LineOutcome {
    match std::str::from_utf8(line) {
        Ok(text) => decode_line(text),
        Err(err) => {
            debug!(error = %err, "skipping stream line with invalid UTF-8");
            LineOutcome::Skip
        }
    }
}

/// Folds one line outcome into `out`; returns true once the stream is over.
fn apply_outcome(outcome: LineOutcome, out: &mut DecodedChunk) -> bool {
    match outcome {
        LineOutcome::Skip => false,
        LineOutcome::Delta(text) => {
            out.text.push_str(&text);
            false
        }
        LineOutcome::Done => {
            out.done = true;
            true
        }
        LineOutcome::ServerError(message) => {
            out.server_error = Some(message);
            out.done = true;
            true
        }
    }
}

/// Extract the text carried by every complete event line in `chunk`.
///
/// Blank lines are skipped, decoding stops at `[DONE]`, and lines that are not
/// valid JSON are logged and ignored. Returns an empty string when the chunk
/// holds no deltas.
pub fn decode_chunk(chunk: &str) -> String {
    let mut out = DecodedChunk::default();
    for line in chunk.split('\n') {
        if apply_outcome(decode_line(line), &mut out) {
            break;
        }
    }
    out.text
}

/// Incremental decoder for one response body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every line completed by `bytes`, keeping any unterminated tail.
    pub fn push(&mut self, bytes: &[u8]) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        if self.done {
            return out;
        }

        self.pending.extend_from_slice(bytes);
        let mut consumed = 0;
        while let Some(offset) = memchr(b'\n', &self.pending[consumed..]) {
            let end = consumed + offset;
            let outcome = decode_line_bytes(&self.pending[consumed..end]);
            consumed = end + 1;
            if apply_outcome(outcome, &mut out) {
                self.done = true;
                break;
            }
        }

        if self.done {
            self.pending.clear();
        } else {
            self.pending.drain(..consumed);
        }
        out
    }

    /// Decode a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        if self.done || self.pending.is_empty() {
            self.pending.clear();
            return out;
        }
        let tail = std::mem::take(&mut self.pending);
        if apply_outcome(decode_line_bytes(&tail), &mut out) {
            self.done = true;
        }
        out
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n\n";

    #[test]
    fn decode_chunk_concatenates_deltas_until_done() {
        assert_eq!(decode_chunk(HELLO_WORLD), "Hello world");
    }

    #[test]
    fn decode_chunk_skips_malformed_lines() {
        let chunk = "data: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\ndata: {\"choices\":[{\"delta\":\n";
        assert_eq!(decode_chunk(chunk), "kept");
    }

    #[test]
    fn decode_chunk_ignores_lines_after_done() {
        let chunk = "data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n";
        assert_eq!(decode_chunk(chunk), "");
    }

    #[test]
    fn decode_chunk_accepts_alternate_shapes_and_spacing() {
        let chunk = concat!(
            "data:{\"choices\":[{\"text\":\"a\"}]}\n",
            "{\"content\":\"b\"}\n",
            ": keep-alive\n",
            "event: message\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\r\n",
        );
        assert_eq!(decode_chunk(chunk), "abc");
    }

    #[test]
    fn decode_chunk_returns_empty_without_deltas() {
        assert_eq!(decode_chunk(""), "");
        assert_eq!(decode_chunk("\n\n"), "");
        assert_eq!(
            decode_chunk("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n"),
            ""
        );
    }

    #[test]
    fn sse_decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let (first, second) = HELLO_WORLD.split_at(30);

        let a = decoder.push(first.as_bytes());
        let b = decoder.push(second.as_bytes());

        assert_eq!(format!("{}{}", a.text, b.text), "Hello world");
        assert!(!a.done);
        assert!(b.done);
        assert!(decoder.is_done());
    }

    #[test]
    fn sse_decoder_survives_split_utf8_sequences() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').expect("accent present") + 1;

        let mut decoder = SseDecoder::new();
        let a = decoder.push(&bytes[..split]);
        let b = decoder.push(&bytes[split..]);

        assert_eq!(a.text, "");
        assert_eq!(b.text, "caf\u{e9}");
    }

    #[test]
    fn sse_decoder_ignores_input_after_done() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: [DONE]\ndata: {\"content\":\"x\"}\n");
        assert!(out.done);
        assert_eq!(out.text, "");
        assert_eq!(decoder.push(b"data: {\"content\":\"y\"}\n"), DecodedChunk::default());
    }

    #[test]
    fn sse_decoder_reports_error_events() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: {\"error\":{\"message\":\"model crashed\"}}\n\n");
        assert!(out.done);
        assert_eq!(out.server_error.as_deref(), Some("model crashed"));
    }

    #[test]
    fn sse_decoder_skips_control_lines_without_text() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}],\"error\":null}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"error\":null}\n\n",
        ).as_bytes());

        assert_eq!(out.text, "Hi");
        assert_eq!(out.server_error, None);
        assert!(!out.done);

        let end = decoder.push(b"data: [DONE]\n\n");
        assert!(end.done);
        assert_eq!(end.server_error, None);
    }

    #[test]
    fn sse_decoder_finish_flushes_unterminated_tail() {
        let mut decoder = SseDecoder::new();
        let partial = decoder.push(b"data: {\"content\":\"tail\"}");
        assert_eq!(partial.text, "");

        let out = decoder.finish();
        assert_eq!(out.text, "tail");
        assert_eq!(decoder.finish(), DecodedChunk::default());
    }
}

//! Incremental decoder for server-sent chat-completion streams.
//!
//! Bytes are buffered until a blank line (`\n\n` or `\r\n\r\n`) closes a
//! frame, so frames split across reads and UTF-8 sequences split across
//! reads both reassemble. Only `data:` lines carry payload; `[DONE]` and
//! blank payloads are ignored and chunks that are not valid JSON are skipped.

use basecamp_core::error::ProviderError;
use basecamp_core::provider::{TokenSink, Usage};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::trace;

use crate::wire;

/// Aggregate of a finished stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub text: String,
    /// Last non-empty `model` seen
    pub model: Option<String>,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    /// JSON chunks successfully parsed
    pub chunk_count: usize,
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    /// Buffer offset already searched for a terminator.
    scanned: usize,
    summary: StreamSummary,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read. Every complete frame is decoded and each content delta
    /// is passed to `on_token` before this returns.
    pub fn push<F>(&mut self, bytes: &[u8], on_token: &mut F)
    where
        F: FnMut(&str) + ?Sized,
    {
        self.buffer.extend_from_slice(bytes);
        while let Some((end, separator)) = frame_boundary(&self.buffer, self.scanned) {
            let frame = self.buffer[..end].to_vec();
            self.buffer.drain(..end + separator);
            self.scanned = 0;
            self.decode_frame(&frame, on_token);
        }
        // A terminator may straddle this read and the next.
        self.scanned = self.buffer.len().saturating_sub(3);
    }

    /// End of input: whatever is left is decoded as a final frame.
    pub fn finish<F>(mut self, on_token: &mut F) -> StreamSummary
    where
        F: FnMut(&str) + ?Sized,
    {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.decode_frame(&rest, on_token);
        }
        self.summary
    }

    fn decode_frame<F>(&mut self, frame: &[u8], on_token: &mut F)
    where
        F: FnMut(&str) + ?Sized,
    {
        let frame = String::from_utf8_lossy(frame);
        for line in frame.lines() {
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }

            let chunk = match serde_json::from_str::<Value>(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                    continue;
                }
            };
            self.apply_chunk(&chunk, on_token);
        }
    }

    fn apply_chunk<F>(&mut self, chunk: &Value, on_token: &mut F)
    where
        F: FnMut(&str) + ?Sized,
    {
        let summary = &mut self.summary;
        summary.chunk_count += 1;
        if let Some(model) = wire::parse_model(chunk) {
            summary.model = Some(model);
        }
        summary.usage.overlay(&wire::parse_usage(chunk));
        if let Some(reason) = wire::parse_finish_reason(chunk) {
            summary.finish_reason = Some(reason);
        }

        let token = wire::delta_content(chunk);
        if !token.is_empty() {
            summary.text.push_str(&token);
            on_token(&token);
        }
    }
}

/// Start of the first frame terminator at or after `from`, and its length.
fn frame_boundary(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

/// Drive a decoder over a byte stream until it ends.
///
/// A transport error mid-stream aborts with `StreamInterrupted`.
pub async fn decode_stream<S, B, E>(
    stream: S,
    on_token: &mut TokenSink<'_>,
) -> Result<StreamSummary, ProviderError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = StreamDecoder::new();
    while let Some(next) = stream.next().await {
        let bytes = next.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
        decoder.push(bytes.as_ref(), on_token);
    }
    Ok(decoder.finish(on_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        "data: {\"model\":\"openai/gpt-4o-mini\",\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" wörld\"}}]}\n\n",
        ": keep-alive comment\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1,\"total_tokens\":2}}\n\n",
        "data: [DONE]\n\n",
    );

    fn decode_in_pieces(bytes: &[u8], sizes: &[usize]) -> (StreamSummary, Vec<String>) {
        let mut tokens = Vec::new();
        let mut on_token = |t: &str| tokens.push(t.to_string());
        let mut decoder = StreamDecoder::new();
        let mut offset = 0;
        let mut i = 0;
        while offset < bytes.len() {
            let size = sizes[i % sizes.len()].max(1);
            let end = (offset + size).min(bytes.len());
            decoder.push(&bytes[offset..end], &mut on_token);
            offset = end;
            i += 1;
        }
        let summary = decoder.finish(&mut on_token);
        (summary, tokens)
    }

    #[test]
    fn decodes_a_single_read() {
        let (summary, tokens) = decode_in_pieces(STREAM.as_bytes(), &[STREAM.len()]);
        assert_eq!(summary.text, "hello wörld");
        assert_eq!(tokens, vec!["hello", " wörld"]);
        assert_eq!(summary.model.as_deref(), Some("openai/gpt-4o-mini"));
        assert_eq!(summary.usage, Usage::new(1, 1, 2));
        assert_eq!(summary.finish_reason.as_deref(), Some("stop"));
        assert_eq!(summary.chunk_count, 3);
    }

    #[test]
    fn arbitrary_splits_reassemble_identically() {
        let (whole, _) = decode_in_pieces(STREAM.as_bytes(), &[STREAM.len()]);
        for sizes in [&[1][..], &[2, 3], &[7], &[5, 1, 13], &[64]] {
            let (split, _) = decode_in_pieces(STREAM.as_bytes(), sizes);
            assert_eq!(split, whole, "split sizes {sizes:?}");
        }
    }

    #[test]
    fn split_multibyte_character_survives() {
        let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n\n".as_bytes();
        let split_at = frame.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut tokens = Vec::new();
        let mut on_token = |t: &str| tokens.push(t.to_string());
        let mut decoder = StreamDecoder::new();
        decoder.push(&frame[..split_at], &mut on_token);
        decoder.push(&frame[split_at..], &mut on_token);
        let summary = decoder.finish(&mut on_token);
        assert_eq!(summary.text, "é");
    }

    #[test]
    fn multiple_frames_in_one_read_fire_in_order() {
        let mut tokens = Vec::new();
        let mut decoder = StreamDecoder::new();
        decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            &mut |t: &str| tokens.push(t.to_string()),
        );
        assert_eq!(tokens, vec!["a", "b"]);
    }

    #[test]
    fn long_frame_in_small_reads_resumes_the_scan() {
        let text = "x".repeat(4_000);
        let frame = format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\r\n\r\n");
        let bytes = frame.as_bytes();
        let mut tokens = Vec::new();
        let mut on_token = |t: &str| tokens.push(t.to_string());
        let mut decoder = StreamDecoder::new();
        for (i, byte) in bytes.iter().enumerate() {
            decoder.push(std::slice::from_ref(byte), &mut on_token);
            if i + 1 < bytes.len() {
                assert_eq!(decoder.scanned, decoder.buffer.len().saturating_sub(3));
            }
        }
        assert!(decoder.buffer.is_empty());
        assert_eq!(decoder.scanned, 0);
        let summary = decoder.finish(&mut on_token);
        assert_eq!(summary.text, text);
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn trailing_frame_without_terminator_is_decoded() {
        let mut tokens = Vec::new();
        let mut on_token = |t: &str| tokens.push(t.to_string());
        let mut decoder = StreamDecoder::new();
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}", &mut on_token);
        let summary = decoder.finish(&mut on_token);
        assert_eq!(summary.text, "tail");
        assert_eq!(tokens, vec!["tail"]);
    }

    #[test]
    fn malformed_chunks_are_skipped() {
        let input = concat!(
            "data: {not json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        );
        let (summary, _) = decode_in_pieces(input.as_bytes(), &[input.len()]);
        assert_eq!(summary.text, "ok");
        assert_eq!(summary.chunk_count, 1);
    }

    #[test]
    fn crlf_frames_are_accepted() {
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\r\n\r\n";
        let (summary, tokens) = decode_in_pieces(input.as_bytes(), &[3]);
        assert_eq!(summary.text, "xy");
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn usage_counters_keep_last_seen_values() {
        let input = concat!(
            "data: {\"usage\":{\"prompt_tokens\":5}}\n\n",
            "data: {\"usage\":{\"completion_tokens\":9}}\n\n",
            "data: {\"model\":\"\",\"usage\":{\"prompt_tokens\":6}}\n\n",
        );
        let (summary, _) = decode_in_pieces(input.as_bytes(), &[input.len()]);
        assert_eq!(summary.usage.prompt_tokens, Some(6));
        assert_eq!(summary.usage.completion_tokens, Some(9));
        assert_eq!(summary.usage.total_tokens, None);
        assert_eq!(summary.model, None);
    }

    #[tokio::test]
    async fn decode_stream_reads_until_end() {
        let reads: Vec<Result<Vec<u8>, std::io::Error>> = STREAM
            .as_bytes()
            .chunks(11)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let mut text = String::new();
        let summary = decode_stream(futures::stream::iter(reads), &mut |t: &str| text.push_str(t))
            .await
            .unwrap();
        assert_eq!(text, "hello wörld");
        assert_eq!(summary.text, text);
    }

    #[tokio::test]
    async fn transport_error_interrupts_the_stream() {
        let reads: Vec<Result<&[u8], String>> = vec![
            Ok(&b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n"[..]),
            Err("connection reset".to_string()),
        ];
        let err = decode_stream(futures::stream::iter(reads), &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(msg) if msg.contains("reset")));
    }
}

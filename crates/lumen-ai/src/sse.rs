//! SSE decoding for chat-completion response bodies
//!
//! The provider streams `data: <json>` lines; content deltas live at
//! `choices[0].delta.content`, the usage summary at
//! `choices[0].delta.usage`, and a literal `[DONE]` payload terminates the
//! stream. Unparsable payloads are skipped so that unknown frame shapes
//! never abort an otherwise-good stream.

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    types::UsageInfo,
};

/// Events decoded from the provider stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A content delta (possibly empty)
    Content(String),
    /// The usage summary frame; bookkeeping only, not content
    Usage(UsageInfo),
    /// Terminal sentinel; emitted exactly once
    Done,
}

/// A lazy, finite, non-restartable sequence of decoded events
pub type ProviderEventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent>> + Send>>;

/// Incremental decoder over raw body text.
///
/// Push chunks in with [`feed`](Self::feed); an incomplete trailing line is
/// buffered until the next chunk completes it. After the `[DONE]` sentinel
/// the decoder is finished and further input yields nothing.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    finished: bool,
}

impl SseDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode a chunk of body text, returning the events it completes
    pub fn feed(&mut self, chunk: &str) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(line.trim()) {
                let done = matches!(event, ProviderEvent::Done);
                events.push(event);
                if done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flush a trailing line left without a newline at end-of-body
    pub fn finish(&mut self) -> Vec<ProviderEvent> {
        if self.finished || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(line.trim()).into_iter().collect()
    }

    fn decode_line(&mut self, line: &str) -> Option<ProviderEvent> {
        let payload = line.strip_prefix("data: ")?;
        if payload == "[DONE]" {
            self.finished = true;
            return Some(ProviderEvent::Done);
        }

        // Unparsable payloads and frames with neither field are skipped.
        let frame: ChatFrame = serde_json::from_str(payload).ok()?;
        let delta = frame.choices.into_iter().next()?.delta;
        if let Some(usage) = delta.usage {
            return Some(ProviderEvent::Usage(usage));
        }
        delta.content.map(ProviderEvent::Content)
    }
}

/// Decode a response body stream into provider events.
///
/// Transport errors mid-body surface as an `Err` item and end the stream.
pub fn decode_stream<S>(body: S) -> ProviderEventStream
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    Box::pin(stream! {
        let mut decoder = SseDecoder::new();
        let mut body = std::pin::pin!(body);

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    for event in decoder.feed(&text) {
                        let done = matches!(event, ProviderEvent::Done);
                        yield Ok(event);
                        if done {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield Err(Error::Http(e));
                    return;
                }
            }
        }

        for event in decoder.finish() {
            yield Ok(event);
        }
    })
}

// Frame shapes; unknown fields are ignored for forward compatibility.

#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(default)]
    choices: Vec<FrameChoice>,
}

#[derive(Debug, Deserialize)]
struct FrameChoice {
    #[serde(default)]
    delta: FrameDelta,
}

#[derive(Debug, Default, Deserialize)]
struct FrameDelta {
    content: Option<String>,
    usage: Option<UsageInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_frame(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n", text)
    }

    #[test]
    fn test_content_deltas_in_order() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(&format!("{}{}", content_frame("Hel"), content_frame("lo")));
        assert_eq!(
            events,
            vec![
                ProviderEvent::Content("Hel".to_string()),
                ProviderEvent::Content("lo".to_string()),
            ]
        );
    }

    #[test]
    fn test_done_is_terminal() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("data: [DONE]\n");
        assert_eq!(events, vec![ProviderEvent::Done]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_double_done_yields_one_terminal_event() {
        let mut decoder = SseDecoder::new();
        let first = decoder.feed("data: [DONE]\n");
        let second = decoder.feed("data: [DONE]\n");
        assert_eq!(first, vec![ProviderEvent::Done]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_done_in_same_chunk_stops_decoding() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}data: [DONE]\n{}", content_frame("a"), content_frame("b"));
        let events = decoder.feed(&input);
        assert_eq!(
            events,
            vec![ProviderEvent::Content("a".to_string()), ProviderEvent::Done]
        );
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = SseDecoder::new();
        let input = format!(
            "{}data: {{not valid json}}\n{}",
            content_frame("Hel"),
            content_frame("lo")
        );
        let events = decoder.feed(&input);
        assert_eq!(
            events,
            vec![
                ProviderEvent::Content("Hel".to_string()),
                ProviderEvent::Content("lo".to_string()),
            ]
        );
    }

    #[test]
    fn test_usage_frame() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed("data: {\"choices\":[{\"delta\":{\"usage\":{\"total_tokens\":128}}}]}\n");
        assert_eq!(
            events,
            vec![ProviderEvent::Usage(UsageInfo { total_tokens: 128 })]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let frame = content_frame("hello");
        let (head, tail) = frame.split_at(frame.len() / 2);
        assert!(decoder.feed(head).is_empty());
        let events = decoder.feed(tail);
        assert_eq!(events, vec![ProviderEvent::Content("hello".to_string())]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("event: ping\n: comment\ndata:[no space]\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_empty_delta_yields_empty_content() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(&content_frame(""));
        assert_eq!(events, vec![ProviderEvent::Content(String::new())]);
    }

    #[test]
    fn test_frame_without_content_or_usage_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::new();
        let frame = content_frame("tail");
        assert!(decoder.feed(frame.trim_end()).is_empty());
        let events = decoder.finish();
        assert_eq!(events, vec![ProviderEvent::Content("tail".to_string())]);
    }

    #[tokio::test]
    async fn test_decode_stream_ends_after_done() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from(content_frame("4"))),
            Ok(bytes::Bytes::from("data: [DONE]\n")),
        ];
        let mut stream = decode_stream(futures::stream::iter(chunks));

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }
        assert_eq!(
            events,
            vec![ProviderEvent::Content("4".to_string()), ProviderEvent::Done]
        );
    }
}

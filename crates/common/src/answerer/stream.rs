//! Incremental decoder for the answering backend's event stream
//!
//! The wire format is line oriented: `data: <payload>` lines carry
//! answer text or JSON, `[DONE]` closes the stream, and comment (`:`)
//! or `event:` framing lines carry nothing. Chunk boundaries fall
//! anywhere, so the decoder buffers partial lines between feeds.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RetrievedSource;
use crate::errors::Result;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental answer text, applied in arrival order
    Text(String),
    /// Out-of-band fields merged into the running result
    Metadata(StreamMetadata),
    /// Terminal sentinel; nothing follows
    Done,
}

/// Fields a metadata event may carry. Every field is optional; a field
/// absent from one event keeps the last value seen for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamMetadata {
    pub sources: Option<Vec<RetrievedSource>>,
    pub evaluation: Option<String>,
    pub processing_time: Option<f64>,
    pub chat_id: Option<Uuid>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub cost: Option<f64>,
}

impl StreamMetadata {
    /// Fold another metadata event into this one, last value winning
    /// per field.
    pub fn merge(&mut self, other: StreamMetadata) {
        if other.sources.is_some() {
            self.sources = other.sources;
        }
        if other.evaluation.is_some() {
            self.evaluation = other.evaluation;
        }
        if other.processing_time.is_some() {
            self.processing_time = other.processing_time;
        }
        if other.chat_id.is_some() {
            self.chat_id = other.chat_id;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.prompt_tokens.is_some() {
            self.prompt_tokens = other.prompt_tokens;
        }
        if other.completion_tokens.is_some() {
            self.completion_tokens = other.completion_tokens;
        }
        if other.total_tokens.is_some() {
            self.total_tokens = other.total_tokens;
        }
        if other.cost.is_some() {
            self.cost = other.cost;
        }
    }
}

/// Pure incremental decoder: feed raw bytes, get back the events they
/// completed.
///
/// One decoder per stream. After the terminal sentinel all further
/// input is discarded; input ending without a final newline leaves the
/// trailing partial line undecoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the terminal sentinel has been decoded
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one chunk of the transport stream
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            // Lossy is safe here: '\n' never splits a UTF-8 sequence,
            // so complete lines hold complete characters.
            let line = String::from_utf8_lossy(&line_bytes[..pos]);

            if let Some(event) = self.decode_line(line.trim()) {
                events.push(event);
            }

            if self.done {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamEvent> {
        // Comments, `event:` framing and blank lines carry no payload
        let payload = line.strip_prefix(DATA_PREFIX)?;

        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(StreamEvent::Done);
        }

        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Object(map)) => {
                if map.get("type").and_then(|t| t.as_str()) == Some("metadata") {
                    // A metadata event that fails the typed parse is
                    // dropped like any other unrecognized object.
                    serde_json::from_value::<StreamMetadata>(serde_json::Value::Object(map))
                        .ok()
                        .map(StreamEvent::Metadata)
                } else if let Some(content) = map.get("content").and_then(|c| c.as_str()) {
                    Some(StreamEvent::Text(content.to_string()))
                } else {
                    None
                }
            }
            // Bare JSON scalars and non-JSON payloads are both plain text
            _ => Some(StreamEvent::Text(payload.to_string())),
        }
    }
}

/// Decoded stream of answer events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Wrap an HTTP response body into a lazy stream of decoded events.
///
/// The stream ends after the terminal sentinel or transport EOF; a
/// transport error yields one `Err` item and then ends. Nothing is
/// read from the socket once the sentinel has been seen.
pub fn decode_events(response: reqwest::Response) -> EventStream {
    let initial = (
        response.bytes_stream(),
        SseDecoder::new(),
        VecDeque::new(),
        false,
    );

    Box::pin(stream::unfold(
        initial,
        |(mut body, mut decoder, mut pending, mut finished)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    if matches!(event, StreamEvent::Done) {
                        finished = true;
                    }
                    return Some((Ok(event), (body, decoder, pending, finished)));
                }

                if finished {
                    return None;
                }

                match body.next().await {
                    Some(Ok(chunk)) => {
                        pending.extend(decoder.feed(&chunk));
                    }
                    Some(Err(e)) => {
                        finished = true;
                        return Some((Err(e.into()), (body, decoder, pending, finished)));
                    }
                    None => return None,
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut SseDecoder, chunks: &[&str]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.feed(chunk.as_bytes()));
        }
        events
    }

    fn collect_text(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_fragments_concatenate_in_order() {
        let mut decoder = SseDecoder::new();
        let events = feed_all(
            &mut decoder,
            &[
                "data: Hello\n",
                "data: {\"type\":\"metadata\",\"sources\":[{\"content\":\"doc\",\"metadata\":{\"title\":\"T\"}}]}\n",
                "data:  world\n",
                "data: [DONE]\n",
            ],
        );

        assert_eq!(collect_text(&events), "Hello world");
        assert!(matches!(events.last(), Some(StreamEvent::Done)));

        let sources = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::Metadata(m) => m.sources.clone(),
                _ => None,
            })
            .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].content, "doc");
        assert_eq!(sources[0].metadata.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: Hel").is_empty());
        let events = decoder.feed(b"lo\n");
        assert_eq!(events, vec![StreamEvent::Text("Hello".to_string())]);
    }

    #[test]
    fn test_done_sentinel_stops_decoding() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: a\ndata: [DONE]\ndata: b\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("a".to_string()),
                StreamEvent::Done,
            ]
        );
        assert!(decoder.is_done());
        assert!(decoder.feed(b"data: c\n").is_empty());
    }

    #[test]
    fn test_metadata_event_is_not_answer_text() {
        let mut decoder = SseDecoder::new();
        let uuid = "3f1e1e7c-9a44-4d17-8a8a-0cbf6e1f2ab9";
        let events = decoder.feed(
            format!(
                "data: {{\"type\":\"metadata\",\"chatId\":\"{}\",\"processingTime\":1.5,\"totalTokens\":42}}\n",
                uuid
            )
            .as_bytes(),
        );

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Metadata(meta) => {
                assert_eq!(meta.chat_id, Some(uuid.parse().unwrap()));
                assert_eq!(meta.processing_time, Some(1.5));
                assert_eq!(meta.total_tokens, Some(42));
            }
            other => panic!("expected metadata event, got {:?}", other),
        }
    }

    #[test]
    fn test_content_object_counts_as_text() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"content\":\"hi\"}\n");
        assert_eq!(events, vec![StreamEvent::Text("hi".to_string())]);
    }

    #[test]
    fn test_unrecognized_object_is_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"foo\":1}\n").is_empty());
    }

    #[test]
    fn test_bare_json_scalar_is_plain_text() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: 42\n");
        assert_eq!(events, vec![StreamEvent::Text("42".to_string())]);
    }

    #[test]
    fn test_framing_lines_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: done\n\ndata: x\r\n");
        assert_eq!(events, vec![StreamEvent::Text("x".to_string())]);
    }

    #[test]
    fn test_metadata_merge_keeps_last_value_per_field() {
        let mut merged = StreamMetadata {
            evaluation: Some("first".to_string()),
            prompt_tokens: Some(1),
            ..Default::default()
        };

        merged.merge(StreamMetadata {
            evaluation: Some("second".to_string()),
            total_tokens: Some(10),
            ..Default::default()
        });

        assert_eq!(merged.evaluation.as_deref(), Some("second"));
        assert_eq!(merged.prompt_tokens, Some(1));
        assert_eq!(merged.total_tokens, Some(10));
    }

    #[tokio::test]
    async fn test_decode_events_over_http_body() {
        let body = "data: Hello\ndata: [DONE]\ndata: ignored\n";
        let response = axum::http::Response::builder()
            .status(200)
            .body(body.to_string())
            .unwrap();

        let events: Vec<_> = decode_events(reqwest::Response::from(response))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Text(t) if t == "Hello"
        ));
        assert!(matches!(events[1].as_ref().unwrap(), StreamEvent::Done));
    }
}

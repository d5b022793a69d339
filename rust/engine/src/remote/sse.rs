// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server-sent event framing and the render stream event set.

use crate::artifact::PartArtifact;
use serde::Deserialize;
use serde_json::Value;

/// Events of the render stream, tagged by the `event` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    PartStart {
        part: String,
        #[serde(default)]
        index: usize,
        #[serde(default)]
        total: usize,
    },
    Output {
        line: String,
    },
    PartDone {
        part: String,
        #[serde(default)]
        progress: Option<f64>,
    },
    Complete {
        parts: Vec<PartArtifact>,
    },
    Error {
        #[serde(default)]
        part: Option<String>,
        #[serde(default)]
        message: String,
    },
    /// Tags this client does not know yet; ignored.
    #[serde(other)]
    Unknown,
}

/// One decoded `data:` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    /// Bare `progress` field, present on any event kind
    pub progress: Option<f64>,
    pub event: Option<StreamEvent>,
}

impl StreamFrame {
    /// Parse a frame payload. A malformed known event keeps its `progress`
    /// and drops the event.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(payload)?;
        let progress = value.get("progress").and_then(Value::as_f64);
        let event = if value.get("event").is_some() {
            match StreamEvent::deserialize(&value) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed render stream event");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self { progress, event })
    }
}

/// Splits a byte stream into `data:` payloads. Chunks may end anywhere,
/// including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the payloads of every completed `data:` line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line with no newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\n', '\r']);
    let payload = text.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    (!payload.is_empty()).then(|| payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"event\":\"out").is_empty());
        let payloads = decoder.feed(b"put\",\"line\":\"x\"}\n\ndata: {\"progress\":5}\r\n");
        assert_eq!(
            payloads,
            vec![r#"{"event":"output","line":"x"}"#, r#"{"progress":5}"#]
        );
    }

    #[test]
    fn split_utf8_sequence_survives() {
        let mut decoder = SseDecoder::new();
        let frame = "data: {\"event\":\"output\",\"line\":\"Ø 5mm\"}\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&frame[..split]).is_empty());
        let payloads = decoder.feed(&frame[split..]);
        assert!(payloads[0].contains("Ø 5mm"));
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed(b": keep-alive\nevent: message\nid: 4\ndata: {}\n");
        assert_eq!(payloads, vec!["{}"]);
        assert_eq!(decoder.feed(b"data: {\"progress\":1}"), Vec::<String>::new());
        assert_eq!(decoder.finish().as_deref(), Some(r#"{"progress":1}"#));
    }

    #[test]
    fn parses_known_events() {
        let frame = StreamFrame::parse(r#"{"event":"part_start","part":"main","index":0,"total":2}"#).unwrap();
        assert_eq!(
            frame.event,
            Some(StreamEvent::PartStart { part: "main".into(), index: 0, total: 2 })
        );

        let frame = StreamFrame::parse(r#"{"event":"part_done","part":"main","progress":50}"#).unwrap();
        assert_eq!(frame.progress, Some(50.0));
        assert_eq!(
            frame.event,
            Some(StreamEvent::PartDone { part: "main".into(), progress: Some(50.0) })
        );

        let frame = StreamFrame::parse(
            r#"{"event":"complete","parts":[{"type":"main","url":"/static/main.stl","size_bytes":684}]}"#,
        )
        .unwrap();
        match frame.event {
            Some(StreamEvent::Complete { parts }) => assert_eq!(parts[0].kind, "main"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_tags_are_tolerated() {
        let frame = StreamFrame::parse(r#"{"event":"heartbeat","progress":12.5}"#).unwrap();
        assert_eq!(frame.event, Some(StreamEvent::Unknown));
        assert_eq!(frame.progress, Some(12.5));
    }

    #[test]
    fn malformed_known_event_keeps_progress() {
        let frame = StreamFrame::parse(r#"{"event":"part_start","progress":30}"#).unwrap();
        assert_eq!(frame.event, None);
        assert_eq!(frame.progress, Some(30.0));
        assert!(StreamFrame::parse("{not json").is_err());
    }
}

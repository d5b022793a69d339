// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote stream renderer: one POST per render, progress read from the
//! server-sent event body as it arrives.

pub mod sse;

use crate::artifact::{PartArtifact, ProgressSink};
use crate::error::{RenderError, Result};
use futures::StreamExt;
use sse::{SseDecoder, StreamEvent, StreamFrame};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;
use yantra_core::{detect_phase, is_log_worthy, ProgressEvent, RenderRequest};

#[derive(Debug, Clone)]
pub struct RemoteRenderer {
    client: reqwest::Client,
    api_base: String,
    stream_url: String,
    cancel_url: String,
}

impl RemoteRenderer {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        stream_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            stream_url: stream_url.into(),
            cancel_url: cancel_url.into(),
        }
    }

    /// Render through the remote service. Aborting the sink's signal drops
    /// the response body, which closes the connection.
    pub async fn render(
        &self,
        request: &RenderRequest,
        sink: &ProgressSink,
    ) -> Result<Vec<PartArtifact>> {
        let abort = sink.abort_signal().clone();
        if abort.is_aborted() {
            return Err(RenderError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = abort.cancelled() => Err(RenderError::Cancelled),
            result = self.stream_render(request, sink) => result,
        }
    }

    async fn stream_render(
        &self,
        request: &RenderRequest,
        sink: &ProgressSink,
    ) -> Result<Vec<PartArtifact>> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&self.stream_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.to_payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::transport(
                Some(status.as_u16()),
                format!("Render request failed: {}", body),
            ));
        }

        let mut decoder = SseDecoder::new();
        let mut final_parts: Option<Vec<PartArtifact>> = None;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            for payload in decoder.feed(&chunk?) {
                handle_payload(&payload, sink, &mut final_parts);
            }
        }
        if let Some(payload) = decoder.finish() {
            handle_payload(&payload, sink, &mut final_parts);
        }

        let parts = final_parts.unwrap_or_default();
        if parts.is_empty() {
            return Err(RenderError::Protocol(
                "Render stream completed without producing any parts".into(),
            ));
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let parts = parts
            .into_iter()
            .map(|mut part| {
                part.url = cache_busted_url(&self.api_base, &part.url, timestamp)?;
                Ok(part)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            mode = %request.mode,
            parts = parts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Remote render complete"
        );
        Ok(parts)
    }

    /// Ask the service to stop its current render. Failures are ignored.
    pub async fn cancel(&self) {
        if let Err(e) = self.client.post(&self.cancel_url).send().await {
            tracing::debug!(error = %e, "Cancel request failed");
        }
    }
}

fn handle_payload(
    payload: &str,
    sink: &ProgressSink,
    final_parts: &mut Option<Vec<PartArtifact>>,
) {
    let frame = match StreamFrame::parse(payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed SSE data");
            return;
        }
    };

    if let Some(progress) = frame.progress {
        sink.emit(ProgressEvent::percent(progress));
    }

    match frame.event {
        Some(StreamEvent::PartStart { part, index, total }) => {
            let log = format!("[{}] Starting... ({}/{})", part, index + 1, total);
            sink.emit(ProgressEvent::log(log).with_part(part));
        }
        Some(StreamEvent::Output { line }) => {
            if let Some(phase) = detect_phase(&line) {
                sink.emit(ProgressEvent::phase(phase));
            }
            if is_log_worthy(&line) {
                sink.emit(ProgressEvent::log(format!("  {}", line)));
            }
        }
        Some(StreamEvent::PartDone { part, progress }) => {
            let done = progress.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
            let log = format!("[{}] Done ({}%)", part, done);
            sink.emit(ProgressEvent::log(log).with_part(part));
        }
        Some(StreamEvent::Complete { parts }) => {
            *final_parts = Some(parts);
        }
        Some(StreamEvent::Error { part, message }) => {
            let part = part.as_deref().unwrap_or("render");
            tracing::warn!(part, message = %message, "Render service reported an error");
            sink.emit(ProgressEvent::log(format!("[ERROR] {}: {}", part, message)));
        }
        Some(StreamEvent::Unknown) | None => {}
    }
}

/// Resolve `url` against the API base and append a `t` query parameter.
pub(crate) fn cache_busted_url(api_base: &str, url: &str, timestamp: u128) -> Result<String> {
    let base = Url::parse(api_base)
        .map_err(|e| RenderError::Protocol(format!("invalid API base '{}': {}", api_base, e)))?;
    let mut resolved = base
        .join(url)
        .map_err(|e| RenderError::Protocol(format!("invalid artifact URL '{}': {}", url, e)))?;
    resolved
        .query_pairs_mut()
        .append_pair("t", &timestamp.to_string());
    Ok(resolved.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortSignal;
    use std::sync::{Arc, Mutex};

    fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ProgressSink::new(move |e| seen.lock().unwrap().push(e), AbortSignal::new())
        };
        (sink, seen)
    }

    #[test]
    fn cache_busting_resolves_relative_urls() {
        let url = cache_busted_url("http://localhost:5000", "/static/main.stl", 42).unwrap();
        assert_eq!(url, "http://localhost:5000/static/main.stl?t=42");

        let url = cache_busted_url("http://localhost:5000", "https://cdn.test/a.stl?v=1", 7).unwrap();
        assert_eq!(url, "https://cdn.test/a.stl?v=1&t=7");
    }

    #[test]
    fn payloads_map_to_progress_events() {
        let (sink, seen) = recording_sink();
        let mut parts = None;
        for payload in [
            r#"{"event":"part_start","part":"main","index":0,"total":1}"#,
            r#"{"event":"output","line":"Compiling design (CSG Tree generation)..."}"#,
            r#"{"event":"output","line":"ECHO: 1"}"#,
            r#"{"event":"error","part":"lid","message":"boom"}"#,
            r#"{"event":"part_done","part":"main","progress":100}"#,
            r#"{"event":"complete","parts":[{"type":"main","url":"/static/main.stl"}]}"#,
            "garbage",
        ] {
            handle_payload(payload, &sink, &mut parts);
        }

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ProgressEvent::log("[main] Starting... (1/1)").with_part("main"),
                ProgressEvent::phase(yantra_core::Phase::Compiling),
                ProgressEvent::log("  Compiling design (CSG Tree generation)..."),
                ProgressEvent::log("[ERROR] lid: boom"),
                ProgressEvent::percent(100.0),
                ProgressEvent::log("[main] Done (100%)").with_part("main"),
            ]
        );
        assert_eq!(parts.unwrap()[0].url, "/static/main.stl");
    }
}

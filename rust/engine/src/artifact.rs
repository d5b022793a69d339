// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Render outputs and the progress channel shared by both strategies.

use crate::abort::AbortSignal;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use yantra_core::ProgressEvent;

/// One named mesh output of a render.
///
/// Remote artifacts carry only a URL. Local artifacts also carry the bytes,
/// and their `blob:` URL is valid until the next render begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartArtifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip)]
    pub blob: Option<Bytes>,
}

impl PartArtifact {
    pub fn remote(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            size_bytes: None,
            blob: None,
        }
    }

    pub fn local(kind: impl Into<String>, url: impl Into<String>, blob: Bytes) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            size_bytes: Some(blob.len() as u64),
            blob: Some(blob),
        }
    }
}

/// Item of a render stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderUpdate {
    Progress(ProgressEvent),
    Completed(Vec<PartArtifact>),
}

type ProgressFn = dyn Fn(ProgressEvent) + Send + Sync;

/// Progress callback bound to a render's abort signal. Nothing is
/// delivered once the signal has fired.
#[derive(Clone)]
pub struct ProgressSink {
    callback: Option<Arc<ProgressFn>>,
    abort: AbortSignal,
}

impl ProgressSink {
    pub fn new<F>(callback: F, abort: AbortSignal) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
            abort,
        }
    }

    /// A sink that drops every event.
    pub fn noop(abort: AbortSignal) -> Self {
        Self {
            callback: None,
            abort,
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if self.abort.is_aborted() || event.is_empty() {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("callback", &self.callback.is_some())
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

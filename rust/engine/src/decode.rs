// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh decode worker.
//!
//! One background task per session, spawned on first use. Requests carry a
//! correlation id and the worker answers on a shared reply channel; a router
//! task hands each reply to the caller waiting on that id, so many decodes
//! can be in flight at once. Decoded meshes are cached by source URL.

use crate::blob::{BlobStore, BLOB_SCHEME};
use crate::error::{RenderError, Result};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use url::Url;
use yantra_geometry::{decode_stl, Bounds, MeshBuffers};

/// Triangle buffers ready for the viewer. Normals are always present.
/// Shared by reference; clone the buffers before transforming them.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub mesh: MeshBuffers,
    pub bounds: Option<Bounds>,
}

impl Geometry {
    fn from_mesh(mut mesh: MeshBuffers) -> Self {
        mesh.ensure_normals();
        let bounds = mesh.bounds();
        Self { mesh, bounds }
    }

    pub fn positions(&self) -> &[f32] {
        &self.mesh.positions
    }

    pub fn normals(&self) -> &[f32] {
        self.mesh.normals.as_deref().unwrap_or_default()
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounds.map(|b| b.radius()).unwrap_or(0.0)
    }
}

/// A decoded part, as held by the assembly cache.
#[derive(Debug, Clone)]
pub struct DecodedGeometry {
    pub kind: String,
    pub geometry: Arc<Geometry>,
}

#[derive(Debug)]
struct DecodeRequest {
    id: u64,
    url: String,
}

#[derive(Debug)]
struct DecodeReply {
    id: u64,
    result: std::result::Result<MeshBuffers, String>,
}

type Pending = Arc<Mutex<FxHashMap<u64, oneshot::Sender<std::result::Result<MeshBuffers, String>>>>>;

/// Resolves artifact URLs to bytes.
#[derive(Debug, Clone)]
struct Fetcher {
    client: reqwest::Client,
    api_base: Option<Url>,
    blobs: Arc<BlobStore>,
}

impl Fetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, String> {
        if url.starts_with(BLOB_SCHEME) {
            return self
                .blobs
                .get(url)
                .ok_or_else(|| "blob URL has been revoked".to_string());
        }

        let resolved = match (Url::parse(url), &self.api_base) {
            (Ok(parsed), _) => parsed,
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => {
                base.join(url).map_err(|e| e.to_string())?
            }
            (Err(e), _) => return Err(e.to_string()),
        };

        match resolved.scheme() {
            "http" | "https" => {
                let resp = self
                    .client
                    .get(resolved)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if !resp.status().is_success() {
                    return Err(format!("Failed to fetch STL: HTTP {}", resp.status().as_u16()));
                }
                resp.bytes().await.map_err(|e| e.to_string())
            }
            "file" => {
                let path = resolved
                    .to_file_path()
                    .map_err(|_| format!("invalid file URL {}", resolved))?;
                tokio::fs::read(path)
                    .await
                    .map(Bytes::from)
                    .map_err(|e| e.to_string())
            }
            other => Err(format!("unsupported URL scheme '{}'", other)),
        }
    }
}

async fn run_worker(
    mut requests: mpsc::UnboundedReceiver<DecodeRequest>,
    replies: mpsc::UnboundedSender<DecodeReply>,
    fetcher: Fetcher,
) {
    while let Some(DecodeRequest { id, url }) = requests.recv().await {
        let replies = replies.clone();
        let fetcher = fetcher.clone();
        tokio::spawn(async move {
            let result = match fetcher.fetch(&url).await {
                Ok(bytes) => tokio::task::spawn_blocking(move || decode_stl(&bytes))
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|decoded| decoded.map_err(|e| e.to_string())),
                Err(e) => Err(e),
            };
            let _ = replies.send(DecodeReply { id, result });
        });
    }
    tracing::debug!("Decode worker stopped");
}

async fn route_replies(mut replies: mpsc::UnboundedReceiver<DecodeReply>, pending: Pending) {
    while let Some(reply) = replies.recv().await {
        let waiter = pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&reply.id);
        if let Some(waiter) = waiter {
            let _ = waiter.send(reply.result);
        }
    }
}

#[derive(Debug)]
pub struct MeshDecoder {
    fetcher: Fetcher,
    worker: Mutex<Option<mpsc::UnboundedSender<DecodeRequest>>>,
    pending: Pending,
    next_id: AtomicU64,
    dispatched: AtomicU64,
    cache: Mutex<FxHashMap<String, Arc<Geometry>>>,
}

impl MeshDecoder {
    pub fn new(client: reqwest::Client, api_base: &str, blobs: Arc<BlobStore>) -> Self {
        Self {
            fetcher: Fetcher {
                client,
                api_base: Url::parse(api_base).ok(),
                blobs,
            },
            worker: Mutex::new(None),
            pending: Arc::new(Mutex::new(FxHashMap::default())),
            next_id: AtomicU64::new(1),
            dispatched: AtomicU64::new(0),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Decode the mesh at `url`. Repeated calls for the same URL return the
    /// same `Arc` without touching the worker.
    pub async fn decode(&self, url: &str) -> Result<Arc<Geometry>> {
        if let Some(hit) = self.cached(url) {
            return Ok(hit);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);

        let sent = self.worker_sender().send(DecodeRequest {
            id,
            url: url.to_string(),
        });
        if sent.is_err() {
            self.lock_pending().remove(&id);
            return Err(RenderError::decode(url, "decode worker is not running"));
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let mesh = rx
            .await
            .map_err(|_| RenderError::decode(url, "decode worker dropped the request"))?
            .map_err(|message| RenderError::decode(url, message))?;

        let geometry = Arc::new(Geometry::from_mesh(mesh));
        let stored = self
            .lock_cache()
            .entry(url.to_string())
            .or_insert(geometry)
            .clone();
        tracing::debug!(url = %url, triangles = stored.mesh.triangle_count(), "Decoded mesh");
        Ok(stored)
    }

    pub fn cached(&self, url: &str) -> Option<Arc<Geometry>> {
        self.lock_cache().get(url).cloned()
    }

    /// Number of requests sent to the worker so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    fn worker_sender(&self) -> mpsc::UnboundedSender<DecodeRequest> {
        let mut worker = self.lock_worker();
        if let Some(sender) = worker.as_ref() {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(request_rx, reply_tx, self.fetcher.clone()));
        tokio::spawn(route_replies(reply_rx, self.pending.clone()));
        tracing::debug!("Decode worker started");

        *worker = Some(request_tx.clone());
        request_tx
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<DecodeRequest>>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(
        &self,
    ) -> std::sync::MutexGuard<'_, FxHashMap<u64, oneshot::Sender<std::result::Result<MeshBuffers, String>>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, FxHashMap<String, Arc<Geometry>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use yantra_geometry::encode_binary_stl;

    fn triangle_stl() -> Vec<u8> {
        let mesh = MeshBuffers::new(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0], None);
        encode_binary_stl(&mesh, "tri")
    }

    fn decoder(server: &MockServer) -> MeshDecoder {
        MeshDecoder::new(reqwest::Client::new(), &server.base_url(), Arc::new(BlobStore::new()))
    }

    #[tokio::test]
    async fn second_decode_is_served_from_cache() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET").path("/static/main.stl");
            then.status(200).body(triangle_stl());
        });

        let decoder = decoder(&server);
        assert!(!decoder.is_running());
        let url = server.url("/static/main.stl?t=1");
        let first = decoder.decode(&url).await.unwrap();
        let second = decoder.decode(&url).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(decoder.dispatched(), 1);
        assert!(decoder.is_running());
        assert_eq!(first.positions().len(), 9);
        assert_eq!(&first.normals()[..3], &[0.0, 0.0, 1.0]);
        mock.assert();
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_worker() {
        let server = MockServer::start();
        for name in ["a", "b", "c"] {
            server.mock(move |when, then| {
                when.method("GET").path(format!("/static/{}.stl", name));
                then.status(200).body(triangle_stl());
            });
        }

        let decoder = decoder(&server);
        let (a, b, c) = tokio::join!(
            decoder.decode("/static/a.stl"),
            decoder.decode("/static/b.stl"),
            decoder.decode("/static/c.stl"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(decoder.dispatched(), 3);
    }

    #[tokio::test]
    async fn http_failure_is_a_decode_error_and_not_cached() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/static/missing.stl");
            then.status(404);
        });

        let decoder = decoder(&server);
        let url = server.url("/static/missing.stl");
        let err = decoder.decode(&url).await.unwrap_err();
        assert!(matches!(&err, RenderError::Decode { message, .. } if message == "Failed to fetch STL: HTTP 404"));
        assert!(decoder.cached(&url).is_none());
    }

    #[tokio::test]
    async fn blob_urls_resolve_until_revoked() {
        let blobs = Arc::new(BlobStore::new());
        let generation = blobs.begin_generation();
        let url = blobs.insert(generation, Bytes::from(triangle_stl()));

        let decoder = MeshDecoder::new(reqwest::Client::new(), "http://localhost:5000", blobs.clone());
        let geometry = decoder.decode(&url).await.unwrap();
        assert!((geometry.bounding_radius() - 8f32.sqrt() / 2.0).abs() < 1e-6);

        blobs.begin_generation();
        decoder.clear_cache();
        assert!(matches!(
            decoder.decode(&url).await,
            Err(RenderError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn garbage_payload_fails_to_decode() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/static/bad.stl");
            then.status(200).body("not an stl");
        });
        assert!(decoder(&server).decode("/static/bad.stl").await.is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory artifact store for locally rendered parts.
//!
//! URLs have the form `blob:yantra/<generation>/<uuid>`. Starting a new
//! generation revokes every URL issued for earlier ones, so artifacts of a
//! superseded render cannot be resolved.

use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub const BLOB_SCHEME: &str = "blob:";
const BLOB_PREFIX: &str = "blob:yantra/";

#[derive(Debug, Default)]
pub struct BlobStore {
    state: Mutex<BlobState>,
}

#[derive(Debug, Default)]
struct BlobState {
    generation: u64,
    blobs: FxHashMap<String, Bytes>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new render generation and revoke all earlier URLs.
    pub fn begin_generation(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        let revoked = state.blobs.len();
        state.blobs.clear();
        if revoked > 0 {
            tracing::debug!(revoked, generation = state.generation, "Revoked blob URLs");
        }
        state.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Register bytes for `generation` and return their URL. Bytes for a
    /// superseded generation are not kept, so the URL never resolves.
    pub fn insert(&self, generation: u64, data: Bytes) -> String {
        let url = format!("{}{}/{}", BLOB_PREFIX, generation, Uuid::new_v4());
        let mut state = self.lock();
        if generation == state.generation {
            state.blobs.insert(url.clone(), data);
        } else {
            tracing::debug!(generation, current = state.generation, "Dropped blob of superseded render");
        }
        url
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.lock().blobs.get(url).cloned()
    }

    pub fn revoke(&self, url: &str) -> bool {
        self.lock().blobs.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BlobState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

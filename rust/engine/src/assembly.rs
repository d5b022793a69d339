// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded assembly geometry keyed by the geometry-affecting parameters.

use crate::decode::DecodedGeometry;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use yantra_core::GeometryKey;

/// Render mode whose parts feed the animated assembly preview.
pub const ASSEMBLY_MODE: &str = "assembly";

#[derive(Debug, Default)]
pub struct AssemblyCache {
    entries: Mutex<FxHashMap<GeometryKey, Arc<[DecodedGeometry]>>>,
}

impl AssemblyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &GeometryKey) -> Option<Arc<[DecodedGeometry]>> {
        self.lock().get(key).cloned()
    }

    /// Store `parts` under `key`. An entry inserted first by a concurrent
    /// caller wins and is returned.
    pub fn insert(&self, key: GeometryKey, parts: Vec<DecodedGeometry>) -> Arc<[DecodedGeometry]> {
        self.lock().entry(key).or_insert_with(|| parts.into()).clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<GeometryKey, Arc<[DecodedGeometry]>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

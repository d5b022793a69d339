// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading manifests and resolving render requests
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Unknown part '{part}' in mode '{mode}'")]
    UnknownPart { mode: String, part: String },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

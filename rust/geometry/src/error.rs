// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding mesh payloads
#[derive(Error, Debug)]
pub enum Error {
    #[error("Truncated binary STL: expected {expected} bytes, got {actual}")]
    TruncatedBinary { expected: usize, actual: usize },

    #[error("Malformed ASCII STL at line {line}: {reason}")]
    MalformedAscii { line: usize, reason: String },

    #[error("Empty mesh: {0}")]
    EmptyMesh(String),
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Yantra4D Geometry
//!
//! Mesh payload decoding and part measurements: STL (binary and ASCII) into
//! flat triangle buffers, bounds, volume, centroid, and print estimates.
//! Binary facet records are decoded in parallel with rayon.

pub mod analysis;
pub mod error;
pub mod mesh;
pub mod print;
pub mod stl;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};

pub use analysis::{centroid, dimensions, measure, volume_mm3, Dimensions, PartMetrics};
pub use error::{Error, Result};
pub use mesh::{compute_vertex_normals, Bounds, MeshBuffers};
pub use print::{estimate_print, MaterialCatalog, MaterialProfile, PrintEstimate, PrintOverrides};
pub use stl::{decode_stl, encode_binary_stl};

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Volume, centroid and extent of closed meshes

use crate::error::{Error, Result};
use crate::mesh::{Bounds, MeshBuffers};
use nalgebra::{Point3, Vector3};

/// Part extent in millimetres, Z-up
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

/// Signed volume of the tetrahedron spanned by a triangle and the origin
#[inline]
fn signed_tetra_volume(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> f64 {
    v0.coords.dot(&v1.coords.cross(&v2.coords)) / 6.0
}

/// Enclosed volume in mm³. Only meaningful for closed meshes.
pub fn volume_mm3(mesh: &MeshBuffers) -> f64 {
    mesh.triangles()
        .map(|[v0, v1, v2]| signed_tetra_volume(&v0, &v1, &v2))
        .sum::<f64>()
        .abs()
}

/// Volumetric centroid; the origin when the mesh encloses no volume
pub fn centroid(mesh: &MeshBuffers) -> Point3<f64> {
    let mut volume = 0.0;
    let mut weighted = Vector3::zeros();

    for [v0, v1, v2] in mesh.triangles() {
        let vol = signed_tetra_volume(&v0, &v1, &v2);
        // Tetrahedron centroid: mean of the three vertices and the origin
        let tet_centroid = (v0.coords + v1.coords + v2.coords) / 4.0;
        volume += vol;
        weighted += tet_centroid * vol;
    }

    if volume.abs() < 1e-9 {
        return Point3::origin();
    }
    Point3::from(weighted / volume)
}

pub fn dimensions(mesh: &MeshBuffers) -> Dimensions {
    match mesh.bounds() {
        Some(bounds) => {
            let size = bounds.size();
            Dimensions {
                width: size.x as f64,
                depth: size.y as f64,
                height: size.z as f64,
            }
        }
        None => Dimensions::default(),
    }
}

/// Everything the print estimator and the viewer need about one part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartMetrics {
    pub volume_mm3: f64,
    pub centroid: Point3<f64>,
    pub dimensions: Dimensions,
    pub bounds: Bounds,
}

pub fn measure(mesh: &MeshBuffers) -> Result<PartMetrics> {
    let bounds = mesh
        .bounds()
        .ok_or_else(|| Error::EmptyMesh("mesh has no triangles".into()))?;
    Ok(PartMetrics {
        volume_mm3: volume_mm3(mesh),
        centroid: centroid(mesh),
        dimensions: dimensions(mesh),
        bounds,
    })
}

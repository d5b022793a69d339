// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Triangle buffers as handed to the viewer

use nalgebra::{Point3, Vector3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    /// Extent along each axis
    #[inline]
    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Radius of the sphere through the box corners, centred on the box
    #[inline]
    pub fn radius(&self) -> f32 {
        self.size().norm() * 0.5
    }
}

/// Non-indexed triangle soup: every 9 floats of `positions` are one triangle.
///
/// `normals`, when present, has one normal per vertex and the same length
/// as `positions`. Buffers are never mutated once handed to a cache; clone
/// before applying per-instance transforms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshBuffers {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f32>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Option<Vec<f32>>,
}

impl MeshBuffers {
    pub fn new(positions: Vec<f32>, normals: Option<Vec<f32>>) -> Self {
        Self { positions, normals }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 9
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate triangles as vertex triples
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
        self.positions.chunks_exact(9).map(|t| {
            [
                Point3::new(t[0] as f64, t[1] as f64, t[2] as f64),
                Point3::new(t[3] as f64, t[4] as f64, t[5] as f64),
                Point3::new(t[6] as f64, t[7] as f64, t[8] as f64),
            ]
        })
    }

    /// Calculate bounds, `None` for an empty mesh
    pub fn bounds(&self) -> Option<Bounds> {
        if self.is_empty() {
            return None;
        }

        let mut min = Point3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Point3::new(f32::MIN, f32::MIN, f32::MIN);

        self.positions.chunks_exact(3).for_each(|chunk| {
            let (x, y, z) = (chunk[0], chunk[1], chunk[2]);
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            min.z = min.z.min(z);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
            max.z = max.z.max(z);
        });

        Some(Bounds { min, max })
    }

    /// Fill in normals from triangle winding when the payload carried none.
    pub fn ensure_normals(&mut self) {
        if self.normals.is_none() {
            self.normals = Some(compute_vertex_normals(&self.positions));
        }
    }
}

/// Per-vertex normals for a non-indexed triangle soup.
///
/// Vertices are not shared between triangles, so each vertex takes its
/// face normal (right-hand rule). Degenerate triangles get a zero normal.
pub fn compute_vertex_normals(positions: &[f32]) -> Vec<f32> {
    let mut normals = Vec::with_capacity(positions.len());

    for t in positions.chunks_exact(9) {
        let v0 = Point3::new(t[0] as f64, t[1] as f64, t[2] as f64);
        let v1 = Point3::new(t[3] as f64, t[4] as f64, t[5] as f64);
        let v2 = Point3::new(t[6] as f64, t[7] as f64, t[8] as f64);

        let normal = (v1 - v0).cross(&(v2 - v0));
        let normal = normal
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros);

        for _ in 0..3 {
            normals.push(normal.x as f32);
            normals.push(normal.y as f32);
            normals.push(normal.z as f32);
        }
    }

    normals
}

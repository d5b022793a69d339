// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STL decoding and encoding.
//!
//! Both the binary and the ASCII variants are accepted. A payload is treated
//! as binary when its length matches the triangle count in the header;
//! otherwise it must be ASCII starting with `solid`.

use crate::error::{Error, Result};
use crate::mesh::MeshBuffers;
use rayon::prelude::*;

const HEADER_LEN: usize = 80;
const PREAMBLE_LEN: usize = HEADER_LEN + 4;
const TRIANGLE_RECORD_LEN: usize = 50;

/// Decode an STL payload into triangle buffers.
///
/// Normals are taken from the facet records; when every facet normal is zero
/// the buffers carry no normals and callers compute them from winding.
pub fn decode_stl(bytes: &[u8]) -> Result<MeshBuffers> {
    if let Some(count) = binary_triangle_count(bytes) {
        if PREAMBLE_LEN + count * TRIANGLE_RECORD_LEN == bytes.len() {
            return Ok(decode_binary(&bytes[PREAMBLE_LEN..], count));
        }
    }

    if looks_ascii(bytes) {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::MalformedAscii {
            line: 0,
            reason: e.to_string(),
        })?;
        return decode_ascii(text);
    }

    let expected = binary_triangle_count(bytes)
        .map(|count| PREAMBLE_LEN + count * TRIANGLE_RECORD_LEN)
        .unwrap_or(PREAMBLE_LEN);
    Err(Error::TruncatedBinary {
        expected,
        actual: bytes.len(),
    })
}

fn binary_triangle_count(bytes: &[u8]) -> Option<usize> {
    let raw: [u8; 4] = bytes.get(HEADER_LEN..PREAMBLE_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw) as usize)
}

fn looks_ascii(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"solid")
}

#[inline]
fn read_f32(record: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        record[offset],
        record[offset + 1],
        record[offset + 2],
        record[offset + 3],
    ])
}

fn decode_binary(records: &[u8], count: usize) -> MeshBuffers {
    // Each record: normal (3 x f32), three vertices (9 x f32), attribute u16
    let decoded: Vec<([f32; 9], [f32; 3])> = records
        .par_chunks_exact(TRIANGLE_RECORD_LEN)
        .map(|record| {
            let normal = [read_f32(record, 0), read_f32(record, 4), read_f32(record, 8)];
            let mut vertices = [0f32; 9];
            for (i, v) in vertices.iter_mut().enumerate() {
                *v = read_f32(record, 12 + i * 4);
            }
            (vertices, normal)
        })
        .collect();

    let mut positions = Vec::with_capacity(count * 9);
    let mut normals = Vec::with_capacity(count * 9);
    let mut any_normal = false;

    for (vertices, normal) in decoded {
        positions.extend_from_slice(&vertices);
        any_normal |= normal.iter().any(|c| *c != 0.0);
        for _ in 0..3 {
            normals.extend_from_slice(&normal);
        }
    }

    MeshBuffers::new(positions, any_normal.then_some(normals))
}

fn parse_floats<'a>(
    tokens: impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<[f32; 3]> {
    let mut out = [0f32; 3];
    let mut filled = 0;
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = token.parse().map_err(|_| Error::MalformedAscii {
            line,
            reason: format!("invalid number '{}'", token),
        })?;
        filled += 1;
    }
    if filled != 3 {
        return Err(Error::MalformedAscii {
            line,
            reason: "expected three coordinates".into(),
        });
    }
    Ok(out)
}

fn decode_ascii(text: &str) -> Result<MeshBuffers> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut any_normal = false;
    let mut facet_normal = [0f32; 3];
    let mut facet_vertices = 0usize;
    let mut open_facet: Option<usize> = None;
    let mut line_count = 0;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        line_count = line_no;
        let mut tokens = raw.split_whitespace();
        match tokens.next() {
            Some("facet") => {
                if tokens.next() != Some("normal") {
                    return Err(Error::MalformedAscii {
                        line: line_no,
                        reason: "expected 'facet normal'".into(),
                    });
                }
                facet_normal = parse_floats(tokens, line_no)?;
                any_normal |= facet_normal.iter().any(|c| *c != 0.0);
                facet_vertices = 0;
                open_facet = Some(line_no);
            }
            Some("vertex") => {
                positions.extend_from_slice(&parse_floats(tokens, line_no)?);
                normals.extend_from_slice(&facet_normal);
                facet_vertices += 1;
            }
            Some("endfacet") => {
                if facet_vertices != 3 {
                    return Err(Error::MalformedAscii {
                        line: line_no,
                        reason: format!("facet has {} vertices", facet_vertices),
                    });
                }
                open_facet = None;
            }
            _ => {}
        }
    }

    if let Some(opened) = open_facet {
        return Err(Error::MalformedAscii {
            line: line_count,
            reason: format!("facet opened at line {} is never closed", opened),
        });
    }
    if positions.len() % 9 != 0 {
        return Err(Error::MalformedAscii {
            line: line_count,
            reason: "vertex count is not a multiple of three".into(),
        });
    }

    Ok(MeshBuffers::new(positions, any_normal.then_some(normals)))
}

/// Encode triangle buffers as binary STL. Facet normals are recomputed from
/// winding.
pub fn encode_binary_stl(mesh: &MeshBuffers, header_name: &str) -> Vec<u8> {
    let triangle_count = mesh.triangle_count();
    let mut out = Vec::with_capacity(PREAMBLE_LEN + triangle_count * TRIANGLE_RECORD_LEN);

    let mut header = [0u8; HEADER_LEN];
    let name_bytes = header_name.as_bytes();
    let copy_n = name_bytes.len().min(header.len());
    header[..copy_n].copy_from_slice(&name_bytes[..copy_n]);
    // A binary header must not look like an ASCII file
    if header.starts_with(b"solid") {
        header[..5].copy_from_slice(b"SOLID");
    }
    out.extend_from_slice(&header);
    out.extend_from_slice(&(triangle_count as u32).to_le_bytes());

    let normals = crate::mesh::compute_vertex_normals(&mesh.positions);
    for (tri, normal) in mesh.positions.chunks_exact(9).zip(normals.chunks_exact(9)) {
        for c in &normal[..3] {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for c in tri {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }

    out
}

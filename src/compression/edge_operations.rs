//! Edge Operations - Pure DOP Functions
//!
//! Derives a feature-edge wireframe from a triangle mesh: an edge is kept when
//! the dihedral angle across it exceeds the threshold, or when it is not shared
//! by exactly two triangles.

use cgmath::Matrix4;
use rustc_hash::FxHashSet;

use super::compression_data::{CompressionScratch, EdgeFaces};
use super::quantization_operations::decompress_position;

/// Feature edges keyed on position-welded vertices
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    /// Vertex -> first vertex with the same quantized position
    pub canonical: Vec<u32>,
    /// Undirected edges as `(min, max)` canonical vertex pairs
    pub keys: FxHashSet<(u32, u32)>,
}

impl EdgeSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Canonical key for the edge between two vertices
    #[inline]
    pub fn key(&self, a: u32, b: u32) -> (u32, u32) {
        let ca = self.canonical[a as usize];
        let cb = self.canonical[b as usize];
        if ca < cb {
            (ca, cb)
        } else {
            (cb, ca)
        }
    }
}

fn face_normal(decode_matrix: &Matrix4<f64>, positions_quantized: &[u16], tri: [u32; 3]) -> [f64; 3] {
    let vertices: &[[u16; 3]] = bytemuck::cast_slice(positions_quantized);
    let fetch = |v: u32| decompress_position(decode_matrix, &vertices[v as usize]);
    let a = fetch(tri[0]);
    let b = fetch(tri[1]);
    let c = fetch(tri[2]);
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        ab[1] * ac[2] - ab[2] * ac[1],
        ab[2] * ac[0] - ab[0] * ac[2],
        ab[0] * ac[1] - ab[1] * ac[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 0.0 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0; 3]
    }
}

/// Detect feature edges of a triangle mesh
///
/// Vertices are welded by quantized position first so UV seams do not show up
/// as open edges. Zero-area triangles take no part in adjacency.
pub fn detect_edges(
    positions_quantized: &[u16],
    decode_matrix: &Matrix4<f64>,
    indices: &[u32],
    threshold_degrees: f64,
    scratch: &mut CompressionScratch,
) -> EdgeSet {
    let num_vertices = positions_quantized.len() / 3;

    // Weld by position
    let lookup = &mut scratch.unique_lookup;
    lookup.clear();
    let mut canonical = Vec::with_capacity(num_vertices);
    for (vertex, p) in positions_quantized.chunks_exact(3).enumerate() {
        let c = *lookup.entry([p[0], p[1], p[2], 0, 0]).or_insert(vertex as u32);
        canonical.push(c);
    }

    let normals = &mut scratch.face_normals;
    let faces = &mut scratch.edge_faces;
    normals.clear();
    faces.clear();

    let mut set = EdgeSet {
        canonical,
        keys: FxHashSet::default(),
    };

    let mut triangles: Vec<[u32; 3]> = Vec::with_capacity(indices.len() / 3);
    for tri in indices.chunks_exact(3) {
        let c = [
            set.canonical[tri[0] as usize],
            set.canonical[tri[1] as usize],
            set.canonical[tri[2] as usize],
        ];
        if c[0] == c[1] || c[1] == c[2] || c[0] == c[2] {
            continue;
        }
        let normal = face_normal(decode_matrix, positions_quantized, c);
        if normal == [0.0; 3] {
            continue;
        }
        let face = normals.len() as u32;
        normals.push(normal);
        triangles.push(c);
        for (a, b) in [(c[0], c[1]), (c[1], c[2]), (c[2], c[0])] {
            let key = if a < b { (a, b) } else { (b, a) };
            faces
                .entry(key)
                .and_modify(|f| {
                    if f.second.is_none() {
                        f.second = Some(face);
                    }
                    f.count += 1;
                })
                .or_insert(EdgeFaces {
                    first: face,
                    second: None,
                    count: 1,
                });
        }
    }

    let threshold = threshold_degrees.to_radians();
    for (key, f) in faces.iter() {
        let keep = match (f.count, f.second) {
            (2, Some(second)) => {
                let n0 = normals[f.first as usize];
                let n1 = normals[second as usize];
                let dot = (n0[0] * n1[0] + n0[1] * n1[1] + n0[2] * n1[2]).clamp(-1.0, 1.0);
                dot.acos() > threshold
            }
            _ => true,
        };
        if keep {
            set.keys.insert(*key);
        }
    }

    log::debug!(
        "[edge_operations::detect_edges] {} triangles, {} candidate edges, {} kept",
        triangles.len(),
        faces.len(),
        set.keys.len()
    );

    set
}

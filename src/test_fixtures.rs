//! Geometry builders shared by unit tests

use crate::compression::{PrimitiveKind, RawGeometry};

/// Axis-aligned cube as 6 faces of 4 unshared vertices (24 positions, 12 triangles)
pub fn cube(center: [f64; 3], half: f64, primitive: PrimitiveKind) -> RawGeometry {
    let corners = [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    let faces: [[usize; 4]; 6] = [
        [1, 5, 6, 2],
        [4, 0, 3, 7],
        [3, 2, 6, 7],
        [4, 5, 1, 0],
        [5, 4, 7, 6],
        [0, 1, 2, 3],
    ];
    let mut positions = Vec::with_capacity(72);
    let mut indices = Vec::with_capacity(36);
    for (f, face) in faces.iter().enumerate() {
        for &corner in face {
            let c: [f64; 3] = corners[corner];
            positions.extend_from_slice(&[
                center[0] + c[0] * half,
                center[1] + c[1] * half,
                center[2] + c[2] * half,
            ]);
        }
        let base = (f * 4) as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    RawGeometry {
        primitive,
        positions,
        indices,
        uvs: None,
        edge_threshold_degrees: None,
    }
}

/// Flat grid of `cells x cells` quads; `(cells + 1)^2` unique vertices
pub fn grid(cells: usize, spacing: f64) -> RawGeometry {
    let side = cells + 1;
    let mut positions = Vec::with_capacity(side * side * 3);
    for y in 0..side {
        for x in 0..side {
            positions.extend_from_slice(&[x as f64 * spacing, y as f64 * spacing, 0.0]);
        }
    }
    let mut indices = Vec::with_capacity(cells * cells * 6);
    for y in 0..cells {
        for x in 0..cells {
            let a = (y * side + x) as u32;
            let b = a + 1;
            let c = a + side as u32;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }
    RawGeometry {
        primitive: PrimitiveKind::Surface,
        positions,
        indices,
        uvs: None,
        edge_threshold_degrees: None,
    }
}

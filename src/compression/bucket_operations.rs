//! Bucket Operations - Pure DOP Functions
//!
//! Splits a deduplicated geometry into buckets whose vertex count fits an index
//! width tier. Primitives are taken in order; a bucket is closed as soon as the
//! next primitive would bring in more vertices than the ceiling allows.

use super::compression_data::GeometryBucket;
use super::dedup_operations::UniqueVertices;
use super::edge_operations::EdgeSet;

const UNASSIGNED: u32 = u32::MAX;

/// Bucket under construction
struct OpenBucket {
    /// Local vertex -> unique vertex
    globals: Vec<u32>,
    indices: Vec<u32>,
    edge_indices: Vec<u32>,
}

impl OpenBucket {
    fn new() -> Self {
        Self {
            globals: Vec::new(),
            indices: Vec::new(),
            edge_indices: Vec::new(),
        }
    }
}

fn close_bucket(
    open: OpenBucket,
    vertices: &UniqueVertices,
    local_of: &mut [u32],
    out: &mut Vec<GeometryBucket>,
) {
    let mut positions = Vec::with_capacity(open.globals.len() * 3);
    let mut uvs = vertices
        .uvs_quantized
        .as_ref()
        .map(|_| Vec::with_capacity(open.globals.len() * 2));
    for &g in &open.globals {
        let g = g as usize;
        positions.extend_from_slice(&vertices.positions_quantized[g * 3..g * 3 + 3]);
        if let (Some(dst), Some(src)) = (uvs.as_mut(), vertices.uvs_quantized.as_ref()) {
            dst.extend_from_slice(&src[g * 2..g * 2 + 2]);
        }
        local_of[g] = UNASSIGNED;
    }
    out.push(GeometryBucket {
        positions_quantized: positions,
        uvs_quantized: uvs,
        indices: open.indices,
        edge_indices: open.edge_indices,
    });
}

/// Split `vertices` into buckets of at most `ceiling` vertices each
///
/// `ceiling = None` keeps everything in one bucket. Feature edges in `edges`
/// are emitted in the first bucket holding a triangle that contains them, so
/// every edge lands in exactly one bucket with bucket-local indices.
pub fn build_buckets(
    vertices: &UniqueVertices,
    vertices_per_primitive: usize,
    edges: Option<&EdgeSet>,
    ceiling: Option<usize>,
) -> Vec<GeometryBucket> {
    let num_vertices = vertices.num_vertices();
    let ceiling = ceiling.unwrap_or(usize::MAX);
    let mut local_of = vec![UNASSIGNED; num_vertices];
    let mut pending_edges = edges.map(|e| e.keys.clone());
    let mut buckets = Vec::new();
    let mut open = OpenBucket::new();

    for primitive in vertices.indices.chunks_exact(vertices_per_primitive) {
        let incoming = primitive
            .iter()
            .enumerate()
            .filter(|&(i, &v)| local_of[v as usize] == UNASSIGNED && !primitive[..i].contains(&v))
            .count();
        if !open.indices.is_empty() && open.globals.len() + incoming > ceiling {
            let full = std::mem::replace(&mut open, OpenBucket::new());
            close_bucket(full, vertices, &mut local_of, &mut buckets);
        }

        for &v in primitive {
            if local_of[v as usize] == UNASSIGNED {
                local_of[v as usize] = open.globals.len() as u32;
                open.globals.push(v);
            }
            open.indices.push(local_of[v as usize]);
        }

        if let (Some(edges), Some(pending)) = (edges, pending_edges.as_mut()) {
            if vertices_per_primitive == 3 {
                for (a, b) in [
                    (primitive[0], primitive[1]),
                    (primitive[1], primitive[2]),
                    (primitive[2], primitive[0]),
                ] {
                    if pending.remove(&edges.key(a, b)) {
                        open.edge_indices.push(local_of[a as usize]);
                        open.edge_indices.push(local_of[b as usize]);
                    }
                }
            }
        }
    }

    if !open.indices.is_empty() {
        close_bucket(open, vertices, &mut local_of, &mut buckets);
    }

    if let Some(pending) = pending_edges.filter(|p| !p.is_empty()) {
        log::warn!(
            "[bucket_operations::build_buckets] {} edges had no owning triangle and were dropped",
            pending.len()
        );
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::compression_data::IndexTier;

    fn strip(num_triangles: usize) -> UniqueVertices {
        // Triangle strip over a 2 x (n/2 + 1) grid of distinct vertices
        let num_vertices = num_triangles + 2;
        let positions = (0..num_vertices)
            .flat_map(|i| [i as u16, (i % 2) as u16, 0])
            .collect();
        let indices = (0..num_triangles as u32)
            .flat_map(|i| [i, i + 1, i + 2])
            .collect();
        UniqueVertices {
            positions_quantized: positions,
            uvs_quantized: None,
            indices,
        }
    }

    #[test]
    fn test_small_geometry_is_single_bucket() {
        let vertices = strip(10);
        let buckets = build_buckets(&vertices, 3, None, Some(256));
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].num_vertices(), 12);
        assert_eq!(buckets[0].indices, vertices.indices);
        assert_eq!(buckets[0].tier(), IndexTier::Bits8);
    }

    #[test]
    fn test_ceiling_splits_and_respects_width() {
        let vertices = strip(1000);
        let buckets = build_buckets(&vertices, 3, None, Some(256));
        assert!(buckets.len() > 1);
        let mut triangles = 0;
        for bucket in &buckets {
            assert!(bucket.num_vertices() <= 256);
            assert!(bucket
                .indices
                .iter()
                .all(|&i| (i as usize) < bucket.num_vertices()));
            triangles += bucket.indices.len() / 3;
        }
        assert_eq!(triangles, 1000);
    }

    #[test]
    fn test_buckets_preserve_triangle_positions() {
        let vertices = strip(600);
        let buckets = build_buckets(&vertices, 3, None, Some(256));
        let mut source = vertices.indices.chunks_exact(3);
        for bucket in &buckets {
            for tri in bucket.indices.chunks_exact(3) {
                let original = source.next().expect("same triangle count");
                for (&local, &global) in tri.iter().zip(original) {
                    let l = local as usize * 3;
                    let g = global as usize * 3;
                    assert_eq!(
                        &bucket.positions_quantized[l..l + 3],
                        &vertices.positions_quantized[g..g + 3]
                    );
                }
            }
        }
    }

    #[test]
    fn test_no_ceiling_keeps_one_bucket() {
        let vertices = strip(600);
        let buckets = build_buckets(&vertices, 3, None, None);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].tier(), IndexTier::Bits16);
    }

    #[test]
    fn test_lines_bucket_by_pairs() {
        let vertices = UniqueVertices {
            positions_quantized: (0..600u16).flat_map(|i| [i, 0, 0]).collect(),
            uvs_quantized: None,
            indices: (0..300u32).flat_map(|i| [2 * i, 2 * i + 1]).collect(),
        };
        let buckets = build_buckets(&vertices, 2, None, Some(256));
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].num_vertices(), 256);
        assert_eq!(buckets[0].indices.len(), 256);
    }
}

//! Dedup Operations - Pure DOP Functions
//!
//! Merges vertices whose quantized position (and UV, when present) are
//! identical, and remaps indices onto the surviving vertices.

use super::compression_data::CompressionScratch;

/// Vertices left after deduplication
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueVertices {
    pub positions_quantized: Vec<u16>,
    pub uvs_quantized: Option<Vec<u16>>,
    pub indices: Vec<u32>,
}

impl UniqueVertices {
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions_quantized.len() / 3
    }
}

/// Deduplicate quantized vertices
///
/// The first occurrence of each distinct vertex keeps its relative order, so a
/// geometry without duplicates comes back unchanged.
pub fn dedup_vertices(
    positions_quantized: &[u16],
    uvs_quantized: Option<&[u16]>,
    indices: &[u32],
    scratch: &mut CompressionScratch,
) -> UniqueVertices {
    let num_vertices = positions_quantized.len() / 3;
    let lookup = &mut scratch.unique_lookup;
    let remap = &mut scratch.remap;
    lookup.clear();
    remap.clear();
    remap.reserve(num_vertices);

    let mut positions = Vec::with_capacity(positions_quantized.len());
    let mut uvs = uvs_quantized.map(|uv| Vec::with_capacity(uv.len()));

    for vertex in 0..num_vertices {
        let p = &positions_quantized[vertex * 3..vertex * 3 + 3];
        let (u, v) = match uvs_quantized {
            Some(uv) => (uv[vertex * 2], uv[vertex * 2 + 1]),
            None => (0, 0),
        };
        let key = [p[0], p[1], p[2], u, v];
        let next = (positions.len() / 3) as u32;
        let unique = *lookup.entry(key).or_insert_with(|| {
            positions.extend_from_slice(p);
            if let Some(uvs) = uvs.as_mut() {
                uvs.push(u);
                uvs.push(v);
            }
            next
        });
        remap.push(unique);
    }

    let indices = indices.iter().map(|&i| remap[i as usize]).collect();

    log::debug!(
        "[dedup_operations::dedup_vertices] {} -> {} vertices",
        num_vertices,
        positions.len() / 3
    );

    UniqueVertices {
        positions_quantized: positions,
        uvs_quantized: uvs,
        indices,
    }
}

//! Compression Operations - Pure DOP Functions
//!
//! The `compress` pipeline: validate, RTC-convert, quantize, dedup, detect
//! edges, bucket.

use super::bucket_operations::build_buckets;
use super::compression_data::{
    CompressedGeometry, CompressionScratch, CompressionStats, PrimitiveKind, RawGeometry,
};
use super::dedup_operations::dedup_vertices;
use super::edge_operations::detect_edges;
use super::quantization_operations::{
    build_decode_matrix, build_uv_decode_matrix, compute_bounds, compute_centroid,
    compute_uv_bounds, quantize_positions, quantize_uvs, rtc_origin, subtract_origin,
};
use super::{CompressionError, CompressionResult};
use crate::config::CompressionConfig;
use crate::constants::tiers;

/// Compress one geometry with a temporary scratch buffer
pub fn compress(raw: &RawGeometry, config: &CompressionConfig) -> CompressionResult<CompressedGeometry> {
    let mut scratch = CompressionScratch::default();
    compress_with_scratch(raw, config, &mut scratch)
}

/// Compress one geometry reusing caller-owned scratch space
pub fn compress_with_scratch(
    raw: &RawGeometry,
    config: &CompressionConfig,
    scratch: &mut CompressionScratch,
) -> CompressionResult<CompressedGeometry> {
    let num_vertices = validate(raw)?;
    let vpp = raw.primitive.vertices_per_primitive();

    // Non-indexed input draws vertices in order
    let sequential: Vec<u32>;
    let indices: &[u32] = if raw.indices.is_empty() {
        sequential = (0..num_vertices as u32).collect();
        &sequential
    } else {
        &raw.indices
    };

    // RTC conversion
    let origin = rtc_origin(compute_centroid(&raw.positions), config.rtc_cell_size);
    let mut rtc_positions = std::mem::take(&mut scratch.rtc_positions);
    subtract_origin(&raw.positions, origin, &mut rtc_positions);

    // Quantization
    let bounds = compute_bounds(&rtc_positions);
    let decode_matrix = build_decode_matrix(&bounds);
    let mut quantized = std::mem::take(&mut scratch.quantized);
    quantize_positions(&rtc_positions, &bounds, &mut quantized);

    let mut uvs_quantized = std::mem::take(&mut scratch.uvs_quantized);
    let uv_decode_matrix = match raw.uvs.as_deref() {
        Some(uvs) => {
            let (min, max) = compute_uv_bounds(uvs);
            quantize_uvs(uvs, min, max, &mut uvs_quantized);
            Some(build_uv_decode_matrix(min, max))
        }
        None => None,
    };

    // Dedup
    let unique = dedup_vertices(
        &quantized,
        uv_decode_matrix.map(|_| uvs_quantized.as_slice()),
        indices,
        scratch,
    );

    // Edges
    let edges = if raw.primitive.generates_edges() {
        let threshold = raw
            .edge_threshold_degrees
            .unwrap_or(config.edge_threshold_degrees);
        Some(detect_edges(
            &unique.positions_quantized,
            &decode_matrix,
            &unique.indices,
            threshold,
            scratch,
        ))
    } else {
        None
    };

    // Buckets
    let ceiling = if unique.num_vertices() <= tiers::MAX_VERTICES_8_BITS {
        Some(tiers::MAX_VERTICES_8_BITS)
    } else if unique.num_vertices() <= tiers::MAX_VERTICES_16_BITS || config.split_large_geometries
    {
        Some(tiers::MAX_VERTICES_16_BITS)
    } else {
        None
    };
    let buckets = build_buckets(&unique, vpp, edges.as_ref(), ceiling);

    let mut primitive = raw.primitive;
    if primitive == PrimitiveKind::Solid && buckets.len() > 1 {
        log::warn!(
            "[compression_operations::compress] Solid geometry split into {} buckets, reclassified as Surface",
            buckets.len()
        );
        primitive = PrimitiveKind::Surface;
    }

    scratch.rtc_positions = rtc_positions;
    scratch.quantized = quantized;
    scratch.uvs_quantized = uvs_quantized;

    let geometry = CompressedGeometry {
        primitive,
        origin,
        decode_matrix,
        uv_decode_matrix,
        buckets,
        num_input_vertices: num_vertices,
    };
    log::debug!(
        "[compression_operations::compress] {} at origin {:?}",
        compression_stats(&geometry),
        origin
    );
    Ok(geometry)
}

/// Validate a raw geometry and return its vertex count
fn validate(raw: &RawGeometry) -> CompressionResult<usize> {
    if raw.positions.len() % 3 != 0 {
        return Err(CompressionError::InvalidPositionCount {
            count: raw.positions.len(),
        });
    }
    let num_vertices = raw.positions.len() / 3;
    if num_vertices == 0 {
        return Err(CompressionError::EmptyGeometry);
    }
    if num_vertices > u32::MAX as usize {
        return Err(CompressionError::TooManyVertices {
            count: num_vertices,
        });
    }
    if let Some(index) = raw.positions.iter().position(|v| !v.is_finite()) {
        return Err(CompressionError::NonFinitePosition { index: index / 3 });
    }

    let vpp = raw.primitive.vertices_per_primitive();
    let index_count = if raw.indices.is_empty() {
        num_vertices
    } else {
        raw.indices.len()
    };
    if index_count % vpp != 0 {
        return Err(CompressionError::InvalidIndexCount {
            count: index_count,
            vertices_per_primitive: vpp,
        });
    }
    if let Some(&index) = raw.indices.iter().find(|&&i| i as usize >= num_vertices) {
        return Err(CompressionError::IndexOutOfRange {
            index,
            num_vertices,
        });
    }

    if let Some(uvs) = raw.uvs.as_ref() {
        if uvs.len() != num_vertices * 2 {
            return Err(CompressionError::UvCountMismatch {
                expected: num_vertices * 2,
                found: uvs.len(),
            });
        }
        if uvs.iter().any(|v| !v.is_finite()) {
            return Err(CompressionError::NonFiniteUv);
        }
    }

    Ok(num_vertices)
}

/// Summarize a compressed geometry
pub fn compression_stats(geometry: &CompressedGeometry) -> CompressionStats {
    let vpp = geometry.primitive.vertices_per_primitive();
    CompressionStats {
        input_vertices: geometry.num_input_vertices,
        unique_vertices: geometry.buckets.iter().map(|b| b.num_vertices()).sum(),
        primitives: geometry.buckets.iter().map(|b| b.indices.len() / vpp).sum(),
        edges: geometry.buckets.iter().map(|b| b.edge_indices.len() / 2).sum(),
        buckets: geometry.buckets.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::compression_data::IndexTier;
    use crate::compression::quantization_operations::decompress_position;
    use crate::constants::quantization::MAX_QUANTIZED;
    use crate::test_fixtures::cube;
    use cgmath::Point3;

    #[test]
    fn test_unit_cube_end_to_end() {
        let raw = cube([1_000_050.0, -30.0, 410.0], 0.5, PrimitiveKind::Solid);
        let geometry = compress(&raw, &CompressionConfig::default()).expect("compress");

        assert_eq!(geometry.primitive, PrimitiveKind::Solid);
        assert_eq!(geometry.origin, Point3::new(1_000_000.0, 0.0, 400.0));
        assert_eq!(geometry.buckets.len(), 1);

        let expected_scale = 1.0 / MAX_QUANTIZED;
        for axis in 0..3 {
            assert!((geometry.decode_matrix[axis][axis] - expected_scale).abs() < 1e-12);
        }

        let bucket = &geometry.buckets[0];
        assert_eq!(bucket.indices.len(), 36);
        assert_eq!(bucket.num_vertices(), 8);
        assert_eq!(bucket.tier(), IndexTier::Bits8);
        // Twelve cube edges, face diagonals dropped
        assert_eq!(bucket.edge_indices.len(), 24);
        assert!(bucket.edge_indices.iter().all(|&i| i < 8));
    }

    #[test]
    fn test_positions_decode_close_to_source() {
        let raw = cube([12_345.0, 678.0, -9_999.0], 3.0, PrimitiveKind::Triangles);
        let geometry = compress(&raw, &CompressionConfig::default()).expect("compress");
        let bucket = &geometry.buckets[0];
        let tolerance = 6.0 / MAX_QUANTIZED + 1e-9;
        for q in bytemuck::cast_slice::<u16, [u16; 3]>(&bucket.positions_quantized) {
            let p = decompress_position(&geometry.decode_matrix, q);
            let world = [
                p[0] + geometry.origin.x,
                p[1] + geometry.origin.y,
                p[2] + geometry.origin.z,
            ];
            let found = raw.positions.chunks_exact(3).any(|s| {
                (0..3).all(|axis| (s[axis] - world[axis]).abs() <= tolerance)
            });
            assert!(found, "decoded vertex {:?} matches no source vertex", world);
        }
    }

    #[test]
    fn test_solid_split_becomes_surface() {
        // Disconnected triangles with more than 65536 unique vertices
        let num_triangles = 22_000;
        let mut positions = Vec::with_capacity(num_triangles * 9);
        for t in 0..num_triangles {
            let x = t as f64;
            positions.extend_from_slice(&[x, 0.0, 0.0, x, 1.0, 0.0, x, 0.0, 1.0]);
        }
        let raw = RawGeometry {
            primitive: PrimitiveKind::Solid,
            positions,
            indices: Vec::new(),
            uvs: None,
            edge_threshold_degrees: None,
        };
        let geometry = compress(&raw, &CompressionConfig::default()).expect("compress");
        assert!(geometry.buckets.len() > 1);
        assert_eq!(geometry.primitive, PrimitiveKind::Surface);
        for bucket in &geometry.buckets {
            assert!(bucket.num_vertices() <= 65536);
            assert_eq!(bucket.tier(), IndexTier::Bits16);
        }
    }

    #[test]
    fn test_unsplit_large_geometry_uses_32_bit_tier() {
        let num_triangles = 22_000;
        let positions = (0..num_triangles)
            .flat_map(|t| {
                let x = t as f64;
                [x, 0.0, 0.0, x, 1.0, 0.0, x, 0.0, 1.0]
            })
            .collect();
        let raw = RawGeometry {
            primitive: PrimitiveKind::Solid,
            positions,
            indices: Vec::new(),
            uvs: None,
            edge_threshold_degrees: None,
        };
        let config = CompressionConfig {
            split_large_geometries: false,
            ..Default::default()
        };
        let geometry = compress(&raw, &config).expect("compress");
        assert_eq!(geometry.buckets.len(), 1);
        assert_eq!(geometry.buckets[0].tier(), IndexTier::Bits32);
        assert_eq!(geometry.primitive, PrimitiveKind::Solid);
    }

    #[test]
    fn test_lines_have_no_edges() {
        let raw = RawGeometry {
            primitive: PrimitiveKind::Lines,
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            indices: vec![0, 1, 1, 2],
            uvs: None,
            edge_threshold_degrees: None,
        };
        let geometry = compress(&raw, &CompressionConfig::default()).expect("compress");
        assert_eq!(geometry.buckets.len(), 1);
        assert!(geometry.buckets[0].edge_indices.is_empty());
        assert_eq!(geometry.buckets[0].indices, vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_uvs_travel_with_vertices() {
        let mut raw = cube([0.0, 0.0, 0.0], 1.0, PrimitiveKind::Triangles);
        let uvs: Vec<f64> = (0..24).flat_map(|i| [(i % 4) as f64 / 3.0, 0.5]).collect();
        raw.uvs = Some(uvs);
        let geometry = compress(&raw, &CompressionConfig::default()).expect("compress");
        let bucket = &geometry.buckets[0];
        assert!(geometry.uv_decode_matrix.is_some());
        let uvs = bucket.uvs_quantized.as_ref().expect("uvs");
        assert_eq!(uvs.len(), bucket.num_vertices() * 2);
        // UV seams keep corners apart, edges still weld by position
        assert!(bucket.num_vertices() > 8);
        assert_eq!(bucket.edge_indices.len(), 24);
    }

    #[test]
    fn test_scratch_reuse_gives_same_result() {
        let mut scratch = CompressionScratch::default();
        let config = CompressionConfig::default();
        let a = compress_with_scratch(&cube([0.0; 3], 1.0, PrimitiveKind::Solid), &config, &mut scratch)
            .expect("first");
        let _ = compress_with_scratch(&cube([500.0; 3], 7.0, PrimitiveKind::Solid), &config, &mut scratch)
            .expect("second");
        let c = compress_with_scratch(&cube([0.0; 3], 1.0, PrimitiveKind::Solid), &config, &mut scratch)
            .expect("third");
        assert_eq!(a.buckets, c.buckets);
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = CompressionConfig::default();
        let mut raw = cube([0.0; 3], 1.0, PrimitiveKind::Triangles);
        raw.indices.push(99);
        raw.indices.push(0);
        raw.indices.push(1);
        assert!(matches!(
            compress(&raw, &config),
            Err(CompressionError::IndexOutOfRange { index: 99, .. })
        ));

        let mut raw = cube([0.0; 3], 1.0, PrimitiveKind::Triangles);
        raw.indices.pop();
        assert!(matches!(
            compress(&raw, &config),
            Err(CompressionError::InvalidIndexCount { .. })
        ));

        let mut raw = cube([0.0; 3], 1.0, PrimitiveKind::Triangles);
        raw.positions[4] = f64::NAN;
        assert!(matches!(
            compress(&raw, &config),
            Err(CompressionError::NonFinitePosition { index: 1 })
        ));

        let empty = RawGeometry {
            primitive: PrimitiveKind::Points,
            positions: Vec::new(),
            indices: Vec::new(),
            uvs: None,
            edge_threshold_degrees: None,
        };
        assert!(matches!(compress(&empty, &config), Err(CompressionError::EmptyGeometry)));
    }

    #[test]
    fn test_stats_display() {
        let geometry =
            compress(&cube([0.0; 3], 1.0, PrimitiveKind::Solid), &CompressionConfig::default())
                .expect("compress");
        let stats = compression_stats(&geometry);
        assert_eq!(stats.input_vertices, 24);
        assert_eq!(stats.unique_vertices, 8);
        assert_eq!(stats.primitives, 12);
        assert_eq!(stats.edges, 12);
        assert_eq!(
            stats.to_string(),
            "Geometry: 24 -> 8 vertices, 12 primitives, 12 edges, 1 buckets"
        );
    }
}

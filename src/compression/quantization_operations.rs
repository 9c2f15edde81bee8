//! Quantization Operations - Pure DOP Functions
//!
//! RTC conversion, bounds and 16-bit quantization of positions and UVs.

use cgmath::{Matrix3, Matrix4, Point3, Vector3};

use super::compression_data::Bounds3;
use crate::constants::quantization::MAX_QUANTIZED;
use crate::math::round_to_cell;

/// Mean of all positions (3 components per vertex)
pub fn compute_centroid(positions: &[f64]) -> Point3<f64> {
    let count = positions.len() / 3;
    if count == 0 {
        return Point3::new(0.0, 0.0, 0.0);
    }
    let mut sum = [0.0f64; 3];
    for p in positions.chunks_exact(3) {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
    }
    let n = count as f64;
    Point3::new(sum[0] / n, sum[1] / n, sum[2] / n)
}

/// Snap a centroid to the RTC cell grid
pub fn rtc_origin(centroid: Point3<f64>, cell_size: f64) -> Point3<f64> {
    Point3::new(
        round_to_cell(centroid.x, cell_size),
        round_to_cell(centroid.y, cell_size),
        round_to_cell(centroid.z, cell_size),
    )
}

/// Write `positions - origin` into `out`
pub fn subtract_origin(positions: &[f64], origin: Point3<f64>, out: &mut Vec<f64>) {
    out.clear();
    out.reserve(positions.len());
    for p in positions.chunks_exact(3) {
        out.push(p[0] - origin.x);
        out.push(p[1] - origin.y);
        out.push(p[2] - origin.z);
    }
}

/// Axis-aligned bounds of a flat position array
pub fn compute_bounds(positions: &[f64]) -> Bounds3 {
    let mut min = [f64::MAX; 3];
    let mut max = [f64::MIN; 3];
    for p in positions.chunks_exact(3) {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    if positions.len() < 3 {
        return Bounds3 {
            min: [0.0; 3],
            max: [0.0; 3],
        };
    }
    Bounds3 { min, max }
}

/// `translate(min) * scale((max - min) / 65535)`
pub fn build_decode_matrix(bounds: &Bounds3) -> Matrix4<f64> {
    let scale = |axis: usize| (bounds.max[axis] - bounds.min[axis]) / MAX_QUANTIZED;
    Matrix4::from_translation(Vector3::new(bounds.min[0], bounds.min[1], bounds.min[2]))
        * Matrix4::from_nonuniform_scale(scale(0), scale(1), scale(2))
}

/// Per-axis quantization multiplier, 0 for a degenerate axis
#[inline]
fn multiplier(min: f64, max: f64) -> f64 {
    let extent = max - min;
    if extent > 0.0 {
        MAX_QUANTIZED / extent
    } else {
        0.0
    }
}

#[inline]
fn quantize_component(value: f64, min: f64, multiplier: f64) -> u16 {
    ((value - min).max(0.0) * multiplier).floor().min(MAX_QUANTIZED) as u16
}

/// Quantize positions into `out` against `bounds`
pub fn quantize_positions(positions: &[f64], bounds: &Bounds3, out: &mut Vec<u16>) {
    let multipliers = [
        multiplier(bounds.min[0], bounds.max[0]),
        multiplier(bounds.min[1], bounds.max[1]),
        multiplier(bounds.min[2], bounds.max[2]),
    ];
    if multipliers.iter().any(|m| *m == 0.0) && positions.len() >= 3 {
        log::debug!(
            "[quantization_operations::quantize_positions] Degenerate bounds {:?}..{:?}, collapsing flat axes",
            bounds.min,
            bounds.max
        );
    }
    out.clear();
    out.reserve(positions.len());
    for p in positions.chunks_exact(3) {
        for axis in 0..3 {
            out.push(quantize_component(p[axis], bounds.min[axis], multipliers[axis]));
        }
    }
}

/// Decode one quantized position back to origin-relative coordinates
pub fn decompress_position(decode_matrix: &Matrix4<f64>, quantized: &[u16; 3]) -> [f64; 3] {
    use cgmath::Transform;
    let p = decode_matrix.transform_point(Point3::new(
        quantized[0] as f64,
        quantized[1] as f64,
        quantized[2] as f64,
    ));
    [p.x, p.y, p.z]
}

/// Min/max of a flat UV array (2 components per vertex)
pub fn compute_uv_bounds(uvs: &[f64]) -> ([f64; 2], [f64; 2]) {
    if uvs.len() < 2 {
        return ([0.0; 2], [0.0; 2]);
    }
    let mut min = [f64::MAX; 2];
    let mut max = [f64::MIN; 2];
    for uv in uvs.chunks_exact(2) {
        for axis in 0..2 {
            min[axis] = min[axis].min(uv[axis]);
            max[axis] = max[axis].max(uv[axis]);
        }
    }
    (min, max)
}

/// Homogeneous 2D decode matrix for quantized UVs
pub fn build_uv_decode_matrix(min: [f64; 2], max: [f64; 2]) -> Matrix3<f64> {
    let sx = (max[0] - min[0]) / MAX_QUANTIZED;
    let sy = (max[1] - min[1]) / MAX_QUANTIZED;
    Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, min[0], min[1], 1.0)
}

/// Quantize UVs into `out`
pub fn quantize_uvs(uvs: &[f64], min: [f64; 2], max: [f64; 2], out: &mut Vec<u16>) {
    let multipliers = [multiplier(min[0], max[0]), multiplier(min[1], max[1])];
    out.clear();
    out.reserve(uvs.len());
    for uv in uvs.chunks_exact(2) {
        out.push(quantize_component(uv[0], min[0], multipliers[0]));
        out.push(quantize_component(uv[1], min[1], multipliers[1]));
    }
}

/// Decode one quantized UV
pub fn decompress_uv(uv_decode_matrix: &Matrix3<f64>, quantized: &[u16; 2]) -> [f64; 2] {
    let v = uv_decode_matrix * Vector3::new(quantized[0] as f64, quantized[1] as f64, 1.0);
    [v.x, v.y]
}

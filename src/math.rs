//! Double-precision helpers for RTC coordinates
//!
//! World coordinates stay in f64 until the last moment; only values that are
//! already relative to a nearby center are narrowed to f32 for the GPU.

use cgmath::{Matrix4, Point3, Vector3};

/// Column-major f32 matrix as uploaded to the GPU
pub type GpuMatrix = [[f32; 4]; 4];

/// Identity in GPU layout
pub const GPU_IDENTITY: GpuMatrix = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Round one coordinate to the nearest multiple of `cell_size`
#[inline]
pub fn round_to_cell(value: f64, cell_size: f64) -> f64 {
    (value / cell_size).round() * cell_size
}

/// Integer cell coordinates of a point
#[inline]
pub fn cell_of(point: Point3<f64>, cell_size: f64) -> [i64; 3] {
    [
        (point.x / cell_size).round() as i64,
        (point.y / cell_size).round() as i64,
        (point.z / cell_size).round() as i64,
    ]
}

/// Center of a cell in world coordinates
#[inline]
pub fn cell_center(cell: [i64; 3], cell_size: f64) -> Point3<f64> {
    Point3::new(
        cell[0] as f64 * cell_size,
        cell[1] as f64 * cell_size,
        cell[2] as f64 * cell_size,
    )
}

/// Narrow a double-precision matrix to the GPU layout
pub fn to_gpu_matrix(matrix: &Matrix4<f64>) -> GpuMatrix {
    let mut out = [[0.0f32; 4]; 4];
    let columns: [[f64; 4]; 4] = (*matrix).into();
    for (dst, src) in out.iter_mut().zip(columns.iter()) {
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = *s as f32;
        }
    }
    out
}

/// Express a world-space transform relative to an RTC center
///
/// `relative = translate(-center) * world`. The subtraction happens in f64 so
/// the translation column of the result stays small.
pub fn relative_to_center(world: &Matrix4<f64>, center: Point3<f64>) -> Matrix4<f64> {
    Matrix4::from_translation(Vector3::new(-center.x, -center.y, -center.z)) * world
}

/// Transform a point by an affine matrix
#[inline]
pub fn transform_point(matrix: &Matrix4<f64>, point: Point3<f64>) -> Point3<f64> {
    use cgmath::Transform;
    matrix.transform_point(point)
}

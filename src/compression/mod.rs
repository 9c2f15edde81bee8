/// Geometry Compression Module - Data-Oriented Programming (DOP) style
///
/// - compression_data.rs: geometry types and scratch space
/// - quantization_operations.rs: RTC conversion and 16-bit quantization
/// - dedup_operations.rs: vertex merging
/// - edge_operations.rs: feature-edge detection
/// - bucket_operations.rs: width-tier bucketing
/// - compression_operations.rs: the `compress` pipeline

pub mod bucket_operations;
pub mod compression_data;
pub mod compression_operations;
pub mod dedup_operations;
pub mod edge_operations;
pub mod quantization_operations;

pub use compression_data::{
    Bounds3, CompressedGeometry, CompressionScratch, CompressionStats, GeometryBucket,
    IndexTier, PrimitiveKind, RawGeometry,
};
pub use compression_operations::{compress, compress_with_scratch, compression_stats};
pub use quantization_operations::{decompress_position, decompress_uv};

pub type CompressionResult<T> = Result<T, CompressionError>;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Geometry has no vertices")]
    EmptyGeometry,

    #[error("Position array length {count} is not a multiple of 3")]
    InvalidPositionCount { count: usize },

    #[error("Geometry has {count} vertices, more than 32-bit indices can address")]
    TooManyVertices { count: usize },

    #[error("Position of vertex {index} is not finite")]
    NonFinitePosition { index: usize },

    #[error("Index count {count} is not a multiple of {vertices_per_primitive}")]
    InvalidIndexCount {
        count: usize,
        vertices_per_primitive: usize,
    },

    #[error("Index {index} out of range for {num_vertices} vertices")]
    IndexOutOfRange { index: u32, num_vertices: usize },

    #[error("UV array length mismatch: expected {expected}, found {found}")]
    UvCountMismatch { expected: usize, found: usize },

    #[error("UV array contains non-finite values")]
    NonFiniteUv,
}

//! Compression Data - Pure DOP
//!
//! NO METHODS beyond trivial lookups. Just data.
//! All transformations happen in the *_operations modules.

use cgmath::{Matrix3, Matrix4, Point3};
use rustc_hash::FxHashMap;

use crate::constants::tiers;

/// Primitive kind of a geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Points,
    Lines,
    Triangles,
    /// Closed triangle mesh
    Solid,
    /// Open triangle mesh
    Surface,
}

/// Per-kind properties: (vertices per primitive, edges generated)
const PRIMITIVE_TABLE: [(PrimitiveKind, usize, bool); 5] = [
    (PrimitiveKind::Points, 1, false),
    (PrimitiveKind::Lines, 2, false),
    (PrimitiveKind::Triangles, 3, true),
    (PrimitiveKind::Solid, 3, true),
    (PrimitiveKind::Surface, 3, true),
];

impl PrimitiveKind {
    #[inline]
    pub fn vertices_per_primitive(self) -> usize {
        PRIMITIVE_TABLE[self as usize].1
    }

    #[inline]
    pub fn generates_edges(self) -> bool {
        PRIMITIVE_TABLE[self as usize].2
    }
}

/// Index width tier a bucket is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexTier {
    Bits8 = 0,
    Bits16 = 1,
    Bits32 = 2,
}

impl IndexTier {
    pub const ALL: [IndexTier; 3] = [IndexTier::Bits8, IndexTier::Bits16, IndexTier::Bits32];

    /// Smallest tier able to address `num_vertices`
    #[inline]
    pub fn for_vertex_count(num_vertices: usize) -> Self {
        if num_vertices <= tiers::MAX_VERTICES_8_BITS {
            IndexTier::Bits8
        } else if num_vertices <= tiers::MAX_VERTICES_16_BITS {
            IndexTier::Bits16
        } else {
            IndexTier::Bits32
        }
    }

    /// Vertex ceiling of the tier, `None` for 32-bit
    #[inline]
    pub fn max_vertices(self) -> Option<usize> {
        match self {
            IndexTier::Bits8 => Some(tiers::MAX_VERTICES_8_BITS),
            IndexTier::Bits16 => Some(tiers::MAX_VERTICES_16_BITS),
            IndexTier::Bits32 => None,
        }
    }

    #[inline]
    pub fn index_bytes(self) -> usize {
        match self {
            IndexTier::Bits8 => 1,
            IndexTier::Bits16 => 2,
            IndexTier::Bits32 => 4,
        }
    }
}

/// Uncompressed geometry as handed over by a model loader
#[derive(Debug, Clone)]
pub struct RawGeometry {
    pub primitive: PrimitiveKind,
    /// 3 components per vertex
    pub positions: Vec<f64>,
    pub indices: Vec<u32>,
    /// 2 components per vertex
    pub uvs: Option<Vec<f64>>,
    /// Overrides the configured edge threshold for this geometry
    pub edge_threshold_degrees: Option<f64>,
}

/// One vertex-count-bounded partition of a compressed geometry
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBucket {
    pub positions_quantized: Vec<u16>,
    pub uvs_quantized: Option<Vec<u16>>,
    /// Bucket-local vertex indices
    pub indices: Vec<u32>,
    /// Bucket-local edge vertex pairs
    pub edge_indices: Vec<u32>,
}

impl GeometryBucket {
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions_quantized.len() / 3
    }

    #[inline]
    pub fn tier(&self) -> IndexTier {
        IndexTier::for_vertex_count(self.num_vertices())
    }
}

/// Quantized geometry ready to be appended to a layer
#[derive(Debug, Clone)]
pub struct CompressedGeometry {
    pub primitive: PrimitiveKind,
    /// RTC center subtracted from the source positions
    pub origin: Point3<f64>,
    /// Quantized position -> origin-relative position
    pub decode_matrix: Matrix4<f64>,
    /// Quantized UV -> UV
    pub uv_decode_matrix: Option<Matrix3<f64>>,
    pub buckets: Vec<GeometryBucket>,
    /// Vertex count before deduplication
    pub num_input_vertices: usize,
}

/// Origin-relative axis-aligned bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// Caller-owned scratch space reused across `compress_with_scratch` calls
#[derive(Debug, Default)]
pub struct CompressionScratch {
    pub(crate) rtc_positions: Vec<f64>,
    pub(crate) quantized: Vec<u16>,
    pub(crate) uvs_quantized: Vec<u16>,
    pub(crate) remap: Vec<u32>,
    pub(crate) unique_lookup: FxHashMap<[u16; 5], u32>,
    pub(crate) edge_faces: FxHashMap<(u32, u32), EdgeFaces>,
    pub(crate) face_normals: Vec<[f64; 3]>,
}

/// Triangles sharing one undirected edge
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgeFaces {
    pub first: u32,
    pub second: Option<u32>,
    pub count: u32,
}

/// Summary of what a compression pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    pub input_vertices: usize,
    pub unique_vertices: usize,
    pub primitives: usize,
    pub edges: usize,
    pub buckets: usize,
}

impl std::fmt::Display for CompressionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Geometry: {} -> {} vertices, {} primitives, {} edges, {} buckets",
            self.input_vertices, self.unique_vertices, self.primitives, self.edges, self.buckets
        )
    }
}

//! Layer Data - Pure DOP
//!
//! NO METHODS beyond trivial accessors. Just data.
//! All transformations happen in layer_operations.rs and
//! layer_state_operations.rs.

use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix3, Matrix4, Point3};
use rustc_hash::FxHashMap;
use static_assertions::const_assert_eq;

use super::render_pass::MeshFlags;
use crate::compression::{IndexTier, PrimitiveKind};
use crate::config::LayerConfig;
use crate::gpu::GpuBackend;
use crate::math::GpuMatrix;

/// Layer-local handle of an appended geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// Handle of a mesh inside one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

/// What a layer groups by: meshes are only batched with meshes sharing a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerKey {
    pub primitive: PrimitiveKind,
    pub texture_set: Option<u32>,
    /// RTC cell of the tile the layer was opened for
    pub origin_cell: [i64; 3],
}

/// Flat storage of one index-width tier
#[derive(Debug, Clone)]
pub struct TierArrays {
    pub tier: IndexTier,
    /// 3 components per vertex
    pub positions_quantized: Vec<u16>,
    /// 2 components per vertex, empty when no geometry in the tier has UVs
    pub uvs_quantized: Vec<u16>,
    /// Bucket-local indices, padded per bucket to the lookup granule
    pub indices: Vec<u32>,
    pub edge_indices: Vec<u32>,
    /// One part id per granule of virtual primitives
    pub primitive_owners: Vec<u32>,
    /// One part id per granule of virtual edges
    pub edge_owners: Vec<u32>,
}

impl TierArrays {
    pub fn new(tier: IndexTier) -> Self {
        Self {
            tier,
            positions_quantized: Vec::new(),
            uvs_quantized: Vec::new(),
            indices: Vec::new(),
            edge_indices: Vec::new(),
            primitive_owners: Vec::new(),
            edge_owners: Vec::new(),
        }
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions_quantized.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions_quantized.is_empty() && self.primitive_owners.is_empty()
    }
}

/// Where one bucket of a geometry landed inside its tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPlacement {
    pub tier: IndexTier,
    /// First vertex of the bucket
    pub vertex_base: u32,
    /// First index element of the bucket
    pub index_base: u32,
    pub edge_index_base: u32,
    pub num_primitives: u32,
    pub num_edges: u32,
}

/// A geometry once appended to a layer
#[derive(Debug, Clone)]
pub struct LayerGeometry {
    pub origin: Point3<f64>,
    pub decode_matrix: Matrix4<f64>,
    pub uv_decode_matrix: Option<Matrix3<f64>>,
    pub buckets: Vec<BucketPlacement>,
    /// Meshes referencing this geometry
    pub use_count: u32,
}

/// One attribute row per mesh-part
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PartAttributes {
    /// RGBA
    pub color: [u8; 4],
    pub pick_color: [u8; 4],
    /// Color, silhouette, edges, pick
    pub pass_codes: [u8; 4],
    /// Clippable, metallic, roughness, index tier
    pub material: [u8; 4],
    pub vertex_base: u32,
    pub index_base: u32,
    pub edge_index_base: u32,
    /// First virtual primitive of the part
    pub primitive_start: u32,
    /// First virtual edge of the part
    pub edge_start: u32,
    pub tile_index: u32,
    pub mesh_index: u32,
    pub _padding: u32,
}

/// Decode and instance matrices of one mesh-part
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PartMatrices {
    pub decode: GpuMatrix,
    /// Instance matrix relative to the part's tile center
    pub instance: GpuMatrix,
    /// Quantized UV -> UV, columns padded to 4 components
    pub uv_decode: [[f32; 4]; 3],
}

const_assert_eq!(std::mem::size_of::<PartAttributes>(), 48);
const_assert_eq!(std::mem::size_of::<PartMatrices>(), 176);

/// Per-mesh record kept on the CPU
#[derive(Debug, Clone)]
pub struct MeshRecord {
    pub geometry: GeometryId,
    /// Mesh-parts are contiguous rows
    pub first_part: u32,
    pub num_parts: u32,
    pub flags: MeshFlags,
    pub transparent: bool,
    /// World-space transform, kept in f64
    pub world_matrix: Matrix4<f64>,
    pub tile_center: Point3<f64>,
}

impl MeshRecord {
    #[inline]
    pub fn parts(&self) -> std::ops::Range<usize> {
        self.first_part as usize..(self.first_part + self.num_parts) as usize
    }
}

/// Everything needed to create a mesh
#[derive(Debug, Clone)]
pub struct MeshParams {
    pub geometry: GeometryId,
    /// World-space transform; identity when `None`
    pub matrix: Option<Matrix4<f64>>,
    pub color: [u8; 3],
    pub opacity: u8,
    pub metallic: u8,
    pub roughness: u8,
    pub pick_color: [u8; 4],
    pub flags: MeshFlags,
    pub tile_index: u32,
    pub tile_center: Point3<f64>,
}

impl MeshParams {
    pub fn new(geometry: GeometryId) -> Self {
        Self {
            geometry,
            matrix: None,
            color: [255, 255, 255],
            opacity: 255,
            metallic: 0,
            roughness: 255,
            pick_color: [0; 4],
            flags: MeshFlags::DEFAULT,
            tile_index: 0,
            tile_center: Point3::new(0.0, 0.0, 0.0),
        }
    }
}

/// Per-part counts of each state, kept current by every setter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerCounters {
    pub visible: u32,
    pub culled: u32,
    pub transparent: u32,
    pub xrayed: u32,
    pub highlighted: u32,
    pub selected: u32,
    pub edges: u32,
    pub pickable: u32,
    pub clippable: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerLifecycle {
    /// Accepting geometry and meshes
    Building,
    /// Structure frozen and on the GPU
    Built,
    /// A structural invariant was violated; nothing more is accepted
    Poisoned,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerUpdateMode {
    /// Every update uploads its own rows
    Immediate,
    /// Updates mark the tables dirty; one upload per table at commit
    Batching,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateState {
    pub mode: LayerUpdateMode,
    pub updates_this_frame: usize,
    pub attributes_dirty: bool,
    pub matrices_dirty: bool,
}

impl Default for UpdateState {
    fn default() -> Self {
        Self {
            mode: LayerUpdateMode::Immediate,
            updates_this_frame: 0,
            attributes_dirty: false,
            matrices_dirty: false,
        }
    }
}

/// GPU buffers of one non-empty tier
#[derive(Debug)]
pub struct TierGpuBuffers<Buf> {
    pub positions: Buf,
    pub uvs: Option<Buf>,
    pub indices: Buf,
    pub edge_indices: Buf,
    pub primitive_owners: Buf,
    pub edge_owners: Buf,
}

#[derive(Debug)]
pub struct LayerGpuBuffers<Buf> {
    pub tiers: [Option<TierGpuBuffers<Buf>>; 3],
    pub attributes: Buf,
    pub matrices: Buf,
}

/// A batch of meshes sharing primitive type, textures and RTC origin
pub struct LayerData<B: GpuBackend> {
    pub key: LayerKey,
    pub config: LayerConfig,
    pub tiers: [TierArrays; 3],
    pub geometries: FxHashMap<GeometryId, LayerGeometry>,
    pub attributes: Vec<PartAttributes>,
    pub matrices: Vec<PartMatrices>,
    pub meshes: Vec<MeshRecord>,
    pub counters: LayerCounters,
    pub update: UpdateState,
    pub lifecycle: LayerLifecycle,
    pub gpu: Option<LayerGpuBuffers<B::Buffer>>,
}

/// Snapshot of a layer's size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerStats {
    pub meshes: usize,
    pub parts: usize,
    pub geometries: usize,
    /// Vertices per tier (8, 16, 32 bit)
    pub vertices: [usize; 3],
    pub primitives: usize,
    pub edges: usize,
    pub cpu_bytes: usize,
}

impl std::fmt::Display for LayerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Layer: {} meshes ({} parts), {} geometries, vertices 8/16/32: {}/{}/{}, {} primitives, {} edges, {}B",
            self.meshes,
            self.parts,
            self.geometries,
            self.vertices[0],
            self.vertices[1],
            self.vertices[2],
            self.primitives,
            self.edges,
            self.cpu_bytes
        )
    }
}

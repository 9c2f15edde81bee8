// dtx-core - Data-Oriented Programming (DOP) Architecture
//
// Packs large BIM/CAD scenes into a handful of GPU tables:
// - compression turns double-precision geometry into quantized, deduplicated,
//   edge-annotated buckets
// - layers append those buckets into flat per-width arrays with per-part
//   attribute and matrix rows
// - tiles provide relative-to-center frames so transforms survive f32
//
// For new code, prefer:
// - *_data modules for plain data
// - *_operations modules for transformations
// - scene::scene_operations as the single entry point for model loaders

// Constants module
pub mod constants;

// Core modules
pub mod config;
pub mod error;
pub mod math;

// Geometry, packing and RTC frames
pub mod compression;
pub mod layer;
pub mod tiles;

// GPU boundary
pub mod gpu;

// Model builder
pub mod scene;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use compression::{
    compress, compress_with_scratch, CompressedGeometry, CompressionScratch, CompressionStats,
    IndexTier, PrimitiveKind, RawGeometry,
};
pub use config::{CompressionConfig, DtxConfig, LayerConfig, TileConfig};
pub use error::{DtxError, DtxResult, OptionExt};
pub use gpu::{BufferKind, GpuBackend, HeadlessBackend};
pub use layer::{LayerData, LayerKey, LayerStats, MeshFlags, MeshHandle, RenderPass};
pub use scene::{SceneMeshParams, SceneModelData};
pub use tiles::{TileHandle, TileId, TileManagerData};

#[cfg(feature = "wgpu-backend")]
pub use gpu::WgpuBackend;
#[cfg(feature = "wgpu-backend")]
pub use wgpu;

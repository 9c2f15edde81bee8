//! Tile Data - Pure DOP
//!
//! NO METHODS beyond formatting. Just data.
//! All transformations happen in tile_operations.rs

use cgmath::Point3;
use rustc_hash::FxHashMap;

use crate::config::TileConfig;
use crate::gpu::GpuBackend;
use crate::math::GpuMatrix;

/// Integer cell coordinates a tile is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId(pub [i64; 3]);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.0[0], self.0[1], self.0[2])
    }
}

/// A tile as held by a mesh: enough to release it and to find its matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileHandle {
    pub id: TileId,
    pub index: u32,
}

/// One RTC coordinate frame
#[derive(Debug, Clone)]
pub struct TileData {
    pub id: TileId,
    pub index: u32,
    pub use_count: u32,
    pub center: Point3<f64>,
    pub rtc_view_matrix: GpuMatrix,
}

/// Fixed-size pool of tiles plus the shared matrix table
pub struct TileManagerData<B: GpuBackend> {
    pub config: TileConfig,
    pub slots: Vec<Option<TileData>>,
    pub ids: FxHashMap<TileId, u32>,
    /// Where the next free-slot scan starts
    pub scan_start: usize,
    pub live: usize,
    /// One matrix per slot, mirrored on the GPU
    pub matrix_table: Vec<GpuMatrix>,
    pub gpu: Option<B::Buffer>,
}

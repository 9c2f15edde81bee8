//! Scene Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in scene_operations.rs

use cgmath::Matrix4;
use rustc_hash::FxHashMap;

use crate::compression::{CompressedGeometry, CompressionScratch};
use crate::config::DtxConfig;
use crate::gpu::GpuBackend;
use crate::layer::{GeometryId, LayerData, LayerKey, MeshFlags, MeshHandle};
use crate::tiles::TileHandle;

/// A compressed geometry waiting to be referenced by meshes
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    pub layer_id: GeometryId,
    pub compressed: CompressedGeometry,
}

/// Where a mesh ended up
#[derive(Debug, Clone)]
pub struct SceneMesh {
    pub geometry: String,
    pub layer: usize,
    pub handle: MeshHandle,
    pub tile: TileHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Building,
    Finalized,
    Destroyed,
}

impl std::fmt::Display for SceneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SceneState::Building => "building",
            SceneState::Finalized => "finalized",
            SceneState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Mesh creation request as issued by a model loader
#[derive(Debug, Clone)]
pub struct SceneMeshParams {
    pub id: String,
    pub geometry_id: String,
    pub texture_set: Option<u32>,
    pub matrix: Option<Matrix4<f64>>,
    pub color: [u8; 3],
    pub opacity: u8,
    pub metallic: u8,
    pub roughness: u8,
    pub pick_color: [u8; 4],
    pub flags: MeshFlags,
}

impl SceneMeshParams {
    pub fn new(id: impl Into<String>, geometry_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geometry_id: geometry_id.into(),
            texture_set: None,
            matrix: None,
            color: [255, 255, 255],
            opacity: 255,
            metallic: 0,
            roughness: 255,
            pick_color: [0; 4],
            flags: MeshFlags::DEFAULT,
        }
    }
}

/// One loaded model: its geometries, layers and mesh placements
pub struct SceneModelData<B: GpuBackend> {
    pub config: DtxConfig,
    pub scratch: CompressionScratch,
    pub geometries: FxHashMap<String, SceneGeometry>,
    pub next_geometry_id: u32,
    pub layers: Vec<LayerData<B>>,
    /// Layer still accepting meshes for each key
    pub open_layers: FxHashMap<LayerKey, usize>,
    pub meshes: FxHashMap<String, SceneMesh>,
    pub state: SceneState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStats {
    pub geometries: usize,
    pub meshes: usize,
    pub layers: usize,
    pub parts: usize,
    pub cpu_bytes: usize,
}

impl std::fmt::Display for SceneStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scene: {} meshes ({} parts) in {} layers, {} geometries, {}B",
            self.meshes, self.parts, self.layers, self.geometries, self.cpu_bytes
        )
    }
}

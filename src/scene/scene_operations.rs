//! Scene Operations - Pure DOP Functions
//!
//! Meshes are routed to the open layer for their (primitive, texture set,
//! RTC cell) key; a full layer is left as is and a fresh one opened for the
//! same key. Every mesh holds one tile reference until it is destroyed.

use cgmath::{Matrix4, SquareMatrix};
use rustc_hash::FxHashMap;

use super::scene_data::{
    SceneGeometry, SceneMesh, SceneMeshParams, SceneModelData, SceneState, SceneStats,
};
use crate::compression::{
    compress_with_scratch, compression_stats, CompressionScratch, CompressionStats, RawGeometry,
};
use crate::config::DtxConfig;
use crate::error::{DtxError, DtxResult, OptionExt};
use crate::gpu::GpuBackend;
use crate::layer::{
    self, GeometryId, LayerData, LayerKey, LayerResult, MeshFlags, MeshHandle, MeshParams,
};
use crate::math::transform_point;
use crate::tiles::{self, TileManagerData};

pub fn create_scene_model<B: GpuBackend>(config: DtxConfig) -> DtxResult<SceneModelData<B>> {
    config.validate()?;
    Ok(SceneModelData {
        config,
        scratch: CompressionScratch::default(),
        geometries: FxHashMap::default(),
        next_geometry_id: 0,
        layers: Vec::new(),
        open_layers: FxHashMap::default(),
        meshes: FxHashMap::default(),
        state: SceneState::Building,
    })
}

fn ensure_state<B: GpuBackend>(scene: &SceneModelData<B>, expected: SceneState) -> DtxResult<()> {
    if scene.state != expected {
        return Err(DtxError::StateError {
            expected: expected.to_string(),
            actual: scene.state.to_string(),
        });
    }
    Ok(())
}

fn ensure_live<B: GpuBackend>(scene: &SceneModelData<B>) -> DtxResult<()> {
    if scene.state == SceneState::Destroyed {
        return Err(DtxError::StateError {
            expected: "building or finalized".to_string(),
            actual: scene.state.to_string(),
        });
    }
    Ok(())
}

/// Compress and register a geometry under `id`
pub fn create_geometry<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    id: &str,
    raw: &RawGeometry,
) -> DtxResult<CompressionStats> {
    ensure_state(scene, SceneState::Building)?;
    if scene.geometries.contains_key(id) {
        return Err(DtxError::DuplicateGeometry { id: id.to_string() });
    }

    let compressed = compress_with_scratch(raw, &scene.config.compression, &mut scene.scratch)?;
    let stats = compression_stats(&compressed);
    log::debug!("[scene_operations::create_geometry] {}: {}", id, stats);

    let layer_id = GeometryId(scene.next_geometry_id);
    scene.next_geometry_id += 1;
    scene.geometries.insert(
        id.to_string(),
        SceneGeometry {
            layer_id,
            compressed,
        },
    );
    Ok(stats)
}

/// Append the geometry if needed, then the mesh
fn place_mesh<B: GpuBackend>(
    target: &mut LayerData<B>,
    geometry: &SceneGeometry,
    params: &MeshParams,
) -> LayerResult<MeshHandle> {
    if !layer::has_geometry(target, geometry.layer_id) {
        layer::create_layer_geometry(target, geometry.layer_id, &geometry.compressed)?;
    }
    layer::create_layer_mesh(target, params)
}

/// Place a mesh of a registered geometry
pub fn create_scene_mesh<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    tile_manager: &mut TileManagerData<B>,
    params: &SceneMeshParams,
) -> DtxResult<()> {
    ensure_state(scene, SceneState::Building)?;
    if scene.meshes.contains_key(&params.id) {
        return Err(DtxError::DuplicateMesh {
            id: params.id.clone(),
        });
    }
    let geometry = scene
        .geometries
        .get(&params.geometry_id)
        .ok_or_dtx(|| DtxError::GeometryNotFound {
            id: params.geometry_id.clone(),
        })?;

    let world = params.matrix.unwrap_or_else(Matrix4::identity);
    let center = transform_point(&world, geometry.compressed.origin);
    let tile = tiles::get_tile(tile_manager, center)?;
    let tile_center = tiles::tile(tile_manager, tile)?.center;

    let key = LayerKey {
        primitive: geometry.compressed.primitive,
        texture_set: params.texture_set,
        origin_cell: tile.id.0,
    };
    let mesh_params = MeshParams {
        geometry: geometry.layer_id,
        matrix: Some(world),
        color: params.color,
        opacity: params.opacity,
        metallic: params.metallic,
        roughness: params.roughness,
        pick_color: params.pick_color,
        flags: params.flags,
        tile_index: tile.index,
        tile_center,
    };

    let open = scene.open_layers.get(&key).copied();
    let accepting = open.filter(|&index| {
        layer::can_accept_mesh(&scene.layers[index], geometry.layer_id, &geometry.compressed)
    });
    let placed = match accepting {
        Some(index) => place_mesh(&mut scene.layers[index], geometry, &mesh_params)
            .map(|handle| (index, handle)),
        None => {
            if let Some(full) = open {
                log::debug!(
                    "[scene_operations::create_scene_mesh] Layer {} full, opening another for {:?}",
                    full,
                    key
                );
            }
            // A layer is only kept once it holds a mesh
            let mut fresh = layer::create_layer(key, scene.config.layer.clone());
            place_mesh(&mut fresh, geometry, &mesh_params).map(|handle| {
                let index = scene.layers.len();
                scene.layers.push(fresh);
                scene.open_layers.insert(key, index);
                (index, handle)
            })
        }
    };

    let (index, handle) = match placed {
        Ok(placement) => placement,
        Err(error) => {
            tiles::put_tile(tile_manager, tile)?;
            return Err(error.into());
        }
    };

    scene.meshes.insert(
        params.id.clone(),
        SceneMesh {
            geometry: params.geometry_id.clone(),
            layer: index,
            handle,
            tile,
        },
    );
    Ok(())
}

/// Build every layer; no geometry or mesh can be added afterwards
pub fn finalize<B: GpuBackend>(scene: &mut SceneModelData<B>, backend: &B) -> DtxResult<()> {
    ensure_state(scene, SceneState::Building)?;
    for target in &mut scene.layers {
        layer::build_layer(target, backend)?;
    }
    scene.open_layers.clear();
    scene.state = SceneState::Finalized;
    log::info!("[scene_operations::finalize] {}", scene_stats(scene));
    Ok(())
}

fn scene_mesh<B: GpuBackend>(scene: &SceneModelData<B>, id: &str) -> DtxResult<SceneMesh> {
    ensure_live(scene)?;
    scene
        .meshes
        .get(id)
        .cloned()
        .ok_or_dtx(|| DtxError::MeshNotFound { id: id.to_string() })
}

/// Replace a mesh's flags; transparency keeps following its opacity
pub fn set_mesh_flags<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    backend: &B,
    id: &str,
    flags: MeshFlags,
) -> DtxResult<()> {
    let mesh = scene_mesh(scene, id)?;
    let target = &mut scene.layers[mesh.layer];
    let transparent = layer::is_mesh_transparent(target, mesh.handle)?;
    layer::set_mesh_flags(target, backend, mesh.handle, flags, transparent)?;
    Ok(())
}

pub fn set_mesh_color<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    backend: &B,
    id: &str,
    color: [u8; 4],
) -> DtxResult<()> {
    let mesh = scene_mesh(scene, id)?;
    layer::set_mesh_color(&mut scene.layers[mesh.layer], backend, mesh.handle, color)?;
    Ok(())
}

pub fn set_mesh_pick_color<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    backend: &B,
    id: &str,
    pick_color: [u8; 4],
) -> DtxResult<()> {
    let mesh = scene_mesh(scene, id)?;
    layer::set_mesh_pick_color(&mut scene.layers[mesh.layer], backend, mesh.handle, pick_color)?;
    Ok(())
}

/// Move a mesh, migrating it to another tile when its center changes cell
pub fn set_mesh_matrix<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    tile_manager: &mut TileManagerData<B>,
    backend: &B,
    id: &str,
    world: &Matrix4<f64>,
) -> DtxResult<()> {
    let mesh = scene_mesh(scene, id)?;
    let origin = scene
        .geometries
        .get(&mesh.geometry)
        .map(|g| g.compressed.origin)
        .ok_or_dtx(|| DtxError::GeometryNotFound {
            id: mesh.geometry.clone(),
        })?;

    let tile = tiles::update_tile_center(tile_manager, mesh.tile, transform_point(world, origin))?;
    let tile_center = tiles::tile(tile_manager, tile)?.center;
    if tile != mesh.tile {
        log::debug!(
            "[scene_operations::set_mesh_matrix] Mesh {} moved from tile {} to {}",
            id,
            mesh.tile.id,
            tile.id
        );
        if let Some(record) = scene.meshes.get_mut(id) {
            record.tile = tile;
        }
    }

    layer::set_mesh_matrix(
        &mut scene.layers[mesh.layer],
        backend,
        mesh.handle,
        world,
        tile.index,
        tile_center,
    )?;
    Ok(())
}

/// Start a frame on every layer
pub fn begin_frame<B: GpuBackend>(scene: &mut SceneModelData<B>, backend: &B) {
    for target in &mut scene.layers {
        layer::begin_frame(target, backend);
    }
}

/// Flush whatever the frame batched
pub fn end_frame<B: GpuBackend>(scene: &mut SceneModelData<B>, backend: &B) {
    for target in &mut scene.layers {
        layer::commit_deferred(target, backend);
    }
}

/// Refresh tile view matrices after a camera change
pub fn on_camera_changed<B: GpuBackend>(
    tile_manager: &mut TileManagerData<B>,
    backend: &B,
    view: &Matrix4<f64>,
) {
    tiles::refresh_matrices(tile_manager, backend, view);
}

/// Release every tile reference and layer resource the model holds
pub fn destroy_scene_model<B: GpuBackend>(
    scene: &mut SceneModelData<B>,
    tile_manager: &mut TileManagerData<B>,
) -> DtxResult<()> {
    if scene.state == SceneState::Destroyed {
        return Ok(());
    }
    // Every reference is returned even if one of them is rejected
    let mut first_error = None;
    for (id, mesh) in scene.meshes.drain() {
        if let Err(error) = tiles::put_tile(tile_manager, mesh.tile) {
            log::error!(
                "[scene_operations::destroy_scene_model] Mesh {} could not release tile {}: {}",
                id,
                mesh.tile.id,
                error
            );
            first_error.get_or_insert(error);
        }
    }
    for target in &mut scene.layers {
        layer::destroy_layer(target);
    }
    scene.layers.clear();
    scene.open_layers.clear();
    scene.geometries.clear();
    scene.state = SceneState::Destroyed;
    log::info!("[scene_operations::destroy_scene_model] Scene model destroyed");

    match first_error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

pub fn scene_stats<B: GpuBackend>(scene: &SceneModelData<B>) -> SceneStats {
    let layer_stats: Vec<_> = scene.layers.iter().map(layer::layer_stats).collect();
    SceneStats {
        geometries: scene.geometries.len(),
        meshes: scene.meshes.len(),
        layers: scene.layers.len(),
        parts: layer_stats.iter().map(|s| s.parts).sum(),
        cpu_bytes: layer_stats.iter().map(|s| s.cpu_bytes).sum(),
    }
}

//! Tile Operations - Pure DOP Functions
//!
//! All pool mutation goes through get/put/update; none of it is reentrant.

use cgmath::{Matrix4, Point3, Vector3};
use rustc_hash::FxHashMap;

use super::tile_data::{TileData, TileHandle, TileId, TileManagerData};
use super::{TileError, TileResult};
use crate::config::TileConfig;
use crate::gpu::{BufferKind, GpuBackend};
use crate::math::{cell_center, cell_of, to_gpu_matrix, GpuMatrix, GPU_IDENTITY};

pub fn create_tile_manager<B: GpuBackend>(config: TileConfig) -> TileManagerData<B> {
    let capacity = config.capacity;
    log::debug!(
        "[tile_operations::create_tile_manager] Pool of {} tiles, cell size {}",
        capacity,
        config.cell_size
    );
    TileManagerData {
        config,
        slots: vec![None; capacity],
        ids: FxHashMap::default(),
        scan_start: 0,
        live: 0,
        matrix_table: vec![GPU_IDENTITY; capacity],
        gpu: None,
    }
}

/// Cell a world position falls into
pub fn tile_id_for<B: GpuBackend>(manager: &TileManagerData<B>, world_center: Point3<f64>) -> TileId {
    TileId(cell_of(world_center, manager.config.cell_size))
}

/// Live tile behind a handle
pub fn tile<B: GpuBackend>(manager: &TileManagerData<B>, handle: TileHandle) -> TileResult<&TileData> {
    manager
        .slots
        .get(handle.index as usize)
        .and_then(|slot| slot.as_ref())
        .filter(|t| t.id == handle.id)
        .ok_or(TileError::UnknownTile {
            id: handle.id,
            index: handle.index,
        })
}

/// Circular scan for a free slot starting at the last freed one
fn find_free_slot<B: GpuBackend>(manager: &TileManagerData<B>) -> Option<usize> {
    let capacity = manager.slots.len();
    (0..capacity)
        .map(|offset| (manager.scan_start + offset) % capacity)
        .find(|&index| manager.slots[index].is_none())
}

/// Acquire the tile for the cell containing `world_center`
pub fn get_tile<B: GpuBackend>(
    manager: &mut TileManagerData<B>,
    world_center: Point3<f64>,
) -> TileResult<TileHandle> {
    if !(world_center.x.is_finite() && world_center.y.is_finite() && world_center.z.is_finite()) {
        return Err(TileError::NonFiniteCenter);
    }
    let id = tile_id_for(manager, world_center);

    if let Some(&index) = manager.ids.get(&id) {
        if let Some(tile) = manager.slots[index as usize].as_mut() {
            tile.use_count += 1;
            return Ok(TileHandle { id, index });
        }
    }

    let index = find_free_slot(manager).ok_or_else(|| {
        log::error!(
            "[tile_operations::get_tile] No free tile for cell {}, {} tiles live",
            id,
            manager.live
        );
        TileError::PoolExhausted {
            capacity: manager.slots.len(),
        }
    })?;

    manager.slots[index] = Some(TileData {
        id,
        index: index as u32,
        use_count: 1,
        center: cell_center(id.0, manager.config.cell_size),
        rtc_view_matrix: GPU_IDENTITY,
    });
    manager.ids.insert(id, index as u32);
    manager.scan_start = (index + 1) % manager.slots.len();
    manager.live += 1;
    Ok(TileHandle {
        id,
        index: index as u32,
    })
}

/// Release one reference; the slot goes back to the pool at zero
pub fn put_tile<B: GpuBackend>(manager: &mut TileManagerData<B>, handle: TileHandle) -> TileResult<()> {
    let unknown = TileError::UnknownTile {
        id: handle.id,
        index: handle.index,
    };
    let index = handle.index as usize;
    let Some(Some(tile)) = manager.slots.get_mut(index).map(Option::as_mut) else {
        return Err(unknown);
    };
    if tile.id != handle.id {
        return Err(unknown);
    }

    tile.use_count -= 1;
    if tile.use_count == 0 {
        manager.slots[index] = None;
        manager.ids.remove(&handle.id);
        manager.matrix_table[index] = GPU_IDENTITY;
        manager.scan_start = index;
        manager.live -= 1;
    }
    Ok(())
}

/// Move a reference to the tile of `new_center`, releasing the old one first
/// when the cell changes
pub fn update_tile_center<B: GpuBackend>(
    manager: &mut TileManagerData<B>,
    handle: TileHandle,
    new_center: Point3<f64>,
) -> TileResult<TileHandle> {
    if tile_id_for(manager, new_center) == handle.id {
        tile(manager, handle)?;
        return Ok(handle);
    }
    put_tile(manager, handle)?;
    get_tile(manager, new_center)
}

/// Recompute every live tile's view matrix and upload the table in one write
pub fn refresh_matrices<B: GpuBackend>(
    manager: &mut TileManagerData<B>,
    backend: &B,
    view: &Matrix4<f64>,
) {
    for tile in manager.slots.iter_mut().flatten() {
        let c = tile.center;
        let rtc_view = view * Matrix4::from_translation(Vector3::new(c.x, c.y, c.z));
        tile.rtc_view_matrix = to_gpu_matrix(&rtc_view);
        manager.matrix_table[tile.index as usize] = tile.rtc_view_matrix;
    }

    let bytes: &[u8] = bytemuck::cast_slice::<GpuMatrix, u8>(&manager.matrix_table);
    if let Some(buffer) = &manager.gpu {
        backend.write_buffer(buffer, 0, bytes);
        return;
    }
    let buffer = backend.create_buffer("tile_rtc_view_matrices", BufferKind::TileMatrices, bytes);
    manager.gpu = Some(buffer);
}

/// Drop every tile and the GPU table
pub fn destroy_tile_manager<B: GpuBackend>(manager: &mut TileManagerData<B>) {
    log::debug!(
        "[tile_operations::destroy_tile_manager] Releasing {} live tiles",
        manager.live
    );
    manager.slots.iter_mut().for_each(|slot| *slot = None);
    manager.ids.clear();
    manager.matrix_table.fill(GPU_IDENTITY);
    manager.scan_start = 0;
    manager.live = 0;
    manager.gpu = None;
}

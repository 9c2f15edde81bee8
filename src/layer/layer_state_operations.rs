//! Layer State Operations - Pure DOP Functions
//!
//! Per-mesh updates (flags, color, transform) and the frame protocol that
//! decides between uploading a row right away and batching a whole table.
//! Before build only the CPU mirror changes; build uploads it in one go.

use std::ops::Range;

use cgmath::{Matrix4, Point3};

use super::layer_data::{
    LayerData, LayerLifecycle, LayerUpdateMode, MeshHandle, MeshRecord, PartAttributes,
    PartMatrices,
};
use super::layer_operations::{adjust_counters, instance_matrix};
use super::render_pass::{derive_pass_codes, MeshFlags};
use super::{LayerError, LayerResult};
use crate::gpu::GpuBackend;
use crate::math::to_gpu_matrix;

const ATTRIBUTE_ROW_BYTES: usize = std::mem::size_of::<PartAttributes>();
const MATRIX_ROW_BYTES: usize = std::mem::size_of::<PartMatrices>();

fn ensure_usable<B: GpuBackend>(layer: &LayerData<B>) -> LayerResult<()> {
    match layer.lifecycle {
        LayerLifecycle::Building | LayerLifecycle::Built => Ok(()),
        LayerLifecycle::Poisoned => Err(LayerError::Poisoned),
        LayerLifecycle::Destroyed => Err(LayerError::Destroyed),
    }
}

fn mesh_record<B: GpuBackend>(layer: &LayerData<B>, handle: MeshHandle) -> LayerResult<MeshRecord> {
    ensure_usable(layer)?;
    layer
        .meshes
        .get(handle.0 as usize)
        .cloned()
        .ok_or(LayerError::MeshNotFound { handle: handle.0 })
}

/// Count one update and report whether it should be uploaded right away
fn record_update<B: GpuBackend>(layer: &mut LayerData<B>) -> bool {
    if layer.lifecycle != LayerLifecycle::Built {
        return false;
    }
    let update = &mut layer.update;
    update.updates_this_frame += 1;
    if update.mode == LayerUpdateMode::Immediate
        && update.updates_this_frame > layer.config.batch_update_threshold
    {
        log::debug!(
            "[layer_state_operations::record_update] {} updates this frame, batching uploads",
            update.updates_this_frame
        );
        update.mode = LayerUpdateMode::Batching;
    }
    update.mode == LayerUpdateMode::Immediate
}

fn upload_attribute_rows<B: GpuBackend>(layer: &LayerData<B>, backend: &B, parts: Range<usize>) {
    if let Some(gpu) = &layer.gpu {
        let offset = (parts.start * ATTRIBUTE_ROW_BYTES) as u64;
        backend.write_buffer(
            &gpu.attributes,
            offset,
            bytemuck::cast_slice(&layer.attributes[parts]),
        );
    }
}

fn upload_matrix_rows<B: GpuBackend>(layer: &LayerData<B>, backend: &B, parts: Range<usize>) {
    if let Some(gpu) = &layer.gpu {
        let offset = (parts.start * MATRIX_ROW_BYTES) as u64;
        backend.write_buffer(
            &gpu.matrices,
            offset,
            bytemuck::cast_slice(&layer.matrices[parts]),
        );
    }
}

/// Push changed rows now or mark the tables for the next commit
fn publish<B: GpuBackend>(
    layer: &mut LayerData<B>,
    backend: &B,
    parts: Range<usize>,
    attributes: bool,
    matrices: bool,
) {
    if layer.lifecycle != LayerLifecycle::Built {
        return;
    }
    if record_update(layer) {
        if attributes {
            upload_attribute_rows(layer, backend, parts.clone());
        }
        if matrices {
            upload_matrix_rows(layer, backend, parts);
        }
    } else {
        layer.update.attributes_dirty |= attributes;
        layer.update.matrices_dirty |= matrices;
    }
}

/// Whether a mesh draws in the transparent color and edge passes
pub fn is_mesh_transparent<B: GpuBackend>(
    layer: &LayerData<B>,
    handle: MeshHandle,
) -> LayerResult<bool> {
    Ok(mesh_record(layer, handle)?.transparent)
}

/// Replace a mesh's flags and transparency, re-deriving its pass codes
pub fn set_mesh_flags<B: GpuBackend>(
    layer: &mut LayerData<B>,
    backend: &B,
    handle: MeshHandle,
    flags: MeshFlags,
    transparent: bool,
) -> LayerResult<()> {
    let record = mesh_record(layer, handle)?;
    adjust_counters(&mut layer.counters, record.flags, record.transparent, record.num_parts, false);
    adjust_counters(&mut layer.counters, flags, transparent, record.num_parts, true);

    let pass_codes = derive_pass_codes(flags, transparent).packed();
    let clippable = flags.contains(MeshFlags::CLIPPABLE) as u8;
    for row in &mut layer.attributes[record.parts()] {
        row.pass_codes = pass_codes;
        row.material[0] = clippable;
    }
    let mesh = &mut layer.meshes[handle.0 as usize];
    mesh.flags = flags;
    mesh.transparent = transparent;

    publish(layer, backend, record.parts(), true, false);
    Ok(())
}

/// Set RGBA color; opacity below 255 makes the mesh transparent
pub fn set_mesh_color<B: GpuBackend>(
    layer: &mut LayerData<B>,
    backend: &B,
    handle: MeshHandle,
    color: [u8; 4],
) -> LayerResult<()> {
    let record = mesh_record(layer, handle)?;
    let transparent = color[3] < 255;
    if transparent != record.transparent {
        adjust_counters(&mut layer.counters, record.flags, record.transparent, record.num_parts, false);
        adjust_counters(&mut layer.counters, record.flags, transparent, record.num_parts, true);
        layer.meshes[handle.0 as usize].transparent = transparent;
    }

    let pass_codes = derive_pass_codes(record.flags, transparent).packed();
    for row in &mut layer.attributes[record.parts()] {
        row.color = color;
        row.pass_codes = pass_codes;
    }

    publish(layer, backend, record.parts(), true, false);
    Ok(())
}

pub fn set_mesh_pick_color<B: GpuBackend>(
    layer: &mut LayerData<B>,
    backend: &B,
    handle: MeshHandle,
    pick_color: [u8; 4],
) -> LayerResult<()> {
    let record = mesh_record(layer, handle)?;
    for row in &mut layer.attributes[record.parts()] {
        row.pick_color = pick_color;
    }
    publish(layer, backend, record.parts(), true, false);
    Ok(())
}

/// Move a mesh: new world transform, possibly a new RTC tile
pub fn set_mesh_matrix<B: GpuBackend>(
    layer: &mut LayerData<B>,
    backend: &B,
    handle: MeshHandle,
    world: &Matrix4<f64>,
    tile_index: u32,
    tile_center: Point3<f64>,
) -> LayerResult<()> {
    let record = mesh_record(layer, handle)?;
    let origin = layer
        .geometries
        .get(&record.geometry)
        .map(|g| g.origin)
        .ok_or(LayerError::GeometryNotFound {
            id: record.geometry.0,
        })?;

    let instance = to_gpu_matrix(&instance_matrix(world, origin, tile_center));
    for row in &mut layer.matrices[record.parts()] {
        row.instance = instance;
    }
    let tile_changed = layer.attributes[record.parts()]
        .iter()
        .any(|row| row.tile_index != tile_index);
    for row in &mut layer.attributes[record.parts()] {
        row.tile_index = tile_index;
    }
    let mesh = &mut layer.meshes[handle.0 as usize];
    mesh.world_matrix = *world;
    mesh.tile_center = tile_center;

    publish(layer, backend, record.parts(), tile_changed, true);
    Ok(())
}

/// Upload whatever batching left pending, one write per dirty table
///
/// Returns true if anything was uploaded.
pub fn commit_deferred<B: GpuBackend>(layer: &mut LayerData<B>, backend: &B) -> bool {
    if layer.lifecycle != LayerLifecycle::Built {
        return false;
    }
    let Some(gpu) = &layer.gpu else {
        return false;
    };
    let mut uploaded = false;
    if layer.update.attributes_dirty {
        backend.write_buffer(&gpu.attributes, 0, bytemuck::cast_slice(&layer.attributes));
        uploaded = true;
    }
    if layer.update.matrices_dirty {
        backend.write_buffer(&gpu.matrices, 0, bytemuck::cast_slice(&layer.matrices));
        uploaded = true;
    }
    layer.update.attributes_dirty = false;
    layer.update.matrices_dirty = false;
    uploaded
}

/// Start a frame: flush anything still pending and go back to immediate uploads
pub fn begin_frame<B: GpuBackend>(layer: &mut LayerData<B>, backend: &B) {
    commit_deferred(layer, backend);
    layer.update.updates_this_frame = 0;
    layer.update.mode = LayerUpdateMode::Immediate;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{compress, CompressedGeometry, PrimitiveKind};
    use crate::config::{CompressionConfig, LayerConfig};
    use crate::gpu::{BufferKind, HeadlessBackend, UploadRecord};
    use crate::layer::layer_data::{GeometryId, LayerKey, MeshParams};
    use crate::layer::layer_operations::{
        build_layer, create_layer, create_layer_geometry, create_layer_mesh, destroy_layer,
    };
    use crate::layer::render_pass::RenderPass;
    use crate::test_fixtures::cube;
    use cgmath::Vector3;

    fn attribute_rows(
        backend: &HeadlessBackend,
        gpu: &crate::layer::layer_data::LayerGpuBuffers<crate::gpu::HeadlessBuffer>,
    ) -> Vec<PartAttributes> {
        backend
            .contents(&gpu.attributes)
            .chunks_exact(ATTRIBUTE_ROW_BYTES)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn cube_geometry() -> CompressedGeometry {
        compress(
            &cube([0.0, 0.0, 0.0], 1.0, PrimitiveKind::Solid),
            &CompressionConfig::default(),
        )
        .unwrap()
    }

    fn layer_with_meshes(count: usize) -> LayerData<HeadlessBackend> {
        let key = LayerKey {
            primitive: PrimitiveKind::Solid,
            texture_set: None,
            origin_cell: [0, 0, 0],
        };
        let mut layer = create_layer(key, LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(0), &cube_geometry()).unwrap();
        for _ in 0..count {
            create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(0))).unwrap();
        }
        layer
    }

    fn built_layer(count: usize, backend: &HeadlessBackend) -> LayerData<HeadlessBackend> {
        let mut layer = layer_with_meshes(count);
        build_layer(&mut layer, backend).unwrap();
        backend.clear_records();
        layer
    }

    #[test]
    fn test_write_through_uploads_single_row() {
        let backend = HeadlessBackend::new();
        let mut layer = built_layer(3, &backend);

        let flags = MeshFlags::DEFAULT | MeshFlags::SELECTED;
        set_mesh_flags(&mut layer, &backend, MeshHandle(1), flags, false).unwrap();

        assert_eq!(backend.writes_to(BufferKind::Attributes), vec![(48, 48)]);
        assert!(backend.writes_to(BufferKind::Matrices).is_empty());
        assert!(!commit_deferred(&mut layer, &backend));
    }

    #[test]
    fn test_batching_after_threshold() {
        let backend = HeadlessBackend::new();
        let mut layer = built_layer(20, &backend);
        begin_frame(&mut layer, &backend);

        for i in 0..15 {
            set_mesh_color(&mut layer, &backend, MeshHandle(i), [1, 2, 3, 255]).unwrap();
        }
        // The first ten went straight through, the rest wait for the commit
        assert_eq!(backend.writes_to(BufferKind::Attributes).len(), 10);
        assert_eq!(layer.update.mode, LayerUpdateMode::Batching);

        assert!(commit_deferred(&mut layer, &backend));
        let writes = backend.writes_to(BufferKind::Attributes);
        assert_eq!(writes.len(), 11);
        assert_eq!(writes[10], (0, 20 * 48));

        begin_frame(&mut layer, &backend);
        assert_eq!(layer.update.mode, LayerUpdateMode::Immediate);
        assert_eq!(layer.update.updates_this_frame, 0);
    }

    #[test]
    fn test_begin_frame_flushes_pending() {
        let backend = HeadlessBackend::new();
        let mut layer = built_layer(12, &backend);
        for i in 0..12 {
            set_mesh_pick_color(&mut layer, &backend, MeshHandle(i), [i as u8, 0, 0, 255]).unwrap();
        }
        backend.clear_records();
        begin_frame(&mut layer, &backend);
        assert_eq!(backend.writes_to(BufferKind::Attributes), vec![(0, 12 * 48)]);

        let gpu = layer.gpu.as_ref().unwrap();
        let rows = attribute_rows(&backend, gpu);
        assert_eq!(rows[11].pick_color, [11, 0, 0, 255]);
    }

    #[test]
    fn test_updates_before_build_stay_on_cpu() {
        let backend = HeadlessBackend::new();
        let mut layer = layer_with_meshes(2);
        set_mesh_color(&mut layer, &backend, MeshHandle(1), [9, 9, 9, 255]).unwrap();
        assert!(backend.records().is_empty());
        assert_eq!(layer.update.updates_this_frame, 0);

        build_layer(&mut layer, &backend).unwrap();
        let gpu = layer.gpu.as_ref().unwrap();
        let rows = attribute_rows(&backend, gpu);
        assert_eq!(rows[1].color, [9, 9, 9, 255]);
        assert!(backend
            .records()
            .iter()
            .all(|r| matches!(r, UploadRecord::Create { .. })));
    }

    #[test]
    fn test_counters_follow_flags() {
        let backend = HeadlessBackend::new();
        let mut layer = layer_with_meshes(3);
        assert_eq!(layer.counters.visible, 3);
        assert_eq!(layer.counters.pickable, 3);

        let hidden = MeshFlags::DEFAULT.without(MeshFlags::VISIBLE) | MeshFlags::XRAYED;
        set_mesh_flags(&mut layer, &backend, MeshHandle(0), hidden, false).unwrap();
        assert_eq!(layer.counters.visible, 2);
        assert_eq!(layer.counters.xrayed, 1);

        set_mesh_flags(&mut layer, &backend, MeshHandle(0), MeshFlags::DEFAULT, false).unwrap();
        assert_eq!(layer.counters.visible, 3);
        assert_eq!(layer.counters.xrayed, 0);
        assert_eq!(layer.attributes[0].pass_codes, [1, 0, 0, 11]);
    }

    #[test]
    fn test_opacity_toggles_transparency() {
        let backend = HeadlessBackend::new();
        let mut layer = built_layer(1, &backend);
        set_mesh_color(&mut layer, &backend, MeshHandle(0), [255, 0, 0, 128]).unwrap();
        assert_eq!(layer.counters.transparent, 1);
        assert_eq!(layer.attributes[0].pass_codes[0], RenderPass::ColorTransparent as u8);

        set_mesh_color(&mut layer, &backend, MeshHandle(0), [255, 0, 0, 255]).unwrap();
        assert_eq!(layer.counters.transparent, 0);
        assert_eq!(layer.attributes[0].pass_codes[0], RenderPass::ColorOpaque as u8);
    }

    #[test]
    fn test_set_matrix_moves_tile() {
        let backend = HeadlessBackend::new();
        let mut layer = built_layer(2, &backend);
        let center = Point3::new(1_000_000.0, 0.0, 0.0);
        let world = Matrix4::from_translation(Vector3::new(1_000_050.0, 0.0, 0.0));
        set_mesh_matrix(&mut layer, &backend, MeshHandle(1), &world, 4, center).unwrap();

        assert_eq!(layer.attributes[1].tile_index, 4);
        assert_eq!(layer.matrices[1].instance[3][0], 50.0);
        assert_eq!(backend.writes_to(BufferKind::Matrices), vec![(176, 176)]);
        assert_eq!(backend.writes_to(BufferKind::Attributes), vec![(48, 48)]);

        // Same tile: only the matrix row goes up
        backend.clear_records();
        set_mesh_matrix(&mut layer, &backend, MeshHandle(1), &world, 4, center).unwrap();
        assert!(backend.writes_to(BufferKind::Attributes).is_empty());
        assert_eq!(backend.writes_to(BufferKind::Matrices).len(), 1);
    }

    #[test]
    fn test_unknown_mesh() {
        let backend = HeadlessBackend::new();
        let mut layer = layer_with_meshes(1);
        let result = set_mesh_flags(&mut layer, &backend, MeshHandle(5), MeshFlags::NONE, false);
        assert!(matches!(result, Err(LayerError::MeshNotFound { handle: 5 })));
    }

    #[test]
    fn test_destroyed_layer_rejects_updates() {
        let backend = HeadlessBackend::new();
        let mut layer = built_layer(1, &backend);
        destroy_layer(&mut layer);
        let result = set_mesh_color(&mut layer, &backend, MeshHandle(0), [0; 4]);
        assert!(matches!(result, Err(LayerError::Destroyed)));
        assert!(!commit_deferred(&mut layer, &backend));
    }
}

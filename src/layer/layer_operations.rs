//! Layer Operations - Pure DOP Functions
//!
//! Appending geometry and meshes, freezing the structure onto the GPU, and
//! tearing it down again. Per-mesh state changes live in
//! layer_state_operations.rs.

use cgmath::{Matrix3, Matrix4, Point3, SquareMatrix, Vector3};
use rustc_hash::FxHashMap;

use super::layer_data::{
    BucketPlacement, GeometryId, LayerCounters, LayerData, LayerGeometry, LayerGpuBuffers,
    LayerKey, LayerLifecycle, LayerStats, MeshHandle, MeshParams, MeshRecord, PartAttributes,
    PartMatrices, TierArrays, TierGpuBuffers, UpdateState,
};
use super::render_pass::{derive_pass_codes, MeshFlags};
use super::{LayerError, LayerResult};
use crate::compression::{CompressedGeometry, IndexTier};
use crate::config::LayerConfig;
use crate::constants::layer::LOOKUP_GRANULE;
use crate::gpu::{BufferKind, GpuBackend};
use crate::math::{relative_to_center, to_gpu_matrix};

/// Create an empty layer
pub fn create_layer<B: GpuBackend>(key: LayerKey, config: LayerConfig) -> LayerData<B> {
    log::debug!(
        "[layer_operations::create_layer] Opening {:?} layer at cell {:?}",
        key.primitive,
        key.origin_cell
    );
    LayerData {
        key,
        config,
        tiers: IndexTier::ALL.map(TierArrays::new),
        geometries: FxHashMap::default(),
        attributes: Vec::new(),
        matrices: Vec::new(),
        meshes: Vec::new(),
        counters: LayerCounters::default(),
        update: UpdateState::default(),
        lifecycle: LayerLifecycle::Building,
        gpu: None,
    }
}

#[inline]
fn padded(count: usize) -> usize {
    count.div_ceil(LOOKUP_GRANULE) * LOOKUP_GRANULE
}

/// Structural operations are only legal while building; trying one later
/// leaves the layer unusable
fn ensure_building<B: GpuBackend>(
    layer: &mut LayerData<B>,
    operation: &'static str,
) -> LayerResult<()> {
    match layer.lifecycle {
        LayerLifecycle::Building => Ok(()),
        LayerLifecycle::Built => {
            log::error!(
                "[layer_operations::ensure_building] Attempt to {} after build, layer poisoned",
                operation
            );
            layer.lifecycle = LayerLifecycle::Poisoned;
            Err(LayerError::StructureFrozen { operation })
        }
        LayerLifecycle::Poisoned => Err(LayerError::Poisoned),
        LayerLifecycle::Destroyed => Err(LayerError::Destroyed),
    }
}

/// Texels one tier gains from an append
///
/// Every table holds one row per texel: a vertex (its UV row shares the
/// vertex index, so the vertex count bounds the UV table too), a primitive's
/// indices, an edge's two indices, one lookup entry per virtual primitive or
/// edge.
#[derive(Debug, Clone, Copy, Default)]
struct TierUsage {
    vertices: usize,
    primitives: usize,
    edges: usize,
    primitive_lookup: usize,
    edge_lookup: usize,
}

fn geometry_usage(geometry: &CompressedGeometry, structure: bool, lookups: bool) -> [TierUsage; 3] {
    let vpp = geometry.primitive.vertices_per_primitive();
    let mut usage = [TierUsage::default(); 3];
    for bucket in &geometry.buckets {
        let u = &mut usage[bucket.tier() as usize];
        let primitives = padded(bucket.indices.len() / vpp);
        let edges = padded(bucket.edge_indices.len() / 2);
        if structure {
            u.vertices += bucket.num_vertices();
            u.primitives += primitives;
            u.edges += edges;
        }
        if lookups {
            u.primitive_lookup += primitives;
            u.edge_lookup += edges;
        }
    }
    usage
}

fn check_element(what: &'static str, current: usize, added: usize, limit: usize) -> LayerResult<()> {
    let requested = current + added;
    if requested > limit {
        return Err(LayerError::CapacityExceeded {
            what,
            requested,
            limit,
        });
    }
    Ok(())
}

/// Would the layer still fit after adding `usage` and `parts` rows
fn check_capacity<B: GpuBackend>(
    layer: &LayerData<B>,
    usage: &[TierUsage; 3],
    parts: usize,
) -> LayerResult<()> {
    check_element("parts", layer.attributes.len(), parts, layer.config.max_parts)?;
    let limit = layer.config.max_tier_elements();
    let vpp = layer.key.primitive.vertices_per_primitive();
    for (arrays, u) in layer.tiers.iter().zip(usage.iter()) {
        check_element("vertices", arrays.num_vertices(), u.vertices, limit)?;
        check_element("primitives", arrays.indices.len() / vpp, u.primitives, limit)?;
        check_element("edges", arrays.edge_indices.len() / 2, u.edges, limit)?;
        check_element(
            "primitive lookup",
            arrays.primitive_owners.len() * LOOKUP_GRANULE,
            u.primitive_lookup,
            limit,
        )?;
        check_element(
            "edge lookup",
            arrays.edge_owners.len() * LOOKUP_GRANULE,
            u.edge_lookup,
            limit,
        )?;
    }
    Ok(())
}

pub fn has_geometry<B: GpuBackend>(layer: &LayerData<B>, id: GeometryId) -> bool {
    layer.geometries.contains_key(&id)
}

/// Whether a mesh of `geometry` still fits, counting the geometry's own data
/// only if the layer doesn't hold it yet
pub fn can_accept_mesh<B: GpuBackend>(
    layer: &LayerData<B>,
    id: GeometryId,
    geometry: &CompressedGeometry,
) -> bool {
    if layer.lifecycle != LayerLifecycle::Building {
        return false;
    }
    let usage = geometry_usage(geometry, !has_geometry(layer, id), true);
    check_capacity(layer, &usage, geometry.buckets.len()).is_ok()
}

/// Append a compressed geometry's buckets to the tier arrays
pub fn create_layer_geometry<B: GpuBackend>(
    layer: &mut LayerData<B>,
    id: GeometryId,
    geometry: &CompressedGeometry,
) -> LayerResult<()> {
    ensure_building(layer, "append geometry")?;
    if has_geometry(layer, id) {
        return Err(LayerError::DuplicateGeometry { id: id.0 });
    }
    if geometry.primitive != layer.key.primitive {
        return Err(LayerError::PrimitiveMismatch {
            expected: layer.key.primitive,
            found: geometry.primitive,
        });
    }
    check_capacity(layer, &geometry_usage(geometry, true, false), 0)?;

    let vpp = geometry.primitive.vertices_per_primitive();
    let mut buckets = Vec::with_capacity(geometry.buckets.len());
    for bucket in &geometry.buckets {
        let tier = bucket.tier();
        let arrays = &mut layer.tiers[tier as usize];
        let vertex_base = arrays.num_vertices();

        // UVs stay aligned with positions once any geometry in the tier has them
        if bucket.uvs_quantized.is_some() || !arrays.uvs_quantized.is_empty() {
            arrays.uvs_quantized.resize(vertex_base * 2, 0);
            match &bucket.uvs_quantized {
                Some(uvs) => arrays.uvs_quantized.extend_from_slice(uvs),
                None => arrays
                    .uvs_quantized
                    .resize((vertex_base + bucket.num_vertices()) * 2, 0),
            }
        }
        arrays
            .positions_quantized
            .extend_from_slice(&bucket.positions_quantized);

        let num_primitives = bucket.indices.len() / vpp;
        let index_base = arrays.indices.len();
        arrays.indices.extend_from_slice(&bucket.indices);
        arrays.indices.resize(index_base + padded(num_primitives) * vpp, 0);

        let num_edges = bucket.edge_indices.len() / 2;
        let edge_index_base = arrays.edge_indices.len();
        arrays.edge_indices.extend_from_slice(&bucket.edge_indices);
        arrays.edge_indices.resize(edge_index_base + padded(num_edges) * 2, 0);

        buckets.push(BucketPlacement {
            tier,
            vertex_base: vertex_base as u32,
            index_base: index_base as u32,
            edge_index_base: edge_index_base as u32,
            num_primitives: num_primitives as u32,
            num_edges: num_edges as u32,
        });
    }

    layer.geometries.insert(
        id,
        LayerGeometry {
            origin: geometry.origin,
            decode_matrix: geometry.decode_matrix,
            uv_decode_matrix: geometry.uv_decode_matrix,
            buckets,
            use_count: 0,
        },
    );
    Ok(())
}

/// Part instance matrix: geometry origin, then the mesh transform, expressed
/// relative to the tile center
pub(crate) fn instance_matrix(
    world: &Matrix4<f64>,
    origin: Point3<f64>,
    tile_center: Point3<f64>,
) -> Matrix4<f64> {
    let placed = world * Matrix4::from_translation(Vector3::new(origin.x, origin.y, origin.z));
    relative_to_center(&placed, tile_center)
}

pub(crate) fn uv_gpu_matrix(matrix: Option<&Matrix3<f64>>) -> [[f32; 4]; 3] {
    let m = matrix.copied().unwrap_or_else(Matrix3::identity);
    let columns: [[f64; 3]; 3] = m.into();
    columns.map(|c| [c[0] as f32, c[1] as f32, c[2] as f32, 0.0])
}

/// Add or remove a mesh's parts from the state counters
pub(crate) fn adjust_counters(
    counters: &mut LayerCounters,
    flags: MeshFlags,
    transparent: bool,
    parts: u32,
    add: bool,
) {
    let apply = |counter: &mut u32, on: bool| {
        if on {
            *counter = if add {
                *counter + parts
            } else {
                counter.saturating_sub(parts)
            };
        }
    };
    apply(&mut counters.visible, flags.contains(MeshFlags::VISIBLE));
    apply(&mut counters.culled, flags.contains(MeshFlags::CULLED));
    apply(&mut counters.transparent, transparent);
    apply(&mut counters.xrayed, flags.contains(MeshFlags::XRAYED));
    apply(&mut counters.highlighted, flags.contains(MeshFlags::HIGHLIGHTED));
    apply(&mut counters.selected, flags.contains(MeshFlags::SELECTED));
    apply(&mut counters.edges, flags.contains(MeshFlags::EDGES));
    apply(&mut counters.pickable, flags.contains(MeshFlags::PICKABLE));
    apply(&mut counters.clippable, flags.contains(MeshFlags::CLIPPABLE));
}

/// Add a mesh referencing an appended geometry, one part per bucket
pub fn create_layer_mesh<B: GpuBackend>(
    layer: &mut LayerData<B>,
    params: &MeshParams,
) -> LayerResult<MeshHandle> {
    ensure_building(layer, "create mesh")?;
    let geometry = layer
        .geometries
        .get(&params.geometry)
        .ok_or(LayerError::GeometryNotFound {
            id: params.geometry.0,
        })?;

    let mut usage = [TierUsage::default(); 3];
    for placement in &geometry.buckets {
        let u = &mut usage[placement.tier as usize];
        u.primitives += padded(placement.num_primitives as usize);
        u.edges += padded(placement.num_edges as usize);
    }
    check_capacity(layer, &usage, geometry.buckets.len())?;

    let mesh_index = layer.meshes.len() as u32;
    let first_part = layer.attributes.len() as u32;
    let transparent = params.opacity < 255;
    let pass_codes = derive_pass_codes(params.flags, transparent).packed();
    let world = params.matrix.unwrap_or_else(Matrix4::identity);
    let instance = to_gpu_matrix(&instance_matrix(&world, geometry.origin, params.tile_center));
    let decode = to_gpu_matrix(&geometry.decode_matrix);
    let uv_decode = uv_gpu_matrix(geometry.uv_decode_matrix.as_ref());
    let clippable = params.flags.contains(MeshFlags::CLIPPABLE) as u8;

    for placement in &geometry.buckets {
        let part_id = layer.attributes.len() as u32;
        let arrays = &mut layer.tiers[placement.tier as usize];

        let primitive_start = (arrays.primitive_owners.len() * LOOKUP_GRANULE) as u32;
        let granules = padded(placement.num_primitives as usize) / LOOKUP_GRANULE;
        arrays
            .primitive_owners
            .extend(std::iter::repeat(part_id).take(granules));

        let edge_start = (arrays.edge_owners.len() * LOOKUP_GRANULE) as u32;
        let granules = padded(placement.num_edges as usize) / LOOKUP_GRANULE;
        arrays
            .edge_owners
            .extend(std::iter::repeat(part_id).take(granules));

        layer.attributes.push(PartAttributes {
            color: [params.color[0], params.color[1], params.color[2], params.opacity],
            pick_color: params.pick_color,
            pass_codes,
            material: [
                clippable,
                params.metallic,
                params.roughness,
                placement.tier as u8,
            ],
            vertex_base: placement.vertex_base,
            index_base: placement.index_base,
            edge_index_base: placement.edge_index_base,
            primitive_start,
            edge_start,
            tile_index: params.tile_index,
            mesh_index,
            _padding: 0,
        });
        layer.matrices.push(PartMatrices {
            decode,
            instance,
            uv_decode,
        });
    }

    let num_parts = layer.attributes.len() as u32 - first_part;
    if let Some(geometry) = layer.geometries.get_mut(&params.geometry) {
        geometry.use_count += 1;
    }
    adjust_counters(&mut layer.counters, params.flags, transparent, num_parts, true);
    layer.meshes.push(MeshRecord {
        geometry: params.geometry,
        first_part,
        num_parts,
        flags: params.flags,
        transparent,
        world_matrix: world,
        tile_center: params.tile_center,
    });
    Ok(MeshHandle(mesh_index))
}

/// Narrow bucket-local indices to the tier's width
pub fn index_bytes(tier: IndexTier, indices: &[u32]) -> Vec<u8> {
    match tier {
        IndexTier::Bits8 => indices.iter().map(|&i| i as u8).collect(),
        IndexTier::Bits16 => {
            let narrowed: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
            bytemuck::cast_slice(&narrowed).to_vec()
        }
        IndexTier::Bits32 => bytemuck::cast_slice(indices).to_vec(),
    }
}

fn upload_tier<B: GpuBackend>(backend: &B, arrays: &TierArrays) -> TierGpuBuffers<B::Buffer> {
    let bits = 8 << arrays.tier as u32;
    let label = |kind: BufferKind, what: &str| format!("layer_{}bit_{}_{}", bits, kind.label(), what);
    TierGpuBuffers {
        positions: backend.create_buffer(
            &label(BufferKind::Positions, "data"),
            BufferKind::Positions,
            bytemuck::cast_slice(&arrays.positions_quantized),
        ),
        uvs: (!arrays.uvs_quantized.is_empty()).then(|| {
            backend.create_buffer(
                &label(BufferKind::Uvs, "data"),
                BufferKind::Uvs,
                bytemuck::cast_slice(&arrays.uvs_quantized),
            )
        }),
        indices: backend.create_buffer(
            &label(BufferKind::Indices, "data"),
            BufferKind::Indices,
            &index_bytes(arrays.tier, &arrays.indices),
        ),
        edge_indices: backend.create_buffer(
            &label(BufferKind::EdgeIndices, "data"),
            BufferKind::EdgeIndices,
            &index_bytes(arrays.tier, &arrays.edge_indices),
        ),
        primitive_owners: backend.create_buffer(
            &label(BufferKind::OwnerLookup, "primitives"),
            BufferKind::OwnerLookup,
            bytemuck::cast_slice(&arrays.primitive_owners),
        ),
        edge_owners: backend.create_buffer(
            &label(BufferKind::OwnerLookup, "edges"),
            BufferKind::OwnerLookup,
            bytemuck::cast_slice(&arrays.edge_owners),
        ),
    }
}

/// Freeze the structure and hand every table to the GPU
pub fn build_layer<B: GpuBackend>(layer: &mut LayerData<B>, backend: &B) -> LayerResult<()> {
    match layer.lifecycle {
        LayerLifecycle::Building => {}
        LayerLifecycle::Built => {
            log::error!("[layer_operations::build_layer] Layer built twice, layer poisoned");
            layer.lifecycle = LayerLifecycle::Poisoned;
            return Err(LayerError::AlreadyBuilt);
        }
        LayerLifecycle::Poisoned => return Err(LayerError::Poisoned),
        LayerLifecycle::Destroyed => return Err(LayerError::Destroyed),
    }

    let tiers = [0, 1, 2].map(|t| {
        let arrays = &layer.tiers[t];
        (!arrays.is_empty()).then(|| upload_tier(backend, arrays))
    });
    let attributes = backend.create_buffer(
        "layer_part_attributes",
        BufferKind::Attributes,
        bytemuck::cast_slice(&layer.attributes),
    );
    let matrices = backend.create_buffer(
        "layer_part_matrices",
        BufferKind::Matrices,
        bytemuck::cast_slice(&layer.matrices),
    );

    layer.gpu = Some(LayerGpuBuffers {
        tiers,
        attributes,
        matrices,
    });
    layer.lifecycle = LayerLifecycle::Built;
    layer.update = UpdateState::default();

    log::info!("[layer_operations::build_layer] {}", layer_stats(layer));
    Ok(())
}

/// Release GPU buffers and CPU tables; the layer accepts nothing afterwards
pub fn destroy_layer<B: GpuBackend>(layer: &mut LayerData<B>) {
    if layer.lifecycle == LayerLifecycle::Destroyed {
        return;
    }
    log::debug!(
        "[layer_operations::destroy_layer] Destroying layer with {} meshes",
        layer.meshes.len()
    );
    layer.gpu = None;
    layer.tiers = IndexTier::ALL.map(TierArrays::new);
    layer.geometries.clear();
    layer.attributes.clear();
    layer.matrices.clear();
    layer.meshes.clear();
    layer.counters = LayerCounters::default();
    layer.update = UpdateState::default();
    layer.lifecycle = LayerLifecycle::Destroyed;
}

pub fn layer_stats<B: GpuBackend>(layer: &LayerData<B>) -> LayerStats {
    let vertices = [0, 1, 2].map(|t| layer.tiers[t].num_vertices());
    let primitives = layer
        .geometries
        .values()
        .flat_map(|g| g.buckets.iter())
        .map(|b| b.num_primitives as usize)
        .sum::<usize>();
    let edges = layer
        .geometries
        .values()
        .flat_map(|g| g.buckets.iter())
        .map(|b| b.num_edges as usize)
        .sum::<usize>();
    let structure_bytes: usize = layer
        .tiers
        .iter()
        .map(|t| {
            (t.positions_quantized.len() + t.uvs_quantized.len()) * 2
                + (t.indices.len() + t.edge_indices.len()) * t.tier.index_bytes()
                + (t.primitive_owners.len() + t.edge_owners.len()) * 4
        })
        .sum();
    let table_bytes = layer.attributes.len() * std::mem::size_of::<PartAttributes>()
        + layer.matrices.len() * std::mem::size_of::<PartMatrices>();

    LayerStats {
        meshes: layer.meshes.len(),
        parts: layer.attributes.len(),
        geometries: layer.geometries.len(),
        vertices,
        primitives,
        edges,
        cpu_bytes: structure_bytes + table_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{compress, PrimitiveKind};
    use crate::config::CompressionConfig;
    use crate::gpu::{HeadlessBackend, UploadRecord};
    use crate::test_fixtures::cube;

    fn solid_key() -> LayerKey {
        LayerKey {
            primitive: PrimitiveKind::Solid,
            texture_set: None,
            origin_cell: [0, 0, 0],
        }
    }

    fn cube_geometry() -> CompressedGeometry {
        compress(
            &cube([0.0, 0.0, 0.0], 1.0, PrimitiveKind::Solid),
            &CompressionConfig::default(),
        )
        .unwrap()
    }

    fn new_layer(config: LayerConfig) -> LayerData<HeadlessBackend> {
        create_layer(solid_key(), config)
    }

    #[test]
    fn test_append_geometry_pads_to_granule() {
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();

        let tier = &layer.tiers[IndexTier::Bits8 as usize];
        assert_eq!(tier.num_vertices(), 8);
        // 12 triangles padded to 16, 12 edges padded to 16
        assert_eq!(tier.indices.len(), 16 * 3);
        assert_eq!(tier.edge_indices.len(), 16 * 2);
        assert!(tier.indices[36..].iter().all(|&i| i == 0));
        assert!(layer.tiers[IndexTier::Bits16 as usize].is_empty());
    }

    #[test]
    fn test_second_geometry_starts_on_granule() {
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();
        create_layer_geometry(&mut layer, GeometryId(2), &cube_geometry()).unwrap();

        let placement = layer.geometries[&GeometryId(2)].buckets[0];
        assert_eq!(placement.vertex_base, 8);
        assert_eq!(placement.index_base, 48);
        assert_eq!(placement.edge_index_base, 32);
        assert_eq!((placement.index_base / 3) as usize % LOOKUP_GRANULE, 0);
    }

    #[test]
    fn test_meshes_share_geometry() {
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();

        let a = create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        let b = create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        assert_eq!((a, b), (MeshHandle(0), MeshHandle(1)));

        let tier = &layer.tiers[IndexTier::Bits8 as usize];
        assert_eq!(tier.num_vertices(), 8);
        assert_eq!(tier.primitive_owners, vec![0, 0, 1, 1]);
        assert_eq!(tier.edge_owners, vec![0, 0, 1, 1]);

        assert_eq!(layer.attributes[0].vertex_base, layer.attributes[1].vertex_base);
        assert_eq!(layer.attributes[0].primitive_start, 0);
        assert_eq!(layer.attributes[1].primitive_start, 16);
        assert_eq!(layer.attributes[1].mesh_index, 1);
        assert_eq!(layer.geometries[&GeometryId(1)].use_count, 2);
    }

    #[test]
    fn test_mesh_row_contents() {
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();
        let mut params = MeshParams::new(GeometryId(1));
        params.color = [10, 20, 30];
        params.opacity = 100;
        params.tile_index = 7;
        params.flags = MeshFlags::DEFAULT | MeshFlags::EDGES;
        create_layer_mesh(&mut layer, &params).unwrap();

        let row = layer.attributes[0];
        assert_eq!(row.color, [10, 20, 30, 100]);
        assert_eq!(row.tile_index, 7);
        // Transparent color and transparent edges, pickable
        assert_eq!(row.pass_codes, [2, 0, 7, 11]);
        assert_eq!(row.material[0], 1);
        assert_eq!(layer.counters.transparent, 1);
        assert_eq!(layer.counters.edges, 1);
    }

    #[test]
    fn test_missing_geometry() {
        let mut layer = new_layer(LayerConfig::default());
        let result = create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(9)));
        assert!(matches!(result, Err(LayerError::GeometryNotFound { id: 9 })));
        assert!(layer.meshes.is_empty());
    }

    #[test]
    fn test_duplicate_geometry() {
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();
        let result = create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry());
        assert!(matches!(result, Err(LayerError::DuplicateGeometry { id: 1 })));
    }

    #[test]
    fn test_primitive_mismatch() {
        let mut layer = new_layer(LayerConfig::default());
        let lines = compress(
            &crate::compression::RawGeometry {
                primitive: PrimitiveKind::Lines,
                positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0],
                indices: vec![0, 1],
                uvs: None,
                edge_threshold_degrees: None,
            },
            &CompressionConfig::default(),
        )
        .unwrap();
        let result = create_layer_geometry(&mut layer, GeometryId(1), &lines);
        assert!(matches!(result, Err(LayerError::PrimitiveMismatch { .. })));
    }

    #[test]
    fn test_part_capacity() {
        let config = LayerConfig {
            max_parts: 2,
            ..LayerConfig::default()
        };
        let mut layer = new_layer(config);
        let geometry = cube_geometry();
        create_layer_geometry(&mut layer, GeometryId(1), &geometry).unwrap();
        for _ in 0..2 {
            assert!(can_accept_mesh(&layer, GeometryId(1), &geometry));
            create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        }
        assert!(!can_accept_mesh(&layer, GeometryId(1), &geometry));

        let result = create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1)));
        assert!(matches!(
            result,
            Err(LayerError::CapacityExceeded { what: "parts", .. })
        ));
        assert_eq!(layer.attributes.len(), 2);
        assert_eq!(layer.tiers[0].primitive_owners.len(), 4);
    }

    #[test]
    fn test_element_capacity_counts_reused_geometry_once() {
        // 16 texels per tier
        let config = LayerConfig {
            data_texture_width: 4,
            max_data_texture_height: 4,
            ..LayerConfig::default()
        };
        let mut layer = new_layer(config);
        let geometry = cube_geometry();
        // 8 vertices, 16 padded triangles and 16 padded edges: one texel each
        create_layer_geometry(&mut layer, GeometryId(1), &geometry).unwrap();
        assert_eq!(layer.tiers[0].indices.len(), 48);

        // A second copy of the triangles does not fit, another instance does
        assert!(!can_accept_mesh(&layer, GeometryId(2), &geometry));
        assert!(can_accept_mesh(&layer, GeometryId(1), &geometry));

        // Each instance takes 16 virtual primitives
        create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        assert!(!can_accept_mesh(&layer, GeometryId(1), &geometry));
        assert!(matches!(
            create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))),
            Err(LayerError::CapacityExceeded {
                what: "primitive lookup",
                requested: 32,
                limit: 16,
            })
        ));
        assert!(matches!(
            create_layer_geometry(&mut layer, GeometryId(2), &geometry),
            Err(LayerError::CapacityExceeded {
                what: "primitives",
                ..
            })
        ));
        assert!(!has_geometry(&layer, GeometryId(2)));
    }

    #[test]
    fn test_build_uploads_tables() {
        let backend = HeadlessBackend::new();
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();
        create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        build_layer(&mut layer, &backend).unwrap();

        let creates: Vec<(String, usize)> = backend
            .records()
            .into_iter()
            .filter_map(|r| match r {
                UploadRecord::Create { label, bytes, .. } => Some((label, bytes)),
                _ => None,
            })
            .collect();
        assert!(creates.contains(&("layer_8bit_positions_data".to_string(), 8 * 3 * 2)));
        assert!(creates.contains(&("layer_8bit_indices_data".to_string(), 48)));
        assert!(creates.contains(&("layer_part_attributes".to_string(), 48)));
        assert!(creates.contains(&("layer_part_matrices".to_string(), 176)));
        // Empty tiers are skipped
        assert!(!creates.iter().any(|(label, _)| label.starts_with("layer_16bit")));
        assert_eq!(layer.lifecycle, LayerLifecycle::Built);
    }

    #[test]
    fn test_double_build_poisons() {
        let backend = HeadlessBackend::new();
        let mut layer = new_layer(LayerConfig::default());
        build_layer(&mut layer, &backend).unwrap();
        assert!(matches!(build_layer(&mut layer, &backend), Err(LayerError::AlreadyBuilt)));
        assert_eq!(layer.lifecycle, LayerLifecycle::Poisoned);
        assert!(matches!(build_layer(&mut layer, &backend), Err(LayerError::Poisoned)));
    }

    #[test]
    fn test_append_after_build_poisons() {
        let backend = HeadlessBackend::new();
        let mut layer = new_layer(LayerConfig::default());
        build_layer(&mut layer, &backend).unwrap();
        let result = create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry());
        assert!(matches!(result, Err(LayerError::StructureFrozen { .. })));
        assert_eq!(layer.lifecycle, LayerLifecycle::Poisoned);
    }

    #[test]
    fn test_index_narrowing() {
        assert_eq!(index_bytes(IndexTier::Bits8, &[1, 2, 255]), vec![1, 2, 255]);
        assert_eq!(index_bytes(IndexTier::Bits16, &[1, 258]).len(), 4);
        assert_eq!(index_bytes(IndexTier::Bits32, &[1, 2]).len(), 8);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let backend = HeadlessBackend::new();
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();
        create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        build_layer(&mut layer, &backend).unwrap();
        destroy_layer(&mut layer);

        assert!(layer.gpu.is_none());
        assert_eq!(layer.lifecycle, LayerLifecycle::Destroyed);
        assert_eq!(layer_stats(&layer).cpu_bytes, 0);
        assert!(matches!(build_layer(&mut layer, &backend), Err(LayerError::Destroyed)));
    }

    #[test]
    fn test_stats_display() {
        let mut layer = new_layer(LayerConfig::default());
        create_layer_geometry(&mut layer, GeometryId(1), &cube_geometry()).unwrap();
        create_layer_mesh(&mut layer, &MeshParams::new(GeometryId(1))).unwrap();
        let stats = layer_stats(&layer);
        assert_eq!(stats.vertices, [8, 0, 0]);
        assert_eq!(stats.primitives, 12);
        assert_eq!(stats.edges, 12);
        let text = stats.to_string();
        assert!(text.starts_with("Layer: 1 meshes (1 parts), 1 geometries"));
    }

    #[test]
    fn test_instance_matrix_is_tile_relative() {
        let world = Matrix4::from_translation(Vector3::new(1_000_000.0, 0.0, 0.0));
        let m = instance_matrix(&world, Point3::new(200.0, 0.0, 0.0), Point3::new(1_000_000.0, 0.0, 0.0));
        assert_eq!(m.w.x, 200.0);
        assert_eq!(m.w.y, 0.0);
    }
}

/// Layer Module - Data-Oriented Programming (DOP) style
///
/// A layer packs many meshes into a handful of flat GPU tables so they draw
/// in a few calls.
///
/// - layer_data.rs: tables, rows and records
/// - render_pass.rs: flag bits and pass-code derivation
/// - layer_operations.rs: append, build, destroy
/// - layer_state_operations.rs: per-mesh state updates and the frame protocol

pub mod layer_data;
pub mod layer_operations;
pub mod layer_state_operations;
pub mod render_pass;

pub use layer_data::{
    GeometryId, LayerCounters, LayerData, LayerKey, LayerLifecycle, LayerStats, LayerUpdateMode,
    MeshHandle, MeshParams, PartAttributes, PartMatrices,
};
pub use layer_operations::{
    build_layer, can_accept_mesh, create_layer, create_layer_geometry, create_layer_mesh,
    destroy_layer, has_geometry, index_bytes, layer_stats,
};
pub use layer_state_operations::{
    begin_frame, commit_deferred, is_mesh_transparent, set_mesh_color, set_mesh_flags,
    set_mesh_matrix, set_mesh_pick_color,
};
pub use render_pass::{derive_pass_codes, MeshFlags, PassCodes, RenderPass};

use crate::compression::PrimitiveKind;

pub type LayerResult<T> = Result<T, LayerError>;

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Layer already built")]
    AlreadyBuilt,

    #[error("Layer structure is frozen, cannot {operation}")]
    StructureFrozen { operation: &'static str },

    #[error("Layer is unusable after an earlier structural violation")]
    Poisoned,

    #[error("Layer has been destroyed")]
    Destroyed,

    #[error("Geometry {id} not found in layer")]
    GeometryNotFound { id: u32 },

    #[error("Geometry {id} already appended to layer")]
    DuplicateGeometry { id: u32 },

    #[error("Mesh {handle} not found in layer")]
    MeshNotFound { handle: u32 },

    #[error("Primitive mismatch: layer holds {expected:?}, geometry is {found:?}")]
    PrimitiveMismatch {
        expected: PrimitiveKind,
        found: PrimitiveKind,
    },

    #[error("Layer capacity exceeded: {what} needs {requested}, limit {limit}")]
    CapacityExceeded {
        what: &'static str,
        requested: usize,
        limit: usize,
    },
}

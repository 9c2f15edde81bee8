/// Tiles Module - Data-Oriented Programming (DOP) style
///
/// Reference-counted pool of relative-to-center coordinate frames. Meshes
/// whose positions round to the same cell share one tile, and each tile's
/// view matrix is computed in f64 before being narrowed for the GPU.
///
/// - tile_data.rs: pool and tile records
/// - tile_operations.rs: acquire, release, migrate, refresh

pub mod tile_data;
pub mod tile_operations;

pub use tile_data::{TileData, TileHandle, TileId, TileManagerData};
pub use tile_operations::{
    create_tile_manager, destroy_tile_manager, get_tile, put_tile, refresh_matrices, tile,
    tile_id_for, update_tile_center,
};

pub type TileResult<T> = Result<T, TileError>;

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Tile pool exhausted ({capacity} tiles in use)")]
    PoolExhausted { capacity: usize },

    #[error("Tile {id} is not live in slot {index}")]
    UnknownTile { id: TileId, index: u32 },

    #[error("Tile center is not finite")]
    NonFiniteCenter,
}

//! Policy constants shared by the compressor, the layers and the tile pool.
//!
//! Every value here is a default for a field in [`crate::config`]; nothing in
//! the crate reads these directly once a config has been built.

/// Quantization range
pub mod quantization {
    /// Largest value a quantized position or UV component can take
    pub const MAX_QUANTIZED: f64 = 65535.0;

    /// Default RTC cell size used to snap geometry origins
    pub const DEFAULT_RTC_CELL_SIZE: f64 = 200.0;

    /// Default dihedral angle (degrees) above which an edge is kept
    pub const DEFAULT_EDGE_THRESHOLD_DEGREES: f64 = 10.0;
}

/// Index width tiers
pub mod tiers {
    /// Buckets with at most this many vertices use 8-bit indices
    pub const MAX_VERTICES_8_BITS: usize = 1 << 8;

    /// Buckets with at most this many vertices use 16-bit indices
    pub const MAX_VERTICES_16_BITS: usize = 1 << 16;
}

/// Layer data tables
pub mod layer {
    /// Primitives and edges covered by one owner-lookup entry
    pub const LOOKUP_GRANULE: usize = 8;

    /// Default maximum number of mesh-parts per layer
    pub const DEFAULT_MAX_PARTS: usize = 4096;

    /// Per-frame updates after which a layer switches to batching
    pub const DEFAULT_BATCH_UPDATE_THRESHOLD: usize = 10;

    /// Width of a data texture row, in elements
    pub const DATA_TEXTURE_WIDTH: usize = 4096;

    /// Maximum addressable data texture height
    pub const MAX_DATA_TEXTURE_HEIGHT: usize = 1 << 12;
}

/// RTC tile pool
pub mod tiles {
    /// Default tile cell size
    pub const DEFAULT_TILE_CELL_SIZE: f64 = 200.0;

    /// Default number of tile slots
    pub const DEFAULT_TILE_CAPACITY: usize = 2000;
}

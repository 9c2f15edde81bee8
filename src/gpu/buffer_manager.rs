//! Buffer Manager - the seam between layer tables and a GPU device
//!
//! Layers and the tile pool only ever create a buffer once from a CPU mirror
//! and then overwrite byte ranges of it. Anything that can do those two things
//! can back them.

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Positions,
    Uvs,
    Indices,
    EdgeIndices,
    OwnerLookup,
    Attributes,
    Matrices,
    TileMatrices,
}

impl BufferKind {
    pub fn label(self) -> &'static str {
        match self {
            BufferKind::Positions => "positions",
            BufferKind::Uvs => "uvs",
            BufferKind::Indices => "indices",
            BufferKind::EdgeIndices => "edge_indices",
            BufferKind::OwnerLookup => "owner_lookup",
            BufferKind::Attributes => "attributes",
            BufferKind::Matrices => "matrices",
            BufferKind::TileMatrices => "tile_matrices",
        }
    }
}

/// Create-once, overwrite-in-place GPU buffers
pub trait GpuBackend {
    type Buffer;

    /// Create a buffer initialized with `contents`
    fn create_buffer(&self, label: &str, kind: BufferKind, contents: &[u8]) -> Self::Buffer;

    /// Overwrite `data.len()` bytes of `buffer` starting at `offset`
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);
}

/// Copy alignment required by buffer writes
pub const COPY_ALIGNMENT: usize = 4;

/// Pad a byte slice to the copy alignment, never returning an empty buffer
pub fn aligned_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().max(COPY_ALIGNMENT).div_ceil(COPY_ALIGNMENT) * COPY_ALIGNMENT;
    let mut out = Vec::with_capacity(padded);
    out.extend_from_slice(bytes);
    out.resize(padded, 0);
    out
}

//! GPU Module - buffer backends for layer and tile tables

pub mod buffer_manager;
pub mod headless;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use buffer_manager::{aligned_bytes, BufferKind, GpuBackend};
pub use headless::{HeadlessBackend, HeadlessBuffer, UploadRecord};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;

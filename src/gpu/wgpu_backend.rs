//! wgpu backend: layer tables live in storage buffers
//!
//! Buffers are created with `create_buffer_init` from the CPU mirror and
//! updated with `Queue::write_buffer`, which wgpu stages and flushes on the
//! next submit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::buffer_manager::{aligned_bytes, BufferKind, GpuBackend};

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    out_of_memory: Arc<AtomicBool>,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let out_of_memory = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&out_of_memory);

        device.on_uncaptured_error(Box::new(move |error| match error {
            wgpu::Error::OutOfMemory { .. } => {
                log::error!("[WgpuBackend] GPU out of memory while uploading layer data");
                flag.store(true, Ordering::Relaxed);
            }
            wgpu::Error::Validation { description, .. } => {
                log::error!("[WgpuBackend] GPU validation error: {}", description);
            }
        }));

        Self {
            device,
            queue,
            out_of_memory,
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// True once the device reported an out-of-memory error
    pub fn is_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::Relaxed)
    }

    fn usage(kind: BufferKind) -> wgpu::BufferUsages {
        match kind {
            // Structural data is frozen after build
            BufferKind::Positions
            | BufferKind::Uvs
            | BufferKind::Indices
            | BufferKind::EdgeIndices
            | BufferKind::OwnerLookup => wgpu::BufferUsages::STORAGE,
            BufferKind::Attributes | BufferKind::Matrices | BufferKind::TileMatrices => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
        }
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&self, label: &str, kind: BufferKind, contents: &[u8]) -> wgpu::Buffer {
        let contents = aligned_bytes(contents);
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &contents,
                usage: Self::usage(kind),
            })
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        if data.len() % super::buffer_manager::COPY_ALIGNMENT != 0 {
            self.queue.write_buffer(buffer, offset, &aligned_bytes(data));
        } else {
            self.queue.write_buffer(buffer, offset, data);
        }
    }
}

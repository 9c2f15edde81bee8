//! Headless backend: keeps buffers in CPU memory and records every transfer
//!
//! Used by tools that pack layers without a device, and by tests that need to
//! see exactly which uploads a sequence of layer operations produced.

use parking_lot::Mutex;

use super::buffer_manager::{BufferKind, GpuBackend};

/// Handle to a CPU-side buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessBuffer {
    pub id: usize,
    pub kind: BufferKind,
}

/// One recorded transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRecord {
    Create {
        buffer: HeadlessBuffer,
        label: String,
        bytes: usize,
    },
    Write {
        buffer: HeadlessBuffer,
        offset: u64,
        bytes: usize,
    },
}

#[derive(Debug, Default)]
struct HeadlessState {
    buffers: Vec<Vec<u8>>,
    records: Vec<UploadRecord>,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All transfers so far, oldest first
    pub fn records(&self) -> Vec<UploadRecord> {
        self.state.lock().records.clone()
    }

    /// Drop the transfer log, keeping buffer contents
    pub fn clear_records(&self) {
        self.state.lock().records.clear();
    }

    /// Writes (not creates) recorded against buffers of `kind`
    pub fn writes_to(&self, kind: BufferKind) -> Vec<(u64, usize)> {
        self.state
            .lock()
            .records
            .iter()
            .filter_map(|r| match r {
                UploadRecord::Write {
                    buffer,
                    offset,
                    bytes,
                } if buffer.kind == kind => Some((*offset, *bytes)),
                _ => None,
            })
            .collect()
    }

    /// Current contents of a buffer
    pub fn contents(&self, buffer: &HeadlessBuffer) -> Vec<u8> {
        self.state
            .lock()
            .buffers
            .get(buffer.id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total bytes moved, creates included
    pub fn bytes_uploaded(&self) -> usize {
        self.state
            .lock()
            .records
            .iter()
            .map(|r| match r {
                UploadRecord::Create { bytes, .. } | UploadRecord::Write { bytes, .. } => *bytes,
            })
            .sum()
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;

    fn create_buffer(&self, label: &str, kind: BufferKind, contents: &[u8]) -> HeadlessBuffer {
        let mut state = self.state.lock();
        let buffer = HeadlessBuffer {
            id: state.buffers.len(),
            kind,
        };
        state.buffers.push(contents.to_vec());
        state.records.push(UploadRecord::Create {
            buffer,
            label: label.to_string(),
            bytes: contents.len(),
        });
        buffer
    }

    fn write_buffer(&self, buffer: &HeadlessBuffer, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        let Some(target) = state.buffers.get_mut(buffer.id) else {
            log::warn!(
                "[HeadlessBackend::write_buffer] Unknown buffer {}, write dropped",
                buffer.id
            );
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > target.len() {
            log::warn!(
                "[HeadlessBackend::write_buffer] Write {}..{} past end of buffer {} ({} bytes)",
                start,
                end,
                buffer.id,
                target.len()
            );
            return;
        }
        target[start..end].copy_from_slice(data);
        state.records.push(UploadRecord::Write {
            buffer: *buffer,
            offset,
            bytes: data.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_write() {
        let backend = HeadlessBackend::new();
        let buffer = backend.create_buffer("test", BufferKind::Attributes, &[0u8; 8]);
        backend.write_buffer(&buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.contents(&buffer), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(backend.writes_to(BufferKind::Attributes), vec![(4, 4)]);
        assert_eq!(backend.bytes_uploaded(), 12);
    }

    #[test]
    fn test_out_of_range_write_is_dropped() {
        let backend = HeadlessBackend::new();
        let buffer = backend.create_buffer("test", BufferKind::Matrices, &[0u8; 4]);
        backend.write_buffer(&buffer, 2, &[1, 2, 3, 4]);
        assert_eq!(backend.contents(&buffer), vec![0; 4]);
        assert!(backend.writes_to(BufferKind::Matrices).is_empty());
    }
}

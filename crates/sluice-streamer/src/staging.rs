// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Staging memory handed out to upload handlers and producers.

use sluice_core::device::{BufferDescriptor, BufferId, GraphicsDevice, ResourceError};
use sluice_core::utils::round_up_u64;
use std::borrow::Cow;

/// A bounds-checked view into host-visible staging memory.
///
/// The view stays valid until the resource set that handed it out is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingRange {
    /// Buffer holding the bytes.
    pub buffer: BufferId,
    /// First byte of the range inside `buffer`.
    pub offset: u64,
    /// Length of the range.
    pub size: u64,
}

impl StagingRange {
    /// Sub-range of `size` bytes starting `offset` bytes into this range.
    pub fn slice(&self, offset: u64, size: u64) -> Option<StagingRange> {
        let end = offset.checked_add(size)?;
        (end <= self.size).then_some(StagingRange {
            buffer: self.buffer,
            offset: self.offset + offset,
            size,
        })
    }

    /// Copies `data` to `offset` bytes into the range.
    pub fn write(
        &self,
        device: &dyn GraphicsDevice,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(ResourceError::OutOfBounds)?;
        if end > self.size {
            return Err(ResourceError::OutOfBounds);
        }
        device.write_buffer(self.buffer, self.offset + offset, data)
    }

    /// Reads `len` bytes starting `offset` bytes into the range.
    pub fn read(
        &self,
        device: &dyn GraphicsDevice,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, ResourceError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => device.read_buffer(self.buffer, self.offset + offset, len),
            _ => Err(ResourceError::OutOfBounds),
        }
    }
}

/// Creates a host-visible buffer that is not part of any ring.
pub(crate) fn create_upload_buffer(
    device: &dyn GraphicsDevice,
    size: u64,
    alignment: u32,
    node_index: u32,
    label: &'static str,
) -> Result<StagingRange, ResourceError> {
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some(Cow::Borrowed(label)),
        alignment,
        ..BufferDescriptor::staging(size, node_index)
    })?;
    Ok(StagingRange {
        buffer,
        offset: 0,
        size,
    })
}

/// Bump allocator over one resource set's staging ring.
///
/// Requests that do not fit get a dedicated temporary buffer, destroyed on
/// the next [`StagingAllocator::reset`].
#[derive(Debug)]
pub struct StagingAllocator {
    ring: BufferId,
    capacity: u64,
    cursor: u64,
    node_index: u32,
    temporaries: Vec<BufferId>,
}

impl StagingAllocator {
    /// Allocates a ring of `capacity` bytes on `node_index`.
    ///
    /// # Errors
    ///
    /// Returns the device error if the ring buffer cannot be created.
    pub fn new(
        device: &dyn GraphicsDevice,
        capacity: u64,
        alignment: u32,
        node_index: u32,
    ) -> Result<Self, ResourceError> {
        let ring = create_upload_buffer(device, capacity, alignment, node_index, "staging ring")?;
        Ok(Self {
            ring: ring.buffer,
            capacity,
            cursor: 0,
            node_index,
            temporaries: Vec::new(),
        })
    }

    /// Ring size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes of the ring consumed since the last reset.
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Temporary buffers waiting for the next reset.
    pub fn temporary_count(&self) -> usize {
        self.temporaries.len()
    }

    /// `true` when nothing was handed out since the last reset.
    pub fn is_empty(&self) -> bool {
        self.cursor == 0 && self.temporaries.is_empty()
    }

    /// `true` if `size` bytes at `alignment` fit in what is left of the ring.
    pub fn fits(&self, size: u64, alignment: u32) -> bool {
        self.ring_offset(size, alignment).is_some()
    }

    fn ring_offset(&self, size: u64, alignment: u32) -> Option<u64> {
        let offset = round_up_u64(self.cursor, u64::from(alignment))?;
        (offset < self.capacity && size <= self.capacity - offset).then_some(offset)
    }

    /// Hands out `size` bytes aligned to `alignment` (0 for none).
    ///
    /// Falls back to a temporary buffer of exactly `size` bytes when the ring
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Only fails if the device cannot create the temporary buffer.
    pub fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        size: u64,
        alignment: u32,
    ) -> Result<StagingRange, ResourceError> {
        if let Some(offset) = self.ring_offset(size, alignment) {
            self.cursor = offset + size;
            return Ok(StagingRange {
                buffer: self.ring,
                offset,
                size,
            });
        }

        log::debug!(
            "StagingAllocator: {} bytes do not fit the {} byte ring, creating a temporary buffer",
            size,
            self.capacity
        );
        let range = create_upload_buffer(device, size, alignment, self.node_index, "staging overflow")?;
        self.temporaries.push(range.buffer);
        Ok(range)
    }

    /// Takes ownership of an upload buffer so it is freed with the other
    /// temporaries.
    pub fn adopt(&mut self, buffer: BufferId) {
        self.temporaries.push(buffer);
    }

    /// Rewinds the ring and destroys every temporary buffer.
    /// Returns how many temporaries were destroyed.
    pub fn reset(&mut self, device: &dyn GraphicsDevice) -> usize {
        self.cursor = 0;
        let freed = self.temporaries.len();
        for buffer in self.temporaries.drain(..) {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::error!("StagingAllocator: failed to destroy {buffer:?}: {e}");
            }
        }
        freed
    }

    /// Releases the ring and any temporaries.
    pub fn destroy(mut self, device: &dyn GraphicsDevice) {
        if !self.temporaries.is_empty() {
            log::info!(
                "StagingAllocator: {} temporary buffer(s) were not cleaned up",
                self.temporaries.len()
            );
        }
        self.reset(device);
        if let Err(e) = device.destroy_buffer(self.ring) {
            log::error!("StagingAllocator: failed to destroy the ring: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_infra::HeadlessDevice;

    #[test]
    fn test_ring_ranges_never_overlap() {
        let device = HeadlessDevice::default();
        let mut staging = StagingAllocator::new(&device, 1024, 0, 0).unwrap();

        let requests = [(100u64, 0u32), (7, 16), (64, 256), (1, 4), (33, 16)];
        let mut ranges: Vec<StagingRange> = Vec::new();
        for (size, alignment) in requests {
            let range = staging.allocate(&device, size, alignment).unwrap();
            if alignment > 1 {
                assert_eq!(range.offset % u64::from(alignment), 0);
            }
            for other in &ranges {
                let disjoint = range.offset + range.size <= other.offset
                    || other.offset + other.size <= range.offset;
                assert!(disjoint, "{range:?} overlaps {other:?}");
            }
            ranges.push(range);
        }
        assert_eq!(staging.temporary_count(), 0);
        assert!(ranges.iter().all(|r| r.buffer == ranges[0].buffer));
    }

    #[test]
    fn test_oversized_request_uses_temporary_buffer() {
        let device = HeadlessDevice::default();
        let mut staging = StagingAllocator::new(&device, 256, 0, 0).unwrap();

        let big = staging.allocate(&device, 1000, 16).unwrap();
        assert_eq!(big.offset, 0);
        assert_eq!(big.size, 1000);
        assert_eq!(staging.used(), 0);
        assert!(device.buffer_exists(big.buffer));

        assert_eq!(staging.reset(&device), 1);
        assert!(!device.buffer_exists(big.buffer));
        assert!(staging.is_empty());
    }

    #[test]
    fn test_exhausted_ring_falls_back_and_rewinds() {
        let device = HeadlessDevice::default();
        let mut staging = StagingAllocator::new(&device, 128, 0, 0).unwrap();
        staging.allocate(&device, 100, 0).unwrap();
        assert!(!staging.fits(64, 0));

        let spill = staging.allocate(&device, 64, 0).unwrap();
        assert_eq!(staging.temporary_count(), 1);
        staging.reset(&device);
        assert!(staging.fits(128, 0));
        assert!(!device.buffer_exists(spill.buffer));
    }

    #[test]
    fn test_range_writes_are_bounds_checked() {
        let device = HeadlessDevice::default();
        let mut staging = StagingAllocator::new(&device, 64, 0, 0).unwrap();
        staging.allocate(&device, 8, 0).unwrap();
        let range = staging.allocate(&device, 8, 0).unwrap();

        range.write(&device, 4, &[9, 9, 9, 9]).unwrap();
        assert_eq!(range.write(&device, 6, &[0; 4]), Err(ResourceError::OutOfBounds));
        assert_eq!(range.read(&device, 0, 8).unwrap(), vec![0, 0, 0, 0, 9, 9, 9, 9]);
        assert!(range.slice(4, 8).is_none());
        assert_eq!(range.slice(2, 4).unwrap().offset, 10);
    }
}

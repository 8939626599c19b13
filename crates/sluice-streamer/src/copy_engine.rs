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

//! Per-node upload queue with a ring of resource sets.

use crate::staging::{StagingAllocator, StagingRange};
use sluice_core::device::{
    BufferId, CommandListId, DeviceCapabilities, FenceId, FenceStatus, GraphicsDevice, QueueId,
    QueueType, ResourceError, TextureFormat,
};
use sluice_core::utils::round_up;
use sluice_core::LoaderConfig;

/// Alignment of one texture sub-resource of `format` inside staging memory:
/// the device's sub-resource alignment rounded to the block size, then to
/// the row alignment. `None` if that overflows.
pub fn subresource_alignment(caps: &DeviceCapabilities, format: TextureFormat) -> Option<u32> {
    let block = format.block_bytes().max(1);
    round_up(
        round_up(caps.upload_subresource_alignment.max(1), block)?,
        caps.upload_row_alignment.max(1),
    )
}

/// Lifecycle of one resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetState {
    /// Ready to record.
    Idle,
    /// Commands are being recorded.
    Recording,
    /// Handed to the queue, fence not yet observed.
    Submitted,
}

/// One rotation slot: command list, staging ring and completion fence.
#[derive(Debug)]
struct ResourceSet {
    cmd: CommandListId,
    fence: FenceId,
    staging: StagingAllocator,
    state: SetState,
}

/// Owns a transfer queue and `buffer_count` resource sets for one node.
///
/// At most one set records at a time. A set is only reused after
/// [`CopyEngine::wait_and_reset`] observed its fence.
#[derive(Debug)]
pub struct CopyEngine {
    node_index: u32,
    queue: QueueId,
    sets: Vec<ResourceSet>,
    staging_size: u64,
    caps: DeviceCapabilities,
    last_fence: Option<FenceId>,
}

impl CopyEngine {
    /// Creates the queue and every resource set for `node_index`.
    ///
    /// # Arguments
    ///
    /// * `device` - The device owning the queue.
    /// * `node_index` - The node the engine uploads to.
    /// * `config` - Staging ring size and number of resource sets.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if any device object cannot be created.
    pub fn new(
        device: &dyn GraphicsDevice,
        node_index: u32,
        config: &LoaderConfig,
    ) -> Result<Self, ResourceError> {
        let caps = device.capabilities();
        let ring_alignment = round_up(
            caps.upload_subresource_alignment.max(1),
            caps.upload_row_alignment.max(1),
        )
        .ok_or_else(|| ResourceError::InvalidState("upload alignments overflow".into()))?;
        let staging_size = config.effective_staging_size();

        let queue = device.create_queue(node_index, QueueType::Transfer)?;
        let mut sets = Vec::with_capacity(config.buffer_count as usize);
        for _ in 0..config.buffer_count {
            let cmd = device.create_command_list(queue)?;
            let fence = device.create_fence(node_index)?;
            let staging =
                StagingAllocator::new(device, staging_size, ring_alignment, node_index)?;
            sets.push(ResourceSet {
                cmd,
                fence,
                staging,
                state: SetState::Idle,
            });
        }

        log::debug!(
            "CopyEngine: node {} ready with {} set(s) of {} bytes",
            node_index,
            sets.len(),
            staging_size
        );

        Ok(Self {
            node_index,
            queue,
            sets,
            staging_size,
            caps,
            last_fence: None,
        })
    }

    /// Node this engine uploads to.
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    /// Number of resource sets in the ring.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Ring capacity of each set.
    pub fn staging_size(&self) -> u64 {
        self.staging_size
    }

    /// Capabilities of the device the engine was created on.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    /// Current state of `set`.
    pub fn set_state(&self, set: usize) -> SetState {
        self.sets[set].state
    }

    /// `true` while any set is recording.
    pub fn is_recording(&self) -> bool {
        self.sets.iter().any(|s| s.state == SetState::Recording)
    }

    /// Fence of the most recent submission.
    pub fn last_fence_submitted(&self) -> Option<FenceId> {
        self.last_fence
    }

    /// Staging allocator of `set`, for inspection.
    pub fn staging(&self, set: usize) -> &StagingAllocator {
        &self.sets[set].staging
    }

    /// Returns the command list of `set`, beginning it if it is not
    /// recording yet. Calling it again in the same rotation is a no-op.
    pub fn acquire_command_list(
        &mut self,
        device: &dyn GraphicsDevice,
        set: usize,
    ) -> Result<CommandListId, ResourceError> {
        debug_assert!(
            self.sets
                .iter()
                .enumerate()
                .all(|(i, s)| i == set || s.state != SetState::Recording),
            "another resource set is still recording"
        );
        let slot = &mut self.sets[set];
        if slot.state != SetState::Recording {
            device.reset_command_list(slot.cmd)?;
            device.begin_recording(slot.cmd)?;
            slot.state = SetState::Recording;
        }
        Ok(slot.cmd)
    }

    /// Staging memory from `set`, spilling into a temporary buffer when the
    /// ring is exhausted.
    pub fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        set: usize,
        size: u64,
        alignment: u32,
    ) -> Result<StagingRange, ResourceError> {
        self.sets[set].staging.allocate(device, size, alignment)
    }

    /// Like [`CopyEngine::allocate`], but refuses to spill once `set` already
    /// handed out memory this rotation. `None` means "retry next rotation".
    pub fn try_allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        set: usize,
        size: u64,
        alignment: u32,
    ) -> Result<Option<StagingRange>, ResourceError> {
        let staging = &mut self.sets[set].staging;
        if !staging.fits(size, alignment) && !staging.is_empty() {
            return Ok(None);
        }
        staging.allocate(device, size, alignment).map(Some)
    }

    /// Hands an upload buffer to `set`; it is destroyed on the set's next reset.
    pub fn adopt_temporary(&mut self, set: usize, buffer: BufferId) {
        self.sets[set].staging.adopt(buffer);
    }

    /// Ends recording on `set` and submits it, signalling the set's fence.
    /// Does nothing if the set is not recording.
    pub fn flush(&mut self, device: &dyn GraphicsDevice, set: usize) -> Result<(), ResourceError> {
        let slot = &mut self.sets[set];
        if slot.state != SetState::Recording {
            return Ok(());
        }
        // A failed submission leaves the set idle; its list is reset on the
        // next acquire.
        slot.state = SetState::Idle;
        device.end_recording(slot.cmd)?;
        device.submit(self.queue, slot.cmd, Some(slot.fence))?;
        slot.state = SetState::Submitted;
        self.last_fence = Some(slot.fence);
        Ok(())
    }

    /// Checks the fence of `set`, blocking until it signals when `blocking`.
    /// Returns whether the set's work is complete.
    pub fn wait(
        &self,
        device: &dyn GraphicsDevice,
        set: usize,
        blocking: bool,
    ) -> Result<bool, ResourceError> {
        let slot = &self.sets[set];
        if slot.state != SetState::Submitted {
            return Ok(true);
        }
        let complete = device.fence_status(slot.fence)? == FenceStatus::Complete;
        if !complete && blocking {
            device.wait_fence(slot.fence)?;
            return Ok(true);
        }
        Ok(complete)
    }

    /// Rewinds the staging ring of `set` and destroys its temporary buffers.
    /// Returns how many temporaries were destroyed.
    pub fn reset(&mut self, device: &dyn GraphicsDevice, set: usize) -> usize {
        let slot = &mut self.sets[set];
        debug_assert!(slot.state != SetState::Recording, "reset while recording");
        slot.state = SetState::Idle;
        slot.staging.reset(device)
    }

    /// [`CopyEngine::wait`] followed by [`CopyEngine::reset`] once complete.
    /// Returns `None` if the set is still in flight, otherwise how many
    /// temporaries were destroyed.
    pub fn wait_and_reset(
        &mut self,
        device: &dyn GraphicsDevice,
        set: usize,
        blocking: bool,
    ) -> Result<Option<usize>, ResourceError> {
        if self.wait(device, set, blocking)? {
            Ok(Some(self.reset(device, set)))
        } else {
            Ok(None)
        }
    }

    /// Flushes `active`, drains the queue and resets every set.
    pub fn wait_idle(&mut self, device: &dyn GraphicsDevice, active: usize) -> Result<(), ResourceError> {
        self.flush(device, active)?;
        device.wait_queue_idle(self.queue)?;
        for set in 0..self.sets.len() {
            self.wait(device, set, true)?;
            self.reset(device, set);
        }
        Ok(())
    }

    /// Releases every device object owned by the engine.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        for slot in self.sets {
            slot.staging.destroy(device);
            if let Err(e) = device.destroy_command_list(slot.cmd) {
                log::error!("CopyEngine: failed to destroy command list: {e}");
            }
            if let Err(e) = device.destroy_fence(slot.fence) {
                log::error!("CopyEngine: failed to destroy fence: {e}");
            }
        }
        if let Err(e) = device.destroy_queue(self.queue) {
            log::error!("CopyEngine: failed to destroy queue: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_infra::HeadlessDevice;

    fn engine(device: &HeadlessDevice, staging: u64, sets: u32) -> CopyEngine {
        let config = LoaderConfig {
            staging_buffer_size: staging,
            buffer_count: sets,
            single_threaded: false,
        };
        CopyEngine::new(device, 0, &config).unwrap()
    }

    #[test]
    fn test_set_lifecycle() {
        let device = HeadlessDevice::default();
        let mut engine = engine(&device, 1024, 2);
        assert_eq!(engine.set_state(1), SetState::Idle);

        let first = engine.acquire_command_list(&device, 1).unwrap();
        let again = engine.acquire_command_list(&device, 1).unwrap();
        assert_eq!(first, again);
        assert!(engine.is_recording());

        engine.flush(&device, 1).unwrap();
        assert_eq!(engine.set_state(1), SetState::Submitted);
        assert!(engine.last_fence_submitted().is_some());

        assert_eq!(engine.wait_and_reset(&device, 1, false).unwrap(), Some(0));
        assert_eq!(engine.set_state(1), SetState::Idle);
        engine.destroy(&device);
        assert_eq!(device.stats().live_buffers, 0);
    }

    #[test]
    fn test_in_flight_set_is_not_reset_without_blocking() {
        let device = HeadlessDevice::default();
        let mut engine = engine(&device, 1024, 2);
        device.set_paused(true);

        engine.acquire_command_list(&device, 0).unwrap();
        engine.flush(&device, 0).unwrap();
        assert_eq!(engine.wait_and_reset(&device, 0, false).unwrap(), None);
        assert_eq!(engine.set_state(0), SetState::Submitted);

        device.release_submissions();
        assert_eq!(engine.wait_and_reset(&device, 0, false).unwrap(), Some(0));
    }

    #[test]
    fn test_sixteen_megabytes_against_eight_megabyte_ring() {
        let device = HeadlessDevice::default();
        let mut engine = engine(&device, 8 << 20, 2);

        let range = engine.allocate(&device, 1, 16 << 20, 16).unwrap();
        assert_eq!(range.size, 16 << 20);
        assert_eq!(engine.staging(1).temporary_count(), 1);
        assert_eq!(engine.staging(1).used(), 0);
        assert!(device.buffer_exists(range.buffer));

        // The other set is untouched by the reset of set 0.
        engine.wait_and_reset(&device, 0, true).unwrap();
        assert!(device.buffer_exists(range.buffer));

        assert_eq!(engine.wait_and_reset(&device, 1, true).unwrap(), Some(1));
        assert!(!device.buffer_exists(range.buffer));
        assert_eq!(engine.staging(1).temporary_count(), 0);

        // A later request of the same size gets a fresh buffer.
        let next = engine.allocate(&device, 1, 16 << 20, 16).unwrap();
        assert_ne!(next.buffer, range.buffer);
    }

    #[test]
    fn test_try_allocate_refuses_second_spill() {
        let device = HeadlessDevice::default();
        let mut engine = engine(&device, 256, 2);

        assert!(engine.try_allocate(&device, 0, 1000, 0).unwrap().is_some());
        assert!(engine.try_allocate(&device, 0, 1000, 0).unwrap().is_none());
        assert!(engine.try_allocate(&device, 1, 64, 0).unwrap().is_some());
        assert!(engine.try_allocate(&device, 1, 1000, 0).unwrap().is_none());
    }

    #[test]
    fn test_subresource_alignment_respects_block_size() {
        let mut caps = DeviceCapabilities::default();
        assert_eq!(subresource_alignment(&caps, TextureFormat::Rgba8Unorm), Some(512));
        caps.upload_subresource_alignment = 4;
        caps.upload_row_alignment = 1;
        assert_eq!(subresource_alignment(&caps, TextureFormat::Rgba32Float), Some(16));
        assert_eq!(subresource_alignment(&caps, TextureFormat::Bc1RgbaUnorm), Some(8));
    }
}

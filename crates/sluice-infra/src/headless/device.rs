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

use super::commands::{BufferEntry, RecordedCommand, Storage, TextureEntry};
use sluice_core::device::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Construction parameters of a [`HeadlessDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessDeviceDesc {
    /// Number of simulated nodes.
    pub node_count: u32,
    /// Row pitch alignment reported to uploaders.
    pub upload_row_alignment: u32,
    /// Sub-resource alignment reported to uploaders.
    pub upload_subresource_alignment: u32,
    /// Buffer copy alignment reported to uploaders.
    pub upload_buffer_alignment: u32,
    /// Report CPU and GPU memory as shared.
    pub unified_memory: bool,
    /// Report that resource states need explicit barriers.
    pub manual_barriers: bool,
}

impl Default for HeadlessDeviceDesc {
    fn default() -> Self {
        let caps = DeviceCapabilities::default();
        Self {
            node_count: caps.node_count,
            upload_row_alignment: caps.upload_row_alignment,
            upload_subresource_alignment: caps.upload_subresource_alignment,
            upload_buffer_alignment: caps.upload_buffer_alignment,
            unified_memory: caps.unified_memory,
            manual_barriers: caps.manual_barriers,
        }
    }
}

/// Counters exposed for tests and tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlessStats {
    /// Buffers currently alive.
    pub live_buffers: usize,
    /// Textures currently alive.
    pub live_textures: usize,
    /// Command lists submitted since creation.
    pub submissions: u64,
    /// Commands executed since creation.
    pub executed_commands: u64,
    /// Bytes moved by copy commands since creation.
    pub bytes_copied: u64,
    /// Buffer barriers recorded from a state the buffer was not in.
    pub mismatched_barriers: u64,
}

#[derive(Debug)]
struct QueueEntry {
    node_index: u32,
    #[allow(dead_code)]
    ty: QueueType,
}

#[derive(Debug)]
struct CommandListEntry {
    queue: QueueId,
    recording: bool,
    commands: Vec<RecordedCommand>,
}

#[derive(Debug)]
struct FenceEntry {
    #[allow(dead_code)]
    node_index: u32,
    submitted: u64,
    completed: u64,
}

/// A submission waiting for [`HeadlessDevice::release_submissions`].
#[derive(Debug)]
struct HeldSubmission {
    queue: QueueId,
    commands: Vec<RecordedCommand>,
    signal: Option<FenceId>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    storage: Storage,
    queues: HashMap<QueueId, QueueEntry>,
    command_lists: HashMap<CommandListId, CommandListEntry>,
    fences: HashMap<FenceId, FenceEntry>,
    held: VecDeque<HeldSubmission>,
    paused: bool,
    fence_waiters: usize,
    stats: HeadlessStats,
    /// Host writes still allowed before they start failing.
    write_budget: Option<u64>,
    fail_copy_recording: bool,
}

/// The internal, non-clonable state of the [`HeadlessDevice`].
#[derive(Debug)]
struct HeadlessDeviceInternal {
    caps: DeviceCapabilities,
    state: Mutex<HeadlessState>,
    /// Signalled whenever submissions execute.
    executed: Condvar,
    next_id: AtomicU64,
}

/// A clonable, thread-safe handle to a device that lives in CPU memory.
///
/// Submissions execute synchronously inside [`GraphicsDevice::submit`],
/// unless the device is paused with [`HeadlessDevice::set_paused`]. While
/// paused, submissions queue up and their fences stay unsignalled until
/// [`HeadlessDevice::release_submissions`] runs them.
#[derive(Clone, Debug)]
pub struct HeadlessDevice {
    internal: Arc<HeadlessDeviceInternal>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessDeviceDesc::default())
    }
}

impl HeadlessDevice {
    /// Creates a device with the given properties.
    pub fn new(desc: HeadlessDeviceDesc) -> Self {
        Self {
            internal: Arc::new(HeadlessDeviceInternal {
                caps: DeviceCapabilities {
                    node_count: desc.node_count.max(1),
                    upload_row_alignment: desc.upload_row_alignment,
                    upload_subresource_alignment: desc.upload_subresource_alignment,
                    upload_buffer_alignment: desc.upload_buffer_alignment,
                    unified_memory: desc.unified_memory,
                    manual_barriers: desc.manual_barriers,
                },
                state: Mutex::new(HeadlessState::default()),
                executed: Condvar::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.internal.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HeadlessState>, ResourceError> {
        self.internal
            .state
            .lock()
            .map_err(|e| ResourceError::BackendError(format!("HeadlessDevice state poisoned: {e}")))
    }

    fn check_node(&self, node_index: u32) -> Result<(), ResourceError> {
        if node_index < self.internal.caps.node_count {
            Ok(())
        } else {
            Err(ResourceError::InvalidHandle)
        }
    }

    fn cpu_visible(&self, memory_usage: MemoryUsage) -> bool {
        memory_usage.is_host_visible() || self.internal.caps.unified_memory
    }

    /// Holds (`true`) or executes (`false`) future submissions.
    /// Unpausing also runs every held submission.
    pub fn set_paused(&self, paused: bool) {
        if let Ok(mut state) = self.lock() {
            state.paused = paused;
            if !paused {
                Self::execute_held(&mut state);
                self.internal.executed.notify_all();
            }
        }
    }

    /// Executes every held submission and signals their fences, leaving the
    /// device paused.
    pub fn release_submissions(&self) {
        if let Ok(mut state) = self.lock() {
            Self::execute_held(&mut state);
            self.internal.executed.notify_all();
        }
    }

    /// Executes the oldest held submission and signals its fence. Returns
    /// `false` when nothing is held.
    pub fn release_oldest_submission(&self) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        let Some(held) = state.held.pop_front() else {
            return false;
        };
        Self::execute(&mut state, &held.commands, held.signal);
        self.internal.executed.notify_all();
        true
    }

    /// Lets the next `count` host writes through and fails every later one,
    /// until called again. `None` lifts the limit.
    pub fn fail_writes_after(&self, count: Option<u64>) {
        if let Ok(mut state) = self.lock() {
            state.write_budget = count;
        }
    }

    /// Makes recording of buffer to buffer copies fail.
    pub fn fail_copy_recording(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_copy_recording = fail;
        }
    }

    /// Number of submissions currently held.
    pub fn held_submissions(&self) -> usize {
        self.lock().map(|s| s.held.len()).unwrap_or(0)
    }

    /// Number of threads blocked in [`GraphicsDevice::wait_fence`] or
    /// [`GraphicsDevice::wait_queue_idle`].
    pub fn fence_waiters(&self) -> usize {
        self.lock().map(|s| s.fence_waiters).unwrap_or(0)
    }

    /// Snapshot of the device counters.
    pub fn stats(&self) -> HeadlessStats {
        self.lock()
            .map(|s| HeadlessStats {
                mismatched_barriers: s.storage.mismatched_barriers,
                ..s.stats
            })
            .unwrap_or_default()
    }

    /// `true` while `id` refers to a live buffer.
    pub fn buffer_exists(&self, id: BufferId) -> bool {
        self.lock()
            .map(|s| s.storage.buffers.contains_key(&id))
            .unwrap_or(false)
    }

    /// Full contents of any buffer, host-visible or not.
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        let state = self.lock().ok()?;
        state.storage.buffers.get(&id).map(|b| b.data.clone())
    }

    /// Tracked state of a buffer.
    pub fn buffer_state(&self, id: BufferId) -> Option<ResourceState> {
        let state = self.lock().ok()?;
        state.storage.buffers.get(&id).map(|b| b.state)
    }

    /// Barriers executed on a buffer as `(from, to)` pairs, oldest first.
    pub fn buffer_barriers(&self, id: BufferId) -> Vec<(ResourceState, ResourceState)> {
        self.lock()
            .ok()
            .and_then(|s| s.storage.buffers.get(&id).map(|b| b.barriers.clone()))
            .unwrap_or_default()
    }

    /// Tightly packed texels of one sub-resource.
    pub fn texture_subresource(&self, id: TextureId, mip: u32, layer: u32) -> Option<Vec<u8>> {
        let state = self.lock().ok()?;
        let texture = state.storage.textures.get(&id)?;
        let index = texture.index(mip, layer)?;
        Some(texture.subresources[index].clone())
    }

    /// Tracked state of a texture.
    pub fn texture_state(&self, id: TextureId) -> Option<ResourceState> {
        let state = self.lock().ok()?;
        state.storage.textures.get(&id).map(|t| t.state)
    }

    fn execute_held(state: &mut HeadlessState) {
        while let Some(held) = state.held.pop_front() {
            Self::execute(state, &held.commands, held.signal);
        }
    }

    fn execute(state: &mut HeadlessState, commands: &[RecordedCommand], signal: Option<FenceId>) {
        for command in commands {
            match state.storage.execute(command) {
                Ok(bytes) => {
                    state.stats.executed_commands += 1;
                    state.stats.bytes_copied += bytes;
                }
                Err(e) => log::error!("HeadlessDevice: dropped {command:?}: {e}"),
            }
        }
        if let Some(fence) = signal.and_then(|f| state.fences.get_mut(&f)) {
            fence.completed += 1;
        }
    }

    fn record(&self, cmd: CommandListId, command: RecordedCommand) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        state.storage.validate(&command)?;
        let list = state
            .command_lists
            .get_mut(&cmd)
            .ok_or(ResourceError::NotFound)?;
        if !list.recording {
            return Err(ResourceError::InvalidState(format!(
                "command list {cmd:?} is not recording"
            )));
        }
        list.commands.push(command);
        Ok(())
    }

    fn wait_while(
        &self,
        mut pending: impl FnMut(&HeadlessState) -> Result<bool, ResourceError>,
    ) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        while pending(&*state)? {
            state.fence_waiters += 1;
            let next = self.internal.executed.wait(state);
            state = next
                .map_err(|e| ResourceError::BackendError(format!("HeadlessDevice wait: {e}")))?;
            state.fence_waiters -= 1;
        }
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.internal.caps
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.check_node(descriptor.node_index)?;
        let size = usize::try_from(descriptor.size)
            .map_err(|_| ResourceError::BackendError("buffer too large".into()))?;
        let id = BufferId(self.next_id());
        let entry = BufferEntry {
            info: BufferInfo {
                size: descriptor.size,
                usage: descriptor.usage,
                memory_usage: descriptor.memory_usage,
                start_state: descriptor.start_state,
                node_index: descriptor.node_index,
            },
            data: vec![0u8; size],
            state: descriptor.start_state,
            barriers: Vec::new(),
        };
        let mut state = self.lock()?;
        state.storage.buffers.insert(id, entry);
        state.stats.live_buffers += 1;
        log::trace!(
            "HeadlessDevice: buffer {:?} ({} bytes, {:?})",
            id,
            descriptor.size,
            descriptor.label
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        state
            .storage
            .buffers
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        state.stats.live_buffers -= 1;
        Ok(())
    }

    fn buffer_info(&self, id: BufferId) -> Result<BufferInfo, ResourceError> {
        let state = self.lock()?;
        state
            .storage
            .buffers
            .get(&id)
            .map(|b| b.info)
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        match state.write_budget {
            Some(0) => {
                return Err(ResourceError::BackendError("injected write failure".into()));
            }
            Some(left) => state.write_budget = Some(left - 1),
            None => {}
        }
        let buffer = state
            .storage
            .buffers
            .get_mut(&id)
            .ok_or(ResourceError::NotFound)?;
        if !self.cpu_visible(buffer.info.memory_usage) {
            return Err(ResourceError::InvalidState(format!(
                "buffer {id:?} is not host-visible"
            )));
        }
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|end| *end <= buffer.data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        buffer.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, len: u64) -> Result<Vec<u8>, ResourceError> {
        let state = self.lock()?;
        let buffer = state
            .storage
            .buffers
            .get(&id)
            .ok_or(ResourceError::NotFound)?;
        if !self.cpu_visible(buffer.info.memory_usage) {
            return Err(ResourceError::InvalidState(format!(
                "buffer {id:?} is not host-visible"
            )));
        }
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|end| *end <= buffer.data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        Ok(buffer.data[start..end].to_vec())
    }

    fn set_buffer_state(&self, id: BufferId, new_state: ResourceState) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        let buffer = state
            .storage
            .buffers
            .get_mut(&id)
            .ok_or(ResourceError::NotFound)?;
        buffer.state = new_state;
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        self.check_node(descriptor.node_index)?;
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.mip_levels == 0 {
            return Err(ResourceError::InvalidState("empty texture extent".into()));
        }
        let entry = TextureEntry::new(TextureInfo {
            width: descriptor.width,
            height: descriptor.height,
            depth: descriptor.depth.max(1),
            array_layers: descriptor.array_layers.max(1),
            mip_levels: descriptor.mip_levels,
            format: descriptor.format,
            node_index: descriptor.node_index,
        })?;
        let id = TextureId(self.next_id());
        let mut state = self.lock()?;
        state.storage.textures.insert(id, entry);
        state.stats.live_textures += 1;
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        state
            .storage
            .textures
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        state.stats.live_textures -= 1;
        Ok(())
    }

    fn texture_info(&self, id: TextureId) -> Result<TextureInfo, ResourceError> {
        let state = self.lock()?;
        state
            .storage
            .textures
            .get(&id)
            .map(|t| t.info)
            .ok_or(ResourceError::NotFound)
    }

    fn create_queue(&self, node_index: u32, ty: QueueType) -> Result<QueueId, ResourceError> {
        self.check_node(node_index)?;
        let id = QueueId(self.next_id());
        self.lock()?
            .queues
            .insert(id, QueueEntry { node_index, ty });
        Ok(id)
    }

    fn destroy_queue(&self, id: QueueId) -> Result<(), ResourceError> {
        self.lock()?
            .queues
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_list(&self, queue: QueueId) -> Result<CommandListId, ResourceError> {
        let mut state = self.lock()?;
        if !state.queues.contains_key(&queue) {
            return Err(ResourceError::InvalidHandle);
        }
        let id = CommandListId(self.next_id());
        state.command_lists.insert(
            id,
            CommandListEntry {
                queue,
                recording: false,
                commands: Vec::new(),
            },
        );
        Ok(id)
    }

    fn destroy_command_list(&self, id: CommandListId) -> Result<(), ResourceError> {
        self.lock()?
            .command_lists
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn reset_command_list(&self, id: CommandListId) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        let list = state
            .command_lists
            .get_mut(&id)
            .ok_or(ResourceError::NotFound)?;
        list.commands.clear();
        list.recording = false;
        Ok(())
    }

    fn begin_recording(&self, id: CommandListId) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        let list = state
            .command_lists
            .get_mut(&id)
            .ok_or(ResourceError::NotFound)?;
        if list.recording {
            return Err(ResourceError::InvalidState(format!(
                "command list {id:?} is already recording"
            )));
        }
        list.recording = true;
        Ok(())
    }

    fn end_recording(&self, id: CommandListId) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        let list = state
            .command_lists
            .get_mut(&id)
            .ok_or(ResourceError::NotFound)?;
        if !list.recording {
            return Err(ResourceError::InvalidState(format!(
                "command list {id:?} is not recording"
            )));
        }
        list.recording = false;
        Ok(())
    }

    fn create_fence(&self, node_index: u32) -> Result<FenceId, ResourceError> {
        self.check_node(node_index)?;
        let id = FenceId(self.next_id());
        self.lock()?.fences.insert(
            id,
            FenceEntry {
                node_index,
                submitted: 0,
                completed: 0,
            },
        );
        Ok(id)
    }

    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        self.lock()?
            .fences
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn fence_status(&self, id: FenceId) -> Result<FenceStatus, ResourceError> {
        let state = self.lock()?;
        let fence = state.fences.get(&id).ok_or(ResourceError::NotFound)?;
        Ok(if fence.completed >= fence.submitted {
            FenceStatus::Complete
        } else {
            FenceStatus::Incomplete
        })
    }

    fn wait_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        self.wait_while(|state| {
            let fence = state.fences.get(&id).ok_or(ResourceError::NotFound)?;
            Ok(fence.completed < fence.submitted)
        })
    }

    fn submit(
        &self,
        queue: QueueId,
        cmd: CommandListId,
        signal: Option<FenceId>,
    ) -> Result<(), ResourceError> {
        let mut state = self.lock()?;
        let queue_node = state
            .queues
            .get(&queue)
            .map(|q| q.node_index)
            .ok_or(ResourceError::InvalidHandle)?;
        let list = state
            .command_lists
            .get(&cmd)
            .ok_or(ResourceError::NotFound)?;
        if list.recording {
            return Err(ResourceError::InvalidState(format!(
                "command list {cmd:?} submitted while recording"
            )));
        }
        if list.queue != queue {
            return Err(ResourceError::InvalidHandle);
        }
        let commands = list.commands.clone();
        if let Some(fence_id) = signal {
            let fence = state
                .fences
                .get_mut(&fence_id)
                .ok_or(ResourceError::NotFound)?;
            fence.submitted += 1;
        }
        state.stats.submissions += 1;
        log::trace!(
            "HeadlessDevice: submit {} command(s) on node {}",
            commands.len(),
            queue_node
        );

        if state.paused {
            state.held.push_back(HeldSubmission {
                queue,
                commands,
                signal,
            });
        } else {
            Self::execute(&mut state, &commands, signal);
            self.internal.executed.notify_all();
        }
        Ok(())
    }

    fn wait_queue_idle(&self, queue: QueueId) -> Result<(), ResourceError> {
        self.wait_while(|state| Ok(state.held.iter().any(|h| h.queue == queue)))
    }

    fn cmd_copy_buffer(
        &self,
        cmd: CommandListId,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), ResourceError> {
        if self.lock()?.fail_copy_recording {
            return Err(ResourceError::BackendError("injected copy failure".into()));
        }
        self.record(
            cmd,
            RecordedCommand::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            },
        )
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        cmd: CommandListId,
        src: BufferId,
        dst: TextureId,
        region: &SubresourceCopy,
    ) -> Result<(), ResourceError> {
        self.record(
            cmd,
            RecordedCommand::BufferToTexture {
                src,
                dst,
                region: *region,
            },
        )
    }

    fn cmd_copy_texture_to_buffer(
        &self,
        cmd: CommandListId,
        src: TextureId,
        dst: BufferId,
        region: &SubresourceCopy,
    ) -> Result<(), ResourceError> {
        self.record(
            cmd,
            RecordedCommand::TextureToBuffer {
                src,
                dst,
                region: *region,
            },
        )
    }

    fn cmd_resource_barrier(
        &self,
        cmd: CommandListId,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
    ) -> Result<(), ResourceError> {
        self.record(
            cmd,
            RecordedCommand::Barrier {
                buffers: buffers.to_vec(),
                textures: textures.to_vec(),
            },
        )
    }
}

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

use crate::device::api::*;
use crate::device::error::ResourceError;
use std::fmt::Debug;

/// A graphics device as seen by the resource streamer.
///
/// Every object is referenced through an opaque handle. Commands recorded
/// into a command list take effect only once the list is submitted, and the
/// optional fence passed to [`GraphicsDevice::submit`] signals when they have
/// executed.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Static properties of the device.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Number of device nodes (linked GPUs).
    fn node_count(&self) -> u32 {
        self.capabilities().node_count
    }

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to be destroyed.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Properties the buffer was created with.
    fn buffer_info(&self, id: BufferId) -> Result<BufferInfo, ResourceError>;

    /// Writes data to a host-visible buffer (or any buffer on a unified
    /// memory device).
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to.
    /// * `offset` - The offset in the buffer where the data will be written.
    /// * `data` - A slice of bytes containing the data to be written.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the write does not fit in the buffer.
    /// * `ResourceError::InvalidState` - If the CPU cannot reach the buffer's memory.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Reads `len` bytes back from a host-visible buffer.
    fn read_buffer(&self, id: BufferId, offset: u64, len: u64) -> Result<Vec<u8>, ResourceError>;

    /// Records the state a buffer is in, for backends that transition
    /// resources automatically.
    fn set_buffer_state(&self, id: BufferId, state: ResourceState) -> Result<(), ResourceError>;

    /// Creates a new GPU texture.
    /// ## Arguments
    /// * `descriptor` - A reference to a `TextureDescriptor` containing the texture configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created texture or an error if the creation fails.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Properties the texture was created with.
    fn texture_info(&self, id: TextureId) -> Result<TextureInfo, ResourceError>;

    /// Creates a queue on `node_index`.
    fn create_queue(&self, node_index: u32, ty: QueueType) -> Result<QueueId, ResourceError>;

    /// Destroys a queue. Pending submissions must have completed.
    fn destroy_queue(&self, id: QueueId) -> Result<(), ResourceError>;

    /// Creates a command list (with its allocator pool) that submits to `queue`.
    fn create_command_list(&self, queue: QueueId) -> Result<CommandListId, ResourceError>;

    /// Destroys a command list.
    fn destroy_command_list(&self, id: CommandListId) -> Result<(), ResourceError>;

    /// Releases every command recorded into the list's pool.
    fn reset_command_list(&self, id: CommandListId) -> Result<(), ResourceError>;

    /// Starts recording into a command list.
    /// ## Errors
    /// * `ResourceError::InvalidState` - If the list is already recording.
    fn begin_recording(&self, id: CommandListId) -> Result<(), ResourceError>;

    /// Stops recording. The list can then be submitted.
    fn end_recording(&self, id: CommandListId) -> Result<(), ResourceError>;

    /// Creates an unsignalled fence on `node_index`.
    fn create_fence(&self, node_index: u32) -> Result<FenceId, ResourceError>;

    /// Destroys a fence.
    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Non-blocking fence query.
    fn fence_status(&self, id: FenceId) -> Result<FenceStatus, ResourceError>;

    /// Blocks until every submission signalling `id` has executed.
    fn wait_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Submits a recorded command list.
    /// ## Arguments
    /// * `queue` - The queue executing the commands.
    /// * `cmd` - A command list that finished recording.
    /// * `signal` - An optional fence signalled once the commands have executed.
    fn submit(
        &self,
        queue: QueueId,
        cmd: CommandListId,
        signal: Option<FenceId>,
    ) -> Result<(), ResourceError>;

    /// Blocks until every submission made to `queue` has executed.
    fn wait_queue_idle(&self, queue: QueueId) -> Result<(), ResourceError>;

    /// Records a buffer to buffer copy of `size` bytes.
    fn cmd_copy_buffer(
        &self,
        cmd: CommandListId,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), ResourceError>;

    /// Records a copy from a linear buffer region into one texture sub-resource.
    fn cmd_copy_buffer_to_texture(
        &self,
        cmd: CommandListId,
        src: BufferId,
        dst: TextureId,
        region: &SubresourceCopy,
    ) -> Result<(), ResourceError>;

    /// Records a copy from one texture sub-resource into a linear buffer region.
    fn cmd_copy_texture_to_buffer(
        &self,
        cmd: CommandListId,
        src: TextureId,
        dst: BufferId,
        region: &SubresourceCopy,
    ) -> Result<(), ResourceError>;

    /// Records resource state transitions.
    fn cmd_resource_barrier(
        &self,
        cmd: CommandListId,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
    ) -> Result<(), ResourceError>;
}

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

//! Queues, command lists, fences and the resource-state vocabulary used by
//! copy commands.

use super::buffer::BufferId;
use super::texture::TextureId;
use crate::sluice_bitflags;
use bytemuck::{Pod, Zeroable};

/// An opaque handle to a device queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub u64);

/// An opaque handle to a command list together with its allocator pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListId(pub u64);

/// An opaque handle to a CPU-waitable fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub u64);

/// The kind of work a queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Graphics, compute and copy.
    Graphics,
    /// Copy only.
    Transfer,
}

/// Result of a non-blocking fence query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// Every submission that signals the fence has finished, or nothing was
    /// ever submitted with it.
    Complete,
    /// A submission signalling the fence is still executing.
    Incomplete,
}

sluice_bitflags! {
    /// Usage state of a resource as seen by barriers.
    pub struct ResourceState: u32 {
        /// Contents are undefined (freshly created resource).
        const UNDEFINED = 0;
        /// Generic state usable by any queue.
        const COMMON = 1 << 0;
        /// Source of copy commands.
        const COPY_SOURCE = 1 << 1;
        /// Destination of copy commands.
        const COPY_DEST = 1 << 2;
        /// Read by shaders.
        const SHADER_RESOURCE = 1 << 3;
        /// Bound as vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 4;
        /// Bound as index buffer.
        const INDEX_BUFFER = 1 << 5;
        /// Read/write access from shaders.
        const UNORDERED_ACCESS = 1 << 6;
    }
}

/// A state transition for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    /// Buffer being transitioned.
    pub buffer: BufferId,
    /// State before the barrier.
    pub from: ResourceState,
    /// State after the barrier.
    pub to: ResourceState,
}

/// A state transition for every sub-resource of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    /// Texture being transitioned.
    pub texture: TextureId,
    /// State before the barrier.
    pub from: ResourceState,
    /// State after the barrier.
    pub to: ResourceState,
}

/// Placement of one texture sub-resource inside a linear buffer.
///
/// Rows are `row_pitch` bytes apart and depth slices `slice_pitch` bytes
/// apart, starting at `buffer_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceCopy {
    /// Mip level of the texture.
    pub mip_level: u32,
    /// Array layer of the texture.
    pub array_layer: u32,
    /// Byte offset of the first row inside the buffer.
    pub buffer_offset: u64,
    /// Distance between two rows, in bytes.
    pub row_pitch: u32,
    /// Distance between two depth slices, in bytes.
    pub slice_pitch: u32,
}

/// Arguments of an indexed draw, laid out for indirect submission.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct DrawIndexedArgs {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances.
    pub instance_count: u32,
    /// First index inside the index buffer.
    pub start_index: u32,
    /// Value added to every index before fetching vertices.
    pub vertex_offset: i32,
    /// First instance.
    pub start_instance: u32,
}

/// Static properties of a device that shape how uploads are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Number of nodes (linked GPUs) exposed by the device.
    pub node_count: u32,
    /// Alignment of row pitches inside upload buffers.
    pub upload_row_alignment: u32,
    /// Alignment of each sub-resource inside upload buffers.
    pub upload_subresource_alignment: u32,
    /// Alignment of buffer copy offsets inside upload buffers.
    pub upload_buffer_alignment: u32,
    /// CPU and GPU share memory, so GPU-only buffers are host-visible.
    pub unified_memory: bool,
    /// Resource states must be transitioned with explicit barriers.
    pub manual_barriers: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            node_count: 1,
            upload_row_alignment: 256,
            upload_subresource_alignment: 512,
            upload_buffer_alignment: 16,
            unified_memory: false,
            manual_barriers: true,
        }
    }
}

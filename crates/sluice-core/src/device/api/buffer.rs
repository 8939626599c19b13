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

//! Defines data structures related to GPU buffer resources.

use super::command::ResourceState;
use crate::sluice_bitflags;
use std::borrow::Cow;

sluice_bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    pub struct BufferUsage: u32 {
        /// The buffer can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The buffer can be used as the destination of a copy operation.
        const COPY_DST = 1 << 1;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 2;
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 3;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 4;
        /// The buffer can be bound as a read/write storage buffer.
        const STORAGE = 1 << 5;
    }
}

/// Where the memory backing a buffer lives and who can touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    /// Device-local memory, only reachable through copy commands on
    /// discrete-memory devices.
    #[default]
    GpuOnly,
    /// Host-visible memory written by the CPU and read by the GPU.
    CpuToGpu,
    /// Host-visible memory written by the GPU and read back by the CPU.
    GpuToCpu,
    /// Host memory used as a copy source (staging).
    CpuOnly,
}

impl MemoryUsage {
    /// `true` if the CPU can write the memory directly.
    pub const fn is_host_visible(self) -> bool {
        !matches!(self, MemoryUsage::GpuOnly)
    }
}

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// How the buffer will be used.
    pub usage: BufferUsage,
    /// Which memory pool backs the buffer.
    pub memory_usage: MemoryUsage,
    /// State the buffer is expected to be in once its contents are ready.
    pub start_state: ResourceState,
    /// Device node the buffer lives on.
    pub node_index: u32,
    /// Required placement alignment, `0` for the device default.
    pub alignment: u32,
}

impl Default for BufferDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            usage: BufferUsage::EMPTY,
            memory_usage: MemoryUsage::GpuOnly,
            start_state: ResourceState::UNDEFINED,
            node_index: 0,
            alignment: 0,
        }
    }
}

impl BufferDescriptor<'_> {
    /// Host-visible staging memory of `size` bytes on `node_index`.
    pub fn staging(size: u64, node_index: u32) -> BufferDescriptor<'static> {
        BufferDescriptor {
            label: Some(Cow::Borrowed("staging")),
            size,
            usage: BufferUsage::COPY_SRC,
            memory_usage: MemoryUsage::CpuOnly,
            start_state: ResourceState::COPY_SOURCE,
            node_index,
            alignment: 0,
        }
    }
}

/// Properties of an existing buffer, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Size in bytes.
    pub size: u64,
    /// Usage flags it was created with.
    pub usage: BufferUsage,
    /// Memory pool backing it.
    pub memory_usage: MemoryUsage,
    /// Start state requested at creation.
    pub start_state: ResourceState,
    /// Device node owning it.
    pub node_index: u32,
}

/// Picks the state a buffer should rest in from its usage flags.
pub fn determine_buffer_start_state(usage: BufferUsage) -> ResourceState {
    let mut state = ResourceState::UNDEFINED;
    if usage.intersects(BufferUsage::VERTEX | BufferUsage::UNIFORM) {
        state |= ResourceState::VERTEX_AND_CONSTANT_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        state |= ResourceState::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        state |= ResourceState::UNORDERED_ACCESS;
    }
    if state.is_empty() {
        ResourceState::COMMON
    } else {
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_state_follows_usage() {
        assert_eq!(
            determine_buffer_start_state(BufferUsage::VERTEX | BufferUsage::COPY_DST),
            ResourceState::VERTEX_AND_CONSTANT_BUFFER
        );
        assert_eq!(
            determine_buffer_start_state(BufferUsage::INDEX | BufferUsage::STORAGE),
            ResourceState::INDEX_BUFFER | ResourceState::UNORDERED_ACCESS
        );
        assert_eq!(
            determine_buffer_start_state(BufferUsage::COPY_DST),
            ResourceState::COMMON
        );
    }

    #[test]
    fn staging_descriptor_is_host_visible() {
        let desc = BufferDescriptor::staging(1024, 1);
        assert!(desc.memory_usage.is_host_visible());
        assert_eq!(desc.node_index, 1);
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
    }
}

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

//! Upload requests as queued for the streaming thread.

use crate::desc::{Geometry, GeometryLoadFlags, ResourceSlot, TextureContainer, TextureCopyDesc};
use crate::staging::StagingRange;
use sluice_core::device::{
    BufferId, ResourceState, TextureCreationFlags, TextureId, VertexLayout,
};
use std::fmt;
use std::path::PathBuf;

/// A state transition with no data attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Move a buffer into `state`.
    Buffer {
        /// Buffer transitioned.
        buffer: BufferId,
        /// Target state.
        state: ResourceState,
    },
    /// Move a texture into `state`.
    Texture {
        /// Texture transitioned.
        texture: TextureId,
        /// Target state.
        state: ResourceState,
    },
}

/// One unit of work for the streaming thread.
#[derive(Debug)]
pub enum UploadRequest {
    /// Copy a filled staging range into a buffer.
    UpdateBuffer {
        /// Destination buffer.
        buffer: BufferId,
        /// Destination offset.
        dst_offset: u64,
        /// State the buffer is in when the copy executes.
        state: ResourceState,
        /// Source bytes.
        range: StagingRange,
    },
    /// Copy filled, pitched staging memory into texture sub-resources.
    UpdateTexture {
        /// Destination texture.
        texture: TextureId,
        /// Source bytes, laid out with the device's row and sub-resource
        /// alignment.
        range: StagingRange,
        /// First mip written.
        base_mip: u32,
        /// Number of mips written.
        mip_levels: u32,
        /// First layer written.
        base_layer: u32,
        /// Number of layers written.
        layer_count: u32,
    },
    /// Transition a resource with no copy.
    UpdateResourceState(StateTransition),
    /// Create a texture from a container file and stream its texels.
    LoadTexture {
        /// File to read.
        path: PathBuf,
        /// Container used to choose the parser.
        container: TextureContainer,
        /// Creation modifiers.
        creation_flags: TextureCreationFlags,
        /// Node the texture lives on.
        node_index: u32,
        /// Receives the texture.
        slot: ResourceSlot<TextureId>,
    },
    /// Create vertex and index buffers from a geometry file.
    LoadGeometry {
        /// File to read.
        path: PathBuf,
        /// Layout of the vertex buffers.
        layout: VertexLayout,
        /// Load options.
        flags: GeometryLoadFlags,
        /// Node the buffers live on.
        node_index: u32,
        /// Receives the geometry.
        slot: ResourceSlot<Geometry>,
    },
    /// Copy a texture sub-resource into a buffer.
    CopyTexture(TextureCopyDesc),
}

/// Discriminant of an [`UploadRequest`], used in logs and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// [`UploadRequest::UpdateBuffer`]
    UpdateBuffer,
    /// [`UploadRequest::UpdateTexture`]
    UpdateTexture,
    /// [`UploadRequest::UpdateResourceState`]
    UpdateResourceState,
    /// [`UploadRequest::LoadTexture`]
    LoadTexture,
    /// [`UploadRequest::LoadGeometry`]
    LoadGeometry,
    /// [`UploadRequest::CopyTexture`]
    CopyTexture,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::UpdateBuffer => "update buffer",
            RequestKind::UpdateTexture => "update texture",
            RequestKind::UpdateResourceState => "state transition",
            RequestKind::LoadTexture => "load texture",
            RequestKind::LoadGeometry => "load geometry",
            RequestKind::CopyTexture => "copy texture",
        };
        f.write_str(name)
    }
}

impl UploadRequest {
    /// Discriminant of the request.
    pub fn kind(&self) -> RequestKind {
        match self {
            UploadRequest::UpdateBuffer { .. } => RequestKind::UpdateBuffer,
            UploadRequest::UpdateTexture { .. } => RequestKind::UpdateTexture,
            UploadRequest::UpdateResourceState(_) => RequestKind::UpdateResourceState,
            UploadRequest::LoadTexture { .. } => RequestKind::LoadTexture,
            UploadRequest::LoadGeometry { .. } => RequestKind::LoadGeometry,
            UploadRequest::CopyTexture(_) => RequestKind::CopyTexture,
        }
    }

    /// `true` for requests that read a file and allocate their own staging
    /// memory, and may therefore be retried.
    pub fn is_load(&self) -> bool {
        matches!(
            self,
            UploadRequest::LoadTexture { .. } | UploadRequest::LoadGeometry { .. }
        )
    }
}

/// A request together with its place in its lane.
#[derive(Debug)]
pub struct QueuedRequest {
    /// The work itself.
    pub request: UploadRequest,
    /// Position in the lane's counter, `0` when no token was handed out.
    pub wait_index: u64,
    /// Dedicated upload buffer owned by the request. It is handed to the
    /// active resource set once dispatched, or destroyed at shutdown.
    pub upload_buffer: Option<BufferId>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadResult {
    /// Commands were recorded.
    Completed,
    /// Not enough staging memory this rotation; retry on the next one.
    StagingBufferFull,
    /// The request cannot succeed and was dropped.
    InvalidRequest,
}

impl UploadResult {
    /// `true` unless the request has to be retried.
    pub fn is_resolved(self) -> bool {
        !matches!(self, UploadResult::StagingBufferFull)
    }
}

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

//! Descriptors handed to [`crate::ResourceLoader`] and the values it fills.

use sluice_core::device::{
    BufferDescriptor, BufferId, DrawIndexedArgs, IndexType, ResourceState, TextureCreationFlags,
    TextureDescriptor, TextureId, VertexLayout, MAX_VERTEX_BINDINGS,
};
use sluice_core::sluice_bitflags;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Creation of a buffer with optional initial contents.
#[derive(Debug, Clone, Default)]
pub struct BufferLoadDesc<'a> {
    /// The buffer to create.
    pub desc: BufferDescriptor<'a>,
    /// Bytes copied to the start of the buffer.
    pub data: Option<&'a [u8]>,
    /// Zero-fill the buffer when `data` is `None`.
    pub force_reset: bool,
}

/// Texture container format a file is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureContainer {
    /// The platform default, DirectDraw Surface.
    #[default]
    Default,
    /// DirectDraw Surface (`.dds`).
    Dds,
    /// Khronos texture 1.1 (`.ktx`).
    Ktx,
}

impl TextureContainer {
    /// File extension of the container, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            TextureContainer::Default | TextureContainer::Dds => "dds",
            TextureContainer::Ktx => "ktx",
        }
    }

    /// `path` with the container extension appended when it has none.
    pub fn resolve(self, path: &Path) -> PathBuf {
        if path.extension().is_some() {
            path.to_path_buf()
        } else {
            path.with_extension(self.extension())
        }
    }
}

/// A texture loaded from a container file, or created empty from a
/// descriptor.
#[derive(Debug, Clone, Default)]
pub struct TextureLoadDesc<'a> {
    /// Container to stream texels from.
    pub file_name: Option<PathBuf>,
    /// Texture to create when there is no file.
    pub desc: Option<TextureDescriptor<'a>>,
    /// Container used to pick the parser.
    pub container: TextureContainer,
    /// Modifiers applied to the file's texture.
    pub creation_flags: TextureCreationFlags,
    /// Node the texture is created on.
    pub node_index: u32,
}

impl TextureLoadDesc<'_> {
    /// Loads `path` on node 0.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_name: Some(path.into()),
            ..Self::default()
        }
    }
}

sluice_bitflags! {
    /// Options of a geometry load.
    pub struct GeometryLoadFlags: u32 {
        /// Keep a CPU copy of indices, positions and normals.
        const SHADOWED = 1 << 0;
        /// Create the buffers with storage usage as well.
        const STRUCTURED_BUFFERS = 1 << 1;
    }
}

/// A geometry loaded from a glTF or GLB file.
#[derive(Debug, Clone)]
pub struct GeometryLoadDesc {
    /// Path of the container.
    pub file_name: PathBuf,
    /// Layout the vertex buffers are filled with.
    pub vertex_layout: VertexLayout,
    /// Load options.
    pub flags: GeometryLoadFlags,
    /// Node the buffers are created on.
    pub node_index: u32,
}

/// CPU copy of the data a geometry was built from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryShadow {
    /// Index data as uploaded.
    pub indices: Vec<u8>,
    /// Positions in their source format.
    pub positions: Vec<u8>,
    /// Normals in their source format, empty if the file had none.
    pub normals: Vec<u8>,
}

/// GPU buffers and draw metadata of a loaded geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Index buffer shared by every primitive.
    pub index_buffer: BufferId,
    /// One vertex buffer per used binding.
    pub vertex_buffers: Vec<BufferId>,
    /// Stride of each vertex buffer.
    pub vertex_strides: [u32; MAX_VERTEX_BINDINGS],
    /// Width of the indices.
    pub index_type: IndexType,
    /// Total index count.
    pub index_count: u32,
    /// Total vertex count.
    pub vertex_count: u32,
    /// One entry per primitive.
    pub draw_args: Vec<DrawIndexedArgs>,
    /// Joints over all skins.
    pub joint_count: u32,
    /// One matrix per joint.
    pub inverse_bind_poses: Vec<[[f32; 4]; 4]>,
    /// Present when loaded with [`GeometryLoadFlags::SHADOWED`].
    pub shadow: Option<GeometryShadow>,
}

/// A texture sub-resource copied into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyDesc {
    /// Texture read from.
    pub texture: TextureId,
    /// Buffer written to.
    pub buffer: BufferId,
    /// Mip level copied.
    pub mip_level: u32,
    /// Array layer copied.
    pub array_layer: u32,
    /// Destination offset inside `buffer`.
    pub buffer_offset: u64,
    /// State the texture is in before and after the copy.
    pub texture_state: ResourceState,
}

/// Shared cell filled by the streaming thread once a resource exists.
///
/// A slot stays empty when the request was invalid.
#[derive(Debug)]
pub struct ResourceSlot<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for ResourceSlot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for ResourceSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> ResourceSlot<T> {
    /// An empty slot.
    pub fn empty() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    /// A slot holding `value` already.
    pub fn ready(value: T) -> Self {
        Self(Arc::new(Mutex::new(Some(value))))
    }

    /// `true` once the resource was created.
    pub fn is_ready(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Moves the value out, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Applies `f` to the value in place.
    pub fn map<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .map(f)
    }

    pub(crate) fn fill(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

impl<T: Clone> ResourceSlot<T> {
    /// A copy of the value, if ready.
    pub fn get(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

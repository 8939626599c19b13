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

//! Defines data structures related to GPU textures.

use super::command::ResourceState;
use super::format::TextureFormat;
use crate::sluice_bitflags;
use std::borrow::Cow;

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

sluice_bitflags! {
    /// A set of flags describing how a texture will be used.
    pub struct TextureUsage: u32 {
        /// The texture can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The texture can be used as the destination of a copy operation.
        const COPY_DST = 1 << 1;
        /// The texture can be sampled in a shader.
        const SAMPLED = 1 << 2;
        /// The texture can be written as a storage image.
        const STORAGE = 1 << 3;
    }
}

sluice_bitflags! {
    /// Creation modifiers applied before the texture is created.
    pub struct TextureCreationFlags: u32 {
        /// Use the sRGB variant of the texel format when one exists.
        const SRGB = 1 << 0;
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Width of mip 0 in texels.
    pub width: u32,
    /// Height of mip 0 in texels.
    pub height: u32,
    /// Depth of mip 0 in texels (`1` for 2D textures).
    pub depth: u32,
    /// Number of array layers. Cubemaps count six layers per cube.
    pub array_layers: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// The layers form cube faces.
    pub is_cubemap: bool,
    /// How the texture will be used.
    pub usage: TextureUsage,
    /// State the texture rests in once its contents are ready.
    pub start_state: ResourceState,
    /// Device node the texture lives on.
    pub node_index: u32,
    /// Creation modifiers.
    pub flags: TextureCreationFlags,
}

impl Default for TextureDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            depth: 1,
            array_layers: 1,
            mip_levels: 1,
            format: TextureFormat::Undefined,
            is_cubemap: false,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
            start_state: ResourceState::UNDEFINED,
            node_index: 0,
            flags: TextureCreationFlags::EMPTY,
        }
    }
}

/// Properties of an existing texture, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    /// Width of mip 0.
    pub width: u32,
    /// Height of mip 0.
    pub height: u32,
    /// Depth of mip 0.
    pub depth: u32,
    /// Number of array layers.
    pub array_layers: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Device node owning it.
    pub node_index: u32,
}

/// Picks the state a texture should rest in from its usage flags.
pub fn determine_texture_start_state(usage: TextureUsage) -> ResourceState {
    if usage.contains(TextureUsage::STORAGE) {
        ResourceState::UNORDERED_ACCESS
    } else if usage.contains(TextureUsage::SAMPLED) {
        ResourceState::SHADER_RESOURCE
    } else {
        ResourceState::COMMON
    }
}

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

//! Texture container header parsers.
//!
//! A parser reads just enough of a container to describe the texture, then
//! leaves the stream on the first texel. The uploader pulls rows from there.

mod dds;
mod ktx;

pub use dds::DdsParser;
pub use ktx::KtxParser;

use crate::error::{ContainerError, Result};
use crate::stream::FileStream;
use sluice_core::device::TextureFormat;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// What a container header says about the texture it stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Width of mip 0.
    pub width: u32,
    /// Height of mip 0.
    pub height: u32,
    /// Depth of mip 0, at least one.
    pub depth: u32,
    /// Mip levels stored, at least one.
    pub mip_levels: u32,
    /// Array layers stored, cube faces included.
    pub array_layers: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// The layers are cube faces.
    pub is_cubemap: bool,
    /// Data is ordered mip by mip, each mip holding every layer.
    /// Otherwise it is ordered layer by layer, each layer holding every mip.
    pub mips_after_slice: bool,
    /// Each mip starts with a `u32` byte count that must be skipped.
    pub mip_size_prefix: bool,
}

/// Decodes the header of one texture container format.
pub trait TextureContainerParser: Send + Sync + Debug {
    /// File extension the container is stored under, without the dot.
    fn extension(&self) -> &'static str;

    /// Reads the header from the start of `stream`.
    /// ## Returns
    /// The texture description. On success the stream is positioned on the
    /// first byte of texel data.
    fn parse_header(&self, stream: &mut FileStream) -> Result<ContainerInfo>;
}

/// Maps file extensions to container parsers.
#[derive(Debug, Clone)]
pub struct ContainerRegistry {
    parsers: HashMap<String, Arc<dyn TextureContainerParser>>,
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(DdsParser));
        registry.register(Arc::new(KtxParser));
        registry
    }
}

impl ContainerRegistry {
    /// A registry with no parser.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registers `parser` under its extension, replacing any previous one.
    pub fn register(&mut self, parser: Arc<dyn TextureContainerParser>) {
        self.parsers
            .insert(parser.extension().to_ascii_lowercase(), parser);
    }

    /// Parser for `extension`, case-insensitive.
    pub fn get(&self, extension: &str) -> Result<Arc<dyn TextureContainerParser>> {
        self.parsers
            .get(&extension.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                log::warn!(
                    "ContainerRegistry: no parser for '{extension}' among {} registered",
                    self.parsers.len()
                );
                ContainerError::UnknownContainer(extension.to_owned())
            })
    }
}

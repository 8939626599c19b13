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

use sluice_core::device::ResourceError;
use sluice_core::ConfigError;
use thiserror::Error;

/// Errors reported synchronously by [`crate::ResourceLoader`] calls.
///
/// Failures that happen on the streaming thread never surface here; they
/// resolve the request as invalid and leave its slot empty.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The loader configuration was rejected.
    #[error("invalid loader configuration: {0}")]
    Config(#[from] ConfigError),
    /// The device refused to create or access a resource.
    #[error("device error: {0}")]
    Device(#[from] ResourceError),
    /// The request targets a node the device does not expose.
    #[error("node {node} out of range, device has {count} node(s)")]
    UnknownNode {
        /// Requested node.
        node: u32,
        /// Nodes exposed by the device.
        count: u32,
    },
    /// A scoped update does not fit in its destination.
    #[error("update of {size} bytes at offset {offset} exceeds capacity {capacity}")]
    UpdateOutOfBounds {
        /// First byte written.
        offset: u64,
        /// Bytes written.
        size: u64,
        /// Size of the destination.
        capacity: u64,
    },
    /// The texture has no such mip level or array layer.
    #[error("texture has no sub-resource at mip {mip}, layer {layer}")]
    InvalidSubresource {
        /// Mip level requested.
        mip: u32,
        /// Array layer requested.
        layer: u32,
    },
    /// A texture load carries neither a file name nor a descriptor.
    #[error("texture load needs a file name or a descriptor")]
    EmptyTextureLoad,
    /// The loader has been shut down.
    #[error("resource loader is shut down")]
    ShutDown,
    /// The streaming thread could not be started.
    #[error("failed to spawn streaming thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A result type.
pub type Result<T, E = LoaderError> = std::result::Result<T, E>;

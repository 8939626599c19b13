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

//! # Sluice IO
//!
//! Everything the streamer reads from disk goes through this crate:
//!
//! ```text
//!   path ──► FileStream ──► TextureContainerParser ──► ContainerInfo + texel rows
//!   path ──► gltf / glb ──► GeometrySource (indices + raw attribute streams)
//! ```
//!
//! Texture parsers only decode headers. They leave the stream positioned on
//! the first texel so the uploader can copy rows straight into staging memory.

#![warn(missing_docs)]

pub mod error;
pub mod geometry;
pub mod stream;
pub mod texture;

pub use error::ContainerError;
pub use geometry::{load_geometry, GeometrySource, PrimitiveSource, VertexStream};
pub use stream::FileStream;
pub use texture::{ContainerInfo, ContainerRegistry, TextureContainerParser};

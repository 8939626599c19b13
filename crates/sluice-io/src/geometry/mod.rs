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

//! Geometry containers decoded into per-primitive attribute streams.
//!
//! The decoder does not choose a vertex layout. It hands raw, tightly packed
//! attribute bytes to the uploader, which repacks them into the layout the
//! caller asked for.

mod gltf_source;

pub use gltf_source::{load_geometry, parse_gltf};

use sluice_core::device::{VertexFormat, VertexSemantic};

/// One attribute of one primitive, tightly packed.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexStream {
    /// What the attribute means.
    pub semantic: VertexSemantic,
    /// Format of each element in `data`.
    pub format: VertexFormat,
    /// Raw elements, `vertex_count * format.size()` bytes.
    pub data: Vec<u8>,
}

impl VertexStream {
    /// Size of one element in bytes.
    pub fn stride(&self) -> u32 {
        self.format.size()
    }
}

/// A drawable subset of the geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveSource {
    /// Indices local to this primitive.
    pub indices: Vec<u32>,
    /// Number of vertices referenced by the indices.
    pub vertex_count: u32,
    /// The attributes found for this primitive.
    pub streams: Vec<VertexStream>,
}

impl PrimitiveSource {
    /// The stream carrying `semantic`, if any.
    pub fn stream(&self, semantic: VertexSemantic) -> Option<&VertexStream> {
        self.streams.iter().find(|s| s.semantic == semantic)
    }
}

/// Everything a geometry container holds that the uploader needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometrySource {
    /// Primitives in file order.
    pub primitives: Vec<PrimitiveSource>,
    /// Joints summed over every skin.
    pub joint_count: u32,
    /// One column-major matrix per joint.
    pub inverse_bind_poses: Vec<[[f32; 4]; 4]>,
}

impl GeometrySource {
    /// Total index count over all primitives.
    pub fn index_count(&self) -> u32 {
        self.primitives.iter().map(|p| p.indices.len() as u32).sum()
    }

    /// Total vertex count over all primitives.
    pub fn vertex_count(&self) -> u32 {
        self.primitives.iter().map(|p| p.vertex_count).sum()
    }

    /// Source format of `semantic`, taken from the first primitive that has it.
    pub fn stream_format(&self, semantic: VertexSemantic) -> Option<VertexFormat> {
        self.primitives
            .iter()
            .find_map(|p| p.stream(semantic))
            .map(|s| s.format)
    }
}

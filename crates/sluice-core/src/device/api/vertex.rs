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

//! Vertex layouts requested by geometry loads.

/// Maximum number of vertex buffer bindings a layout can reference.
pub const MAX_VERTEX_BINDINGS: usize = 8;

/// Meaning of a vertex attribute, used to match layout entries with the
/// attributes found in a geometry container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexSemantic {
    /// Object-space position.
    Position,
    /// Surface normal.
    Normal,
    /// Tangent with handedness.
    Tangent,
    /// Vertex color.
    Color,
    /// Skinning joint indices.
    Joints,
    /// Skinning weights.
    Weights,
    /// First texture coordinate set.
    TexCoord0,
    /// Second texture coordinate set.
    TexCoord1,
}

/// Describes the data type and size of a single vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Two 8-bit unsigned integers.
    Uint8x2,
    /// Four 8-bit unsigned integers.
    Uint8x4,
    /// Four 8-bit unsigned normalized integers.
    Unorm8x4,
    /// Two 16-bit unsigned integers.
    Uint16x2,
    /// Four 16-bit unsigned integers.
    Uint16x4,
    /// Two 16-bit unsigned normalized integers.
    Unorm16x2,
    /// Four 16-bit unsigned normalized integers.
    Unorm16x4,
    /// Two 16-bit floats.
    Float16x2,
    /// Four 16-bit floats.
    Float16x4,
    /// One 32-bit float.
    Float32,
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// One 32-bit unsigned integer.
    Uint32,
}

impl VertexFormat {
    /// Returns the size in bytes of the vertex format.
    pub const fn size(&self) -> u32 {
        match self {
            VertexFormat::Uint8x2 => 2,
            VertexFormat::Uint8x4 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Uint16x2 | VertexFormat::Unorm16x2 | VertexFormat::Float16x2 => 4,
            VertexFormat::Uint16x4 | VertexFormat::Unorm16x4 | VertexFormat::Float16x4 => 8,
            VertexFormat::Float32 | VertexFormat::Uint32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One attribute of a [`VertexLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttrib {
    /// Which container attribute feeds this entry.
    pub semantic: VertexSemantic,
    /// Format written into the vertex buffer.
    pub format: VertexFormat,
    /// Vertex buffer binding.
    pub binding: u32,
    /// Byte offset inside one vertex of that binding.
    pub offset: u32,
}

/// A set of attributes spread over one or more vertex buffer bindings.
///
/// The stride of each binding is the furthest `offset + size` among its
/// attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    /// The attributes, in any order.
    pub attributes: Vec<VertexAttrib>,
}

impl VertexLayout {
    /// Appends an attribute packed right after the previous one on the same
    /// binding.
    #[must_use]
    pub fn with(mut self, semantic: VertexSemantic, format: VertexFormat, binding: u32) -> Self {
        let offset = self.binding_stride(binding);
        self.attributes.push(VertexAttrib {
            semantic,
            format,
            binding,
            offset,
        });
        self
    }

    /// Byte stride of `binding`, `0` if it has no attribute.
    pub fn binding_stride(&self, binding: u32) -> u32 {
        self.attributes
            .iter()
            .filter(|a| a.binding == binding)
            .map(|a| a.offset + a.format.size())
            .max()
            .unwrap_or(0)
    }

    /// Number of bindings used, i.e. the highest binding index plus one.
    pub fn binding_count(&self) -> usize {
        self.attributes
            .iter()
            .map(|a| a.binding as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Width of the indices stored in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    U32,
}

impl IndexType {
    /// Size in bytes of one index.
    pub const fn size(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

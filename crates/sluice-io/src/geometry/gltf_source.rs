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

//! glTF 2.0 (`.gltf` and `.glb`) decoding with embedded, data-URI and
//! external buffers.

use super::{GeometrySource, PrimitiveSource, VertexStream};
use crate::error::{ContainerError, Result};
use base64::Engine;
use gltf::mesh::util::ReadJoints;
use gltf::Buffer;
use sluice_core::device::{VertexFormat, VertexSemantic};
use std::path::Path;

/// Reads and decodes the glTF or GLB file at `path`.
///
/// External buffers are resolved relative to the file's directory.
pub fn load_geometry(path: &Path) -> Result<GeometrySource> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension != "gltf" && extension != "glb" {
        log::warn!("Geometry: {} is neither glTF nor GLB", path.display());
        return Err(ContainerError::UnknownContainer(extension));
    }
    let bytes = std::fs::read(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    parse_gltf(&bytes, base_dir)
}

/// Decodes an in-memory glTF document or GLB container.
pub fn parse_gltf(bytes: &[u8], base_dir: &Path) -> Result<GeometrySource> {
    let gltf = gltf::Gltf::from_slice(bytes)?;
    let buffer_data = load_buffer_data(&gltf, base_dir)?;
    let get_buffer_data = |buffer: Buffer<'_>| buffer_data.get(buffer.index()).map(Vec::as_slice);

    let mut source = GeometrySource::default();
    for mesh in gltf.document.meshes() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(get_buffer_data);

            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or(ContainerError::MissingAttribute("POSITION"))?
                .collect();
            let vertex_count = positions.len() as u32;

            let mut streams = vec![stream_of(
                VertexSemantic::Position,
                VertexFormat::Float32x3,
                &positions,
            )];
            if let Some(normals) = reader.read_normals() {
                let normals: Vec<[f32; 3]> = normals.collect();
                streams.push(stream_of(VertexSemantic::Normal, VertexFormat::Float32x3, &normals));
            }
            if let Some(tangents) = reader.read_tangents() {
                let tangents: Vec<[f32; 4]> = tangents.collect();
                streams.push(stream_of(VertexSemantic::Tangent, VertexFormat::Float32x4, &tangents));
            }
            if let Some(colors) = reader.read_colors(0) {
                let colors: Vec<[f32; 4]> = colors.into_rgba_f32().collect();
                streams.push(stream_of(VertexSemantic::Color, VertexFormat::Float32x4, &colors));
            }
            for (set, semantic) in [(0, VertexSemantic::TexCoord0), (1, VertexSemantic::TexCoord1)] {
                if let Some(uvs) = reader.read_tex_coords(set) {
                    let uvs: Vec<[f32; 2]> = uvs.into_f32().collect();
                    streams.push(stream_of(semantic, VertexFormat::Float32x2, &uvs));
                }
            }
            match reader.read_joints(0) {
                Some(ReadJoints::U8(joints)) => {
                    let joints: Vec<[u8; 4]> = joints.collect();
                    streams.push(stream_of(VertexSemantic::Joints, VertexFormat::Uint8x4, &joints));
                }
                Some(ReadJoints::U16(joints)) => {
                    let joints: Vec<[u16; 4]> = joints.collect();
                    streams.push(stream_of(VertexSemantic::Joints, VertexFormat::Uint16x4, &joints));
                }
                None => {}
            }
            if let Some(weights) = reader.read_weights(0) {
                let weights: Vec<[f32; 4]> = weights.into_f32().collect();
                streams.push(stream_of(VertexSemantic::Weights, VertexFormat::Float32x4, &weights));
            }

            for stream in &streams {
                let count = stream.data.len() as u32 / stream.stride();
                if count != vertex_count {
                    return Err(ContainerError::InvalidHeader(format!(
                        "attribute {:?} has {count} elements, POSITION has {vertex_count}",
                        stream.semantic
                    )));
                }
            }

            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertex_count).collect(),
            };

            source.primitives.push(PrimitiveSource {
                indices,
                vertex_count,
                streams,
            });
        }
    }

    for skin in gltf.document.skins() {
        let joints = skin.joints().count();
        source.joint_count += joints as u32;
        let reader = skin.reader(get_buffer_data);
        match reader.read_inverse_bind_matrices() {
            Some(matrices) => source.inverse_bind_poses.extend(matrices.take(joints)),
            None => source
                .inverse_bind_poses
                .extend(std::iter::repeat(IDENTITY).take(joints)),
        }
    }

    Ok(source)
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

fn stream_of<T: bytemuck::Pod>(
    semantic: VertexSemantic,
    format: VertexFormat,
    elements: &[T],
) -> VertexStream {
    VertexStream {
        semantic,
        format,
        data: bytemuck::cast_slice(elements).to_vec(),
    }
}

fn load_buffer_data(gltf: &gltf::Gltf, base_dir: &Path) -> Result<Vec<Vec<u8>>> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf.blob.as_deref().ok_or_else(|| {
                    ContainerError::UnresolvedBuffer("GLB binary chunk is missing".into())
                })?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    buffer_data.push(decode_data_uri(uri)?);
                } else {
                    let path = base_dir.join(uri);
                    let bytes = std::fs::read(&path).map_err(|e| {
                        ContainerError::UnresolvedBuffer(format!("{}: {e}", path.display()))
                    })?;
                    buffer_data.push(bytes);
                }
            }
        }
        if buffer_data.last().map_or(0, Vec::len) < buffer.length() {
            return Err(ContainerError::UnresolvedBuffer(format!(
                "buffer {} shorter than its declared {} bytes",
                buffer.index(),
                buffer.length()
            )));
        }
    }
    Ok(buffer_data)
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let payload = uri
        .strip_prefix("data:application/octet-stream;base64,")
        .or_else(|| uri.strip_prefix("data:application/gltf-buffer;base64,"))
        .ok_or_else(|| ContainerError::UnresolvedBuffer(format!("unsupported data URI {uri:.48}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ContainerError::UnresolvedBuffer(e.to_string()))
}

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

use super::buffer::{resting_state, update_buffer};
use super::packing::{select_packing, Packing};
use super::UploadContext;
use crate::desc::{Geometry, GeometryLoadFlags, GeometryShadow, ResourceSlot};
use crate::request::UploadResult;
use crate::staging::StagingRange;
use anyhow::{bail, ensure, Context};
use sluice_core::device::{
    BufferDescriptor, BufferId, BufferUsage, DrawIndexedArgs, GraphicsDevice, IndexType,
    MemoryUsage, ResourceState, VertexAttrib, VertexFormat, VertexLayout, VertexSemantic,
    MAX_VERTEX_BINDINGS,
};
use sluice_core::utils::round_up_u64;
use sluice_io::{GeometrySource, PrimitiveSource};
use std::borrow::Cow;
use std::path::Path;

/// How one layout attribute is filled.
#[derive(Debug, Clone, Copy)]
struct AttributePlan {
    attrib: VertexAttrib,
    /// `None` for texture coordinates missing from the file, left zeroed.
    source: Option<(VertexFormat, Packing)>,
}

/// CPU-side index and vertex data, ready to upload.
struct PackedGeometry {
    index_type: IndexType,
    indices: Vec<u8>,
    vertices: Vec<Vec<u8>>,
    strides: [u32; MAX_VERTEX_BINDINGS],
    draw_args: Vec<DrawIndexedArgs>,
}

fn is_texcoord(semantic: VertexSemantic) -> bool {
    matches!(semantic, VertexSemantic::TexCoord0 | VertexSemantic::TexCoord1)
}

fn plan_attributes(
    source: &GeometrySource,
    layout: &VertexLayout,
) -> anyhow::Result<Vec<AttributePlan>> {
    ensure!(!layout.attributes.is_empty(), "vertex layout has no attribute");
    ensure!(
        layout.binding_count() <= MAX_VERTEX_BINDINGS,
        "vertex layout uses {} bindings, at most {MAX_VERTEX_BINDINGS} are supported",
        layout.binding_count()
    );
    layout
        .attributes
        .iter()
        .map(|attrib| {
            let source = match source.stream_format(attrib.semantic) {
                Some(format) => {
                    let packing = select_packing(format, attrib.format).with_context(|| {
                        format!(
                            "cannot convert {:?} from {format:?} to {:?}",
                            attrib.semantic, attrib.format
                        )
                    })?;
                    Some((format, packing))
                }
                None if is_texcoord(attrib.semantic) => None,
                None => bail!("geometry has no {:?} attribute", attrib.semantic),
            };
            Ok(AttributePlan {
                attrib: *attrib,
                source,
            })
        })
        .collect()
}

fn pack_primitive(
    primitive: &PrimitiveSource,
    plans: &[AttributePlan],
    strides: &[u32; MAX_VERTEX_BINDINGS],
    base_vertex: u32,
    vertices: &mut [Vec<u8>],
) -> anyhow::Result<()> {
    for plan in plans {
        let Some((format, packing)) = plan.source else {
            continue;
        };
        let Some(stream) = primitive.stream(plan.attrib.semantic) else {
            ensure!(
                is_texcoord(plan.attrib.semantic),
                "a primitive has no {:?} attribute",
                plan.attrib.semantic
            );
            continue;
        };
        ensure!(
            stream.format == format,
            "{:?} changes format between primitives",
            plan.attrib.semantic
        );
        let src_stride = format.size() as usize;
        let dst_stride = strides[plan.attrib.binding as usize] as usize;
        let dst = &mut vertices[plan.attrib.binding as usize];
        for (v, element) in stream.data.chunks_exact(src_stride).enumerate() {
            let at = (base_vertex as usize + v) * dst_stride + plan.attrib.offset as usize;
            packing.apply(element, &mut dst[at..at + plan.attrib.format.size() as usize]);
        }
    }
    Ok(())
}

fn pack_geometry(source: &GeometrySource, layout: &VertexLayout) -> anyhow::Result<PackedGeometry> {
    let plans = plan_attributes(source, layout)?;
    let vertex_count = source.vertex_count();
    ensure!(vertex_count > 0, "geometry has no vertex");

    let index_type = if vertex_count > u32::from(u16::MAX) {
        IndexType::U32
    } else {
        IndexType::U16
    };

    let mut strides = [0u32; MAX_VERTEX_BINDINGS];
    for (binding, stride) in strides.iter_mut().enumerate().take(layout.binding_count()) {
        *stride = layout.binding_stride(binding as u32);
    }
    let mut vertices: Vec<Vec<u8>> = strides[..layout.binding_count()]
        .iter()
        .map(|&stride| vec![0u8; stride as usize * vertex_count as usize])
        .collect();

    let mut indices = Vec::with_capacity(source.index_count() as usize * index_type.size() as usize);
    let mut draw_args = Vec::with_capacity(source.primitives.len());
    let mut base_vertex = 0u32;
    for primitive in &source.primitives {
        draw_args.push(DrawIndexedArgs {
            index_count: primitive.indices.len() as u32,
            instance_count: 1,
            start_index: (indices.len() / index_type.size() as usize) as u32,
            vertex_offset: base_vertex as i32,
            start_instance: 0,
        });
        match index_type {
            IndexType::U16 => {
                for &index in &primitive.indices {
                    indices.extend_from_slice(&(index as u16).to_le_bytes());
                }
            }
            IndexType::U32 => {
                for &index in &primitive.indices {
                    indices.extend_from_slice(&index.to_le_bytes());
                }
            }
        }
        pack_primitive(primitive, &plans, &strides, base_vertex, &mut vertices)?;
        base_vertex += primitive.vertex_count;
    }

    Ok(PackedGeometry {
        index_type,
        indices,
        vertices,
        strides,
        draw_args,
    })
}

fn shadow_of(source: &GeometrySource, indices: &[u8]) -> GeometryShadow {
    let gather = |semantic: VertexSemantic| -> Vec<u8> {
        source
            .primitives
            .iter()
            .filter_map(|p| p.stream(semantic))
            .flat_map(|s| s.data.iter().copied())
            .collect()
    };
    GeometryShadow {
        indices: indices.to_vec(),
        positions: gather(VertexSemantic::Position),
        normals: gather(VertexSemantic::Normal),
    }
}

/// Decodes a geometry file, repacks it into the requested layout and
/// uploads its index and vertex buffers.
pub(super) fn load_geometry(
    ctx: &mut UploadContext<'_>,
    path: &Path,
    layout: &VertexLayout,
    flags: GeometryLoadFlags,
    node_index: u32,
    slot: &ResourceSlot<Geometry>,
) -> anyhow::Result<UploadResult> {
    let source =
        sluice_io::load_geometry(path).with_context(|| format!("loading {}", path.display()))?;
    let packed = pack_geometry(&source, layout)
        .with_context(|| format!("packing {}", path.display()))?;

    // Index data first, then each vertex binding on its own aligned offset.
    let alignment = ctx.caps.upload_buffer_alignment.max(4);
    let mut offsets = Vec::with_capacity(packed.vertices.len());
    let mut total = packed.indices.len() as u64;
    for data in &packed.vertices {
        let offset = round_up_u64(total, u64::from(alignment)).context("geometry too large")?;
        offsets.push(offset);
        total = offset + data.len() as u64;
    }

    let direct = ctx.caps.unified_memory;
    let staged = if direct {
        None
    } else {
        match ctx.stage(total, alignment)? {
            Some(range) => Some(range),
            None => return Ok(UploadResult::StagingBufferFull),
        }
    };

    let extra_usage = if flags.contains(GeometryLoadFlags::STRUCTURED_BUFFERS) {
        BufferUsage::STORAGE
    } else {
        BufferUsage::EMPTY
    };
    let create = |label: &'static str, size: u64, usage: BufferUsage| {
        ctx.device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: usage | BufferUsage::COPY_DST | extra_usage,
            memory_usage: MemoryUsage::GpuOnly,
            start_state: ResourceState::COMMON,
            node_index,
            alignment: 0,
        })
    };
    let index_buffer = create("geometry indices", packed.indices.len() as u64, BufferUsage::INDEX)?;
    let mut vertex_buffers: Vec<BufferId> = Vec::with_capacity(packed.vertices.len());
    for data in &packed.vertices {
        match create("geometry vertices", data.len() as u64, BufferUsage::VERTEX) {
            Ok(buffer) => vertex_buffers.push(buffer),
            Err(e) => {
                release_buffers(ctx.device, vertex_buffers.iter().copied().chain([index_buffer]));
                return Err(e).context("creating vertex buffer");
            }
        }
    }

    let uploads: Vec<(BufferId, u64, &[u8])> =
        std::iter::once((index_buffer, 0u64, packed.indices.as_slice()))
            .chain(
                vertex_buffers
                    .iter()
                    .zip(&offsets)
                    .zip(&packed.vertices)
                    .map(|((&buffer, &offset), data)| (buffer, offset, data.as_slice())),
            )
            .collect();
    if let Err(e) = fill_buffers(ctx, staged, &uploads) {
        release_buffers(ctx.device, vertex_buffers.iter().copied().chain([index_buffer]));
        return Err(e);
    }

    let shadow = flags
        .contains(GeometryLoadFlags::SHADOWED)
        .then(|| shadow_of(&source, &packed.indices));
    slot.fill(Geometry {
        index_buffer,
        vertex_buffers,
        vertex_strides: packed.strides,
        index_type: packed.index_type,
        index_count: source.index_count(),
        vertex_count: source.vertex_count(),
        draw_args: packed.draw_args,
        joint_count: source.joint_count,
        inverse_bind_poses: source.inverse_bind_poses,
        shadow,
    });
    Ok(UploadResult::Completed)
}

/// Writes every buffer's bytes, then records the copies out of staging.
fn fill_buffers(
    ctx: &mut UploadContext<'_>,
    staged: Option<StagingRange>,
    uploads: &[(BufferId, u64, &[u8])],
) -> anyhow::Result<()> {
    let Some(range) = staged else {
        for &(buffer, _, data) in uploads {
            ctx.device.write_buffer(buffer, 0, data)?;
            let info = ctx.device.buffer_info(buffer)?;
            ctx.device.set_buffer_state(buffer, resting_state(&info))?;
        }
        return Ok(());
    };
    let mut regions = Vec::with_capacity(uploads.len());
    for &(buffer, offset, data) in uploads {
        let region = range
            .slice(offset, data.len() as u64)
            .context("staging region out of range")?;
        region.write(ctx.device, 0, data)?;
        regions.push((buffer, region));
    }
    for (buffer, region) in regions {
        update_buffer(ctx, buffer, 0, ResourceState::COMMON, region)?;
    }
    Ok(())
}

fn release_buffers(device: &dyn GraphicsDevice, buffers: impl IntoIterator<Item = BufferId>) {
    for buffer in buffers {
        if let Err(err) = device.destroy_buffer(buffer) {
            log::error!("Streamer: failed to release {buffer:?}: {err}");
        }
    }
}

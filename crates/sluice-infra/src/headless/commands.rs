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

//! Resource storage and the commands replayed against it.

use sluice_core::device::{
    BufferBarrier, BufferId, BufferInfo, ResourceError, ResourceState, SubresourceCopy,
    SurfaceInfo, TextureBarrier, TextureId, TextureInfo,
};
use sluice_core::utils::mip_reduce;
use std::collections::HashMap;
use std::ops::Range;

/// A command captured while a command list was recording.
#[derive(Debug, Clone)]
pub(crate) enum RecordedCommand {
    CopyBuffer {
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    },
    BufferToTexture {
        src: BufferId,
        dst: TextureId,
        region: SubresourceCopy,
    },
    TextureToBuffer {
        src: TextureId,
        dst: BufferId,
        region: SubresourceCopy,
    },
    Barrier {
        buffers: Vec<BufferBarrier>,
        textures: Vec<TextureBarrier>,
    },
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub info: BufferInfo,
    pub data: Vec<u8>,
    pub state: ResourceState,
    /// Executed barriers as `(from, to)`, oldest first.
    pub barriers: Vec<(ResourceState, ResourceState)>,
}

#[derive(Debug)]
pub(crate) struct TextureEntry {
    pub info: TextureInfo,
    /// Tightly packed sub-resources, indexed `layer * mip_levels + mip`.
    pub subresources: Vec<Vec<u8>>,
    pub state: ResourceState,
}

impl TextureEntry {
    pub fn new(info: TextureInfo) -> Result<Self, ResourceError> {
        let mut subresources = Vec::with_capacity((info.array_layers * info.mip_levels) as usize);
        for _layer in 0..info.array_layers {
            for mip in 0..info.mip_levels {
                let (surface, depth) = subresource_surface(&info, mip)?;
                subresources.push(vec![0u8; (surface.num_bytes * u64::from(depth)) as usize]);
            }
        }
        Ok(Self {
            info,
            subresources,
            state: ResourceState::UNDEFINED,
        })
    }

    pub fn index(&self, mip: u32, layer: u32) -> Option<usize> {
        (mip < self.info.mip_levels && layer < self.info.array_layers)
            .then(|| (layer * self.info.mip_levels + mip) as usize)
    }
}

fn subresource_surface(info: &TextureInfo, mip: u32) -> Result<(SurfaceInfo, u32), ResourceError> {
    let w = mip_reduce(info.width, mip);
    let h = mip_reduce(info.height, mip);
    let d = mip_reduce(info.depth, mip);
    let surface = info.format.surface_info(w, h).ok_or_else(|| {
        ResourceError::InvalidState(format!("no surface layout for {:?}", info.format))
    })?;
    Ok((surface, d))
}

/// Where each row of a sub-resource lives in the linear buffer and in the
/// packed texture storage.
struct RowPlan {
    surface: SurfaceInfo,
    depth: u32,
    region: SubresourceCopy,
}

impl RowPlan {
    fn rows(&self) -> impl Iterator<Item = (Range<usize>, Range<usize>)> + '_ {
        let row_bytes = self.surface.row_bytes as usize;
        let rows = self.surface.num_rows;
        (0..self.depth).flat_map(move |z| {
            (0..rows).map(move |r| {
                let linear = self.region.buffer_offset as usize
                    + z as usize * self.region.slice_pitch as usize
                    + r as usize * self.region.row_pitch as usize;
                let packed = (z as usize * rows as usize + r as usize) * row_bytes;
                (linear..linear + row_bytes, packed..packed + row_bytes)
            })
        })
    }

    fn linear_end(&self) -> u64 {
        self.region.buffer_offset
            + u64::from(self.depth - 1) * u64::from(self.region.slice_pitch)
            + u64::from(self.surface.num_rows - 1) * u64::from(self.region.row_pitch)
            + u64::from(self.surface.row_bytes)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Storage {
    pub buffers: HashMap<BufferId, BufferEntry>,
    pub textures: HashMap<TextureId, TextureEntry>,
    /// Buffer barriers whose `from` disagreed with the tracked state.
    pub mismatched_barriers: u64,
}

impl Storage {
    fn buffer(&self, id: BufferId) -> Result<&BufferEntry, ResourceError> {
        self.buffers.get(&id).ok_or(ResourceError::NotFound)
    }

    fn texture(&self, id: TextureId) -> Result<&TextureEntry, ResourceError> {
        self.textures.get(&id).ok_or(ResourceError::NotFound)
    }

    fn row_plan(
        &self,
        buffer: BufferId,
        texture: TextureId,
        region: &SubresourceCopy,
    ) -> Result<(RowPlan, usize), ResourceError> {
        let buf = self.buffer(buffer)?;
        let tex = self.texture(texture)?;
        let index = tex
            .index(region.mip_level, region.array_layer)
            .ok_or(ResourceError::OutOfBounds)?;
        let (surface, depth) = subresource_surface(&tex.info, region.mip_level)?;
        if region.row_pitch < surface.row_bytes {
            return Err(ResourceError::InvalidState(format!(
                "row pitch {} below row size {}",
                region.row_pitch, surface.row_bytes
            )));
        }
        let plan = RowPlan {
            surface,
            depth,
            region: *region,
        };
        if plan.linear_end() > buf.data.len() as u64 {
            return Err(ResourceError::OutOfBounds);
        }
        Ok((plan, index))
    }

    /// Checks that `command` can execute against the current resources.
    pub fn validate(&self, command: &RecordedCommand) -> Result<(), ResourceError> {
        match command {
            RecordedCommand::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                let src_len = self.buffer(*src)?.data.len() as u64;
                let dst_len = self.buffer(*dst)?.data.len() as u64;
                if src_offset + size > src_len || dst_offset + size > dst_len {
                    return Err(ResourceError::OutOfBounds);
                }
                Ok(())
            }
            RecordedCommand::BufferToTexture { src, dst, region } => {
                self.row_plan(*src, *dst, region).map(|_| ())
            }
            RecordedCommand::TextureToBuffer { src, dst, region } => {
                self.row_plan(*dst, *src, region).map(|_| ())
            }
            RecordedCommand::Barrier { buffers, textures } => {
                for barrier in buffers {
                    self.buffer(barrier.buffer)?;
                }
                for barrier in textures {
                    self.texture(barrier.texture)?;
                }
                Ok(())
            }
        }
    }

    /// Executes `command`. Returns the number of bytes moved.
    pub fn execute(&mut self, command: &RecordedCommand) -> Result<u64, ResourceError> {
        self.validate(command)?;
        match command {
            RecordedCommand::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                let (from, to) = (*src_offset as usize, *dst_offset as usize);
                let len = *size as usize;
                let bytes = self.buffer(*src)?.data[from..from + len].to_vec();
                let target = self.buffers.get_mut(dst).ok_or(ResourceError::NotFound)?;
                target.data[to..to + len].copy_from_slice(&bytes);
                Ok(*size)
            }
            RecordedCommand::BufferToTexture { src, dst, region } => {
                let (plan, index) = self.row_plan(*src, *dst, region)?;
                let source = &self.buffers.get(src).ok_or(ResourceError::NotFound)?.data;
                let texture = self.textures.get_mut(dst).ok_or(ResourceError::NotFound)?;
                let target = &mut texture.subresources[index];
                for (linear, packed) in plan.rows() {
                    target[packed].copy_from_slice(&source[linear]);
                }
                Ok(plan.surface.num_bytes * u64::from(plan.depth))
            }
            RecordedCommand::TextureToBuffer { src, dst, region } => {
                let (plan, index) = self.row_plan(*dst, *src, region)?;
                let texels = &self.textures.get(src).ok_or(ResourceError::NotFound)?.subresources
                    [index];
                let target = self.buffers.get_mut(dst).ok_or(ResourceError::NotFound)?;
                for (linear, packed) in plan.rows() {
                    target.data[linear].copy_from_slice(&texels[packed]);
                }
                Ok(plan.surface.num_bytes * u64::from(plan.depth))
            }
            RecordedCommand::Barrier { buffers, textures } => {
                for barrier in buffers {
                    if let Some(entry) = self.buffers.get_mut(&barrier.buffer) {
                        // UNDEFINED discards the contents and matches any state.
                        if barrier.from != entry.state && barrier.from != ResourceState::UNDEFINED {
                            log::warn!(
                                "HeadlessDevice: barrier on {:?} from {:?} but it is in {:?}",
                                barrier.buffer,
                                barrier.from,
                                entry.state
                            );
                            self.mismatched_barriers += 1;
                        }
                        entry.barriers.push((barrier.from, barrier.to));
                        entry.state = barrier.to;
                    }
                }
                for barrier in textures {
                    if let Some(entry) = self.textures.get_mut(&barrier.texture) {
                        entry.state = barrier.to;
                    }
                }
                Ok(0)
            }
        }
    }
}

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

use super::UploadContext;
use crate::copy_engine::subresource_alignment;
use crate::desc::{ResourceSlot, TextureContainer, TextureCopyDesc};
use crate::request::UploadResult;
use crate::staging::StagingRange;
use anyhow::{ensure, Context};
use sluice_core::device::{
    surface_size, DeviceCapabilities, GraphicsDevice, ResourceState, SubresourceCopy,
    TextureBarrier, TextureCreationFlags, TextureDescriptor, TextureId, TextureInfo,
};
use sluice_core::utils::{max_mip_levels, mip_reduce, round_up, round_up_u64};
use sluice_io::FileStream;
use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

/// Mips and layers touched by an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubresourceRange {
    pub base_mip: u32,
    pub mip_levels: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub fn whole(info: &TextureInfo) -> Self {
        Self {
            base_mip: 0,
            mip_levels: info.mip_levels,
            base_layer: 0,
            layer_count: info.array_layers,
        }
    }

    pub fn single(mip: u32, layer: u32) -> Self {
        Self {
            base_mip: mip,
            mip_levels: 1,
            base_layer: layer,
            layer_count: 1,
        }
    }
}

/// Where one sub-resource sits in staging memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubresourceLayout {
    pub mip: u32,
    pub layer: u32,
    pub row_bytes: u32,
    pub num_rows: u32,
    pub depth: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub offset: u64,
}

impl SubresourceLayout {
    /// Bytes reserved for the sub-resource.
    pub fn size(&self) -> u64 {
        u64::from(self.slice_pitch) * u64::from(self.depth)
    }

    /// Bytes actually read by a copy, the padding after the last row excluded.
    pub fn extent(&self) -> u64 {
        u64::from(self.depth - 1) * u64::from(self.slice_pitch)
            + u64::from(self.num_rows - 1) * u64::from(self.row_pitch)
            + u64::from(self.row_bytes)
    }

    fn copy_region(&self, buffer_offset: u64) -> SubresourceCopy {
        SubresourceCopy {
            mip_level: self.mip,
            array_layer: self.layer,
            buffer_offset,
            row_pitch: self.row_pitch,
            slice_pitch: self.slice_pitch,
        }
    }
}

/// Staging layout of a set of sub-resources, rows padded to the device's
/// row alignment and each sub-resource aligned for its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PitchedLayout {
    pub subresources: Vec<SubresourceLayout>,
    pub size: u64,
    pub alignment: u32,
}

/// Lays `range` of a texture out in staging memory, mips outermost when
/// `mips_outer` and layers outermost otherwise.
pub(crate) fn pitched_layout(
    caps: &DeviceCapabilities,
    info: &TextureInfo,
    range: SubresourceRange,
    mips_outer: bool,
) -> anyhow::Result<PitchedLayout> {
    ensure!(
        range.mip_levels > 0
            && range.layer_count > 0
            && range.base_mip + range.mip_levels <= info.mip_levels
            && range.base_layer + range.layer_count <= info.array_layers,
        "sub-resources {range:?} outside a texture of {} mip(s) and {} layer(s)",
        info.mip_levels,
        info.array_layers
    );
    let alignment = subresource_alignment(caps, info.format)
        .context("sub-resource alignment overflows")?;
    let row_alignment = caps.upload_row_alignment.max(1);

    let mips = range.base_mip..range.base_mip + range.mip_levels;
    let layers = range.base_layer..range.base_layer + range.layer_count;
    let order: Vec<(u32, u32)> = if mips_outer {
        mips.flat_map(|m| layers.clone().map(move |l| (m, l))).collect()
    } else {
        layers.flat_map(|l| mips.clone().map(move |m| (m, l))).collect()
    };

    let mut subresources = Vec::with_capacity(order.len());
    let mut cursor = 0u64;
    for (mip, layer) in order {
        let width = mip_reduce(info.width, mip);
        let height = mip_reduce(info.height, mip);
        let depth = mip_reduce(info.depth, mip);
        let surface = info
            .format
            .surface_info(width, height)
            .with_context(|| format!("no surface layout for {:?} at mip {mip}", info.format))?;
        let too_large = || format!("mip {mip} of {width}x{height}x{depth} is too large");
        let row_pitch = round_up(surface.row_bytes, row_alignment).with_context(too_large)?;
        let slice_pitch = row_pitch
            .checked_mul(surface.num_rows)
            .and_then(|bytes| round_up(bytes, alignment))
            .with_context(too_large)?;
        let offset = round_up_u64(cursor, u64::from(alignment)).with_context(too_large)?;
        let layout = SubresourceLayout {
            mip,
            layer,
            row_bytes: surface.row_bytes,
            num_rows: surface.num_rows,
            depth,
            row_pitch,
            slice_pitch,
            offset,
        };
        cursor = offset.checked_add(layout.size()).with_context(too_large)?;
        subresources.push(layout);
    }

    Ok(PitchedLayout {
        subresources,
        size: round_up_u64(cursor, u64::from(alignment)).context("staging layout overflows")?,
        alignment,
    })
}

/// Copies producer-filled staging memory into texture sub-resources.
pub(super) fn update_texture(
    ctx: &mut UploadContext<'_>,
    texture: TextureId,
    range: StagingRange,
    subresources: SubresourceRange,
) -> anyhow::Result<UploadResult> {
    let info = ctx
        .device
        .texture_info(texture)
        .with_context(|| format!("destination texture {texture:?}"))?;
    let layout = pitched_layout(&ctx.caps, &info, subresources, true)?;
    ensure!(
        layout.size <= range.size,
        "texture update needs {} bytes, staging range holds {}",
        layout.size,
        range.size
    );
    record_copies(ctx, texture, &layout, range)
}

fn record_copies(
    ctx: &mut UploadContext<'_>,
    texture: TextureId,
    layout: &PitchedLayout,
    range: StagingRange,
) -> anyhow::Result<UploadResult> {
    let cmd = ctx.cmd()?;
    ctx.device.cmd_resource_barrier(
        cmd,
        &[],
        &[TextureBarrier {
            texture,
            from: ResourceState::UNDEFINED,
            to: ResourceState::COPY_DEST,
        }],
    )?;
    for sub in &layout.subresources {
        ctx.device.cmd_copy_buffer_to_texture(
            cmd,
            range.buffer,
            texture,
            &sub.copy_region(range.offset + sub.offset),
        )?;
    }
    ctx.device.cmd_resource_barrier(
        cmd,
        &[],
        &[TextureBarrier {
            texture,
            from: ResourceState::COPY_DEST,
            to: ResourceState::SHADER_RESOURCE,
        }],
    )?;
    Ok(UploadResult::Completed)
}

/// Reads texels row by row from `stream` into their pitched place in
/// `range`.
fn stream_texels(
    device: &dyn GraphicsDevice,
    stream: &mut FileStream,
    layout: &PitchedLayout,
    range: StagingRange,
    mip_size_prefix: bool,
) -> anyhow::Result<()> {
    let mut current_mip = None;
    for sub in &layout.subresources {
        if mip_size_prefix && current_mip != Some(sub.mip) {
            stream
                .read_u32_le()
                .with_context(|| format!("size prefix of mip {}", sub.mip))?;
            current_mip = Some(sub.mip);
        }
        let mut pitched = vec![0u8; usize::try_from(sub.size())?];
        for z in 0..u64::from(sub.depth) {
            for row in 0..u64::from(sub.num_rows) {
                let start = usize::try_from(
                    z * u64::from(sub.slice_pitch) + row * u64::from(sub.row_pitch),
                )?;
                stream
                    .read_exact(&mut pitched[start..start + sub.row_bytes as usize])
                    .with_context(|| {
                        format!("texels of mip {} layer {} are truncated", sub.mip, sub.layer)
                    })?;
            }
        }
        range.write(device, sub.offset, &pitched)?;
    }
    Ok(())
}

/// Creates a texture from a container file and streams its texels.
pub(super) fn load_texture(
    ctx: &mut UploadContext<'_>,
    path: &Path,
    container: TextureContainer,
    creation_flags: TextureCreationFlags,
    node_index: u32,
    slot: &ResourceSlot<TextureId>,
) -> anyhow::Result<UploadResult> {
    let path = container.resolve(path);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(container.extension());
    let parser = ctx.containers.get(extension)?;
    let mut stream =
        FileStream::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let header = parser
        .parse_header(&mut stream)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut format = header.format;
    if creation_flags.contains(TextureCreationFlags::SRGB) {
        match format.to_srgb() {
            Some(srgb) => format = srgb,
            None => log::warn!(
                "Streamer: {:?} has no sRGB variant, {} stays linear",
                format,
                path.display()
            ),
        }
    }

    let info = TextureInfo {
        width: header.width,
        height: header.height,
        depth: header.depth,
        array_layers: header.array_layers,
        mip_levels: header.mip_levels,
        format,
        node_index,
    };
    ensure!(
        info.mip_levels <= max_mip_levels(info.width, info.height, info.depth),
        "{} lists {} mips for a {}x{}x{} texture",
        path.display(),
        info.mip_levels,
        info.width,
        info.height,
        info.depth
    );
    let texel_bytes = surface_size(
        format,
        info.width,
        info.height,
        info.depth,
        info.mip_levels,
        info.array_layers,
    )
    .with_context(|| format!("{} describes an impossibly large texture", path.display()))?;
    let available = stream.remaining()?;
    ensure!(
        texel_bytes <= available,
        "{} needs {texel_bytes} bytes of texels, {available} are left in the file",
        path.display()
    );
    let layout = pitched_layout(
        &ctx.caps,
        &info,
        SubresourceRange::whole(&info),
        header.mips_after_slice,
    )?;
    let Some(range) = ctx.stage(layout.size, layout.alignment)? else {
        return Ok(UploadResult::StagingBufferFull);
    };

    stream_texels(
        ctx.device,
        &mut stream,
        &layout,
        range,
        header.mip_size_prefix && header.mips_after_slice,
    )
    .with_context(|| format!("streaming {}", path.display()))?;

    let texture = ctx.device.create_texture(&TextureDescriptor {
        label: path
            .file_name()
            .map(|name| Cow::Owned(name.to_string_lossy().into_owned())),
        width: info.width,
        height: info.height,
        depth: info.depth,
        array_layers: info.array_layers,
        mip_levels: info.mip_levels,
        format,
        is_cubemap: header.is_cubemap,
        start_state: ResourceState::COMMON,
        node_index,
        flags: creation_flags,
        ..TextureDescriptor::default()
    })?;
    slot.fill(texture);
    record_copies(ctx, texture, &layout, range)
}

/// Copies one texture sub-resource into a buffer.
pub(super) fn copy_texture(
    ctx: &mut UploadContext<'_>,
    desc: &TextureCopyDesc,
) -> anyhow::Result<UploadResult> {
    let info = ctx.device.texture_info(desc.texture)?;
    let layout = pitched_layout(
        &ctx.caps,
        &info,
        SubresourceRange::single(desc.mip_level, desc.array_layer),
        true,
    )?;
    let sub = layout
        .subresources
        .first()
        .copied()
        .context("empty sub-resource range")?;
    let buffer = ctx.device.buffer_info(desc.buffer)?;
    ensure!(
        desc.buffer_offset + sub.extent() <= buffer.size,
        "readback of {} bytes at offset {} overruns buffer of {} bytes",
        sub.extent(),
        desc.buffer_offset,
        buffer.size
    );

    let cmd = ctx.cmd()?;
    ctx.device.cmd_resource_barrier(
        cmd,
        &[],
        &[TextureBarrier {
            texture: desc.texture,
            from: desc.texture_state,
            to: ResourceState::COPY_SOURCE,
        }],
    )?;
    ctx.device.cmd_copy_texture_to_buffer(
        cmd,
        desc.texture,
        desc.buffer,
        &sub.copy_region(desc.buffer_offset),
    )?;
    ctx.device.cmd_resource_barrier(
        cmd,
        &[],
        &[TextureBarrier {
            texture: desc.texture,
            from: ResourceState::COPY_SOURCE,
            to: desc.texture_state,
        }],
    )?;
    Ok(UploadResult::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::device::TextureFormat;

    fn info(width: u32, height: u32, mips: u32, layers: u32) -> TextureInfo {
        TextureInfo {
            width,
            height,
            depth: 1,
            array_layers: layers,
            mip_levels: mips,
            format: TextureFormat::Rgba8Unorm,
            node_index: 0,
        }
    }

    #[test]
    fn test_rows_and_subresources_are_aligned() {
        let caps = DeviceCapabilities::default();
        let layout =
            pitched_layout(&caps, &info(4, 4, 3, 1), SubresourceRange::whole(&info(4, 4, 3, 1)), true)
                .unwrap();
        let pitches: Vec<(u32, u32)> = layout
            .subresources
            .iter()
            .map(|s| (s.row_pitch, s.slice_pitch))
            .collect();
        // 16, 8 and 4 byte rows all pad to 256; four rows of 256 are 1024.
        assert_eq!(pitches, vec![(256, 1024), (256, 512), (256, 512)]);
        let offsets: Vec<u64> = layout.subresources.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 1024, 1536]);
        assert_eq!(layout.size, 2048);
        assert_eq!(layout.alignment, 512);
    }

    #[test]
    fn test_pitch_overflow_is_an_error() {
        let caps = DeviceCapabilities::default();
        // 0x3FFFFFFF texels of 4 bytes fit a u32 row, the 256-aligned pitch does not.
        let tex = info(0x3FFF_FFFF, 1, 1, 1);
        assert!(pitched_layout(&caps, &tex, SubresourceRange::whole(&tex), true).is_err());
        let tall = info(1 << 20, 1 << 12, 1, 1);
        assert!(pitched_layout(&caps, &tall, SubresourceRange::whole(&tall), true).is_err());
    }

    #[test]
    fn test_nesting_order_follows_container() {
        let caps = DeviceCapabilities::default();
        let tex = info(2, 2, 2, 2);
        let order = |mips_outer| -> Vec<(u32, u32)> {
            pitched_layout(&caps, &tex, SubresourceRange::whole(&tex), mips_outer)
                .unwrap()
                .subresources
                .iter()
                .map(|s| (s.mip, s.layer))
                .collect()
        };
        assert_eq!(order(true), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(order(false), vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_range_outside_texture_is_rejected() {
        let caps = DeviceCapabilities::default();
        assert!(pitched_layout(&caps, &info(2, 2, 1, 1), SubresourceRange::single(1, 0), true).is_err());
    }

    #[test]
    fn test_undefined_format_has_no_layout() {
        let caps = DeviceCapabilities::default();
        let mut tex = info(2, 2, 1, 1);
        tex.format = TextureFormat::Undefined;
        assert!(pitched_layout(&caps, &tex, SubresourceRange::whole(&tex), true).is_err());
    }
}

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

//! DirectDraw Surface headers, including the DX10 extension.
//!
//! ```text
//! "DDS " | DDS_HEADER (124 bytes) | [DX10 header (20 bytes)] | layer 0: mip 0..n | layer 1 ...
//! ```

use super::{ContainerInfo, TextureContainerParser};
use crate::error::{ContainerError, Result};
use crate::stream::FileStream;
use bytemuck::{Pod, Zeroable};
use sluice_core::device::TextureFormat;
use std::io::Read;

const DDS_MAGIC: u32 = u32::from_le_bytes(*b"DDS ");
const HEADER_SIZE: u32 = 124;
const PIXEL_FORMAT_SIZE: u32 = 32;

const DDSD_DEPTH: u32 = 0x0080_0000;
const DDSCAPS2_CUBEMAP: u32 = 0x0000_0200;
const DDSCAPS2_VOLUME: u32 = 0x0020_0000;
const DDPF_ALPHA: u32 = 0x0000_0002;
const DDPF_FOURCC: u32 = 0x0000_0004;
const DDPF_RGB: u32 = 0x0000_0040;
const DDPF_LUMINANCE: u32 = 0x0002_0000;
const DX10_MISC_TEXTURECUBE: u32 = 0x4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DdsPixelFormat {
    size: u32,
    flags: u32,
    four_cc: u32,
    rgb_bit_count: u32,
    r_mask: u32,
    g_mask: u32,
    b_mask: u32,
    a_mask: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DdsHeader {
    size: u32,
    flags: u32,
    height: u32,
    width: u32,
    pitch_or_linear_size: u32,
    depth: u32,
    mip_map_count: u32,
    reserved1: [u32; 11],
    pixel_format: DdsPixelFormat,
    caps: u32,
    caps2: u32,
    caps3: u32,
    caps4: u32,
    reserved2: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DdsHeaderDx10 {
    dxgi_format: u32,
    resource_dimension: u32,
    misc_flag: u32,
    array_size: u32,
    misc_flags2: u32,
}

const fn four_cc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

fn read_pod<T: Pod>(stream: &mut FileStream) -> Result<T> {
    let mut bytes = vec![0u8; std::mem::size_of::<T>()];
    stream.read_exact(&mut bytes)?;
    Ok(bytemuck::pod_read_unaligned(&bytes))
}

fn format_from_dxgi(dxgi: u32) -> Option<TextureFormat> {
    Some(match dxgi {
        2 => TextureFormat::Rgba32Float,
        10 => TextureFormat::Rgba16Float,
        16 => TextureFormat::Rg32Float,
        28 => TextureFormat::Rgba8Unorm,
        29 => TextureFormat::Rgba8UnormSrgb,
        34 => TextureFormat::Rg16Float,
        41 => TextureFormat::R32Float,
        49 => TextureFormat::Rg8Unorm,
        54 => TextureFormat::R16Float,
        61 => TextureFormat::R8Unorm,
        71 => TextureFormat::Bc1RgbaUnorm,
        72 => TextureFormat::Bc1RgbaUnormSrgb,
        74 => TextureFormat::Bc2RgbaUnorm,
        75 => TextureFormat::Bc2RgbaUnormSrgb,
        77 => TextureFormat::Bc3RgbaUnorm,
        78 => TextureFormat::Bc3RgbaUnormSrgb,
        80 => TextureFormat::Bc4RUnorm,
        83 => TextureFormat::Bc5RgUnorm,
        87 => TextureFormat::Bgra8Unorm,
        91 => TextureFormat::Bgra8UnormSrgb,
        98 => TextureFormat::Bc7RgbaUnorm,
        99 => TextureFormat::Bc7RgbaUnormSrgb,
        _ => return None,
    })
}

fn format_from_legacy(pf: &DdsPixelFormat) -> Option<TextureFormat> {
    if pf.flags & DDPF_FOURCC != 0 {
        return match pf.four_cc {
            x if x == four_cc(b"DXT1") => Some(TextureFormat::Bc1RgbaUnorm),
            x if x == four_cc(b"DXT2") || x == four_cc(b"DXT3") => {
                Some(TextureFormat::Bc2RgbaUnorm)
            }
            x if x == four_cc(b"DXT4") || x == four_cc(b"DXT5") => {
                Some(TextureFormat::Bc3RgbaUnorm)
            }
            x if x == four_cc(b"ATI1") || x == four_cc(b"BC4U") => Some(TextureFormat::Bc4RUnorm),
            x if x == four_cc(b"ATI2") || x == four_cc(b"BC5U") => Some(TextureFormat::Bc5RgUnorm),
            // D3DFORMAT values stored in the fourCC slot.
            111 => Some(TextureFormat::R16Float),
            112 => Some(TextureFormat::Rg16Float),
            113 => Some(TextureFormat::Rgba16Float),
            114 => Some(TextureFormat::R32Float),
            115 => Some(TextureFormat::Rg32Float),
            116 => Some(TextureFormat::Rgba32Float),
            _ => None,
        };
    }
    if pf.flags & DDPF_RGB != 0 && pf.rgb_bit_count == 32 {
        return match (pf.r_mask, pf.g_mask, pf.b_mask) {
            (0x0000_00ff, 0x0000_ff00, 0x00ff_0000) => Some(TextureFormat::Rgba8Unorm),
            (0x00ff_0000, 0x0000_ff00, 0x0000_00ff) => Some(TextureFormat::Bgra8Unorm),
            _ => None,
        };
    }
    if pf.flags & (DDPF_LUMINANCE | DDPF_ALPHA) != 0 && pf.rgb_bit_count == 8 {
        return Some(TextureFormat::R8Unorm);
    }
    None
}

fn describe_pixel_format(pf: &DdsPixelFormat) -> String {
    if pf.flags & DDPF_FOURCC != 0 {
        let code = pf.four_cc.to_le_bytes();
        format!("DDS fourCC {:?}", String::from_utf8_lossy(&code))
    } else {
        format!(
            "DDS pixel format flags {:#x}, {} bits",
            pf.flags, pf.rgb_bit_count
        )
    }
}

/// Parser for `.dds` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DdsParser;

impl TextureContainerParser for DdsParser {
    fn extension(&self) -> &'static str {
        "dds"
    }

    fn parse_header(&self, stream: &mut FileStream) -> Result<ContainerInfo> {
        if stream.read_u32_le()? != DDS_MAGIC {
            return Err(ContainerError::BadMagic { container: "DDS" });
        }
        let header: DdsHeader = read_pod(stream)?;
        if header.size != HEADER_SIZE || header.pixel_format.size != PIXEL_FORMAT_SIZE {
            return Err(ContainerError::InvalidHeader(format!(
                "DDS header size {} / pixel format size {}",
                header.size, header.pixel_format.size
            )));
        }
        if header.width == 0 || header.height == 0 {
            return Err(ContainerError::InvalidHeader("DDS with empty extent".into()));
        }

        let pf = header.pixel_format;
        let mut array_layers = 1;
        let mut is_cubemap = header.caps2 & DDSCAPS2_CUBEMAP != 0;

        let format = if pf.flags & DDPF_FOURCC != 0 && pf.four_cc == four_cc(b"DX10") {
            let dx10: DdsHeaderDx10 = read_pod(stream)?;
            array_layers = dx10.array_size.max(1);
            is_cubemap |= dx10.misc_flag & DX10_MISC_TEXTURECUBE != 0;
            format_from_dxgi(dx10.dxgi_format).ok_or_else(|| {
                ContainerError::UnsupportedFormat(format!("DXGI format {}", dx10.dxgi_format))
            })?
        } else {
            format_from_legacy(&pf)
                .ok_or_else(|| ContainerError::UnsupportedFormat(describe_pixel_format(&pf)))?
        };

        if is_cubemap {
            array_layers = array_layers.checked_mul(6).ok_or_else(|| {
                ContainerError::InvalidHeader(format!("DDS cubemap with {array_layers} layers"))
            })?;
        }

        let depth = if header.flags & DDSD_DEPTH != 0 && header.caps2 & DDSCAPS2_VOLUME != 0 {
            header.depth.max(1)
        } else {
            1
        };

        Ok(ContainerInfo {
            width: header.width,
            height: header.height,
            depth,
            mip_levels: header.mip_map_count.max(1),
            array_layers,
            format,
            is_cubemap,
            mips_after_slice: false,
            mip_size_prefix: false,
        })
    }
}

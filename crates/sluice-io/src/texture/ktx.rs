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

//! Khronos KTX 1.1 headers.
//!
//! ```text
//! identifier (12) | 13 x u32 | key/value data | mip 0: imageSize, layer 0, layer 1 ... | mip 1 ...
//! ```

use super::{ContainerInfo, TextureContainerParser};
use crate::error::{ContainerError, Result};
use crate::stream::FileStream;
use bytemuck::{Pod, Zeroable};
use sluice_core::device::TextureFormat;
use std::io::Read;

const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const KTX_ENDIAN_LE: u32 = 0x0403_0201;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct KtxHeader {
    endianness: u32,
    gl_type: u32,
    gl_type_size: u32,
    gl_format: u32,
    gl_internal_format: u32,
    gl_base_internal_format: u32,
    pixel_width: u32,
    pixel_height: u32,
    pixel_depth: u32,
    number_of_array_elements: u32,
    number_of_faces: u32,
    number_of_mipmap_levels: u32,
    bytes_of_key_value_data: u32,
}

fn format_from_gl(internal_format: u32) -> Option<TextureFormat> {
    Some(match internal_format {
        0x8229 => TextureFormat::R8Unorm,
        0x822B => TextureFormat::Rg8Unorm,
        0x8058 => TextureFormat::Rgba8Unorm,
        0x8C43 => TextureFormat::Rgba8UnormSrgb,
        0x822D => TextureFormat::R16Float,
        0x822F => TextureFormat::Rg16Float,
        0x881A => TextureFormat::Rgba16Float,
        0x822E => TextureFormat::R32Float,
        0x8230 => TextureFormat::Rg32Float,
        0x8814 => TextureFormat::Rgba32Float,
        0x83F1 => TextureFormat::Bc1RgbaUnorm,
        0x8C4D => TextureFormat::Bc1RgbaUnormSrgb,
        0x83F2 => TextureFormat::Bc2RgbaUnorm,
        0x8C4E => TextureFormat::Bc2RgbaUnormSrgb,
        0x83F3 => TextureFormat::Bc3RgbaUnorm,
        0x8C4F => TextureFormat::Bc3RgbaUnormSrgb,
        0x8DBB => TextureFormat::Bc4RUnorm,
        0x8DBD => TextureFormat::Bc5RgUnorm,
        0x8E8C => TextureFormat::Bc7RgbaUnorm,
        0x8E8D => TextureFormat::Bc7RgbaUnormSrgb,
        _ => return None,
    })
}

/// Parser for `.ktx` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct KtxParser;

impl TextureContainerParser for KtxParser {
    fn extension(&self) -> &'static str {
        "ktx"
    }

    fn parse_header(&self, stream: &mut FileStream) -> Result<ContainerInfo> {
        let mut identifier = [0u8; 12];
        stream.read_exact(&mut identifier)?;
        if identifier != KTX_IDENTIFIER {
            return Err(ContainerError::BadMagic { container: "KTX" });
        }

        let mut raw = [0u8; std::mem::size_of::<KtxHeader>()];
        stream.read_exact(&mut raw)?;
        let header: KtxHeader = bytemuck::pod_read_unaligned(&raw);
        if header.endianness != KTX_ENDIAN_LE {
            return Err(ContainerError::UnsupportedFormat(format!(
                "KTX endianness marker {:#010x}",
                header.endianness
            )));
        }
        if header.pixel_width == 0 {
            return Err(ContainerError::InvalidHeader("KTX with zero width".into()));
        }
        let faces = header.number_of_faces;
        if faces != 1 && faces != 6 {
            return Err(ContainerError::InvalidHeader(format!(
                "KTX with {faces} faces"
            )));
        }

        let format = format_from_gl(header.gl_internal_format).ok_or_else(|| {
            ContainerError::UnsupportedFormat(format!(
                "GL internal format {:#06x}",
                header.gl_internal_format
            ))
        })?;

        let array_layers = header
            .number_of_array_elements
            .max(1)
            .checked_mul(faces)
            .ok_or_else(|| {
                ContainerError::InvalidHeader(format!(
                    "KTX with {} array elements",
                    header.number_of_array_elements
                ))
            })?;

        if header.bytes_of_key_value_data != 0 {
            log::debug!(
                "Skipping {} bytes of KTX key/value data",
                header.bytes_of_key_value_data
            );
        }
        stream.skip(u64::from(header.bytes_of_key_value_data))?;

        Ok(ContainerInfo {
            width: header.pixel_width,
            height: header.pixel_height.max(1),
            depth: header.pixel_depth.max(1),
            mip_levels: header.number_of_mipmap_levels.max(1),
            array_layers,
            format,
            is_cubemap: faces == 6,
            mips_after_slice: true,
            mip_size_prefix: true,
        })
    }
}

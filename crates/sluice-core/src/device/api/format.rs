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

//! Texel formats and the surface-size arithmetic derived from them.

/// Defines the memory format of texels in a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// No known layout. Surface queries fail for this format.
    #[default]
    Undefined,
    // 8-bit formats
    /// One 8-bit unsigned normalized component.
    R8Unorm,
    /// Two 8-bit unsigned normalized components.
    Rg8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA).
    Rgba8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA) in the sRGB color space.
    Rgba8UnormSrgb,
    /// Four 8-bit unsigned normalized components (BGRA).
    Bgra8Unorm,
    /// Four 8-bit unsigned normalized components (BGRA) in the sRGB color space.
    Bgra8UnormSrgb,
    // 16-bit float formats
    /// One 16-bit float component.
    R16Float,
    /// Two 16-bit float components.
    Rg16Float,
    /// Four 16-bit float components.
    Rgba16Float,
    // 32-bit float formats
    /// One 32-bit float component.
    R32Float,
    /// Two 32-bit float components.
    Rg32Float,
    /// Four 32-bit float components.
    Rgba32Float,
    // Block-compressed formats, 4x4 texel blocks
    /// BC1 (DXT1), 8 bytes per block.
    Bc1RgbaUnorm,
    /// BC1 in the sRGB color space.
    Bc1RgbaUnormSrgb,
    /// BC2 (DXT3), 16 bytes per block.
    Bc2RgbaUnorm,
    /// BC2 in the sRGB color space.
    Bc2RgbaUnormSrgb,
    /// BC3 (DXT5), 16 bytes per block.
    Bc3RgbaUnorm,
    /// BC3 in the sRGB color space.
    Bc3RgbaUnormSrgb,
    /// BC4, one channel, 8 bytes per block.
    Bc4RUnorm,
    /// BC5, two channels, 16 bytes per block.
    Bc5RgUnorm,
    /// BC7, 16 bytes per block.
    Bc7RgbaUnorm,
    /// BC7 in the sRGB color space.
    Bc7RgbaUnormSrgb,
}

/// Byte layout of one 2D surface (one mip of one layer, one depth slice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Total size of the surface in bytes.
    pub num_bytes: u64,
    /// Size of one row of texels (or blocks) in bytes.
    pub row_bytes: u32,
    /// Number of rows (block rows for compressed formats).
    pub num_rows: u32,
}

impl TextureFormat {
    /// Size in bytes of one block (a single texel for uncompressed formats).
    pub const fn block_bytes(self) -> u32 {
        match self {
            TextureFormat::Undefined => 0,
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rg8Unorm | TextureFormat::R16Float => 2,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rg16Float
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
            TextureFormat::Bc1RgbaUnorm
            | TextureFormat::Bc1RgbaUnormSrgb
            | TextureFormat::Bc4RUnorm => 8,
            TextureFormat::Bc2RgbaUnorm
            | TextureFormat::Bc2RgbaUnormSrgb
            | TextureFormat::Bc3RgbaUnorm
            | TextureFormat::Bc3RgbaUnormSrgb
            | TextureFormat::Bc5RgUnorm
            | TextureFormat::Bc7RgbaUnorm
            | TextureFormat::Bc7RgbaUnormSrgb => 16,
        }
    }

    /// `true` for 4x4 block-compressed formats.
    pub const fn is_compressed(self) -> bool {
        matches!(
            self,
            TextureFormat::Bc1RgbaUnorm
                | TextureFormat::Bc1RgbaUnormSrgb
                | TextureFormat::Bc2RgbaUnorm
                | TextureFormat::Bc2RgbaUnormSrgb
                | TextureFormat::Bc3RgbaUnorm
                | TextureFormat::Bc3RgbaUnormSrgb
                | TextureFormat::Bc4RUnorm
                | TextureFormat::Bc5RgUnorm
                | TextureFormat::Bc7RgbaUnorm
                | TextureFormat::Bc7RgbaUnormSrgb
        )
    }

    /// Width and height of a block in texels.
    pub const fn block_dimensions(self) -> (u32, u32) {
        if self.is_compressed() {
            (4, 4)
        } else {
            (1, 1)
        }
    }

    /// `true` if the format stores sRGB-encoded color.
    pub const fn is_srgb(self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba8UnormSrgb
                | TextureFormat::Bgra8UnormSrgb
                | TextureFormat::Bc1RgbaUnormSrgb
                | TextureFormat::Bc2RgbaUnormSrgb
                | TextureFormat::Bc3RgbaUnormSrgb
                | TextureFormat::Bc7RgbaUnormSrgb
        )
    }

    /// The sRGB counterpart of a linear format, if one exists.
    ///
    /// sRGB formats map to themselves.
    pub const fn to_srgb(self) -> Option<TextureFormat> {
        match self {
            TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8UnormSrgb),
            TextureFormat::Bgra8Unorm => Some(TextureFormat::Bgra8UnormSrgb),
            TextureFormat::Bc1RgbaUnorm => Some(TextureFormat::Bc1RgbaUnormSrgb),
            TextureFormat::Bc2RgbaUnorm => Some(TextureFormat::Bc2RgbaUnormSrgb),
            TextureFormat::Bc3RgbaUnorm => Some(TextureFormat::Bc3RgbaUnormSrgb),
            TextureFormat::Bc7RgbaUnorm => Some(TextureFormat::Bc7RgbaUnormSrgb),
            other if other.is_srgb() => Some(other),
            _ => None,
        }
    }

    /// Computes the byte layout of a `width` x `height` surface.
    ///
    /// ## Returns
    ///
    /// `None` for [`TextureFormat::Undefined`] or an empty extent.
    pub fn surface_info(self, width: u32, height: u32) -> Option<SurfaceInfo> {
        if self == TextureFormat::Undefined || width == 0 || height == 0 {
            return None;
        }
        let (bw, bh) = self.block_dimensions();
        let blocks_wide = width.div_ceil(bw).max(1);
        let blocks_high = height.div_ceil(bh).max(1);
        let row_bytes = blocks_wide.checked_mul(self.block_bytes())?;
        Some(SurfaceInfo {
            num_bytes: u64::from(row_bytes) * u64::from(blocks_high),
            row_bytes,
            num_rows: blocks_high,
        })
    }
}

/// Tightly packed size of a full mip chain for every layer and depth slice.
pub fn surface_size(
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    mip_levels: u32,
    array_layers: u32,
) -> Option<u64> {
    let mut total = 0u64;
    for mip in 0..mip_levels {
        let w = crate::utils::mip_reduce(width, mip);
        let h = crate::utils::mip_reduce(height, mip);
        let d = crate::utils::mip_reduce(depth, mip);
        let info = format.surface_info(w, h)?;
        total = total.checked_add(info.num_bytes.checked_mul(u64::from(d))?)?;
    }
    total.checked_mul(u64::from(array_layers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompressed_surface_info() {
        let info = TextureFormat::Rgba8Unorm.surface_info(16, 8).unwrap();
        assert_eq!(info.row_bytes, 64);
        assert_eq!(info.num_rows, 8);
        assert_eq!(info.num_bytes, 512);
    }

    #[test]
    fn test_compressed_surface_rounds_to_blocks() {
        let info = TextureFormat::Bc1RgbaUnorm.surface_info(5, 2).unwrap();
        assert_eq!(info.row_bytes, 16);
        assert_eq!(info.num_rows, 1);
        assert_eq!(info.num_bytes, 16);

        let info = TextureFormat::Bc7RgbaUnorm.surface_info(1, 1).unwrap();
        assert_eq!(info.num_bytes, 16);
    }

    #[test]
    fn test_undefined_format_has_no_surface() {
        assert!(TextureFormat::Undefined.surface_info(4, 4).is_none());
        assert!(TextureFormat::R8Unorm.surface_info(0, 4).is_none());
    }

    #[test]
    fn test_srgb_counterparts() {
        assert_eq!(
            TextureFormat::Bc3RgbaUnorm.to_srgb(),
            Some(TextureFormat::Bc3RgbaUnormSrgb)
        );
        assert_eq!(
            TextureFormat::Rgba8UnormSrgb.to_srgb(),
            Some(TextureFormat::Rgba8UnormSrgb)
        );
        assert_eq!(TextureFormat::R32Float.to_srgb(), None);
    }

    #[test]
    fn test_surface_size_of_mip_chain() {
        // 4x4 + 2x2 + 1x1 texels, two layers.
        let size = surface_size(TextureFormat::R8Unorm, 4, 4, 1, 3, 2).unwrap();
        assert_eq!(size, (16 + 4 + 1) * 2);
    }
}

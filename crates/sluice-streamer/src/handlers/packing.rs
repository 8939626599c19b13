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

//! Vertex attribute conversions applied while filling vertex buffers.

use half::f16;
use sluice_core::device::VertexFormat;

/// How one source element is turned into one destination element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// Same format on both sides.
    Copy,
    /// `Float32x2` to `Float16x2`.
    HalfFloat2,
    /// `Float32x3` direction to octahedral `Unorm16x2`.
    Octahedral,
    /// `Uint8x4` to `Uint16x4`.
    WidenJoints,
}

/// Picks the conversion from `src` to `dst`, `None` if there is none.
pub fn select_packing(src: VertexFormat, dst: VertexFormat) -> Option<Packing> {
    match (src, dst) {
        (a, b) if a == b => Some(Packing::Copy),
        (VertexFormat::Float32x2, VertexFormat::Float16x2) => Some(Packing::HalfFloat2),
        (VertexFormat::Float32x3, VertexFormat::Unorm16x2) => Some(Packing::Octahedral),
        (VertexFormat::Uint8x4, VertexFormat::Uint16x4) => Some(Packing::WidenJoints),
        _ => None,
    }
}

impl Packing {
    /// Converts the element at the start of `src` into the start of `dst`.
    ///
    /// Both slices must hold at least one element of their format.
    pub fn apply(self, src: &[u8], dst: &mut [u8]) {
        match self {
            Packing::Copy => dst[..src.len()].copy_from_slice(src),
            Packing::HalfFloat2 => {
                let v: [f32; 2] = bytemuck::pod_read_unaligned(&src[..8]);
                let packed = [f16::from_f32(v[0]), f16::from_f32(v[1])];
                dst[..4].copy_from_slice(bytemuck::cast_slice(&packed));
            }
            Packing::Octahedral => {
                let v: [f32; 3] = bytemuck::pod_read_unaligned(&src[..12]);
                dst[..4].copy_from_slice(bytemuck::cast_slice(&encode_octahedral(v)));
            }
            Packing::WidenJoints => {
                let wide = [
                    u16::from(src[0]),
                    u16::from(src[1]),
                    u16::from(src[2]),
                    u16::from(src[3]),
                ];
                dst[..8].copy_from_slice(bytemuck::cast_slice(&wide));
            }
        }
    }
}

fn sign_not_zero(v: f32) -> f32 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

fn unorm16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Maps a direction onto the octahedron and quantises it to two unorm16s.
pub fn encode_octahedral(n: [f32; 3]) -> [u16; 2] {
    let l1 = n[0].abs() + n[1].abs() + n[2].abs();
    let (mut x, mut y) = if l1 > f32::EPSILON {
        (n[0] / l1, n[1] / l1)
    } else {
        (0.0, 0.0)
    };
    if n[2] < 0.0 {
        let ox = x;
        x = (1.0 - y.abs()) * sign_not_zero(ox);
        y = (1.0 - ox.abs()) * sign_not_zero(y);
    }
    [unorm16(x * 0.5 + 0.5), unorm16(y * 0.5 + 0.5)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octahedral_axes() {
        assert_eq!(encode_octahedral([0.0, 0.0, 1.0]), [32768, 32768]);
        assert_eq!(encode_octahedral([0.0, 0.0, -1.0]), [65535, 65535]);
        assert_eq!(encode_octahedral([1.0, 0.0, 0.0]), [65535, 32768]);
        assert_eq!(encode_octahedral([0.0, -1.0, 0.0]), [32768, 0]);
    }

    #[test]
    fn test_half_texcoords() {
        let src: Vec<u8> = bytemuck::cast_slice(&[0.5f32, -2.0]).to_vec();
        let mut dst = [0u8; 4];
        Packing::HalfFloat2.apply(&src, &mut dst);
        let out: [f16; 2] = bytemuck::pod_read_unaligned(&dst);
        assert_eq!(out, [f16::from_f32(0.5), f16::from_f32(-2.0)]);
    }

    #[test]
    fn test_joints_are_widened() {
        let mut dst = [0u8; 8];
        Packing::WidenJoints.apply(&[1, 2, 250, 4], &mut dst);
        let out: [u16; 4] = bytemuck::pod_read_unaligned(&dst);
        assert_eq!(out, [1, 2, 250, 4]);
    }

    #[test]
    fn test_unsupported_conversion() {
        assert_eq!(
            select_packing(VertexFormat::Float32x3, VertexFormat::Float32x3),
            Some(Packing::Copy)
        );
        assert_eq!(
            select_packing(VertexFormat::Float32x4, VertexFormat::Float32x2),
            None
        );
    }
}

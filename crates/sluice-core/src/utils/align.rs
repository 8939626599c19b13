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

//! Alignment arithmetic used for staging offsets and texture pitches.

/// Rounds `value` up to the next multiple of `alignment`, `None` when the
/// result does not fit in a `u32`.
///
/// An alignment of `0` or `1` leaves the value untouched. The alignment does
/// not need to be a power of two.
#[inline]
pub const fn round_up(value: u32, alignment: u32) -> Option<u32> {
    if alignment <= 1 {
        return Some(value);
    }
    value.div_ceil(alignment).checked_mul(alignment)
}

/// 64-bit variant of [`round_up`].
#[inline]
pub const fn round_up_u64(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        return Some(value);
    }
    value.div_ceil(alignment).checked_mul(alignment)
}

/// Size of a texture dimension at the given mip level, never below one texel.
#[inline]
pub const fn mip_reduce(size: u32, mip: u32) -> u32 {
    let reduced = if mip >= 32 { 0 } else { size >> mip };
    if reduced == 0 {
        1
    } else {
        reduced
    }
}

/// Length of a full mip chain for the given extent.
#[inline]
pub const fn max_mip_levels(width: u32, height: u32, depth: u32) -> u32 {
    let mut largest = if width > height { width } else { height };
    if depth > largest {
        largest = depth;
    }
    if largest == 0 {
        1
    } else {
        32 - largest.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_handles_degenerate_alignments() {
        assert_eq!(round_up(13, 0), Some(13));
        assert_eq!(round_up(13, 1), Some(13));
        assert_eq!(round_up_u64(13, 0), Some(13));
    }

    #[test]
    fn round_up_snaps_to_next_multiple() {
        assert_eq!(round_up(0, 256), Some(0));
        assert_eq!(round_up(1, 256), Some(256));
        assert_eq!(round_up(256, 256), Some(256));
        assert_eq!(round_up(257, 256), Some(512));
        // Non power of two block sizes appear with 12-byte formats.
        assert_eq!(round_up(13, 12), Some(24));
        assert_eq!(round_up_u64(8 << 20, 512), Some(8 << 20));
    }

    #[test]
    fn round_up_reports_overflow() {
        assert_eq!(round_up(0xFFFF_FFFC, 256), None);
        assert_eq!(round_up(u32::MAX - 255, 256), Some(u32::MAX - 255));
        assert_eq!(round_up_u64(u64::MAX - 1, 512), None);
    }

    #[test]
    fn max_mip_levels_follows_largest_dimension() {
        assert_eq!(max_mip_levels(1, 1, 1), 1);
        assert_eq!(max_mip_levels(256, 16, 1), 9);
        assert_eq!(max_mip_levels(4, 5, 1), 3);
        assert_eq!(max_mip_levels(2, 2, 64), 7);
        assert_eq!(max_mip_levels(u32::MAX, 1, 1), 32);
    }

    #[test]
    fn mip_reduce_clamps_to_one() {
        assert_eq!(mip_reduce(256, 0), 256);
        assert_eq!(mip_reduce(256, 3), 32);
        assert_eq!(mip_reduce(256, 8), 1);
        assert_eq!(mip_reduce(256, 12), 1);
        assert_eq!(mip_reduce(5, 1), 2);
        assert_eq!(mip_reduce(5, 40), 1);
    }
}

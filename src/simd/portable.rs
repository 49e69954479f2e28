use crate::simd::traits::{Chunk, DotLanes, RequantizeLanes, RescaleParams};
use crate::SIMD_WIDTH;

/// Lane backend written in plain integer arithmetic.
///
/// Compiled on every target. It is the active backend when the build script
/// detects no supported SIMD facility, and the yardstick the other backends
/// are tested against.
pub struct Portable;

impl DotLanes for Portable {
    type Acc = u32;

    #[inline(always)]
    fn zero() -> u32 {
        0
    }

    #[inline(always)]
    fn multiply_accumulate(acc: u32, lhs: &Chunk, rhs: &Chunk) -> u32 {
        lhs.iter()
            .zip(rhs.iter())
            .map(|(&l, &r)| u32::from(u16::from(l) * u16::from(r)))
            .fold(acc, u32::wrapping_add)
    }

    #[inline(always)]
    fn reduce(acc: u32) -> i32 {
        acc as i32
    }
}

/// Saturating `i32 → i16 → u8` narrow.
#[inline(always)]
pub(crate) fn saturate_u8(value: i32) -> u8 {
    let narrow = num::clamp(value, i32::from(i16::MIN), i32::from(i16::MAX));
    num::clamp(narrow, 0, i32::from(u8::MAX)) as u8
}

/// Wrapping rescale of a single accumulator, before the narrow.
#[inline(always)]
pub(crate) fn rescale(value: i32, params: &RescaleParams) -> i32 {
    let scaled = value
        .wrapping_add(params.row_offset)
        .wrapping_mul(params.multiplicative_offset)
        .wrapping_add(params.rounding_offset);

    if params.shift >= 0 {
        scaled >> params.shift
    } else {
        scaled.wrapping_shl(params.shift.unsigned_abs())
    }
}

impl RequantizeLanes for Portable {
    #[inline(always)]
    fn requantize(values: &[i32; SIMD_WIDTH], params: &RescaleParams) -> [u8; SIMD_WIDTH] {
        let mut out = [0u8; SIMD_WIDTH];
        for (dst, &value) in out.iter_mut().zip(values.iter()) {
            *dst = saturate_u8(rescale(value, params));
        }
        out
    }
}

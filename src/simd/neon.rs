//! ARM NEON lane backend for AArch64.
//!
//! The multiply stage maps directly onto the widening instructions: `vmull_u8`
//! forms eight `u16` products and `vpadalq_u16` folds them pairwise into four
//! `u32` partial sums. The requantize stage uses `vshlq_s32` with a negated
//! count, which shifts right for positive `shift` and left for negative, then
//! `vqmovn_s32`/`vqmovun_s16` for the double saturating narrow.

use std::arch::aarch64::*;

use crate::simd::traits::{Chunk, DotLanes, RequantizeLanes, RescaleParams};
use crate::SIMD_WIDTH;

/// NEON backend.
pub struct Neon;

#[inline]
#[target_feature(enable = "neon")]
unsafe fn multiply_accumulate_neon(acc: uint32x4_t, lhs: &Chunk, rhs: &Chunk) -> uint32x4_t {
    let products = vmull_u8(vld1_u8(lhs.as_ptr()), vld1_u8(rhs.as_ptr()));
    vpadalq_u16(acc, products)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn rescale_neon(values: int32x4_t, params: &RescaleParams) -> int32x4_t {
    let offset = vdupq_n_s32(params.row_offset);
    let multiplier = vdupq_n_s32(params.multiplicative_offset);
    let rounding = vdupq_n_s32(params.rounding_offset);
    let shift = vdupq_n_s32(params.shift.wrapping_neg());

    let scaled = vaddq_s32(vmulq_s32(vaddq_s32(values, offset), multiplier), rounding);
    vshlq_s32(scaled, shift)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn requantize_neon(
    values: &[i32; SIMD_WIDTH],
    params: &RescaleParams,
) -> [u8; SIMD_WIDTH] {
    let low = rescale_neon(vld1q_s32(values.as_ptr()), params);
    let high = rescale_neon(vld1q_s32(values.as_ptr().add(4)), params);

    let narrow = vcombine_s16(vqmovn_s32(low), vqmovn_s32(high));
    let bytes = vqmovun_s16(narrow);

    let mut out = [0u8; SIMD_WIDTH];
    vst1_u8(out.as_mut_ptr(), bytes);
    out
}

impl DotLanes for Neon {
    type Acc = uint32x4_t;

    #[inline(always)]
    fn zero() -> uint32x4_t {
        // SAFETY: NEON is part of the AArch64 baseline.
        unsafe { vdupq_n_u32(0) }
    }

    #[inline(always)]
    fn multiply_accumulate(acc: uint32x4_t, lhs: &Chunk, rhs: &Chunk) -> uint32x4_t {
        // SAFETY: as above; both chunks are exactly one 64-bit load.
        unsafe { multiply_accumulate_neon(acc, lhs, rhs) }
    }

    #[inline(always)]
    fn reduce(acc: uint32x4_t) -> i32 {
        // SAFETY: as above.
        unsafe { vaddvq_u32(acc) as i32 }
    }
}

impl RequantizeLanes for Neon {
    #[inline(always)]
    fn requantize(values: &[i32; SIMD_WIDTH], params: &RescaleParams) -> [u8; SIMD_WIDTH] {
        // SAFETY: as above; loads and stores stay inside the fixed-size arrays.
        unsafe { requantize_neon(values, params) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::portable::Portable;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_dot_matches_portable() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut neon = Neon::zero();
            let mut portable = Portable::zero();
            for _ in 0..rng.random_range(1..40) {
                let lhs: Chunk = rng.random();
                let rhs: Chunk = rng.random();
                neon = Neon::multiply_accumulate(neon, &lhs, &rhs);
                portable = Portable::multiply_accumulate(portable, &lhs, &rhs);
            }
            assert_eq!(Neon::reduce(neon), Portable::reduce(portable));
        }
    }

    #[test]
    fn test_requantize_matches_portable() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let shift = rng.random_range(-8..=16);
            let params = RescaleParams {
                row_offset: rng.random_range(-100_000..100_000),
                multiplicative_offset: rng.random_range(-64..64),
                rounding_offset: crate::tile::rounding_offset(shift),
                shift,
            };
            let values: [i32; SIMD_WIDTH] =
                std::array::from_fn(|_| rng.random_range(-1_000_000..1_000_000));
            assert_eq!(
                Neon::requantize(&values, &params),
                Portable::requantize(&values, &params)
            );
        }
    }
}

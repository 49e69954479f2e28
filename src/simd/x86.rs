//! SSE4.1 lane backend for x86_64.
//!
//! Selected when the build script reports `avx2` or `sse`. Only 128-bit integer
//! instructions are needed: one 8-byte chunk widens to eight `i16` lanes, so a
//! 256-bit register would sit half empty.
//!
//! - multiply: `pmovzxbw` both chunks, `pmaddwd` into four `i32` partial sums
//! - requantize: `paddd`/`pmulld`/`psrad` (or `pslld`), then `packssdw` and
//!   `packuswb` for the double saturating narrow

use std::arch::x86_64::*;

use crate::simd::traits::{Chunk, DotLanes, RequantizeLanes, RescaleParams};
use crate::SIMD_WIDTH;

/// SSE4.1 backend.
pub struct Sse41;

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn multiply_accumulate_sse41(acc: __m128i, lhs: &Chunk, rhs: &Chunk) -> __m128i {
    let lhs = _mm_cvtepu8_epi16(_mm_loadl_epi64(lhs.as_ptr() as *const __m128i));
    let rhs = _mm_cvtepu8_epi16(_mm_loadl_epi64(rhs.as_ptr() as *const __m128i));
    // u8 values are non-negative i16, so the signed pairwise madd is exact
    _mm_add_epi32(acc, _mm_madd_epi16(lhs, rhs))
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn reduce_sse41(acc: __m128i) -> i32 {
    let high = _mm_unpackhi_epi64(acc, acc);
    let pairs = _mm_add_epi32(acc, high);
    let swapped = _mm_shuffle_epi32::<0b0000_0001>(pairs);
    _mm_cvtsi128_si32(_mm_add_epi32(pairs, swapped))
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn rescale_sse41(values: __m128i, params: &RescaleParams) -> __m128i {
    let offset = _mm_set1_epi32(params.row_offset);
    let multiplier = _mm_set1_epi32(params.multiplicative_offset);
    let rounding = _mm_set1_epi32(params.rounding_offset);

    let scaled = _mm_add_epi32(
        _mm_mullo_epi32(_mm_add_epi32(values, offset), multiplier),
        rounding,
    );

    if params.shift >= 0 {
        _mm_sra_epi32(scaled, _mm_cvtsi32_si128(params.shift))
    } else {
        _mm_sll_epi32(scaled, _mm_cvtsi32_si128(-params.shift))
    }
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn requantize_sse41(
    values: &[i32; SIMD_WIDTH],
    params: &RescaleParams,
) -> [u8; SIMD_WIDTH] {
    let low = _mm_loadu_si128(values.as_ptr() as *const __m128i);
    let high = _mm_loadu_si128(values.as_ptr().add(4) as *const __m128i);

    let low = rescale_sse41(low, params);
    let high = rescale_sse41(high, params);

    let narrow = _mm_packs_epi32(low, high);
    let bytes = _mm_packus_epi16(narrow, narrow);

    let mut out = [0u8; SIMD_WIDTH];
    _mm_storel_epi64(out.as_mut_ptr() as *mut __m128i, bytes);
    out
}

impl DotLanes for Sse41 {
    type Acc = __m128i;

    #[inline(always)]
    fn zero() -> __m128i {
        // SAFETY: SSE2 is part of the x86_64 baseline.
        unsafe { _mm_setzero_si128() }
    }

    #[inline(always)]
    fn multiply_accumulate(acc: __m128i, lhs: &Chunk, rhs: &Chunk) -> __m128i {
        // SAFETY: this module is only built when SSE4.1 was detected.
        unsafe { multiply_accumulate_sse41(acc, lhs, rhs) }
    }

    #[inline(always)]
    fn reduce(acc: __m128i) -> i32 {
        // SAFETY: as above.
        unsafe { reduce_sse41(acc) }
    }
}

impl RequantizeLanes for Sse41 {
    #[inline(always)]
    fn requantize(values: &[i32; SIMD_WIDTH], params: &RescaleParams) -> [u8; SIMD_WIDTH] {
        // SAFETY: as above; loads and stores stay inside the fixed-size arrays.
        unsafe { requantize_sse41(values, params) }
    }
}

//! Quantization parameters and output stages.
//!
//! After the multiply kernel, accumulator cell `(i, j)` holds
//! `Σ lhs·rhs + lhs_offset·Σ rhs[·, j]`. The output stage adds the LHS row
//! aggregate (`rhs_offset·Σ lhs[i, ·]` plus the per-call constant) and turns
//! the exact `i32` result into the caller's element type.

use crate::error::{validation_error, Result};
use crate::simd::portable::rescale;
use crate::simd::{Lanes, RequantizeLanes, RescaleParams};
use crate::tile::rounding_offset;
use crate::utils::is_aligned_to;
use crate::SIMD_WIDTH;

/// Largest shift magnitude accepted in either direction.
pub const MAX_SHIFT: i32 = 31;

/// Offsets and rescale factor of an affine-quantized `u8` product.
///
/// `lhs_offset`/`rhs_offset` are added to the stored operand values (the
/// negated zero points). The real result is rescaled as
/// `(acc + result_offset) * multiplicative_offset >> shift`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantParams {
    pub lhs_offset: i32,
    pub rhs_offset: i32,
    pub result_offset: i32,
    pub multiplicative_offset: i32,
    pub shift: i32,
}

impl QuantParams {
    pub fn new(
        lhs_offset: i32,
        rhs_offset: i32,
        result_offset: i32,
        multiplicative_offset: i32,
        shift: i32,
    ) -> Self {
        Self {
            lhs_offset,
            rhs_offset,
            result_offset,
            multiplicative_offset,
            shift,
        }
    }

    /// Checks that `shift` lies in `-31..=31`.
    pub fn validate(&self) -> Result<()> {
        if !(-MAX_SHIFT..=MAX_SHIFT).contains(&self.shift) {
            return Err(validation_error(format!(
                "shift {} outside -{MAX_SHIFT}..={MAX_SHIFT}",
                self.shift
            )));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn rounding_offset(&self) -> i32 {
        rounding_offset(self.shift)
    }

    /// Constant folded into every LHS row aggregate:
    /// `k * lhs_offset * rhs_offset + result_offset`.
    pub fn lhs_additive_offset(&self, k: usize) -> i32 {
        product_constant(self.lhs_offset, self.rhs_offset, k).wrapping_add(self.result_offset)
    }
}

/// `k * lhs_offset * rhs_offset` in wrapping `i32` arithmetic.
#[inline(always)]
pub(crate) fn product_constant(lhs_offset: i32, rhs_offset: i32, k: usize) -> i32 {
    (k as i32)
        .wrapping_mul(lhs_offset)
        .wrapping_mul(rhs_offset)
}

/// Turns one accumulator row into one output row.
pub trait OutputStage {
    type Output: Copy;

    /// `acc_row` holds at least `out_row.len()` values; `row_aggregate` is the
    /// LHS panel's aggregate for this row.
    fn emit_row(&self, acc_row: &[i32], row_aggregate: i32, out_row: &mut [Self::Output]);
}

/// `u8` output: rescale, round, shift, then saturate through `i16`.
///
/// `ALIGNED` selects aligned 8-byte stores; it requires every output row to
/// start on an 8-byte boundary.
#[derive(Clone, Copy, Debug)]
pub struct Requantize<const ALIGNED: bool> {
    multiplicative_offset: i32,
    rounding_offset: i32,
    shift: i32,
}

impl<const ALIGNED: bool> Requantize<ALIGNED> {
    /// `params` must already have passed [`QuantParams::validate`].
    pub(crate) fn new(params: &QuantParams) -> Self {
        debug_assert!(
            (-MAX_SHIFT..=MAX_SHIFT).contains(&params.shift),
            "unvalidated shift {}",
            params.shift
        );
        Self {
            multiplicative_offset: params.multiplicative_offset,
            rounding_offset: params.rounding_offset(),
            shift: params.shift,
        }
    }

    #[inline(always)]
    fn rescale_params(&self, row_offset: i32) -> RescaleParams {
        RescaleParams {
            row_offset,
            multiplicative_offset: self.multiplicative_offset,
            rounding_offset: self.rounding_offset,
            shift: self.shift,
        }
    }

    /// Single-value form of [`OutputStage::emit_row`].
    pub fn requantize_one(&self, value: i32, row_aggregate: i32) -> u8 {
        crate::simd::portable::saturate_u8(rescale(value, &self.rescale_params(row_aggregate)))
    }
}

#[inline(always)]
fn store_chunk<const ALIGNED: bool>(dst: &mut [u8], bytes: [u8; SIMD_WIDTH]) {
    debug_assert!(dst.len() >= SIMD_WIDTH);
    let ptr = dst.as_mut_ptr() as *mut u64;
    let word = u64::from_ne_bytes(bytes);

    if ALIGNED {
        debug_assert!(is_aligned_to(ptr, SIMD_WIDTH), "aligned store to {ptr:p}");
        // SAFETY: `dst` holds at least 8 bytes at an 8-byte aligned address.
        unsafe { ptr.write(word) }
    } else {
        // SAFETY: `dst` holds at least 8 bytes.
        unsafe { ptr.write_unaligned(word) }
    }
}

impl<const ALIGNED: bool> OutputStage for Requantize<ALIGNED> {
    type Output = u8;

    fn emit_row(&self, acc_row: &[i32], row_aggregate: i32, out_row: &mut [u8]) {
        debug_assert!(acc_row.len() >= out_row.len());
        let params = self.rescale_params(row_aggregate);
        let len = out_row.len();

        let mut chunks = out_row.chunks_exact_mut(SIMD_WIDTH);
        for (i, dst) in chunks.by_ref().enumerate() {
            let src = &acc_row[i * SIMD_WIDTH..(i + 1) * SIMD_WIDTH];
            let values: [i32; SIMD_WIDTH] = std::array::from_fn(|lane| src[lane]);
            store_chunk::<ALIGNED>(dst, Lanes::requantize(&values, &params));
        }

        let tail = chunks.into_remainder();
        if tail.is_empty() {
            return;
        }

        let start = len - tail.len();
        let mut values = [0i32; SIMD_WIDTH];
        values[..tail.len()].copy_from_slice(&acc_row[start..start + tail.len()]);
        let bytes = Lanes::requantize(&values, &params);
        tail.copy_from_slice(&bytes[..tail.len()]);
    }
}

/// `i32` output: the exact offset-corrected dot product.
#[derive(Clone, Copy, Debug, Default)]
pub struct Widen;

impl OutputStage for Widen {
    type Output = i32;

    fn emit_row(&self, acc_row: &[i32], row_aggregate: i32, out_row: &mut [i32]) {
        for (dst, &acc) in out_row.iter_mut().zip(acc_row.iter()) {
            *dst = acc.wrapping_add(row_aggregate);
        }
    }
}

/// `f32` output: the exact offset-corrected dot product times `scale`.
#[derive(Clone, Copy, Debug)]
pub struct Dequantize {
    pub scale: f32,
}

impl OutputStage for Dequantize {
    type Output = f32;

    fn emit_row(&self, acc_row: &[i32], row_aggregate: i32, out_row: &mut [f32]) {
        for (dst, &acc) in out_row.iter_mut().zip(acc_row.iter()) {
            *dst = acc.wrapping_add(row_aggregate) as f32 * self.scale;
        }
    }
}

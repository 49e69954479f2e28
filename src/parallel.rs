//! Row-band parallel driver.
//!
//! The output is split into bands of whole LHS panels. Each band is an
//! independent single-threaded product of its LHS rows with the full RHS,
//! computed on the rayon pool with its own scratch arena. Bands never share
//! output rows, so the result is bit-identical to [`gemm_q8`].

use log::debug;
use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

use crate::error::Result;
use crate::gemm::{gemm_q8, validate_result, Operands};
use crate::quantize::QuantParams;
use crate::tile::GemmShape;
use crate::utils::AlignedBuffer;
use crate::MAX_TILE_ROWS;

/// Rounds `band_rows` up to a whole number of LHS panels.
#[inline(always)]
fn band_height(band_rows: usize) -> usize {
    band_rows.max(1).div_ceil(MAX_TILE_ROWS) * MAX_TILE_ROWS
}

/// [`gemm_q8`] computed in row bands of about `band_rows` rows on the rayon pool.
///
/// `band_rows` is rounded up to a multiple of 3. Scratch is allocated per band,
/// so no scratch argument is taken.
///
/// # Errors
///
/// The same validation as [`gemm_q8`], reported before any band runs.
pub fn par_gemm_q8(
    operands: &Operands<'_>,
    params: &QuantParams,
    result: &mut [u8],
    result_stride: usize,
    band_rows: usize,
) -> Result<()> {
    let GemmShape { n, m, k } = operands.shape;
    if operands.shape.is_empty() {
        return Ok(());
    }
    params.validate()?;
    operands.validate()?;
    validate_result(&operands.shape, result, result_stride)?;

    let band = band_height(band_rows);
    debug!(
        "par_gemm_q8 {}x{}x{}: {} bands of {} rows",
        n,
        m,
        k,
        n.div_ceil(band),
        band
    );

    let required = (n - 1) * result_stride + m;
    result[..required]
        .par_chunks_mut(band * result_stride)
        .enumerate()
        .try_for_each(|(index, out)| {
            let start = index * band;
            let rows = band.min(n - start);
            let band_operands = Operands {
                lhs: &operands.lhs[start * k..(start + rows) * k],
                shape: GemmShape::new(rows, m, k),
                ..*operands
            };

            let mut scratch = AlignedBuffer::scratch(rows, m, k)?;
            gemm_q8(&mut scratch, &band_operands, params, out, result_stride)
        })
}

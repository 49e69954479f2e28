//! Multiply-accumulate kernel.
//!
//! Computes a `rows × cols` tile of raw `u8` dot products over one packed LHS
//! panel and one packed RHS panel, then adds the RHS panel's per-column
//! aggregate to every row. The LHS per-row aggregate is left to the output
//! stage.

use crate::pack::PackedPanel;
use crate::simd::{DotLanes, Lanes};

/// Writes the tile for `lhs × rhs` into `acc`.
///
/// Cell `(row, col)` lands at `acc[row * acc_stride + col]`. Both panels must
/// share the same padded depth and hold 1 to 3 lanes each.
#[inline]
pub fn multiply_tile(
    lhs: &PackedPanel<'_>,
    rhs: &PackedPanel<'_>,
    acc: &mut [i32],
    acc_stride: usize,
) {
    multiply_tile_with::<Lanes>(lhs, rhs, acc, acc_stride)
}

/// [`multiply_tile`] over an explicit lane backend.
#[inline]
pub fn multiply_tile_with<D: DotLanes>(
    lhs: &PackedPanel<'_>,
    rhs: &PackedPanel<'_>,
    acc: &mut [i32],
    acc_stride: usize,
) {
    debug_assert_eq!(lhs.padded_k(), rhs.padded_k());
    debug_assert!(rhs.lanes() <= acc_stride);
    debug_assert!(acc.len() >= (lhs.lanes() - 1) * acc_stride + rhs.lanes());

    match (lhs.lanes(), rhs.lanes()) {
        (1, 1) => multiply_tile_fixed::<D, 1, 1>(lhs, rhs, acc, acc_stride),
        (1, 2) => multiply_tile_fixed::<D, 1, 2>(lhs, rhs, acc, acc_stride),
        (1, 3) => multiply_tile_fixed::<D, 1, 3>(lhs, rhs, acc, acc_stride),
        (2, 1) => multiply_tile_fixed::<D, 2, 1>(lhs, rhs, acc, acc_stride),
        (2, 2) => multiply_tile_fixed::<D, 2, 2>(lhs, rhs, acc, acc_stride),
        (2, 3) => multiply_tile_fixed::<D, 2, 3>(lhs, rhs, acc, acc_stride),
        (3, 1) => multiply_tile_fixed::<D, 3, 1>(lhs, rhs, acc, acc_stride),
        (3, 2) => multiply_tile_fixed::<D, 3, 2>(lhs, rhs, acc, acc_stride),
        (3, 3) => multiply_tile_fixed::<D, 3, 3>(lhs, rhs, acc, acc_stride),
        (rows, cols) => unreachable!("tile shape {rows}x{cols} outside 1..=3"),
    }
}

#[inline(always)]
fn multiply_tile_fixed<D: DotLanes, const ROWS: usize, const COLS: usize>(
    lhs: &PackedPanel<'_>,
    rhs: &PackedPanel<'_>,
    acc: &mut [i32],
    acc_stride: usize,
) {
    let mut cells = [[D::zero(); COLS]; ROWS];

    for c in 0..lhs.chunks() {
        let rhs_chunks: [_; COLS] = std::array::from_fn(|col| rhs.chunk(col, c));
        for (row, row_cells) in cells.iter_mut().enumerate() {
            let lhs_chunk = lhs.chunk(row, c);
            for (cell, rhs_chunk) in row_cells.iter_mut().zip(rhs_chunks.iter()) {
                *cell = D::multiply_accumulate(*cell, lhs_chunk, *rhs_chunk);
            }
        }
    }

    for (row, row_cells) in cells.iter().enumerate() {
        let out = &mut acc[row * acc_stride..row * acc_stride + COLS];
        for (col, (dst, &cell)) in out.iter_mut().zip(row_cells.iter()).enumerate() {
            *dst = D::reduce(cell).wrapping_add(rhs.aggregate(col));
        }
    }
}

//! Dispatcher and public entry points.
//!
//! One call runs a single pass over caller-owned scratch:
//!
//! 1. Partition the scratch arena for `(n, m, k)`.
//! 2. Split the columns into blocks whose packed RHS stays near
//!    [`CACHE_FRIENDLY_RHS_BYTES`](crate::tile::CACHE_FRIENDLY_RHS_BYTES).
//!    Small operands are one block.
//! 3. Per block, pack its RHS column panels once, with aggregates
//!    `lhs_offset * Σ rhs[·, j]`.
//! 4. For each LHS row panel: pack it with aggregates
//!    `rhs_offset * Σ lhs[i, ·] + constant`, run the multiply kernel against
//!    the block's RHS panels into the accumulator tile, then emit the finished
//!    output columns through the output stage.
//!
//! The aligned and unaligned paths are one generic routine instantiated twice.
//! [`Variant::select`] picks between them once per call.

use log::trace;

use crate::arena::ScratchArena;
use crate::error::{shape_error, validation_error, Result};
use crate::kernel::multiply_tile;
use crate::pack::{pack_panel, PackedPanel, PanelSource};
use crate::quantize::{product_constant, Dequantize, OutputStage, QuantParams, Requantize, Widen};
use crate::tile::{packed_panel_stride, rhs_block_columns, tiles, GemmShape, ScratchLayout};
use crate::utils::is_aligned_to;
use crate::{MAX_TILE_COLS, MAX_TILE_ROWS, SIMD_WIDTH};

/// Storage order of the RHS operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RhsOrder {
    /// `k × m`, row-major: element `(t, j)` at `rhs[t * m + j]`.
    #[default]
    RowMajor,
    /// `m × k`, row-major: element `(t, j)` at `rhs[j * k + t]`.
    Transposed,
}

/// The two `u8` operands of a product and their shape.
#[derive(Clone, Copy, Debug)]
pub struct Operands<'a> {
    /// `n × k`, row-major.
    pub lhs: &'a [u8],
    pub rhs: &'a [u8],
    pub shape: GemmShape,
    pub rhs_order: RhsOrder,
}

impl<'a> Operands<'a> {
    /// Operands with a row-major `k × m` RHS.
    pub fn new(lhs: &'a [u8], rhs: &'a [u8], n: usize, m: usize, k: usize) -> Self {
        Self {
            lhs,
            rhs,
            shape: GemmShape::new(n, m, k),
            rhs_order: RhsOrder::RowMajor,
        }
    }

    /// Operands with the RHS stored as `m × k` (one row per output column).
    pub fn with_transposed_rhs(lhs: &'a [u8], rhs: &'a [u8], n: usize, m: usize, k: usize) -> Self {
        Self {
            rhs_order: RhsOrder::Transposed,
            ..Self::new(lhs, rhs, n, m, k)
        }
    }

    /// RHS element at depth `t`, column `j`.
    #[inline(always)]
    pub fn rhs_at(&self, t: usize, j: usize) -> u8 {
        match self.rhs_order {
            RhsOrder::RowMajor => self.rhs[t * self.shape.m + j],
            RhsOrder::Transposed => self.rhs[j * self.shape.k + t],
        }
    }

    /// Checks that `k >= 1` and that both slices cover the declared shape.
    pub fn validate(&self) -> Result<()> {
        let GemmShape { n, m, k } = self.shape;
        if k == 0 {
            return Err(validation_error("inner dimension k must be at least 1"));
        }
        if self.lhs.len() < n * k {
            return Err(shape_error("lhs", n * k, self.lhs.len()));
        }
        if self.rhs.len() < k * m {
            return Err(shape_error("rhs", k * m, self.rhs.len()));
        }
        Ok(())
    }

    #[inline(always)]
    fn lhs_panel(&self, row: usize, rows: usize) -> PanelSource<'a> {
        PanelSource::lhs_rows(self.lhs, self.shape.k, row, rows)
    }

    #[inline(always)]
    fn rhs_panel(&self, col: usize, cols: usize) -> PanelSource<'a> {
        let GemmShape { m, k, .. } = self.shape;
        match self.rhs_order {
            RhsOrder::RowMajor => PanelSource::rhs_columns(self.rhs, m, k, col, cols),
            RhsOrder::Transposed => PanelSource::rhs_transposed(self.rhs, k, col, cols),
        }
    }
}

/// Whether the aligned load/store path may be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    Aligned,
    Unaligned,
}

/// The specialisation chosen for one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Variant {
    /// `n % 3`: rows in the last LHS panel, or 0 when all panels are full.
    pub rows_remainder: usize,
    /// `m % 3`: columns in the last RHS panel, or 0 when all panels are full.
    pub cols_remainder: usize,
    /// `k % 8`: real values in the last depth chunk, or 0 when it is full.
    pub k_remainder: usize,
    pub alignment: Alignment,
}

impl Variant {
    /// Picks the variant for `operands` writing to `result` with a row stride
    /// of `result_stride` elements.
    ///
    /// Aligned requires the LHS, RHS and result pointers on 8-byte boundaries,
    /// `k % 8 == 0` and a result row stride that is a multiple of 8 bytes.
    pub fn select<T>(operands: &Operands<'_>, result: *const T, result_stride: usize) -> Self {
        let GemmShape { n, m, k } = operands.shape;
        let stride_bytes = result_stride * std::mem::size_of::<T>();

        let aligned = is_aligned_to(operands.lhs.as_ptr(), SIMD_WIDTH)
            && is_aligned_to(operands.rhs.as_ptr(), SIMD_WIDTH)
            && is_aligned_to(result, SIMD_WIDTH)
            && k % SIMD_WIDTH == 0
            && stride_bytes % SIMD_WIDTH == 0;

        Self {
            rows_remainder: n % MAX_TILE_ROWS,
            cols_remainder: m % MAX_TILE_COLS,
            k_remainder: k % SIMD_WIDTH,
            alignment: if aligned {
                Alignment::Aligned
            } else {
                Alignment::Unaligned
            },
        }
    }

    #[inline(always)]
    pub fn is_aligned(&self) -> bool {
        self.alignment == Alignment::Aligned
    }
}

/// Offsets baked into the packed aggregates.
#[derive(Clone, Copy, Debug)]
struct ZeroPoints {
    lhs: i32,
    rhs: i32,
    /// Added to every LHS row aggregate.
    additive: i32,
}

/// Checks that `result` holds `n` rows of `m` values at `result_stride`.
pub(crate) fn validate_result<T>(
    shape: &GemmShape,
    result: &[T],
    result_stride: usize,
) -> Result<()> {
    if result_stride < shape.m {
        return Err(validation_error(format!(
            "result stride {} is smaller than m = {}",
            result_stride, shape.m
        )));
    }
    let required = (shape.n - 1) * result_stride + shape.m;
    if result.len() < required {
        return Err(shape_error("result", required, result.len()));
    }
    Ok(())
}

/// The single-pass core. Inputs are validated by the caller.
fn run<S: OutputStage, const ALIGNED: bool>(
    scratch: &mut [u8],
    operands: &Operands<'_>,
    zero_points: ZeroPoints,
    stage: &S,
    result: &mut [S::Output],
    result_stride: usize,
) -> Result<()> {
    let GemmShape { m, .. } = operands.shape;
    let layout = ScratchLayout::new(operands.shape);
    let ScratchArena {
        lhs_panel,
        rhs_panels,
        accumulator,
        layout,
    } = ScratchArena::partition(scratch, &layout)?;
    let padded_k = layout.padded_k;
    let acc_stride = layout.accumulator_stride;
    let block = rhs_block_columns(m, padded_k);

    for (block_col, block_cols) in tiles(m, block) {
        let mut packed = 0;
        for (col, cols) in tiles(block_cols, MAX_TILE_COLS) {
            let stride = packed_panel_stride(cols, padded_k);
            pack_panel::<ALIGNED>(
                &operands.rhs_panel(block_col + col, cols),
                zero_points.lhs,
                0,
                &mut rhs_panels[packed..packed + stride],
            );
            packed += stride;
        }
        let block_panels: &[u8] = &rhs_panels[..packed];

        for (row, rows) in tiles(operands.shape.n, MAX_TILE_ROWS) {
            let lhs_stride = packed_panel_stride(rows, padded_k);
            pack_panel::<ALIGNED>(
                &operands.lhs_panel(row, rows),
                zero_points.rhs,
                zero_points.additive,
                &mut lhs_panel[..lhs_stride],
            );
            let lhs = PackedPanel::new(&lhs_panel[..lhs_stride], rows, padded_k);

            let mut offset = 0;
            for (col, cols) in tiles(block_cols, MAX_TILE_COLS) {
                let stride = packed_panel_stride(cols, padded_k);
                let rhs = PackedPanel::new(&block_panels[offset..offset + stride], cols, padded_k);
                multiply_tile(&lhs, &rhs, &mut accumulator[col..], acc_stride);
                offset += stride;
            }

            for r in 0..rows {
                let acc_row = &accumulator[r * acc_stride..r * acc_stride + block_cols];
                let out_start = (row + r) * result_stride + block_col;
                let out_row = &mut result[out_start..out_start + block_cols];
                stage.emit_row(acc_row, lhs.aggregate(r), out_row);
            }
        }
    }

    Ok(())
}

/// Validates, selects the variant and runs the core with the output stage
/// matching its alignment.
fn dispatch<T, A, U>(
    scratch: &mut [u8],
    operands: &Operands<'_>,
    zero_points: ZeroPoints,
    aligned_stage: A,
    unaligned_stage: U,
    result: &mut [T],
    result_stride: usize,
) -> Result<()>
where
    A: OutputStage<Output = T>,
    U: OutputStage<Output = T>,
{
    if operands.shape.is_empty() {
        return Ok(());
    }
    operands.validate()?;
    validate_result(&operands.shape, result, result_stride)?;

    let variant = Variant::select(operands, result.as_ptr(), result_stride);
    trace!(
        "gemm {}x{}x{}: {:?}",
        operands.shape.n,
        operands.shape.m,
        operands.shape.k,
        variant
    );

    if variant.is_aligned() {
        run::<A, true>(scratch, operands, zero_points, &aligned_stage, result, result_stride)
    } else {
        run::<U, false>(scratch, operands, zero_points, &unaligned_stage, result, result_stride)
    }
}

/// Quantized `u8` product with a strided result.
///
/// Row `i` of the result starts at `result[i * result_stride]`; the `m`
/// values of each row are overwritten and nothing else is touched.
///
/// # Errors
///
/// Fails when `k == 0`, an operand or `result` is too short for the shape,
/// `result_stride < m`, `shift` is outside `-31..=31`, or `scratch` is shorter
/// than [`scratch_size`](crate::scratch_size). Empty shapes return `Ok(())`.
pub fn gemm_q8(
    scratch: &mut [u8],
    operands: &Operands<'_>,
    params: &QuantParams,
    result: &mut [u8],
    result_stride: usize,
) -> Result<()> {
    params.validate()?;
    let zero_points = ZeroPoints {
        lhs: params.lhs_offset,
        rhs: params.rhs_offset,
        additive: params.lhs_additive_offset(operands.shape.k),
    };
    dispatch(
        scratch,
        operands,
        zero_points,
        Requantize::<true>::new(params),
        Requantize::<false>::new(params),
        result,
        result_stride,
    )
}

/// `i32` product: `Σ (lhs + lhs_offset) * (rhs + rhs_offset)` per cell.
pub fn gemm_i32(
    scratch: &mut [u8],
    operands: &Operands<'_>,
    lhs_offset: i32,
    rhs_offset: i32,
    result: &mut [i32],
    result_stride: usize,
) -> Result<()> {
    let zero_points = ZeroPoints {
        lhs: lhs_offset,
        rhs: rhs_offset,
        additive: product_constant(lhs_offset, rhs_offset, operands.shape.k),
    };
    dispatch(scratch, operands, zero_points, Widen, Widen, result, result_stride)
}

/// `f32` product: the [`gemm_i32`] value of each cell multiplied by `scale`.
pub fn gemm_f32(
    scratch: &mut [u8],
    operands: &Operands<'_>,
    lhs_offset: i32,
    rhs_offset: i32,
    scale: f32,
    result: &mut [f32],
    result_stride: usize,
) -> Result<()> {
    let zero_points = ZeroPoints {
        lhs: lhs_offset,
        rhs: rhs_offset,
        additive: product_constant(lhs_offset, rhs_offset, operands.shape.k),
    };
    let stage = Dequantize { scale };
    dispatch(scratch, operands, zero_points, stage, stage, result, result_stride)
}

/// Multiplies the `n × k` matrix `lhs` by the `k × m` matrix `rhs` into the
/// `n × m` matrix `result`, all row-major `u8`.
///
/// With `acc = Σ (lhs + lhs_offset) * (rhs + rhs_offset)`, each output is
/// `((acc + result_offset) * multiplicative_offset + r) >> shift`
/// saturated to `0..=255`, where `r = 1 << (shift - 1)` for positive `shift`
/// and 0 otherwise. A negative `shift` shifts left.
///
/// `scratch` must hold at least [`scratch_size`](crate::scratch_size)`(n, m, k)`
/// bytes; its previous contents are irrelevant.
///
/// # Errors
///
/// See [`gemm_q8`].
#[allow(clippy::too_many_arguments)]
pub fn gemm(
    scratch: &mut [u8],
    lhs: &[u8],
    rhs: &[u8],
    n: usize,
    m: usize,
    k: usize,
    lhs_offset: i32,
    rhs_offset: i32,
    result_offset: i32,
    multiplicative_offset: i32,
    shift: i32,
    result: &mut [u8],
) -> Result<()> {
    let operands = Operands::new(lhs, rhs, n, m, k);
    let params = QuantParams::new(
        lhs_offset,
        rhs_offset,
        result_offset,
        multiplicative_offset,
        shift,
    );
    gemm_q8(scratch, &operands, &params, result, m)
}

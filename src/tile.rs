//! Padding, stride and scratch-size arithmetic shared by every stage.
//!
//! The packer, the multiply kernel, the requantizer and the arena all index
//! scratch memory through these functions, so a layout change happens here or
//! nowhere.

use crate::{AGGREGATE_RESERVE, ARENA_ALIGNMENT, MAX_TILE_COLS, MAX_TILE_ROWS, SIMD_WIDTH};

/// RHS bytes packed at once before the column range is split into blocks.
pub const CACHE_FRIENDLY_RHS_BYTES: usize = 24 * 1024;

/// Number of `i32` accumulators per 16-byte accumulator row alignment unit.
const ACCUMULATOR_ALIGNMENT: usize = 16 / std::mem::size_of::<i32>();

/// Logical problem size: `lhs` is `n × k`, `rhs` is `k × m`, `result` is `n × m`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GemmShape {
    pub n: usize,
    pub m: usize,
    pub k: usize,
}

impl GemmShape {
    pub fn new(n: usize, m: usize, k: usize) -> Self {
        Self { n, m, k }
    }

    /// `true` when the product has no output element.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.n == 0 || self.m == 0
    }
}

/// Rounds `k` up to the next multiple of [`SIMD_WIDTH`].
#[inline(always)]
pub const fn padded_k(k: usize) -> usize {
    k.div_ceil(SIMD_WIDTH) * SIMD_WIDTH
}

/// Bytes occupied by one packed panel of `lanes` rows or columns, including
/// the reserve for its trailing aggregates.
#[inline(always)]
pub const fn packed_panel_stride(lanes: usize, padded_k: usize) -> usize {
    (padded_k + AGGREGATE_RESERVE) * lanes
}

/// Row stride, in `i32` elements, of an accumulator tile `cols` wide.
#[inline(always)]
pub const fn accumulator_stride(cols: usize) -> usize {
    cols.div_ceil(ACCUMULATOR_ALIGNMENT) * ACCUMULATOR_ALIGNMENT
}

/// Bytes needed to hold every packed RHS panel of an `m`-column operand.
///
/// Full panels are [`MAX_TILE_COLS`] lanes wide; the last one holds `m % 3`
/// lanes when `m` is not a multiple of three, so the total is linear in `m`.
#[inline(always)]
pub const fn packed_rhs_size(m: usize, padded_k: usize) -> usize {
    (padded_k + AGGREGATE_RESERVE) * m
}

/// Rounding constant pre-added before the right shift: `1 << (shift - 1)`.
///
/// Zero when `shift <= 0`, where no bits are discarded.
#[inline(always)]
pub const fn rounding_offset(shift: i32) -> i32 {
    if shift > 0 {
        1 << (shift - 1)
    } else {
        0
    }
}

/// Columns of RHS packed per block so one block stays near
/// [`CACHE_FRIENDLY_RHS_BYTES`].
///
/// Small operands are a single block of `m` columns. Otherwise blocks are a
/// multiple of `MAX_TILE_COLS * SIMD_WIDTH` columns, which keeps every block
/// start on a full panel and on an 8-byte output boundary.
pub fn rhs_block_columns(m: usize, padded_k: usize) -> usize {
    if m * padded_k <= CACHE_FRIENDLY_RHS_BYTES {
        return m;
    }
    let unit = MAX_TILE_COLS * SIMD_WIDTH;
    (CACHE_FRIENDLY_RHS_BYTES / (padded_k * unit)).max(1) * unit
}

#[inline(always)]
const fn round_up(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}

/// Sizes of the scratch regions one call needs for a given shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchLayout {
    /// `k` rounded up to [`SIMD_WIDTH`].
    pub padded_k: usize,
    /// Bytes of the packed LHS row panel, reused for every row iteration.
    pub lhs_panel_bytes: usize,
    /// Bytes for every packed RHS panel. Column blocks reuse the front of it.
    pub rhs_panels_bytes: usize,
    /// Row stride of the accumulator tile in `i32` elements.
    pub accumulator_stride: usize,
    /// Number of `i32` elements in the accumulator tile.
    pub accumulator_len: usize,
}

impl ScratchLayout {
    pub fn new(shape: GemmShape) -> Self {
        let padded_k = padded_k(shape.k);
        let accumulator_stride = accumulator_stride(shape.m);

        Self {
            padded_k,
            lhs_panel_bytes: packed_panel_stride(MAX_TILE_ROWS, padded_k),
            rhs_panels_bytes: packed_rhs_size(shape.m, padded_k),
            accumulator_stride,
            accumulator_len: MAX_TILE_ROWS * accumulator_stride,
        }
    }

    /// Byte size of the accumulator region.
    #[inline(always)]
    pub fn accumulator_bytes(&self) -> usize {
        self.accumulator_len * std::mem::size_of::<i32>()
    }

    /// Total scratch bytes: each region rounded to [`ARENA_ALIGNMENT`] plus
    /// slack to align an arbitrary base address.
    pub fn total_bytes(&self) -> usize {
        ARENA_ALIGNMENT
            + round_up(self.lhs_panel_bytes, ARENA_ALIGNMENT)
            + round_up(self.rhs_panels_bytes, ARENA_ALIGNMENT)
            + round_up(self.accumulator_bytes(), ARENA_ALIGNMENT)
    }

    /// Byte offsets, from the aligned base, of the LHS, RHS and accumulator regions.
    #[inline(always)]
    pub(crate) fn region_offsets(&self) -> (usize, usize, usize) {
        let rhs = round_up(self.lhs_panel_bytes, ARENA_ALIGNMENT);
        let accumulator = rhs + round_up(self.rhs_panels_bytes, ARENA_ALIGNMENT);
        (0, rhs, accumulator)
    }
}

/// Scratch bytes a caller must provide to multiply an `n × k` by a `k × m` matrix.
pub fn scratch_size(n: usize, m: usize, k: usize) -> usize {
    ScratchLayout::new(GemmShape::new(n, m, k)).total_bytes()
}

/// Splits `count` into full tiles of `tile` plus the leftover, as `(start, len)` pairs.
#[inline(always)]
pub(crate) fn tiles(count: usize, tile: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..count)
        .step_by(tile)
        .map(move |start| (start, tile.min(count - start)))
}

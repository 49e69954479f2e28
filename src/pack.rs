//! Panel packing.
//!
//! A panel is 1 to 3 rows of the LHS or columns of the RHS, taken over the
//! full depth `k`. Packing re-lays it out so the multiply kernel reads one
//! 8-byte chunk per lane per step:
//!
//! ```text
//! chunk 0: lane0[0..8] lane1[0..8] lane2[0..8]
//! chunk 1: lane0[8..16] ...
//! ...
//! padded_k * lanes: aggregate(lane0) aggregate(lane1) aggregate(lane2)   (i32, native endian)
//! ```
//!
//! Depth past `k` is zero-filled. Each aggregate is
//! `additive_offset + other_offset * Σ raw[lane, t]` over the `k` real values,
//! in wrapping `i32` arithmetic.

use crate::simd::Chunk;
use crate::tile::{packed_panel_stride, padded_k};
use crate::utils::is_aligned_to;
use crate::{MAX_TILE_ROWS, SIMD_WIDTH};

const AGGREGATE_BYTES: usize = std::mem::size_of::<i32>();

/// A strided view of the operand values that make up one panel.
///
/// Value `(lane, t)` lives at `data[lane * lane_stride + t * depth_stride]`.
#[derive(Clone, Copy, Debug)]
pub struct PanelSource<'a> {
    pub data: &'a [u8],
    pub lanes: usize,
    pub depth: usize,
    pub lane_stride: usize,
    pub depth_stride: usize,
}

impl<'a> PanelSource<'a> {
    /// `lanes` consecutive rows of a row-major `? × k` LHS, starting at `row`.
    pub fn lhs_rows(lhs: &'a [u8], k: usize, row: usize, lanes: usize) -> Self {
        Self {
            data: &lhs[row * k..],
            lanes,
            depth: k,
            lane_stride: k,
            depth_stride: 1,
        }
    }

    /// `lanes` consecutive columns of a row-major `k × m` RHS, starting at `col`.
    pub fn rhs_columns(rhs: &'a [u8], m: usize, k: usize, col: usize, lanes: usize) -> Self {
        Self {
            data: &rhs[col..],
            lanes,
            depth: k,
            lane_stride: 1,
            depth_stride: m,
        }
    }

    /// `lanes` consecutive columns of an RHS stored transposed (`m × k`, row-major).
    pub fn rhs_transposed(rhs: &'a [u8], k: usize, col: usize, lanes: usize) -> Self {
        Self::lhs_rows(rhs, k, col, lanes)
    }

    /// Smallest `data` length this view reads from.
    pub fn extent(&self) -> usize {
        (self.lanes - 1) * self.lane_stride + (self.depth - 1) * self.depth_stride + 1
    }

    /// `true` when a lane's values are adjacent in memory.
    #[inline(always)]
    fn is_contiguous(&self) -> bool {
        self.depth_stride == 1
    }

    #[inline(always)]
    fn value(&self, lane: usize, t: usize) -> u8 {
        self.data[lane * self.lane_stride + t * self.depth_stride]
    }

    /// Reads `len <= SIMD_WIDTH` values of `lane` starting at depth `t`,
    /// zero-filling the rest of the chunk.
    #[inline(always)]
    fn chunk<const ALIGNED: bool>(&self, lane: usize, t: usize, len: usize) -> Chunk {
        if self.is_contiguous() {
            let start = lane * self.lane_stride + t;
            if len == SIMD_WIDTH {
                return load_chunk::<ALIGNED>(&self.data[start..start + SIMD_WIDTH]);
            }
            let mut chunk = [0u8; SIMD_WIDTH];
            chunk[..len].copy_from_slice(&self.data[start..start + len]);
            return chunk;
        }

        let mut chunk = [0u8; SIMD_WIDTH];
        for (i, dst) in chunk.iter_mut().take(len).enumerate() {
            *dst = self.value(lane, t + i);
        }
        chunk
    }
}

#[inline(always)]
fn load_chunk<const ALIGNED: bool>(src: &[u8]) -> Chunk {
    debug_assert!(src.len() >= SIMD_WIDTH);
    let ptr = src.as_ptr() as *const u64;

    let word = if ALIGNED {
        debug_assert!(is_aligned_to(ptr, SIMD_WIDTH), "aligned load from {ptr:p}");
        // SAFETY: `src` holds at least 8 bytes and the aligned variant is only
        // selected when every chunk start is 8-byte aligned.
        unsafe { ptr.read() }
    } else {
        // SAFETY: `src` holds at least 8 bytes.
        unsafe { ptr.read_unaligned() }
    };

    word.to_ne_bytes()
}

#[inline(always)]
fn chunk_sum(chunk: &Chunk) -> u32 {
    chunk.iter().map(|&v| u32::from(v)).sum()
}

/// Packs `source` into `out`.
///
/// `other_offset` is the zero-point offset of the operand this panel will be
/// multiplied with; `additive_offset` is folded into every aggregate as is.
/// `out` must hold at least [`packed_panel_stride`]`(lanes, padded_k(depth))`
/// bytes.
///
/// `ALIGNED` selects aligned 8-byte loads for contiguous sources; the output is
/// identical either way.
pub fn pack_panel<const ALIGNED: bool>(
    source: &PanelSource<'_>,
    other_offset: i32,
    additive_offset: i32,
    out: &mut [u8],
) {
    let lanes = source.lanes;
    let depth = source.depth;
    let padded = padded_k(depth);

    debug_assert!((1..=MAX_TILE_ROWS).contains(&lanes), "lanes = {lanes}");
    debug_assert!(depth >= 1, "empty panel depth");
    debug_assert!(source.data.len() >= source.extent());
    debug_assert!(out.len() >= packed_panel_stride(lanes, padded));

    let mut sums = [0u32; MAX_TILE_ROWS];
    let group = lanes * SIMD_WIDTH;

    for (c, dst_group) in out[..padded * lanes].chunks_exact_mut(group).enumerate() {
        let t = c * SIMD_WIDTH;
        let len = SIMD_WIDTH.min(depth - t);

        for (lane, dst) in dst_group.chunks_exact_mut(SIMD_WIDTH).enumerate() {
            let chunk = source.chunk::<ALIGNED>(lane, t, len);
            sums[lane] = sums[lane].wrapping_add(chunk_sum(&chunk));
            dst.copy_from_slice(&chunk);
        }
    }

    let aggregates = &mut out[padded * lanes..(padded + AGGREGATE_BYTES) * lanes];
    for (dst, &sum) in aggregates
        .chunks_exact_mut(AGGREGATE_BYTES)
        .zip(sums.iter())
    {
        let aggregate = additive_offset.wrapping_add(other_offset.wrapping_mul(sum as i32));
        dst.copy_from_slice(&aggregate.to_ne_bytes());
    }
}

/// Read-only view over a packed panel.
#[derive(Clone, Copy, Debug)]
pub struct PackedPanel<'a> {
    data: &'a [u8],
    lanes: usize,
    padded_k: usize,
}

impl<'a> PackedPanel<'a> {
    pub fn new(data: &'a [u8], lanes: usize, padded_k: usize) -> Self {
        debug_assert!((1..=MAX_TILE_ROWS).contains(&lanes), "lanes = {lanes}");
        debug_assert_eq!(padded_k % SIMD_WIDTH, 0);
        debug_assert!(data.len() >= (padded_k + AGGREGATE_BYTES) * lanes);
        Self {
            data,
            lanes,
            padded_k,
        }
    }

    #[inline(always)]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    #[inline(always)]
    pub fn padded_k(&self) -> usize {
        self.padded_k
    }

    /// Number of 8-byte depth chunks per lane.
    #[inline(always)]
    pub fn chunks(&self) -> usize {
        self.padded_k / SIMD_WIDTH
    }

    /// The `c`-th depth chunk of `lane`.
    #[inline(always)]
    pub fn chunk(&self, lane: usize, c: usize) -> &'a Chunk {
        let start = (c * self.lanes + lane) * SIMD_WIDTH;
        let bytes = &self.data[start..start + SIMD_WIDTH];
        // SAFETY: `bytes` is exactly SIMD_WIDTH long and `Chunk` has alignment 1.
        unsafe { &*(bytes.as_ptr() as *const Chunk) }
    }

    /// The aggregate correction stored for `lane`.
    #[inline(always)]
    pub fn aggregate(&self, lane: usize) -> i32 {
        let start = self.padded_k * self.lanes + lane * AGGREGATE_BYTES;
        let b = &self.data[start..start + AGGREGATE_BYTES];
        i32::from_ne_bytes([b[0], b[1], b[2], b[3]])
    }
}

use crate::SIMD_WIDTH;

/// One depth chunk of a packed lane.
pub type Chunk = [u8; SIMD_WIDTH];

/// Integer dot products over packed 8-byte chunks.
///
/// Products are `u8 × u8 → u16`, widened pairwise into 32-bit lanes. All
/// arithmetic wraps modulo 2³², so every backend yields the same bits.
pub trait DotLanes {
    /// Per-cell partial sums carried across depth chunks.
    type Acc: Copy;

    fn zero() -> Self::Acc;

    fn multiply_accumulate(acc: Self::Acc, lhs: &Chunk, rhs: &Chunk) -> Self::Acc;

    /// Horizontal reduction of a cell's partial sums.
    fn reduce(acc: Self::Acc) -> i32;
}

/// Output-side rescale constants for one accumulator row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RescaleParams {
    /// Per-row aggregate correction, added before the multiply.
    pub row_offset: i32,
    pub multiplicative_offset: i32,
    pub rounding_offset: i32,
    /// Arithmetic right shift; negative values shift left.
    pub shift: i32,
}

/// `i32 → u8` requantization of eight accumulators at a time.
pub trait RequantizeLanes {
    /// `((v + row_offset) * multiplicative_offset + rounding_offset) >> shift`,
    /// narrowed `i32 → i16 → u8` with saturation at each step.
    fn requantize(values: &[i32; SIMD_WIDTH], params: &RescaleParams) -> [u8; SIMD_WIDTH];
}

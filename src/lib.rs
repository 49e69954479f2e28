//! Fixed-point 8-bit quantized matrix multiplication.
//!
//! `qgemm` multiplies two matrices of affine-quantized `u8` values, accumulates
//! in `i32` and rescales the result back to `u8` (or widens it to `i32`/`f32`).
//! One call runs four stages on a single thread over caller-supplied scratch:
//!
//! 1. [`pack`]: operand panels are re-laid out in 8-byte lane chunks, followed by
//!    one `i32` zero-point correction per lane.
//! 2. [`kernel`]: a `rows × cols` tile (each `1..=3`) of raw dot products is
//!    computed over two packed panels.
//! 3. [`quantize`]: accumulator rows are rescaled, rounded and saturated.
//! 4. [`gemm`]: the dispatcher selects the tile shape and alignment variant and
//!    drives the other three.
//!
//! ```rust
//! use qgemm::{gemm, scratch_size};
//!
//! let (n, m, k) = (4, 5, 10);
//! let lhs = vec![100u8; n * k];
//! let rhs = vec![50u8; k * m];
//! let mut result = vec![0u8; n * m];
//! let mut scratch = vec![0u8; scratch_size(n, m, k)];
//!
//! gemm(&mut scratch, &lhs, &rhs, n, m, k, -100, -50, 128, 1, 0, &mut result).unwrap();
//! assert!(result.iter().all(|&v| v == 128));
//! ```

pub mod arena;
pub mod error;
pub mod gemm;
pub mod kernel;
pub mod pack;
pub mod parallel;
pub mod quantize;
pub mod reference;
pub mod simd;
pub mod tile;
pub mod utils;

pub use error::{QgemmError, Result};
pub use gemm::{gemm, gemm_f32, gemm_i32, gemm_q8, Alignment, Operands, RhsOrder, Variant};
pub use parallel::par_gemm_q8;
pub use quantize::QuantParams;
pub use tile::{scratch_size, GemmShape, ScratchLayout};

/// Depth chunk width: one packed lane chunk holds this many bytes.
pub const SIMD_WIDTH: usize = 8;

/// Largest number of LHS rows handled by one tile.
pub const MAX_TILE_ROWS: usize = 3;

/// Largest number of RHS columns handled by one tile.
pub const MAX_TILE_COLS: usize = 3;

/// Bytes reserved per lane after a packed panel for its aggregate correction.
pub const AGGREGATE_RESERVE: usize = 16;

/// Alignment of every scratch region handed out by [`arena::ScratchArena`].
pub const ARENA_ALIGNMENT: usize = 16;

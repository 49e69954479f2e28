//! Scalar twins of the public products.
//!
//! Straight triple loops in `i64`, with no packing and no lane backend. They
//! define the expected output of the fast paths and back the integration
//! tests and benchmarks.

use crate::gemm::Operands;
use crate::quantize::QuantParams;
use crate::tile::GemmShape;

/// `Σ_t (lhs[i, t] + lhs_offset) * (rhs[t, j] + rhs_offset)` for every cell.
fn offset_products(operands: &Operands<'_>, lhs_offset: i32, rhs_offset: i32) -> Vec<i64> {
    let GemmShape { n, m, k } = operands.shape;
    let mut products = vec![0i64; n * m];

    for i in 0..n {
        for j in 0..m {
            products[i * m + j] = (0..k)
                .map(|t| {
                    let l = i64::from(operands.lhs[i * k + t]) + i64::from(lhs_offset);
                    let r = i64::from(operands.rhs_at(t, j)) + i64::from(rhs_offset);
                    l * r
                })
                .sum();
        }
    }

    products
}

/// Rescales one exact product the way [`crate::gemm_q8`] does, in `i64`.
pub fn requantize(product: i64, params: &QuantParams) -> u8 {
    let scaled = (product + i64::from(params.result_offset))
        * i64::from(params.multiplicative_offset)
        + i64::from(params.rounding_offset());

    let shifted = if params.shift >= 0 {
        scaled >> params.shift
    } else {
        scaled << -params.shift
    };

    num::clamp(shifted, 0, i64::from(u8::MAX)) as u8
}

/// Reference for [`crate::gemm_q8`].
pub fn gemm_q8(
    operands: &Operands<'_>,
    params: &QuantParams,
    result: &mut [u8],
    result_stride: usize,
) {
    let GemmShape { n, m, .. } = operands.shape;
    assert!(result_stride >= m, "result stride must cover a row");

    let products = offset_products(operands, params.lhs_offset, params.rhs_offset);
    for i in 0..n {
        for j in 0..m {
            result[i * result_stride + j] = requantize(products[i * m + j], params);
        }
    }
}

/// Reference for [`crate::gemm_i32`].
pub fn gemm_i32(
    operands: &Operands<'_>,
    lhs_offset: i32,
    rhs_offset: i32,
    result: &mut [i32],
    result_stride: usize,
) {
    let GemmShape { n, m, .. } = operands.shape;
    assert!(result_stride >= m, "result stride must cover a row");

    let products = offset_products(operands, lhs_offset, rhs_offset);
    for i in 0..n {
        for j in 0..m {
            result[i * result_stride + j] = products[i * m + j] as i32;
        }
    }
}

/// Reference for [`crate::gemm_f32`].
pub fn gemm_f32(
    operands: &Operands<'_>,
    lhs_offset: i32,
    rhs_offset: i32,
    scale: f32,
    result: &mut [f32],
    result_stride: usize,
) {
    let GemmShape { n, m, .. } = operands.shape;
    assert!(result_stride >= m, "result stride must cover a row");

    let products = offset_products(operands, lhs_offset, rhs_offset);
    for i in 0..n {
        for j in 0..m {
            result[i * result_stride + j] = products[i * m + j] as i32 as f32 * scale;
        }
    }
}

//! End-to-end equivalence of the quantized products with the scalar reference.
//!
//! Shapes cover every remainder of `n` and `m` modulo 3 and of `k` modulo 8.
//! Most of those shapes can only take the unaligned path, because `k % 8 != 0`
//! or the result stride `m` is not a multiple of 8. A second grid keeps `k` and
//! `m` at multiples of 8 so that the aligned path runs for every `n % 3` and
//! `m % 3`, with both RHS orders, and compares it with a one-byte-off run.

use ndarray::Array2;
use qgemm::utils::AlignedBuffer;
use qgemm::{
    gemm, gemm_f32, gemm_i32, gemm_q8, reference, scratch_size, Operands, QuantParams, RhsOrder,
    Variant,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Copies `data` into a fresh buffer `offset` bytes past a 16-byte boundary.
fn placed(data: &[u8], offset: usize) -> AlignedBuffer {
    let mut buffer = AlignedBuffer::zeroed(data.len() + offset, 16).unwrap();
    buffer[offset..].copy_from_slice(data);
    buffer
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random()).collect()
}

/// Parameters whose intermediate values stay inside `i32` for `k <= 64`.
fn random_params(rng: &mut StdRng) -> QuantParams {
    QuantParams::new(
        rng.random_range(-255..=0),
        rng.random_range(-255..=0),
        rng.random_range(-5000..=5000),
        rng.random_range(1..=32),
        rng.random_range(8..=20),
    )
}

/// Runs `gemm_q8` with every buffer `offset` bytes off alignment.
fn run_q8(
    lhs: &[u8],
    rhs: &[u8],
    order: RhsOrder,
    shape: (usize, usize, usize),
    params: &QuantParams,
    offset: usize,
) -> (Vec<u8>, Variant) {
    let (n, m, k) = shape;
    let lhs = placed(lhs, offset);
    let rhs = placed(rhs, offset);
    let mut result = AlignedBuffer::zeroed(n * m + offset, 16).unwrap();
    let mut scratch = AlignedBuffer::zeroed(scratch_size(n, m, k) + offset, 16).unwrap();

    let operands = Operands {
        rhs_order: order,
        ..Operands::new(&lhs[offset..], &rhs[offset..], n, m, k)
    };
    let variant = Variant::select(&operands, result[offset..].as_ptr(), m);
    gemm_q8(&mut scratch[offset..], &operands, params, &mut result[offset..], m).unwrap();
    (result[offset..].to_vec(), variant)
}

#[test]
fn test_every_remainder_matches_reference() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(12345);

    for n in 1..=7 {
        for m in 1..=7 {
            for k in 1..=17 {
                let lhs = random_bytes(&mut rng, n * k);
                let rhs = random_bytes(&mut rng, k * m);
                let params = random_params(&mut rng);

                let mut expected = vec![0u8; n * m];
                let operands = Operands::new(&lhs, &rhs, n, m, k);
                reference::gemm_q8(&operands, &params, &mut expected, m);

                let shape = (n, m, k);
                let (boundary, _) = run_q8(&lhs, &rhs, RhsOrder::RowMajor, shape, &params, 0);
                let (shifted, variant) = run_q8(&lhs, &rhs, RhsOrder::RowMajor, shape, &params, 1);

                assert!(!variant.is_aligned());
                assert_eq!(boundary, expected, "n = {n}, m = {m}, k = {k}, {params:?}");
                assert_eq!(shifted, boundary, "n = {n}, m = {m}, k = {k}, {params:?}");
            }
        }
    }
}

#[test]
fn test_aligned_path_every_remainder_both_rhs_orders() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(808);
    let mut aligned_runs = 0;

    for order in [RhsOrder::RowMajor, RhsOrder::Transposed] {
        for n in 1..=7 {
            for m in [8, 16, 24] {
                for k in [8, 16, 24] {
                    let lhs = random_bytes(&mut rng, n * k);
                    let rhs = random_bytes(&mut rng, k * m);
                    let params = random_params(&mut rng);
                    let shape = (n, m, k);

                    let mut expected = vec![0u8; n * m];
                    let operands = Operands {
                        rhs_order: order,
                        ..Operands::new(&lhs, &rhs, n, m, k)
                    };
                    reference::gemm_q8(&operands, &params, &mut expected, m);

                    let (aligned, variant) = run_q8(&lhs, &rhs, order, shape, &params, 0);
                    let (shifted, _) = run_q8(&lhs, &rhs, order, shape, &params, 1);

                    let context = format!("{order:?}, n = {n}, m = {m}, k = {k}, {params:?}");
                    assert!(variant.is_aligned(), "{context}");
                    assert_eq!(aligned, expected, "{context}");
                    assert_eq!(shifted, aligned, "{context}");
                    aligned_runs += 1;
                }
            }
        }
    }
    assert_eq!(aligned_runs, 2 * 7 * 3 * 3);
}

#[test]
fn test_aligned_path_is_taken_and_matches_unaligned() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(99);
    let (n, m, k) = (10, 16, 40);
    let lhs = random_bytes(&mut rng, n * k);
    let rhs = random_bytes(&mut rng, k * m);
    let params = random_params(&mut rng);

    let (aligned, variant) = run_q8(&lhs, &rhs, RhsOrder::RowMajor, (n, m, k), &params, 0);
    let (misaligned, _) = run_q8(&lhs, &rhs, RhsOrder::RowMajor, (n, m, k), &params, 3);

    assert!(variant.is_aligned());
    assert_eq!(aligned, misaligned);
}

#[test]
fn test_matches_ndarray_product() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(2024);
    let (n, m, k) = (23, 31, 61);
    let lhs = random_bytes(&mut rng, n * k);
    let rhs = random_bytes(&mut rng, k * m);
    let params = random_params(&mut rng);

    let a = Array2::from_shape_fn((n, k), |(i, t)| {
        i64::from(lhs[i * k + t]) + i64::from(params.lhs_offset)
    });
    let b = Array2::from_shape_fn((k, m), |(t, j)| {
        i64::from(rhs[t * m + j]) + i64::from(params.rhs_offset)
    });
    let product = a.dot(&b);

    let mut result = vec![0u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];
    let operands = Operands::new(&lhs, &rhs, n, m, k);
    gemm_q8(&mut scratch, &operands, &params, &mut result, m).unwrap();

    for ((i, j), &exact) in product.indexed_iter() {
        assert_eq!(
            result[i * m + j],
            reference::requantize(exact, &params),
            "cell ({i}, {j})"
        );
    }
}

#[test]
fn test_transposed_rhs_matches_reference() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(7);

    for (n, m, k) in [(1, 1, 1), (3, 5, 8), (4, 4, 13), (8, 7, 33)] {
        let lhs = random_bytes(&mut rng, n * k);
        let rhs_t = random_bytes(&mut rng, m * k);
        let params = random_params(&mut rng);
        let operands = Operands::with_transposed_rhs(&lhs, &rhs_t, n, m, k);

        let mut expected = vec![0u8; n * m];
        reference::gemm_q8(&operands, &params, &mut expected, m);

        let mut result = vec![0u8; n * m];
        let mut scratch = vec![0u8; scratch_size(n, m, k)];
        gemm_q8(&mut scratch, &operands, &params, &mut result, m).unwrap();
        assert_eq!(result, expected, "n = {n}, m = {m}, k = {k}");
    }
}

#[test]
fn test_zero_centered_inputs_map_to_result_offset() {
    init_logging();
    let (n, m, k) = (4, 5, 10);
    let lhs = vec![100u8; n * k];
    let rhs = vec![50u8; k * m];
    let mut result = vec![0u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];

    gemm(&mut scratch, &lhs, &rhs, n, m, k, -100, -50, 128, 1, 0, &mut result).unwrap();
    assert!(result.iter().all(|&v| v == 128), "{result:?}");
}

#[test]
fn test_zero_offsets_give_saturated_raw_dot() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(3);
    let (n, m, k) = (6, 9, 11);
    let lhs: Vec<u8> = (0..n * k).map(|_| rng.random_range(0..6)).collect();
    let rhs: Vec<u8> = (0..k * m).map(|_| rng.random_range(0..6)).collect();

    let mut result = vec![0u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];
    gemm(&mut scratch, &lhs, &rhs, n, m, k, 0, 0, 0, 1, 0, &mut result).unwrap();

    for i in 0..n {
        for j in 0..m {
            let dot: u32 = (0..k)
                .map(|t| u32::from(lhs[i * k + t]) * u32::from(rhs[t * m + j]))
                .sum();
            assert_eq!(u32::from(result[i * m + j]), dot.min(255), "cell ({i}, {j})");
        }
    }
}

#[test]
fn test_saturates_instead_of_wrapping() {
    init_logging();
    let (n, m, k) = (5, 5, 9);
    let lhs = vec![255u8; n * k];
    let rhs = vec![255u8; k * m];
    let mut result = vec![7u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];

    // 9 * 255 * 255 = 585225, far above 255 and above i16::MAX
    gemm(&mut scratch, &lhs, &rhs, n, m, k, 0, 0, 0, 1, 0, &mut result).unwrap();
    assert!(result.iter().all(|&v| v == 255));

    gemm(&mut scratch, &lhs, &rhs, n, m, k, 0, 0, -1_000_000, 1, 0, &mut result).unwrap();
    assert!(result.iter().all(|&v| v == 0));

    // exactly representable edges
    gemm(&mut scratch, &lhs, &rhs, n, m, k, -255, 0, 255, 1, 0, &mut result).unwrap();
    assert!(result.iter().all(|&v| v == 255));
    gemm(&mut scratch, &lhs, &rhs, n, m, k, -255, 0, -1, 1, 0, &mut result).unwrap();
    assert!(result.iter().all(|&v| v == 0));
}

#[test]
fn test_round_half_up_end_to_end() {
    init_logging();
    // one-element products: lhs * rhs with shift 1
    let cases = [(3u8, 1u8, 2u8), (5, 1, 3), (4, 1, 2), (7, 1, 4), (9, 1, 5)];
    let mut scratch = vec![0u8; scratch_size(1, 1, 1)];
    for (l, r, expected) in cases {
        let mut result = [0u8; 1];
        gemm(&mut scratch, &[l], &[r], 1, 1, 1, 0, 0, 0, 1, 1, &mut result).unwrap();
        assert_eq!(result[0], expected, "{l} * {r} >> 1");
    }
}

#[test]
fn test_negative_shift_end_to_end() {
    init_logging();
    let (n, m, k) = (2, 3, 2);
    let lhs = [1u8, 2, 3, 4];
    let rhs = [1u8, 0, 2, 1, 1, 0];
    let mut result = vec![0u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];

    // raw = [3 2 2; 7 4 6], times 4
    gemm(&mut scratch, &lhs, &rhs, n, m, k, 0, 0, 0, 1, -2, &mut result).unwrap();
    assert_eq!(result, vec![12, 8, 8, 28, 16, 24]);
}

#[test]
fn test_scratch_contents_do_not_matter() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(55);
    let (n, m, k) = (7, 8, 19);
    let lhs = random_bytes(&mut rng, n * k);
    let rhs = random_bytes(&mut rng, k * m);
    let params = random_params(&mut rng);
    let operands = Operands::new(&lhs, &rhs, n, m, k);

    let mut clean = vec![0u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];
    gemm_q8(&mut scratch, &operands, &params, &mut clean, m).unwrap();

    let mut dirty = vec![0u8; n * m];
    scratch.fill(0xA5);
    gemm_q8(&mut scratch, &operands, &params, &mut dirty, m).unwrap();
    assert_eq!(clean, dirty);
}

#[test]
fn test_wide_outputs_match_reference() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(77);

    for (n, m, k) in [(1, 2, 3), (5, 7, 16), (9, 4, 29)] {
        let lhs = random_bytes(&mut rng, n * k);
        let rhs = random_bytes(&mut rng, k * m);
        let lhs_offset = rng.random_range(-255..=0);
        let rhs_offset = rng.random_range(-255..=0);
        let operands = Operands::new(&lhs, &rhs, n, m, k);
        let mut scratch = vec![0u8; scratch_size(n, m, k)];

        let mut wide = vec![0i32; n * m];
        let mut wide_expected = vec![0i32; n * m];
        gemm_i32(&mut scratch, &operands, lhs_offset, rhs_offset, &mut wide, m).unwrap();
        reference::gemm_i32(&operands, lhs_offset, rhs_offset, &mut wide_expected, m);
        assert_eq!(wide, wide_expected, "i32, n = {n}, m = {m}, k = {k}");

        let mut real = vec![0f32; n * m];
        let mut real_expected = vec![0f32; n * m];
        gemm_f32(&mut scratch, &operands, lhs_offset, rhs_offset, 0.125, &mut real, m).unwrap();
        reference::gemm_f32(&operands, lhs_offset, rhs_offset, 0.125, &mut real_expected, m);
        assert_eq!(real, real_expected, "f32, n = {n}, m = {m}, k = {k}");
    }
}

#[test]
fn test_strided_output_rows() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(31);
    let (n, m, k) = (5, 6, 12);
    let stride = 11;
    let lhs = random_bytes(&mut rng, n * k);
    let rhs = random_bytes(&mut rng, k * m);
    let params = random_params(&mut rng);
    let operands = Operands::new(&lhs, &rhs, n, m, k);

    let mut expected = vec![0xCCu8; n * stride];
    reference::gemm_q8(&operands, &params, &mut expected, stride);

    let mut result = vec![0xCCu8; n * stride];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];
    gemm_q8(&mut scratch, &operands, &params, &mut result, stride).unwrap();
    assert_eq!(result, expected);
}

//! Quantizes two small real matrices, multiplies them with `qgemm` and
//! compares the dequantized result with the exact `f32` product.
//!
//! ```bash
//! RUST_LOG=trace cargo run --release --example quantized_gemm
//! ```

use log::info;
use qgemm::{gemm_q8, scratch_size, Operands, QuantParams};
use rand::prelude::*;

/// Affine `u8` quantization of values in `[min, max]`.
struct Quantization {
    scale: f32,
    zero_point: i32,
}

impl Quantization {
    fn for_range(min: f32, max: f32) -> Self {
        let scale = (max - min) / 255.0;
        let zero_point = (-min / scale).round() as i32;
        Self { scale, zero_point }
    }

    fn quantize(&self, value: f32) -> u8 {
        let q = (value / self.scale).round() as i32 + self.zero_point;
        q.clamp(0, 255) as u8
    }

    fn dequantize(&self, value: u8) -> f32 {
        (i32::from(value) - self.zero_point) as f32 * self.scale
    }
}

fn main() {
    env_logger::init();

    let (n, m, k) = (6, 5, 32);
    let mut rng = StdRng::seed_from_u64(7);
    let a: Vec<f32> = (0..n * k).map(|_| rng.random_range(0.0..1.0)).collect();
    let b: Vec<f32> = (0..k * m).map(|_| rng.random_range(-1.0..1.0)).collect();

    let qa = Quantization::for_range(0.0, 1.0);
    let qb = Quantization::for_range(-1.0, 1.0);
    let qc = Quantization::for_range(-8.0, 8.0);

    let lhs: Vec<u8> = a.iter().map(|&v| qa.quantize(v)).collect();
    let rhs: Vec<u8> = b.iter().map(|&v| qb.quantize(v)).collect();

    // real = sa * sb * acc, so q = acc * sa * sb / sc + zc, as a 2^-shift fixed-point factor
    let shift = 16;
    let real_multiplier = f64::from(qa.scale * qb.scale / qc.scale);
    let multiplicative_offset = (real_multiplier * f64::from(1 << shift)).round() as i32;
    let result_offset = (f64::from(qc.zero_point) / real_multiplier).round() as i32;
    let params = QuantParams::new(
        -qa.zero_point,
        -qb.zero_point,
        result_offset,
        multiplicative_offset,
        shift,
    );
    info!("quantization parameters: {params:?}");

    let mut result = vec![0u8; n * m];
    let mut scratch = vec![0u8; scratch_size(n, m, k)];
    let operands = Operands::new(&lhs, &rhs, n, m, k);
    if let Err(e) = gemm_q8(&mut scratch, &operands, &params, &mut result, m) {
        eprintln!("gemm failed: {e}");
        std::process::exit(1);
    }

    let mut max_error = 0.0f32;
    for i in 0..n {
        let mut row = Vec::with_capacity(m);
        for j in 0..m {
            let exact: f32 = (0..k).map(|t| a[i * k + t] * b[t * m + j]).sum();
            let approx = qc.dequantize(result[i * m + j]);
            max_error = max_error.max((exact - approx).abs());
            row.push(format!("{approx:7.3} ({exact:7.3})"));
        }
        println!("{}", row.join("  "));
    }
    println!("max abs error: {max_error:.4} (output step {:.4})", qc.scale);
}

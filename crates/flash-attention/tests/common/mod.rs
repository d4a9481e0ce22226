//! Shared helpers for the attention property tests.

#![allow(dead_code)]

use flash_attention::Tensor;

/// Asserts every element in a slice is finite (not NaN or infinite).
pub fn assert_all_finite(slice: &[f32]) {
    for (i, &val) in slice.iter().enumerate() {
        assert!(val.is_finite(), "Element [{i}] is not finite: {val}");
    }
}

/// Asserts slice forms a valid probability distribution: all >= 0 and sum ~ 1.
pub fn assert_probability_distribution(slice: &[f32], tol: f32) {
    let sum: f32 = slice.iter().sum();
    assert!(
        (sum - 1.0).abs() < tol,
        "Distribution sums to {sum}, expected ~1.0 (tol={tol})"
    );
    for (i, &val) in slice.iter().enumerate() {
        assert!(val >= 0.0, "Element [{i}] is negative: {val}");
    }
}

/// L2 distance between two vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Largest absolute element-wise difference.
pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// Deterministic pseudo-random values in [-1, 1).
pub fn lcg_values(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect()
}

/// Row-major tensor filled with [`lcg_values`] scaled by `amp`.
pub fn lcg_tensor(shape: &[usize], seed: u64, amp: f32) -> Tensor<f32> {
    let n = shape.iter().product();
    let data = lcg_values(n, seed).into_iter().map(|x| x * amp).collect();
    Tensor::from_vec(data, shape).unwrap()
}

/// Naive reference for a single unbatched slice, accumulated in f64.
pub fn reference_attention(
    q: &[f32],
    k: &[f32],
    v: &[f32],
    lq: usize,
    lk: usize,
    d: usize,
    dv: usize,
) -> Vec<f32> {
    let scale = if d == 0 { 1.0 } else { 1.0 / (d as f64).sqrt() };
    let mut out = vec![0.0f32; lq * dv];
    for i in 0..lq {
        let scores: Vec<f64> = (0..lk)
            .map(|j| {
                (0..d)
                    .map(|t| f64::from(q[i * d + t]) * f64::from(k[j * d + t]))
                    .sum::<f64>()
                    * scale
            })
            .collect();
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        for c in 0..dv {
            let acc: f64 = (0..lk).map(|j| exps[j] * f64::from(v[j * dv + c])).sum();
            out[i * dv + c] = (acc / sum) as f32;
        }
    }
    out
}

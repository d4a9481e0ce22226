//! Floating-point comparison utilities.
//!
//! Used to check the tiled backend against the naive reference and to
//! implement the benchmark's `allclose` sanity check.

use crate::dtype::Element;

/// Compute the ULP distance between two f32 values.
///
/// Returns the number of representable floats between `a` and `b`.
/// Special cases: if either value is NaN, returns `u32::MAX`.
/// If signs differ and neither is zero, returns `u32::MAX`.
#[must_use]
pub fn ulp_distance(a: f32, b: f32) -> u32 {
    if a.is_nan() || b.is_nan() {
        return u32::MAX;
    }
    if a == b {
        return 0;
    }
    let a_bits = a.to_bits() as i32;
    let b_bits = b.to_bits() as i32;
    // ±0 was handled by a == b above
    if (a_bits < 0) != (b_bits < 0) {
        return u32::MAX;
    }
    a_bits.abs_diff(b_bits)
}

/// Largest ULP distance between paired elements.
///
/// # Panics
///
/// Panics if slices have different lengths.
#[must_use]
pub fn max_ulp_distance(a: &[f32], b: &[f32]) -> u32 {
    assert_eq!(a.len(), b.len(), "slice length mismatch: {} vs {}", a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(&x, &y)| ulp_distance(x, y))
        .max()
        .unwrap_or(0)
}

/// Assert that two f32 slices are equal within the given ULP tolerance.
///
/// # Panics
///
/// Panics if slices have different lengths or any element pair exceeds
/// the ULP tolerance.
pub fn assert_ulp_eq(a: &[f32], b: &[f32], max_ulp: u32) {
    assert_eq!(
        a.len(),
        b.len(),
        "slice length mismatch: {} vs {}",
        a.len(),
        b.len()
    );
    for (i, (&va, &vb)) in a.iter().zip(b.iter()).enumerate() {
        let dist = ulp_distance(va, vb);
        assert!(
            dist <= max_ulp,
            "ULP violation at index {i}: {va} vs {vb} (ULP distance {dist}, max {max_ulp})"
        );
    }
}

/// Largest absolute elementwise difference, as f64.
///
/// NaN anywhere yields NaN, so a NaN never passes a tolerance check.
///
/// # Panics
///
/// Panics if slices have different lengths.
#[must_use]
pub fn max_abs_diff<T: Element>(a: &[T], b: &[T]) -> f64 {
    assert_eq!(a.len(), b.len(), "slice length mismatch: {} vs {}", a.len(), b.len());
    let mut worst = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let d = (x.as_f64() - y.as_f64()).abs();
        if d.is_nan() {
            return f64::NAN;
        }
        worst = worst.max(d);
    }
    worst
}

/// `|a - b| <= atol + rtol * |b|` for every element pair.
///
/// Equal infinities compare equal; NaN never does.
///
/// # Panics
///
/// Panics if slices have different lengths.
#[must_use]
pub fn allclose<T: Element>(a: &[T], b: &[T], rtol: f64, atol: f64) -> bool {
    assert_eq!(a.len(), b.len(), "slice length mismatch: {} vs {}", a.len(), b.len());
    a.iter().zip(b).all(|(&x, &y)| {
        let (x, y) = (x.as_f64(), y.as_f64());
        x == y || (x - y).abs() <= atol + rtol * y.abs()
    })
}

//! Shared kernel primitives: dot product, softmax row, score row.
//!
//! Used by both the naive and the tiled backend so the two only differ in
//! how they schedule the same arithmetic.

use crate::dtype::Element;

/// Dot product of two slices.
#[inline]
pub fn dot<T: Element>(a: &[T], b: &[T]) -> T {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = T::zero();
    for i in 0..a.len() {
        sum = sum + a[i] * b[i];
    }
    sum
}

/// Score scale `1 / sqrt(d)`.
///
/// For `d == 0` every dot product is an exact zero, and scaling it by
/// `1/sqrt(0) = inf` would turn it into NaN; the neutral scale 1 keeps the
/// scores at zero so the row softmax is uniform.
#[inline]
pub fn scale_for<T: Element>(d: usize) -> T {
    if d == 0 {
        T::one()
    } else {
        T::from_len(d).sqrt().recip()
    }
}

/// Largest element of a row, ignoring NaN (NaN still reaches the output
/// through the subtraction below).
#[inline]
pub fn row_max<T: Element>(row: &[T]) -> T {
    row.iter().copied().fold(T::neg_infinity(), T::max)
}

/// In-place softmax over a contiguous row.
///
/// Uses the numerically stable formulation: subtract max, exponentiate, normalize.
pub fn softmax_row<T: Element>(row: &mut [T]) {
    let max_val = row_max(row);
    let mut sum = T::zero();
    for v in row.iter_mut() {
        *v = (*v - max_val).exp();
        sum = sum + *v;
    }
    let inv_sum = sum.recip();
    for v in row.iter_mut() {
        *v = *v * inv_sum;
    }
}

/// Softmax every row of a row-major `rows x cols` matrix.
pub fn softmax_rows<T: Element>(scores: &mut [T], rows: usize, cols: usize) {
    debug_assert_eq!(scores.len(), rows * cols);
    if cols == 0 {
        return;
    }
    for row in scores.chunks_exact_mut(cols) {
        softmax_row(row);
    }
}

/// Weighted sum: `output[i] += weight * v_row[i]` for accumulation in attention.
#[inline]
pub fn weighted_accumulate<T: Element>(output: &mut [T], weight: T, v_row: &[T]) {
    debug_assert_eq!(output.len(), v_row.len());
    for (o, &v) in output.iter_mut().zip(v_row.iter()) {
        *o = *o + weight * v;
    }
}

/// Multiply every element of `row` by `factor`.
#[inline]
pub fn scale_in_place<T: Element>(row: &mut [T], factor: T) {
    for x in row.iter_mut() {
        *x = *x * factor;
    }
}

#[cfg(test)]
pub(crate) fn sequential_floats(n: usize, step: f32) -> Vec<f32> {
    (0..n).map(|i| (i as f32 - n as f32 / 2.0) * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_basic() {
        assert!((dot(&[1.0f32, 2.0, 3.0], &[4.0, 5.0, 6.0]) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn dot_zero() {
        assert_eq!(dot(&[1.0f64, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(dot::<f32>(&[], &[]), 0.0);
    }

    #[test]
    fn scale_for_dims() {
        assert!((scale_for::<f32>(4) - 0.5).abs() < 1e-7);
        assert_eq!(scale_for::<f64>(1), 1.0);
        assert_eq!(scale_for::<f64>(0), 1.0);
    }

    #[test]
    fn softmax_row_uniform() {
        let mut row = vec![1.0f32; 4];
        softmax_row(&mut row);
        for v in &row {
            assert!((*v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_row_sums_to_one() {
        let mut row = vec![1.0f32, 2.0, 3.0, 4.0];
        softmax_row(&mut row);
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_row_monotonic() {
        let mut row = vec![1.0f64, 2.0, 3.0];
        softmax_row(&mut row);
        assert!(row[0] < row[1]);
        assert!(row[1] < row[2]);
    }

    #[test]
    fn softmax_row_large_logits_stay_finite() {
        let mut row = vec![1e30f32, 1e30, -1e30];
        softmax_row(&mut row);
        assert!(row.iter().all(|v| v.is_finite()));
        assert!((row[0] - 0.5).abs() < 1e-6);
        assert_eq!(row[2], 0.0);
    }

    #[test]
    fn softmax_row_propagates_nan() {
        let mut row = vec![1.0f32, f32::NAN, 0.0];
        softmax_row(&mut row);
        assert!(row.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn softmax_rows_each_row() {
        let mut m = vec![0.0f32, 0.0, 5.0, 5.0];
        softmax_rows(&mut m, 2, 2);
        assert!(m.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn weighted_accumulate_basic() {
        let mut out = [1.0f32, 2.0];
        weighted_accumulate(&mut out, 0.5, &[4.0, 6.0]);
        assert!((out[0] - 3.0).abs() < 1e-6);
        assert!((out[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn scale_in_place_basic() {
        let mut row = [2.0f64, -4.0];
        scale_in_place(&mut row, 0.25);
        assert_eq!(row, [0.5, -1.0]);
    }
}

//! Naive scaled dot-product attention over one batch slice.
//!
//! Attention(Q, K, V) = softmax(Q * K^T / sqrt(d_k)) * V
//!
//! This backend materializes the full `Lq x Lk` score matrix of the slice,
//! exactly like the reference `softmax(q @ k.T * scale) @ v` it is checked
//! against.

use super::ops;
use crate::dtype::Element;

/// Read-only row-major window onto one `rows x cols` matrix of a larger
/// buffer: row `i` starts at `offset + i * row_stride` and its elements are
/// adjacent.
#[derive(Debug, Clone, Copy)]
pub struct SliceView<'a, T> {
    data: &'a [T],
    offset: usize,
    row_stride: usize,
    rows: usize,
    cols: usize,
}

impl<'a, T> SliceView<'a, T> {
    /// # Panics
    ///
    /// Panics if the last row reaches past the end of `data`.
    pub fn new(data: &'a [T], offset: usize, row_stride: usize, rows: usize, cols: usize) -> Self {
        // Zero-width rows never touch the buffer, whatever their strides say.
        if cols == 0 {
            return Self {
                data,
                offset: 0,
                row_stride: 0,
                rows,
                cols,
            };
        }
        if rows > 0 {
            let end = offset + (rows - 1) * row_stride + cols;
            assert!(
                end <= data.len(),
                "slice view out of bounds: reaches {end}, buffer has {}",
                data.len()
            );
        }
        Self {
            data,
            offset,
            row_stride,
            rows,
            cols,
        }
    }

    /// A dense `rows x cols` matrix.
    pub fn dense(data: &'a [T], rows: usize, cols: usize) -> Self {
        Self::new(data, 0, cols, rows, cols)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, i: usize) -> &'a [T] {
        debug_assert!(i < self.rows);
        let start = self.offset + i * self.row_stride;
        &self.data[start..start + self.cols]
    }
}

/// Scores of one query row against every key: `out[j] = q_row . K[j] * scale`.
pub fn score_row<T: Element>(q_row: &[T], k: SliceView<'_, T>, scale: T, out: &mut [T]) {
    debug_assert_eq!(out.len(), k.rows());
    for (j, s) in out.iter_mut().enumerate() {
        *s = ops::dot(q_row, k.row(j)) * scale;
    }
}

/// Scaled score matrix `scores[i, j] = Q[i] . K[j] * scale`, row-major `Lq x Lk`.
pub fn score_matrix<T: Element>(
    q: SliceView<'_, T>,
    k: SliceView<'_, T>,
    scale: T,
    scores: &mut [T],
) {
    let m = k.rows();
    debug_assert_eq!(scores.len(), q.rows() * m);
    if m == 0 {
        return;
    }
    for (i, row) in scores.chunks_exact_mut(m).enumerate() {
        score_row(q.row(i), k, scale, row);
    }
}

/// `output = P * V` for a row-major `Lq x Lk` probability matrix.
pub fn matmul_pv<T: Element>(p: &[T], v: SliceView<'_, T>, output: &mut [T]) {
    let m = v.rows();
    let d_v = v.cols();
    output.fill(T::zero());
    if m == 0 || d_v == 0 {
        return;
    }
    for (p_row, o_row) in p.chunks_exact(m).zip(output.chunks_exact_mut(d_v)) {
        for (j, &w) in p_row.iter().enumerate() {
            ops::weighted_accumulate(o_row, w, v.row(j));
        }
    }
}

/// Row-stochastic attention weights of one slice: `softmax(Q K^T * scale)`.
///
/// `weights` is row-major `Lq x Lk`.
///
/// # Panics
/// Panics if `q` and `k` disagree on the feature width or `weights` has the
/// wrong length.
pub fn attention_weights_slice<T: Element>(
    q: SliceView<'_, T>,
    k: SliceView<'_, T>,
    weights: &mut [T],
) {
    assert_eq!(
        q.cols(),
        k.cols(),
        "Q/K width mismatch: {} vs {}",
        q.cols(),
        k.cols()
    );
    assert_eq!(
        weights.len(),
        q.rows() * k.rows(),
        "weights dimension mismatch: expected {} got {}",
        q.rows() * k.rows(),
        weights.len()
    );
    let scale = ops::scale_for::<T>(q.cols());
    score_matrix(q, k, scale, weights);
    ops::softmax_rows(weights, q.rows(), k.rows());
}

/// Naive attention of one slice.
///
/// Q is `n x d_k`, K is `m x d_k`, V is `m x d_v`, output is dense `n x d_v`.
///
/// Step 1: scores = Q * K^T / sqrt(d_k)  -- n x m matrix
/// Step 2: softmax each row of scores
/// Step 3: output = scores * V            -- n x d_v matrix
///
/// # Panics
/// Panics if dimensions do not match.
pub fn attention_slice<T: Element>(
    q: SliceView<'_, T>,
    k: SliceView<'_, T>,
    v: SliceView<'_, T>,
    output: &mut [T],
) {
    assert_eq!(
        k.rows(),
        v.rows(),
        "K/V length mismatch: {} vs {}",
        k.rows(),
        v.rows()
    );
    assert_eq!(
        output.len(),
        q.rows() * v.cols(),
        "output dimension mismatch: expected {} got {}",
        q.rows() * v.cols(),
        output.len()
    );

    let mut scores = vec![T::zero(); q.rows() * k.rows()];
    attention_weights_slice(q, k, &mut scores);
    matmul_pv(&scores, v, output);
}

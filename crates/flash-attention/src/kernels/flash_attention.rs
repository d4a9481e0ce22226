//! Flash Attention: IO-aware tiled attention.
//!
//! Online softmax with running max and running sum per tile. The `Lq x Lk`
//! score matrix is never materialized; each query row streams over the keys
//! in tiles of `tile_size` rows and keeps only a `tile_size` score buffer
//! and its `d_v` accumulator.

use super::attention::SliceView;
use super::ops;
use crate::dtype::Element;

/// Online-softmax state of one query row.
struct RowState<T> {
    running_max: T,
    running_sum: T,
}

/// Tiled attention for a single query row.
///
/// `output` (length `d_v`) doubles as the accumulator, and `tile_scores` is
/// caller-provided scratch so a worker can reuse it across rows.
///
/// # Panics
/// Panics if `q_row` and `k` disagree on the feature width, `k` and `v` on
/// the key count, `output.len() != v.cols()`, or `tile_size == 0`.
pub fn flash_attention_row<T: Element>(
    q_row: &[T],
    k: SliceView<'_, T>,
    v: SliceView<'_, T>,
    tile_size: usize,
    tile_scores: &mut Vec<T>,
    output: &mut [T],
) {
    assert_eq!(q_row.len(), k.cols(), "Q/K width mismatch: {} vs {}", q_row.len(), k.cols());
    assert_eq!(k.rows(), v.rows(), "K/V length mismatch: {} vs {}", k.rows(), v.rows());
    assert_eq!(
        output.len(),
        v.cols(),
        "output dimension mismatch: expected {} got {}",
        v.cols(),
        output.len()
    );
    assert!(tile_size > 0, "tile_size must be > 0");

    let n_keys = k.rows();
    let tile_size = tile_size.min(n_keys.max(1));
    let scale = ops::scale_for::<T>(q_row.len());
    let mut state = RowState {
        running_max: T::neg_infinity(),
        running_sum: T::zero(),
    };
    output.fill(T::zero());

    let mut tile_start = 0;
    while tile_start < n_keys {
        let tile_end = (tile_start + tile_size).min(n_keys);
        process_tile(q_row, k, v, scale, tile_start, tile_end, &mut state, tile_scores, output);
        tile_start = tile_end;
    }

    ops::scale_in_place(output, state.running_sum.recip());
}

/// Process a single tile of KV for one query row, updating online softmax state.
#[allow(clippy::too_many_arguments)]
fn process_tile<T: Element>(
    q_row: &[T],
    k: SliceView<'_, T>,
    v: SliceView<'_, T>,
    scale: T,
    tile_start: usize,
    tile_end: usize,
    state: &mut RowState<T>,
    tile_scores: &mut Vec<T>,
    acc: &mut [T],
) {
    tile_scores.clear();
    tile_scores.extend((tile_start..tile_end).map(|j| ops::dot(q_row, k.row(j)) * scale));

    let tile_max = ops::row_max(tile_scores);
    let new_max = state.running_max.max(tile_max);

    // Every score so far is -inf: the tile adds zero to every sum. A row whose
    // scores are all -inf ends with running_sum == 0 and a NaN output, as the
    // materialized softmax gives.
    if new_max == T::neg_infinity() {
        return;
    }

    // Nothing accumulated yet on the first tile, and running_max is still -inf.
    if state.running_sum > T::zero() {
        let correction = (state.running_max - new_max).exp();
        ops::scale_in_place(acc, correction);
        state.running_sum = state.running_sum * correction;
    }

    for (tj, j) in (tile_start..tile_end).enumerate() {
        let w = (tile_scores[tj] - new_max).exp();
        ops::weighted_accumulate(acc, w, v.row(j));
        state.running_sum = state.running_sum + w;
    }

    state.running_max = new_max;
}

/// Flash attention of one slice, row by row.
///
/// Q is `n x d_k`, K is `m x d_k`, V is `m x d_v`, output is dense `n x d_v`.
///
/// # Panics
/// Panics under the same conditions as [`flash_attention_row`].
pub fn flash_attention_slice<T: Element>(
    q: SliceView<'_, T>,
    k: SliceView<'_, T>,
    v: SliceView<'_, T>,
    tile_size: usize,
    output: &mut [T],
) {
    assert_eq!(
        output.len(),
        q.rows() * v.cols(),
        "output dimension mismatch: expected {} got {}",
        q.rows() * v.cols(),
        output.len()
    );
    let d_v = v.cols();
    if d_v == 0 {
        return;
    }
    let mut scratch = Vec::with_capacity(tile_size.min(k.rows()));
    for (i, out_row) in output.chunks_exact_mut(d_v).enumerate() {
        flash_attention_row(q.row(i), k, v, tile_size, &mut scratch, out_row);
    }
}

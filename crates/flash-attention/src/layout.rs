//! Shape and stride descriptor for arbitrary-rank tensors.
//!
//! A [`Layout`] maps a multi-index to a flat element offset:
//! `offset + sum(index[a] * strides[a])`. Leading "batch" axes are walked
//! by unravelling a flat batch number over the leading dims, so kernels are
//! generic over zero, one or many batch axes without nested containers.

use crate::error::{AttentionError, Result};

/// Element-granularity strides, shape and base offset of a tensor view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

/// Row-major strides for `shape` (last axis has stride 1).
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for a in (0..shape.len().saturating_sub(1)).rev() {
        strides[a] = strides[a + 1].saturating_mul(shape[a + 1].max(1));
    }
    strides
}

/// Number of elements in `shape`, or `None` if the product overflows.
#[must_use]
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl Layout {
    /// Row-major layout starting at offset 0.
    #[must_use]
    pub fn contiguous(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            offset: 0,
        }
    }

    /// Build a layout from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::InvalidShape`] if `strides` does not have one
    /// entry per axis of `shape`.
    pub fn from_parts(shape: Vec<usize>, strides: Vec<usize>, offset: usize) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(AttentionError::invalid_shape(
                "strides",
                format!("one stride per axis ({} axes)", shape.len()),
                &strides,
            ));
        }
        Ok(Self {
            shape,
            strides,
            offset,
        })
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Element count. Layouts owned by a tensor have already been checked
    /// against overflow at construction.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// True if the view walks its elements in row-major order with no gaps.
    ///
    /// Axes of length 1 have no observable stride and are ignored.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        let expected = contiguous_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&dim, (&s, &e))| dim <= 1 || s == e)
    }

    /// True if consecutive elements of the innermost axis are adjacent.
    #[must_use]
    pub fn has_unit_inner_stride(&self) -> bool {
        match (self.shape.last(), self.strides.last()) {
            (Some(&dim), Some(&stride)) => dim <= 1 || stride == 1,
            _ => true,
        }
    }

    /// Largest flat index the view can reach, or `None` if it is empty.
    ///
    /// Saturates on overflow, so the result always fails a buffer-length
    /// check instead of wrapping into range.
    #[must_use]
    pub fn max_offset(&self) -> Option<usize> {
        if self.shape.contains(&0) {
            return None;
        }
        let reach = self
            .shape
            .iter()
            .zip(&self.strides)
            .fold(0usize, |acc, (&dim, &stride)| {
                acc.saturating_add((dim - 1).saturating_mul(stride))
            });
        Some(self.offset.saturating_add(reach))
    }

    /// Flat offset of a full multi-index.
    #[must_use]
    pub fn offset_of(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.rank());
        index
            .iter()
            .zip(&self.strides)
            .fold(self.offset, |acc, (&i, &s)| acc + i * s)
    }

    /// Swap two axes without touching the underlying buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::InvalidShape`] if either axis is out of range.
    pub fn transpose(&self, a: usize, b: usize) -> Result<Self> {
        let rank = self.rank();
        if a >= rank || b >= rank {
            return Err(AttentionError::invalid_shape(
                "tensor",
                format!("axes {a} and {b} within rank {rank}"),
                &self.shape,
            ));
        }
        let mut out = self.clone();
        out.shape.swap(a, b);
        out.strides.swap(a, b);
        Ok(out)
    }

    /// Leading dims when the trailing `trailing` axes are treated as a matrix.
    #[must_use]
    pub fn batch_dims(&self, trailing: usize) -> &[usize] {
        &self.shape[..self.rank().saturating_sub(trailing)]
    }

    /// Number of leading slices when the trailing `trailing` axes form a matrix.
    #[must_use]
    pub fn batch_count(&self, trailing: usize) -> usize {
        self.batch_dims(trailing).iter().product()
    }

    /// Flat offset of the `batch`-th leading slice.
    ///
    /// `batch` is unravelled row-major over the leading dims (last leading
    /// axis fastest) and dotted with their strides.
    #[must_use]
    pub fn batch_offset(&self, trailing: usize, batch: usize) -> usize {
        let lead = self.rank().saturating_sub(trailing);
        let mut rem = batch;
        let mut off = self.offset;
        for a in (0..lead).rev() {
            let dim = self.shape[a];
            off += (rem % dim) * self.strides[a];
            rem /= dim;
        }
        debug_assert_eq!(rem, 0, "batch index {batch} out of range");
        off
    }
}

//! Batched attention entry points.
//!
//! `forward(q, k, v)` validates the shapes, allocates the output once and
//! runs the selected per-slice kernel over every batch slice. Leading axes
//! are walked through [`Layout::batch_offset`], so any number of batch axes
//! (including none) is handled by the same code path.

use std::borrow::Cow;

use rayon::prelude::*;

use crate::config::KernelConfig;
use crate::dtype::Element;
use crate::error::{AttentionError, Result};
use crate::kernels::Backend;
use crate::kernels::attention::{SliceView, attention_slice, attention_weights_slice};
use crate::kernels::flash_attention::flash_attention_row;
use crate::layout::Layout;
use crate::tensor::{DynTensor, Tensor, try_alloc};

/// Validated dimensions of one attention call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionShape {
    /// Leading dims shared by `q`, `k` and `v`.
    pub batch_dims: Vec<usize>,
    /// Query length.
    pub lq: usize,
    /// Key/value length.
    pub lk: usize,
    /// Query/key feature width.
    pub d: usize,
    /// Value feature width.
    pub dv: usize,
}

impl AttentionShape {
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batch_dims.iter().product()
    }

    /// `batch_dims ++ [Lq, Dv]`
    #[must_use]
    pub fn output_shape(&self) -> Vec<usize> {
        let mut s = self.batch_dims.clone();
        s.extend([self.lq, self.dv]);
        s
    }

    /// `batch_dims ++ [Lq, Lk]`
    #[must_use]
    pub fn weights_shape(&self) -> Vec<usize> {
        let mut s = self.batch_dims.clone();
        s.extend([self.lq, self.lk]);
        s
    }
}

/// Check the shape invariants of `q: [..., Lq, D]`, `k: [..., Lk, D]`,
/// `v: [..., Lk, Dv]`.
///
/// # Errors
///
/// Returns [`AttentionError::InvalidShape`] naming the first offending tensor
/// if a rank is below 2, the ranks or batch dims differ, the feature widths
/// of `q` and `k` differ, the key lengths of `k` and `v` differ, or the key
/// axis is empty.
pub fn check_shapes(q: &[usize], k: &[usize], v: &[usize]) -> Result<AttentionShape> {
    for (name, shape, dims) in [("q", q, "Lq, D"), ("k", k, "Lk, D"), ("v", v, "Lk, Dv")] {
        if shape.len() < 2 {
            return Err(AttentionError::invalid_shape(
                name,
                format!("rank >= 2 ([..., {dims}])"),
                shape,
            ));
        }
    }
    let rank = q.len();
    let nb = rank - 2;
    for (name, shape) in [("k", k), ("v", v)] {
        if shape.len() != rank {
            return Err(AttentionError::invalid_shape(
                name,
                format!("rank {rank} to match q {q:?}"),
                shape,
            ));
        }
        if shape[..nb] != q[..nb] {
            return Err(AttentionError::invalid_shape(
                name,
                format!("batch dims {:?} to match q", &q[..nb]),
                shape,
            ));
        }
    }

    let (lq, d) = (q[nb], q[nb + 1]);
    let lk = k[nb];
    if k[nb + 1] != d {
        return Err(AttentionError::invalid_shape(
            "k",
            format!("[..., Lk, {d}] (feature width of q)"),
            k,
        ));
    }
    if v[nb] != lk {
        return Err(AttentionError::invalid_shape(
            "v",
            format!("[..., {lk}, Dv] (key length of k)"),
            v,
        ));
    }
    if lk == 0 {
        return Err(AttentionError::invalid_shape(
            "k",
            "a non-empty key axis (Lk > 0)",
            k,
        ));
    }

    Ok(AttentionShape {
        batch_dims: q[..nb].to_vec(),
        lq,
        lk,
        d,
        dv: v[nb + 1],
    })
}

/// One input tensor as seen by the kernels: buffer plus layout with a unit
/// inner stride.
#[derive(Clone, Copy)]
struct Operand<'a, T> {
    data: &'a [T],
    layout: &'a Layout,
}

impl<'a, T: Element> Operand<'a, T> {
    fn new(t: &'a Tensor<T>) -> Self {
        debug_assert!(t.layout().has_unit_inner_stride());
        Self {
            data: t.storage(),
            layout: t.layout(),
        }
    }

    /// The `batch`-th trailing matrix.
    fn slice(&self, batch: usize) -> SliceView<'a, T> {
        let rank = self.layout.rank();
        let shape = self.layout.shape();
        SliceView::new(
            self.data,
            self.layout.batch_offset(2, batch),
            self.layout.strides()[rank - 2],
            shape[rank - 2],
            shape[rank - 1],
        )
    }
}

/// Kernels read rows as slices; pack views whose innermost axis is strided.
fn unit_inner_stride<T: Element>(t: &Tensor<T>) -> Result<Cow<'_, Tensor<T>>> {
    if t.layout().has_unit_inner_stride() {
        Ok(Cow::Borrowed(t))
    } else {
        Ok(Cow::Owned(t.to_contiguous()?))
    }
}

/// Scaled dot-product attention with the default configuration.
///
/// `q: [..., Lq, D]`, `k: [..., Lk, D]`, `v: [..., Lk, Dv]` produce a new
/// tensor `[..., Lq, Dv]` where each output row is
/// `softmax(q_i . K^T / sqrt(D)) * V`.
///
/// # Errors
///
/// [`AttentionError::InvalidShape`] for shape violations (see
/// [`check_shapes`]), [`AttentionError::AllocationFailure`] if the output
/// cannot be allocated.
pub fn forward<T: Element>(q: &Tensor<T>, k: &Tensor<T>, v: &Tensor<T>) -> Result<Tensor<T>> {
    forward_with(&KernelConfig::default(), q, k, v)
}

/// [`forward`] with an explicit backend, tile size and parallelism.
///
/// # Errors
///
/// Same as [`forward`].
pub fn forward_with<T: Element>(
    config: &KernelConfig,
    q: &Tensor<T>,
    k: &Tensor<T>,
    v: &Tensor<T>,
) -> Result<Tensor<T>> {
    let shape = check_shapes(q.shape(), k.shape(), v.shape())?;
    let out_shape = shape.output_shape();
    let mut out = try_alloc::<T>(&out_shape)?;

    if !out.is_empty() {
        let (q, k, v) = (unit_inner_stride(q)?, unit_inner_stride(k)?, unit_inner_stride(v)?);
        let ops = [Operand::new(&q), Operand::new(&k), Operand::new(&v)];
        match config.backend {
            Backend::Flash => run_flash(config, &shape, ops, &mut out),
            Backend::Naive => run_naive(config, &shape, ops, &mut out),
        }
    }

    Ok(Tensor::from_parts(out, Layout::contiguous(&out_shape)))
}

/// Every output row across all batches is an independent task.
fn run_flash<T: Element>(
    config: &KernelConfig,
    shape: &AttentionShape,
    [q, k, v]: [Operand<'_, T>; 3],
    out: &mut [T],
) {
    let (lq, dv) = (shape.lq, shape.dv);
    // Scratch holds one tile of scores; no tile is longer than the key axis.
    let tile = config.tile_size.max(1).min(shape.lk);
    let row = |(r, out_row): (usize, &mut [T]), scratch: &mut Vec<T>| {
        let (b, i) = (r / lq, r % lq);
        flash_attention_row(q.slice(b).row(i), k.slice(b), v.slice(b), tile, scratch, out_row);
    };

    if config.parallel {
        out.par_chunks_mut(dv)
            .with_min_len(config.min_rows_per_task.max(1))
            .enumerate()
            .for_each_init(|| Vec::with_capacity(tile), |scratch, item| row(item, scratch));
    } else {
        let mut scratch = Vec::with_capacity(tile);
        for item in out.chunks_mut(dv).enumerate() {
            row(item, &mut scratch);
        }
    }
}

/// Every batch slice is an independent task.
fn run_naive<T: Element>(
    config: &KernelConfig,
    shape: &AttentionShape,
    [q, k, v]: [Operand<'_, T>; 3],
    out: &mut [T],
) {
    let slice_len = shape.lq * shape.dv;
    let slice = |(b, out_slice): (usize, &mut [T])| {
        attention_slice(q.slice(b), k.slice(b), v.slice(b), out_slice);
    };

    if config.parallel {
        let min_batches = config.min_rows_per_task.max(1).div_ceil(shape.lq);
        out.par_chunks_mut(slice_len)
            .with_min_len(min_batches)
            .enumerate()
            .for_each(slice);
    } else {
        out.chunks_mut(slice_len).enumerate().for_each(slice);
    }
}

/// The row-stochastic attention weights `softmax(q . k^T / sqrt(D))`,
/// shape `[..., Lq, Lk]`, with the default configuration.
///
/// # Errors
///
/// [`AttentionError::InvalidShape`] if `q` and `k` violate the shape
/// invariants, [`AttentionError::AllocationFailure`] if the weights cannot be
/// allocated.
pub fn attention_weights<T: Element>(q: &Tensor<T>, k: &Tensor<T>) -> Result<Tensor<T>> {
    attention_weights_with(&KernelConfig::default(), q, k)
}

/// [`attention_weights`] honouring `config.parallel` and
/// `config.min_rows_per_task`. Weights are always materialized, so the
/// backend and tile size do not apply.
///
/// # Errors
///
/// Same as [`attention_weights`].
pub fn attention_weights_with<T: Element>(
    config: &KernelConfig,
    q: &Tensor<T>,
    k: &Tensor<T>,
) -> Result<Tensor<T>> {
    let shape = check_shapes(q.shape(), k.shape(), k.shape())?;
    let w_shape = shape.weights_shape();
    let mut weights = try_alloc::<T>(&w_shape)?;

    if !weights.is_empty() {
        let (q, k) = (unit_inner_stride(q)?, unit_inner_stride(k)?);
        let (q, k) = (Operand::new(&q), Operand::new(&k));
        let slice = |(b, w): (usize, &mut [T])| attention_weights_slice(q.slice(b), k.slice(b), w);
        let slice_len = shape.lq * shape.lk;
        if config.parallel {
            let min_batches = config.min_rows_per_task.max(1).div_ceil(shape.lq);
            weights
                .par_chunks_mut(slice_len)
                .with_min_len(min_batches)
                .enumerate()
                .for_each(slice);
        } else {
            weights.chunks_mut(slice_len).enumerate().for_each(slice);
        }
    }

    Ok(Tensor::from_parts(weights, Layout::contiguous(&w_shape)))
}

/// [`forward`] for tensors whose element type is only known at run time.
///
/// # Errors
///
/// [`AttentionError::TypeMismatch`] if `k` or `v` differs in element type
/// from `q`, otherwise the errors of [`forward`].
pub fn forward_dyn(q: &DynTensor, k: &DynTensor, v: &DynTensor) -> Result<DynTensor> {
    forward_dyn_with(&KernelConfig::default(), q, k, v)
}

/// [`forward_dyn`] with an explicit configuration.
///
/// # Errors
///
/// Same as [`forward_dyn`].
pub fn forward_dyn_with(
    config: &KernelConfig,
    q: &DynTensor,
    k: &DynTensor,
    v: &DynTensor,
) -> Result<DynTensor> {
    match (q, k, v) {
        (DynTensor::F32(q), DynTensor::F32(k), DynTensor::F32(v)) => {
            forward_with(config, q, k, v).map(DynTensor::F32)
        }
        (DynTensor::F64(q), DynTensor::F64(k), DynTensor::F64(v)) => {
            forward_with(config, q, k, v).map(DynTensor::F64)
        }
        _ => {
            let expected = q.dtype();
            let (tensor, actual) = if k.dtype() == expected {
                ("v", v.dtype())
            } else {
                ("k", k.dtype())
            };
            Err(AttentionError::TypeMismatch {
                tensor,
                expected,
                actual,
            })
        }
    }
}

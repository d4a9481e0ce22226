//! Immutable, shareable tensors over a flat buffer.

use std::sync::Arc;

use crate::dtype::{DType, Element};
use crate::error::{AttentionError, Result};
use crate::layout::{Layout, checked_numel};

/// A strided view over shared, immutable storage.
///
/// Cloning a tensor or taking a [`Tensor::transpose`] view never copies the
/// buffer; the kernel only ever reads inputs and writes freshly allocated
/// outputs.
#[derive(Debug, Clone)]
pub struct Tensor<T: Element> {
    storage: Arc<Vec<T>>,
    layout: Layout,
}

/// Allocate a zero-filled buffer for `shape`.
///
/// # Errors
///
/// Returns [`AttentionError::AllocationFailure`] if the element count
/// overflows or the allocator refuses the request.
pub fn try_alloc<T: Element>(shape: &[usize]) -> Result<Vec<T>> {
    let failure = || AttentionError::AllocationFailure {
        shape: shape.to_vec(),
        element_size: T::DTYPE.size_in_bytes(),
    };
    let len = checked_numel(shape).ok_or_else(failure)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| failure())?;
    buf.resize(len, T::zero());
    Ok(buf)
}

/// Calls `f` with every multi-index of `shape` in row-major order.
fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    if shape.contains(&0) {
        return;
    }
    let mut index = vec![0usize; shape.len()];
    loop {
        f(&index);
        let mut axis = shape.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

impl<T: Element> Tensor<T> {
    /// Wrap a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::InvalidShape`] if `data.len()` is not the
    /// element count of `shape`.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        match checked_numel(shape) {
            Some(n) if n == data.len() => Ok(Self::from_parts(data, Layout::contiguous(shape))),
            _ => Err(AttentionError::invalid_shape(
                "data",
                format!("{} elements for the given shape", data.len()),
                shape,
            )),
        }
    }

    /// Wrap a buffer with an explicit strided layout.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::InvalidShape`] if the stride rank differs
    /// from the shape rank, the element count overflows, or the view reaches
    /// past the end of `data`.
    pub fn from_strided(
        data: Vec<T>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<Self> {
        let layout = Layout::from_parts(shape.to_vec(), strides.to_vec(), offset)?;
        if checked_numel(shape).is_none() {
            return Err(AttentionError::invalid_shape(
                "data",
                "an element count that fits in usize",
                shape,
            ));
        }
        if let Some(max) = layout.max_offset() {
            if max >= data.len() {
                return Err(AttentionError::invalid_shape(
                    "data",
                    format!(
                        "a view within a buffer of {} elements (view reaches index {max})",
                        data.len()
                    ),
                    shape,
                ));
            }
        }
        Ok(Self::from_parts(data, layout))
    }

    /// Zero-filled row-major tensor.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::AllocationFailure`] if the buffer cannot be
    /// allocated.
    pub fn zeros(shape: &[usize]) -> Result<Self> {
        let data = try_alloc(shape)?;
        Ok(Self::from_parts(data, Layout::contiguous(shape)))
    }

    /// Row-major tensor whose element at each multi-index is `f(index)`.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::AllocationFailure`] if the buffer cannot be
    /// allocated.
    pub fn from_fn(shape: &[usize], mut f: impl FnMut(&[usize]) -> T) -> Result<Self> {
        let mut data = try_alloc::<T>(shape)?;
        let mut flat = 0;
        for_each_index(shape, |index| {
            data[flat] = f(index);
            flat += 1;
        });
        Ok(Self::from_parts(data, Layout::contiguous(shape)))
    }

    pub(crate) fn from_parts(storage: Vec<T>, layout: Layout) -> Self {
        Self {
            storage: Arc::new(storage),
            layout,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    #[must_use]
    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.layout.numel()
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// The whole backing buffer, independent of this view's layout.
    pub(crate) fn storage(&self) -> &[T] {
        &self.storage
    }

    /// Element at a full multi-index, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<T> {
        if index.len() != self.rank() || index.iter().zip(self.shape()).any(|(&i, &d)| i >= d) {
            return None;
        }
        self.storage.get(self.layout.offset_of(index)).copied()
    }

    /// The elements in logical row-major order when the view is contiguous.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[T]> {
        if !self.layout.is_contiguous() {
            return None;
        }
        let start = self.layout.offset();
        self.storage.get(start..start + self.numel())
    }

    /// Copy the elements out in logical row-major order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        if let Some(slice) = self.as_slice() {
            return slice.to_vec();
        }
        let mut out = Vec::with_capacity(self.numel());
        for_each_index(self.shape(), |index| {
            out.push(self.storage[self.layout.offset_of(index)]);
        });
        out
    }

    /// A row-major copy of this view (or a cheap clone if already row-major).
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::AllocationFailure`] if the copy cannot be
    /// allocated.
    pub fn to_contiguous(&self) -> Result<Self> {
        if self.layout.is_contiguous() && self.layout.offset() == 0 {
            return Ok(self.clone());
        }
        let mut data = try_alloc::<T>(self.shape())?;
        let mut flat = 0;
        for_each_index(self.shape(), |index| {
            data[flat] = self.storage[self.layout.offset_of(index)];
            flat += 1;
        });
        Ok(Self::from_parts(data, Layout::contiguous(self.shape())))
    }

    /// View with axes `a` and `b` swapped.
    ///
    /// # Errors
    ///
    /// Returns [`AttentionError::InvalidShape`] if either axis is out of range.
    pub fn transpose(&self, a: usize, b: usize) -> Result<Self> {
        Ok(Self {
            storage: Arc::clone(&self.storage),
            layout: self.layout.transpose(a, b)?,
        })
    }
}

/// A tensor whose element type is only known at run time.
#[derive(Debug, Clone)]
pub enum DynTensor {
    F32(Tensor<f32>),
    F64(Tensor<f64>),
}

impl DynTensor {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(t) => t.shape(),
            Self::F64(t) => t.shape(),
        }
    }
}

impl From<Tensor<f32>> for DynTensor {
    fn from(t: Tensor<f32>) -> Self {
        Self::F32(t)
    }
}

impl From<Tensor<f64>> for DynTensor {
    fn from(t: Tensor<f64>) -> Self {
        Self::F64(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_checks_len() {
        let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.get(&[1, 2]), Some(6.0));
        assert_eq!(t.get(&[2, 0]), None);
        assert_eq!(t.get(&[0]), None);

        let err = Tensor::from_vec(vec![1.0f32; 5], &[2, 3]).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { tensor: "data", .. }));
    }

    #[test]
    fn scalar_tensor() {
        let t = Tensor::from_vec(vec![7.0f64], &[]).unwrap();
        assert_eq!(t.rank(), 0);
        assert_eq!(t.numel(), 1);
        assert_eq!(t.to_vec(), vec![7.0]);
    }

    #[test]
    fn transpose_view_shares_storage() {
        let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.shape(), &[3, 2]);
        assert!(tt.as_slice().is_none());
        assert_eq!(tt.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert!(std::ptr::eq(t.storage().as_ptr(), tt.storage().as_ptr()));
    }

    #[test]
    fn to_contiguous_packs_strided_view() {
        let t = Tensor::from_vec((0..6).map(|x| x as f32).collect(), &[2, 3]).unwrap();
        let packed = t.transpose(0, 1).unwrap().to_contiguous().unwrap();
        assert_eq!(packed.as_slice().unwrap(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn from_strided_rejects_out_of_bounds_view() {
        let err = Tensor::from_strided(vec![0.0f32; 5], &[2, 3], &[3, 1], 0).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
        let ok = Tensor::from_strided(vec![0.0f32; 6], &[2, 3], &[3, 1], 0).unwrap();
        assert_eq!(ok.numel(), 6);
    }

    #[test]
    fn from_strided_with_offset_and_gaps() {
        // Every other element of a 7-element buffer, starting at 1.
        let data: Vec<f64> = (0..7).map(f64::from).collect();
        let t = Tensor::from_strided(data, &[3], &[2], 1).unwrap();
        assert_eq!(t.to_vec(), vec![1.0, 3.0, 5.0]);
        assert!(t.as_slice().is_none());
    }

    #[test]
    fn from_fn_row_major() {
        let t = Tensor::<f32>::from_fn(&[2, 2], |i| (i[0] * 10 + i[1]) as f32).unwrap();
        assert_eq!(t.to_vec(), vec![0.0, 1.0, 10.0, 11.0]);
    }

    #[test]
    fn empty_shapes() {
        let t = Tensor::<f32>::zeros(&[0, 4]).unwrap();
        assert_eq!(t.numel(), 0);
        assert!(t.to_vec().is_empty());
        let e = Tensor::<f32>::from_strided(Vec::new(), &[0, 3], &[3, 1], 0).unwrap();
        assert_eq!(e.numel(), 0);
    }

    #[test]
    fn try_alloc_overflow_is_allocation_failure() {
        let err = try_alloc::<f32>(&[usize::MAX, 4]).unwrap_err();
        assert!(matches!(err, AttentionError::AllocationFailure { element_size: 4, .. }));
        let err = try_alloc::<f64>(&[usize::MAX / 4]).unwrap_err();
        assert!(matches!(err, AttentionError::AllocationFailure { .. }));
    }

    #[test]
    fn dyn_tensor_reports_dtype() {
        let a: DynTensor = Tensor::from_vec(vec![1.0f32], &[1]).unwrap().into();
        let b: DynTensor = Tensor::from_vec(vec![1.0f64], &[1]).unwrap().into();
        assert_eq!(a.dtype(), DType::F32);
        assert_eq!(b.dtype(), DType::F64);
        assert_eq!(b.shape(), &[1]);
    }
}

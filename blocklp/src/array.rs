//! Row-major rectangular arrays.
//!
//! Every parallel array of the model (labels, bounds, coefficients, ...) is an
//! `NdArray`. Shapes never shrink while text is being assembled: cells are
//! suppressed by rendering them empty, and filtering only happens when the
//! array is linearized into a file.

use crate::error::{Error, Result};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> NdArray<T> {
    /// Wraps `data` (row-major) into an array of the given shape.
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(Error::Shape {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array over `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn full(shape: Vec<usize>, value: T) -> Self
    where
        T: Clone,
    {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn into_parts(self) -> (Vec<usize>, Vec<T>) {
        (self.shape, self.data)
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> NdArray<U> {
        NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Elementwise map spread over the rayon pool. Output order matches input
    /// order, so the result equals `map` with the same closure.
    pub fn par_map<U>(&self, f: impl Fn(&T) -> U + Sync + Send) -> NdArray<U>
    where
        T: Sync,
        U: Send,
    {
        NdArray {
            shape: self.shape.clone(),
            data: self.data.par_iter().map(f).collect(),
        }
    }

    /// Elementwise combination of two arrays of identical shape.
    pub fn zip_map<U, V>(&self, other: &NdArray<U>, f: impl Fn(&T, &U) -> V) -> Result<NdArray<V>> {
        self.ensure_shape("zip", other.shape())?;
        Ok(NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().zip(&other.data).map(|(a, b)| f(a, b)).collect(),
        })
    }

    /// Folds along `axis`, keeping the order of elements on that axis. The
    /// axis is removed from the resulting shape.
    pub fn reduce_axis<U>(
        &self,
        axis: usize,
        init: impl Fn() -> U,
        fold: impl Fn(&mut U, &T),
    ) -> Result<NdArray<U>> {
        if axis >= self.ndim() {
            return Err(Error::Axis {
                axis,
                ndim: self.ndim(),
            });
        }
        let outer: usize = self.shape[..axis].iter().product();
        let len = self.shape[axis];
        let inner: usize = self.shape[axis + 1..].iter().product();

        let mut data = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            for i in 0..inner {
                let mut acc = init();
                for a in 0..len {
                    fold(&mut acc, &self.data[(o * len + a) * inner + i]);
                }
                data.push(acc);
            }
        }

        let mut shape = self.shape.clone();
        shape.remove(axis);
        Ok(NdArray { shape, data })
    }

    /// Repeats every cell `n` times along a new trailing axis, aligning a
    /// per-constraint array with its per-term arrays.
    pub fn repeat_last(&self, n: usize) -> NdArray<T>
    where
        T: Clone,
    {
        let mut shape = self.shape.clone();
        shape.push(n);
        let data = self
            .data
            .iter()
            .flat_map(|v| std::iter::repeat(v.clone()).take(n))
            .collect();
        NdArray { shape, data }
    }

    pub(crate) fn ensure_shape(&self, what: &str, expected: &[usize]) -> Result<()> {
        if self.shape != expected {
            return Err(Error::ShapeMismatch {
                what: what.to_string(),
                expected: expected.to_vec(),
                actual: self.shape.clone(),
            });
        }
        Ok(())
    }
}

impl<T> From<Vec<T>> for NdArray<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

//! Sample Arrays
//!
//! Node outputs are dense `f64` arrays whose leading dimension indexes
//! samples. A batch of `n` samples of a scalar quantity therefore has shape
//! `(n, 1)`, a batch of vectors `(n, k)`, and so on.
//!
//! The type is deliberately small: it offers just the row-oriented
//! operations the engine needs (slicing rows, stacking chunks, broadcasting
//! constants) and serializes with serde so stores can persist it.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Dimensions of an [`Array`]. Most arrays have at most four axes.
pub type Shape = SmallVec<[usize; 4]>;

/// A dense, row-major array of `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    shape: Shape,
    data: Vec<f64>,
}

impl Array {
    /// Create an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidArray(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            shape: Shape::from_slice(shape),
            data,
        })
    }

    /// A zero-dimensional array holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::new(),
            data: vec![value],
        }
    }

    /// A column vector of shape `(values.len(), 1)`.
    pub fn column(values: Vec<f64>) -> Self {
        Self {
            shape: Shape::from_slice(&[values.len(), 1]),
            data: values,
        }
    }

    /// A one-dimensional array.
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: Shape::from_slice(&[values.len()]),
            data: values,
        }
    }

    /// A two-dimensional array from equally long rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let Some(width) = rows.first().map(Vec::len) else {
            return Ok(Self::empty());
        };
        if rows.iter().any(|row| row.len() != width) {
            return Err(Error::InvalidArray("rows have different lengths".into()));
        }
        let n = rows.len();
        Ok(Self {
            shape: Shape::from_slice(&[n, width]),
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// An array of the given shape filled with `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            shape: Shape::from_slice(shape),
            data: vec![value; shape.iter().product()],
        }
    }

    /// The empty batch, shape `(0, 0)`.
    pub fn empty() -> Self {
        Self {
            shape: Shape::from_slice(&[0, 0]),
            data: Vec::new(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of samples (the leading dimension). A scalar counts as one.
    pub fn nrows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of values in one row.
    fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn into_values(self) -> Vec<f64> {
        self.data
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    /// The `i`-th sample, with the leading dimension removed.
    pub fn row(&self, i: usize) -> Result<Self> {
        if self.ndim() == 0 || i >= self.nrows() {
            return Err(Error::InvalidArray(format!(
                "row {} out of range for shape {:?}",
                i, self.shape
            )));
        }
        let width = self.row_len();
        Ok(Self {
            shape: Shape::from_slice(&self.shape[1..]),
            data: self.data[i * width..(i + 1) * width].to_vec(),
        })
    }

    /// Samples in `range`, keeping the leading dimension.
    pub fn rows(&self, range: Range<usize>) -> Result<Self> {
        if self.ndim() == 0 || range.start > range.end || range.end > self.nrows() {
            return Err(Error::InvalidArray(format!(
                "rows {:?} out of range for shape {:?}",
                range, self.shape
            )));
        }
        let width = self.row_len();
        let mut shape = self.shape.clone();
        shape[0] = range.len();
        Ok(Self {
            shape,
            data: self.data[range.start * width..range.end * width].to_vec(),
        })
    }

    /// Concatenate along the leading dimension. Empty parts are skipped.
    pub fn vstack(parts: &[Self]) -> Result<Self> {
        let mut non_empty = parts.iter().filter(|part| part.nrows() > 0 && part.ndim() > 0);
        let Some(first) = non_empty.next() else {
            return Ok(Self::empty());
        };
        let mut shape = first.shape.clone();
        let mut data = first.data.clone();
        for part in non_empty {
            if part.shape[1..] != shape[1..] {
                return Err(Error::InvalidArray(format!(
                    "cannot stack shape {:?} onto {:?}",
                    part.shape, shape
                )));
            }
            shape[0] += part.shape[0];
            data.extend_from_slice(&part.data);
        }
        Ok(Self { shape, data })
    }

    /// Stack equally shaped arrays along a new leading axis.
    pub fn stack(items: &[Self]) -> Result<Self> {
        let Some(first) = items.first() else {
            return Ok(Self::empty());
        };
        if items.iter().any(|item| item.shape != first.shape) {
            return Err(Error::InvalidArray("cannot stack arrays of different shapes".into()));
        }
        let mut shape = Shape::with_capacity(first.ndim() + 1);
        shape.push(items.len());
        shape.extend_from_slice(&first.shape);
        let data = items.iter().flat_map(|item| item.data.iter().copied()).collect();
        Ok(Self { shape, data })
    }

    /// Repeat all rows `times` times along the leading dimension.
    pub fn tile_rows(&self, times: usize) -> Self {
        let mut shape = self.shape.clone();
        if shape.is_empty() {
            shape.push(1);
        }
        shape[0] *= times;
        let mut data = Vec::with_capacity(self.data.len() * times);
        for _ in 0..times {
            data.extend_from_slice(&self.data);
        }
        Self { shape, data }
    }

    /// Bring user-supplied data into batch form for `n` samples.
    ///
    /// - a scalar becomes `(n, 1)`;
    /// - a vector of length `n` becomes a column, any other vector becomes
    ///   `n` copies of itself as rows;
    /// - a higher-dimensional array whose leading dimension is `n` is kept,
    ///   otherwise it gains a new leading axis holding `n` copies.
    pub fn normalize(self, n: usize) -> Self {
        match self.ndim() {
            0 => Self::full(&[n, 1], self.data[0]),
            1 if self.shape[0] == n => Self {
                shape: Shape::from_slice(&[n, 1]),
                data: self.data,
            },
            1 => {
                let width = self.shape[0];
                let row = Self {
                    shape: Shape::from_slice(&[1, width]),
                    data: self.data,
                };
                row.tile_rows(n)
            }
            _ if self.shape[0] == n => self,
            _ => {
                let mut shape = Shape::with_capacity(self.ndim() + 1);
                shape.push(1);
                shape.extend_from_slice(&self.shape);
                Self {
                    shape,
                    data: self.data,
                }
                .tile_rows(n)
            }
        }
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

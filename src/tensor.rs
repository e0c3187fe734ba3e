//! Pattern tensors with named axes.
//!
//! Every axis of a [`LabeledTensor`] carries a [`Dimension`] label, and all
//! downstream code looks axes up by label rather than by position.  The label
//! list and the array rank can only change together, so
//! `tensor.dims().len() == tensor.ndim()` holds for every value of the type.
use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{McpaError, Result};

/// Axis label of a pattern tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Trial / repetition.  Each instance has one event type.
    Instance,
    /// Sample within the epoch.
    Time,
    /// Channel or derived feature.
    #[serde(alias = "channel")]
    Feature,
    /// Recording session / run.
    Session,
    /// Participant.
    #[serde(alias = "participant")]
    Subject,
}

impl Dimension {
    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Time => "time",
            Self::Feature => "feature",
            Self::Session => "session",
            Self::Subject => "subject",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = McpaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "instance" | "instances" | "trial" => Ok(Self::Instance),
            "time" => Ok(Self::Time),
            "feature" | "channel" => Ok(Self::Feature),
            "session" => Ok(Self::Session),
            "subject" | "participant" => Ok(Self::Subject),
            _ => Err(McpaError::UnknownDimensionName(s.to_string())),
        }
    }
}

/// Parse a list of dimension names, e.g. `["time", "session"]`.
pub fn parse_dimensions<S: AsRef<str>>(names: &[S]) -> Result<Vec<Dimension>> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// An `f64` array whose axes are labelled with [`Dimension`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTensor {
    data: ArrayD<f64>,
    dims: Vec<Dimension>,
}

impl LabeledTensor {
    /// Bind `dims` to the axes of `data`.
    ///
    /// Fails if the rank differs from the number of labels or a label repeats.
    pub fn new(data: ArrayD<f64>, dims: Vec<Dimension>) -> Result<Self> {
        if data.ndim() != dims.len() {
            return Err(McpaError::DimensionMismatch(format!(
                "array has {} axes but {} labels {:?}",
                data.ndim(),
                dims.len(),
                dims
            )));
        }
        check_unique(&dims)?;
        Ok(Self { data, dims })
    }

    /// Underlying array.
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Axis labels, parallel to `data().shape()`.
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn has(&self, dim: Dimension) -> bool {
        self.dims.contains(&dim)
    }

    /// Position of `dim`, or [`McpaError::UnknownDimension`].
    pub fn axis_of(&self, dim: Dimension) -> Result<Axis> {
        self.dims
            .iter()
            .position(|&d| d == dim)
            .map(Axis)
            .ok_or_else(|| McpaError::UnknownDimension { dim, available: self.dims.clone() })
    }

    /// Extent of the axis labelled `dim`.
    pub fn len_of(&self, dim: Dimension) -> Result<usize> {
        Ok(self.data.len_of(self.axis_of(dim)?))
    }

    /// Collapse `dim` with `reduce`, dropping the axis and its label.
    ///
    /// `reduce` receives the whole array and the axis to collapse and must
    /// return an array with that axis removed.
    pub fn reduce_with<F>(&self, dim: Dimension, reduce: F) -> Result<Self>
    where
        F: FnOnce(ArrayViewD<'_, f64>, Axis) -> ArrayD<f64>,
    {
        let axis = self.axis_of(dim)?;
        let out = reduce(self.data.view(), axis);

        let mut expected: Vec<usize> = self.shape().to_vec();
        expected.remove(axis.index());
        if out.shape() != expected.as_slice() {
            return Err(McpaError::DimensionMismatch(format!(
                "reducing '{dim}' produced shape {:?}, expected {:?}",
                out.shape(),
                expected
            )));
        }

        let mut dims = self.dims.clone();
        dims.remove(axis.index());
        Ok(Self { data: out, dims })
    }

    /// Permute axes into `order`, which must name every current axis once.
    pub fn reorder(&self, order: &[Dimension]) -> Result<Self> {
        if order.len() != self.dims.len() {
            return Err(McpaError::DimensionMismatch(format!(
                "cannot reorder {:?} into {:?}",
                self.dims, order
            )));
        }
        check_unique(order)?;
        let perm = order
            .iter()
            .map(|&d| self.axis_of(d).map(|a| a.index()))
            .collect::<Result<Vec<_>>>()?;
        let data = self
            .data
            .clone()
            .permuted_axes(IxDyn(&perm))
            .as_standard_layout()
            .into_owned();
        Ok(Self { data, dims: order.to_vec() })
    }

    /// Relabel axis `from` as `to`.
    pub fn rename(&mut self, from: Dimension, to: Dimension) -> Result<()> {
        if from != to && self.has(to) {
            return Err(McpaError::DuplicateDimension(to));
        }
        let axis = self.axis_of(from)?;
        self.dims[axis.index()] = to;
        Ok(())
    }

    /// Keep only `indices` along `dim` (in the given order).
    pub fn select(&self, dim: Dimension, indices: &[usize]) -> Result<Self> {
        let axis = self.axis_of(dim)?;
        let size = self.data.len_of(axis);
        if let Some(&bad) = indices.iter().find(|&&i| i >= size) {
            return Err(McpaError::IndexOutOfRange { what: dim.name(), index: bad, size });
        }
        Ok(Self { data: self.data.select(axis, indices), dims: self.dims.clone() })
    }

    /// Fix `dim` at `index`, dropping the axis.
    pub fn index(&self, dim: Dimension, index: usize) -> Result<Self> {
        let axis = self.axis_of(dim)?;
        let size = self.data.len_of(axis);
        if index >= size {
            return Err(McpaError::IndexOutOfRange { what: dim.name(), index, size });
        }
        let mut dims = self.dims.clone();
        dims.remove(axis.index());
        Ok(Self { data: self.data.index_axis(axis, index).to_owned(), dims })
    }

    /// Append a length-1 axis labelled `dim` if the tensor lacks one.
    pub fn with_singleton(self, dim: Dimension) -> Self {
        if self.has(dim) {
            return self;
        }
        let axis = Axis(self.dims.len());
        let mut dims = self.dims;
        dims.push(dim);
        Self { data: self.data.insert_axis(axis), dims }
    }

    /// Mutable view of the values; the shape cannot change through it.
    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.data.view_mut()
    }

    pub fn into_parts(self) -> (ArrayD<f64>, Vec<Dimension>) {
        (self.data, self.dims)
    }
}

fn check_unique(dims: &[Dimension]) -> Result<()> {
    for (i, d) in dims.iter().enumerate() {
        if dims[..i].contains(d) {
            return Err(McpaError::DuplicateDimension(*d));
        }
    }
    Ok(())
}

//! Dense tensors with named indices.
//!
//! A [`Tensor`] pairs an N-dimensional complex array with one [`Idx`] per axis.
//! Contraction is performed over all indices common to both operands, so that
//! wiring of a network is determined entirely by index identity rather than by
//! axis position.
//!
//! ```
//! use ladder_mpo::index::{ BondIndexFactory, Idx, MPOIdx };
//! use ladder_mpo::tensor::Tensor;
//!
//! let mut factory = BondIndexFactory::new();
//! let a: MPOIdx = factory.make_index("a", 3).into();
//! let b: MPOIdx = factory.make_index("b", 2).into();
//! let u = Tensor::unit(a.clone(), 1).unwrap();
//! let m = Tensor::new_zeros(vec![a, b]).unwrap();
//! let v = u.contract(&m).unwrap();
//! assert_eq!(v.rank(), 1);
//! assert_eq!(v.indices()[0].dim(), 2);
//! ```

use std::fmt;
use itertools::Itertools;
use ndarray::{ self as nd, Axis, Dimension, IxDyn };
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use thiserror::Error;
use crate::{ config::Context, index::Idx };

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when attempting to create a new tensor with duplicate indices.
    #[error("error in tensor creation: duplicate indices")]
    DuplicateIndices,

    /// Returned when attempting to create a new tensor with at least one index
    /// that has zero dimension.
    #[error("error in tensor creation: encountered a zero-dimensional index")]
    ZeroDimIndex,

    /// Returned when an array's shape doesn't match the provided indices.
    #[error("error in tensor creation: array shape {found:?} doesn't match index dimensions {expected:?}")]
    IncompatibleShape { expected: Vec<usize>, found: Vec<usize> },

    /// Returned when an index is referenced that the tensor doesn't carry.
    #[error("index {0} is not present in the tensor")]
    MissingIndex(String),

    /// Returned when an index value exceeds its dimension.
    #[error("value {value} is out of range for index {label} of dimension {dim}")]
    ValueOutOfRange { label: String, value: usize, dim: usize },

    /// Returned when an operator matrix doesn't fit the physical indices it is
    /// placed on.
    #[error("operator of shape {found:?} doesn't fit indices of dimensions ({rows}, {cols})")]
    OperatorShape { rows: usize, cols: usize, found: Vec<usize> },

    /// Returned when an element assignment doesn't fix every index.
    #[error("assignment must fix all {rank} indices; got {given}")]
    Underdetermined { rank: usize, given: usize },

    /// Returned when a requested axis ordering isn't a permutation of the
    /// tensor's indices.
    #[error("requested index order is not a permutation of the tensor's indices")]
    IncompatibleOrder,

    #[error("reshape error: {0}")]
    Shape(#[from] nd::ShapeError),
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// A dense tensor with one [`Idx`] per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor<T>
where T: Idx
{
    indices: Vec<T>,
    data: nd::ArrayD<C64>,
}

fn check_indices<T: Idx>(indices: &[T]) -> TensorResult<()> {
    if indices.iter().any(|idx| idx.dim() == 0) {
        return Err(ZeroDimIndex);
    }
    let dup = indices.iter().tuple_combinations().any(|(a, b)| a == b);
    if dup { return Err(DuplicateIndices); }
    Ok(())
}

impl<T> Tensor<T>
where T: Idx
{
    /// Create a new tensor of all zeros.
    pub fn new_zeros(indices: Vec<T>) -> TensorResult<Self> {
        check_indices(&indices)?;
        let shape: Vec<usize> = indices.iter().map(|idx| idx.dim()).collect();
        Ok(Self { indices, data: nd::ArrayD::zeros(IxDyn(&shape)) })
    }

    /// Create a new tensor from pre-existing data, with axes in the order of
    /// `indices`.
    pub fn from_array(indices: Vec<T>, data: nd::ArrayD<C64>)
        -> TensorResult<Self>
    {
        check_indices(&indices)?;
        let expected: Vec<usize>
            = indices.iter().map(|idx| idx.dim()).collect();
        if data.shape() != expected.as_slice() {
            return Err(IncompatibleShape {
                expected,
                found: data.shape().to_vec(),
            });
        }
        Ok(Self { indices, data })
    }

    /// Create a rank-1 tensor with a single unit entry at `value`.
    pub fn unit(idx: T, value: usize) -> TensorResult<Self> {
        check_value(&idx, value)?;
        let mut new = Self::new_zeros(vec![idx])?;
        new.data[[value].as_slice()] = C64::one();
        Ok(new)
    }

    /// Return the indices of `self`, in axis order.
    pub fn indices(&self) -> &[T] { &self.indices }

    /// Return the number of indices.
    pub fn rank(&self) -> usize { self.indices.len() }

    /// Return a reference to the underlying array.
    pub fn array(&self) -> &nd::ArrayD<C64> { &self.data }

    /// Return the axis position of `idx`, if present.
    pub fn position(&self, idx: &T) -> Option<usize> {
        self.indices.iter().position(|i| i == idx)
    }

    /// Return `true` if `self` carries `idx`.
    pub fn has_index(&self, idx: &T) -> bool { self.position(idx).is_some() }

    fn position_checked(&self, idx: &T) -> TensorResult<usize> {
        self.position(idx).ok_or_else(|| MissingIndex(idx.label()))
    }

    /// If `self` is rank-0, return its single value.
    pub fn as_scalar(&self) -> Option<C64> {
        (self.rank() == 0).then(|| self.data.iter().copied().next()).flatten()
    }

    /// Return a single element, given a value for every index.
    pub fn get(&self, at: &[(&T, usize)]) -> TensorResult<C64> {
        if at.len() != self.rank() {
            return Err(Underdetermined { rank: self.rank(), given: at.len() });
        }
        let mut pos: Vec<usize> = vec![0; self.rank()];
        for (idx, value) in at.iter() {
            check_value(*idx, *value)?;
            pos[self.position_checked(idx)?] = *value;
        }
        Ok(self.data[pos.as_slice()])
    }

    /// Add `coef · op ⊗ ∣fixed⟩` to `self`, where `op` is placed on the index
    /// pair `(out, inp)` as `op[[out, inp]]` and every remaining index is held
    /// at the value given in `fixed`.
    pub fn add_term(
        &mut self,
        op: &nd::Array2<C64>,
        out: &T,
        inp: &T,
        fixed: &[(&T, usize)],
        coef: C64,
    ) -> TensorResult<()>
    {
        if op.shape() != [out.dim(), inp.dim()] {
            return Err(OperatorShape {
                rows: out.dim(),
                cols: inp.dim(),
                found: op.shape().to_vec(),
            });
        }
        if fixed.len() + 2 != self.rank() {
            return Err(Underdetermined {
                rank: self.rank(),
                given: fixed.len() + 2,
            });
        }
        let mut pos: Vec<usize> = vec![0; self.rank()];
        for (idx, value) in fixed.iter() {
            check_value(*idx, *value)?;
            pos[self.position_checked(idx)?] = *value;
        }
        let p_out = self.position_checked(out)?;
        let p_in = self.position_checked(inp)?;
        for ((a, b), x) in op.indexed_iter() {
            if x.is_zero() { continue; }
            pos[p_out] = a;
            pos[p_in] = b;
            self.data[pos.as_slice()] += *x * coef;
        }
        Ok(())
    }

    /// Fix the values of some indices, returning the remaining sub-tensor.
    pub fn fix(&self, at: &[(&T, usize)]) -> TensorResult<Self> {
        let mut axes: Vec<(usize, usize)> = Vec::with_capacity(at.len());
        for (idx, value) in at.iter() {
            check_value(*idx, *value)?;
            axes.push((self.position_checked(idx)?, *value));
        }
        // remove from the back so earlier axis numbers stay valid
        axes.sort_by(|l, r| r.0.cmp(&l.0));
        let mut view = self.data.view();
        let mut indices = self.indices.clone();
        for (axis, value) in axes.into_iter() {
            view = view.index_axis_move(Axis(axis), value);
            indices.remove(axis);
        }
        Ok(Self { indices, data: view.to_owned() })
    }

    /// Contract `self` with `rhs` over all common indices.
    ///
    /// The remaining indices of `self` come first in the result, followed by
    /// those of `rhs`, each in their original order.
    pub fn contract(&self, rhs: &Self) -> TensorResult<Self> {
        let common: Vec<(usize, usize)>
            = self.indices.iter().enumerate()
            .filter_map(|(i, idx)| rhs.position(idx).map(|j| (i, j)))
            .collect();
        let keep_l: Vec<usize>
            = (0..self.rank())
            .filter(|i| !common.iter().any(|(c, _)| c == i))
            .collect();
        let keep_r: Vec<usize>
            = (0..rhs.rank())
            .filter(|j| !common.iter().any(|(_, c)| c == j))
            .collect();
        let dim_of = |idxs: &[T], axes: &[usize]| -> usize {
            axes.iter().map(|&k| idxs[k].dim()).product()
        };
        let m = dim_of(&self.indices, &keep_l);
        let n = dim_of(&rhs.indices, &keep_r);
        let c: usize
            = common.iter().map(|&(i, _)| self.indices[i].dim()).product();

        let perm_l: Vec<usize>
            = keep_l.iter().copied()
            .chain(common.iter().map(|&(i, _)| i))
            .collect();
        let perm_r: Vec<usize>
            = common.iter().map(|&(_, j)| j)
            .chain(keep_r.iter().copied())
            .collect();
        let L: nd::Array2<C64>
            = self.data.view().permuted_axes(perm_l)
            .as_standard_layout().into_owned()
            .into_shape((m, c))?;
        let R: nd::Array2<C64>
            = rhs.data.view().permuted_axes(perm_r)
            .as_standard_layout().into_owned()
            .into_shape((c, n))?;

        let indices: Vec<T>
            = keep_l.iter().map(|&i| self.indices[i].clone())
            .chain(keep_r.iter().map(|&j| rhs.indices[j].clone()))
            .collect();
        let shape: Vec<usize> = indices.iter().map(|idx| idx.dim()).collect();
        let data = L.dot(&R).into_shape(IxDyn(&shape))?;
        Ok(Self { indices, data })
    }

    /// Return the data with axes permuted into the order of `order`.
    pub fn to_array_ordered(&self, order: &[T]) -> TensorResult<nd::ArrayD<C64>> {
        if order.len() != self.rank() { return Err(IncompatibleOrder); }
        let perm: Vec<usize>
            = order.iter()
            .map(|idx| self.position(idx).ok_or(IncompatibleOrder))
            .collect::<TensorResult<_>>()?;
        Ok(
            self.data.view().permuted_axes(perm)
                .as_standard_layout().into_owned()
        )
    }

    /// Return the largest element magnitude.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().map(|x| x.norm()).fold(0.0, f64::max)
    }

    /// Return a printable view of `self` configured by `ctx`.
    pub fn display_with<'a>(&'a self, ctx: &'a Context) -> TensorDisplay<'a, T> {
        TensorDisplay { tensor: self, ctx }
    }
}

fn check_value<T: Idx>(idx: &T, value: usize) -> TensorResult<()> {
    if value >= idx.dim() {
        Err(ValueOutOfRange { label: idx.label(), value, dim: idx.dim() })
    } else {
        Ok(())
    }
}

/// Printable view of a [`Tensor`] returned by [`Tensor::display_with`].
pub struct TensorDisplay<'a, T>
where T: Idx
{
    tensor: &'a Tensor<T>,
    ctx: &'a Context,
}

impl<'a, T> fmt::Display for TensorDisplay<'a, T>
where T: Idx
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String>
            = self.tensor.indices.iter()
            .map(|idx| format!("{}:{}", idx.label(), idx.dim()))
            .collect();
        write!(f, "Tensor {{ {} }}", labels.join(", "))?;
        if !self.ctx.print_data { return Ok(()); }
        for (pos, x) in self.tensor.data.indexed_iter() {
            if x.norm() <= self.ctx.print_scale { continue; }
            let pos: Vec<usize> = pos.slice().iter().map(|k| k + 1).collect();
            write!(f, "\n  {:?} ({:.6}, {:.6})", pos, x.re, x.im)?;
        }
        Ok(())
    }
}

impl<T> fmt::Display for Tensor<T>
where T: Idx
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = Context::default();
        fmt::Display::fmt(&self.display_with(&ctx), f)
    }
}

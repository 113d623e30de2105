//! Container for matrix product operators.
//!
//! An [`MPO`] over `ns` sites holds one rank-4 tensor per site and two edge
//! vectors that close off the outermost bonds:
//! ```text
//!        s1'        s2'              sN'
//!         |          |                |
//! L --- W[1] ---- W[2] --- ... --- W[N] --- R
//!   b0    |    b1    |    b2    bN-1  |  bN
//!        s1         s2               sN
//! ```
//! Tensor `W[n]` carries the indices `[SiteP(n), Site(n), b(n-1), b(n)]`.

use std::fmt;
use ndarray::{ self as nd, Ix2 };
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    config::Context,
    index::{ BondIdx, Idx, MPOIdx },
    lattice::LatticeError,
    tensor::{ Tensor, TensorError },
};

/// Largest total physical dimension for which [`MPO::to_dense`] will produce a
/// matrix.
pub const MAX_DENSE_DIM: usize = 1 << 10;

/// Largest number of entries allowed in any intermediate of [`MPO::to_dense`].
pub const MAX_DENSE_ENTRIES: usize = 1 << 23;

#[derive(Debug, Error)]
pub enum MPOError {
    /// Returned when the requested geometry or parameters are illegal.
    #[error("invalid configuration: {0}")]
    Lattice(#[from] LatticeError),

    /// Returned when a site operator doesn't match the declared dimension of
    /// its site.
    #[error("operator {op} at site {site} has shape {found:?}; expected ({expected}, {expected})")]
    OperatorShape {
        site: usize,
        op: &'static str,
        expected: usize,
        found: Vec<usize>,
    },

    /// Returned when a site number is outside of `1..=ns`.
    #[error("site {site} is outside of 1..={ns}")]
    SiteOutOfRange { site: usize, ns: usize },

    /// Returned when a tensor placed at a site doesn't carry the indices
    /// belonging to it.
    #[error("tensor placed at site {site} doesn't carry index {label}")]
    MissingIndex { site: usize, label: String },

    /// Returned when a chain is used before all of its tensors are set.
    #[error("no tensor has been set at site {0}")]
    MissingTensor(usize),

    /// Returned when a chain is used before both edge vectors are set.
    #[error("the {0} edge vector has not been set")]
    MissingEdge(&'static str),

    /// Returned when an edge vector isn't a rank-1 tensor on its outer bond.
    #[error("edge vector must be a rank-1 tensor on bond {0}")]
    EdgeShape(usize),

    /// Returned when a product state has the wrong number of sites.
    #[error("basis state has {found} sites; expected {expected}")]
    BasisLength { expected: usize, found: usize },

    /// Returned when a dense contraction would be unreasonably large. Holds
    /// the total physical dimension, saturated at `usize::MAX`.
    #[error("total physical dimension {0} is too large for a dense matrix")]
    TooLarge(usize),

    /// Returned when a tensor operation fails at a particular site.
    #[error("tensor error at site {site}: {source}")]
    TensorAt {
        site: usize,
        #[source]
        source: TensorError,
    },

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use MPOError::*;
pub type MPOResult<T> = Result<T, MPOError>;

/// An ordered chain of local operator tensors with edge vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct MPO {
    // `links[l]` connects sites `l` and `l + 1`; `links.len() == ns + 1`
    links: Vec<BondIdx>,
    tensors: Vec<Option<Tensor<MPOIdx>>>,
    left: Option<Tensor<MPOIdx>>,
    right: Option<Tensor<MPOIdx>>,
}

impl MPO {
    /// Create an empty chain over the given bonds; the number of sites is one
    /// less than the number of bonds.
    pub fn new(links: Vec<BondIdx>) -> Self {
        let ns = links.len().saturating_sub(1);
        Self { links, tensors: vec![None; ns], left: None, right: None }
    }

    /// Number of sites.
    pub fn len(&self) -> usize { self.tensors.len() }

    /// Return `true` if the chain has no sites.
    pub fn is_empty(&self) -> bool { self.tensors.is_empty() }

    /// Return all bonds, from `b0` to `bN`.
    pub fn links(&self) -> &[BondIdx] { &self.links }

    /// Return the dimension of every bond.
    pub fn bond_dims(&self) -> Vec<usize> {
        self.links.iter().map(|b| b.dim()).collect()
    }

    fn check_site(&self, n: usize) -> MPOResult<()> {
        if (1..=self.len()).contains(&n) {
            Ok(())
        } else {
            Err(SiteOutOfRange { site: n, ns: self.len() })
        }
    }

    /// Place a tensor at site `n`.
    ///
    /// The tensor must carry the two bonds adjacent to `n` as well as input and
    /// output physical indices for `n`.
    pub fn set_local_tensor(&mut self, n: usize, W: Tensor<MPOIdx>)
        -> MPOResult<()>
    {
        self.check_site(n)?;
        for l in [n - 1, n] {
            let link = MPOIdx::Link(self.links[l].clone());
            if !W.has_index(&link) {
                return Err(MissingIndex { site: n, label: link.label() });
            }
        }
        let has_site
            = W.indices().iter()
            .any(|idx| matches!(idx, MPOIdx::Site { n: m, .. } if *m == n));
        let has_site_p
            = W.indices().iter()
            .any(|idx| matches!(idx, MPOIdx::SiteP { n: m, .. } if *m == n));
        if !has_site || !has_site_p {
            return Err(MissingIndex { site: n, label: format!("s{n}") });
        }
        self.tensors[n - 1] = Some(W);
        Ok(())
    }

    /// Return the tensor at site `n`, if set.
    pub fn local_tensor(&self, n: usize) -> Option<&Tensor<MPOIdx>> {
        n.checked_sub(1)
            .and_then(|k| self.tensors.get(k))
            .and_then(|w| w.as_ref())
    }

    fn tensor_checked(&self, n: usize) -> MPOResult<&Tensor<MPOIdx>> {
        self.check_site(n)?;
        self.local_tensor(n).ok_or(MissingTensor(n))
    }

    fn check_edge(&self, v: &Tensor<MPOIdx>, l: usize) -> MPOResult<()> {
        let link = MPOIdx::Link(self.links[l].clone());
        if v.rank() == 1 && v.has_index(&link) {
            Ok(())
        } else {
            Err(EdgeShape(l))
        }
    }

    /// Set the vector contracted against the leftmost bond.
    pub fn set_left_edge(&mut self, v: Tensor<MPOIdx>) -> MPOResult<()> {
        if self.links.is_empty() { return Err(EdgeShape(0)); }
        self.check_edge(&v, 0)?;
        self.left = Some(v);
        Ok(())
    }

    /// Set the vector contracted against the rightmost bond.
    pub fn set_right_edge(&mut self, v: Tensor<MPOIdx>) -> MPOResult<()> {
        let l = self.len();
        if self.links.is_empty() { return Err(EdgeShape(l)); }
        self.check_edge(&v, l)?;
        self.right = Some(v);
        Ok(())
    }

    /// Return the left edge vector, if set.
    pub fn left_edge(&self) -> Option<&Tensor<MPOIdx>> { self.left.as_ref() }

    /// Return the right edge vector, if set.
    pub fn right_edge(&self) -> Option<&Tensor<MPOIdx>> { self.right.as_ref() }

    fn edges(&self) -> MPOResult<(&Tensor<MPOIdx>, &Tensor<MPOIdx>)> {
        let l = self.left.as_ref().ok_or(MissingEdge("left"))?;
        let r = self.right.as_ref().ok_or(MissingEdge("right"))?;
        Ok((l, r))
    }

    /// Return `true` if every tensor and both edges are set.
    pub fn is_complete(&self) -> bool {
        !self.is_empty()
            && self.tensors.iter().all(|w| w.is_some())
            && self.left.is_some()
            && self.right.is_some()
    }

    /// Return the physical dimension of site `n`.
    pub fn site_dim(&self, n: usize) -> MPOResult<usize> {
        let W = self.tensor_checked(n)?;
        W.indices().iter()
            .find_map(|idx| match idx {
                MPOIdx::Site { n: m, dim } if *m == n => Some(*dim),
                _ => None,
            })
            .ok_or(MissingIndex { site: n, label: format!("s{n}") })
    }

    /// Return the operator held in channel `(row, col)` of site `n` as a matrix
    /// indexed `[[out, in]]`.
    pub fn block(&self, n: usize, row: usize, col: usize)
        -> MPOResult<nd::Array2<C64>>
    {
        let W = self.tensor_checked(n)?;
        let d = self.site_dim(n)?;
        let row_idx = MPOIdx::Link(self.links[n - 1].clone());
        let col_idx = MPOIdx::Link(self.links[n].clone());
        let at = |source: TensorError| TensorAt { site: n, source };
        let block
            = W.fix(&[(&row_idx, row), (&col_idx, col)])
            .map_err(at)?
            .to_array_ordered(&[
                MPOIdx::SiteP { n, dim: d },
                MPOIdx::Site { n, dim: d },
            ])
            .map_err(at)?
            .into_dimensionality::<Ix2>()
            .map_err(|e| at(e.into()))?;
        Ok(block)
    }

    /// Compute ⟨`out`∣ H ∣`inp`⟩ for two product basis states, given as one
    /// local basis value per site.
    ///
    /// The cost is linear in the number of sites.
    pub fn matrix_element(&self, out: &[usize], inp: &[usize]) -> MPOResult<C64> {
        for state in [out, inp] {
            if state.len() != self.len() {
                return Err(BasisLength { expected: self.len(), found: state.len() });
            }
        }
        let (left, right) = self.edges()?;
        let mut v: nd::Array1<C64>
            = left.array().view().into_dimensionality::<nd::Ix1>()
            .map_err(TensorError::from)?
            .to_owned();
        for (k, (&a, &b)) in out.iter().zip(inp).enumerate() {
            let n = k + 1;
            let W = self.tensor_checked(n)?;
            let d = self.site_dim(n)?;
            let at = |source: TensorError| TensorAt { site: n, source };
            let M: nd::Array2<C64>
                = W.fix(&[
                    (&MPOIdx::SiteP { n, dim: d }, a),
                    (&MPOIdx::Site { n, dim: d }, b),
                ])
                .map_err(at)?
                .to_array_ordered(&[
                    MPOIdx::Link(self.links[n - 1].clone()),
                    MPOIdx::Link(self.links[n].clone()),
                ])
                .map_err(at)?
                .into_dimensionality::<Ix2>()
                .map_err(|e| at(e.into()))?;
            v = v.dot(&M);
        }
        let r: nd::ArrayView1<C64>
            = right.array().view().into_dimensionality::<nd::Ix1>()
            .map_err(TensorError::from)?;
        Ok(v.dot(&r))
    }

    /// Fully contract the chain into a dense matrix indexed `[[out, in]]`, with
    /// site 1 as the most significant digit of both row and column.
    pub fn to_dense(&self) -> MPOResult<nd::Array2<C64>> {
        let (left, right) = self.edges()?;
        let dims: Vec<usize>
            = (1..=self.len())
            .map(|n| self.site_dim(n))
            .collect::<MPOResult<_>>()?;
        let D = dense_dim(dims.iter().copied())?;
        // the last intermediate carries both physical spaces and one bond
        let kmax = self.links.iter().map(|b| b.dim()).max().unwrap_or(1);
        let entries
            = D.checked_mul(D)
            .and_then(|d2| d2.checked_mul(kmax));
        if entries.map_or(true, |e| e > MAX_DENSE_ENTRIES) {
            return Err(TooLarge(D));
        }

        let mut acc: Tensor<MPOIdx> = left.clone();
        for n in 1..=self.len() {
            let W = self.tensor_checked(n)?;
            acc = acc.contract(W).map_err(|source| TensorAt { site: n, source })?;
        }
        acc = acc.contract(right)?;
        let order: Vec<MPOIdx>
            = dims.iter().enumerate()
            .map(|(k, &dim)| MPOIdx::SiteP { n: k + 1, dim })
            .chain(
                dims.iter().enumerate()
                .map(|(k, &dim)| MPOIdx::Site { n: k + 1, dim })
            )
            .collect();
        let H: nd::Array2<C64>
            = acc.to_array_ordered(&order)?
            .into_shape((D, D))
            .map_err(TensorError::from)?;
        Ok(H)
    }

    /// Return a printable view of `self` configured by `ctx`.
    pub fn display_with<'a>(&'a self, ctx: &'a Context) -> MPODisplay<'a> {
        MPODisplay { mpo: self, ctx }
    }
}

/// Printable view of an [`MPO`] returned by [`MPO::display_with`].
pub struct MPODisplay<'a> {
    mpo: &'a MPO,
    ctx: &'a Context,
}

impl<'a> fmt::Display for MPODisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPO with {} sites, bond dims {:?}", self.mpo.len(), self.mpo.bond_dims())?;
        for (k, W) in self.mpo.tensors.iter().enumerate() {
            match W {
                Some(W) => write!(f, "\nW[{}] = {}", k + 1, W.display_with(self.ctx))?,
                None => write!(f, "\nW[{}] = (unset)", k + 1)?,
            }
        }
        Ok(())
    }
}

/// Return the product of the physical dimensions `dims` if it is at most
/// [`MAX_DENSE_DIM`].
pub fn dense_dim<I>(dims: I) -> MPOResult<usize>
where I: IntoIterator<Item = usize>
{
    let D: usize
        = dims.into_iter()
        .try_fold(1_usize, |acc, d| acc.checked_mul(d))
        .unwrap_or(usize::MAX);
    if D > MAX_DENSE_DIM { Err(TooLarge(D)) } else { Ok(D) }
}

/// Create an edge vector on `link` selecting `value`.
pub fn make_edge(link: &BondIdx, value: usize) -> MPOResult<Tensor<MPOIdx>> {
    Ok(Tensor::unit(MPOIdx::Link(link.clone()), value)?)
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use num_traits::{ One, Zero };
    use crate::index::BondIndexFactory;
    use super::*;

    // a two-site chain holding Z ⊗ Z through a single bond channel
    fn zz_chain() -> MPO {
        let mut factory = BondIndexFactory::new();
        let links = factory.make_links("b", 1, 3);
        let mut mpo = MPO::new(links.clone());
        let z: nd::Array2<C64>
            = nd::array![[C64::one(), C64::zero()], [C64::zero(), -C64::one()]];
        for n in 1..=2 {
            let out = MPOIdx::SiteP { n, dim: 2 };
            let inp = MPOIdx::Site { n, dim: 2 };
            let row = MPOIdx::Link(links[n - 1].clone());
            let col = MPOIdx::Link(links[n].clone());
            let mut W
                = Tensor::new_zeros(vec![out.clone(), inp.clone(), row.clone(), col.clone()])
                .unwrap();
            W.add_term(&z, &out, &inp, &[(&row, 0), (&col, 0)], C64::one()).unwrap();
            mpo.set_local_tensor(n, W).unwrap();
        }
        mpo.set_left_edge(make_edge(&links[0], 0).unwrap()).unwrap();
        mpo.set_right_edge(make_edge(&links[2], 0).unwrap()).unwrap();
        mpo
    }

    #[test]
    fn incomplete_chain() {
        let mut factory = BondIndexFactory::new();
        let links = factory.make_links("b", 2, 3);
        let mpo = MPO::new(links.clone());
        assert_eq!(mpo.len(), 2);
        assert!(!mpo.is_complete());
        assert!(matches!(mpo.to_dense(), Err(MissingEdge("left"))));
        let mut mpo = mpo;
        assert!(matches!(
            mpo.set_left_edge(make_edge(&links[1], 0).unwrap()),
            Err(EdgeShape(0))
        ));
        let W = Tensor::new_zeros(vec![MPOIdx::Link(links[0].clone())]).unwrap();
        assert!(matches!(mpo.set_local_tensor(1, W.clone()), Err(MissingIndex { .. })));
        assert!(matches!(mpo.set_local_tensor(3, W), Err(SiteOutOfRange { .. })));
    }

    #[test]
    fn dense_and_elements_agree() {
        let mpo = zz_chain();
        assert!(mpo.is_complete());
        assert_eq!(mpo.bond_dims(), vec![1, 1, 1]);
        let H = mpo.to_dense().unwrap();
        let diag = [1.0, -1.0, -1.0, 1.0];
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { diag[i] } else { 0.0 };
                assert_abs_diff_eq!(H[[i, j]].re, expected);
                let (out, inp) = ([i / 2, i % 2], [j / 2, j % 2]);
                let x = mpo.matrix_element(&out, &inp).unwrap();
                assert_abs_diff_eq!(x.re, expected);
            }
        }
        assert!(matches!(
            mpo.matrix_element(&[0], &[0, 0]),
            Err(BasisLength { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn dense_guard() {
        assert_eq!(dense_dim([2, 3, 4]).unwrap(), 24);
        assert!(matches!(dense_dim([2; 11]), Err(TooLarge(2048))));
        // 2^64 wraps to zero without a checked product
        assert!(matches!(dense_dim([2; 64]), Err(TooLarge(usize::MAX))));
        assert!(matches!(dense_dim([usize::MAX, 2]), Err(TooLarge(usize::MAX))));
        assert_eq!(dense_dim(std::iter::empty()).unwrap(), 1);
    }

    #[test]
    fn blocks() {
        let mpo = zz_chain();
        let b = mpo.block(2, 0, 0).unwrap();
        assert_abs_diff_eq!(b[[1, 1]].re, -1.0);
        assert!(mpo.block(3, 0, 0).is_err());
        assert!(matches!(mpo.block(1, 1, 0), Err(TensorAt { site: 1, .. })));
    }
}

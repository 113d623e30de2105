//! Catalogs of local operators acting on the physical space of each site in a
//! chain.

use std::sync::Arc;
use indexmap::IndexMap;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::spin::{ Spin, SpinTotal };

/// The three non-trivial local operator types entering a Heisenberg
/// interaction, in their fixed channel order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    /// *S*<sub>*z*</sub>
    Sz = 0,
    /// *S*<sub>+</sub>
    Plus = 1,
    /// *S*<sub>-</sub>
    Minus = 2,
}

impl OpKind {
    /// Number of operator types, and hence the width of one leg's channel
    /// block.
    pub const COUNT: usize = 3;

    /// All operator types in channel order.
    pub const ALL: [Self; 3] = [Self::Sz, Self::Plus, Self::Minus];

    /// Return the offset of `self` within a leg's channel block.
    pub fn offset(self) -> usize { self as usize }

    /// Return the operator that closes a two-site term opened by `self`.
    ///
    /// *S*<sub>*z*</sub> pairs with itself, while the raising and lowering
    /// operators pair with each other so that the exchange term comes out as
    /// *S*<sub>+</sub>*S*<sub>-</sub> + *S*<sub>-</sub>*S*<sub>+</sub>.
    pub fn partner(self) -> Self {
        match self {
            Self::Sz => Self::Sz,
            Self::Plus => Self::Minus,
            Self::Minus => Self::Plus,
        }
    }

    /// Return the weight attached to `self` when a two-site term with coupling
    /// `j` is opened.
    pub fn launch_weight(self, j: f64) -> f64 {
        match self {
            Self::Sz => j,
            Self::Plus | Self::Minus => j / 2.0,
        }
    }

    /// Short name used in log messages and error reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sz => "Sz",
            Self::Plus => "S+",
            Self::Minus => "S-",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Provider of local operators for every site of a chain.
///
/// Sites are numbered `1..=nsites()`. Each operator is a square matrix over the
/// site's physical space with elements indexed as `[[out, in]]`. Returned
/// references must be stable: repeated calls for the same site yield the same
/// matrix.
pub trait SiteOps {
    /// Number of sites in the chain.
    fn nsites(&self) -> usize;

    /// Declared physical dimension of site `n`.
    fn site_dim(&self, n: usize) -> usize;

    /// Identity on site `n`.
    fn identity(&self, n: usize) -> &nd::Array2<C64>;

    /// *S*<sub>*z*</sub> on site `n`.
    fn sz(&self, n: usize) -> &nd::Array2<C64>;

    /// *S*<sub>+</sub> on site `n`.
    fn splus(&self, n: usize) -> &nd::Array2<C64>;

    /// *S*<sub>-</sub> on site `n`.
    fn sminus(&self, n: usize) -> &nd::Array2<C64>;

    /// Dispatch on [`OpKind`].
    fn op(&self, kind: OpKind, n: usize) -> &nd::Array2<C64> {
        match kind {
            OpKind::Sz => self.sz(n),
            OpKind::Plus => self.splus(n),
            OpKind::Minus => self.sminus(n),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct LocalOps {
    id: nd::Array2<C64>,
    sz: nd::Array2<C64>,
    sp: nd::Array2<C64>,
    sm: nd::Array2<C64>,
}

impl LocalOps {
    fn new(j: SpinTotal) -> Self {
        let basis: Vec<Spin> = j.iter_rev().collect();
        let d = basis.len();
        let id: nd::Array2<C64> = nd::Array2::eye(d);
        let sz: nd::Array2<C64>
            = nd::Array2::from_diag(
                &basis.iter()
                    .map(|s| C64::from(s.proj().f()))
                    .collect::<nd::Array1<C64>>()
            );
        let mut sp: nd::Array2<C64> = nd::Array2::zeros((d, d));
        let mut sm: nd::Array2<C64> = nd::Array2::zeros((d, d));
        for (i, s) in basis.iter().enumerate() {
            // basis runs by descending projection, so raising moves one slot
            // toward the front
            if i > 0 { sp[[i - 1, i]] = C64::from(s.raising_coeff()); }
            if i + 1 < d { sm[[i + 1, i]] = C64::from(s.lowering_coeff()); }
        }
        Self { id, sz, sp, sm }
    }
}

/// A chain of spins, each with a fixed total spin.
///
/// Local basis states are ordered by descending projection, so that for
/// spin-1/2 the first state is ∣↑⟩.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinSites {
    spins: Vec<SpinTotal>,
    // sites with equal spin point to the same matrices
    ops: Vec<Arc<LocalOps>>,
}

impl SpinSites {
    /// Create a chain of `ns` identical spins.
    pub fn new(ns: usize, j: SpinTotal) -> Self {
        Self::from_spins(std::iter::repeat(j).take(ns))
    }

    /// Create a chain of `ns` spin-1/2 sites.
    pub fn spin_half(ns: usize) -> Self { Self::new(ns, SpinTotal::HALF) }

    /// Create a chain with an arbitrary total spin on each site.
    pub fn from_spins<I>(spins: I) -> Self
    where I: IntoIterator<Item = SpinTotal>
    {
        let spins: Vec<SpinTotal> = spins.into_iter().collect();
        let mut catalog: IndexMap<SpinTotal, Arc<LocalOps>> = IndexMap::new();
        let ops: Vec<Arc<LocalOps>>
            = spins.iter()
            .map(|j| {
                catalog.entry(*j)
                    .or_insert_with(|| Arc::new(LocalOps::new(*j)))
                    .clone()
            })
            .collect();
        Self { spins, ops }
    }

    /// Return the total spin of site `n`, if it exists.
    pub fn spin(&self, n: usize) -> Option<SpinTotal> {
        n.checked_sub(1).and_then(|k| self.spins.get(k)).copied()
    }

    fn local(&self, n: usize) -> &LocalOps {
        assert!(
            (1..=self.ops.len()).contains(&n),
            "SpinSites: site {} outside of 1..={}", n, self.ops.len(),
        );
        &self.ops[n - 1]
    }
}

impl SiteOps for SpinSites {
    fn nsites(&self) -> usize { self.spins.len() }

    fn site_dim(&self, n: usize) -> usize { self.local(n).id.nrows() }

    fn identity(&self, n: usize) -> &nd::Array2<C64> { &self.local(n).id }

    fn sz(&self, n: usize) -> &nd::Array2<C64> { &self.local(n).sz }

    fn splus(&self, n: usize) -> &nd::Array2<C64> { &self.local(n).sp }

    fn sminus(&self, n: usize) -> &nd::Array2<C64> { &self.local(n).sm }
}

/// Return `true` if every element of `a` is exactly zero.
pub(crate) fn is_null(a: &nd::Array2<C64>) -> bool {
    a.iter().all(|x| x.is_zero())
}

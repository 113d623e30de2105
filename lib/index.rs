//! Tensor indices: physical site indices and auxiliary bond (link) indices.
//!
//! Bond indices carry a random 64-bit identity so that two links of equal
//! dimension created by different builds can never be confused with each
//! other during contraction.

use std::{ fmt, hash::{ Hash, Hasher }, sync::Arc };
use rand::Rng;
use rustc_hash::FxHashSet as HashSet;

/// Maximum number of characters retained in an index [`Label`].
pub const MAX_LABEL_LEN: usize = 16;

/// Truncate `s` to at most `max` characters, respecting `char` boundaries.
///
/// This is the single truncation policy for index labels: excess characters
/// are dropped from the end and no marker is appended.
pub fn truncate_label(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// A short, cheaply clonable label, bounded by [`MAX_LABEL_LEN`] characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(Arc<str>);

impl Label {
    /// Create a new label, truncating with [`truncate_label`] if necessary.
    pub fn new(s: &str) -> Self { Self(truncate_label(s, MAX_LABEL_LEN).into()) }

    /// Return the label as a string slice.
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self { Self::new(s) }
}

/// Describes a tensor index.
pub trait Idx: Clone + PartialEq + fmt::Debug {
    /// Return the number of values the index can take.
    ///
    /// This value must never be zero.
    fn dim(&self) -> usize;

    /// Return an identifying label for the index, used only for printing.
    ///
    /// The default implementation renders `self` using `Debug`.
    fn label(&self) -> String { format!("{self:?}") }
}

/// An auxiliary index connecting neighboring tensors in a chain.
///
/// Equality is determined by identity and dimension only; the label is
/// informational.
#[derive(Clone, Debug)]
pub struct BondIdx {
    id: u64,
    dim: usize,
    label: Label,
}

impl BondIdx {
    /// Return the identity of the index.
    pub fn id(&self) -> u64 { self.id }

    /// Return the label of the index.
    pub fn name(&self) -> &Label { &self.label }

    /// Rebuild an index from stored parts, e.g. when reading from disk.
    pub(crate) fn from_parts(id: u64, dim: usize, label: Label) -> Self {
        Self { id, dim, label }
    }
}

impl PartialEq for BondIdx {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.dim == other.dim
    }
}

impl Eq for BondIdx { }

impl Hash for BondIdx {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.dim.hash(state);
    }
}

impl Idx for BondIdx {
    fn dim(&self) -> usize { self.dim }

    fn label(&self) -> String { self.label.to_string() }
}

/// Allocator for fresh [`BondIdx`]s.
///
/// Every index issued by a factory has an identity distinct from all others
/// it has issued.
#[derive(Clone, Debug, Default)]
pub struct BondIndexFactory {
    issued: HashSet<u64>,
}

impl BondIndexFactory {
    /// Create a new factory.
    pub fn new() -> Self { Self::default() }

    /// Create a fresh index with the given name and dimension.
    pub fn make_index(&mut self, name: &str, dim: usize) -> BondIdx {
        let mut rng = rand::thread_rng();
        let mut id: u64 = rng.gen();
        while !self.issued.insert(id) {
            id = rng.gen();
        }
        BondIdx { id, dim, label: Label::new(name) }
    }

    /// Create `count` fresh indices of equal dimension, named `prefix0`,
    /// `prefix1`, ....
    pub fn make_links(&mut self, prefix: &str, dim: usize, count: usize)
        -> Vec<BondIdx>
    {
        (0..count)
            .map(|l| self.make_index(&format!("{prefix}{l}"), dim))
            .collect()
    }

    /// Return the number of indices issued so far.
    pub fn issued(&self) -> usize { self.issued.len() }
}

/// Indices appearing in the local tensors of a matrix product operator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MPOIdx {
    /// Physical input (ket) index of site `n`.
    Site { n: usize, dim: usize },
    /// Physical output (bra) index of site `n`.
    SiteP { n: usize, dim: usize },
    /// Auxiliary bond index.
    Link(BondIdx),
}

impl Idx for MPOIdx {
    fn dim(&self) -> usize {
        match self {
            Self::Site { dim, .. } | Self::SiteP { dim, .. } => *dim,
            Self::Link(b) => b.dim(),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Site { n, .. } => format!("s{n}"),
            Self::SiteP { n, .. } => format!("s{n}'"),
            Self::Link(b) => b.label(),
        }
    }
}

impl From<BondIdx> for MPOIdx {
    fn from(b: BondIdx) -> Self { Self::Link(b) }
}

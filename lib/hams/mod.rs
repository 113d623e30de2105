//! MPO compilers for lattice Hamiltonians.

use crate::{
    mpo::{ MPO, MPOResult },
    sites::SiteOps,
};

pub mod heisenberg;
pub use heisenberg::{ Heisenberg, HeisenbergParams };

/// Basic requirements for any MPO compiler.
///
/// A compiler borrows its site operators for its entire lifetime and owns the
/// chain it produces.
pub trait MPOBuild<'a, P>
where P: SiteOps + 'a
{
    /// Model parameters.
    type Params;

    /// Initialize `self`, checking that `params` are compatible with `sites`.
    fn new_builder(sites: &'a P, params: Self::Params) -> MPOResult<Self>
    where Self: Sized;

    /// Return the current model parameters.
    fn params(&self) -> Self::Params;

    /// Return the site operators `self` was created with.
    fn sites(&self) -> &'a P;

    /// Return the compiled chain, compiling it first if necessary.
    fn build(&self) -> MPOResult<&MPO>;

    /// Compile and return an owned copy of the chain.
    fn build_owned(&self) -> MPOResult<MPO> { self.build().cloned() }
}

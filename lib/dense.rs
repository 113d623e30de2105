//! Dense reference Hamiltonians built from Kronecker products.
//!
//! These grow exponentially with the number of sites and are meant only for
//! checking compiled MPOs on small chains.

use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use crate::{
    hams::HeisenbergParams,
    lattice::Ladder,
    mpo::{ dense_dim, MPOResult },
    sites::{ OpKind, SiteOps },
};

/// Embed the single-site operators `ops` into the full chain as a product,
/// placing identities on every other site. Site 1 is the most significant
/// factor.
pub fn embed<'a, P, I>(sites: &'a P, ops: I) -> nd::Array2<C64>
where
    P: SiteOps,
    I: IntoIterator<Item = (usize, &'a nd::Array2<C64>)>,
{
    let mut factors: Vec<nd::ArrayView2<C64>>
        = (1..=sites.nsites())
        .map(|n| sites.identity(n).view())
        .collect();
    for (n, op) in ops.into_iter() {
        factors[n - 1] = op.view();
    }
    factors.into_iter()
        .fold(nd::Array2::eye(1), |acc, f| kron(&acc, &f))
}

/// Return the total physical dimension of `sites`, or `None` if it overflows
/// `usize`.
pub fn total_dim<P>(sites: &P) -> Option<usize>
where P: SiteOps
{
    (1..=sites.nsites())
        .try_fold(1_usize, |acc, n| acc.checked_mul(sites.site_dim(n)))
}

/// Build the Heisenberg Hamiltonian of `params` on `sites` as a dense matrix
/// indexed `[[out, in]]`.
///
/// Bonds and their multiplicities are taken from [`Ladder::bonds`], and the
/// boundary field from [`HeisenbergParams::boundary_field`].
pub fn heisenberg_dense<P>(sites: &P, params: &HeisenbergParams)
    -> MPOResult<nd::Array2<C64>>
where P: SiteOps
{
    let ladder = Ladder::new(sites.nsites(), params.ny)?;
    let D = dense_dim((1..=sites.nsites()).map(|n| sites.site_dim(n)))?;
    let mut H: nd::Array2<C64> = nd::Array2::zeros((D, D));
    for (bond, mult) in ladder.bonds().into_iter() {
        let (a, b) = bond.sites();
        let J = C64::from(params.j * mult as f64);
        for op in OpKind::ALL.into_iter() {
            let coef = J * op.launch_weight(1.0);
            let term
                = embed(sites, [(a, sites.op(op, a)), (b, sites.op(op.partner(), b))]);
            H.scaled_add(coef, &term);
        }
    }
    for n in 1..=ladder.ns() {
        if let Some(h) = params.boundary_field(&ladder, n) {
            H.scaled_add(C64::from(h), &embed(sites, [(n, sites.sz(n))]));
        }
    }
    Ok(H)
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use crate::{ mpo::MPOError, sites::SpinSites };
    use super::*;

    #[test]
    fn embedding_order() {
        let sites = SpinSites::spin_half(2);
        let sz1 = embed(&sites, [(1, sites.sz(1))]);
        // site 1 is the most significant digit: states ↑↑, ↑↓, ↓↑, ↓↓
        let diag: Vec<f64> = sz1.diag().iter().map(|x| x.re).collect();
        assert_eq!(diag, vec![0.5, 0.5, -0.5, -0.5]);
        assert_eq!(embed(&sites, std::iter::empty()), nd::Array2::<C64>::eye(4));
    }

    #[test]
    fn two_site_singlet_triplet() {
        // J S1·S2 has eigenvalues J/4 (triplet) and -3J/4 (singlet)
        let sites = SpinSites::spin_half(2);
        let H = heisenberg_dense(&sites, &HeisenbergParams::default()).unwrap();
        assert_abs_diff_eq!(H[[0, 0]].re, 0.25);
        assert_abs_diff_eq!(H[[3, 3]].re, 0.25);
        assert_abs_diff_eq!(H[[1, 1]].re, -0.25);
        assert_abs_diff_eq!(H[[1, 2]].re, 0.5);
        assert_abs_diff_eq!(H[[2, 1]].re, 0.5);
        // singlet (∣↑↓⟩ - ∣↓↑⟩) / √2
        let s = nd::array![0.0, 1.0, -1.0, 0.0].mapv(|x| C64::from(x / 2.0_f64.sqrt()));
        let e = s.dot(&H.dot(&s));
        assert_abs_diff_eq!(e.re, -0.75, epsilon = 1e-14);
    }

    #[test]
    fn hermitian_with_field() {
        let sites = SpinSites::spin_half(6);
        let params = HeisenbergParams { j: 0.7, ny: 3, boundary_h: 0.2 };
        let H = heisenberg_dense(&sites, &params).unwrap();
        for ((i, j), x) in H.indexed_iter() {
            assert_abs_diff_eq!(x.re, H[[j, i]].re);
            assert_abs_diff_eq!(x.im, -H[[j, i]].im);
        }
        // every term is traceless
        let tr: f64 = H.diag().iter().map(|x| x.re).sum();
        assert_abs_diff_eq!(tr, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn too_large() {
        let sites = SpinSites::spin_half(11);
        assert!(matches!(
            heisenberg_dense(&sites, &HeisenbergParams::default()),
            Err(MPOError::TooLarge(2048))
        ));
        let long = SpinSites::spin_half(64);
        assert_eq!(total_dim(&long), None);
        assert!(matches!(
            heisenberg_dense(&long, &HeisenbergParams::default()),
            Err(MPOError::TooLarge(usize::MAX))
        ));
        assert_eq!(total_dim(&SpinSites::spin_half(10)), Some(1024));
    }
}

//! Heisenberg model on a chain or a wrapped `ny`-leg ladder.
//!
//! The compiled operator is
//! ```math
//! H = J \sum_{\langle a, b \rangle} \left(
//!         S^z_a S^z_b + \frac{1}{2} (S^+_a S^-_b + S^-_a S^+_b)
//!     \right)
//!     + \sum_{n \in \partial} h_n S^z_n
//! ```
//! where the first sum runs over the bonds enumerated by [`Ladder::bonds`] and
//! the second over sites on the first and last rungs. For `J > 0` the boundary
//! field is staggered, `h_n = h \cdot` [`Ladder::stagger`]`(n)`; otherwise it is
//! uniform.
//!
//! Every site tensor is a transition matrix between the channels described in
//! [`lattice`][crate::lattice]: terms are launched from `Finish`, carried down
//! one leg block per site, and closed into `Start`. The left edge selects
//! `Finish` and the right edge selects `Start`, so only completed terms survive
//! the contraction.

use log::{ debug, info, trace };
use ndarray as nd;
use num_complex::Complex64 as C64;
use once_cell::sync::OnceCell;
use toml::Table;
use crate::{
    config::{ self, ConfigError, ConfigResult, Context },
    hams::MPOBuild,
    index::{ BondIdx, BondIndexFactory, MPOIdx },
    lattice::{ Channel, ChannelLayout, Ladder },
    mpo::{ make_edge, MPOError, MPOResult, MPO },
    sites::{ is_null, OpKind, SiteOps },
    tensor::Tensor,
};

/// Name prefix for the bond indices of a compiled chain.
pub const LINK_PREFIX: &str = "hl";

/// Parameters of the Heisenberg model.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeisenbergParams {
    /// Exchange coupling.
    pub j: f64,
    /// Number of ladder legs.
    pub ny: usize,
    /// Boundary field magnitude.
    pub boundary_h: f64,
}

impl Default for HeisenbergParams {
    fn default() -> Self { Self { j: 1.0, ny: 1, boundary_h: 0.0 } }
}

impl HeisenbergParams {
    /// Read parameters from the top level of a configuration table, using keys
    /// `J`, `ny`, and `boundary_h`.
    pub fn from_table(table: &Table) -> ConfigResult<Self> {
        let def = Self::default();
        let j = config::get_f64(table, "J")?.unwrap_or(def.j);
        let ny = config::get_usize(table, "ny")?.unwrap_or(def.ny);
        if ny == 0 {
            return Err(ConfigError::OutOfRange {
                key: "ny".into(),
                reason: "must be positive",
            });
        }
        let boundary_h
            = config::get_f64(table, "boundary_h")?.unwrap_or(def.boundary_h);
        Ok(Self { j, ny, boundary_h })
    }

    /// Effective boundary field on site `n` of `ladder`, or `None` if `n` lies
    /// off the boundary rungs (or outside the ladder) or the field is switched
    /// off.
    pub fn boundary_field(&self, ladder: &Ladder, n: usize) -> Option<f64> {
        if !(1..=ladder.ns()).contains(&n) { return None; }
        let (x, _) = ladder.coords(n);
        if self.boundary_h == 0.0 || !ladder.is_boundary_rung(x) { return None; }
        if self.j > 0.0 {
            Some(self.boundary_h * ladder.stagger(n))
        } else {
            Some(self.boundary_h)
        }
    }
}

/// Lazy, memoized compiler of the Heisenberg MPO over a borrowed set of site
/// operators.
///
/// The chain is compiled on the first call to [`build`][Self::build] and kept
/// until a parameter is changed.
#[derive(Debug)]
pub struct Heisenberg<'a, P>
where P: SiteOps
{
    sites: &'a P,
    params: HeisenbergParams,
    ctx: Context,
    mpo: OnceCell<MPO>,
}

impl<'a, P> Heisenberg<'a, P>
where P: SiteOps
{
    /// Create a new compiler with default parameters.
    pub fn new(sites: &'a P) -> MPOResult<Self> {
        Self::with_params(sites, HeisenbergParams::default())
    }

    /// Create a new compiler.
    pub fn with_params(sites: &'a P, params: HeisenbergParams) -> MPOResult<Self> {
        Ladder::new(sites.nsites(), params.ny)?;
        Ok(Self { sites, params, ctx: Context::default(), mpo: OnceCell::new() })
    }

    /// Create a new compiler for an `ny`-leg ladder with coupling `j`.
    pub fn with_legs(sites: &'a P, j: f64, ny: usize) -> MPOResult<Self> {
        Self::with_params(sites, HeisenbergParams { j, ny, boundary_h: 0.0 })
    }

    /// Create a new compiler with coupling `j`, `ny` legs, and a boundary field
    /// of magnitude `boundary_h`.
    pub fn with_boundary_field(sites: &'a P, j: f64, ny: usize, boundary_h: f64)
        -> MPOResult<Self>
    {
        Self::with_params(sites, HeisenbergParams { j, ny, boundary_h })
    }

    /// Set the output and diagnostics context.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    /// Return the current model parameters.
    pub fn params(&self) -> HeisenbergParams { self.params }

    /// Return the exchange coupling.
    pub fn j(&self) -> f64 { self.params.j }

    /// Return the number of ladder legs.
    pub fn ny(&self) -> usize { self.params.ny }

    /// Return the boundary field magnitude.
    pub fn boundary_h(&self) -> f64 { self.params.boundary_h }

    /// Return the output and diagnostics context.
    pub fn context(&self) -> &Context { &self.ctx }

    /// Return the ladder geometry.
    pub fn ladder(&self) -> MPOResult<Ladder> {
        Ok(Ladder::new(self.sites.nsites(), self.params.ny)?)
    }

    /// Return `true` if a compiled chain is currently cached.
    pub fn is_built(&self) -> bool { self.mpo.get().is_some() }

    fn invalidate(&mut self) {
        if self.mpo.take().is_some() {
            debug!("heisenberg: parameters changed; discarding cached MPO");
        }
    }

    /// Set the exchange coupling.
    pub fn set_j(&mut self, j: f64) {
        self.params.j = j;
        self.invalidate();
    }

    /// Set the number of legs.
    ///
    /// Nothing is changed if `ny` doesn't evenly divide the number of sites.
    pub fn set_ny(&mut self, ny: usize) -> MPOResult<()> {
        Ladder::new(self.sites.nsites(), ny)?;
        self.params.ny = ny;
        self.invalidate();
        Ok(())
    }

    /// Set the boundary field magnitude.
    pub fn set_boundary_h(&mut self, boundary_h: f64) {
        self.params.boundary_h = boundary_h;
        self.invalidate();
    }

    /// Replace all parameters at once.
    ///
    /// Nothing is changed if the new geometry is invalid.
    pub fn set_params(&mut self, params: HeisenbergParams) -> MPOResult<()> {
        Ladder::new(self.sites.nsites(), params.ny)?;
        self.params = params;
        self.invalidate();
        Ok(())
    }

    /// Return the compiled chain, compiling it first if necessary.
    pub fn build(&self) -> MPOResult<&MPO> {
        if let Some(mpo) = self.mpo.get() {
            trace!("heisenberg: using cached MPO");
            return Ok(mpo);
        }
        self.mpo.get_or_try_init(|| compile(self.sites, &self.params, &self.ctx))
    }

    /// Consume `self`, returning the compiled chain.
    pub fn into_mpo(self) -> MPOResult<MPO> {
        let Self { sites, params, ctx, mpo } = self;
        match mpo.into_inner() {
            Some(mpo) => Ok(mpo),
            None => compile(sites, &params, &ctx),
        }
    }
}

impl<'a, P> MPOBuild<'a, P> for Heisenberg<'a, P>
where P: SiteOps + 'a
{
    type Params = HeisenbergParams;

    fn new_builder(sites: &'a P, params: Self::Params) -> MPOResult<Self> {
        Self::with_params(sites, params)
    }

    fn params(&self) -> Self::Params { self.params }

    fn sites(&self) -> &'a P { self.sites }

    fn build(&self) -> MPOResult<&MPO> { Heisenberg::build(self) }
}

fn check_operators<P>(sites: &P, ns: usize) -> MPOResult<()>
where P: SiteOps
{
    for n in 1..=ns {
        let d = sites.site_dim(n);
        let ops = [
            ("Id", sites.identity(n)),
            (OpKind::Sz.name(), sites.sz(n)),
            (OpKind::Plus.name(), sites.splus(n)),
            (OpKind::Minus.name(), sites.sminus(n)),
        ];
        for (name, op) in ops.into_iter() {
            if op.shape() != [d, d] {
                return Err(MPOError::OperatorShape {
                    site: n,
                    op: name,
                    expected: d,
                    found: op.shape().to_vec(),
                });
            }
        }
    }
    Ok(())
}

// accumulates weighted operator placements into a single site tensor
struct SiteTensor<'c> {
    n: usize,
    out: MPOIdx,
    inp: MPOIdx,
    row: MPOIdx,
    col: MPOIdx,
    layout: ChannelLayout,
    ctx: &'c Context,
    tensor: Tensor<MPOIdx>,
}

impl<'c> SiteTensor<'c> {
    fn new(
        n: usize,
        dim: usize,
        row: &BondIdx,
        col: &BondIdx,
        layout: ChannelLayout,
        ctx: &'c Context,
    ) -> MPOResult<Self>
    {
        let out = MPOIdx::SiteP { n, dim };
        let inp = MPOIdx::Site { n, dim };
        let row = MPOIdx::Link(row.clone());
        let col = MPOIdx::Link(col.clone());
        let tensor
            = Tensor::new_zeros(
                vec![out.clone(), inp.clone(), row.clone(), col.clone()])
            .map_err(|source| MPOError::TensorAt { site: n, source })?;
        Ok(Self { n, out, inp, row, col, layout, ctx, tensor })
    }

    fn put(&mut self, op: &nd::Array2<C64>, from: Channel, to: Channel, coef: f64)
        -> MPOResult<()>
    {
        let r = self.layout.value(from);
        let c = self.layout.value(to);
        if coef == 0.0 || is_null(op) { return Ok(()); }
        if self.ctx.debug {
            trace!("heisenberg: W[{}] ({}, {}) += {:+.6} × op", self.n, r, c, coef);
        }
        self.tensor.add_term(
            op,
            &self.out,
            &self.inp,
            &[(&self.row, r), (&self.col, c)],
            C64::from(coef),
        )
        .map_err(|source| MPOError::TensorAt { site: self.n, source })
    }
}

fn site_tensor<P>(
    sites: &P,
    ladder: &Ladder,
    params: &HeisenbergParams,
    n: usize,
    row: &BondIdx,
    col: &BondIdx,
    ctx: &Context,
) -> MPOResult<Tensor<MPOIdx>>
where P: SiteOps
{
    let layout = ladder.layout();
    let (x, y) = ladder.coords(n);
    let ny = ladder.ny();
    let j = params.j;
    let id = sites.identity(n);
    let mut acc = SiteTensor::new(n, sites.site_dim(n), row, col, layout, ctx)?;

    acc.put(id, Channel::Start, Channel::Start, 1.0)?;
    acc.put(id, Channel::Finish, Channel::Finish, 1.0)?;
    for op in OpKind::ALL.into_iter() {
        // same leg, next rung
        acc.put(sites.op(op, n), Channel::Finish, layout.outgoing(op), op.launch_weight(j))?;
        acc.put(sites.op(op.partner(), n), layout.incoming(op), Channel::Start, 1.0)?;
    }

    if ny > 1 {
        for (from, to) in layout.shifts() {
            acc.put(id, from, to, 1.0)?;
        }
        for op in OpKind::ALL.into_iter() {
            let o = sites.op(op, n);
            let w = op.launch_weight(j);
            // last leg of the same rung
            if let Some(ch) = layout.wrap(op).filter(|_| y == 1) {
                acc.put(o, Channel::Finish, ch, w)?;
            }
            // next leg of the same rung
            if let Some(ch) = layout.rung(op).filter(|_| y != ny) {
                acc.put(o, Channel::Finish, ch, w)?;
            }
        }
    }

    if let Some(h) = params.boundary_field(ladder, n) {
        debug!("heisenberg: boundary field {:+.6} on site {} at ({}, {})", h, n, x, y);
        acc.put(sites.sz(n), Channel::Finish, Channel::Start, h)?;
    }
    Ok(acc.tensor)
}

/// Compile the Heisenberg MPO for `sites` with `params`.
///
/// All operators are checked before any tensor is created; the returned chain
/// is either complete or not produced at all.
pub fn compile<P>(sites: &P, params: &HeisenbergParams, ctx: &Context)
    -> MPOResult<MPO>
where P: SiteOps
{
    let ladder = Ladder::new(sites.nsites(), params.ny)?;
    let ns = ladder.ns();
    check_operators(sites, ns)?;
    let layout = ladder.layout();
    debug!(
        "heisenberg: compiling {} sites as {} x {} ladder, J = {}, h = {}, bond dim {}",
        ns, ladder.nx(), ladder.ny(), params.j, params.boundary_h, layout.dim(),
    );

    let mut factory = BondIndexFactory::new();
    let links = factory.make_links(LINK_PREFIX, layout.dim(), ns + 1);
    let mut mpo = MPO::new(links.clone());
    for n in 1..=ns {
        let W = site_tensor(sites, &ladder, params, n, &links[n - 1], &links[n], ctx)?;
        if ctx.print_data {
            debug!("heisenberg: W[{}] = {}", n, W.display_with(ctx));
        }
        mpo.set_local_tensor(n, W)?;
    }
    mpo.set_left_edge(make_edge(&links[0], layout.value(Channel::Finish))?)?;
    mpo.set_right_edge(make_edge(&links[ns], layout.value(Channel::Start))?)?;
    info!("heisenberg: compiled {}-site MPO with bond dimension {}", ns, layout.dim());
    Ok(mpo)
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use itertools::Itertools;
    use rand::Rng;
    use crate::{
        config::Config,
        dense,
        index::Idx,
        lattice::LatticeError,
        sites::SpinSites,
        spin::SpinTotal,
    };
    use super::*;

    fn assert_matrices_close(a: &nd::Array2<C64>, b: &nd::Array2<C64>) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
            assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
        }
    }

    fn check_against_dense<P>(sites: &P, params: HeisenbergParams)
    where P: SiteOps
    {
        let H = Heisenberg::with_params(sites, params).unwrap();
        let from_mpo = H.build().unwrap().to_dense().unwrap();
        let reference = dense::heisenberg_dense(sites, &params).unwrap();
        assert_matrices_close(&from_mpo, &reference);
    }

    #[test]
    fn bond_dim_is_length_independent() {
        for ny in 1..=3 {
            for nx in 1..=5 {
                let sites = SpinSites::spin_half(nx * ny);
                let H = Heisenberg::with_legs(&sites, 1.0, ny).unwrap();
                let mpo = H.build().unwrap();
                assert_eq!(mpo.len(), nx * ny);
                assert!(mpo.bond_dims().iter().all(|&k| k == 2 + 3 * ny));
            }
        }
    }

    #[test]
    fn contraction_matches_dense_chain() {
        for ns in 1..=6 {
            let sites = SpinSites::spin_half(ns);
            check_against_dense(&sites, HeisenbergParams::default());
            check_against_dense(
                &sites,
                HeisenbergParams { j: -0.7, ny: 1, boundary_h: 0.3 },
            );
        }
        let sites = SpinSites::spin_half(6);
        check_against_dense(&sites, HeisenbergParams { j: 1.3, ny: 1, boundary_h: 0.25 });
    }

    #[test]
    fn contraction_matches_dense_ladder() {
        let cases = [
            (4, 2, 1.0, 0.0),
            (4, 2, 1.0, 0.5),
            (6, 2, -0.8, 0.4),
            (6, 3, 1.1, 0.0),
            (6, 3, 0.9, -0.35),
            (3, 3, 1.0, 0.2),
            (4, 4, 1.0, 0.0),
            (6, 6, 0.5, 0.1),
        ];
        for (ns, ny, j, boundary_h) in cases.into_iter() {
            let sites = SpinSites::spin_half(ns);
            check_against_dense(&sites, HeisenbergParams { j, ny, boundary_h });
        }
    }

    #[test]
    fn contraction_matches_dense_higher_spin() {
        let sites = SpinSites::new(4, SpinTotal::ONE);
        check_against_dense(&sites, HeisenbergParams { j: 1.0, ny: 1, boundary_h: 0.5 });
        check_against_dense(&sites, HeisenbergParams { j: 1.0, ny: 2, boundary_h: 0.0 });
        let mixed
            = SpinSites::from_spins(
                [SpinTotal::HALF, SpinTotal::ONE, SpinTotal::HALF, SpinTotal::ONE]);
        check_against_dense(&mixed, HeisenbergParams { j: -1.0, ny: 2, boundary_h: 0.2 });
    }

    #[test]
    fn identity_passes_through() {
        let sites = SpinSites::new(6, SpinTotal::ONE);
        let H = Heisenberg::with_boundary_field(&sites, 1.0, 3, 0.5).unwrap();
        let mpo = H.build().unwrap();
        let layout = ChannelLayout::new(3);
        let start = layout.value(Channel::Start);
        let finish = layout.value(Channel::Finish);
        for n in 1..=6 {
            let id = sites.identity(n);
            assert_eq!(&mpo.block(n, start, start).unwrap(), id);
            assert_eq!(&mpo.block(n, finish, finish).unwrap(), id);
            // nothing ever leaves Start or enters Finish from elsewhere
            for v in 1..layout.dim() {
                assert!(is_null(&mpo.block(n, start, v).unwrap()));
            }
            for v in 0..finish {
                assert!(is_null(&mpo.block(n, v, finish).unwrap()));
            }
        }
    }

    #[test]
    fn boundary_field_staggering() {
        let sites = SpinSites::spin_half(6);
        let h = 0.5;
        let layout = ChannelLayout::new(2);
        let start = layout.value(Channel::Start);
        let finish = layout.value(Channel::Finish);
        let field_at = |mpo: &MPO, n: usize| -> f64 {
            mpo.block(n, finish, start).unwrap()[[0, 0]].re / 0.5
        };

        // (x, y) = (1, 1), (1, 2), (2, 1), (2, 2), (3, 1), (3, 2)
        let H = Heisenberg::with_boundary_field(&sites, 1.0, 2, h).unwrap();
        let mpo = H.build().unwrap();
        let fields: Vec<f64> = (1..=6).map(|n| field_at(mpo, n)).collect();
        let expected = [h, -h, 0.0, 0.0, h, -h];
        for (f, e) in fields.iter().zip(expected) {
            assert_abs_diff_eq!(*f, e, epsilon = 1e-14);
        }

        let H = Heisenberg::with_boundary_field(&sites, -1.0, 2, h).unwrap();
        let mpo = H.build().unwrap();
        let fields: Vec<f64> = (1..=6).map(|n| field_at(mpo, n)).collect();
        let expected = [h, h, 0.0, 0.0, h, h];
        for (f, e) in fields.iter().zip(expected) {
            assert_abs_diff_eq!(*f, e, epsilon = 1e-14);
        }

        // J = 0 is not antiferromagnetic, so the field stays uniform
        let H = Heisenberg::with_boundary_field(&sites, 0.0, 2, h).unwrap();
        let mpo = H.build().unwrap();
        let fields: Vec<f64> = (1..=6).map(|n| field_at(mpo, n)).collect();
        let expected = [h, h, 0.0, 0.0, h, h];
        for (f, e) in fields.iter().zip(expected) {
            assert_abs_diff_eq!(*f, e, epsilon = 1e-14);
        }
        let ladder = Ladder::new(6, 2).unwrap();
        let params = HeisenbergParams { j: 0.0, ny: 2, boundary_h: h };
        assert_eq!(params.boundary_field(&ladder, 2), Some(h));
        assert_eq!(params.boundary_field(&ladder, 3), None);
        assert_eq!(params.boundary_field(&ladder, 0), None);
        assert_eq!(params.boundary_field(&ladder, 7), None);

        let H = Heisenberg::with_legs(&sites, 1.0, 2).unwrap();
        let mpo = H.build().unwrap();
        assert!((1..=6).all(|n| is_null(&mpo.block(n, finish, start).unwrap())));
    }

    #[test]
    fn build_is_cached_until_mutation() {
        let sites = SpinSites::spin_half(4);
        let mut H = Heisenberg::new(&sites).unwrap();
        assert!(!H.is_built());
        let first: *const MPO = H.build().unwrap();
        assert!(H.is_built());
        let second: *const MPO = H.build().unwrap();
        assert!(std::ptr::eq(first, second));
        let dense_j1 = H.build().unwrap().to_dense().unwrap();

        H.set_j(2.0);
        assert!(!H.is_built());
        let dense_j2 = H.build().unwrap().to_dense().unwrap();
        assert_matrices_close(&dense_j2, &(&dense_j1 * C64::from(2.0)));

        H.set_j(1.0);
        assert_eq!(H.build().unwrap().to_dense().unwrap(), dense_j1);

        H.set_boundary_h(0.0);
        assert!(!H.is_built());
        H.build().unwrap();
        H.set_ny(2).unwrap();
        assert_eq!(H.ny(), 2);
        assert!(!H.is_built());
        assert_eq!(H.build().unwrap().bond_dims()[0], 8);
    }

    #[test]
    fn concurrent_builds_share_one_chain() {
        fn assert_sync<T: Sync>(_: &T) { }

        let sites = SpinSites::spin_half(8);
        let H = Heisenberg::with_boundary_field(&sites, 1.0, 2, 0.3).unwrap();
        assert_sync(&H);
        // raw pointers aren't Send, so compare addresses
        let addrs: Vec<usize>
            = std::thread::scope(|scope| {
                let handles: Vec<_>
                    = (0..8)
                    .map(|_| {
                        scope.spawn(|| H.build().unwrap() as *const MPO as usize)
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
        assert!(addrs.iter().all(|&a| a == addrs[0]));
        assert_eq!(H.build().unwrap() as *const MPO as usize, addrs[0]);
    }

    #[test]
    fn dense_contraction_guarded() {
        let sites = SpinSites::spin_half(64);
        let H = Heisenberg::new(&sites).unwrap();
        let mpo = H.build().unwrap();
        assert!(matches!(mpo.to_dense(), Err(MPOError::TooLarge(usize::MAX))));
        assert!(mpo.matrix_element(&[0; 64], &[0; 64]).is_ok());

        // 2^10 states are allowed, but not with 32 channels on every bond
        let sites = SpinSites::spin_half(10);
        let H = Heisenberg::with_legs(&sites, 1.0, 10).unwrap();
        assert!(matches!(H.build().unwrap().to_dense(), Err(MPOError::TooLarge(1024))));
    }

    #[test]
    fn indivisible_geometry_rejected() {
        let sites = SpinSites::spin_half(5);
        let res = Heisenberg::with_legs(&sites, 1.0, 2);
        assert!(matches!(
            res,
            Err(MPOError::Lattice(LatticeError::NotDivisible { ns: 5, ny: 2 }))
        ));

        let mut H = Heisenberg::new(&sites).unwrap();
        H.build().unwrap();
        assert!(H.set_ny(2).is_err());
        assert!(H.set_ny(0).is_err());
        assert_eq!(H.ny(), 1);
        assert!(H.is_built());

        let params = HeisenbergParams { j: 1.0, ny: 5, boundary_h: 0.0 };
        H.set_params(params).unwrap();
        assert_eq!(H.params(), params);
        assert!(!H.is_built());

        let empty = SpinSites::spin_half(0);
        assert!(matches!(
            Heisenberg::new(&empty),
            Err(MPOError::Lattice(LatticeError::EmptyChain))
        ));
    }

    #[test]
    fn ladder_couplings() {
        // spin-1/2 basis: 0 = up, 1 = down
        let sites = SpinSites::spin_half(6);
        let H = Heisenberg::with_legs(&sites, 1.0, 2).unwrap();
        let mpo = H.build().unwrap();
        let flip = |a: usize, b: usize| -> C64 {
            let mut inp = [0; 6];
            inp[b - 1] = 1;
            let mut out = [0; 6];
            out[a - 1] = 1;
            mpo.matrix_element(&out, &inp).unwrap()
        };
        // rung 1-2 is counted twice when ny = 2
        assert_abs_diff_eq!(flip(1, 2).re, 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(flip(1, 3).re, 0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(flip(2, 4).re, 0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(flip(1, 4).norm(), 0.0);
        assert_abs_diff_eq!(flip(2, 3).norm(), 0.0);
        assert_abs_diff_eq!(flip(1, 5).norm(), 0.0);
    }

    #[test]
    fn matrix_elements_match_dense() {
        let sites = SpinSites::from_spins(
            [SpinTotal::HALF, SpinTotal::ONE, SpinTotal::HALF,
             SpinTotal::HALF, SpinTotal::ONE, SpinTotal::HALF]);
        let params = HeisenbergParams { j: 0.8, ny: 3, boundary_h: 0.3 };
        let H = Heisenberg::with_params(&sites, params).unwrap();
        let mpo = H.build().unwrap();
        let reference = dense::heisenberg_dense(&sites, &params).unwrap();
        let dims: Vec<usize> = (1..=6).map(|n| sites.site_dim(n)).collect();
        let flat = |state: &[usize]| -> usize {
            state.iter().zip(&dims).fold(0, |acc, (s, d)| acc * d + s)
        };
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let out: Vec<usize> = dims.iter().map(|&d| rng.gen_range(0..d)).collect();
            let mut inp = out.clone();
            let k = rng.gen_range(0..6);
            inp[k] = rng.gen_range(0..dims[k]);
            let l = rng.gen_range(0..6);
            inp[l] = rng.gen_range(0..dims[l]);
            let x = mpo.matrix_element(&out, &inp).unwrap();
            let y = reference[[flat(&out), flat(&inp)]];
            assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-12);
            assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-12);
        }
        // diagonal elements over the whole basis
        for state in dims.iter().map(|&d| 0..d).multi_cartesian_product() {
            let x = mpo.matrix_element(&state, &state).unwrap();
            let i = flat(&state);
            assert_abs_diff_eq!(x.re, reference[[i, i]].re, epsilon = 1e-12);
        }
    }

    struct BadSites {
        inner: SpinSites,
        bad: nd::Array2<C64>,
    }

    impl SiteOps for BadSites {
        fn nsites(&self) -> usize { self.inner.nsites() }

        fn site_dim(&self, n: usize) -> usize { self.inner.site_dim(n) }

        fn identity(&self, n: usize) -> &nd::Array2<C64> { self.inner.identity(n) }

        fn sz(&self, n: usize) -> &nd::Array2<C64> {
            if n == 3 { &self.bad } else { self.inner.sz(n) }
        }

        fn splus(&self, n: usize) -> &nd::Array2<C64> { self.inner.splus(n) }

        fn sminus(&self, n: usize) -> &nd::Array2<C64> { self.inner.sminus(n) }
    }

    #[test]
    fn operator_shape_reported_with_site() {
        let sites = BadSites {
            inner: SpinSites::spin_half(4),
            bad: nd::Array2::zeros((3, 3)),
        };
        let H = Heisenberg::new(&sites).unwrap();
        match H.build() {
            Err(MPOError::OperatorShape { site, op, expected, found }) => {
                assert_eq!(site, 3);
                assert_eq!(op, "Sz");
                assert_eq!(expected, 2);
                assert_eq!(found, vec![3, 3]);
            },
            other => panic!("unexpected result {:?}", other.map(|m| m.len())),
        }
        assert!(!H.is_built());
        assert!(H.into_mpo().is_err());
    }

    #[test]
    fn from_config() {
        let config = Config::from_toml("
            J = 1.0
            ny = 2
            boundary_h = 0.1

            [chain]
            ns = 4
        ").unwrap();
        let sites = SpinSites::new(config.chain.ns, config.chain.spin);
        let H
            = Heisenberg::new_builder(&sites, config.params).unwrap()
            .with_context(config.context);
        assert_eq!(MPOBuild::params(&H), config.params);
        let owned = H.build_owned().unwrap();
        assert_eq!(owned.bond_dims(), vec![8; 5]);
        let mpo = H.into_mpo().unwrap();
        assert_eq!(mpo.len(), 4);
        assert_eq!(mpo.links()[0].label(), "hl0");
    }
}

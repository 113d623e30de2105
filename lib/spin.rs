//! Angular momentum quantum numbers for single-site spin spaces.
//!
//! All quantities are stored as integer numbers of halves so that half-integer
//! spins are represented exactly.

/// A single spin-projection quantum number, stored as a number of halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpinProj(i32);

impl SpinProj {
    /// Create a new spin projection from a number of halves.
    pub fn new(m: i32) -> Self { Self(m) }

    /// Return `self` as a bare number of halves.
    pub fn halves(self) -> i32 { self.0 }

    /// Return the "true" value of the projection, i.e. `halves / 2`.
    pub fn f(self) -> f64 { f64::from(self.0) / 2.0 }
}

impl From<SpinProj> for f64 {
    fn from(m: SpinProj) -> Self { m.f() }
}

/// A single total-spin quantum number, stored as a number of halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpinTotal(u32);

impl SpinTotal {
    /// Spin-1/2.
    pub const HALF: Self = Self(1);

    /// Spin-1.
    pub const ONE: Self = Self(2);

    /// Create a new total spin from a number of halves.
    pub fn new(j: u32) -> Self { Self(j) }

    /// Return `self` as a bare number of halves.
    pub fn halves(self) -> u32 { self.0 }

    /// Return the "true" value of the total spin, i.e. `halves / 2`.
    pub fn f(self) -> f64 { f64::from(self.0) / 2.0 }

    /// Return the number of projection states, `2j + 1`.
    pub fn multiplicity(self) -> usize { self.0 as usize + 1 }

    /// Return an iterator over available [`Spin`] states by descending
    /// projection number.
    ///
    /// This is the ordering used for local basis states throughout the crate,
    /// so that the stretched "up" state always comes first.
    pub fn iter_rev(self) -> SpinProjectionsRev {
        SpinProjectionsRev { cur: Some(Spin(self, SpinProj(self.0 as i32))) }
    }
}

impl From<SpinTotal> for f64 {
    fn from(j: SpinTotal) -> Self { j.f() }
}

/// A `(total, projection)` spin quantum number pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Spin(SpinTotal, SpinProj);

impl Spin {
    /// Create a new spin if the given projection is valid for the given total,
    /// both in halves.
    pub fn new(j: u32, m: i32) -> Option<Self> {
        let j_i64 = i64::from(j);
        let m_i64 = i64::from(m);
        (
            (-j_i64..=j_i64).contains(&m_i64)
            && (j_i64 - m_i64) % 2 == 0
        )
        .then_some(Self(SpinTotal(j), SpinProj(m)))
    }

    /// Return the [total-spin][SpinTotal] quantum number.
    pub fn total(self) -> SpinTotal { self.0 }

    /// Return the [spin-projection][SpinProj] quantum number.
    pub fn proj(self) -> SpinProj { self.1 }

    /// Return a copy of `self` with the projection raised by 1, or `None` if
    /// `self` is already [stretched][Self::is_stretched_pos].
    pub fn raised_checked(self) -> Option<Self> {
        Self::new(self.0.0, self.1.0 + 2)
    }

    /// Return a copy of `self` with the projection lowered by 1, or `None` if
    /// `self` is already [stretched][Self::is_stretched_neg].
    pub fn lowered_checked(self) -> Option<Self> {
        Self::new(self.0.0, self.1.0 - 2)
    }

    /// Return `true` if the projection saturates the upper end of its range.
    pub fn is_stretched_pos(self) -> bool {
        i64::from(self.1.0) >= i64::from(self.0.0)
    }

    /// Return `true` if the projection saturates the lower end of its range.
    pub fn is_stretched_neg(self) -> bool {
        i64::from(self.1.0) <= -i64::from(self.0.0)
    }

    /// Return the matrix element ⟨*j*, *m* + 1| *S*<sub>+</sub> |*j*, *m*⟩,
    /// which is zero for the stretched state.
    pub fn raising_coeff(self) -> f64 {
        if self.is_stretched_pos() { return 0.0; }
        let j = self.0.f();
        let m = self.1.f();
        (j * (j + 1.0) - m * (m + 1.0)).sqrt()
    }

    /// Return the matrix element ⟨*j*, *m* - 1| *S*<sub>-</sub> |*j*, *m*⟩,
    /// which is zero for the stretched state.
    pub fn lowering_coeff(self) -> f64 {
        if self.is_stretched_neg() { return 0.0; }
        let j = self.0.f();
        let m = self.1.f();
        (j * (j + 1.0) - m * (m - 1.0)).sqrt()
    }

    /// Return `self` as a `(total, projection)` pair of "true" values.
    pub fn f(self) -> (f64, f64) { (self.0.f(), self.1.f()) }
}

/// Iterator over spin projection states for a fixed total spin, visited in
/// descending order.
#[derive(Copy, Clone, Debug)]
pub struct SpinProjectionsRev {
    cur: Option<Spin>,
}

impl Iterator for SpinProjectionsRev {
    type Item = Spin;

    fn next(&mut self) -> Option<Self::Item> {
        let out = self.cur?;
        self.cur = out.lowered_checked();
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n
            = self.cur
            .map(|s| ((s.1.0 + s.0.0 as i32) / 2 + 1) as usize)
            .unwrap_or(0);
        (n, Some(n))
    }
}

impl ExactSizeIterator for SpinProjectionsRev { }

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn projections_descend() {
        let ms: Vec<i32>
            = SpinTotal::new(3).iter_rev().map(|s| s.proj().halves()).collect();
        assert_eq!(ms, vec![3, 1, -1, -3]);
        assert_eq!(SpinTotal::new(3).iter_rev().len(), 4);
    }

    #[test]
    fn invalid_spins_rejected() {
        assert!(Spin::new(1, 3).is_none());
        assert!(Spin::new(2, 1).is_none());
        assert!(Spin::new(2, -2).is_some());
    }

    #[test]
    fn ladder_coefficients() {
        let up = Spin::new(1, 1).unwrap();
        let dn = Spin::new(1, -1).unwrap();
        assert_abs_diff_eq!(up.raising_coeff(), 0.0);
        assert_abs_diff_eq!(dn.raising_coeff(), 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(up.lowering_coeff(), 1.0, epsilon = 1e-14);
        let zero = Spin::new(2, 0).unwrap();
        assert_abs_diff_eq!(zero.raising_coeff(), 2.0_f64.sqrt(), epsilon = 1e-14);
    }
}

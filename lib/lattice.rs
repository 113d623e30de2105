//! Ladder geometry and the channel layout of the MPO bond space.
//!
//! A chain of `ns` sites is folded into a ladder of `ny` legs and
//! `nx = ns / ny` rungs, with sites numbered rung-major:
//! ```text
//!   leg ny:  ny    2ny   ...  ns
//!   ...
//!   leg 2:   2     ny+2  ...
//!   leg 1:   1     ny+1  ...
//!          rung 1 rung 2 ... rung nx
//! ```
//!
//! Each bond of the MPO carries `k = 2 + 3 ny` channels, each one an automaton
//! state:
//! * `Start` (value 0): every two-site term has already been closed.
//! * `Finish` (value `k - 1`): nothing has been placed yet; new terms are
//!   launched from here.
//! * `InFlight { leg, op }` (value `1 + 3 leg + op`): `op` has been placed and
//!   its partner is expected `leg + 1` sites further along the chain.
//!
//! Reading the chain left to right, a term launched into leg block `ℓ` is
//! shifted down one block per site and closed into `Start` when it reaches
//! block 0, so that it spans exactly `ℓ + 1` sites.

use indexmap::IndexMap;
use thiserror::Error;
use crate::sites::OpKind;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LatticeError {
    /// Returned when a chain has no sites.
    #[error("invalid geometry: chain must have at least one site")]
    EmptyChain,

    /// Returned when a ladder has no legs.
    #[error("invalid geometry: ladder must have at least one leg")]
    ZeroLegs,

    /// Returned when the number of sites isn't a multiple of the number of
    /// legs.
    #[error("invalid geometry: {ns} sites can't be divided evenly into {ny} legs")]
    NotDivisible { ns: usize, ny: usize },
}
use LatticeError::*;
pub type LatticeResult<T> = Result<T, LatticeError>;

/// An `ny`-leg ladder of `ns` sites.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ladder {
    ns: usize,
    ny: usize,
}

impl Ladder {
    /// Create a new ladder, checking that `ny` evenly divides `ns`.
    pub fn new(ns: usize, ny: usize) -> LatticeResult<Self> {
        if ns == 0 { return Err(EmptyChain); }
        if ny == 0 { return Err(ZeroLegs); }
        if ns % ny != 0 { return Err(NotDivisible { ns, ny }); }
        Ok(Self { ns, ny })
    }

    /// Number of sites.
    pub fn ns(&self) -> usize { self.ns }

    /// Number of legs.
    pub fn ny(&self) -> usize { self.ny }

    /// Number of rungs.
    pub fn nx(&self) -> usize { self.ns / self.ny }

    /// Return the `(rung, leg)` coordinates of site `n`, both starting at 1.
    ///
    /// *Panics* if `n` is outside of `1..=ns`.
    pub fn coords(&self, n: usize) -> (usize, usize) {
        assert!(
            (1..=self.ns).contains(&n),
            "Ladder: site {} outside of 1..={}", n, self.ns,
        );
        ((n - 1) / self.ny + 1, (n - 1) % self.ny + 1)
    }

    /// Return the site at coordinates `(x, y)`, if it exists.
    pub fn site(&self, x: usize, y: usize) -> Option<usize> {
        ((1..=self.nx()).contains(&x) && (1..=self.ny).contains(&y))
            .then_some((x - 1) * self.ny + y)
    }

    /// Return `true` if rung `x` is the first or last.
    pub fn is_boundary_rung(&self, x: usize) -> bool {
        x == 1 || x == self.nx()
    }

    /// Staggering sign of site `n`, `(-1 if x odd else 1)·(-1 if y odd else 1)`.
    ///
    /// *Panics* under the same conditions as [`coords`][Self::coords].
    pub fn stagger(&self, n: usize) -> f64 {
        let (x, y) = self.coords(n);
        let sx = if x % 2 == 1 { -1.0 } else { 1.0 };
        let sy = if y % 2 == 1 { -1.0 } else { 1.0 };
        sx * sy
    }

    /// Return the channel layout for bonds of this ladder.
    pub fn layout(&self) -> ChannelLayout { ChannelLayout::new(self.ny) }

    /// Return every two-site coupling encoded by the Heisenberg MPO on this
    /// ladder, with its multiplicity.
    ///
    /// Site `n` at `(x, y)` couples to
    /// * `n + ny` (same leg, next rung) if `x < nx`,
    /// * `n + 1` (next leg, same rung) if `y < ny`,
    /// * `n + ny - 1` (last leg, same rung) if `y == 1` and `ny > 1`.
    ///
    /// The last rule wraps each rung into a ring. For `ny == 2` it coincides
    /// with the second, so rung bonds have multiplicity 2.
    pub fn bonds(&self) -> IndexMap<Bond, usize> {
        let mut bonds: IndexMap<Bond, usize> = IndexMap::new();
        let mut add = |a: usize, b: usize| {
            *bonds.entry(Bond::new(a, b)).or_insert(0) += 1;
        };
        for n in 1..=self.ns {
            let (x, y) = self.coords(n);
            if x < self.nx() { add(n, n + self.ny); }
            if y != self.ny { add(n, n + 1); }
            if y == 1 && self.ny > 1 { add(n, n + self.ny - 1); }
        }
        bonds
    }
}

/// An unordered pair of distinct sites, stored with the smaller site first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bond(usize, usize);

impl Bond {
    /// Create a new bond between sites `a` and `b`.
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    /// Return the two sites, smaller first.
    pub fn sites(&self) -> (usize, usize) { (self.0, self.1) }
}

/// Symbolic role of a single bond channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// All two-site terms closed; propagates identity.
    Start,
    /// Nothing placed yet; propagates identity and launches new terms.
    Finish,
    /// `op` placed, partner expected `leg + 1` sites later.
    InFlight { leg: usize, op: OpKind },
}

/// Index arithmetic for the `2 + 3 ny` channels of an MPO bond.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    ny: usize,
}

impl ChannelLayout {
    /// Create a new layout for `ny` legs.
    pub fn new(ny: usize) -> Self { Self { ny } }

    /// Bond dimension.
    pub fn dim(&self) -> usize { 2 + OpKind::COUNT * self.ny }

    /// Return the bond value of a channel.
    ///
    /// *Panics* if `ch` refers to a leg outside of `0..ny`.
    pub fn value(&self, ch: Channel) -> usize {
        match ch {
            Channel::Start => 0,
            Channel::Finish => self.dim() - 1,
            Channel::InFlight { leg, op } => {
                assert!(leg < self.ny, "ChannelLayout: leg {} outside of 0..{}", leg, self.ny);
                1 + OpKind::COUNT * leg + op.offset()
            },
        }
    }

    /// Return the role of a bond value, if it is in range.
    pub fn role(&self, value: usize) -> Option<Channel> {
        match value {
            0 => Some(Channel::Start),
            v if v + 1 == self.dim() => Some(Channel::Finish),
            v if v < self.dim() => {
                let leg = (v - 1) / OpKind::COUNT;
                let op = OpKind::ALL[(v - 1) % OpKind::COUNT];
                Some(Channel::InFlight { leg, op })
            },
            _ => None,
        }
    }

    /// Channel entered when `op` is placed to couple to the same leg on the
    /// next rung.
    pub fn outgoing(&self, op: OpKind) -> Channel {
        Channel::InFlight { leg: self.ny - 1, op }
    }

    /// Channel from which a term ending with `op.partner()` is closed.
    pub fn incoming(&self, op: OpKind) -> Channel {
        Channel::InFlight { leg: 0, op }
    }

    /// Channel entered when `op` is placed on leg 1 to couple to leg `ny` of
    /// the same rung; `None` for a single leg.
    pub fn wrap(&self, op: OpKind) -> Option<Channel> {
        (self.ny > 1).then_some(Channel::InFlight { leg: self.ny - 2, op })
    }

    /// Channel entered when `op` is placed to couple to the next leg of the
    /// same rung; `None` for a single leg.
    pub fn rung(&self, op: OpKind) -> Option<Channel> {
        (self.ny > 1).then_some(Channel::InFlight { leg: 0, op })
    }

    /// Return the channel `ch` moves to when passing a site without being
    /// closed, if any.
    pub fn shift(&self, ch: Channel) -> Option<Channel> {
        match ch {
            Channel::InFlight { leg, op } if leg >= 1 && leg < self.ny => {
                Some(Channel::InFlight { leg: leg - 1, op })
            },
            _ => None,
        }
    }

    /// Iterate over all `(from, to)` shift pairs.
    pub fn shifts(&self) -> impl Iterator<Item = (Channel, Channel)> + '_ {
        (1..self.ny)
            .flat_map(|leg| {
                OpKind::ALL.into_iter()
                    .map(move |op| Channel::InFlight { leg, op })
            })
            .filter_map(|ch| self.shift(ch).map(|to| (ch, to)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn geometry_checks() {
        assert_eq!(Ladder::new(5, 2), Err(NotDivisible { ns: 5, ny: 2 }));
        assert_eq!(Ladder::new(0, 1), Err(EmptyChain));
        assert_eq!(Ladder::new(4, 0), Err(ZeroLegs));
        let l = Ladder::new(6, 2).unwrap();
        assert_eq!(l.nx(), 3);
        assert_eq!(l.coords(1), (1, 1));
        assert_eq!(l.coords(4), (2, 2));
        assert_eq!(l.coords(5), (3, 1));
        assert_eq!(l.site(2, 2), Some(4));
        assert_eq!(l.site(4, 1), None);
        assert!(l.is_boundary_rung(3));
        assert!(!l.is_boundary_rung(2));
    }

    #[test]
    #[should_panic(expected = "site 0 outside of 1..=6")]
    fn coords_out_of_range() {
        Ladder::new(6, 2).unwrap().coords(0);
    }

    #[test]
    #[should_panic(expected = "leg 2 outside of 0..2")]
    fn channel_leg_out_of_range() {
        let layout = ChannelLayout::new(2);
        layout.value(Channel::InFlight { leg: 2, op: OpKind::Sz });
    }

    #[test]
    fn stagger_signs() {
        let l = Ladder::new(4, 2).unwrap();
        // (x, y) = (1, 1), (1, 2), (2, 1), (2, 2)
        let signs: Vec<f64> = (1..=4).map(|n| l.stagger(n)).collect();
        assert_eq!(signs, vec![1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn layout_roundtrip() {
        for ny in 1..=4 {
            let layout = ChannelLayout::new(ny);
            assert_eq!(layout.dim(), 2 + 3 * ny);
            for v in 0..layout.dim() {
                let ch = layout.role(v).unwrap();
                assert_eq!(layout.value(ch), v);
            }
            assert_eq!(layout.role(layout.dim()), None);
            assert_eq!(layout.value(Channel::Finish), layout.dim() - 1);
        }
    }

    #[test]
    fn operator_offsets() {
        let layout = ChannelLayout::new(2);
        assert_eq!(layout.value(layout.incoming(OpKind::Sz)), 1);
        assert_eq!(layout.value(layout.incoming(OpKind::Plus)), 2);
        assert_eq!(layout.value(layout.incoming(OpKind::Minus)), 3);
        assert_eq!(layout.value(layout.outgoing(OpKind::Sz)), 4);
        assert_eq!(layout.value(layout.outgoing(OpKind::Minus)), 6);
        assert_eq!(layout.wrap(OpKind::Sz), Some(layout.incoming(OpKind::Sz)));
        let single = ChannelLayout::new(1);
        assert_eq!(single.outgoing(OpKind::Plus), single.incoming(OpKind::Plus));
        assert_eq!(single.wrap(OpKind::Sz), None);
        assert_eq!(single.rung(OpKind::Sz), None);
        assert_eq!(single.shifts().count(), 0);
    }

    #[test]
    fn shifts_walk_down_one_leg() {
        let layout = ChannelLayout::new(3);
        let shifts: Vec<(usize, usize)>
            = layout.shifts()
            .map(|(a, b)| (layout.value(a), layout.value(b)))
            .collect();
        assert_eq!(shifts, vec![(4, 1), (5, 2), (6, 3), (7, 4), (8, 5), (9, 6)]);
        assert_eq!(layout.shift(Channel::Start), None);
        assert_eq!(layout.shift(layout.incoming(OpKind::Sz)), None);
    }

    #[test]
    fn ladder_bonds() {
        let chain = Ladder::new(4, 1).unwrap();
        let bonds: Vec<(usize, usize)>
            = chain.bonds().keys().map(|b| b.sites()).collect();
        assert_eq!(bonds, vec![(1, 2), (2, 3), (3, 4)]);

        let ladder = Ladder::new(6, 2).unwrap();
        let bonds = ladder.bonds();
        assert_eq!(bonds.get(&Bond::new(1, 2)), Some(&2));
        assert_eq!(bonds.get(&Bond::new(1, 3)), Some(&1));
        assert_eq!(bonds.get(&Bond::new(1, 4)), None);
        assert_eq!(bonds.get(&Bond::new(2, 3)), None);

        let tube = Ladder::new(6, 3).unwrap();
        let bonds = tube.bonds();
        assert_eq!(bonds.get(&Bond::new(1, 3)), Some(&1));
        assert_eq!(bonds.get(&Bond::new(2, 3)), Some(&1));
        assert_eq!(bonds.get(&Bond::new(3, 4)), None);
        assert_eq!(bonds.values().sum::<usize>(), 3 + 3 + 3);
    }
}

//! One photon history: position, direction, energy and census state.
//!
//! A photon is owned by exactly one rank at any moment: it lives on the
//! local source, the receive stack, the census list, or inside exactly one
//! posted send buffer. Only the transport kernel mutates it.

use crate::cell::Face;

/// State of a single photon history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    pos: [f64; 3],
    dir: [f64; 3],
    cell: u32,
    e: f64,
    e0: f64,
    remaining: f64,
    census: bool,
    alive: bool,
}

impl Photon {
    /// Create a live photon. `remaining` is the flight distance to census,
    /// `c * dt` at birth.
    pub fn new(pos: [f64; 3], dir: [f64; 3], cell: u32, e: f64, remaining: f64) -> Self {
        Self {
            pos,
            dir,
            cell,
            e,
            e0: e,
            remaining,
            census: false,
            alive: true,
        }
    }

    #[inline]
    pub fn position(&self) -> [f64; 3] {
        self.pos
    }

    #[inline]
    pub fn direction(&self) -> [f64; 3] {
        self.dir
    }

    #[inline]
    pub fn cell(&self) -> u32 {
        self.cell
    }

    #[inline]
    pub fn set_cell(&mut self, cell: u32) {
        self.cell = cell;
    }

    #[inline]
    pub fn energy(&self) -> f64 {
        self.e
    }

    #[inline]
    pub fn set_energy(&mut self, e: f64) {
        self.e = e;
    }

    /// Energy at birth; the kill cutoff is a fraction of this.
    #[inline]
    pub fn birth_energy(&self) -> f64 {
        self.e0
    }

    #[inline]
    pub fn distance_remaining(&self) -> f64 {
        self.remaining
    }

    #[inline]
    pub fn set_distance_remaining(&mut self, d: f64) {
        self.remaining = d;
    }

    /// Translate by `d` along the current direction and use up that much
    /// of the remaining flight distance.
    #[inline]
    pub fn advance(&mut self, d: f64) {
        self.pos[0] += d * self.dir[0];
        self.pos[1] += d * self.dir[1];
        self.pos[2] += d * self.dir[2];
        self.remaining -= d;
    }

    #[inline]
    pub fn set_direction(&mut self, dir: [f64; 3]) {
        self.dir = dir;
    }

    /// Specular reflection off a cell face: negate the normal component.
    #[inline]
    pub fn reflect(&mut self, face: Face) {
        self.dir[face.axis()] = -self.dir[face.axis()];
    }

    /// True once the history has dropped below `fraction` of its birth energy.
    #[inline]
    pub fn below_cutoff(&self, fraction: f64) -> bool {
        self.e < fraction * self.e0
    }

    #[inline]
    pub fn kill(&mut self) {
        self.alive = false;
    }

    #[inline]
    pub fn alive(&self) -> bool {
        self.alive
    }

    #[inline]
    pub fn census_flag(&self) -> bool {
        self.census
    }

    #[inline]
    pub fn set_census_flag(&mut self, flag: bool) {
        self.census = flag;
    }

    /// Stable total order used to sort the returned census list: cell id
    /// first, then position lexicographically.
    pub fn census_order(&self, other: &Self) -> std::cmp::Ordering {
        self.cell.cmp(&other.cell).then_with(|| {
            self.pos
                .iter()
                .zip(other.pos.iter())
                .map(|(a, b)| a.total_cmp(b))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Rebuild a photon from its wire fields. `e0` travels with the record
    /// so the cutoff test stays correct after a rank crossing.
    pub(crate) fn from_wire_parts(
        pos: [f64; 3],
        dir: [f64; 3],
        cell: u32,
        e: f64,
        e0: f64,
        remaining: f64,
        census: bool,
        alive: bool,
    ) -> Self {
        Self {
            pos,
            dir,
            cell,
            e,
            e0,
            remaining,
            census,
            alive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_photon() -> Photon {
        Photon::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 3, 2.0, 10.0)
    }

    #[test]
    fn advance_moves_and_spends_flight() {
        let mut p = test_photon();
        p.advance(4.0);
        assert_eq!(p.position(), [4.0, 0.0, 0.0]);
        assert_eq!(p.distance_remaining(), 6.0);
    }

    #[test]
    fn reflect_negates_normal_component() {
        let mut p = test_photon();
        p.set_direction([0.6, 0.8, 0.0]);
        p.reflect(Face::XPos);
        assert_eq!(p.direction(), [-0.6, 0.8, 0.0]);
        p.reflect(Face::YNeg);
        assert_eq!(p.direction(), [-0.6, -0.8, 0.0]);
    }

    #[test]
    fn cutoff_uses_birth_energy() {
        let mut p = test_photon();
        assert!(!p.below_cutoff(0.01));
        p.set_energy(0.021);
        assert!(!p.below_cutoff(0.01));
        p.set_energy(0.019);
        assert!(p.below_cutoff(0.01));
    }

    #[test]
    fn census_order_is_total() {
        let a = Photon::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1, 1.0, 1.0);
        let b = Photon::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], 2, 1.0, 1.0);
        let c = Photon::new([1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 2, 1.0, 1.0);
        assert_eq!(a.census_order(&b), std::cmp::Ordering::Less);
        assert_eq!(b.census_order(&c), std::cmp::Ordering::Less);
        assert_eq!(b.census_order(&b), std::cmp::Ordering::Equal);
    }
}

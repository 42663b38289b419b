//! Photon sources for one transport step.
//!
//! The driver drains exactly `n_photon()` photons from its local source;
//! the source owns the emission cursor. Census photons from the previous
//! step re-enter through [`VecSource`].

use crate::cell::Face;
use crate::constants::C;
use crate::mesh::BrickMesh;
use crate::photon::Photon;
use crate::rng::TransportRng;
use crate::sampling::{face_source_angle, isotropic_angle};

/// Local photon supply for one step.
pub trait PhotonSource {
    /// Total photons this rank will source this step.
    fn n_photon(&self) -> u64;

    /// Produce the next photon and advance the cursor. Called at most
    /// `n_photon()` times per step.
    fn next_photon(&mut self, rng: &mut TransportRng, dt: f64) -> Photon;
}

/// Volume emission: photons born isotropically at uniform positions in
/// this rank's cells, each carrying an equal share of the source energy.
pub struct EmissionSource {
    cells: Vec<(u32, [f64; 6])>,
    n_photon: u64,
    e_per_photon: f64,
    cursor: u64,
}

impl EmissionSource {
    pub fn new(mesh: &BrickMesh, n_photon: u64, total_e: f64) -> Self {
        let cells = mesh
            .owned_cells()
            .map(|c| (c.id(), c.bounds()))
            .collect::<Vec<_>>();
        assert!(!cells.is_empty(), "emission source needs at least one cell");
        Self {
            cells,
            n_photon,
            e_per_photon: if n_photon > 0 {
                total_e / n_photon as f64
            } else {
                0.0
            },
            cursor: 0,
        }
    }
}

impl PhotonSource for EmissionSource {
    fn n_photon(&self) -> u64 {
        self.n_photon
    }

    fn next_photon(&mut self, rng: &mut TransportRng, dt: f64) -> Photon {
        debug_assert!(self.cursor < self.n_photon, "source overdrawn");
        self.cursor += 1;
        // spread emission round-robin over the owned cells
        let (id, b) = self.cells[(self.cursor as usize - 1) % self.cells.len()];
        let pos = [
            b[0] + rng.sample() * (b[1] - b[0]),
            b[2] + rng.sample() * (b[3] - b[2]),
            b[4] + rng.sample() * (b[5] - b[4]),
        ];
        Photon::new(pos, isotropic_angle(rng), id, self.e_per_photon, C * dt)
    }
}

/// Surface emission from one problem-boundary face of this rank's slab,
/// with cosine-weighted inward angles.
pub struct FaceSource {
    cells: Vec<(u32, [f64; 6])>,
    face: Face,
    n_photon: u64,
    e_per_photon: f64,
    cursor: u64,
}

impl FaceSource {
    /// Emit from the cells whose `face` lies on the problem boundary.
    pub fn new(mesh: &BrickMesh, face: Face, n_photon: u64, total_e: f64) -> Self {
        let cells: Vec<_> = mesh
            .owned_cells()
            .filter(|c| matches!(c.bc(face), crate::cell::Bc::Reflect | crate::cell::Bc::Vacuum))
            .map(|c| (c.id(), c.bounds()))
            .collect();
        assert!(!cells.is_empty(), "no cells touch the requested face");
        Self {
            cells,
            face,
            n_photon,
            e_per_photon: if n_photon > 0 {
                total_e / n_photon as f64
            } else {
                0.0
            },
            cursor: 0,
        }
    }
}

impl PhotonSource for FaceSource {
    fn n_photon(&self) -> u64 {
        self.n_photon
    }

    fn next_photon(&mut self, rng: &mut TransportRng, dt: f64) -> Photon {
        debug_assert!(self.cursor < self.n_photon, "source overdrawn");
        self.cursor += 1;
        let (id, b) = self.cells[(self.cursor as usize - 1) % self.cells.len()];
        // birth on the face plane, uniform over the face area
        let mut pos = [
            b[0] + rng.sample() * (b[1] - b[0]),
            b[2] + rng.sample() * (b[3] - b[2]),
            b[4] + rng.sample() * (b[5] - b[4]),
        ];
        let axis = self.face.axis();
        pos[axis] = b[2 * axis + self.face.index() % 2];
        Photon::new(
            pos,
            face_source_angle(self.face, rng),
            id,
            self.e_per_photon,
            C * dt,
        )
    }
}

/// Pre-built photon list: the census of the previous step, or photons
/// constructed directly by a test.
pub struct VecSource {
    photons: Vec<Photon>,
    cursor: usize,
}

impl VecSource {
    pub fn new(mut photons: Vec<Photon>) -> Self {
        // pop from the back; preserve the given order
        photons.reverse();
        Self { photons, cursor: 0 }
    }
}

impl PhotonSource for VecSource {
    fn n_photon(&self) -> u64 {
        (self.photons.len() + self.cursor) as u64
    }

    fn next_photon(&mut self, _rng: &mut TransportRng, _dt: f64) -> Photon {
        self.cursor += 1;
        self.photons.pop().expect("source overdrawn")
    }
}

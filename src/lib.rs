//! # photon-pass
//!
//! photon-pass is the particle-passing transport core of a distributed
//! Implicit Monte Carlo (IMC) thermal-radiation calculation. The spatial
//! mesh is partitioned across ranks; individual photon histories migrate
//! between ranks by message passing, and global termination is detected
//! with a binary-tree reduction of completed-history counts.
//!
//! ## Features
//! - Per-photon transport kernel: collision, boundary and census events,
//!   energy deposition, four terminal verdicts
//! - Asynchronous photon router with per-neighbor batching and a
//!   deadlock-free quiescence shutdown
//! - Binary-tree completion protocol pipelining partial counts while
//!   transport is still in flight
//! - Pluggable communication backends: serial, intra-process threads,
//!   and MPI behind the `mpi-support` feature
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! photon-pass = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! One time step on one rank:
//! ```
//! use photon_pass::prelude::*;
//!
//! let grid = GridSpec { nx: 4, ny: 4, nz: 4, dx: 1.0, dy: 1.0, dz: 1.0 };
//! let physics = CellPhysics { op_a: 1.0, op_s: 0.0, fleck: 1.0 };
//! let mesh = BrickMesh::build(grid, physics, Bc::Reflect, 0, 1).unwrap();
//! let mut source = EmissionSource::new(&mesh, 100, 1.0);
//! let mut rng = TransportRng::from_rank_seed(1, 0);
//! let mut absorbed = vec![0.0; mesh.n_global_cells()];
//!
//! let out = transport_particle_pass(
//!     &mut source, &mesh, &NoComm, &mut rng,
//!     &StepParams::default(), &mut absorbed,
//! ).unwrap();
//! assert_eq!(out.n_complete, 100);
//! ```

pub mod buffer;
pub mod cell;
pub mod comm;
pub mod config;
pub mod constants;
pub mod driver;
pub mod mesh;
pub mod photon;
pub mod rng;
pub mod router;
pub mod sampling;
pub mod source;
pub mod tally;
pub mod transport;
pub mod transport_error;
pub mod tree;
pub mod wire;

/// A convenient prelude importing the most-used types.
pub mod prelude {
    pub use crate::cell::{Bc, Cell, Face};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{Communicator, NoComm, RecvRequest, SendRequest, ThreadComm};
    pub use crate::config::StepParams;
    pub use crate::driver::transport_particle_pass;
    pub use crate::mesh::{BrickMesh, CellPhysics, GridSpec, Mesh};
    pub use crate::photon::Photon;
    pub use crate::rng::TransportRng;
    pub use crate::source::{EmissionSource, FaceSource, PhotonSource, VecSource};
    pub use crate::tally::{MessageCounters, StepOutput, StepTally};
    pub use crate::transport::{transport_photon, Event};
    pub use crate::transport_error::TransportError;
}

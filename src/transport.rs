//! Per-photon transport kernel.
//!
//! Advances one history through the on-rank mesh until it terminates
//! locally or must migrate: sample the distance to collision, boundary
//! and census, take the minimum, deposit absorbed energy, then dispatch
//! on the event. The kernel never blocks and never allocates.

use crate::cell::Bc;
use crate::constants::C;
use crate::mesh::Mesh;
use crate::photon::Photon;
use crate::rng::TransportRng;
use crate::sampling::isotropic_angle;
use crate::tally::StepTally;

/// Terminal verdict of one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// History absorbed below the energy cutoff.
    Kill,
    /// History escaped through a vacuum boundary.
    Exit,
    /// History crossed into a cell owned by another rank.
    Pass,
    /// History exhausted its flight distance for this step.
    Census,
    /// Reserved; never produced by the particle-pass algorithm.
    Wait,
}

/// Transport one photon to a terminal event. Absorbed energy is
/// deposited into `rank_abs_e` indexed by global cell id; exit and
/// census energy go to the tally.
pub fn transport_photon<M: Mesh>(
    phtn: &mut Photon,
    mesh: &M,
    rng: &mut TransportRng,
    next_dt: f64,
    cutoff_fraction: f64,
    tally: &mut StepTally,
    rank_abs_e: &mut [f64],
) -> Event {
    let mut cell_id = phtn.cell();
    let mut cell = mesh.on_rank_cell(cell_id);

    loop {
        let sigma_a = cell.op_a();
        let sigma_s = cell.op_s();
        let f = cell.fleck();

        let dist_to_scatter = -rng.sample().ln() / ((1.0 - f) * sigma_a + sigma_s);
        let (dist_to_boundary, surface_cross) =
            cell.distance_to_boundary(phtn.position(), phtn.direction());
        let dist_to_census = phtn.distance_remaining();

        let dist_to_event = dist_to_scatter.min(dist_to_boundary).min(dist_to_census);

        let absorbed_e = phtn.energy() * (1.0 - (-sigma_a * f * dist_to_event).exp());
        phtn.set_energy(phtn.energy() - absorbed_e);
        rank_abs_e[cell_id as usize] += absorbed_e;

        phtn.advance(dist_to_event);

        if phtn.below_cutoff(cutoff_fraction) {
            rank_abs_e[cell_id as usize] += phtn.energy();
            phtn.kill();
            return Event::Kill;
        }

        // ties resolve scatter, then boundary, then census
        if dist_to_event == dist_to_scatter {
            phtn.set_direction(isotropic_angle(rng));
        } else if dist_to_event == dist_to_boundary {
            match cell.bc(surface_cross) {
                Bc::Element => {
                    cell_id = cell.next_cell(surface_cross);
                    phtn.set_cell(cell_id);
                    cell = mesh.on_rank_cell(cell_id);
                }
                Bc::Processor => {
                    // global id of the off-rank cell rides with the photon
                    phtn.set_cell(cell.next_cell(surface_cross));
                    return Event::Pass;
                }
                Bc::Vacuum => {
                    tally.exit_e += phtn.energy();
                    return Event::Exit;
                }
                Bc::Reflect => phtn.reflect(surface_cross),
            }
        } else {
            phtn.set_census_flag(true);
            phtn.set_distance_remaining(C * next_dt);
            tally.census_e += phtn.energy();
            return Event::Census;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Bc;
    use crate::mesh::{BrickMesh, CellPhysics, GridSpec};

    fn grid() -> GridSpec {
        GridSpec {
            nx: 2,
            ny: 2,
            nz: 2,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        }
    }

    fn build(physics: CellPhysics, boundary: Bc) -> BrickMesh {
        BrickMesh::build(grid(), physics, boundary, 0, 1).unwrap()
    }

    fn centered_photon(e: f64, remaining: f64) -> Photon {
        Photon::new([0.5, 0.5, 0.5], [1.0, 0.0, 0.0], 0, e, remaining)
    }

    #[test]
    fn pure_absorber_kills_and_conserves_energy() {
        let mesh = build(
            CellPhysics {
                op_a: 4.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Reflect,
        );
        let mut rng = TransportRng::from_rank_seed(11, 0);
        let mut tally = StepTally::default();
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let mut total = 0.0;
        for _ in 0..200 {
            let mut p = centered_photon(1.0, 1.0e12);
            total += p.energy();
            let event = transport_photon(&mut p, &mesh, &mut rng, 1.0, 0.01, &mut tally, &mut abs);
            assert_eq!(event, Event::Kill);
            assert!(!p.alive());
        }
        let absorbed: f64 = abs.iter().sum();
        assert!((absorbed - total).abs() < 1e-12 * total);
        assert_eq!(tally, StepTally::default());
    }

    #[test]
    fn streaming_photon_exits_vacuum() {
        let mesh = build(
            CellPhysics {
                op_a: 0.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Vacuum,
        );
        let mut rng = TransportRng::from_rank_seed(11, 0);
        let mut tally = StepTally::default();
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let mut p = centered_photon(2.0, 1.0e12);
        let event = transport_photon(&mut p, &mesh, &mut rng, 1.0, 0.01, &mut tally, &mut abs);
        assert_eq!(event, Event::Exit);
        assert_eq!(tally.exit_e, 2.0);
        assert_eq!(abs.iter().sum::<f64>(), 0.0);
        // crossed cell 0 into cell 1, then left through x+
        assert_eq!(p.cell(), 1);
    }

    #[test]
    fn short_flight_reaches_census() {
        let mesh = build(
            CellPhysics {
                op_a: 0.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Vacuum,
        );
        let mut rng = TransportRng::from_rank_seed(11, 0);
        let mut tally = StepTally::default();
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let mut p = centered_photon(2.0, 0.25);
        let next_dt = 0.5;
        let event =
            transport_photon(&mut p, &mesh, &mut rng, next_dt, 0.01, &mut tally, &mut abs);
        assert_eq!(event, Event::Census);
        assert!(p.census_flag());
        assert_eq!(p.distance_remaining(), C * next_dt);
        assert_eq!(tally.census_e, 2.0);
        assert!((p.position()[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn processor_face_returns_pass_with_global_cell() {
        // two ranks; transport on rank 0 with a photon aimed at the partition
        let mesh = BrickMesh::build(
            grid(),
            CellPhysics {
                op_a: 0.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Reflect,
            0,
            2,
        )
        .unwrap();
        let mut rng = TransportRng::from_rank_seed(11, 0);
        let mut tally = StepTally::default();
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let mut p = centered_photon(1.0, 1.0e12);
        let event = transport_photon(&mut p, &mesh, &mut rng, 1.0, 0.01, &mut tally, &mut abs);
        assert_eq!(event, Event::Pass);
        assert!(p.alive());
        // destination is the global id owned by rank 1
        assert_eq!(p.cell(), 1);
        assert_eq!(mesh.rank_of(p.cell()), 1);
    }

    #[test]
    fn reflecting_box_keeps_photon_until_census() {
        let mesh = build(
            CellPhysics {
                op_a: 0.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Reflect,
        );
        let mut rng = TransportRng::from_rank_seed(11, 0);
        let mut tally = StepTally::default();
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let mut p = centered_photon(1.0, 7.3);
        let event = transport_photon(&mut p, &mesh, &mut rng, 1.0, 0.01, &mut tally, &mut abs);
        assert_eq!(event, Event::Census);
        let pos = p.position();
        assert!(pos[0] >= 0.0 && pos[0] <= 2.0);
    }

    #[test]
    fn scattering_medium_conserves_energy() {
        let mesh = build(
            CellPhysics {
                op_a: 0.5,
                op_s: 2.0,
                fleck: 0.7,
            },
            Bc::Reflect,
        );
        let mut rng = TransportRng::from_rank_seed(23, 0);
        let mut tally = StepTally::default();
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let n = 500;
        let mut initial = 0.0;
        for _ in 0..n {
            let mut p = centered_photon(1.0, 40.0);
            initial += p.energy();
            match transport_photon(&mut p, &mesh, &mut rng, 1.0, 0.01, &mut tally, &mut abs) {
                Event::Kill | Event::Census => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        let absorbed: f64 = abs.iter().sum();
        let total = absorbed + tally.census_e + tally.exit_e;
        assert!((total - initial).abs() < 1e-10 * initial);
    }

    proptest::proptest! {
        #[test]
        fn energy_is_conserved_for_any_medium(
            op_a in 0.1f64..10.0,
            op_s in 0.0f64..5.0,
            fleck in 0.05f64..1.0,
            seed in 0u64..1_000,
        ) {
            let mesh = build(CellPhysics { op_a, op_s, fleck }, Bc::Reflect);
            let mut rng = TransportRng::from_rank_seed(seed, 0);
            let mut tally = StepTally::default();
            let mut abs = vec![0.0; mesh.n_global_cells()];

            let mut p = centered_photon(1.0, 25.0);
            let event = transport_photon(&mut p, &mesh, &mut rng, 1.0, 0.01, &mut tally, &mut abs);
            let live = match event {
                Event::Census => p.energy(),
                Event::Kill => 0.0,
                other => panic!("unexpected event {other:?}"),
            };
            let absorbed: f64 = abs.iter().sum();
            proptest::prop_assert!((absorbed + live - 1.0).abs() < 1e-10);
        }
    }
}

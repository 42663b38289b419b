//! Particle-pass driver: one time step of distributed photon transport.
//!
//! Single-threaded cooperative scheduling per rank. Each iteration
//! transports a batch of photons (received photons first, then the local
//! source), routes the verdicts, services the photon router and the
//! completion tree, and checks the global-done predicate. After the
//! loop, the quiescence handshake drains every in-flight message so no
//! posted receive is left without a matching send.

use log::debug;

use crate::comm::Communicator;
use crate::config::StepParams;
use crate::mesh::Mesh;
use crate::photon::Photon;
use crate::rng::TransportRng;
use crate::router::PhotonRouter;
use crate::source::PhotonSource;
use crate::tally::{MessageCounters, StepOutput, StepTally};
use crate::transport::{transport_photon, Event};
use crate::transport_error::TransportError;
use crate::tree::CompletionTree;

/// Run one transport step. Drains `source`, exchanges migrating photons
/// with adjacent ranks, and returns once every history in the global
/// population has terminated. Absorbed energy accumulates into
/// `rank_abs_e`, indexed by global cell id.
pub fn transport_particle_pass<C, M, S>(
    source: &mut S,
    mesh: &M,
    comm: &C,
    rng: &mut TransportRng,
    params: &StepParams,
    rank_abs_e: &mut [f64],
) -> Result<StepOutput, TransportError>
where
    C: Communicator,
    M: Mesh,
    S: PhotonSource,
{
    let mut tally = StepTally::default();
    let mut counters = MessageCounters::default();

    let n_local = source.n_photon();
    // all ranks must know the global count before transport begins
    let n_global = comm.sum_u64(n_local);

    let mut router: PhotonRouter<C> = PhotonRouter::new(
        mesh.adjacency().clone(),
        params.particle_message_size as usize,
    );
    router.post_receives(comm, &mut counters);
    let mut tree: CompletionTree<C> = CompletionTree::new(comm, n_global, &mut counters);

    let mut census_list: Vec<Photon> = Vec::new();
    // folded into the tree each iteration; n_terminated keeps the step total
    let mut n_complete: u64 = 0;
    let mut n_terminated: u64 = 0;
    let mut n_sourced: u64 = 0;
    let mut finished = false;

    while !finished {
        let mut n = params.batch_size;

        // transport photons from the receive stack, then the source
        while n > 0 && (!router.recv_stack_empty() || n_sourced < n_local) {
            let mut phtn = match router.pop_received() {
                Some(p) => p,
                None => {
                    n_sourced += 1;
                    source.next_photon(rng, params.dt)
                }
            };

            let event = transport_photon(
                &mut phtn,
                mesh,
                rng,
                params.next_dt,
                params.cutoff_fraction,
                &mut tally,
                rank_abs_e,
            );
            match event {
                Event::Kill | Event::Exit => {
                    n_complete += 1;
                    n_terminated += 1;
                }
                Event::Census => {
                    census_list.push(phtn);
                    n_complete += 1;
                    n_terminated += 1;
                }
                // a passed history is not complete anywhere until it
                // terminates on its destination rank
                Event::Pass => {
                    let dest = mesh.rank_of(phtn.cell());
                    router.route(phtn, dest)?;
                }
                Event::Wait => unreachable!("the particle-pass kernel never waits"),
            }
            n -= 1;
        }

        let source_drained = n_sourced == n_local;
        router.service_sends(comm, source_drained, &mut counters);
        router.service_receives(comm, &mut counters)?;

        tree.service(comm, &mut counters)?;
        tree.fold_local(&mut n_complete);
        let locally_quiet = source_drained && router.recv_stack_empty();
        tree.maybe_send_up(comm, locally_quiet, &mut counters);

        finished = tree.finished();
    }

    // Quiescence: broadcast done to the subtree, then fence the whole
    // job before draining photon links. The barrier guarantees no rank
    // is still inside its loop when the empty messages arrive, so no
    // receive gets reposted against a send that will never come.
    tree.broadcast_down(comm, &mut counters);
    comm.barrier();
    tree.drain(comm, &mut counters);
    router.drain(comm, &mut counters);
    comm.barrier();

    census_list.sort_by(Photon::census_order);

    debug_assert!(counters.balanced(), "message parity broken: {counters:?}");
    debug!(
        "rank {} step done: sourced {}, census {}, {} photon messages",
        comm.rank(),
        n_sourced,
        census_list.len(),
        counters.n_photon_messages
    );

    Ok(StepOutput {
        census: census_list,
        tally,
        counters,
        n_complete: n_terminated,
        n_sourced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Bc;
    use crate::comm::NoComm;
    use crate::mesh::{BrickMesh, CellPhysics, GridSpec};
    use crate::source::EmissionSource;

    fn grid() -> GridSpec {
        GridSpec {
            nx: 4,
            ny: 4,
            nz: 4,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        }
    }

    #[test]
    fn serial_step_terminates_and_accounts_for_every_history() {
        let mesh = BrickMesh::build(
            grid(),
            CellPhysics {
                op_a: 1.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Reflect,
            0,
            1,
        )
        .unwrap();
        let mut source = EmissionSource::new(&mesh, 250, 100.0);
        let mut rng = TransportRng::from_rank_seed(5, 0);
        let mut abs = vec![0.0; mesh.n_global_cells()];
        let params = StepParams::default();

        let out = transport_particle_pass(&mut source, &mesh, &NoComm, &mut rng, &params, &mut abs)
            .unwrap();

        assert_eq!(out.n_complete, 250);
        assert_eq!(out.n_sourced, 250);
        assert_eq!(out.counters, MessageCounters::default());
        let absorbed: f64 = abs.iter().sum();
        let total = absorbed + out.tally.exit_e + out.tally.census_e;
        assert!((total - 100.0).abs() < 1e-10);
    }

    #[test]
    fn census_output_is_sorted() {
        let mesh = BrickMesh::build(
            grid(),
            CellPhysics {
                op_a: 0.0,
                op_s: 0.0,
                fleck: 1.0,
            },
            Bc::Reflect,
            0,
            1,
        )
        .unwrap();
        // a short step forces every photon to census
        let params = StepParams {
            dt: 1e-6,
            next_dt: 1e-6,
            ..StepParams::default()
        };
        let mut source = EmissionSource::new(&mesh, 100, 10.0);
        let mut rng = TransportRng::from_rank_seed(5, 0);
        let mut abs = vec![0.0; mesh.n_global_cells()];

        let out = transport_particle_pass(&mut source, &mesh, &NoComm, &mut rng, &params, &mut abs)
            .unwrap();

        assert_eq!(out.census.len(), 100);
        assert!(out
            .census
            .windows(2)
            .all(|w| w[0].census_order(&w[1]) != std::cmp::Ordering::Greater));
    }
}

//! Communication abstraction for intra-process and inter-process (MPI)
//! message passing.
//!
//! The transport step needs four things from the message layer:
//! non-blocking point-to-point sends and receives with FIFO order per
//! `(src, dst, tag)`, completion testing on the posted handles, a
//! barrier, and one blocking sum-allreduce for the initial global photon
//! count. Receivers post a capacity; a delivered message may be shorter
//! (the empty photon message is legal and load bearing during shutdown).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// Completion interface for a posted send.
pub trait SendRequest {
    /// Non-blocking completion test.
    fn test(&mut self) -> bool;
    /// Block until the send has completed.
    fn wait(self);
}

/// Completion interface for a posted receive.
pub trait RecvRequest {
    /// Non-blocking test; returns the message once it has arrived.
    fn test(&mut self) -> Option<Vec<u8>>;
    /// Block until the matching send arrives.
    fn wait(self) -> Vec<u8>;
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    type SendHandle: SendRequest;
    type RecvHandle: RecvRequest;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;

    /// Post a receive of at most `capacity` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, capacity: usize) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Synchronization barrier across all ranks.
    fn barrier(&self);

    /// Blocking sum-allreduce of one u64.
    fn sum_u64(&self, value: u64) -> u64;
}

// --- NoComm: single-rank runs and serial unit tests ---

/// Compile-time no-op comm; rank 0 of a size-1 world. It has no peers, so
/// the driver never posts a send or receive through it.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

pub struct NoSendHandle;

impl SendRequest for NoSendHandle {
    fn test(&mut self) -> bool {
        true
    }
    fn wait(self) {}
}

pub struct NoRecvHandle;

impl RecvRequest for NoRecvHandle {
    fn test(&mut self) -> Option<Vec<u8>> {
        None
    }
    fn wait(self) -> Vec<u8> {
        unreachable!("NoComm has no peers to receive from")
    }
}

impl Communicator for NoComm {
    type SendHandle = NoSendHandle;
    type RecvHandle = NoRecvHandle;

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) -> NoSendHandle {
        NoSendHandle
    }

    fn irecv(&self, _peer: usize, _tag: u16, _capacity: usize) -> NoRecvHandle {
        NoRecvHandle
    }

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn sum_u64(&self, value: u64) -> u64 {
        value
    }
}

// --- ThreadComm: intra-process, one thread per rank ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

type Channel = (Mutex<Slot>, Condvar);

struct EpochGate {
    arrived: usize,
    epoch: u64,
    acc: u64,
    result: u64,
}

struct ClusterState {
    size: usize,
    mailboxes: Mutex<HashMap<Key, Arc<Channel>>>,
    barrier: (Mutex<EpochGate>, Condvar),
    reduce: (Mutex<EpochGate>, Condvar),
}

impl ClusterState {
    fn channel(&self, key: Key) -> Arc<Channel> {
        let mut map = self.mailboxes.lock().expect("mailbox poisoned");
        map.entry(key)
            .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
            .clone()
    }
}

/// Intra-process communicator: one instance per simulated rank, all
/// sharing a mailbox created by [`ThreadComm::cluster`]. Messages are
/// FIFO per `(src, dst, tag)`. Unlike a process-global mailbox, a
/// cluster is isolated, so concurrent clusters never cross-talk.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    state: Arc<ClusterState>,
}

impl ThreadComm {
    /// Create the communicators for a `size`-rank in-process world.
    pub fn cluster(size: usize) -> Vec<ThreadComm> {
        let gate = || EpochGate {
            arrived: 0,
            epoch: 0,
            acc: 0,
            result: 0,
        };
        let state = Arc::new(ClusterState {
            size,
            mailboxes: Mutex::new(HashMap::new()),
            barrier: (Mutex::new(gate()), Condvar::new()),
            reduce: (Mutex::new(gate()), Condvar::new()),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                state: state.clone(),
            })
            .collect()
    }

    /// Number of delivered-but-unconsumed messages across the cluster.
    /// Zero after a clean shutdown handshake.
    pub fn n_undelivered(&self) -> usize {
        let map = self.state.mailboxes.lock().expect("mailbox poisoned");
        map.values()
            .map(|ch| ch.0.lock().expect("slot poisoned").q.len())
            .sum()
    }
}

pub struct ThreadSendHandle;

impl SendRequest for ThreadSendHandle {
    fn test(&mut self) -> bool {
        true
    }
    fn wait(self) {}
}

pub struct ThreadRecvHandle {
    channel: Arc<Channel>,
    capacity: usize,
}

impl RecvRequest for ThreadRecvHandle {
    fn test(&mut self) -> Option<Vec<u8>> {
        let (lock, _cv) = &*self.channel;
        let mut slot = lock.lock().expect("slot poisoned");
        slot.q.pop_front().map(|mut msg| {
            msg.truncate(self.capacity);
            msg
        })
    }

    fn wait(self) -> Vec<u8> {
        let (lock, cv) = &*self.channel;
        let mut slot = lock.lock().expect("slot poisoned");
        loop {
            if let Some(mut msg) = slot.q.pop_front() {
                msg.truncate(self.capacity);
                return msg;
            }
            slot = cv.wait(slot).expect("condvar poisoned");
        }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> ThreadSendHandle {
        let channel = self.state.channel((self.rank, peer, tag));
        {
            let mut slot = channel.0.lock().expect("slot poisoned");
            slot.q.push_back(buf.to_vec());
        }
        channel.1.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, capacity: usize) -> ThreadRecvHandle {
        ThreadRecvHandle {
            channel: self.state.channel((peer, self.rank, tag)),
            capacity,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn barrier(&self) {
        let (lock, cv) = &self.state.barrier;
        let mut gate = lock.lock().expect("barrier poisoned");
        let entered = gate.epoch;
        gate.arrived += 1;
        if gate.arrived == self.state.size {
            gate.arrived = 0;
            gate.epoch += 1;
            cv.notify_all();
        } else {
            while gate.epoch == entered {
                gate = cv.wait(gate).expect("barrier poisoned");
            }
        }
    }

    fn sum_u64(&self, value: u64) -> u64 {
        let (lock, cv) = &self.state.reduce;
        let mut gate = lock.lock().expect("reduce poisoned");
        let entered = gate.epoch;
        if gate.arrived == 0 {
            gate.acc = 0;
        }
        gate.acc += value;
        gate.arrived += 1;
        if gate.arrived == self.state.size {
            gate.result = gate.acc;
            gate.arrived = 0;
            gate.epoch += 1;
            cv.notify_all();
        } else {
            while gate.epoch == entered {
                gate = cv.wait(gate).expect("reduce poisoned");
            }
        }
        gate.result
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::{CommunicatorCollectives, SystemOperation};
    use mpi::datatype::Equivalence;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::StaticScope;
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let uni = mpi::initialize().expect("MPI initialization failed");
            let world = uni.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: uni,
                world,
                rank,
                size,
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let boxed = buf.to_vec().into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, slice, tag as i32);
            MpiSendHandle {
                req: Some(req),
                buf: raw,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, capacity: usize) -> MpiRecvHandle {
            let boxed = vec![0u8; capacity].into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice_mut: &'static mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, slice_mut, tag as i32);
            MpiRecvHandle {
                req: Some(req),
                buf: raw,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }

        fn sum_u64(&self, value: u64) -> u64 {
            let mut global = 0u64;
            self.world
                .all_reduce_into(&value, &mut global, SystemOperation::sum());
            global
        }
    }

    type ByteRequest = mpi::request::Request<'static, [u8], StaticScope>;

    pub struct MpiSendHandle {
        req: Option<ByteRequest>,
        buf: *mut [u8],
    }

    impl SendRequest for MpiSendHandle {
        fn test(&mut self) -> bool {
            match self.req.take() {
                None => true,
                Some(r) => match r.test() {
                    Ok(_status) => true,
                    Err(r) => {
                        self.req = Some(r);
                        false
                    }
                },
            }
        }

        fn wait(mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            #[cfg(debug_assertions)]
            if self.req.is_some() {
                eprintln!("[MpiSendHandle::drop] send not explicitly completed");
            }
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            unsafe { drop(Box::from_raw(self.buf)) };
        }
    }

    pub struct MpiRecvHandle {
        req: Option<ByteRequest>,
        buf: *mut [u8],
    }

    impl MpiRecvHandle {
        fn received(&self, status: &mpi::point_to_point::Status) -> Vec<u8> {
            let n = status.count(u8::equivalent_datatype()) as usize;
            let bytes: &[u8] = unsafe { &*self.buf };
            bytes[..n].to_vec()
        }
    }

    impl RecvRequest for MpiRecvHandle {
        fn test(&mut self) -> Option<Vec<u8>> {
            match self.req.take()?.test() {
                Ok(status) => Some(self.received(&status)),
                Err(r) => {
                    self.req = Some(r);
                    None
                }
            }
        }

        fn wait(mut self) -> Vec<u8> {
            let r = self.req.take().expect("receive already completed");
            let status = r.wait();
            self.received(&status)
        }
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            #[cfg(debug_assertions)]
            if self.req.is_some() {
                eprintln!("[MpiRecvHandle::drop] recv not explicitly completed");
            }
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            unsafe { drop(Box::from_raw(self.buf)) };
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

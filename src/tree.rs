//! Binary-tree reduction of completed-history counts and the
//! global-done broadcast.
//!
//! Ranks form a binary heap: counts flow up whenever a rank is locally
//! quiet, the root's accumulator climbs toward the global photon count,
//! and the done signal flows back down. Counts are sent up and then
//! zeroed so no history is counted twice; only the root never forwards.
//! One count message is in flight per link at a time.

use crate::buffer::{RecvBuffer, SendBuffer};
use crate::comm::Communicator;
use crate::constants::COUNT_TAG;
use crate::tally::MessageCounters;
use crate::transport_error::TransportError;
use crate::wire::{decode_count, encode_count};

const COUNT_BYTES: usize = 8;

struct ChildLink<C: Communicator> {
    rank: usize,
    recv: RecvBuffer<C::RecvHandle>,
    send: SendBuffer<u64, C::SendHandle>,
}

pub struct CompletionTree<C: Communicator> {
    parent: Option<usize>,
    children: Vec<ChildLink<C>>,
    n_global: u64,
    tree_count: u64,
    parent_count: u64,
    p_recv: RecvBuffer<C::RecvHandle>,
    p_send: SendBuffer<u64, C::SendHandle>,
}

/// Heap-index relatives of `rank` in an `n_rank` world.
pub fn tree_relatives(rank: usize, n_rank: usize) -> (Option<usize>, Vec<usize>) {
    let parent = if rank == 0 { None } else { Some((rank + 1) / 2 - 1) };
    let children = [2 * rank + 1, 2 * rank + 2]
        .into_iter()
        .filter(|&c| c < n_rank)
        .collect();
    (parent, children)
}

impl<C: Communicator> CompletionTree<C> {
    /// Build the per-rank tree state and post the standing receives:
    /// one per child link, one from the parent.
    pub fn new(comm: &C, n_global: u64, counters: &mut MessageCounters) -> Self {
        let (parent, child_ranks) = tree_relatives(comm.rank(), comm.size());

        let mut children = Vec::with_capacity(child_ranks.len());
        for rank in child_ranks {
            let mut recv = RecvBuffer::new();
            recv.post(comm.irecv(rank, COUNT_TAG, COUNT_BYTES));
            counters.n_receives_posted += 1;
            children.push(ChildLink {
                rank,
                recv,
                send: SendBuffer::new(),
            });
        }

        let mut p_recv = RecvBuffer::new();
        if let Some(parent) = parent {
            p_recv.post(comm.irecv(parent, COUNT_TAG, COUNT_BYTES));
            counters.n_receives_posted += 1;
        }

        Self {
            parent,
            children,
            n_global,
            tree_count: 0,
            parent_count: 0,
            p_recv,
            p_send: SendBuffer::new(),
        }
    }

    /// Service every tree link once: fold completed child counts into
    /// the accumulator (and repost), take a parent count if one arrived,
    /// and retire a finished upward send.
    pub fn service(&mut self, comm: &C, counters: &mut MessageCounters) -> Result<(), TransportError> {
        for child in &mut self.children {
            if let Some(bytes) = child.recv.test_complete() {
                counters.n_receives_completed += 1;
                self.tree_count += decode_count(&bytes)?;
                child.recv.post(comm.irecv(child.rank, COUNT_TAG, COUNT_BYTES));
                counters.n_receives_posted += 1;
            }
        }

        if let Some(bytes) = self.p_recv.test_complete() {
            counters.n_receives_completed += 1;
            self.parent_count = decode_count(&bytes)?;
        }

        if self.p_send.sent() && self.p_send.test_complete() {
            counters.n_sends_completed += 1;
        }
        Ok(())
    }

    /// Fold this rank's freshly completed histories into the
    /// accumulator, resetting the local counter.
    pub fn fold_local(&mut self, n_complete: &mut u64) {
        self.tree_count += *n_complete;
        *n_complete = 0;
    }

    /// Send the accumulator up when there is something to send, local
    /// work is quiet and the link is free; then zero it so the work is
    /// not double counted. The root keeps accumulating instead.
    pub fn maybe_send_up(&mut self, comm: &C, locally_quiet: bool, counters: &mut MessageCounters) {
        let Some(parent) = self.parent else { return };
        if self.tree_count == 0 || !locally_quiet || !self.p_send.is_empty() {
            return;
        }
        self.p_send.fill(vec![self.tree_count]);
        let bytes = encode_count(self.p_send.items()[0]);
        let handle = comm.isend(parent, COUNT_TAG, &bytes);
        self.p_send.post(handle);
        counters.n_sends_posted += 1;
        self.tree_count = 0;
    }

    /// Global-done predicate: all histories are known complete.
    pub fn finished(&self) -> bool {
        self.tree_count == self.n_global || self.parent_count == self.n_global
    }

    /// Push the done signal to each child and retire this rank's own
    /// upward send. Runs once, immediately after the main loop.
    pub fn broadcast_down(&mut self, comm: &C, counters: &mut MessageCounters) {
        for child in &mut self.children {
            child.send.fill(vec![self.n_global]);
            let bytes = encode_count(child.send.items()[0]);
            let handle = comm.isend(child.rank, COUNT_TAG, &bytes);
            child.send.post(handle);
            counters.n_sends_posted += 1;
            child.send.wait_complete();
            counters.n_sends_completed += 1;
        }

        if self.p_send.sent() {
            self.p_send.wait_complete();
            counters.n_sends_completed += 1;
        }
    }

    /// Drain the tree links after the termination barrier. The parent
    /// still has one receive posted per child; a one-element message
    /// with value 1 matches it, and the value is never interpreted.
    /// Symmetrically, wait out this rank's own posted receives: the
    /// children's drain sends and, if the done signal was not consumed
    /// inside the loop, the parent's broadcast.
    pub fn drain(&mut self, comm: &C, counters: &mut MessageCounters) {
        if let Some(parent) = self.parent {
            self.p_send.fill(vec![1]);
            let bytes = encode_count(self.p_send.items()[0]);
            let handle = comm.isend(parent, COUNT_TAG, &bytes);
            self.p_send.post(handle);
            counters.n_sends_posted += 1;
            self.p_send.wait_complete();
            counters.n_sends_completed += 1;
        }

        for child in &mut self.children {
            let _ = child.recv.wait_complete();
            counters.n_receives_completed += 1;
        }

        if self.p_recv.awaiting() {
            let _ = self.p_recv.wait_complete();
            counters.n_receives_completed += 1;
        }
    }

    #[cfg(test)]
    fn tree_count(&self) -> u64 {
        self.tree_count
    }
}

//! Single-use message slots pairing payload storage with the posted
//! handle.
//!
//! Each slot walks a strictly linear lifecycle: a send buffer goes
//! empty -> filled -> posted -> empty, a receive slot goes
//! empty -> posted -> empty. The non-blocking handle is owned by the
//! slot it decorates, so a posted-but-empty or filled-but-forgotten slot
//! is unrepresentable. Filling a slot that is still posted is a
//! precondition violation and asserts.

use crate::comm::{RecvRequest, SendRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Empty,
    Filled,
    Posted,
}

/// Outgoing message slot: payload staged by `fill`, then married to its
/// handle by `post`.
pub struct SendBuffer<T, H: SendRequest> {
    items: Vec<T>,
    handle: Option<H>,
    state: SlotState,
}

impl<T, H: SendRequest> SendBuffer<T, H> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            handle: None,
            state: SlotState::Empty,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state == SlotState::Empty
    }

    /// True while a posted send has not yet been observed complete.
    #[inline]
    pub fn sent(&self) -> bool {
        self.state == SlotState::Posted
    }

    /// Stage a payload. The slot must be empty.
    pub fn fill(&mut self, items: Vec<T>) {
        assert!(
            self.state == SlotState::Empty,
            "fill on a send buffer that is not empty"
        );
        self.items = items;
        self.state = SlotState::Filled;
    }

    /// Payload staged by `fill`, for serialization into the send call.
    pub fn items(&self) -> &[T] {
        assert!(
            self.state == SlotState::Filled,
            "items read outside the filled state"
        );
        &self.items
    }

    /// Attach the handle returned by the non-blocking send.
    pub fn post(&mut self, handle: H) {
        assert!(
            self.state == SlotState::Filled,
            "post on a send buffer that was not filled"
        );
        self.handle = Some(handle);
        self.state = SlotState::Posted;
    }

    /// Non-blocking completion test; on completion the slot returns to
    /// empty and may be refilled.
    pub fn test_complete(&mut self) -> bool {
        assert!(self.state == SlotState::Posted, "test on an unposted send");
        let done = self.handle.as_mut().expect("posted send has handle").test();
        if done {
            self.handle = None;
            self.items.clear();
            self.state = SlotState::Empty;
        }
        done
    }

    /// Block until the posted send completes.
    pub fn wait_complete(&mut self) {
        assert!(self.state == SlotState::Posted, "wait on an unposted send");
        self.handle.take().expect("posted send has handle").wait();
        self.items.clear();
        self.state = SlotState::Empty;
    }
}

impl<T, H: SendRequest> Default for SendBuffer<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Incoming message slot: exactly one posted receive at a time.
pub struct RecvBuffer<H: RecvRequest> {
    handle: Option<H>,
}

impl<H: RecvRequest> RecvBuffer<H> {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// True while a receive is outstanding.
    #[inline]
    pub fn awaiting(&self) -> bool {
        self.handle.is_some()
    }

    /// Attach the handle of a freshly posted receive.
    pub fn post(&mut self, handle: H) {
        assert!(
            self.handle.is_none(),
            "post on a receive slot that is already awaiting"
        );
        self.handle = Some(handle);
    }

    /// Non-blocking test; on delivery the slot empties and must be
    /// reposted before the next message can arrive.
    pub fn test_complete(&mut self) -> Option<Vec<u8>> {
        let msg = self.handle.as_mut()?.test();
        if msg.is_some() {
            self.handle = None;
        }
        msg
    }

    /// Block until the posted receive is matched.
    pub fn wait_complete(&mut self) -> Vec<u8> {
        self.handle
            .take()
            .expect("wait on a receive slot that was never posted")
            .wait()
    }
}

impl<H: RecvRequest> Default for RecvBuffer<H> {
    fn default() -> Self {
        Self::new()
    }
}

//! # Delivery Queue
//!
//! Bounded multi-producer / single-consumer FIFO with a **drop-oldest**
//! policy.
//!
//! ```text
//!   push(P) on a full queue:
//!
//!   [ oldest | . . . . . . . . | newest ]   ← capacity reached
//!       ↓ evicted
//!   [ . . . . . . . . | newest | P ]        ← P admitted
//! ```
//!
//! Stale positional telemetry is worse than none, so recency wins over
//! completeness. Producers never block on a full queue.

use crate::error::{TelecastError, TelecastResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An opaque, immutable message body.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Box<[u8]>);

impl Payload {
    /// The bytes to put on the wire.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for zero-length payloads.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(bytes: &[u8; N]) -> Self {
        Self(bytes.as_slice().into())
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.0.len()).finish()
    }
}

/// Outcome of a successful push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// There was room.
    Accepted,
    /// The queue was full; its oldest entry was discarded.
    DisplacedOldest,
}

/// Queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Fixed capacity.
    pub capacity: usize,
    /// Entries currently waiting.
    pub depth: usize,
    /// Payloads admitted.
    pub enqueued: u64,
    /// Payloads discarded by drop-oldest.
    pub evicted: u64,
    /// Pushes refused (closed queue, empty payload).
    pub rejected: u64,
}

struct QueueState {
    entries: VecDeque<Payload>,
    closed: bool,
}

/// Bounded drop-oldest FIFO shared by all producers and one pump.
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    /// Signalled on push and on close.
    ready: Condvar,
    capacity: usize,
    enqueued: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
}

impl DeliveryQueue {
    /// Creates an open queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "delivery queue capacity must be non-zero");
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
            enqueued: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Appends a payload, evicting the oldest entry if the queue is full.
    ///
    /// Never blocks beyond the internal lock.
    ///
    /// # Errors
    ///
    /// [`TelecastError::EmptyPayload`] for zero-length payloads,
    /// [`TelecastError::QueueClosed`] once [`close`](Self::close) was called.
    pub fn push(&self, payload: Payload) -> TelecastResult<Admission> {
        if payload.is_empty() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TelecastError::EmptyPayload);
        }

        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TelecastError::QueueClosed);
        }

        let admission = if state.entries.len() >= self.capacity {
            state.entries.pop_front();
            Admission::DisplacedOldest
        } else {
            Admission::Accepted
        };
        state.entries.push_back(payload);
        drop(state);
        self.ready.notify_one();

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        if admission == Admission::DisplacedOldest {
            let total = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!("delivery queue full, dropped oldest payload ({} dropped so far)", total);
        }

        Ok(admission)
    }

    /// Blocks until entries are available, then moves all of them into `out`
    /// in FIFO order.
    ///
    /// Returns `false` (with `out` untouched) when the queue is closed and
    /// drained, or when `cancelled` is set. Whoever sets `cancelled` must
    /// call [`wake`](Self::wake) or [`close`](Self::close) afterwards.
    pub fn wait_drain(&self, out: &mut Vec<Payload>, cancelled: &AtomicBool) -> bool {
        let mut state = self.state.lock();
        loop {
            if cancelled.load(Ordering::Acquire) {
                return false;
            }
            if !state.entries.is_empty() {
                out.extend(state.entries.drain(..));
                return true;
            }
            if state.closed {
                return false;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Moves whatever is queued right now into `out` without blocking.
    #[cfg(test)]
    fn try_drain(&self, out: &mut Vec<Payload>) -> usize {
        let mut state = self.state.lock();
        let n = state.entries.len();
        out.extend(state.entries.drain(..));
        n
    }

    /// Refuses further writes and wakes the reader.
    ///
    /// Entries already queued stay readable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Wakes the reader without changing state.
    pub fn wake(&self) {
        let _guard = self.state.lock();
        self.ready.notify_all();
    }

    /// Whether writes are refused.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Entries currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity,
            depth: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("capacity", &self.capacity)
            .field("depth", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

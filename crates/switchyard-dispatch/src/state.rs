//! Per-connection dispatch state
//!
//! The state lives in one atomic word so that a teardown from another worker
//! can race with event delivery without a lock. Every transition is a
//! compare-and-exchange: only the winner observes its own transition.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const IDLE: u64 = 0;
const DRAINING: u64 = u64::MAX - 1;
const CLOSED: u64 = u64::MAX;

/// Identifier of a segment within one dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(u64);

impl SegmentId {
    /// Id for the segment at `index` in creation order
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u64 + 1)
    }

    pub(crate) fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a connection is in its begin/content/end cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// No cycle in progress
    Idle,
    /// A cycle is forwarding to this segment
    Active(SegmentId),
    /// The current cycle failed; its remaining events are discarded
    Draining,
    /// The connection was torn down
    Closed,
}

impl DispatchPhase {
    fn encode(self) -> u64 {
        match self {
            DispatchPhase::Idle => IDLE,
            DispatchPhase::Active(id) => id.0,
            DispatchPhase::Draining => DRAINING,
            DispatchPhase::Closed => CLOSED,
        }
    }

    fn decode(raw: u64) -> Self {
        match raw {
            IDLE => DispatchPhase::Idle,
            DRAINING => DispatchPhase::Draining,
            CLOSED => DispatchPhase::Closed,
            id => DispatchPhase::Active(SegmentId(id)),
        }
    }
}

/// Atomic holder of a connection's [`DispatchPhase`]
#[derive(Debug)]
pub struct ActiveDispatchState {
    phase: AtomicU64,
}

impl ActiveDispatchState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU64::new(IDLE),
        }
    }

    pub fn load(&self) -> DispatchPhase {
        DispatchPhase::decode(self.phase.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. On failure returns the phase actually found.
    pub fn transition(&self, from: DispatchPhase, to: DispatchPhase) -> Result<(), DispatchPhase> {
        self.phase
            .compare_exchange(from.encode(), to.encode(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(DispatchPhase::decode)
    }

    /// Close unconditionally, returning the phase that was replaced
    pub fn close(&self) -> DispatchPhase {
        DispatchPhase::decode(self.phase.swap(CLOSED, Ordering::AcqRel))
    }

    pub fn is_closed(&self) -> bool {
        self.load() == DispatchPhase::Closed
    }
}

impl Default for ActiveDispatchState {
    fn default() -> Self {
        Self::new()
    }
}

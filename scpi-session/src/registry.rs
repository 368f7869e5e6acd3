//! Logical connection registry
//!
//! Tracks the logical connection handles multiplexed over the single
//! physical link: id minting and pooled reuse, the FIFO turn order that
//! serializes exchanges, and the verdicts that tell the link owner when the
//! socket must be opened or torn down.
//!
//! The registry itself performs no I/O. The transport façade mutates it
//! under one lock and executes its verdicts against the physical link under
//! that same lock, so open/close races cannot occur.

use scpi_core::{Handle, ScpiError, ScpiResult};
use std::collections::VecDeque;

/// Lifecycle state of a logical connection id
///
/// # State Transitions
/// ```text
/// Created -> Active  (on acquire)
/// Active  -> Free    (on release with pooling)
/// Free    -> Active  (on acquire with reuse)
/// Active  -> Closed  (on release without pooling)
/// Free    -> Closed  (on close)
/// ```
/// `Closed` is terminal; a closed id is never revived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Outstanding: the handle is in the FIFO and may hold the turn
    Active,
    /// Pooled for reuse: the id is retained, the physical link stays warm
    Free,
    /// Discarded: the id will never be handed out again
    Closed,
}

/// Verdict returned by [`ConnectionRegistry::release`]
///
/// The registry, not any single caller, owns teardown of the physical
/// link; the façade executes this verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Both the active FIFO and the free pool are now empty; the physical
    /// link must be closed.
    pub close_link: bool,
    /// The released handle held the turn; it moved to the next handle in
    /// FIFO order (or went idle).
    pub turn_advanced: bool,
}

#[derive(Debug)]
struct ActiveEntry {
    handle: Handle,
    keep_open: bool,
}

/// Registry of logical connections sharing one physical link
///
/// Invariants:
/// - `turn` is `None` or a member of the active FIFO;
/// - ids are minted from a strictly increasing counter and never change
///   logical meaning;
/// - the free pool and the active FIFO are disjoint.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: u32,
    active: VecDeque<ActiveEntry>,
    free: Vec<Handle>,
    turn: Option<Handle>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a logical connection handle
    ///
    /// Reuses `reuse` iff that id is currently pooled; any other request
    /// (no id, an unknown id, an id that is already active) mints a fresh
    /// id greater than every id handed out before. The handle enters the
    /// FIFO at the current tail — a reused id does not get its original
    /// position back. The first handle to arrive while the link is idle
    /// takes the turn immediately.
    pub fn acquire(&mut self, reuse: Option<Handle>) -> Handle {
        let handle = match reuse {
            Some(h) if self.take_pooled(h) => {
                log::debug!("handle {} reused from pool", h);
                h
            }
            _ => {
                self.next_id += 1;
                let h = Handle::new(self.next_id).expect("id counter wrapped");
                log::debug!("handle {} minted", h);
                h
            }
        };

        self.active.push_back(ActiveEntry {
            handle,
            keep_open: false,
        });
        if self.turn.is_none() {
            self.turn = Some(handle);
        }
        handle
    }

    fn take_pooled(&mut self, handle: Handle) -> bool {
        match self.free.iter().position(|&f| f == handle) {
            Some(pos) => {
                self.free.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Release a handle
    ///
    /// Removes the id from the active FIFO (or from the free pool for an
    /// id that was never reactivated). With `pool` the id is retained for
    /// later reuse, otherwise it is discarded permanently. When the
    /// released handle held the turn, the turn advances to the head of the
    /// FIFO or goes idle.
    pub fn release(&mut self, handle: Handle, pool: bool) -> ScpiResult<ReleaseOutcome> {
        if let Some(pos) = self.active.iter().position(|e| e.handle == handle) {
            self.active.remove(pos);
            if pool {
                self.free.push(handle);
            }
        } else if self.take_pooled(handle) {
            if pool {
                self.free.push(handle);
            }
        } else {
            return Err(ScpiError::UnknownHandle(handle.get()));
        }

        let mut turn_advanced = false;
        if self.turn == Some(handle) {
            self.turn = self.active.front().map(|e| e.handle);
            turn_advanced = true;
            log::debug!(
                "turn passed from {} to {:?}",
                handle,
                self.turn.map(|h| h.get())
            );
        }

        let close_link = self.is_empty();
        if close_link {
            log::debug!("last handle {} gone, link teardown due", handle);
        }
        Ok(ReleaseOutcome {
            close_link,
            turn_advanced,
        })
    }

    /// Mark whether a handle survives its paired read as a pooled id
    pub fn set_keep_open(&mut self, handle: Handle, keep_open: bool) -> ScpiResult<()> {
        self.active
            .iter_mut()
            .find(|e| e.handle == handle)
            .map(|e| e.keep_open = keep_open)
            .ok_or(ScpiError::UnknownHandle(handle.get()))
    }

    /// Whether a handle was marked to survive its paired read
    pub fn keep_open(&self, handle: Handle) -> bool {
        self.active
            .iter()
            .any(|e| e.handle == handle && e.keep_open)
    }

    /// The handle currently permitted to use the physical link
    pub fn turn(&self) -> Option<Handle> {
        self.turn
    }

    /// Whether the handle is outstanding
    pub fn is_active(&self, handle: Handle) -> bool {
        self.active.iter().any(|e| e.handle == handle)
    }

    /// Whether the id sits in the free pool
    pub fn is_pooled(&self, handle: Handle) -> bool {
        self.free.contains(&handle)
    }

    /// Whether no handle is outstanding or pooled
    ///
    /// The physical link must be open exactly when this is false.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.free.is_empty()
    }

    /// Lifecycle state of an id
    pub fn state_of(&self, handle: Handle) -> ConnectionState {
        if self.is_active(handle) {
            ConnectionState::Active
        } else if self.is_pooled(handle) {
            ConnectionState::Free
        } else {
            ConnectionState::Closed
        }
    }
}

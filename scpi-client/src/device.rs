//! The transport façade
//!
//! # Architecture
//!
//! One [`ScpiDevice`] owns one physical link and the registry of logical
//! connection handles multiplexed over it. Any number of tasks may call
//! the façade concurrently; all link I/O is serialized by the turn, which
//! moves between active handles in strict FIFO acquire order.
//!
//! # Exchange Lifecycle
//!
//! 1. `send` resolves a handle (acquiring one if needed — this lazily
//!    opens the link), waits for the turn and writes the command;
//! 2. `read_text` / `read_raw` decode the paired reply and then release
//!    the handle: pooled when it was sent with `keep_open`, discarded
//!    otherwise;
//! 3. releasing the last outstanding or pooled handle tears the link down.
//!
//! The composed `query*` operations run both halves under one handle and
//! one turn, so no other handle's traffic can interleave between a write
//! and its paired reply.
//!
//! # Starvation
//!
//! The turn wait is unbounded by default: a handle that takes the turn
//! and never completes its exchange (a crashed caller, an instrument that
//! never replies and a generous read timeout) blocks every other handle.
//! [`DeviceBuilder::turn_timeout`](crate::DeviceBuilder::turn_timeout)
//! bounds the wait with a [`ScpiError::TurnTimeout`] failure instead.

use scpi_core::{Handle, ScpiError, ScpiResult};
use scpi_session::framing;
use scpi_session::registry::{ConnectionRegistry, ConnectionState};
use scpi_transport::{PhysicalLink, TcpLink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, watch};

/// Cap on an accumulated text-line reply
const MAX_LINE_LEN: usize = 4096;

struct Inner<L> {
    registry: ConnectionRegistry,
    link: L,
}

struct Shared<L> {
    inner: Mutex<Inner<L>>,
    /// Publishes the registry's turn; waiters block here instead of polling
    turn_tx: watch::Sender<Option<Handle>>,
    turn_timeout: Option<Duration>,
}

/// Shared-link transport to one instrument
///
/// Cheap to clone; clones share the link, the registry and the turn.
pub struct ScpiDevice<L: PhysicalLink = TcpLink> {
    shared: Arc<Shared<L>>,
}

impl<L: PhysicalLink> Clone for ScpiDevice<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ScpiDevice<TcpLink> {
    /// Create a device over a TCP link; the socket opens lazily on first use
    pub fn new(config: scpi_transport::LinkConfig) -> Self {
        Self::from_parts(TcpLink::new(config), None)
    }

    /// Start building a device with non-default settings
    pub fn builder(host: impl Into<String>, port: u16) -> crate::DeviceBuilder {
        crate::DeviceBuilder::new(host, port)
    }
}

impl<L: PhysicalLink> ScpiDevice<L> {
    /// Create a device over an already-constructed link
    pub fn with_link(link: L) -> Self {
        Self::from_parts(link, None)
    }

    pub(crate) fn from_parts(link: L, turn_timeout: Option<Duration>) -> Self {
        let (turn_tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    registry: ConnectionRegistry::new(),
                    link,
                }),
                turn_tx,
                turn_timeout,
            }),
        }
    }

    /// Send a command under a fresh auto-acquired handle
    ///
    /// Returns the handle for chaining into the paired read. See
    /// [`send_with`](Self::send_with).
    pub async fn send(&self, command: &str) -> ScpiResult<Handle> {
        self.send_with(command, None, false).await
    }

    /// Send a command
    ///
    /// Resolves the handle first: an already-active handle is used as-is,
    /// a pooled id is reactivated, anything else (including `None`) mints
    /// a fresh id at the tail of the FIFO. Acquisition opens the physical
    /// link when it is the first handle in. The command is written once
    /// the handle's turn comes around.
    ///
    /// The handle stays active — and keeps the turn — until the paired
    /// `read_text`/`read_raw` or an explicit [`release`](Self::release).
    /// With `keep_open` the paired read parks the id in the free pool
    /// (link stays warm, id reusable) instead of discarding it.
    pub async fn send_with(
        &self,
        command: &str,
        handle: Option<Handle>,
        keep_open: bool,
    ) -> ScpiResult<Handle> {
        let handle = {
            let mut inner = self.shared.inner.lock().await;
            let h = match handle {
                Some(h) if inner.registry.is_active(h) => h,
                other => {
                    // First handle in opens the link; a connect failure
                    // aborts acquisition without touching registry state.
                    inner.link.open().await?;
                    inner.registry.acquire(other)
                }
            };
            inner.registry.set_keep_open(h, keep_open)?;
            self.publish_turn(&inner);
            h
        };

        let mut inner = self.hold_turn(handle).await?;

        // Another handle's failed exchange may have torn the socket down
        // while this one was queued; connecting is not required before
        // sending, so reopen in place.
        if let Err(e) = inner.link.open().await {
            self.discard(&mut inner, handle).await;
            return Err(e);
        }

        let wire = framing::encode_command(command, inner.link.terminator());
        let written = match inner.link.write_all(&wire).await {
            Ok(()) => inner.link.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // The exchange is in an unknown state; the handle is done.
            self.discard(&mut inner, handle).await;
            return Err(e);
        }
        log::trace!("handle {} wrote {} bytes", handle, wire.len());
        Ok(handle)
    }

    /// Read the paired text-line reply and complete the exchange
    ///
    /// Strips exactly one trailing terminator. An empty string is a
    /// legitimate reply (the instrument sent just the terminator);
    /// a window with no data at all is [`ScpiError::ReadTimeout`]. The
    /// handle is released afterwards: pooled when sent with `keep_open`
    /// and the read succeeded, discarded otherwise.
    pub async fn read_text(&self, handle: Handle) -> ScpiResult<String> {
        let mut inner = self.hold_turn(handle).await?;
        let terminator = inner.link.terminator().to_vec();
        let result = framing::read_line(&mut inner.link, MAX_LINE_LEN, &terminator).await;
        self.finish_exchange(&mut inner, handle, result.is_ok()).await;
        result
    }

    /// Read the paired raw reply and complete the exchange
    ///
    /// A reply opening with `#` is decoded as a definite-length binary
    /// block (reassembled across partial reads, trailing terminator byte
    /// stripped); anything else is returned as one receive delivers it.
    /// `max_chunk` bounds a single receive, not the block length.
    pub async fn read_raw(&self, handle: Handle, max_chunk: usize) -> ScpiResult<Vec<u8>> {
        let mut inner = self.hold_turn(handle).await?;
        let result = framing::read_reply(&mut inner.link, max_chunk).await;
        self.finish_exchange(&mut inner, handle, result.is_ok()).await;
        result
    }

    /// Send and read the text reply under one handle and one turn
    pub async fn query(&self, command: &str) -> ScpiResult<String> {
        self.query_with(command, None, false).await
    }

    /// Send and read the text reply, controlling handle reuse and pooling
    pub async fn query_with(
        &self,
        command: &str,
        handle: Option<Handle>,
        keep_open: bool,
    ) -> ScpiResult<String> {
        let handle = self.send_with(command, handle, keep_open).await?;
        self.read_text(handle).await
    }

    /// Send and read the raw/block reply under one handle and one turn
    pub async fn query_raw(&self, command: &str, max_chunk: usize) -> ScpiResult<Vec<u8>> {
        let handle = self.send(command).await?;
        self.read_raw(handle, max_chunk).await
    }

    /// Fire-and-forget command: send, then release the handle immediately
    ///
    /// For set-commands the instrument does not answer. The write still
    /// waits its FIFO turn.
    pub async fn write(&self, command: &str) -> ScpiResult<()> {
        let handle = self.send(command).await?;
        self.release(handle, false).await
    }

    /// Release a handle outside the paired-read path
    ///
    /// With `pool` the id parks in the free pool for later reuse;
    /// otherwise it is discarded permanently. Releasing the last
    /// outstanding or pooled handle closes the physical link.
    pub async fn release(&self, handle: Handle, pool: bool) -> ScpiResult<()> {
        let mut inner = self.shared.inner.lock().await;
        let outcome = inner.registry.release(handle, pool)?;
        self.publish_turn(&inner);
        if outcome.close_link {
            inner.link.close().await;
        }
        Ok(())
    }

    /// Destroy an id for good (`Free`/`Active` → `Closed`)
    pub async fn close(&self, handle: Handle) -> ScpiResult<()> {
        self.release(handle, false).await
    }

    /// Whether the physical link is currently open
    ///
    /// Open exactly while at least one handle is outstanding or pooled.
    pub async fn is_link_open(&self) -> bool {
        self.shared.inner.lock().await.link.is_open()
    }

    /// Lifecycle state of an id
    pub async fn state_of(&self, handle: Handle) -> ConnectionState {
        self.shared.inner.lock().await.registry.state_of(handle)
    }

    /// Block until the handle holds the turn, then return the lock
    ///
    /// The guard covers the whole I/O step, so registry state and link
    /// cannot shift under an exchange. Waiters park on the turn watch
    /// channel; there is no polling.
    async fn hold_turn(&self, handle: Handle) -> ScpiResult<MutexGuard<'_, Inner<L>>> {
        let mut rx = self.shared.turn_tx.subscribe();
        let wait = async {
            loop {
                {
                    let inner = self.shared.inner.lock().await;
                    if !inner.registry.is_active(handle) {
                        return Err(ScpiError::UnknownHandle(handle.get()));
                    }
                    if inner.registry.turn() == Some(handle) {
                        return Ok(inner);
                    }
                }
                rx.wait_for(|turn| *turn == Some(handle))
                    .await
                    .map_err(|_| ScpiError::NotConnected)?;
            }
        };

        match self.shared.turn_timeout {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    // Un-queue the handle so the stuck spot is not
                    // inherited by whoever is next.
                    let mut inner = self.shared.inner.lock().await;
                    self.discard(&mut inner, handle).await;
                    Err(ScpiError::TurnTimeout)
                }
            },
        }
    }

    /// Release after a paired read: pooled on success iff marked keep-open
    async fn finish_exchange(&self, inner: &mut Inner<L>, handle: Handle, ok: bool) {
        let pool = ok && inner.registry.keep_open(handle);
        if let Ok(outcome) = inner.registry.release(handle, pool) {
            self.publish_turn(inner);
            if outcome.close_link {
                inner.link.close().await;
            }
        }
    }

    /// Discard a handle whose exchange failed; never pooled
    async fn discard(&self, inner: &mut Inner<L>, handle: Handle) {
        if let Ok(outcome) = inner.registry.release(handle, false) {
            self.publish_turn(inner);
            if outcome.close_link {
                inner.link.close().await;
            }
        }
    }

    fn publish_turn(&self, inner: &Inner<L>) {
        self.shared.turn_tx.send_replace(inner.registry.turn());
    }
}

//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Connection registry
//!
//! The registry is the only structure shared between connection tasks. It maps
//! each live [`ConnectionId`] to a [`PeerHandle`], which the hub uses to queue
//! lines for that peer and to disconnect it. Enumeration works on a snapshot of
//! the handles, so no registry lock is held while callers act on them.

use crate::{
    Connection, ConnectionId, ConnectionInfo, ConnectionState, ConnectionStats, DisconnectReason,
    RelayError, Result,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use linecast_codec::Line;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The registry's view of one live connection
///
/// Cloning is cheap. The handle does not own the socket; the connection's
/// worker does. Disconnecting through a handle cancels the worker, which then
/// releases the socket and deregisters itself.
#[derive(Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    peer_addr: SocketAddr,
    created_at: Instant,
    outbound: mpsc::Sender<Line>,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
    stats: Arc<ConnectionStats>,
    close_reason: Arc<OnceLock<DisconnectReason>>,
}

impl PeerHandle {
    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        // States only move forward.
        self.state.fetch_max(state.as_u8(), Ordering::AcqRel);
    }

    /// Check if the connection can still take deliveries
    pub fn is_live(&self) -> bool {
        !self.state().is_terminal() && !self.cancel.is_cancelled()
    }

    /// Get the shared traffic counters
    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.stats.clone()
    }

    /// Queue a line for this peer without waiting
    pub(crate) fn try_deliver(&self, line: Line) -> std::result::Result<(), TrySendError<Line>> {
        self.outbound.try_send(line)
    }

    /// Ask the connection's worker to close it
    ///
    /// Returns `true` if this call decided the reason; later calls only repeat
    /// the cancellation.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        let first = self.close_reason.set(reason).is_ok();
        self.set_state(ConnectionState::Closing);
        self.cancel.cancel();
        first
    }

    /// Get the reason recorded by the first [`disconnect`](Self::disconnect)
    pub fn close_reason(&self) -> Option<DisconnectReason> {
        self.close_reason.get().cloned()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Get a connection info snapshot
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state(),
            peer_addr: self.peer_addr,
            created_at: self.created_at,
            lines_sent: self.stats.lines_sent(),
            lines_received: self.stats.lines_received(),
        }
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &format_args!("{}", self.id))
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// What the owning task keeps after registering a connection
#[derive(Debug)]
pub struct Registration {
    handle: PeerHandle,
    outbound: mpsc::Receiver<Line>,
}

impl Registration {
    /// Get the registered connection ID
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// Get the handle stored in the registry
    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    /// Split into the handle and the receive side of the outbound queue
    pub fn into_parts(self) -> (PeerHandle, mpsc::Receiver<Line>) {
        (self.handle, self.outbound)
    }
}

/// Concurrent map of live connections
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, PeerHandle>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next connection ID
    ///
    /// IDs start at 1 and are never reused.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a connection with an outbound queue of `queue_size` lines
    ///
    /// Fails with [`RelayError::DuplicateConnection`] if the ID is already present.
    pub fn register(&self, connection: &Connection, queue_size: usize) -> Result<Registration> {
        self.insert(
            connection.id(),
            connection.peer_addr(),
            connection.stats(),
            queue_size,
        )
    }

    pub(crate) fn insert(
        &self,
        id: ConnectionId,
        peer_addr: SocketAddr,
        stats: Arc<ConnectionStats>,
        queue_size: usize,
    ) -> Result<Registration> {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let handle = PeerHandle {
            id,
            peer_addr,
            created_at: Instant::now(),
            outbound: tx,
            cancel: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8())),
            stats,
            close_reason: Arc::new(OnceLock::new()),
        };

        match self.connections.entry(id) {
            Entry::Occupied(_) => return Err(RelayError::DuplicateConnection(id)),
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
            }
        }
        debug!(connection_id = %id, peer_addr = %peer_addr, "Registered connection");

        Ok(Registration {
            handle,
            outbound: rx,
        })
    }

    /// Remove a connection
    ///
    /// Returns `true` only for the call that actually removed the entry.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "Deregistered connection");
        }
        removed
    }

    /// Get the handle for a connection
    pub fn get(&self, id: ConnectionId) -> Option<PeerHandle> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Check if a connection is registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Get the number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connections are registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get all registered IDs in ascending order
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Get info snapshots for all registered connections
    pub fn infos(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_unstable_by_key(|info| info.id);
        infos
    }

    /// Apply `f` to every live connection other than `except`
    ///
    /// The handles are copied out first, so `f` runs with no registry lock held
    /// and may register, deregister or disconnect freely. Connections that are
    /// closing are skipped.
    pub fn for_each_except<F>(&self, except: ConnectionId, f: F)
    where
        F: FnMut(&PeerHandle),
    {
        self.visit(Some(except), f)
    }

    /// Apply `f` to every live connection
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&PeerHandle),
    {
        self.visit(None, f)
    }

    fn visit<F>(&self, except: Option<ConnectionId>, mut f: F)
    where
        F: FnMut(&PeerHandle),
    {
        let handles: Vec<PeerHandle> = self
            .connections
            .iter()
            .filter(|entry| Some(*entry.key()) != except)
            .map(|entry| entry.value().clone())
            .collect();

        for handle in handles.iter().filter(|handle| handle.is_live()) {
            f(handle);
        }
        trace!(visited = handles.len(), "Visited registry snapshot");
    }

    /// Disconnect every registered connection with `reason`
    ///
    /// Entries are removed by their workers as they finish.
    pub fn close_all(&self, reason: DisconnectReason) -> usize {
        let mut count = 0;
        self.for_each(|handle| {
            handle.disconnect(reason.clone());
            count += 1;
        });
        count
    }
}

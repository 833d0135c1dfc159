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

//! Core types for the relay service

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Unique identifier for a connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state (stored as atomic u8 for lock-free state management)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Connection is registered but its worker has not started
    Connecting = 0,
    /// Connection is active and relaying lines
    Active = 1,
    /// Connection is closing (cleanup in progress)
    Closing = 2,
    /// Connection is closed
    Closed = 3,
}

impl ConnectionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the connection is in a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Listener loop state
///
/// `Idle → Listening → (Accepting ⇄ Listening) → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    /// Constructed, not yet bound
    Idle = 0,
    /// Bound and waiting for the next connection
    Listening = 1,
    /// Handing an accepted socket to its worker
    Accepting = 2,
    /// Shut down, or failed to bind
    Stopped = 3,
}

impl ListenerState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Listening,
            2 => Self::Accepting,
            _ => Self::Stopped,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the listener is bound and serving
    pub fn is_running(self) -> bool {
        matches!(self, Self::Listening | Self::Accepting)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Accepting => write!(f, "accepting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed its end of the stream
    PeerClosed,
    /// The server is shutting down
    ServerShutdown,
    /// The outbound queue was full when a broadcast arrived
    SlowConsumer,
    /// Closed on request through the hub
    Kicked,
    /// A write did not finish within the configured timeout
    WriteTimeout,
    /// An I/O or framing error ended the connection
    Error(String),
}

impl DisconnectReason {
    /// Check if this is an orderly close that should not be reported as a failure
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::PeerClosed | Self::ServerShutdown | Self::Kicked)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::ServerShutdown => write!(f, "server shutdown"),
            Self::SlowConsumer => write!(f, "slow consumer"),
            Self::Kicked => write!(f, "kicked"),
            Self::WriteTimeout => write!(f, "write timeout"),
            Self::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Per-connection traffic counters, shared between the worker and the registry
#[derive(Debug, Default)]
pub struct ConnectionStats {
    lines_sent: AtomicU64,
    lines_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl ConnectionStats {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64 + 1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64 + 1, Ordering::Relaxed);
    }

    /// Lines written to the peer
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent.load(Ordering::Relaxed)
    }

    /// Lines decoded from the peer
    pub fn lines_received(&self) -> u64 {
        self.lines_received.load(Ordering::Relaxed)
    }

    /// Bytes written to the peer, delimiters included
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Bytes decoded from the peer, delimiters included
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

/// Connection information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Current state
    pub state: ConnectionState,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the connection was created
    pub created_at: Instant,
    /// Total lines sent
    pub lines_sent: u64,
    /// Total lines received
    pub lines_received: u64,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Listener state
    pub state: ListenerState,
    /// Number of registered connections
    pub active_connections: usize,
    /// Total connections since server start
    pub total_connections: u64,
    /// Bound address, once listening
    pub local_addr: Option<SocketAddr>,
    /// Server uptime
    pub uptime: Duration,
    /// Server start time
    pub started_at: Instant,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self
            .local_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unbound".to_string());
        write!(
            f,
            "RelayServer {{ state: {}, active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.state, self.active_connections, self.total_connections, addr, self.uptime
        )
    }
}

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

//! Lock-free metrics for the relay server

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Every update is mirrored to the `metrics` facade so an
/// installed recorder sees the same numbers. Use the `snapshot()` method to
/// get a view of all counters at a point in time.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,

    // Traffic
    lines_received: AtomicU64,
    lines_delivered: AtomicU64,
    deliveries_dropped: AtomicU64,

    // Errors
    slow_consumers: AtomicU64,
    codec_errors: AtomicU64,
    connection_errors: AtomicU64,
    accept_errors: AtomicU64,

    // Timing (stored as nanoseconds)
    closed_connections: AtomicU64,
    total_connection_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            lines_delivered: AtomicU64::new(0),
            deliveries_dropped: AtomicU64::new(0),
            slow_consumers: AtomicU64::new(0),
            codec_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a new connection being registered
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.connections.opened").increment(1);
        gauge!("linecast.server.connections.registered").increment(1.0);
    }

    /// Record a connection being deregistered
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        counter!("linecast.server.connections.closed").increment(1);
        gauge!("linecast.server.connections.registered").decrement(1.0);
    }

    /// Record a connection refused because the server was full
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.connections.rejected").increment(1);
    }

    /// Get the current number of registered connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Traffic tracking

    /// Record a line decoded from a peer
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.lines.received").increment(1);
    }

    /// Record lines queued for recipients
    pub fn lines_delivered(&self, count: u64) {
        self.lines_delivered.fetch_add(count, Ordering::Relaxed);
        counter!("linecast.server.lines.delivered").increment(count);
    }

    /// Record lines that could not be queued because the recipient was gone
    pub fn deliveries_dropped(&self, count: u64) {
        self.deliveries_dropped.fetch_add(count, Ordering::Relaxed);
        counter!("linecast.server.lines.dropped").increment(count);
    }

    // Error tracking

    /// Record a recipient disconnected for a full outbound queue
    pub fn slow_consumer(&self) {
        self.slow_consumers.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.errors.slow_consumer").increment(1);
    }

    /// Record a framing violation
    pub fn codec_error(&self) {
        self.codec_errors.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.errors.codec").increment(1);
    }

    /// Record an unexpected connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.errors.connection").increment(1);
    }

    /// Record a failed accept
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("linecast.server.errors.accept").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Counters are read one at a time, so a snapshot taken under load may mix
    /// values from slightly different instants.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_delivered: self.lines_delivered.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            slow_consumers: self.slow_consumers.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Currently registered connections
    pub active_connections: u64,
    /// Connections refused at the connection limit
    pub rejected_connections: u64,
    /// Lines decoded from all peers
    pub lines_received: u64,
    /// Lines queued for recipients
    pub lines_delivered: u64,
    /// Lines addressed to recipients that had already gone
    pub deliveries_dropped: u64,
    /// Recipients disconnected for a full outbound queue
    pub slow_consumers: u64,
    /// Framing violations
    pub codec_errors: u64,
    /// Unexpected read or write failures
    pub connection_errors: u64,
    /// Failed accepts
    pub accept_errors: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average lifetime of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate lines received per second
    pub fn lines_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.lines_received as f64 / self.uptime.as_secs_f64()
    }

    /// Average number of recipients per received line
    pub fn fan_out(&self) -> f64 {
        if self.lines_received == 0 {
            return 0.0;
        }
        self.lines_delivered as f64 / self.lines_received as f64
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.slow_consumers + self.codec_errors + self.connection_errors + self.accept_errors
    }
}

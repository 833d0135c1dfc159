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

//! Broadcast hub
//!
//! Fans each received line out to the other registered connections. Delivery
//! only enqueues onto each recipient's bounded outbound queue, so the hub never
//! waits on a socket:
//!
//! - a full queue marks the recipient as a slow consumer and disconnects it
//! - a closed queue means the recipient is already going away and is skipped
//!
//! Each sender's worker broadcasts its lines one after another and every
//! outbound queue is FIFO, so a recipient sees one sender's lines in the order
//! they were sent. No order is imposed across different senders.

use crate::{ConnectionId, ConnectionRegistry, DisconnectReason, RelayError, Result, ServerMetrics};
use linecast_codec::Line;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

/// Who receives a broadcast line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    /// Every live connection except the sender
    #[default]
    ExcludeSender,
    /// Every live connection, the sender included
    IncludeSender,
}

/// A line together with the connection it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Originating connection
    pub origin: ConnectionId,
    /// Payload
    pub line: Line,
}

impl Message {
    /// Create a new message
    pub fn new(origin: ConnectionId, line: Line) -> Self {
        Self { origin, line }
    }
}

/// Result of a broadcast operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Number of recipients attempted
    pub total: usize,
    /// Lines queued successfully
    pub delivered: usize,
    /// Recipients whose queue had already closed
    pub dropped: usize,
    /// Recipients disconnected as slow consumers
    pub disconnected: Vec<ConnectionId>,
}

impl BroadcastResult {
    /// Check if every recipient got the line
    pub fn all_delivered(&self) -> bool {
        self.delivered == self.total
    }
}

/// Routes lines between registered connections
#[derive(Debug)]
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
    policy: BroadcastPolicy,
}

impl BroadcastHub {
    /// Create a hub over `registry`
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<ServerMetrics>,
        policy: BroadcastPolicy,
    ) -> Self {
        Self {
            registry,
            metrics,
            policy,
        }
    }

    /// Get the broadcast policy
    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    /// Get the registry this hub delivers to
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `message` to its recipients under the configured policy
    pub fn broadcast(&self, message: &Message) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        let mut deliver = |handle: &crate::PeerHandle| {
            result.total += 1;
            match handle.try_deliver(message.line.clone()) {
                Ok(()) => result.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    if handle.disconnect(DisconnectReason::SlowConsumer) {
                        warn!(
                            connection_id = %handle.id(),
                            origin = %message.origin,
                            "Outbound queue full, disconnecting slow consumer"
                        );
                        self.metrics.slow_consumer();
                    }
                    result.disconnected.push(handle.id());
                }
                Err(TrySendError::Closed(_)) => result.dropped += 1,
            }
        };

        match self.policy {
            BroadcastPolicy::ExcludeSender => {
                self.registry.for_each_except(message.origin, &mut deliver)
            }
            BroadcastPolicy::IncludeSender => self.registry.for_each(&mut deliver),
        }

        self.record(&result);
        trace!(
            origin = %message.origin,
            total = result.total,
            delivered = result.delivered,
            "Broadcast complete"
        );
        result
    }

    /// Deliver `line` to every live connection, regardless of policy
    pub fn broadcast_all(&self, line: &Line) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        self.registry.for_each(|handle| {
            result.total += 1;
            match handle.try_deliver(line.clone()) {
                Ok(()) => result.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    if handle.disconnect(DisconnectReason::SlowConsumer) {
                        self.metrics.slow_consumer();
                    }
                    result.disconnected.push(handle.id());
                }
                Err(TrySendError::Closed(_)) => result.dropped += 1,
            }
        });
        self.record(&result);
        result
    }

    /// Queue `line` for a single connection
    pub fn send_to(&self, id: ConnectionId, line: Line) -> Result<()> {
        let handle = self
            .registry
            .get(id)
            .ok_or(RelayError::ConnectionNotFound(id))?;
        if !handle.is_live() {
            return Err(RelayError::ConnectionClosed);
        }
        match handle.try_deliver(line) {
            Ok(()) => {
                self.metrics.lines_delivered(1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                if handle.disconnect(DisconnectReason::SlowConsumer) {
                    self.metrics.slow_consumer();
                }
                Err(RelayError::ConnectionClosed)
            }
            Err(TrySendError::Closed(_)) => Err(RelayError::ConnectionClosed),
        }
    }

    /// Disconnect a single connection
    pub fn kick(&self, id: ConnectionId) -> Result<()> {
        let handle = self
            .registry
            .get(id)
            .ok_or(RelayError::ConnectionNotFound(id))?;
        handle.disconnect(DisconnectReason::Kicked);
        debug!(connection_id = %id, "Connection kicked");
        Ok(())
    }

    fn record(&self, result: &BroadcastResult) {
        if result.delivered > 0 {
            self.metrics.lines_delivered(result.delivered as u64);
        }
        if result.dropped > 0 {
            self.metrics.deliveries_dropped(result.dropped as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionState, Registration};
    use std::net::SocketAddr;

    fn setup(policy: BroadcastPolicy) -> (Arc<ConnectionRegistry>, BroadcastHub) {
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = BroadcastHub::new(registry.clone(), Arc::new(ServerMetrics::new()), policy);
        (registry, hub)
    }

    fn add(registry: &ConnectionRegistry, queue_size: usize) -> Registration {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        registry
            .insert(registry.next_id(), addr, Arc::default(), queue_size)
            .unwrap()
    }

    fn line(text: &str) -> Line {
        Line::new(text.to_string()).unwrap()
    }

    #[test]
    fn test_sender_is_excluded_by_default() {
        let (registry, hub) = setup(BroadcastPolicy::default());
        let (a, mut a_rx) = add(&registry, 4).into_parts();
        let (_b, mut b_rx) = add(&registry, 4).into_parts();

        let result = hub.broadcast(&Message::new(a.id(), line("hi")));

        assert_eq!(result.total, 1);
        assert!(result.all_delivered());
        assert_eq!(b_rx.try_recv().unwrap(), line("hi"));
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_include_sender_policy() {
        let (registry, hub) = setup(BroadcastPolicy::IncludeSender);
        let (a, mut a_rx) = add(&registry, 4).into_parts();
        let (_b, mut b_rx) = add(&registry, 4).into_parts();

        let result = hub.broadcast(&Message::new(a.id(), line("hi")));

        assert_eq!(result.delivered, 2);
        assert_eq!(a_rx.try_recv().unwrap(), line("hi"));
        assert_eq!(b_rx.try_recv().unwrap(), line("hi"));
    }

    #[test]
    fn test_order_is_preserved_per_sender() {
        let (registry, hub) = setup(BroadcastPolicy::default());
        let (a, _a_rx) = add(&registry, 16).into_parts();
        let (_b, mut b_rx) = add(&registry, 16).into_parts();

        for text in ["a", "b", "c"] {
            hub.broadcast(&Message::new(a.id(), line(text)));
        }

        let received: Vec<_> = std::iter::from_fn(|| b_rx.try_recv().ok()).collect();
        assert_eq!(received, vec![line("a"), line("b"), line("c")]);
    }

    #[test]
    fn test_slow_consumer_is_disconnected_without_blocking_others() {
        let (registry, hub) = setup(BroadcastPolicy::default());
        let (a, _a_rx) = add(&registry, 4).into_parts();
        let (slow, _slow_rx) = add(&registry, 1).into_parts();
        let (_fast, mut fast_rx) = add(&registry, 4).into_parts();

        hub.broadcast(&Message::new(a.id(), line("1")));
        let result = hub.broadcast(&Message::new(a.id(), line("2")));

        assert_eq!(result.disconnected, vec![slow.id()]);
        assert_eq!(result.delivered, 1);
        assert_eq!(slow.close_reason(), Some(DisconnectReason::SlowConsumer));
        assert_eq!(slow.state(), ConnectionState::Closing);
        assert_eq!(fast_rx.try_recv().unwrap(), line("1"));
        assert_eq!(fast_rx.try_recv().unwrap(), line("2"));

        // Disconnected recipients no longer take part
        let result = hub.broadcast(&Message::new(a.id(), line("3")));
        assert_eq!(result.total, 1);
    }

    #[test]
    fn test_closed_recipient_is_skipped() {
        let (registry, hub) = setup(BroadcastPolicy::default());
        let (a, _a_rx) = add(&registry, 4).into_parts();
        let (_gone, gone_rx) = add(&registry, 4).into_parts();
        let (_b, mut b_rx) = add(&registry, 4).into_parts();
        drop(gone_rx);

        let result = hub.broadcast(&Message::new(a.id(), line("x")));

        assert_eq!(result.total, 2);
        assert_eq!(result.dropped, 1);
        assert_eq!(result.delivered, 1);
        assert_eq!(b_rx.try_recv().unwrap(), line("x"));
    }

    #[test]
    fn test_send_to_and_kick() {
        let (registry, hub) = setup(BroadcastPolicy::default());
        let (a, mut a_rx) = add(&registry, 4).into_parts();

        hub.send_to(a.id(), line("direct")).unwrap();
        assert_eq!(a_rx.try_recv().unwrap(), line("direct"));

        hub.kick(a.id()).unwrap();
        assert_eq!(a.close_reason(), Some(DisconnectReason::Kicked));
        assert!(matches!(
            hub.send_to(a.id(), line("late")),
            Err(RelayError::ConnectionClosed)
        ));

        let missing = ConnectionId::new(99);
        assert!(matches!(
            hub.send_to(missing, line("x")),
            Err(RelayError::ConnectionNotFound(_))
        ));
        assert!(hub.kick(missing).is_err());
    }

    #[test]
    fn test_broadcast_all_ignores_policy() {
        let (registry, hub) = setup(BroadcastPolicy::ExcludeSender);
        let (_a, mut a_rx) = add(&registry, 4).into_parts();
        let (_b, mut b_rx) = add(&registry, 4).into_parts();

        let result = hub.broadcast_all(&line("notice"));
        assert_eq!(result.delivered, 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }
}

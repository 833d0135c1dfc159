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

//! Connection worker implementation
//!
//! The ConnectionWorker owns a single connection for its whole life:
//! - reading lines and handing them to the broadcast hub
//! - writing lines other connections queued for it
//! - stopping when cancelled through its registry handle
//! - releasing the socket, deregistering and reporting the disconnect once

use crate::{
    BroadcastHub, Connection, ConnectionId, ConnectionState, DisconnectReason, Message,
    PeerHandle, Registration, RelayError, ServerConfig, ServerHandler, ServerMetrics,
};
use linecast_codec::Line;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max time for a single line write, and for the final flush on close
    pub write_timeout: Duration,
    /// Log every received line at info level
    pub log_lines: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
            log_lines: false,
        }
    }
}

impl From<&ServerConfig> for WorkerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            write_timeout: config.write_timeout,
            log_lines: config.log_lines,
        }
    }
}

/// Connection worker that manages a single connection's lifecycle
pub struct ConnectionWorker {
    connection: Connection,
    handle: PeerHandle,
    outbound: mpsc::Receiver<Line>,
    hub: Arc<BroadcastHub>,
    handler: Arc<dyn ServerHandler>,
    metrics: Arc<ServerMetrics>,
    config: WorkerConfig,
}

impl ConnectionWorker {
    /// Create a worker for a connection already in the hub's registry
    pub fn new(
        connection: Connection,
        registration: Registration,
        hub: Arc<BroadcastHub>,
        handler: Arc<dyn ServerHandler>,
        metrics: Arc<ServerMetrics>,
        config: WorkerConfig,
    ) -> Self {
        let (handle, outbound) = registration.into_parts();
        Self {
            connection,
            handle,
            outbound,
            hub,
            handler,
            metrics,
            config,
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Run the worker until the connection ends
    ///
    /// Returns why the connection ended. By the time this returns the socket
    /// is released and the connection is no longer registered.
    pub async fn run(mut self) -> DisconnectReason {
        let id = self.id();
        self.metrics.connection_opened();
        self.handle.set_state(ConnectionState::Active);
        self.handler.on_connect(id, &self.handle.info()).await;

        let reason = self.event_loop().await;

        self.cleanup(&reason).await;
        reason
    }

    async fn event_loop(&mut self) -> DisconnectReason {
        let cancel = self.handle.cancellation().clone();
        loop {
            // Reads and writes are polled fairly, so cancellation is checked
            // up front on every turn.
            if cancel.is_cancelled() {
                return self.cancel_reason();
            }

            select! {
                _ = cancel.cancelled() => {
                    return self.cancel_reason();
                }

                queued = self.outbound.recv() => {
                    let Some(line) = queued else {
                        return DisconnectReason::ServerShutdown;
                    };
                    if let Some(reason) = self.write(line).await {
                        return reason;
                    }
                }

                received = self.connection.receive_line() => {
                    match received {
                        Ok(line) => self.forward(line).await,
                        Err(err) => return self.fail(err).await,
                    }
                }
            }
        }
    }

    async fn forward(&mut self, line: Line) {
        let id = self.id();
        self.metrics.line_received();
        if self.config.log_lines {
            info!(connection_id = %id, "-->{}", line);
        } else {
            trace!(connection_id = %id, length = line.len(), "Line received");
        }

        let result = self.hub.broadcast(&Message::new(id, line.clone()));
        trace!(connection_id = %id, recipients = result.delivered, "Line forwarded");

        self.handler.on_line(id, &line).await;
    }

    async fn write(&mut self, line: Line) -> Option<DisconnectReason> {
        let cancel = self.handle.cancellation().clone();
        let written = select! {
            _ = cancel.cancelled() => return Some(self.cancel_reason()),
            written = timeout(self.config.write_timeout, self.connection.send_line(line)) => written,
        };

        match written {
            Ok(Ok(())) => None,
            Ok(Err(err)) if err.is_framing_error() => {
                warn!(connection_id = %self.id(), error = %err, "Dropped unframeable line");
                None
            }
            Ok(Err(err)) => Some(self.fail(err).await),
            Err(_) => {
                warn!(
                    connection_id = %self.id(),
                    timeout = ?self.config.write_timeout,
                    "Write timed out"
                );
                self.metrics.connection_error();
                Some(DisconnectReason::WriteTimeout)
            }
        }
    }

    async fn fail(&mut self, err: RelayError) -> DisconnectReason {
        if err.is_normal_close() {
            return DisconnectReason::PeerClosed;
        }
        if err.is_framing_error() {
            self.metrics.codec_error();
        } else {
            self.metrics.connection_error();
        }
        self.handler.on_error(self.id(), &err).await;
        DisconnectReason::Error(err.to_string())
    }

    fn cancel_reason(&self) -> DisconnectReason {
        self.handle
            .close_reason()
            .unwrap_or(DisconnectReason::ServerShutdown)
    }

    async fn cleanup(&mut self, reason: &DisconnectReason) {
        let id = self.id();

        // Stops deliveries racing with the close below.
        self.handle.disconnect(reason.clone());
        self.outbound.close();

        match timeout(self.config.write_timeout, self.connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(connection_id = %id, error = %err, "Error while closing"),
            Err(_) => debug!(connection_id = %id, "Timed out flushing on close"),
        }
        // A timed out close has still dropped the socket halves.
        debug_assert!(self.connection.is_closed());

        let removed = self.hub.registry().deregister(id);
        self.handle.set_state(ConnectionState::Closed);
        if !removed {
            return;
        }

        self.metrics
            .connection_closed(self.connection.created_at().elapsed());
        if reason.is_normal() {
            info!(
                connection_id = %id,
                peer_addr = %self.connection.peer_addr(),
                reason = %reason,
                "Connection closed"
            );
        } else {
            warn!(
                connection_id = %id,
                peer_addr = %self.connection.peer_addr(),
                reason = %reason,
                "Connection closed"
            );
        }
        self.handler.on_disconnect(id, reason).await;
    }
}

impl std::fmt::Debug for ConnectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

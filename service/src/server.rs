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

//! Relay server implementation
//!
//! The RelayServer owns the listener loop. It binds, accepts connections,
//! registers each one and spawns an independent worker for it, so accepting
//! never waits on any connection's lifetime.
//!
//! ```text
//! Idle → Listening → (Accepting ⇄ Listening) → Stopped
//! ```

use crate::{
    BroadcastHub, Connection, ConnectionRegistry, ConnectionWorker, DisconnectReason,
    ListenerState, RelayError, Result, ServerConfig, ServerHandler, ServerMetrics, ServerSnapshot,
    WorkerConfig,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Line relay server
///
/// # Example
///
/// ```no_run
/// use linecast_service::{NoopHandler, RelayServer, ServerConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = RelayServer::new(ServerConfig::default())?;
///     let addr = server.start(Arc::new(NoopHandler)).await?;
///     println!("Listening on port {}", addr.port());
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<ServerMetrics>,
    state: Arc<AtomicU8>,
    local_addr: OnceLock<SocketAddr>,
    started_at: Instant,
    shutdown: CancellationToken,
    workers: TaskTracker,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    /// Create a new server with the given configuration
    ///
    /// Nothing is bound until [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let hub = Arc::new(BroadcastHub::new(
            registry.clone(),
            metrics.clone(),
            config.broadcast_policy,
        ));

        Ok(Self {
            config,
            registry,
            hub,
            metrics,
            state: Arc::new(AtomicU8::new(ListenerState::Idle.as_u8())),
            local_addr: OnceLock::new(),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
            accept_handle: Mutex::new(None),
        })
    }

    /// Bind and start accepting connections
    ///
    /// Returns the bound address; when the configured port is 0 this carries
    /// the port the OS picked. A bind failure leaves the server `Stopped`.
    #[instrument(skip(self, handler), fields(bind_address = %self.config.bind_address))]
    pub async fn start(&self, handler: Arc<dyn ServerHandler>) -> Result<SocketAddr> {
        if self
            .state
            .compare_exchange(
                ListenerState::Idle.as_u8(),
                ListenerState::Listening.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(RelayError::AlreadyRunning);
        }

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(err) => {
                self.set_state(ListenerState::Stopped);
                error!(error = %err, "Failed to start relay server");
                return Err(err);
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.set_state(ListenerState::Stopped);
                return Err(RelayError::setup("read bound address", e));
            }
        };
        let _ = self.local_addr.set(local_addr);

        info!(local_addr = %local_addr, "Relay server listening");

        let handle = tokio::spawn(accept_loop(AcceptContext {
            listener,
            config: self.config.clone(),
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            metrics: self.metrics.clone(),
            handler,
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
            workers: self.workers.clone(),
        }));
        *self.accept_handle.lock().await = Some(handle);

        Ok(local_addr)
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_address;
        TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::setup(format!("bind {}", addr), e))
    }

    /// Shutdown the server gracefully
    ///
    /// Stops accepting, closes every connection and waits up to the configured
    /// shutdown timeout for their workers to finish.
    pub async fn shutdown(&self) -> Result<()> {
        let stopped = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                ListenerState::from_u8(state)
                    .is_running()
                    .then_some(ListenerState::Stopped.as_u8())
            });
        if stopped.is_err() {
            return Err(RelayError::NotRunning);
        }

        info!("Shutting down relay server");
        self.shutdown.cancel();

        if let Some(handle) = self.accept_handle.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Accept loop ended abnormally");
            }
        }

        let closing = self.registry.close_all(DisconnectReason::ServerShutdown);
        debug!(connections = closing, "Closing connections");

        self.workers.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.workers.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.registry.len(),
                "Shutdown timed out waiting for connections"
            );
            return Err(RelayError::Timeout);
        }

        info!("Relay server shutdown complete");
        Ok(())
    }

    /// Get the listener state
    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Check if the server is accepting connections
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Get the bound address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Get the number of registered connections
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            state: self.state(),
            active_connections: self.registry.len(),
            total_connections: self.metrics.total_connections(),
            local_addr: self.local_addr(),
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the broadcast hub
    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.hub.clone()
    }

    /// Get the connection registry
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.local_addr())
            .field("state", &self.state())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RelayServer dropped while still running");
            self.set_state(ListenerState::Stopped);
            self.shutdown.cancel();
            self.registry.close_all(DisconnectReason::ServerShutdown);
        }
    }
}

/// Everything the accept loop task owns
struct AcceptContext {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<ServerMetrics>,
    handler: Arc<dyn ServerHandler>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl AcceptContext {
    /// Move between `Listening` and `Accepting` unless shutdown already won
    fn transition(&self, from: ListenerState, to: ListenerState) {
        let _ = self.state.compare_exchange(
            from.as_u8(),
            to.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn admit(&self, socket: TcpStream, peer_addr: SocketAddr) {
        if self.registry.len() >= self.config.max_connections {
            warn!(
                peer_addr = %peer_addr,
                max_connections = self.config.max_connections,
                "Connection limit reached, rejecting connection"
            );
            self.metrics.connection_rejected();
            return;
        }

        let id = self.registry.next_id();
        let connection = match Connection::wrap(socket, id, self.config.codec()) {
            Ok(connection) => connection,
            Err(err) => {
                warn!(peer_addr = %peer_addr, error = %err, "Failed to set up connection");
                self.metrics.connection_error();
                return;
            }
        };
        let registration = match self
            .registry
            .register(&connection, self.config.outbound_queue_size)
        {
            Ok(registration) => registration,
            Err(err) => {
                error!(connection_id = %id, error = %err, "Failed to register connection");
                self.metrics.connection_error();
                return;
            }
        };

        info!(connection_id = %id, peer_addr = %peer_addr, "Connection accepted");

        let worker = ConnectionWorker::new(
            connection,
            registration,
            self.hub.clone(),
            self.handler.clone(),
            self.metrics.clone(),
            WorkerConfig::from(&self.config),
        );
        self.workers.spawn(worker.run());
    }
}

async fn accept_loop(ctx: AcceptContext) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            accepted = ctx.listener.accept() => accepted,
        };

        ctx.transition(ListenerState::Listening, ListenerState::Accepting);
        match accepted {
            Ok((socket, peer_addr)) => ctx.admit(socket, peer_addr),
            Err(err) => {
                warn!(error = %err, "Failed to accept connection");
                ctx.metrics.accept_error();
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
        ctx.transition(ListenerState::Accepting, ListenerState::Listening);
    }

    info!("Accept loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoopHandler;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn local_config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    async fn wait_for_connections(server: &RelayServer, count: usize) {
        for _ in 0..100 {
            if server.connection_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} connections, found {}",
            count,
            server.connection_count()
        );
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let server = RelayServer::new(local_config()).unwrap();
        assert_eq!(server.state(), ListenerState::Idle);
        assert!(server.local_addr().is_none());

        let addr = server.start(Arc::new(NoopHandler)).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        assert!(server.is_running());

        server.shutdown().await.unwrap();
        assert_eq!(server.state(), ListenerState::Stopped);
        assert!(matches!(
            server.shutdown().await,
            Err(RelayError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_server_double_start() {
        let server = RelayServer::new(local_config()).unwrap();
        server.start(Arc::new(NoopHandler)).await.unwrap();

        let result = server.start(Arc::new(NoopHandler)).await;
        assert!(matches!(result, Err(RelayError::AlreadyRunning)));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_setup_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig::new(taken.local_addr().unwrap());

        let server = RelayServer::new(config).unwrap();
        let err = server.start(Arc::new(NoopHandler)).await.unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, RelayError::Setup { .. }));
        assert_eq!(server.state(), ListenerState::Stopped);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = local_config().with_outbound_queue_size(0);
        assert!(matches!(
            RelayServer::new(config),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let server = RelayServer::new(local_config().with_max_connections(1)).unwrap();
        let addr = server.start(Arc::new(NoopHandler)).await.unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        wait_for_connections(&server, 1).await;

        let mut second = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let mut line = String::new();
        // The rejected socket is closed without a greeting
        assert_eq!(second.read_line(&mut line).await.unwrap_or(0), 0);
        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.metrics().snapshot().rejected_connections, 1);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let server = RelayServer::new(local_config()).unwrap();
        let addr = server.start(Arc::new(NoopHandler)).await.unwrap();

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        wait_for_connections(&server, 1).await;

        server.shutdown().await.unwrap();
        assert_eq!(server.connection_count(), 0);

        let mut line = String::new();
        assert_eq!(client.read_line(&mut line).await.unwrap_or(0), 0);
        assert_eq!(server.metrics().snapshot().active_connections, 0);
    }

    #[tokio::test]
    async fn test_snapshot() {
        let server = RelayServer::new(local_config()).unwrap();
        let snapshot = server.snapshot();
        assert_eq!(snapshot.state, ListenerState::Idle);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.total_connections, 0);
        assert!(snapshot.local_addr.is_none());
    }
}

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

//! # Linecast Test Suite
//!
//! Harness for end-to-end tests that run a real [`RelayServer`] on a loopback
//! ephemeral port and talk to it through [`ClientSession`]s.

use async_trait::async_trait;
use linecast_client::{ClientConfig, ClientSession};
use linecast_service::{
    ConnectionId, ConnectionInfo, DisconnectReason, Line, RelayServer, ServerConfig, ServerHandler,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long the harness polls before giving up
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Server handler that records every callback
#[derive(Debug, Default)]
pub struct RecordingHandler {
    connects: AtomicUsize,
    lines: Mutex<Vec<(ConnectionId, Line)>>,
    disconnects: Mutex<HashMap<ConnectionId, Vec<DisconnectReason>>>,
}

impl RecordingHandler {
    /// Number of `on_connect` calls
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Lines seen by the server, in arrival order
    pub fn lines(&self) -> Vec<(ConnectionId, Line)> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Every reason reported for each disconnected connection
    pub fn disconnects(&self) -> HashMap<ConnectionId, Vec<DisconnectReason>> {
        self.disconnects
            .lock()
            .map(|disconnects| disconnects.clone())
            .unwrap_or_default()
    }

    /// Total `on_disconnect` calls across all connections
    pub fn disconnect_count(&self) -> usize {
        self.disconnects().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ServerHandler for RecordingHandler {
    async fn on_connect(&self, _id: ConnectionId, _info: &ConnectionInfo) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_line(&self, id: ConnectionId, line: &Line) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((id, line.clone()));
        }
    }

    async fn on_disconnect(&self, id: ConnectionId, reason: &DisconnectReason) {
        if let Ok(mut disconnects) = self.disconnects.lock() {
            disconnects.entry(id).or_default().push(reason.clone());
        }
    }
}

/// A running relay server bound to a loopback ephemeral port
pub struct TestRelay {
    server: RelayServer,
    addr: SocketAddr,
    handler: Arc<RecordingHandler>,
}

impl TestRelay {
    /// Start a server with default settings
    pub async fn start() -> linecast_service::Result<Self> {
        Self::start_with(|config| config).await
    }

    /// Start a server after adjusting the loopback configuration
    pub async fn start_with<F>(configure: F) -> linecast_service::Result<Self>
    where
        F: FnOnce(ServerConfig) -> ServerConfig,
    {
        let config = configure(ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0))));
        let handler = Arc::new(RecordingHandler::default());
        let server = RelayServer::new(config)?;
        let addr = server.start(handler.clone()).await?;
        Ok(Self {
            server,
            addr,
            handler,
        })
    }

    /// Bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The running server
    pub fn server(&self) -> &RelayServer {
        &self.server
    }

    /// What the server's handler observed
    pub fn handler(&self) -> &RecordingHandler {
        &self.handler
    }

    /// Client configuration pointing at this server
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Connect a client and wait until the server has registered it
    pub async fn connect(&self) -> linecast_client::Result<ClientSession> {
        let expected = self.server.connection_count() + 1;
        let session = ClientSession::connect(&self.client_config()).await?;
        self.wait_for_connections(expected).await;
        Ok(session)
    }

    /// Wait until exactly `count` connections are registered
    ///
    /// Returns whether the count was reached within [`WAIT_LIMIT`].
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        wait_until(|| self.server.connection_count() == count).await
    }

    /// Wait until at least `count` disconnects have been reported
    pub async fn wait_for_disconnects(&self, count: usize) -> bool {
        wait_until(|| self.handler.disconnect_count() >= count).await
    }

    /// Stop the server
    pub async fn shutdown(&self) -> linecast_service::Result<()> {
        self.server.shutdown().await
    }
}

/// Poll `condition` until it holds or [`WAIT_LIMIT`] passes
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    condition()
}

/// Build a line from test text
///
/// # Panics
///
/// Panics if `text` contains a newline.
pub fn line(text: &str) -> Line {
    Line::new(text.to_owned()).expect("test line must not contain a newline")
}

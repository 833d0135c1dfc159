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

//! Integration tests for the relay server over loopback

use async_trait::async_trait;
use linecast_service::{
    BroadcastPolicy, ConnectionId, ConnectionInfo, DisconnectReason, Line, RelayServer,
    ServerConfig, ServerHandler,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

/// Handler that records what the server observed
#[derive(Default)]
struct RecordingHandler {
    connects: AtomicUsize,
    lines: Mutex<Vec<(ConnectionId, String)>>,
    disconnects: Mutex<Vec<(ConnectionId, DisconnectReason)>>,
}

impl RecordingHandler {
    fn lines(&self) -> Vec<(ConnectionId, String)> {
        self.lines.lock().unwrap().clone()
    }

    fn disconnects(&self) -> Vec<(ConnectionId, DisconnectReason)> {
        self.disconnects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServerHandler for RecordingHandler {
    async fn on_connect(&self, _id: ConnectionId, _info: &ConnectionInfo) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_line(&self, id: ConnectionId, line: &Line) {
        self.lines.lock().unwrap().push((id, line.to_string()));
    }

    async fn on_disconnect(&self, id: ConnectionId, reason: &DisconnectReason) {
        self.disconnects.lock().unwrap().push((id, reason.clone()));
    }
}

/// Raw line client
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, text: &str) {
        self.writer
            .write_all(format!("{}\n", text).as_bytes())
            .await
            .unwrap();
    }

    /// Next line without its delimiter, or `None` at end of stream
    async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(0);
        if read == 0 {
            return None;
        }
        Some(line.trim_end_matches('\n').to_string())
    }

    async fn expect_silence(&mut self, wait: Duration) {
        let mut line = String::new();
        if let Ok(read) = timeout(wait, self.reader.read_line(&mut line)).await {
            panic!("expected silence, got {:?} ({:?})", line, read);
        }
    }
}

async fn start_server(config: ServerConfig) -> (RelayServer, SocketAddr, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::default());
    let server = RelayServer::new(config).unwrap();
    let addr = server.start(handler.clone()).await.unwrap();
    (server, addr, handler)
}

fn local_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
}

async fn wait_for_connections(server: &RelayServer, count: usize) {
    for _ in 0..500 {
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

async fn wait_for_disconnects(handler: &RecordingHandler, count: usize) {
    for _ in 0..500 {
        if handler.disconnects().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} disconnects, found {:?}", count, handler.disconnects());
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_line_reaches_others_but_not_sender() {
    let (server, addr, _handler) = start_server(local_config()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    let mut carol = TestClient::connect(addr).await;
    wait_for_connections(&server, 3).await;

    alice.send("hello").await;

    assert_eq!(bob.recv().await.as_deref(), Some("hello"));
    assert_eq!(carol.recv().await.as_deref(), Some("hello"));
    alice.expect_silence(Duration::from_millis(200)).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_include_sender_policy_echoes() {
    let config = local_config().with_broadcast_policy(BroadcastPolicy::IncludeSender);
    let (server, addr, _handler) = start_server(config).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    wait_for_connections(&server, 2).await;

    alice.send("ping").await;

    assert_eq!(alice.recv().await.as_deref(), Some("ping"));
    assert_eq!(bob.recv().await.as_deref(), Some("ping"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_order_preserved_per_sender() {
    let (server, addr, _handler) = start_server(local_config()).await;
    let mut sender = TestClient::connect(addr).await;
    let mut receiver = TestClient::connect(addr).await;
    wait_for_connections(&server, 2).await;

    for i in 0..200 {
        sender.send(&format!("msg-{}", i)).await;
    }

    for i in 0..200 {
        assert_eq!(receiver.recv().await, Some(format!("msg-{}", i)));
    }

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_senders_keep_their_own_order() {
    let (server, addr, _handler) = start_server(local_config()).await;
    let mut first = TestClient::connect(addr).await;
    let mut second = TestClient::connect(addr).await;
    let mut receiver = TestClient::connect(addr).await;
    wait_for_connections(&server, 3).await;

    let a = tokio::spawn(async move {
        for i in 0..100 {
            first.send(&format!("a{}", i)).await;
        }
        first
    });
    let b = tokio::spawn(async move {
        for i in 0..100 {
            second.send(&format!("b{}", i)).await;
        }
        second
    });
    let _first = a.await.unwrap();
    let _second = b.await.unwrap();

    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    for _ in 0..200 {
        let line = receiver.recv().await.unwrap();
        let (prefix, index) = line.split_at(1);
        let index: usize = index.parse().unwrap();
        match prefix {
            "a" => from_a.push(index),
            "b" => from_b.push(index),
            other => panic!("unexpected prefix {}", other),
        }
    }

    assert_eq!(from_a, (0..100).collect::<Vec<_>>());
    assert_eq!(from_b, (0..100).collect::<Vec<_>>());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_no_history_replay_for_late_joiner() {
    let (server, addr, _handler) = start_server(local_config()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    wait_for_connections(&server, 2).await;

    alice.send("hello").await;
    assert_eq!(bob.recv().await.as_deref(), Some("hello"));

    let mut late = TestClient::connect(addr).await;
    wait_for_connections(&server, 3).await;
    late.expect_silence(Duration::from_millis(200)).await;

    alice.send("again").await;
    assert_eq!(late.recv().await.as_deref(), Some("again"));
    assert_eq!(bob.recv().await.as_deref(), Some("again"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_raw_bytes_are_relayed_unchanged() {
    let (server, addr, _handler) = start_server(local_config()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    wait_for_connections(&server, 2).await;

    alice.writer.write_all(b"nul\x00byte\r\n").await.unwrap();

    let mut raw = Vec::new();
    timeout(RECV_TIMEOUT, bob.reader.read_until(b'\n', &mut raw))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw, b"nul\x00byte\r\n");

    server.shutdown().await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_disconnect_does_not_disturb_others() {
    let (server, addr, handler) = start_server(local_config()).await;
    let alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    let mut carol = TestClient::connect(addr).await;
    wait_for_connections(&server, 3).await;

    drop(alice);
    wait_for_disconnects(&handler, 1).await;
    wait_for_connections(&server, 2).await;

    bob.send("still here").await;
    assert_eq!(carol.recv().await.as_deref(), Some("still here"));
    carol.send("me too").await;
    assert_eq!(bob.recv().await.as_deref(), Some("me too"));

    let disconnects = handler.disconnects();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].1, DisconnectReason::PeerClosed);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handler_sees_every_line_once() {
    let (server, addr, handler) = start_server(local_config()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    wait_for_connections(&server, 2).await;

    alice.send("one").await;
    alice.send("two").await;
    assert_eq!(bob.recv().await.as_deref(), Some("one"));
    assert_eq!(bob.recv().await.as_deref(), Some("two"));

    for _ in 0..500 {
        if handler.lines().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let texts: Vec<String> = handler.lines().into_iter().map(|(_, text)| text).collect();
    assert_eq!(texts, vec!["one", "two"]);
    assert_eq!(handler.connects.load(Ordering::SeqCst), 2);

    let snapshot = server.metrics().snapshot();
    assert_eq!(snapshot.lines_received, 2);
    assert_eq!(snapshot.lines_delivered, 2);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_disconnects_everyone_once() {
    let (server, addr, handler) = start_server(local_config()).await;
    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(TestClient::connect(addr).await);
    }
    wait_for_connections(&server, 5).await;

    server.shutdown().await.unwrap();

    for client in clients.iter_mut() {
        assert_eq!(client.recv().await, None);
    }
    let disconnects = handler.disconnects();
    assert_eq!(disconnects.len(), 5);
    assert!(
        disconnects
            .iter()
            .all(|(_, reason)| *reason == DisconnectReason::ServerShutdown)
    );
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn test_kick_through_hub() {
    let (server, addr, handler) = start_server(local_config()).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    wait_for_connections(&server, 2).await;

    let ids = server.registry().ids();
    server.hub().kick(ids[0]).unwrap();

    wait_for_disconnects(&handler, 1).await;
    assert_eq!(handler.disconnects()[0], (ids[0], DisconnectReason::Kicked));

    // Accept order assigns ids, so alice holds the lower one
    assert_eq!(alice.recv().await, None);
    server.hub().send_to(ids[1], Line::new("hi").unwrap()).unwrap();
    assert_eq!(bob.recv().await.as_deref(), Some("hi"));

    server.shutdown().await.unwrap();
}

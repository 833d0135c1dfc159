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

//! Line Relay Server
//!
//! A concurrent, line-oriented TCP relay. Every newline-delimited line a
//! client sends is fanned out to every other connected client.
//!
//! - One independent task per connection; accepting never waits on a client
//! - Registry enumeration never holds a lock while delivering
//! - Bounded per-connection outbound queues; slow consumers are disconnected
//! - Per-connection errors never escape that connection's task
//! - Lock-free metrics and snapshots
//!
//! # Architecture
//!
//! ```text
//! RelayServer (listener loop)
//!     ↓ accept
//! ConnectionWorker → Connection (LineCodec framing)
//!     ↓ received lines          ↑ queued lines
//! BroadcastHub → ConnectionRegistry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use linecast_service::{ConnectionId, Line, RelayServer, ServerConfig, ServerHandler};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Console;
//!
//! #[async_trait]
//! impl ServerHandler for Console {
//!     async fn on_line(&self, id: ConnectionId, line: &Line) {
//!         println!("{} -->{}", id, line);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = RelayServer::new(ServerConfig::default())?;
//!     let addr = server.start(Arc::new(Console)).await?;
//!     println!("Listening on port {}", addr.port());
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod hub;
mod metrics;
mod registry;
mod server;
mod types;
mod worker;

pub use config::ServerConfig;
pub use connection::Connection;
pub use error::{RelayError, Result};
pub use handler::{CallbackHandler, NoopHandler, ServerHandler};
pub use hub::{BroadcastHub, BroadcastPolicy, BroadcastResult, Message};
pub use linecast_codec::{CodecError, DEFAULT_MAX_LINE_LENGTH, Line, LineCodec};
pub use crate::metrics::{MetricsSnapshot, ServerMetrics};
pub use registry::{ConnectionRegistry, PeerHandle, Registration};
pub use server::RelayServer;
pub use types::{
    ConnectionId, ConnectionInfo, ConnectionState, ConnectionStats, DisconnectReason,
    ListenerState, ServerSnapshot,
};
pub use worker::{ConnectionWorker, WorkerConfig};

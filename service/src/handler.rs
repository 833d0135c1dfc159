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

//! Handler traits and implementations for the relay server

use crate::{ConnectionId, ConnectionInfo, DisconnectReason, RelayError};
use async_trait::async_trait;
use linecast_codec::Line;

/// Server event handler trait
///
/// Routing is done by the broadcast hub; handlers only observe. All methods
/// are async and have default implementations that do nothing. Hooks run on
/// the connection's own task, so a slow hook delays that connection only.
///
/// # Example
///
/// ```no_run
/// use linecast_service::{ConnectionId, ServerHandler};
/// use linecast_service::Line;
/// use async_trait::async_trait;
///
/// struct Console;
///
/// #[async_trait]
/// impl ServerHandler for Console {
///     async fn on_line(&self, id: ConnectionId, line: &Line) {
///         println!("{} --> {}", id, line);
///     }
/// }
/// ```
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Called once the connection is registered, before any line is read
    async fn on_connect(&self, _id: ConnectionId, _info: &ConnectionInfo) {}

    /// Called for every line received, after it has been handed to the hub
    async fn on_line(&self, _id: ConnectionId, _line: &Line) {}

    /// Called when an I/O or framing error ends the connection
    ///
    /// Orderly closes by the peer are not errors and do not reach this hook.
    async fn on_error(&self, _id: ConnectionId, _error: &RelayError) {}

    /// Called exactly once per connection, after it has been deregistered
    async fn on_disconnect(&self, _id: ConnectionId, _reason: &DisconnectReason) {}
}

/// Handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

#[async_trait]
impl ServerHandler for NoopHandler {}

type ConnectCallback = Box<dyn Fn(ConnectionId, &ConnectionInfo) + Send + Sync + 'static>;
type LineCallback = Box<dyn Fn(ConnectionId, &Line) + Send + Sync + 'static>;
type ErrorCallback = Box<dyn Fn(ConnectionId, &RelayError) + Send + Sync + 'static>;
type DisconnectCallback = Box<dyn Fn(ConnectionId, &DisconnectReason) + Send + Sync + 'static>;

/// Callback-based handler implementation
///
/// This provides a way to observe the server with closures instead of
/// implementing the `ServerHandler` trait.
///
/// # Example
///
/// ```no_run
/// use linecast_service::CallbackHandler;
/// use std::sync::Arc;
///
/// let handler = Arc::new(CallbackHandler {
///     on_line: Some(Box::new(|id, line| {
///         println!("{} --> {}", id, line);
///     })),
///     on_disconnect: Some(Box::new(|id, reason| {
///         println!("{} closed: {}", id, reason);
///     })),
///     ..Default::default()
/// });
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    /// Called on connection establishment
    pub on_connect: Option<ConnectCallback>,
    /// Called for every received line
    pub on_line: Option<LineCallback>,
    /// Called on error
    pub on_error: Option<ErrorCallback>,
    /// Called on disconnection
    pub on_disconnect: Option<DisconnectCallback>,
}

#[async_trait]
impl ServerHandler for CallbackHandler {
    async fn on_connect(&self, id: ConnectionId, info: &ConnectionInfo) {
        if let Some(ref f) = self.on_connect {
            f(id, info);
        }
    }

    async fn on_line(&self, id: ConnectionId, line: &Line) {
        if let Some(ref f) = self.on_line {
            f(id, line);
        }
    }

    async fn on_error(&self, id: ConnectionId, error: &RelayError) {
        if let Some(ref f) = self.on_error {
            f(id, error);
        }
    }

    async fn on_disconnect(&self, id: ConnectionId, reason: &DisconnectReason) {
        if let Some(ref f) = self.on_disconnect {
            f(id, reason);
        }
    }
}

impl std::fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_line", &self.on_line.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_callback_handler_dispatch() {
        let lines = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let (l, c) = (lines.clone(), closes.clone());

        let handler = CallbackHandler {
            on_line: Some(Box::new(move |_, _| {
                l.fetch_add(1, Ordering::SeqCst);
            })),
            on_disconnect: Some(Box::new(move |_, reason| {
                assert_eq!(*reason, DisconnectReason::PeerClosed);
                c.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };

        let id = ConnectionId::new(1);
        handler.on_line(id, &Line::new("x").unwrap()).await;
        handler.on_line(id, &Line::new("y").unwrap()).await;
        handler.on_error(id, &RelayError::Timeout).await;
        handler
            .on_disconnect(id, &DisconnectReason::PeerClosed)
            .await;

        assert_eq!(lines.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler: Arc<dyn ServerHandler> = Arc::new(NoopHandler);
        handler
            .on_disconnect(ConnectionId::new(1), &DisconnectReason::Kicked)
            .await;
    }
}

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

//! Line connection over a TCP stream

use crate::{ConnectionId, ConnectionStats, RelayError, Result};
use futures_util::{SinkExt, StreamExt};
use linecast_codec::{Line, LineCodec};
use metrics::{counter, gauge, histogram};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, trace};

/// Framed halves of the socket; dropping them releases the descriptor
struct ConnectionIo {
    reader: FramedRead<OwnedReadHalf, LineCodec>,
    writer: FramedWrite<OwnedWriteHalf, LineCodec>,
}

/// A single peer's line stream
///
/// The connection is owned by the task that handles it. Once a read or write
/// fails, or the peer ends the stream, the socket is released and every later
/// operation returns [`RelayError::ConnectionClosed`].
pub struct Connection {
    io: Option<ConnectionIo>,
    id: ConnectionId,
    peer_addr: SocketAddr,
    created_at: Instant,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Wrap a TCP stream into a line connection
    #[instrument(skip(socket, codec), fields(connection_id = %id))]
    pub fn wrap(socket: TcpStream, id: ConnectionId, codec: LineCodec) -> Result<Self> {
        let peer_addr = socket.peer_addr()?;
        socket.set_nodelay(true)?;

        debug!(peer_addr = %peer_addr, "Creating new line connection");

        counter!("linecast.connections.total").increment(1);
        gauge!("linecast.connections.active").increment(1.0);

        let (read_half, write_half) = socket.into_split();
        Ok(Self {
            io: Some(ConnectionIo {
                reader: FramedRead::new(read_half, codec.clone()),
                writer: FramedWrite::new(write_half, codec),
            }),
            id,
            peer_addr,
            created_at: Instant::now(),
            stats: Arc::new(ConnectionStats::default()),
        })
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get when the connection was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the shared traffic counters
    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.stats.clone()
    }

    /// Check if the socket has been released
    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    /// Receive the next complete line
    ///
    /// Suspends until a delimiter arrives. End of stream is reported as
    /// [`RelayError::ConnectionClosed`]; a trailing unterminated line is
    /// delivered first.
    #[instrument(skip(self), fields(connection_id = %self.id))]
    pub async fn receive_line(&mut self) -> Result<Line> {
        let io = self.io.as_mut().ok_or(RelayError::ConnectionClosed)?;
        let start = Instant::now();

        match io.reader.next().await {
            Some(Ok(line)) => {
                self.stats.record_received(line.len());
                counter!("linecast.lines.received").increment(1);
                histogram!("linecast.line.receive_duration").record(start.elapsed().as_secs_f64());
                trace!(length = line.len(), "Line received");
                Ok(line)
            }
            Some(Err(e)) => {
                let err = RelayError::from(e);
                if !err.is_normal_close() {
                    counter!("linecast.errors.receive").increment(1);
                    error!(error = %err, "Error receiving line");
                }
                self.release();
                Err(err)
            }
            None => {
                debug!("Connection stream ended");
                self.release();
                Err(RelayError::ConnectionClosed)
            }
        }
    }

    /// Send a line, flushing it completely
    ///
    /// The framed writer keeps writing the unsent suffix after partial writes
    /// until the whole encoded line is on the wire.
    #[instrument(skip(self, line), fields(connection_id = %self.id, length = line.len()))]
    pub async fn send_line(&mut self, line: Line) -> Result<()> {
        let io = self.io.as_mut().ok_or(RelayError::ConnectionClosed)?;
        let length = line.len();
        let start = Instant::now();

        match io.writer.send(line).await {
            Ok(()) => {
                self.stats.record_sent(length);
                counter!("linecast.lines.sent").increment(1);
                histogram!("linecast.line.send_duration").record(start.elapsed().as_secs_f64());
                trace!("Line sent");
                Ok(())
            }
            Err(e) => {
                let err = RelayError::from(e);
                if err.is_framing_error() {
                    // Nothing reached the wire; the stream is still usable.
                    return Err(err);
                }
                counter!("linecast.errors.send").increment(1);
                if !err.is_normal_close() {
                    error!(error = %err, "Failed to send line");
                }
                self.release();
                Err(err)
            }
        }
    }

    /// Flush pending output, shut down the write side and release the socket
    ///
    /// Safe to call any number of times; only the first call touches the socket.
    #[instrument(skip(self), fields(connection_id = %self.id))]
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut io) = self.io.take() else {
            return Ok(());
        };
        gauge!("linecast.connections.active").decrement(1.0);

        let result = SinkExt::<Line>::close(&mut io.writer).await;
        drop(io);
        info!(
            lines_sent = self.stats.lines_sent(),
            lines_received = self.stats.lines_received(),
            "Connection socket released"
        );

        match result.map_err(RelayError::from) {
            Err(err) if !err.is_normal_close() => Err(err),
            _ => Ok(()),
        }
    }

    fn release(&mut self) {
        if self.io.take().is_some() {
            gauge!("linecast.connections.active").decrement(1.0);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &format_args!("{}", self.id))
            .field("peer_addr", &self.peer_addr)
            .field("created_at", &self.created_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}

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

//! Interactive session against a relay server

use crate::{ClientConfig, ClientError, Result};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use linecast_codec::{CodecError, Line, LineCodec};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::select;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};
use tracing::{debug, info, instrument, trace, warn};

type ServerReader = FramedRead<OwnedReadHalf, LineCodec>;
type ServerWriter = FramedWrite<OwnedWriteHalf, LineCodec>;

const INPUT_CHUNK: usize = 4096;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local input reached end of file
    InputClosed,
    /// The server ended the stream
    ServerClosed,
}

/// A connected client
///
/// Lines sent and received are framed with the same cap as the server's
/// default, so a line the server would reject never leaves the client.
pub struct ClientSession {
    reader: ServerReader,
    writer: ServerWriter,
    peer_addr: SocketAddr,
    max_line_length: usize,
    closed: bool,
}

impl ClientSession {
    /// Resolve the configured address and connect within the connect timeout
    #[instrument(skip(config), fields(address = %config.address()))]
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let operation = format!("connect to {}", config.address());

        debug!("Connecting");
        let stream = match timeout(
            config.connect_timeout,
            TcpStream::connect(config.address()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(ClientError::setup(operation, err)),
            Err(_) => {
                let err = io::Error::new(io::ErrorKind::TimedOut, "connection timed out");
                return Err(ClientError::setup(operation, err));
            }
        };

        let session = Self::from_stream(stream, config.max_line_length)?;
        info!(peer_addr = %session.peer_addr, "Connected");
        Ok(session)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, max_line_length: usize) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        let codec = LineCodec::with_max_length(max_line_length);
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FramedRead::new(read_half, codec.clone()),
            writer: FramedWrite::new(write_half, codec),
            peer_addr,
            max_line_length,
            closed: false,
        })
    }

    /// Get the server address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Check if the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one line and flush it
    pub async fn send_line(&mut self, line: Line) -> Result<()> {
        if self.closed {
            return Err(ClientError::ConnectionClosed);
        }
        self.writer.send(line).await?;
        Ok(())
    }

    /// Receive the next line from the server
    ///
    /// End of stream is reported as [`ClientError::ConnectionClosed`].
    pub async fn receive_line(&mut self) -> Result<Line> {
        if self.closed {
            return Err(ClientError::ConnectionClosed);
        }
        match self.reader.next().await {
            Some(Ok(line)) => Ok(line),
            Some(Err(err)) => Err(err.into()),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Flush and shut down the write side
    ///
    /// Only the first call touches the socket.
    pub async fn close(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        match SinkExt::<Line>::close(&mut self.writer).await.map_err(ClientError::from) {
            Err(err) if !err.is_normal_close() => Err(err),
            _ => {
                debug!(peer_addr = %self.peer_addr, "Session closed");
                Ok(())
            }
        }
    }

    /// Send each line in order, then close
    ///
    /// Returns how many lines were sent.
    pub async fn send_once<I>(mut self, lines: I) -> Result<usize>
    where
        I: IntoIterator<Item = Line>,
    {
        let mut sent = 0;
        for line in lines {
            if let Err(err) = self.send_line(line).await {
                let _ = self.close().await;
                return Err(err);
            }
            sent += 1;
        }
        self.close().await?;
        Ok(sent)
    }

    /// Relay lines from `input` to the server and from the server to `output`
    ///
    /// Both directions make progress independently. The session ends when
    /// either side reaches end of stream; the other direction is abandoned
    /// and the connection is closed once.
    pub async fn run<I, O>(mut self, mut input: I, output: O) -> Result<SessionEnd>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut output = FramedWrite::new(output, LineCodec::new());
        let max_line_length = self.max_line_length;

        let ended = {
            let Self { reader, writer, .. } = &mut self;
            select! {
                ended = forward_input(&mut input, writer, max_line_length) => ended,
                ended = forward_output(reader, &mut output) => ended,
            }
        };

        let closed = self.close().await;
        let end = ended?;
        closed?;
        info!(?end, "Session ended");
        Ok(end)
    }
}

/// Send local input lines to the server
///
/// Oversized input is skipped up to the next newline, so at most one capped
/// line is ever buffered. `FramedRead` would end the stream at the first
/// oversized line, so the codec is driven directly.
async fn forward_input<I>(
    input: &mut I,
    writer: &mut ServerWriter,
    max_line_length: usize,
) -> Result<SessionEnd>
where
    I: AsyncRead + Unpin,
{
    let mut codec = LineCodec::with_max_length(max_line_length).with_trim_carriage_return(true);
    let mut buffer = BytesMut::with_capacity(INPUT_CHUNK);
    loop {
        let read = input.read_buf(&mut buffer).await?;
        let mut lines = codec.decode_lines(&mut buffer);
        if read == 0 {
            lines.extend(codec.decode_eof(&mut buffer).transpose());
        }

        for line in lines {
            match line {
                Ok(line) => {
                    trace!(length = line.len(), "Sending line");
                    writer.send(line).await?;
                }
                Err(CodecError::MessageTooLarge { length, max }) => {
                    warn!(length, max, "Line too long, not sent");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if read == 0 {
            return Ok(SessionEnd::InputClosed);
        }
    }
}

async fn forward_output<O>(
    reader: &mut ServerReader,
    output: &mut FramedWrite<O, LineCodec>,
) -> Result<SessionEnd>
where
    O: AsyncWrite + Unpin,
{
    while let Some(line) = reader.next().await {
        output.send(line?).await?;
    }
    info!("Server closed connection");
    Ok(SessionEnd::ServerClosed)
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("peer_addr", &self.peer_addr)
            .field("max_line_length", &self.max_line_length)
            .field("closed", &self.closed)
            .finish()
    }
}

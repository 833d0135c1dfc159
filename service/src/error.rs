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

//! Error types for the relay service

use crate::types::ConnectionId;
use linecast_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay service error types
#[derive(Debug, Error)]
pub enum RelayError {
    /// Binding, listening or resolving failed; fatal for startup
    #[error("Failed to {operation}: {source}")]
    Setup {
        /// What was being attempted, e.g. `bind 0.0.0.0:0`
        operation: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The peer ended the stream, or the connection was already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Unexpected I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// A line contained the delimiter
    #[error("Invalid message: delimiter found at byte {position}")]
    InvalidMessage {
        /// Offset of the offending delimiter
        position: usize,
    },

    /// A line reached the configured length cap
    #[error("Message too large: {length} bytes (limit {max})")]
    MessageTooLarge {
        /// Observed length in bytes
        length: usize,
        /// Configured cap
        max: usize,
    },

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// A connection with the given ID is already registered
    #[error("Connection {0} already registered")]
    DuplicateConnection(ConnectionId),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Server was already started
    #[error("Server already running")]
    AlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    NotRunning,

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Create a setup error for the given operation
    pub fn setup(operation: impl Into<String>, source: io::Error) -> Self {
        RelayError::Setup {
            operation: operation.into(),
            source,
        }
    }

    /// Check if the error is an orderly end of stream rather than a failure
    pub fn is_normal_close(&self) -> bool {
        matches!(self, RelayError::ConnectionClosed)
    }

    /// Check if the error only affects a single connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RelayError::ConnectionClosed
                | RelayError::Io(_)
                | RelayError::InvalidMessage { .. }
                | RelayError::MessageTooLarge { .. }
                | RelayError::ConnectionNotFound(_)
                | RelayError::Timeout
        )
    }

    /// Check if the error is a framing violation
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidMessage { .. } | RelayError::MessageTooLarge { .. }
        )
    }

    /// Check if the error must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Setup { .. } | RelayError::InvalidConfig(_))
    }
}

impl From<io::Error> for RelayError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => RelayError::ConnectionClosed,
            _ => RelayError::Io(error),
        }
    }
}

impl From<CodecError> for RelayError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::InvalidMessage { position } => RelayError::InvalidMessage { position },
            CodecError::MessageTooLarge { length, max } => {
                RelayError::MessageTooLarge { length, max }
            }
            CodecError::Io(err) => RelayError::from(err),
        }
    }
}

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

//! Client error types

use linecast_codec::CodecError;
use std::io;
use thiserror::Error;

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Resolving or connecting to the server failed
    #[error("Failed to {operation}: {source}")]
    Setup {
        /// What was being attempted, e.g. `connect to localhost:4000`
        operation: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The server ended the stream, or the session was already closed
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Unexpected I/O error on the socket or the local terminal
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// A line could not be framed
    #[error("Codec error: {0}")]
    Codec(CodecError),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Create a setup error for the given operation
    pub fn setup(operation: impl Into<String>, source: io::Error) -> Self {
        ClientError::Setup {
            operation: operation.into(),
            source,
        }
    }

    /// Check if the error is an orderly end of stream
    pub fn is_normal_close(&self) -> bool {
        matches!(self, ClientError::ConnectionClosed)
    }

    /// Check if the error happened before a session was established
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            ClientError::Setup { .. } | ClientError::InvalidConfig(_)
        )
    }
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ClientError::ConnectionClosed,
            _ => ClientError::Io(error),
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Io(err) => ClientError::from(err),
            other => ClientError::Codec(other),
        }
    }
}

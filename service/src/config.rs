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

//! Server configuration

use crate::{BroadcastPolicy, RelayError, Result};
use linecast_codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
///
/// Use the builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use linecast_service::{BroadcastPolicy, ServerConfig};
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_connections(500)
///     .with_max_line_length(4096)
///     .with_write_timeout(Duration::from_secs(5))
///     .with_broadcast_policy(BroadcastPolicy::IncludeSender);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to; port 0 asks the OS for an ephemeral port
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Lines of this many bytes or more terminate the sending connection
    pub max_line_length: usize,

    /// Capacity of each connection's outbound queue
    ///
    /// A recipient whose queue is full when a broadcast arrives is disconnected.
    pub outbound_queue_size: usize,

    /// Timeout for a single line write
    pub write_timeout: Duration,

    /// Timeout for graceful shutdown
    ///
    /// The server will wait this long for connection workers to finish before returning.
    pub shutdown_timeout: Duration,

    /// Whether senders see their own lines
    pub broadcast_policy: BroadcastPolicy,

    /// Strip a trailing `\r` from received lines
    pub trim_carriage_return: bool,

    /// Log every received line at info level
    pub log_lines: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            max_connections: 1000,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            outbound_queue_size: 256,
            write_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            broadcast_policy: BroadcastPolicy::default(),
            trim_carriage_return: false,
            log_lines: false,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the line length cap
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Set the per-connection outbound queue capacity
    pub fn with_outbound_queue_size(mut self, size: usize) -> Self {
        self.outbound_queue_size = size;
        self
    }

    /// Set the write timeout duration
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the broadcast policy
    pub fn with_broadcast_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.broadcast_policy = policy;
        self
    }

    /// Enable or disable carriage return trimming
    pub fn with_trim_carriage_return(mut self, enabled: bool) -> Self {
        self.trim_carriage_return = enabled;
        self
    }

    /// Enable or disable logging of every received line
    pub fn with_log_lines(mut self, enabled: bool) -> Self {
        self.log_lines = enabled;
        self
    }

    /// Build the codec each connection uses
    pub fn codec(&self) -> LineCodec {
        LineCodec::with_max_length(self.max_line_length)
            .with_trim_carriage_return(self.trim_carriage_return)
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(invalid("max_connections must be greater than 0"));
        }

        if self.max_line_length == 0 {
            return Err(invalid("max_line_length must be greater than 0"));
        }

        if self.outbound_queue_size == 0 {
            return Err(invalid("outbound_queue_size must be greater than 0"));
        }

        if self.write_timeout.is_zero() {
            return Err(invalid("write_timeout must be greater than 0"));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(invalid("shutdown_timeout must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> RelayError {
    RelayError::InvalidConfig(reason.to_string())
}

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

//! Command line arguments

use clap::Parser;
use linecast_service::{BroadcastPolicy, DEFAULT_MAX_LINE_LENGTH, ServerConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Parser, Debug)]
#[command(name = "linecast-server", author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on. Omit for an OS-assigned port.
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Lines at or above this many bytes disconnect the sender
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// Connections beyond this count are refused
    #[arg(long, default_value_t = 1000)]
    pub max_connections: usize,

    /// Lines buffered per recipient before it counts as a slow consumer
    #[arg(long = "queue-size", default_value_t = 256)]
    pub queue_size: usize,

    /// Relay lines back to their sender as well
    #[arg(long)]
    pub echo_sender: bool,

    /// Drop a carriage return before each newline
    #[arg(long)]
    pub trim_carriage_return: bool,

    /// Log every relayed line
    #[arg(long)]
    pub log_lines: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Build the server configuration these arguments describe
    pub fn server_config(&self) -> ServerConfig {
        let policy = if self.echo_sender {
            BroadcastPolicy::IncludeSender
        } else {
            BroadcastPolicy::ExcludeSender
        };
        ServerConfig::new(SocketAddr::new(self.host, self.port.unwrap_or(0)))
            .with_max_line_length(self.max_line_length)
            .with_max_connections(self.max_connections)
            .with_outbound_queue_size(self.queue_size)
            .with_broadcast_policy(policy)
            .with_trim_carriage_return(self.trim_carriage_return)
            .with_log_lines(self.log_lines)
    }
}

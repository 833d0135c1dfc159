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

//! Unit tests for configuration types

use std::net::SocketAddr;
use std::time::Duration;
use linecast_service::{BroadcastPolicy, RelayError, ServerConfig, WorkerConfig};

#[test]
fn test_server_config_defaults() {
    let config = ServerConfig::default();

    assert_eq!(config.bind_address, SocketAddr::from(([0, 0, 0, 0], 0)));
    assert_eq!(config.max_connections, 1000);
    assert_eq!(config.max_line_length, 1024);
    assert_eq!(config.outbound_queue_size, 256);
    assert_eq!(config.write_timeout, Duration::from_secs(10));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    assert_eq!(config.broadcast_policy, BroadcastPolicy::ExcludeSender);
    assert!(!config.trim_carriage_return);
    assert!(!config.log_lines);
}

#[test]
fn test_server_config_builder() {
    let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    let config = ServerConfig::new(addr)
        .with_max_connections(10)
        .with_max_line_length(80)
        .with_outbound_queue_size(32)
        .with_write_timeout(Duration::from_millis(500))
        .with_shutdown_timeout(Duration::from_secs(1))
        .with_broadcast_policy(BroadcastPolicy::IncludeSender)
        .with_trim_carriage_return(true)
        .with_log_lines(true);

    assert_eq!(config.bind_address, addr);
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.max_line_length, 80);
    assert_eq!(config.outbound_queue_size, 32);
    assert_eq!(config.write_timeout, Duration::from_millis(500));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    assert_eq!(config.broadcast_policy, BroadcastPolicy::IncludeSender);
    assert!(config.trim_carriage_return);
    assert!(config.log_lines);
    assert!(config.validate().is_ok());
}

#[test]
fn test_server_config_rejects_zero_values() {
    let cases = [
        ServerConfig::default().with_max_connections(0),
        ServerConfig::default().with_max_line_length(0),
        ServerConfig::default().with_outbound_queue_size(0),
        ServerConfig::default().with_write_timeout(Duration::ZERO),
        ServerConfig::default().with_shutdown_timeout(Duration::ZERO),
    ];

    for config in cases {
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig(_)));
        assert!(err.is_fatal());
    }
}

#[test]
fn test_server_config_codec() {
    let codec = ServerConfig::default().with_max_line_length(16).codec();
    assert_eq!(codec.max_length(), 16);
}

#[test]
fn test_worker_config_from_server_config() {
    let config = ServerConfig::default()
        .with_write_timeout(Duration::from_secs(3))
        .with_log_lines(true);
    let worker = WorkerConfig::from(&config);

    assert_eq!(worker.write_timeout, Duration::from_secs(3));
    assert!(worker.log_lines);

    let defaults = WorkerConfig::default();
    assert_eq!(defaults.write_timeout, Duration::from_secs(10));
    assert!(!defaults.log_lines);
}

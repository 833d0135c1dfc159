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

//! Line relay server
//!
//! Accepts any number of TCP connections and relays every newline-terminated
//! line to every other connected peer.

mod cli;

use clap::Parser;
use cli::Cli;
use linecast_service::{NoopHandler, RelayError, RelayServer};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let server = RelayServer::new(cli.server_config())?;
    let local_addr = server.start(Arc::new(NoopHandler)).await?;
    println!("Listening on port {}", local_addr.port());

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| RelayError::setup("listen for ctrl-c", err))?;
    info!("Shutdown requested");

    server.shutdown().await?;
    let metrics = server.metrics().snapshot();
    info!(
        total_connections = metrics.total_connections,
        lines_received = metrics.lines_received,
        lines_delivered = metrics.lines_delivered,
        uptime = ?metrics.uptime,
        "Server stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(err) = run(cli).await {
        eprintln!("linecast-server: {}", err);
        std::process::exit(1);
    }
}

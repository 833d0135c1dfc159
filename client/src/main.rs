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

//! Command line client for a linecast relay

use clap::Parser;
use linecast_client::{ClientConfig, ClientSession, DEFAULT_MAX_LINE_LENGTH, Line, SessionEnd};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "linecast-client", author, version, about, long_about = None)]
struct Cli {
    /// Server hostname or IP address
    host: String,

    /// Server port
    port: u16,

    /// Send this line and exit instead of reading standard input; repeatable
    #[arg(short, long = "message", value_name = "TEXT")]
    messages: Vec<String>,

    /// Lines at or above this many bytes are not sent
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        ClientConfig::new(cli.host, cli.port).with_max_line_length(cli.max_line_length);
    let session = ClientSession::connect(&config).await?;

    if !cli.messages.is_empty() {
        let lines = cli
            .messages
            .into_iter()
            .map(Line::new)
            .collect::<Result<Vec<_>, _>>()?;
        let sent = session.send_once(lines).await?;
        debug!(sent, "Messages sent");
        return Ok(());
    }

    match session.run(tokio::io::stdin(), tokio::io::stdout()).await? {
        SessionEnd::InputClosed => info!("End of input"),
        SessionEnd::ServerClosed => eprintln!("*** server closed the connection"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    // Exit explicitly: a pending blocking stdin read would otherwise hold
    // runtime shutdown until the user presses enter.
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("linecast-client: {}", err);
            1
        }
    };
    std::process::exit(code);
}

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

//! # Linecast Client
//!
//! Connects to a linecast relay and exchanges newline-delimited lines with it.
//! A [`ClientSession`] either runs interactively, forwarding local input to
//! the server while printing whatever the server relays, or sends a fixed set
//! of lines once and disconnects.
//!
//! ```no_run
//! use linecast_client::{ClientConfig, ClientSession, SessionEnd};
//!
//! # async fn example() -> linecast_client::Result<()> {
//! let config = ClientConfig::new("localhost", 4000);
//! let session = ClientSession::connect(&config).await?;
//! let end = session.run(tokio::io::stdin(), tokio::io::stdout()).await?;
//! assert!(matches!(end, SessionEnd::InputClosed | SessionEnd::ServerClosed));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod session;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::{ClientSession, SessionEnd};

pub use linecast_codec::{CodecError, DEFAULT_MAX_LINE_LENGTH, Line};

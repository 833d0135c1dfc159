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

//! # Linecast Line Codec
//!
//! A Tokio codec that turns a raw byte stream into newline-delimited [`Line`]s
//! and back.
//!
//! - Partial reads are buffered until a delimiter arrives
//! - Lines at or above the configured cap fail with [`CodecError::MessageTooLarge`]
//!   and the codec resynchronises at the next delimiter
//! - Encoding refuses payloads that already contain the delimiter
//!
//! ```
//! use bytes::BytesMut;
//! use linecast_codec::{Line, LineCodec};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut codec = LineCodec::with_max_length(1024);
//! let mut wire = BytesMut::new();
//! codec.encode(Line::new("hello").unwrap(), &mut wire).unwrap();
//! assert_eq!(&wire[..], b"hello\n");
//!
//! let line = codec.decode(&mut wire).unwrap().unwrap();
//! assert_eq!(line.as_str(), Some("hello"));
//! ```

mod codec;
mod line;
mod result;

pub use codec::{DEFAULT_MAX_LINE_LENGTH, LineCodec};
pub use line::{DELIMITER, Line};
pub use result::{CodecError, CodecResult};

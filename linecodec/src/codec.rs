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

use crate::{CodecError, CodecResult, DELIMITER, Line};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Default cap applied by servers and clients, matching the classic 1024 byte receive buffer.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Newline-delimited line codec.
///
/// The decoder keeps every byte after the last delimiter in the source buffer,
/// so a line split across any number of reads is reassembled in order.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Lines of this many bytes or more are rejected; `usize::MAX` disables the cap
    max_length: usize,
    /// Offset into the buffer already scanned for a delimiter
    next_index: usize,
    /// Dropping the remainder of an oversized line until the next delimiter
    discarding: bool,
    /// Drop one `\r` immediately before the delimiter on decode
    trim_carriage_return: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a codec without a length cap
    pub fn new() -> Self {
        Self {
            max_length: usize::MAX,
            next_index: 0,
            discarding: false,
            trim_carriage_return: false,
        }
    }

    /// Create a codec that rejects lines of `max_length` bytes or more
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::new()
        }
    }

    /// Enable or disable dropping a trailing `\r` from decoded lines
    pub fn with_trim_carriage_return(mut self, enabled: bool) -> Self {
        self.trim_carriage_return = enabled;
        self
    }

    /// Get the configured cap (`usize::MAX` when uncapped)
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Check if the codec is currently dropping an oversized line
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Decode every complete line in `buffer`, leaving the unterminated tail in place.
    ///
    /// Framing violations appear inline, in stream order, and decoding continues
    /// after them.
    pub fn decode_lines(&mut self, buffer: &mut BytesMut) -> Vec<CodecResult<Line>> {
        let mut lines = Vec::new();
        loop {
            match self.decode(buffer) {
                Ok(Some(line)) => lines.push(Ok(line)),
                Ok(None) => break,
                Err(err) => lines.push(Err(err)),
            }
        }
        lines
    }

    /// Append freshly read bytes to the leftover `buffer` and decode what is complete.
    pub fn decode_chunk(&mut self, buffer: &mut BytesMut, new_bytes: &[u8]) -> Vec<CodecResult<Line>> {
        buffer.extend_from_slice(new_bytes);
        self.decode_lines(buffer)
    }

    fn finish_line(&self, mut frame: BytesMut) -> Line {
        if self.trim_carriage_return && frame.last() == Some(&b'\r') {
            frame.truncate(frame.len() - 1);
        }
        Line::from_frame(frame.freeze())
    }

    fn check_length(&self, length: usize) -> CodecResult<()> {
        if length >= self.max_length {
            return Err(CodecError::MessageTooLarge {
                length,
                max: self.max_length,
            });
        }
        Ok(())
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> CodecResult<Option<Line>> {
        loop {
            let start = self.next_index.min(src.len());
            let found = src[start..]
                .iter()
                .position(|b| *b == DELIMITER)
                .map(|offset| offset + start);

            match (self.discarding, found) {
                (true, Some(index)) => {
                    src.advance(index + 1);
                    self.discarding = false;
                    self.next_index = 0;
                    trace!("Resynchronised after oversized line");
                }
                (true, None) => {
                    src.advance(src.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(index)) => {
                    self.next_index = 0;
                    if let Err(err) = self.check_length(index) {
                        src.advance(index + 1);
                        warn!(length = index, max = self.max_length, "Rejected oversized line");
                        return Err(err);
                    }
                    let mut frame = src.split_to(index + 1);
                    frame.truncate(index);
                    return Ok(Some(self.finish_line(frame)));
                }
                (false, None) => {
                    let length = src.len();
                    if let Err(err) = self.check_length(length) {
                        src.advance(length);
                        self.discarding = true;
                        self.next_index = 0;
                        warn!(length, max = self.max_length, "Rejected oversized partial line");
                        return Err(err);
                    }
                    self.next_index = length;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> CodecResult<Option<Line>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }
        if src.is_empty() {
            return Ok(None);
        }
        let frame = src.split_to(src.len());
        Ok(Some(self.finish_line(frame)))
    }
}

impl Encoder<Line> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Line, dst: &mut BytesMut) -> CodecResult<()> {
        self.check_length(item.len())?;
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(DELIMITER);
        Ok(())
    }
}

impl Encoder<&Line> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Line, dst: &mut BytesMut) -> CodecResult<()> {
        self.encode(item.clone(), dst)
    }
}

impl Encoder<&[u8]> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> CodecResult<()> {
        if let Some(position) = item.iter().position(|b| *b == DELIMITER) {
            return Err(CodecError::InvalidMessage { position });
        }
        self.check_length(item.len())?;
        dst.reserve(item.len() + 1);
        dst.put_slice(item);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}

impl Encoder<&str> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> CodecResult<()> {
        self.encode(item.as_bytes(), dst)
    }
}

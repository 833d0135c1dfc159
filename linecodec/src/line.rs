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

use crate::{CodecError, CodecResult};
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;

/// The byte that terminates every line on the wire.
pub const DELIMITER: u8 = b'\n';

/// An immutable line payload that never contains [`DELIMITER`].
///
/// Cloning is cheap; the bytes are reference counted, so one decoded line can
/// be fanned out to many recipients without copying.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Line(Bytes);

impl Line {
    /// Create a line from raw bytes
    ///
    /// Fails with [`CodecError::InvalidMessage`] if the payload contains the delimiter.
    pub fn new(bytes: impl Into<Bytes>) -> CodecResult<Self> {
        let bytes = bytes.into();
        match bytes.iter().position(|b| *b == DELIMITER) {
            Some(position) => Err(CodecError::InvalidMessage { position }),
            None => Ok(Self(bytes)),
        }
    }

    /// Wrap bytes the decoder has already split at a delimiter.
    pub(crate) fn from_frame(bytes: Bytes) -> Self {
        debug_assert!(!bytes.contains(&DELIMITER));
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the line, returning the underlying bytes
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Get the line length in bytes (delimiter excluded)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the line is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the line as UTF-8, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Get the line as text, replacing invalid UTF-8 sequences
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?})", self.to_string_lossy())
    }
}

impl AsRef<[u8]> for Line {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&'static str> for Line {
    type Error = CodecError;

    fn try_from(value: &'static str) -> CodecResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for Line {
    type Error = CodecError;

    fn try_from(value: String) -> CodecResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<Vec<u8>> for Line {
    type Error = CodecError;

    fn try_from(value: Vec<u8>) -> CodecResult<Self> {
        Self::new(value)
    }
}

impl From<Line> for Bytes {
    fn from(line: Line) -> Self {
        line.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_rejects_delimiter() {
        let err = Line::new("one\ntwo").unwrap_err();
        assert!(matches!(err, CodecError::InvalidMessage { position: 3 }));
    }

    #[test]
    fn test_line_accessors() {
        let line = Line::new("hello").unwrap();
        assert_eq!(line.len(), 5);
        assert!(!line.is_empty());
        assert_eq!(line.as_bytes(), b"hello");
        assert_eq!(line.as_str(), Some("hello"));
        assert_eq!(line.to_string(), "hello");
        assert!(Line::default().is_empty());
    }

    #[test]
    fn test_line_non_utf8() {
        let line = Line::new(vec![0x66, 0xFF, 0x6F]).unwrap();
        assert_eq!(line.as_str(), None);
        assert_eq!(line.to_string_lossy(), "f\u{FFFD}o");
    }

    #[test]
    fn test_line_try_from() {
        assert!(Line::try_from(String::from("ok")).is_ok());
        assert!(Line::try_from(b"bad\n".to_vec()).is_err());
    }
}

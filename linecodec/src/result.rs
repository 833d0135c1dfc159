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

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Represents possible errors that can occur while framing lines.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload contains the line delimiter and cannot be framed.
    ///
    /// `position` is the byte offset of the first delimiter found.
    #[error("Invalid message: delimiter found at byte {position}")]
    InvalidMessage {
        /// Offset of the offending delimiter
        position: usize,
    },

    /// A line reached the configured length cap.
    ///
    /// On decode, `length` is the number of bytes seen before the codec gave up
    /// on the line, which may be less than the full line length.
    #[error("Message too large: {length} bytes (limit {max})")]
    MessageTooLarge {
        /// Observed length in bytes, delimiter excluded
        length: usize,
        /// Configured cap
        max: usize,
    },

    /// An I/O error occurred while reading from or writing to the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Check if the error is a framing violation rather than a transport failure
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidMessage { .. } | CodecError::MessageTooLarge { .. }
        )
    }
}

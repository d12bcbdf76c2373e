// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use std::ops::Range;

use thiserror::Error;

/// Errors occurring when parsing a protocol message.
#[derive(Error, Debug)]
pub enum Error {
    /// The payload length is outside the allowed range of the message type.
    #[error("Invalid payload length: expected one of {expected:?}, got {actual}.")]
    InvalidPayloadLength {
        /// Allowed length range.
        expected: Range<usize>,
        /// Actual length.
        actual: usize,
    },
}

/// A type that can be sent over the wire to a peer.
///
/// The framing itself (type byte and length prefix) belongs to the gossip
/// transport; this trait only describes the payload.
pub trait Message: Sized {
    /// Protocol identifier of the message type.
    const ID: u8;

    /// Allowed payload length range of the message type.
    fn size_range() -> Range<usize>;

    /// Parses a payload, after its length was validated.
    fn from_bytes_unchecked(bytes: &[u8]) -> Self;

    /// Parses a payload, validating its length.
    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if !Self::size_range().contains(&bytes.len()) {
            return Err(Error::InvalidPayloadLength {
                expected: Self::size_range(),
                actual: bytes.len(),
            });
        }

        Ok(Self::from_bytes_unchecked(bytes))
    }

    /// The payload length of this instance.
    fn size(&self) -> usize;

    /// Writes the payload into the given buffer, which has `size()` bytes.
    fn into_bytes(self, bytes: &mut [u8]);

    /// Writes the payload into a newly allocated vector.
    fn into_bytes_new(self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size()];
        self.into_bytes(&mut bytes);
        bytes
    }
}

// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

use vespa_common::packable::{Packable, Read, Write};

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};

use std::fmt;

/// Length of a hash in bytes. Externally a hash is 243 trits; packed five
/// trits to a byte this takes 49 bytes, the last byte carrying only three.
pub const HASH_LENGTH: usize = 49;

/// Number of trytes in the display form of a hash.
const HASH_TRYTES_LENGTH: usize = 81;

/// The tryte alphabet. Index 0 is `9`, indices 1 to 13 are `A` to `M`
/// (tryte values 1 to 13) and indices 14 to 26 are `N` to `Z` (tryte values
/// -13 to -1).
pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A fixed-width binary transaction, bundle or address hash.
///
/// Equality, ordering and persistence always use the raw bytes; the tryte
/// form is for display only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// The all-zero hash, used as the genesis reference.
    pub const NULL: Self = Self([0u8; HASH_LENGTH]);

    /// Creates a hash from its raw bytes.
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this is the all-zero hash.
    pub fn is_null(&self) -> bool {
        self == &Self::NULL
    }

    /// Digests arbitrary bytes into a hash.
    pub fn digest(bytes: &[u8]) -> Self {
        // Safe to unwrap: the digest size is a valid blake2b output size.
        let mut hasher = Blake2bVar::new(HASH_LENGTH).unwrap();
        hasher.update(bytes);

        let mut hash = [0u8; HASH_LENGTH];
        hasher.finalize_variable(&mut hash).unwrap();

        Self(hash)
    }

    /// Creates a hash from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_LENGTH {
            return None;
        }

        let mut hash = [0u8; HASH_LENGTH];
        hash.copy_from_slice(bytes);

        Some(Self(hash))
    }

    /// Returns the 81-tryte display form of the hash.
    ///
    /// Each byte is read as five balanced trits; the first 243 trits are
    /// grouped into 81 trytes.
    pub fn to_trytes(&self) -> String {
        let mut trits = Vec::with_capacity(HASH_LENGTH * 5);

        for byte in self.0 {
            let mut value = byte as i8 as i32;
            for _ in 0..5 {
                let mut trit = value % 3;
                value /= 3;
                if trit == 2 {
                    trit = -1;
                    value += 1;
                } else if trit == -2 {
                    trit = 1;
                    value -= 1;
                }
                trits.push(trit);
            }
        }

        let mut trytes = String::with_capacity(HASH_TRYTES_LENGTH);

        for tryte in trits.chunks(3).take(HASH_TRYTES_LENGTH) {
            let value = tryte[0] + 3 * tryte[1] + 9 * tryte[2];
            trytes.push(TRYTE_ALPHABET[value.rem_euclid(27) as usize] as char);
        }

        trytes
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_trytes())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_trytes())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Packable for Hash {
    type Error = std::io::Error;

    fn packed_len(&self) -> usize {
        HASH_LENGTH
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        writer.write_all(&self.0)
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        let mut bytes = [0u8; HASH_LENGTH];
        reader.read_exact(&mut bytes)?;

        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_null() {
        assert!(Hash::NULL.is_null());
        assert!(!Hash::new([1u8; HASH_LENGTH]).is_null());
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(Hash::from_slice(&[0u8; HASH_LENGTH]).is_some());
        assert!(Hash::from_slice(&[0u8; HASH_LENGTH - 1]).is_none());
        assert!(Hash::from_slice(&[0u8; HASH_LENGTH + 1]).is_none());
    }

    #[test]
    fn trytes_length_and_alphabet() {
        let trytes = Hash::new([0x5au8; HASH_LENGTH]).to_trytes();

        assert_eq!(trytes.len(), 81);
        assert!(trytes.bytes().all(|c| TRYTE_ALPHABET.contains(&c)));
    }

    #[test]
    fn null_hash_displays_as_all_nine() {
        assert_eq!(Hash::NULL.to_string(), "9".repeat(81));
    }

    #[test]
    fn packable_round_trip() {
        let hash = Hash::new([0xabu8; HASH_LENGTH]);
        let bytes = hash.pack_new().unwrap();

        assert_eq!(bytes.len(), HASH_LENGTH);
        assert_eq!(Hash::unpack(&mut bytes.as_slice()).unwrap(), hash);
    }
}

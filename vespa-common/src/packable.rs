// Copyright 2022 Vespa Contributors
// SPDX-License-Identifier: Apache-2.0

//! A module that provides a `Packable` trait to serialize and deserialize types.

pub use std::io::{Read, Write};

/// A trait to pack and unpack types to and from bytes.
pub trait Packable {
    /// Associated error type.
    type Error;

    /// Returns the length of the packed bytes.
    fn packed_len(&self) -> usize;

    /// Packs the instance to bytes and writes them to the passed writer.
    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error>;

    /// Packs the instance to bytes and writes them to a newly allocated vector.
    fn pack_new(&self) -> Result<Vec<u8>, Self::Error> {
        let mut bytes = Vec::with_capacity(self.packed_len());
        self.pack(&mut bytes)?;

        Ok(bytes)
    }

    /// Reads bytes from the passed reader and unpacks them into an instance.
    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized;
}

impl Packable for bool {
    type Error = std::io::Error;

    fn packed_len(&self) -> usize {
        (*self as u8).packed_len()
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        (*self as u8).pack(writer)
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        Ok(u8::unpack(reader)? != 0)
    }
}

macro_rules! impl_packable_for_int {
    ($ty:ty) => {
        impl Packable for $ty {
            type Error = std::io::Error;

            fn packed_len(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
                writer.write_all(&self.to_le_bytes())
            }

            fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
            where
                Self: Sized,
            {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                reader.read_exact(&mut bytes)?;

                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    };
}

impl_packable_for_int!(u8);
impl_packable_for_int!(u16);
impl_packable_for_int!(u32);
impl_packable_for_int!(u64);
impl_packable_for_int!(i64);

impl<T: Packable> Packable for Option<T>
where
    T::Error: From<std::io::Error>,
{
    type Error = T::Error;

    fn packed_len(&self) -> usize {
        match self {
            Some(inner) => 1 + inner.packed_len(),
            None => 1,
        }
    }

    fn pack<W: Write>(&self, writer: &mut W) -> Result<(), Self::Error> {
        match self {
            Some(inner) => {
                1u8.pack(writer)?;
                inner.pack(writer)
            }
            None => Ok(0u8.pack(writer)?),
        }
    }

    fn unpack<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Self::Error>
    where
        Self: Sized,
    {
        Ok(match u8::unpack(reader)? {
            0 => None,
            _ => Some(T::unpack(reader)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        let bytes = 0xdead_beefu32.pack_new().unwrap();

        assert_eq!(bytes.len(), 0xdead_beefu32.packed_len());
        assert_eq!(u32::unpack(&mut bytes.as_slice()).unwrap(), 0xdead_beef);
    }

    #[test]
    fn option_round_trip() {
        let bytes = Some(42u64).pack_new().unwrap();

        assert_eq!(Option::<u64>::unpack(&mut bytes.as_slice()).unwrap(), Some(42));

        let bytes = Option::<u64>::None.pack_new().unwrap();

        assert_eq!(bytes, vec![0]);
        assert_eq!(Option::<u64>::unpack(&mut bytes.as_slice()).unwrap(), None);
    }

    #[test]
    fn unpack_truncated() {
        assert!(u64::unpack(&mut [0u8; 4].as_slice()).is_err());
    }
}

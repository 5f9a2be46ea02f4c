//! Types and (de)serializers for the SH shader container and its embedded
//! SB (shader buffer) and DL (deduplicated list) sub-formats.
//!
//! An SH file bundles the compiled backend binaries (SPIR-V, DXIL) of one
//! shader source together with its reflection: entrypoints, resource
//! registers, constant buffer layouts, include provenance and the permutation
//! matrix the source was compiled under.

pub mod binaries;
pub mod codec;
pub mod dl;
pub mod entries;
pub mod registers;
pub mod sb;
pub mod sh;

use bytes::{Buf, BufMut};
use thiserror::Error;

pub use binaries::{BinaryIdentifier, BinaryInfo, ShExtensions, Vendor};
pub use registers::{BinaryType, ShBinding, ShBindings};
pub use sh::{DeviceCapabilities, ShFile, ShInclude, ShSettingsFlags};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Caller supplied bytes violating the serialized format.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A builder API was called with contents violating a container
    /// invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
    /// A 16-bit counter, a bindless ceiling or a per-entry limit overflowed.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),
    /// Two containers carry conflicting data for the same identifier.
    #[error("incompatible: {0}")]
    Incompatible(&'static str),
    /// The element exists already with different contents.
    #[error("already defined: {0}")]
    AlreadyDefined(&'static str),
    #[error(transparent)]
    UnexpectedEof(#[from] EofError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("unexpected eof reading {on}: got {remaining} of {expected} bytes")]
pub struct EofError {
    pub on: &'static str,
    pub remaining: usize,
    pub expected: usize,
}

pub trait Encode {
    fn encode<B>(&self, buf: B)
    where
        B: BufMut;
}

pub trait Decode: Sized {
    type Error;

    fn decode<B>(buf: B) -> Result<Self, Self::Error>
    where
        B: Buf;
}

macro_rules! int_impls {
    ($($id:ident),*$(,)?) => {
        $(
            impl Encode for $id {
                #[inline]
                fn encode<B>(&self, mut buf: B)
                    where B: BufMut,
                {
                    buf.put_slice(&self.to_le_bytes());
                }
            }

            impl Decode for $id {
                type Error = EofError;

                #[inline]
                fn decode<B>(mut buf: B) -> Result<Self, Self::Error>
                    where B: Buf,
                {
                    const N: usize = core::mem::size_of::<$id>();

                    if buf.remaining() < N {
                        return Err(EofError {
                            on: stringify!($id),
                            remaining: buf.remaining(),
                            expected: N,
                        });
                    }

                    let mut bytes = [0; N];
                    buf.copy_to_slice(&mut bytes);
                    Ok(Self::from_le_bytes(bytes))
                }
            }
        )*
    };
}

int_impls! {
    u8,
    u16,
    u32,
    u64,
}

/// Width of a serialized length field, chosen as the smallest type that fits
/// the largest value it has to carry. Two bits in the enclosing header record
/// the choice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataSizeType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
}

impl DataSizeType {
    pub fn required(value: u64) -> Self {
        if value <= u8::MAX as u64 {
            Self::U8
        } else if value <= u16::MAX as u64 {
            Self::U16
        } else if value <= u32::MAX as u64 {
            Self::U32
        } else {
            Self::U64
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::U8,
            1 => Self::U16,
            2 => Self::U32,
            _ => Self::U64,
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    pub fn write<B>(self, mut buf: B, value: u64)
    where
        B: BufMut,
    {
        match self {
            Self::U8 => (value as u8).encode(&mut buf),
            Self::U16 => (value as u16).encode(&mut buf),
            Self::U32 => (value as u32).encode(&mut buf),
            Self::U64 => value.encode(&mut buf),
        }
    }

    pub fn read<B>(self, mut buf: B) -> Result<u64, EofError>
    where
        B: Buf,
    {
        Ok(match self {
            Self::U8 => u8::decode(&mut buf)? as u64,
            Self::U16 => u16::decode(&mut buf)? as u64,
            Self::U32 => u32::decode(&mut buf)? as u64,
            Self::U64 => u64::decode(&mut buf)?,
        })
    }
}

/// Longest string any name pool accepts.
pub const SHORT_STRING_MAX: usize = u16::MAX as usize - 1;

pub(crate) fn is_ascii(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii())
}

//! A `brs` hunk header is a single 32-bit word in host byte order. Counting from the least significant bit, the first
//! two bits hold the kind of the hunk, the following seven bits the length of its name and the remaining 23 bits the
//! length of its payload:
//!
//! ```text
//!  31                                   9 8           2 1  0
//! +--------------------------------------+-------------+----+
//! |             payload_len              |  name_len   |kind|
//! +--------------------------------------+-------------+----+
//! ```
//!
//! Array items follow the header with a 16-bit index, map items with a one byte length and their secondary name. Then
//! come the name and the payload. A header whose bits are all zero is the end-of-subfield marker.

use crate::error::{DecodeError, EncodeError, NameKind};
use std::convert::TryFrom;
use std::io::Write;

const KIND_BITS: u32 = 2;
const NAME_BITS: u32 = 7;
const PAYLOAD_BITS: u32 = 23;

const NAME_SHIFT: u32 = KIND_BITS;
const PAYLOAD_SHIFT: u32 = KIND_BITS + NAME_BITS;

const KIND_MASK: u32 = (1 << KIND_BITS) - 1;
const NAME_MASK: u32 = (1 << NAME_BITS) - 1;
const PAYLOAD_MASK: u32 = (1 << PAYLOAD_BITS) - 1;

/// Longest name a hunk can carry
pub const MAX_NAME_LEN: usize = NAME_MASK as usize;
/// Largest payload a hunk can carry
pub const MAX_PAYLOAD_LEN: usize = PAYLOAD_MASK as usize;
/// Longest secondary name of a map item
pub const MAX_SUB_NAME_LEN: usize = u8::MAX as usize;
/// Largest index of an array item
pub const MAX_INDEX: usize = u16::MAX as usize;

/// Current version of the wire format
pub const VERSION: u8 = 1;

#[cfg(target_endian = "little")]
const ENDIAN_TAG: u8 = b'L';
#[cfg(target_endian = "big")]
const ENDIAN_TAG: u8 = b'B';

/// Every stream starts with these four bytes. The third byte records the byte order the stream was written in, so
/// a stream from a host of different endianness is rejected instead of being misread.
pub const MAGIC: [u8; 4] = [b'B', b'R', ENDIAN_TAG, VERSION];

/// Validates the magic at the start of a stream.
pub fn check_magic(magic: [u8; 4]) -> Result<(), DecodeError> {
    if magic == MAGIC {
        Ok(())
    } else {
        Err(DecodeError::MagicUnsupported(magic))
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Kind {
    /// A plain named value, also used for the start of a subfield and the end-of-subfield marker
    Field = 0,
    /// A value at a 16-bit index of a named array
    ArrayItem = 1,
    /// A value at a secondary name of a named map
    MapItem = 2,
}

impl Kind {

    /// Returns the mnemonic of the kind. This is useful for error messages.
    pub fn name(&self) -> &'static str {
        match *self {
            Kind::Field     => "Field",
            Kind::ArrayItem => "ArrayItem",
            Kind::MapItem   => "MapItem",
        }
    }

}

impl TryFrom<u8> for Kind {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            x if x == Kind::Field as u8     => Ok(Kind::Field),
            x if x == Kind::ArrayItem as u8 => Ok(Kind::ArrayItem),
            x if x == Kind::MapItem as u8   => Ok(Kind::MapItem),
            x => Err(DecodeError::UnknownKind(x)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Header {
    kind: Kind,
    name_len: u8,
    payload_len: u32,
}

impl Header {

    /// Size of an encoded header in bytes
    pub const SIZE: usize = std::mem::size_of::<u32>();

    /// Closes the innermost open subfield
    pub const END_OF_SUBFIELD: Header = Header { kind: Kind::Field, name_len: 0, payload_len: 0 };

    /// Creates a header for a hunk with a non-empty name. Fails if either length does not fit into its bits.
    pub fn new(kind: Kind, name_len: usize, payload_len: usize) -> Result<Self, EncodeError> {
        if name_len == 0 {
            return Err(EncodeError::EmptyName(NameKind::Name));
        }
        if name_len > MAX_NAME_LEN {
            return Err(EncodeError::NameTooLong { kind: NameKind::Name, len: name_len, max: MAX_NAME_LEN });
        }
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(EncodeError::PayloadTooLarge(payload_len));
        }
        Ok(Header { kind, name_len: name_len as u8, payload_len: payload_len as u32 })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn name_len(&self) -> usize {
        self.name_len as usize
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len as usize
    }

    pub fn is_end_of_subfield(&self) -> bool {
        *self == Self::END_OF_SUBFIELD
    }

    /// Packs the header into its 32-bit wire representation
    pub fn to_bits(&self) -> u32 {
        (self.kind as u32 & KIND_MASK)
            | (self.name_len as u32 & NAME_MASK) << NAME_SHIFT
            | (self.payload_len & PAYLOAD_MASK) << PAYLOAD_SHIFT
    }

    /// Unpacks a 32-bit word. Fails only on the reserved fourth kind.
    pub fn from_bits(bits: u32) -> Result<Self, DecodeError> {
        let kind = Kind::try_from((bits & KIND_MASK) as u8)?;
        let name_len = ((bits >> NAME_SHIFT) & NAME_MASK) as u8;
        let payload_len = (bits >> PAYLOAD_SHIFT) & PAYLOAD_MASK;
        Ok(Header { kind, name_len, payload_len })
    }

    /// Returns the number of written bytes
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<usize, EncodeError> {
        w.write_all(&self.to_bits().to_ne_bytes())?;
        Ok(Self::SIZE)
    }

    pub fn decode(buf: [u8; Self::SIZE]) -> Result<Self, DecodeError> {
        Self::from_bits(u32::from_ne_bytes(buf))
    }

}

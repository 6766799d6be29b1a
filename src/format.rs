//! Information and structures for RefPack streams.
//!
//! A RefPack stream is a small header followed by a run of byte-aligned commands.
//!
//! ## Header
//! | Byte Num | Description |
//! | :------: | ----------- |
//! | 0..2     | big endian signature (usually `0x10FB`) |
//! | 2..5     | big endian compressed size; only present if bit `0x0100` of the signature is set |
//! | 5..8 (2..5) | big endian size of the decompressed data |
//!
//! The header can be extracted into a [`RefPackHeader`] by using [`refpack_info()`].
//!
//! ## Commands
//! Every command first copies a run of literal bytes straight from the stream into
//! the output, then (optionally) copies bytes that were already written to the output.
//! The high bits of the first byte select the command:
//!
//! | Command | Bits | Literal | Distance | Length |
//! | ------- | ---- | ------- | -------- | ------ |
//! | 2 byte  | `0DDRRRPP DDDDDDDD` | 0..=3 | 1..=1024 | 3..=10 |
//! | 3 byte  | `10RRRRRR PPDDDDDD DDDDDDDD` | 0..=3 | 1..=16384 | 4..=67 |
//! | 4 byte  | `110DRRPP DDDDDDDD DDDDDDDD RRRRRRRR` | 0..=3 | 1..=131072 | 5..=1028 |
//! | 1 byte  | `111PPPPP` | 4..=112 | | |
//!
//! A one byte command whose literal run would be longer than 112 bytes (`0xFC..=0xFF`) is
//! the stop command. It copies the `0..=3` literals in its low bits and ends the stream.
//!
//! The distance counts backwards from the current end of the output, and the copy is
//! done one byte at a time. So, a copy with a distance of 1 and a length of 5 after
//! writing an `X` produces `XXXXX`.
//!
//! ## An Example
//! ```text
//! 10FB     <- signature, no compressed size
//! 000006   <- six bytes of output
//! 01 00    <- 2 byte command: one literal, copy 3 bytes from 1 byte back
//! 59       <- literal 'Y'
//! FE 41 42 <- stop command with two literals ('A', 'B')
//! ```
//! decodes to `YYYYAB`.
//!
//! [`refpack_info()`]: crate::refpack_info

use crate::errors::RefPackError;
use bitstream_io::{BigEndian, BitReader, BitWriter};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::io::{self, Cursor, Write};

/// The information stored at the start of a RefPack stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefPackHeader {
    pub signature: u16,
    /// size of the whole stream, if the signature says it is stored
    pub compressed_size: Option<u32>,
    /// size of decompressed data
    pub decompressed_size: u32,
}

impl RefPackHeader {
    /// The signature written by [`EncoderBuilder`](crate::EncoderBuilder)
    pub const SIGNATURE: u16 = 0x10FB;
    /// Signature bit flagging the optional compressed size field
    pub const HAS_COMPRESSED_SIZE: u16 = 0x0100;
    /// Largest value that fits in one of the 24 bit size fields
    pub const MAX_SIZE: u32 = 0x00FF_FFFF;

    /// Create a header with the standard signature, flagged for `compressed_size` when present
    pub fn new(decompressed_size: u32, compressed_size: Option<u32>) -> Self {
        let signature = match compressed_size {
            Some(_) => Self::SIGNATURE | Self::HAS_COMPRESSED_SIZE,
            None => Self::SIGNATURE,
        };

        Self {
            signature,
            compressed_size,
            decompressed_size,
        }
    }

    /// Number of bytes the header occupies at the start of the stream
    pub fn encoded_len(&self) -> usize {
        if self.compressed_size.is_some() {
            8
        } else {
            5
        }
    }

    /// Parse a header from the start of `src`
    pub(crate) fn from_bytes(src: &[u8]) -> Result<Self, RefPackError> {
        let truncated = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => RefPackError::TruncatedStream(src.len()),
            _ => RefPackError::Io(e),
        };
        let mut csr = Cursor::new(src);
        let mut rdr = BitReader::endian(&mut csr, BigEndian);

        let signature: u16 = rdr.read(16).map_err(truncated)?;
        let compressed_size = if signature & Self::HAS_COMPRESSED_SIZE != 0 {
            Some(rdr.read::<u32>(24).map_err(truncated)?)
        } else {
            None
        };
        let decompressed_size = rdr.read(24).map_err(truncated)?;

        Ok(Self {
            signature,
            compressed_size,
            decompressed_size,
        })
    }

    /// Read the header without any length checks.
    ///
    /// # Panics
    /// Panics if `src` is too short to hold the header its signature describes.
    pub(crate) fn from_trusted(src: &[u8]) -> Self {
        let signature = u16::from_be_bytes([src[0], src[1]]);
        let mut csr = 2;
        let compressed_size = if signature & Self::HAS_COMPRESSED_SIZE != 0 {
            csr += 3;
            Some(u24_be(&src[2..5]))
        } else {
            None
        };

        Self {
            signature,
            compressed_size,
            decompressed_size: u24_be(&src[csr..csr + 3]),
        }
    }

    /// Write out `self` to the big endian `BitWriter` to match the RefPack format
    pub(crate) fn write<W: Write>(&self, wtr: &mut BitWriter<W, BigEndian>) -> Result<(), RefPackError> {
        wtr.write(16, self.signature)?; // 0..2
        if let Some(size) = self.compressed_size {
            wtr.write(24, size)?; // 2..5
        }
        wtr.write(24, self.decompressed_size)?;

        Ok(())
    }
}

fn u24_be(b: &[u8]) -> u32 {
    u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2])
}

/// A copy from already decoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackRef {
    /// how far back from the end of the output the copy starts
    pub distance: usize,
    /// number of bytes to copy
    pub length: usize,
}

impl BackRef {
    pub const fn new(distance: usize, length: usize) -> Self {
        Self { distance, length }
    }
}

/// A single decoded RefPack command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// 2 byte command: `0DDRRRPP DDDDDDDD`
    Short { literal: usize, copy: BackRef },
    /// 3 byte command: `10RRRRRR PPDDDDDD DDDDDDDD`
    Medium { literal: usize, copy: BackRef },
    /// 4 byte command: `110DRRPP DDDDDDDD DDDDDDDD RRRRRRRR`
    Long { literal: usize, copy: BackRef },
    /// 1 byte literal block: `111PPPPP`
    Literal(usize),
    /// 1 byte stop command with trailing literals: `111111PP`
    Stop(usize),
}

impl Command {
    /// most literal bytes that can ride along with a copy or stop command
    pub const MAX_INLINE_LITERAL: usize = 3;
    /// largest 1 byte literal block
    pub const MAX_LITERAL_BLOCK: usize = 0x70;
    /// farthest lookback of any command
    pub const MAX_DISTANCE: usize = 0x2_0000;
    /// longest copy of any command
    pub const MAX_LENGTH: usize = 1028;
    /// shortest copy of any command
    pub const MIN_LENGTH: usize = 3;

    /// Number of bytes in the command that starts with `byte0`
    pub const fn size(byte0: u8) -> usize {
        if byte0 & 0x80 == 0 {
            2
        } else if byte0 & 0x40 == 0 {
            3
        } else if byte0 & 0x20 == 0 {
            4
        } else {
            1
        }
    }

    /// Decode the command at the start of `bytes`.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than [`Command::size`] of its first byte.
    pub fn parse(bytes: &[u8]) -> Self {
        let b0 = bytes[0];
        let b0u = usize::from(b0);

        match Self::size(b0) {
            2 => {
                let b1 = usize::from(bytes[1]);
                Self::Short {
                    literal: b0u & 0x03,
                    copy: BackRef::new(((b0u & 0x60) << 3) + b1 + 1, ((b0u >> 2) & 0x07) + 3),
                }
            }
            3 => {
                let (b1, b2) = (usize::from(bytes[1]), usize::from(bytes[2]));
                Self::Medium {
                    literal: b1 >> 6,
                    copy: BackRef::new(((b1 & 0x3F) << 8) + b2 + 1, (b0u & 0x3F) + 4),
                }
            }
            4 => {
                let (b1, b2, b3) = (
                    usize::from(bytes[1]),
                    usize::from(bytes[2]),
                    usize::from(bytes[3]),
                );
                Self::Long {
                    literal: b0u & 0x03,
                    copy: BackRef::new(
                        ((b0u & 0x10) << 12) + (b1 << 8) + b2 + 1,
                        ((b0u & 0x0C) << 6) + b3 + 5,
                    ),
                }
            }
            _ => {
                let literal = (b0u & 0x1F) * 4 + 4;
                if literal <= Self::MAX_LITERAL_BLOCK {
                    Self::Literal(literal)
                } else {
                    Self::Stop(b0u & 0x03)
                }
            }
        }
    }

    /// Pick the smallest command that carries `literal` bytes followed by `copy`,
    /// or `None` if no command can encode that pair.
    pub fn for_match(literal: usize, copy: BackRef) -> Option<Self> {
        let BackRef { distance, length } = copy;
        if literal > Self::MAX_INLINE_LITERAL || distance == 0 {
            return None;
        }

        if distance <= 0x400 && (3..=10).contains(&length) {
            Some(Self::Short { literal, copy })
        } else if distance <= 0x4000 && (4..=67).contains(&length) {
            Some(Self::Medium { literal, copy })
        } else if distance <= Self::MAX_DISTANCE && (5..=Self::MAX_LENGTH).contains(&length) {
            Some(Self::Long { literal, copy })
        } else {
            None
        }
    }

    /// A 1 byte literal block, if `len` is a multiple of four in `4..=112`
    pub fn literal_block(len: usize) -> Option<Self> {
        if len >= 4 && len <= Self::MAX_LITERAL_BLOCK && len % 4 == 0 {
            Some(Self::Literal(len))
        } else {
            None
        }
    }

    /// Number of literal bytes that follow the command in the stream
    pub fn literal_len(&self) -> usize {
        match *self {
            Self::Short { literal, .. } | Self::Medium { literal, .. } | Self::Long { literal, .. } => {
                literal
            }
            Self::Literal(len) | Self::Stop(len) => len,
        }
    }

    /// The back-reference performed after the literals, if any
    pub fn copy(&self) -> Option<BackRef> {
        match *self {
            Self::Short { copy, .. } | Self::Medium { copy, .. } | Self::Long { copy, .. } => Some(copy),
            Self::Literal(_) | Self::Stop(_) => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop(_))
    }

    /// Serialize the command into its 1 to 4 bytes
    pub fn encode(&self) -> SmallVec<[u8; 4]> {
        debug_assert!(self.literal_len() <= Self::MAX_LITERAL_BLOCK);

        match *self {
            Self::Short { literal, copy } => {
                let d = copy.distance - 1;
                smallvec![
                    ((d >> 3) & 0x60) as u8 | ((copy.length - 3) << 2) as u8 | literal as u8,
                    d as u8,
                ]
            }
            Self::Medium { literal, copy } => {
                let d = copy.distance - 1;
                smallvec![
                    0x80 | (copy.length - 4) as u8,
                    (literal << 6) as u8 | (d >> 8) as u8,
                    d as u8,
                ]
            }
            Self::Long { literal, copy } => {
                let d = copy.distance - 1;
                let l = copy.length - 5;
                smallvec![
                    0xC0 | ((d >> 12) & 0x10) as u8 | ((l >> 6) & 0x0C) as u8 | literal as u8,
                    (d >> 8) as u8,
                    d as u8,
                    l as u8,
                ]
            }
            Self::Literal(len) => smallvec![0xE0 | ((len - 4) >> 2) as u8],
            Self::Stop(len) => smallvec![0xFC | len as u8],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Short { literal, copy } => write!(
                f,
                "2 byte: {} literal | copy {} from -{}",
                literal, copy.length, copy.distance
            ),
            Self::Medium { literal, copy } => write!(
                f,
                "3 byte: {} literal | copy {} from -{}",
                literal, copy.length, copy.distance
            ),
            Self::Long { literal, copy } => write!(
                f,
                "4 byte: {} literal | copy {} from -{}",
                literal, copy.length, copy.distance
            ),
            Self::Literal(len) => write!(f, "1 byte: {} literal", len),
            Self::Stop(len) => write!(f, "stop: {} literal", len),
        }
    }
}

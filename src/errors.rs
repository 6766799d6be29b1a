use std::io;
use thiserror::Error;

/// Possible errors that arise from unpacking a RefPack stream, or from packing
/// data into one.
#[derive(Error, Debug)]
pub enum RefPackError {
    #[error("RefPack stream ended mid-command at offset {0:#x}")]
    TruncatedStream(usize),

    #[error("malformed RefPack stream at offset {offset:#x}: {reason}")]
    MalformedStream { offset: usize, reason: Malformed },

    #[error("input of {0} bytes does not fit in the 24 bit RefPack size field")]
    InputTooLarge(usize),

    #[error("invalid RefPack settings: {0}")]
    InvalidSettings(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The ways a well-framed RefPack command can still be impossible to carry out
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    #[error("lookback of {distance} bytes with only {written} bytes written")]
    LookBack { distance: usize, written: usize },

    #[error("writing {needed} bytes overflows the {capacity} byte output")]
    OutputOverflow { needed: usize, capacity: usize },

    #[error("header declares {declared} bytes but the stream produced {written}")]
    SizeMismatch { declared: usize, written: usize },
}

/// Errors from run-length encoding pixels or compacting their color table.
#[derive(Error, Debug)]
pub enum RleError {
    #[error("pixel buffer of {len} bytes is not a multiple of the {width} byte pixel size")]
    MisalignedPixels { len: usize, width: usize },

    #[error("color table of {len} bytes is not a multiple of the {width} byte entry size")]
    MisalignedPalette { len: usize, width: usize },

    #[error("color table has {0} entries; at most 256 can be indexed")]
    PaletteTooLarge(usize),

    #[error("pixel index {index} is outside the {len} entry color table")]
    PaletteIndexOutOfRange { index: u8, len: usize },

    #[error("RLE packet at offset {0:#x} runs past the end of the data")]
    TruncatedPacket(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

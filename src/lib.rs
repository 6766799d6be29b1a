//! Codecs for the asset formats of **Quake 3 Revolution**.
//!
//! * [RefPack](format), the LZ77 family compression wrapped around most game files.
//!   Use [`decompress`] or a [`Decoder`] to unpack a stream with every read and write
//!   checked, or [`decompress_trusted`] for data that was already validated.
//!   Use [`compress`] or an [`EncoderBuilder`] to pack data.
//! * [TGA run-length encoding](rle) for 1, 3, and 4 byte pixels, along with
//!   color table compaction for indexed images.
//!
//! ```
//! let data = b"It's a me, a me, a me, Mario!";
//! let packed = q3r_codecs::compress(data).unwrap();
//! let info = q3r_codecs::refpack_info(&packed).unwrap();
//!
//! assert_eq!(info.decompressed_size as usize, data.len());
//! assert_eq!(q3r_codecs::decompress(&packed).unwrap(), &data[..]);
//! ```
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade; no logger is installed here.

mod decode;
mod encode;
mod errors;
pub mod format;
pub mod rle;

pub use decode::{decompress, decompress_into, decompress_trusted, refpack_info, Decoder, Decompressed};
pub use encode::{compress, EncoderBuilder, RefPackSettings};
pub use errors::{Malformed, RefPackError, RleError};
pub use format::RefPackHeader;

use crate::{errors::RefPackError, format::RefPackHeader};
use bitstream_io::{BigEndian, BitWriter};
use log::debug;
use std::{
    convert::TryFrom,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

mod matcher;

type LogWtr<'a> = &'a mut dyn Write;

/// Configure the match search that underlies RefPack compression
///
/// | Parameter  | Field       | Default |
/// | ---------- | ----------- | :-----: |
/// | Dictionary | `window`    | 131072  |
/// | Search     | `max_chain` | 64      |
/// | Header     | `compressed_size` | `false` |
///
/// The window can not be larger than the farthest lookback of a RefPack command
/// (131072 bytes). A longer hash chain finds better matches at the cost of speed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RefPackSettings {
    /// max number of bytes to look back for a match
    pub window: usize,
    /// max number of earlier positions to check at each byte
    pub max_chain: usize,
    /// store the total stream size in the header (signature `0x11FB`)
    pub compressed_size: bool,
}

impl RefPackSettings {
    pub const MAX_WINDOW: usize = 0x2_0000;

    pub const fn new(window: usize, max_chain: usize) -> Self {
        Self {
            window,
            max_chain,
            compressed_size: false,
        }
    }

    fn validate(&self) -> Result<(), RefPackError> {
        if self.window == 0 || self.window > Self::MAX_WINDOW {
            return Err(RefPackError::InvalidSettings("window must be in 1..=131072"));
        }
        if self.max_chain == 0 {
            return Err(RefPackError::InvalidSettings("max_chain must be at least 1"));
        }

        Ok(())
    }
}

impl Default for RefPackSettings {
    fn default() -> Self {
        Self::new(Self::MAX_WINDOW, 64)
    }
}

/// Specify the encoding settings, such as window size, logging, input, and output
///
/// To create a new `EncoderBuilder`, use [`for_bytes()`].
/// Then, change any of the encoding settings with `EncoderBuilder`'s helper methods.
/// Finally, encode the input data with [`encode_to_writer()`], [`encode_to_file()`], or [`encode_to_vec()`].
/// ```
/// # use q3r_codecs::{EncoderBuilder, RefPackSettings};
/// let input = b"ABBACABBCADFEGABA";
/// let compressed = EncoderBuilder::for_bytes(input)
///     .with_settings(RefPackSettings::new(1024, 16))
///     .with_compressed_size()
///     .encode_to_vec()
///     .unwrap();
/// assert_eq!(&compressed[..2], &[0x11, 0xFB]);
/// ```
///
/// [`for_bytes()`]: EncoderBuilder::for_bytes
/// [`encode_to_writer()`]: EncoderBuilder::encode_to_writer
/// [`encode_to_file()`]: EncoderBuilder::encode_to_file
/// [`encode_to_vec()`]: EncoderBuilder::encode_to_vec
pub struct EncoderBuilder<'a> {
    src: &'a [u8],
    settings: RefPackSettings,
    log: Option<LogWtr<'a>>,
}

impl<'a> EncoderBuilder<'a> {
    /// Create a new `EncoderBuilder` for the data the `bytes` slice.
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self {
            src: bytes,
            settings: RefPackSettings::default(),
            log: None,
        }
    }

    /// Set the settings used for the match search. See [`RefPackSettings`] for more details.
    #[inline]
    pub fn with_settings(&mut self, settings: RefPackSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Convenience method to store the compressed size in the header
    #[inline]
    pub fn with_compressed_size(&mut self) -> &mut Self {
        self.settings.compressed_size = true;
        self
    }

    /// Write debugging and diagnostic information to `log` while the input is
    /// being encoded.
    #[inline]
    pub fn with_logging<L: Write>(&mut self, log: &'a mut L) -> &mut Self {
        self.log = Some(log as LogWtr);
        self
    }

    /// Start the encoding and write the compressed data out to `wtr`
    #[inline]
    pub fn encode_to_writer<W: Write>(&mut self, wtr: W) -> Result<(), RefPackError> {
        do_encode(self, wtr)
    }

    /// Start the encoding and write the compressed data out to the newly created
    /// `File` `f`
    #[inline]
    pub fn encode_to_file<P: AsRef<Path>>(&mut self, f: P) -> Result<(), RefPackError> {
        let mut wtr = BufWriter::new(File::create(f)?);
        self.encode_to_writer(&mut wtr)?;
        wtr.flush().map_err(Into::into)
    }

    /// Start the encoding and return the compressed data in a `Vec<u8>`.
    #[inline]
    pub fn encode_to_vec(&mut self) -> Result<Vec<u8>, RefPackError> {
        let mut data = Vec::new();
        self.encode_to_writer(&mut data).map(|_| data)
    }
}

/// Compress data into a RefPack `Vec<u8>`
///
/// This is a convenience function to encode bytes without having to
/// set up an [`EncoderBuilder`].
pub fn compress(input: &[u8]) -> Result<Vec<u8>, RefPackError> {
    EncoderBuilder::for_bytes(input).encode_to_vec()
}

fn do_encode<W: Write>(opts: &mut EncoderBuilder<'_>, wtr: W) -> Result<(), RefPackError> {
    let EncoderBuilder { src, settings, log } = opts;
    let src = *src;
    settings.validate()?;

    let too_large = |len: usize| RefPackError::InputTooLarge(len);
    let decompressed_size = u32::try_from(src.len())
        .ok()
        .filter(|&size| size <= RefPackHeader::MAX_SIZE)
        .ok_or_else(|| too_large(src.len()))?;

    let body = matcher::compress_bytes(src, settings, log)?;

    let compressed_size = if settings.compressed_size {
        let total = body.len() + 8;
        let size = u32::try_from(total)
            .ok()
            .filter(|&size| size <= RefPackHeader::MAX_SIZE)
            .ok_or_else(|| too_large(total))?;
        Some(size)
    } else {
        None
    };

    let header = RefPackHeader::new(decompressed_size, compressed_size);
    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "# Header\n{:?}", &header)?;
    }
    debug!(
        "RefPack encode: {} bytes -> {} bytes",
        src.len(),
        body.len() + header.encoded_len()
    );

    let mut out = BitWriter::endian(wtr, BigEndian);
    header.write(&mut out)?;
    out.write_bytes(&body)?;

    Ok(())
}

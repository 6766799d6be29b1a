use crate::errors::{Malformed, RefPackError};
use crate::format::{BackRef, Command, RefPackHeader};
use log::debug;
use std::io::Write;

type LogWtr<'a> = &'a mut dyn Write;

/// Sizes reported after unpacking a RefPack stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decompressed {
    /// decompressed size stated by the stream's header
    pub declared_size: usize,
    /// number of compressed bytes read, including the header
    pub consumed: usize,
    /// number of bytes actually written to the output
    pub written: usize,
}

/// Specify the decoding settings, such as logging and input.
///
/// To create a new `Decoder`, use [`for_bytes()`]. Then, change any of the decoder
/// settings. Finally, decode the input data with [`decode()`] or [`decode_into()`].
/// Every `Decoder` method is bounds checked; see [`decompress_trusted`] for the
/// unchecked path.
/// ```
/// # use q3r_codecs::{compress, Decoder};
/// let original = b"ABBACABBACD";
/// let compressed = compress(original).unwrap();
/// let decompressed = Decoder::for_bytes(&compressed)
///     .decode()
///     .unwrap();
/// assert_eq!(&original[..], decompressed);
/// ```
/// You can use a `Decoder` to get the [`RefPackHeader`] with [`header()`]:
/// ```
/// # use q3r_codecs::{compress, Decoder};
/// # let original = b"ABBACABBACD";
/// # let compressed = compress(original).unwrap();
/// let decoder = Decoder::for_bytes(&compressed);
/// let size = decoder.header().unwrap().decompressed_size as usize;
/// assert_eq!(size, original.len());
/// ```
/// [`for_bytes()`]: Decoder::for_bytes
/// [`decode()`]: Decoder::decode
/// [`decode_into()`]: Decoder::decode_into
/// [`header()`]: Decoder::header
pub struct Decoder<'a> {
    src: &'a [u8],
    log: Option<LogWtr<'a>>,
}

impl<'a> Decoder<'a> {
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self {
            src: bytes,
            log: None,
        }
    }

    /// Write every decoded command to `wtr` while decoding
    #[inline]
    pub fn with_logging<W: Write>(&mut self, wtr: &'a mut W) -> &mut Self {
        self.log = Some(wtr as LogWtr);
        self
    }

    #[inline]
    pub fn header(&self) -> Result<RefPackHeader, RefPackError> {
        RefPackHeader::from_bytes(self.src)
    }

    /// Decode the whole stream into a buffer sized by its header.
    ///
    /// Unlike [`decode_into()`](Decoder::decode_into), a stream that stops before or
    /// after producing exactly the declared number of bytes is an error.
    pub fn decode(&mut self) -> Result<Vec<u8>, RefPackError> {
        let declared = self.header()?.decompressed_size as usize;
        let mut output = vec![0u8; declared];
        let sizes = do_decode(self.src, &mut output, &mut self.log)?;

        if sizes.written != declared {
            return Err(RefPackError::MalformedStream {
                offset: sizes.consumed,
                reason: Malformed::SizeMismatch {
                    declared,
                    written: sizes.written,
                },
            });
        }

        Ok(output)
    }

    /// Decode the stream into the front of `output`
    #[inline]
    pub fn decode_into(&mut self, output: &mut [u8]) -> Result<Decompressed, RefPackError> {
        do_decode(self.src, output, &mut self.log)
    }
}

/// Decompress a RefPack stream into a `Vec<u8>`
///
/// This is a convenience function to decode bytes without
/// having to set up a [`Decoder`]
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, RefPackError> {
    Decoder::for_bytes(input).decode()
}

/// Decompress a RefPack stream into `output`, checking every read and write.
///
/// `output` should be at least as large as the header's declared size. If `input`
/// is `None`, nothing is written and all of the reported sizes are zero.
pub fn decompress_into(input: Option<&[u8]>, output: &mut [u8]) -> Result<Decompressed, RefPackError> {
    match input {
        Some(src) => Decoder::for_bytes(src).decode_into(output),
        None => Ok(Decompressed::default()),
    }
}

/// Extract the [`RefPackHeader`] from a RefPack stream
///
/// This is a convenience function to inspect a stream without having
/// to set up a [`Decoder`]
pub fn refpack_info(input: &[u8]) -> Result<RefPackHeader, RefPackError> {
    RefPackHeader::from_bytes(input)
}

/// Decompress a RefPack stream that is already known to be well formed.
///
/// This is the fast path for data that passed a container level check (signature,
/// stored sizes) before reaching the decoder. No command is validated; the only
/// protection is the slice indexing itself. If `input` is `None`, nothing is written
/// and all of the reported sizes are zero.
///
/// # Panics
/// Panics if the stream reads past the end of `input`, copies from before the start
/// of `output`, or writes past the end of `output`. Use [`decompress_into`] for data
/// that has not been validated.
pub fn decompress_trusted(input: Option<&[u8]>, output: &mut [u8]) -> Decompressed {
    let src = match input {
        Some(src) => src,
        None => return Decompressed::default(),
    };

    let header = RefPackHeader::from_trusted(src);
    let mut csr = header.encoded_len();
    let mut written = 0;

    loop {
        let width = Command::size(src[csr]);
        let cmd = Command::parse(&src[csr..csr + width]);
        csr += width;

        let literal = cmd.literal_len();
        output[written..written + literal].copy_from_slice(&src[csr..csr + literal]);
        csr += literal;
        written += literal;

        if let Some(BackRef { distance, length }) = cmd.copy() {
            for _ in 0..length {
                output[written] = output[written - distance];
                written += 1;
            }
        }

        if cmd.is_stop() {
            break;
        }
    }

    Decompressed {
        declared_size: header.decompressed_size as usize,
        consumed: csr,
        written,
    }
}

fn do_decode(
    src: &[u8],
    output: &mut [u8],
    log: &mut Option<LogWtr<'_>>,
) -> Result<Decompressed, RefPackError> {
    let header = RefPackHeader::from_bytes(src)?;

    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "# Header\n{:?}", &header)?;
    }

    let capacity = output.len();
    let mut csr = header.encoded_len();
    let mut written = 0;

    loop {
        let start = csr;
        let width = Command::size(*src.get(csr).ok_or(RefPackError::TruncatedStream(start))?);
        let cmd = src
            .get(csr..csr + width)
            .map(Command::parse)
            .ok_or(RefPackError::TruncatedStream(start))?;
        csr += width;

        if let Some(wtr) = log.as_mut() {
            writeln!(wtr, "{:06x} -> {:06x} - {}", start, written, cmd)?;
        }

        let literal = cmd.literal_len();
        let bytes = src
            .get(csr..csr + literal)
            .ok_or(RefPackError::TruncatedStream(start))?;
        output
            .get_mut(written..written + literal)
            .ok_or_else(|| overflow(start, written + literal, capacity))?
            .copy_from_slice(bytes);
        csr += literal;
        written += literal;

        if let Some(copy) = cmd.copy() {
            written = copy_back(output, written, copy)
                .map_err(|reason| RefPackError::MalformedStream { offset: start, reason })?;
        }

        if cmd.is_stop() {
            break;
        }
    }

    debug!(
        "RefPack stream: {} bytes consumed, {} of {} declared bytes written",
        csr, written, header.decompressed_size
    );

    Ok(Decompressed {
        declared_size: header.decompressed_size as usize,
        consumed: csr,
        written,
    })
}

fn overflow(offset: usize, needed: usize, capacity: usize) -> RefPackError {
    RefPackError::MalformedStream {
        offset,
        reason: Malformed::OutputOverflow { needed, capacity },
    }
}

/// Copy `copy.length` bytes that start `copy.distance` bytes behind `pos` to `pos`,
/// returning the new end of the output.
///
/// The copy must go one byte at a time: when the distance is shorter than the length,
/// the source catches up to bytes written by this same copy.
fn copy_back(output: &mut [u8], pos: usize, copy: BackRef) -> Result<usize, Malformed> {
    let BackRef { distance, length } = copy;
    if distance > pos {
        return Err(Malformed::LookBack {
            distance,
            written: pos,
        });
    }

    let end = pos + length;
    if end > output.len() {
        return Err(Malformed::OutputOverflow {
            needed: end,
            capacity: output.len(),
        });
    }

    for i in pos..end {
        output[i] = output[i - distance];
    }

    Ok(end)
}

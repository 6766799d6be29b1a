//! TGA style run-length encoding of 1, 3, and 4 byte pixels.
//!
//! An encoded image is a sequence of packets. Each packet starts with a one byte
//! header whose low seven bits hold the number of pixels minus one:
//!
//! | Header      | Payload | Pixels |
//! | ----------- | ------- | ------ |
//! | `1CCCCCCC`  | one pixel, repeated | `C + 1` |
//! | `0CCCCCCC`  | `C + 1` raw pixels  | `C + 1` |
//!
//! Encoding is greedy. A literal packet is cut short as soon as enough identical
//! pixels follow to pay for the extra packet header: three in a row for 1 byte
//! pixels, two in a row for 3 and 4 byte pixels.
//! ```
//! use q3r_codecs::rle::{self, PixelDepth, RleEncoding};
//!
//! let pixels = [9, 9, 9, 9, 9, 9, 1, 2];
//! let encoded = rle::encode(&pixels, PixelDepth::Indexed).unwrap();
//! assert_eq!(encoded, RleEncoding::Encoded(vec![0x85, 9, 0x01, 1, 2]));
//! assert_eq!(rle::decode(encoded.as_bytes().unwrap(), PixelDepth::Indexed).unwrap(), pixels);
//! ```

use crate::errors::RleError;
use log::{debug, trace};
use std::{fmt, io::Write};

mod palette;

pub use palette::{compact_palette, ColorTable};

type LogWtr<'a> = &'a mut dyn Write;

/// Most repeats (pixels after the first) a single packet can describe
pub const MAX_REPEATS: usize = 127;
/// Header bit marking a run packet
pub const RUN_FLAG: u8 = 0x80;

/// The size of a pixel record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelDepth {
    /// 1 byte color table index
    Indexed,
    /// 3 byte truecolor
    Rgb,
    /// 4 byte truecolor with alpha
    Rgba,
}

impl PixelDepth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Indexed => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Number of identical pixels in a row that ends a literal packet
    pub const fn break_threshold(self) -> usize {
        match self {
            Self::Indexed => 3,
            Self::Rgb | Self::Rgba => 2,
        }
    }
}

impl fmt::Display for PixelDepth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} bit", self.bytes() * 8)
    }
}

/// The result of run-length encoding a pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RleEncoding {
    /// there were no pixels to encode
    Empty,
    /// the packets, strictly smaller than the input
    Encoded(Vec<u8>),
    /// the packets would be at least as large as the input; store it raw instead
    NotBeneficial,
}

impl RleEncoding {
    pub fn is_beneficial(&self) -> bool {
        matches!(self, Self::Encoded(_))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Encoded(bytes) => Some(bytes.as_slice()),
            Self::Empty => Some(&[][..]),
            Self::NotBeneficial => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Encoded(bytes) => Some(bytes),
            Self::Empty => Some(Vec::new()),
            Self::NotBeneficial => None,
        }
    }
}

/// Run-length encode pixels of a fixed depth, with optional diagnostic output.
/// ```
/// # use q3r_codecs::rle::{PixelDepth, RleEncoder};
/// let pixels = [0, 0, 0, 255, 255, 255, 0, 0, 0, 255, 255, 255];
/// let mut log: Vec<u8> = Vec::new();
/// let packets = RleEncoder::new(PixelDepth::Rgb)
///     .with_logging(&mut log)
///     .encode_packets(&pixels)
///     .unwrap();
/// assert_eq!(packets, [0x03, 0, 0, 0, 255, 255, 255, 0, 0, 0, 255, 255, 255]);
/// assert!(!log.is_empty());
/// ```
pub struct RleEncoder<'a> {
    depth: PixelDepth,
    log: Option<LogWtr<'a>>,
}

impl<'a> RleEncoder<'a> {
    #[inline]
    pub fn new(depth: PixelDepth) -> Self {
        Self { depth, log: None }
    }

    /// Write every emitted packet to `wtr` while encoding
    #[inline]
    pub fn with_logging<W: Write>(&mut self, wtr: &'a mut W) -> &mut Self {
        self.log = Some(wtr as LogWtr);
        self
    }

    /// Encode `pixels`, reporting [`RleEncoding::NotBeneficial`] unless the
    /// packets are strictly smaller than the input.
    #[inline]
    pub fn encode(&mut self, pixels: &[u8]) -> Result<RleEncoding, RleError> {
        self.encode_as(pixels, self.depth)
    }

    /// Encode `pixels` into packets, whatever their size
    #[inline]
    pub fn encode_packets(&mut self, pixels: &[u8]) -> Result<Vec<u8>, RleError> {
        self.packets_as(pixels, self.depth)
    }

    /// Compact `palette` to the entries used by `pixels`, then encode the
    /// rewritten indices.
    ///
    /// Color table indices are always 1 byte pixels, so this ignores the depth the
    /// encoder was made with (and leaves it in place for later calls). The compaction
    /// is kept even when the result is [`RleEncoding::NotBeneficial`], so the raw
    /// `pixels` can be stored against the compacted `palette`.
    pub fn encode_indexed(
        &mut self,
        pixels: &mut [u8],
        palette: &mut ColorTable,
    ) -> Result<RleEncoding, RleError> {
        let before = palette.len();
        let kept = compact_palette(pixels, palette)?;
        debug!("color table compacted from {} to {} entries", before, kept);

        self.encode_as(pixels, PixelDepth::Indexed)
    }

    fn encode_as(&mut self, pixels: &[u8], depth: PixelDepth) -> Result<RleEncoding, RleError> {
        if pixels.is_empty() {
            return Ok(RleEncoding::Empty);
        }

        let packets = self.packets_as(pixels, depth)?;
        if packets.len() >= pixels.len() {
            trace!(
                "RLE of {} pixels is not beneficial: {} -> {} bytes",
                depth,
                pixels.len(),
                packets.len()
            );
            return Ok(RleEncoding::NotBeneficial);
        }

        Ok(RleEncoding::Encoded(packets))
    }

    fn packets_as(&mut self, pixels: &[u8], depth: PixelDepth) -> Result<Vec<u8>, RleError> {
        let width = depth.bytes();
        if pixels.len() % width != 0 {
            return Err(RleError::MisalignedPixels {
                len: pixels.len(),
                width,
            });
        }

        let packets = packetize(pixels, depth, &mut self.log)?;
        debug!("RLE {}: {} bytes -> {} bytes", depth, pixels.len(), packets.len());

        Ok(packets)
    }
}

/// Run-length encode `pixels` of `depth`.
///
/// This is a convenience function to encode without having to set up an [`RleEncoder`].
pub fn encode(pixels: &[u8], depth: PixelDepth) -> Result<RleEncoding, RleError> {
    RleEncoder::new(depth).encode(pixels)
}

/// Packetize `pixels` of `depth` without checking whether it saves space
pub fn encode_packets(pixels: &[u8], depth: PixelDepth) -> Result<Vec<u8>, RleError> {
    RleEncoder::new(depth).encode_packets(pixels)
}

/// Compact `palette`, then run-length encode the 1 byte `pixels` indexing it.
/// See [`RleEncoder::encode_indexed`].
pub fn encode_indexed(pixels: &mut [u8], palette: &mut ColorTable) -> Result<RleEncoding, RleError> {
    RleEncoder::new(PixelDepth::Indexed).encode_indexed(pixels, palette)
}

/// Expand RLE packets of `depth` pixels back into raw pixels
pub fn decode(encoded: &[u8], depth: PixelDepth) -> Result<Vec<u8>, RleError> {
    let width = depth.bytes();
    let mut pixels = Vec::with_capacity(encoded.len() * 2);
    let mut csr = 0;

    while csr < encoded.len() {
        let header = encoded[csr];
        let count = usize::from(header & !RUN_FLAG) + 1;
        let payload = if header & RUN_FLAG != 0 { width } else { count * width };

        let packet = encoded
            .get(csr + 1..csr + 1 + payload)
            .ok_or(RleError::TruncatedPacket(csr))?;

        if header & RUN_FLAG != 0 {
            for _ in 0..count {
                pixels.extend_from_slice(packet);
            }
        } else {
            pixels.extend_from_slice(packet);
        }
        csr += 1 + payload;
    }

    Ok(pixels)
}

fn packetize(src: &[u8], depth: PixelDepth, log: &mut Option<LogWtr>) -> Result<Vec<u8>, RleError> {
    let width = depth.bytes();
    let n = src.len() / width;
    let px = |i: usize| &src[i * width..(i + 1) * width];
    // identical neighbor pairs that end a literal packet
    let break_pairs = depth.break_threshold() - 1;

    let mut out = Vec::with_capacity(src.len() + src.len() / 128 + 1);
    let mut i = 0;
    let mut carry = 0;

    while i < n {
        let mut repeats = carry;
        carry = 0;
        while repeats < MAX_REPEATS && i + 1 < n && px(i + 1) == px(i) {
            repeats += 1;
            i += 1;
        }
        debug_assert!(repeats <= MAX_REPEATS);

        if repeats > 0 {
            if let Some(wtr) = log {
                writeln!(wtr, "{:06x} - run: {} pixels", out.len(), repeats + 1)?;
            }
            out.push(RUN_FLAG | repeats as u8);
            out.extend_from_slice(px(i));
            i += 1;
            continue;
        }

        let header_pos = out.len();
        out.push(0);
        out.extend_from_slice(px(i));
        i += 1;
        let mut count = 1;
        let mut identical = 0;

        while count <= MAX_REPEATS {
            if i + 1 >= n {
                if i < n {
                    out.extend_from_slice(px(i));
                    count += 1;
                    i += 1;
                }
                break;
            }

            if px(i + 1) == px(i) {
                identical += 1;
            } else {
                identical = 0;
            }

            if identical == break_pairs {
                // the last pixels placed start the next run
                let retract = break_pairs - 1;
                out.truncate(out.len() - retract * width);
                count -= retract;
                carry = break_pairs;
                i += 1;
                break;
            }

            out.extend_from_slice(px(i));
            count += 1;
            i += 1;
        }

        if let Some(wtr) = log {
            writeln!(wtr, "{:06x} - literal: {} pixels", header_pos, count)?;
        }
        out[header_pos] = (count - 1) as u8;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(pixels: &[u8], depth: PixelDepth) {
        let packets = encode_packets(pixels, depth).unwrap();
        assert_eq!(decode(&packets, depth).unwrap(), pixels, "{} {:02x?}", depth, packets);
    }

    #[test]
    fn no_repeats_is_one_literal() {
        let pixels: Vec<u8> = (0..100).collect();
        let packets = encode_packets(&pixels, PixelDepth::Indexed).unwrap();

        assert_eq!(packets.len(), 1 + pixels.len());
        assert_eq!(packets[0], 99);
        assert_eq!(encode(&pixels, PixelDepth::Indexed).unwrap(), RleEncoding::NotBeneficial);
    }

    #[test]
    fn long_literals_are_split() {
        let pixels: Vec<u8> = (0..=255).collect();
        let packets = encode_packets(&pixels, PixelDepth::Indexed).unwrap();

        assert_eq!(packets.len(), 2 + 256);
        assert_eq!(packets[0], 127);
        assert_eq!(packets[129], 127);
        round_trip(&pixels, PixelDepth::Indexed);
    }

    #[test]
    fn indexed_literal_ends_two_pixels_early() {
        let pixels = [1, 2, 3, 4, 4, 4, 5, 6];
        let packets = encode_packets(&pixels, PixelDepth::Indexed).unwrap();

        assert_eq!(packets, [2, 1, 2, 3, 0x82, 4, 1, 5, 6]);
        assert_eq!(encode(&pixels, PixelDepth::Indexed).unwrap(), RleEncoding::NotBeneficial);
    }

    #[test]
    fn indexed_pair_stays_literal() {
        let pixels = [1, 2, 2, 3];
        assert_eq!(
            encode_packets(&pixels, PixelDepth::Indexed).unwrap(),
            [3, 1, 2, 2, 3]
        );
    }

    #[test]
    fn truecolor_breaks_at_pair() {
        let a = [10, 20, 30];
        let b = [40, 50, 60];
        let c = [70, 80, 90];
        let pixels = [a, b, b, c].concat();

        let packets = encode_packets(&pixels, PixelDepth::Rgb).unwrap();
        assert_eq!(packets, [&[0][..], &a, &[0x81], &b, &[0], &c].concat());
        round_trip(&pixels, PixelDepth::Rgb);
    }

    #[test]
    fn identical_pixels() {
        let pixels = vec![7; 300];
        let packets = encode_packets(&pixels, PixelDepth::Indexed).unwrap();

        assert_eq!(packets, [0xFF, 7, 0xFF, 7, 0xAB, 7]);
        assert!(encode(&pixels, PixelDepth::Indexed).unwrap().is_beneficial());

        for &depth in &[PixelDepth::Rgb, PixelDepth::Rgba] {
            round_trip(&vec![0xA5u8; 200 * depth.bytes()], depth);
        }
    }

    #[test]
    fn alternating_pixels() {
        for &depth in &[PixelDepth::Indexed, PixelDepth::Rgb, PixelDepth::Rgba] {
            let pixels: Vec<u8> = (0..150)
                .flat_map(|i| vec![(i % 2) as u8; depth.bytes()])
                .collect();
            round_trip(&pixels, depth);
        }
    }

    #[test]
    fn mixed_runs_round_trip() {
        let pixels = [1, 2, 2, 3, 3, 3, 4, 5, 5, 5, 5, 6, 7, 7, 8];
        round_trip(&pixels, PixelDepth::Indexed);

        let rgba: Vec<u8> = pixels.iter().flat_map(|&p| vec![p, 0, p, 0xFF]).collect();
        round_trip(&rgba, PixelDepth::Rgba);
    }

    #[test]
    fn empty_pixels() {
        assert_eq!(encode(&[], PixelDepth::Rgba).unwrap(), RleEncoding::Empty);
        assert!(encode_packets(&[], PixelDepth::Rgb).unwrap().is_empty());
    }

    #[test]
    fn misaligned_pixels() {
        match encode(&[1, 2, 3, 4], PixelDepth::Rgb) {
            Err(RleError::MisalignedPixels { len: 4, width: 3 }) => {}
            other => panic!("expected misaligned pixels, got {:?}", other),
        }
    }

    #[test]
    fn truncated_packet() {
        match decode(&[0x81, 1, 2, 3, 0x02, 4, 5], PixelDepth::Rgb) {
            Err(RleError::TruncatedPacket(4)) => {}
            other => panic!("expected truncated packet, got {:?}", other),
        }
    }

    #[test]
    fn indexed_encoding_compacts_palette() {
        let mut palette = ColorTable::rgb((0..=255u8).flat_map(|i| vec![i, i, i]).collect()).unwrap();
        let mut pixels = vec![200; 64];
        pixels.extend_from_slice(&[100, 50]);

        let encoded = encode_indexed(&mut pixels, &mut palette).unwrap();

        assert_eq!(palette.as_bytes(), [50, 50, 50, 100, 100, 100, 200, 200, 200]);
        assert_eq!(encoded, RleEncoding::Encoded(vec![0xBF, 2, 0x01, 1, 0]));
    }

    #[test]
    fn indexed_compaction_survives_rejection() {
        let mut palette = ColorTable::rgba(vec![0; 4 * 16]).unwrap();
        let mut pixels = [3, 9, 15];

        let encoded = encode_indexed(&mut pixels, &mut palette).unwrap();

        assert_eq!(encoded, RleEncoding::NotBeneficial);
        assert_eq!(pixels, [0, 1, 2]);
        assert_eq!(palette.len(), 3);
    }

    #[test]
    fn indexed_encoding_keeps_encoder_depth() {
        let mut palette = ColorTable::rgb(vec![0; 3 * 4]).unwrap();
        let mut pixels = [3, 3, 3, 3, 3, 3];
        let mut log: Vec<u8> = Vec::new();
        let mut encoder = RleEncoder::new(PixelDepth::Rgb);
        encoder.with_logging(&mut log);

        let indexed = encoder.encode_indexed(&mut pixels, &mut palette).unwrap();
        assert_eq!(indexed, RleEncoding::Encoded(vec![0x85, 0]));

        // six bytes are two identical rgb pixels, not six indices
        let rgb = encoder.encode_packets(&[3, 3, 3, 3, 3, 3]).unwrap();
        assert_eq!(rgb, [0x81, 3, 3, 3]);

        drop(encoder);
        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("run: 6 pixels"), "{}", log);
        assert!(log.contains("run: 2 pixels"), "{}", log);
    }
}

use proptest::collection::vec;
use proptest::prelude::*;
use std::str::from_utf8;

use q3r_codecs::rle::{self, PixelDepth, RleEncoding};
use q3r_codecs::{Decoder, EncoderBuilder, Malformed, RefPackError, RefPackSettings};

static LOREM_TEXT: &str = include_str!("lorem.txt");
static LOREM_REFPACK: &[u8] = include_bytes!("lorem.refpack");

#[test]
fn decode_lorem() {
    let decoded = q3r_codecs::decompress(LOREM_REFPACK).unwrap();
    let decoded_str = from_utf8(&decoded).unwrap();

    assert_eq!(decoded_str, LOREM_TEXT);
}

#[test]
fn lorem_sizes() {
    let header = q3r_codecs::refpack_info(LOREM_REFPACK).unwrap();
    assert_eq!(header.signature, 0x11FB);
    assert_eq!(header.compressed_size, Some(LOREM_REFPACK.len() as u32));

    let mut out = vec![0u8; header.decompressed_size as usize];
    let checked = q3r_codecs::decompress_into(Some(LOREM_REFPACK), &mut out).unwrap();
    assert_eq!(checked.consumed, LOREM_REFPACK.len());
    assert_eq!(checked.written, LOREM_TEXT.len());
    assert_eq!(checked.declared_size, LOREM_TEXT.len());

    let mut fast = vec![0u8; header.decompressed_size as usize];
    let trusted = q3r_codecs::decompress_trusted(Some(LOREM_REFPACK), &mut fast);
    assert_eq!(trusted, checked);
    assert_eq!(fast, out);
}

#[test]
fn lorem_fixture_differs_from_repack() {
    let repacked = EncoderBuilder::for_bytes(LOREM_TEXT.as_bytes())
        .with_compressed_size()
        .encode_to_vec()
        .unwrap();

    assert_ne!(repacked, LOREM_REFPACK);
    assert_eq!(q3r_codecs::decompress(&repacked).unwrap(), q3r_codecs::decompress(LOREM_REFPACK).unwrap());
}

#[test]
fn decode_truncated_file() {
    let bad_file = &LOREM_REFPACK[..LOREM_REFPACK.len() / 2];

    match q3r_codecs::decompress(bad_file) {
        Err(RefPackError::TruncatedStream(offset)) => assert!(offset <= bad_file.len()),
        other => panic!("expected truncated stream, got {:?}", other),
    }
}

#[test]
fn decode_bad_lookback() {
    // a literal block, then a copy from 5 bytes back with 4 bytes written
    let bad_file = [0x10, 0xFB, 0, 0, 8, 0xE0, b'a', b'b', b'c', b'd', 0x00, 0x04, 0xFC];

    match Decoder::for_bytes(&bad_file).decode() {
        Err(RefPackError::MalformedStream {
            offset: 10,
            reason: Malformed::LookBack { distance: 5, written: 4 },
        }) => {}
        other => panic!("expected bad lookback, got {:?}", other),
    }
}

#[test]
fn repack_lorem() {
    let mut log: Vec<u8> = Vec::new();
    let packed = EncoderBuilder::for_bytes(LOREM_TEXT.as_bytes())
        .with_compressed_size()
        .with_logging(&mut log)
        .encode_to_vec()
        .unwrap();

    assert!(packed.len() < LOREM_TEXT.len());
    assert_eq!(q3r_codecs::decompress(&packed).unwrap(), LOREM_TEXT.as_bytes());
    assert!(from_utf8(&log).unwrap().contains("stop:"));
}

#[test]
fn repack_lorem_to_file() {
    let path = std::env::temp_dir().join(format!("q3r-codecs-lorem-{}.refpack", std::process::id()));
    EncoderBuilder::for_bytes(LOREM_TEXT.as_bytes())
        .encode_to_file(&path)
        .unwrap();

    let packed = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(q3r_codecs::decompress(&packed).unwrap(), LOREM_TEXT.as_bytes());
}

/// Find the RefPack stream inside a Maxis container: a little endian length,
/// then the `0x10FB` header.
fn maxis_body(container: &[u8], size: usize) -> Option<&[u8]> {
    let size = [(size >> 16) as u8, (size >> 8) as u8, size as u8];
    (0..container.len().saturating_sub(5))
        .find(|&i| container[i..i + 2] == [0x10, 0xFB] && container[i + 2..i + 5] == size)
        .map(|i| &container[i..])
}

fn pixels(depth: PixelDepth) -> impl Strategy<Value = Vec<u8>> {
    // few distinct pixels, so runs are common
    vec(vec(0u8..3, depth.bytes()), 0..600).prop_map(|px| px.concat())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn refpack_round_trip(data in vec(any::<u8>(), 0..4000)) {
        let packed = q3r_codecs::compress(&data).unwrap();
        let sizes = q3r_codecs::decompress_into(Some(&packed[..]), &mut vec![0u8; data.len()]).unwrap();

        prop_assert_eq!(sizes.consumed, packed.len());
        prop_assert_eq!(q3r_codecs::decompress(&packed).unwrap(), data);
    }

    #[test]
    fn refpack_round_trip_repetitive(data in vec(0u8..4, 0..20_000), chain in 1usize..32) {
        let packed = EncoderBuilder::for_bytes(&data)
            .with_settings(RefPackSettings::new(RefPackSettings::MAX_WINDOW, chain))
            .encode_to_vec()
            .unwrap();

        prop_assert_eq!(q3r_codecs::decompress(&packed).unwrap(), data);
    }

    #[test]
    fn decode_streams_from_refpack_crate(data in vec(0u8..8, 1..4000)) {
        let container = refpack::easy_compress::<refpack::format::TheSims12>(&data).unwrap();
        let stream = maxis_body(&container, data.len()).expect("no 0x10FB header");

        prop_assert_eq!(q3r_codecs::decompress(stream).unwrap(), &data[..]);

        let mut out = vec![0u8; data.len()];
        let sizes = q3r_codecs::decompress_trusted(Some(stream), &mut out);
        prop_assert_eq!(sizes.written, data.len());
        prop_assert_eq!(out, data);
    }

    #[test]
    fn rle_round_trip_indexed(data in pixels(PixelDepth::Indexed)) {
        let packets = rle::encode_packets(&data, PixelDepth::Indexed).unwrap();
        prop_assert_eq!(rle::decode(&packets, PixelDepth::Indexed).unwrap(), data);
    }

    #[test]
    fn rle_round_trip_rgb(data in pixels(PixelDepth::Rgb)) {
        let packets = rle::encode_packets(&data, PixelDepth::Rgb).unwrap();
        prop_assert_eq!(rle::decode(&packets, PixelDepth::Rgb).unwrap(), data);
    }

    #[test]
    fn rle_round_trip_rgba(data in pixels(PixelDepth::Rgba)) {
        match rle::encode(&data, PixelDepth::Rgba).unwrap() {
            RleEncoding::Encoded(packets) => {
                prop_assert!(packets.len() < data.len());
                prop_assert_eq!(rle::decode(&packets, PixelDepth::Rgba).unwrap(), data);
            }
            RleEncoding::Empty => prop_assert!(data.is_empty()),
            RleEncoding::NotBeneficial => {
                let packets = rle::encode_packets(&data, PixelDepth::Rgba).unwrap();
                prop_assert!(packets.len() >= data.len());
            }
        }
    }
}

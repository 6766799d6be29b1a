use std::{io, iter};

use super::{LogWtr, RefPackSettings};
use crate::{
    errors::RefPackError,
    format::{BackRef, Command},
};

const HASH_BITS: u32 = 16;
const NIL: u32 = u32::MAX;

/// Positions of every 3 byte prefix seen so far, newest first.
///
/// `head` holds the most recent position for a hash, and `prev` links each
/// position to the previous one with the same hash. Positions are inserted in
/// ascending order, so walking a chain moves strictly further back.
///
/// Inputs are capped at 24 bits, so positions are stored as `u32`.
struct HashChains {
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl HashChains {
    fn new(input_size: usize) -> Self {
        debug_assert!(input_size < NIL as usize);
        Self {
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; input_size],
        }
    }

    fn hash(bytes: &[u8]) -> usize {
        let v = u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]);
        (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    fn insert(&mut self, src: &[u8], pos: usize) {
        if let Some(prefix) = src.get(pos..pos + Command::MIN_LENGTH) {
            let h = Self::hash(prefix);
            self.prev[pos] = self.head[h];
            self.head[h] = pos as u32;
        }
    }

    fn candidates<'s>(&'s self, src: &[u8], pos: usize) -> impl Iterator<Item = usize> + 's {
        let first = src
            .get(pos..pos + Command::MIN_LENGTH)
            .map(|prefix| self.head[Self::hash(prefix)])
            .filter(|&p| p != NIL);

        iter::successors(first, move |&p| Some(self.prev[p as usize]).filter(|&p| p != NIL))
            .map(|p| p as usize)
    }
}

/// Longest match at `pos` that some copy command can encode.
/// Ties go to the nearest candidate.
fn find_match(src: &[u8], pos: usize, chains: &HashChains, settings: &RefPackSettings) -> Option<BackRef> {
    let max_len = (src.len() - pos).min(Command::MAX_LENGTH);
    if max_len < Command::MIN_LENGTH {
        return None;
    }
    let ahead = &src[pos..pos + max_len];

    chains
        .candidates(src, pos)
        .take(settings.max_chain)
        .map(|candidate| pos - candidate)
        .take_while(|&distance| distance <= settings.window)
        .map(|distance| {
            let length = src[pos - distance..]
                .iter()
                .zip(ahead)
                .take_while(|(a, b)| a == b)
                .count();
            BackRef::new(distance, length)
        })
        .filter(|&copy| Command::for_match(0, copy).is_some())
        .fold(None, |best: Option<BackRef>, copy| match best {
            Some(b) if b.length >= copy.length => Some(b),
            _ => Some(copy),
        })
}

fn trace(log: &mut Option<LogWtr>, src_pos: usize, out_pos: usize, cmd: &Command) -> io::Result<()> {
    if let Some(wtr) = log {
        writeln!(wtr, "{:06x} -> {:06x} - {}", src_pos, out_pos, cmd)?;
    }

    Ok(())
}

/// Emit `literals` as 1 byte literal blocks, returning the 0 to 3 bytes that
/// don't fill a block.
fn flush_literals<'s>(
    out: &mut Vec<u8>,
    mut literals: &'s [u8],
    mut src_pos: usize,
    log: &mut Option<LogWtr>,
) -> io::Result<&'s [u8]> {
    let block_len = |len: usize| (len & !3).min(Command::MAX_LITERAL_BLOCK);

    while let Some(cmd) = Command::literal_block(block_len(literals.len())) {
        let (block, rest) = literals.split_at(cmd.literal_len());
        trace(log, src_pos, out.len(), &cmd)?;
        out.extend_from_slice(&cmd.encode());
        out.extend_from_slice(block);

        src_pos += block.len();
        literals = rest;
    }

    Ok(literals)
}

/// Compress `src` into a stream of RefPack commands, ending with a stop command.
/// The header is not included.
pub(super) fn compress_bytes(
    src: &[u8],
    settings: &RefPackSettings,
    log: &mut Option<LogWtr>,
) -> Result<Vec<u8>, RefPackError> {
    let mut out = Vec::with_capacity(src.len() / 2 + 16);
    let mut chains = HashChains::new(src.len());
    let mut literal_start = 0;
    let mut pos = 0;

    if let Some(wtr) = log {
        writeln!(wtr, "# Commands")?;
    }

    while pos < src.len() {
        let pending = pos - literal_start;
        let found = find_match(src, pos, &chains, settings)
            .and_then(|copy| Command::for_match(pending % 4, copy).map(|cmd| (cmd, copy)));

        match found {
            Some((cmd, copy)) => {
                let tail = flush_literals(&mut out, &src[literal_start..pos], literal_start, log)?;
                trace(log, pos - tail.len(), out.len(), &cmd)?;
                out.extend_from_slice(&cmd.encode());
                out.extend_from_slice(tail);

                for p in pos..pos + copy.length {
                    chains.insert(src, p);
                }
                pos += copy.length;
                literal_start = pos;
            }
            None => {
                chains.insert(src, pos);
                pos += 1;
            }
        }
    }

    let tail = flush_literals(&mut out, &src[literal_start..], literal_start, log)?;
    let stop = Command::Stop(tail.len());
    trace(log, src.len() - tail.len(), out.len(), &stop)?;
    out.extend_from_slice(&stop.encode());
    out.extend_from_slice(tail);

    Ok(out)
}

use crate::errors::RleError;

/// A color table of 3 or 4 byte entries, indexed by 1 byte pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entry_size: usize,
    data: Vec<u8>,
}

impl ColorTable {
    /// Most entries a 1 byte index can reach
    pub const MAX_ENTRIES: usize = 256;

    /// A table of 3 byte entries
    pub fn rgb(data: Vec<u8>) -> Result<Self, RleError> {
        Self::with_entry_size(data, 3)
    }

    /// A table of 4 byte entries
    pub fn rgba(data: Vec<u8>) -> Result<Self, RleError> {
        Self::with_entry_size(data, 4)
    }

    fn with_entry_size(data: Vec<u8>, entry_size: usize) -> Result<Self, RleError> {
        if data.len() % entry_size != 0 {
            return Err(RleError::MisalignedPalette {
                len: data.len(),
                width: entry_size,
            });
        }
        let entries = data.len() / entry_size;
        if entries > Self::MAX_ENTRIES {
            return Err(RleError::PaletteTooLarge(entries));
        }

        Ok(Self { entry_size, data })
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.entry_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    pub fn entry(&self, index: usize) -> Option<&[u8]> {
        self.data
            .get(index * self.entry_size..(index + 1) * self.entry_size)
    }

    pub fn entries(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.data.chunks_exact(self.entry_size)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Drop the entries of `palette` that no pixel uses, and rewrite `pixels` to
/// index the remaining entries.
///
/// The kept entries stay in their original order. Returns the number of entries kept.
/// Nothing is changed if a pixel indexes past the end of `palette`.
/// ```
/// # use q3r_codecs::rle::{compact_palette, ColorTable};
/// let mut palette = ColorTable::rgb(vec![
///     0, 0, 0,
///     1, 1, 1,
///     2, 2, 2,
/// ]).unwrap();
/// let mut pixels = [2, 2, 0];
///
/// assert_eq!(compact_palette(&mut pixels, &mut palette).unwrap(), 2);
/// assert_eq!(pixels, [1, 1, 0]);
/// assert_eq!(palette.as_bytes(), [0, 0, 0, 2, 2, 2]);
/// ```
pub fn compact_palette(pixels: &mut [u8], palette: &mut ColorTable) -> Result<usize, RleError> {
    let len = palette.len();
    if let Some(&index) = pixels.iter().find(|&&p| usize::from(p) >= len) {
        return Err(RleError::PaletteIndexOutOfRange { index, len });
    }

    // old index -> new index, for used entries only
    let mut remap: [Option<u8>; ColorTable::MAX_ENTRIES] = [None; ColorTable::MAX_ENTRIES];
    for &p in pixels.iter() {
        remap[usize::from(p)] = Some(p);
    }

    let size = palette.entry_size;
    let mut kept = 0;
    for (old, slot) in remap.iter_mut().enumerate().take(len) {
        if let Some(new) = slot {
            palette
                .data
                .copy_within(old * size..(old + 1) * size, kept * size);
            *new = kept as u8;
            kept += 1;
        }
    }
    palette.data.truncate(kept * size);

    for p in pixels.iter_mut() {
        if let Some(new) = remap[usize::from(*p)] {
            *p = new;
        }
    }

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_ramp() -> ColorTable {
        ColorTable::rgba((0..=255u8).flat_map(|i| vec![i, i, i, 0xFF]).collect()).unwrap()
    }

    #[test]
    fn keeps_used_entries_in_order() {
        let mut palette = gray_ramp();
        let mut pixels = [9, 0, 5, 5, 9, 0, 0];

        let kept = compact_palette(&mut pixels, &mut palette).unwrap();

        assert_eq!(kept, 3);
        assert_eq!(pixels, [2, 0, 1, 1, 2, 0, 0]);
        let entries: Vec<&[u8]> = palette.entries().collect();
        assert_eq!(
            entries,
            [&[0, 0, 0, 0xFF][..], &[5, 5, 5, 0xFF], &[9, 9, 9, 0xFF]]
        );
    }

    #[test]
    fn compaction_is_idempotent() {
        let mut palette = gray_ramp();
        let mut pixels = [9, 0, 5, 5, 9, 0, 0];
        compact_palette(&mut pixels, &mut palette).unwrap();

        let (pixels_once, palette_once) = (pixels, palette.clone());
        assert_eq!(compact_palette(&mut pixels, &mut palette).unwrap(), 3);
        assert_eq!(pixels, pixels_once);
        assert_eq!(palette, palette_once);
    }

    #[test]
    fn out_of_range_index_changes_nothing() {
        let mut palette = ColorTable::rgb(vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut pixels = [1, 2, 0];

        match compact_palette(&mut pixels, &mut palette) {
            Err(RleError::PaletteIndexOutOfRange { index: 2, len: 2 }) => {}
            other => panic!("expected index out of range, got {:?}", other),
        }
        assert_eq!(pixels, [1, 2, 0]);
        assert_eq!(palette.len(), 2);
    }

    #[test]
    fn no_pixels_empties_table() {
        let mut palette = gray_ramp();
        assert_eq!(compact_palette(&mut [], &mut palette).unwrap(), 0);
        assert!(palette.is_empty());
    }

    #[test]
    fn bad_tables() {
        match ColorTable::rgb(vec![0; 10]) {
            Err(RleError::MisalignedPalette { len: 10, width: 3 }) => {}
            other => panic!("expected misaligned table, got {:?}", other),
        }
        match ColorTable::rgba(vec![0; 4 * 257]) {
            Err(RleError::PaletteTooLarge(257)) => {}
            other => panic!("expected oversized table, got {:?}", other),
        }
        assert_eq!(gray_ramp().entry(255), Some(&[255, 255, 255, 0xFF][..]));
        assert_eq!(gray_ramp().entry(256), None);
    }
}

//! Seagate FARM log: an opaque parameter-tree walker (spec §3.5 "~4 KB |
//! TLV parameter tree"; `SPEC_FULL.md` §2 "FARM log skeleton").
//!
//! Vendor interpretation of individual FARM fields is explicitly out of
//! scope (spec §1 Non-goals list "vendor-specific interpretation
//! heuristics"); this module only exposes the page/sub-page cursor
//! structure smartmontools itself uses before any vendor-specific printer
//! takes over.

/// One decoded FARM page header: a page identifier and its declared
/// parameter count, followed by that many little-endian 64-bit words.
#[derive(Debug, Clone, Copy)]
pub struct FarmPage<'a> {
    pub page_id: u32,
    pub copy_number: u32,
    words: &'a [u8],
}

impl<'a> FarmPage<'a> {
    /// A FARM parameter word is a plain 64-bit little-endian value; the
    /// high bit conventionally marks "supported", which callers interested
    /// in vendor semantics can inspect themselves.
    pub fn word(&self, index: usize) -> Option<u64> {
        let start = index * 8;
        let bytes: [u8; 8] = self.words.get(start..start + 8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    pub fn word_count(&self) -> usize {
        self.words.len() / 8
    }
}

/// Walks a FARM log buffer as a flat sequence of fixed-size pages, each
/// beginning with an 8-byte `(page_id, copy_number)` header followed by
/// 90 eight-byte parameter words (the page size smartmontools' `ataprint`
/// uses for FARM: 8 + 90*8 = 728 bytes per page).
pub struct FarmLog<'a> {
    raw: &'a [u8],
}

const FARM_PAGE_HEADER: usize = 8;
const FARM_WORDS_PER_PAGE: usize = 90;
const FARM_PAGE_SIZE: usize = FARM_PAGE_HEADER + FARM_WORDS_PER_PAGE * 8;

impl<'a> FarmLog<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    pub fn pages(&self) -> impl Iterator<Item = FarmPage<'_>> {
        self.raw.chunks(FARM_PAGE_SIZE).filter_map(|chunk| {
            if chunk.len() < FARM_PAGE_HEADER {
                return None;
            }
            let page_id = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let copy_number = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            Some(FarmPage {
                page_id,
                copy_number,
                words: &chunk[FARM_PAGE_HEADER..],
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_a_single_page() {
        let mut buf = vec![0u8; FARM_PAGE_SIZE];
        buf[0..4].copy_from_slice(&1u32.to_le_bytes());
        buf[8..16].copy_from_slice(&0xdeadbeefu64.to_le_bytes());
        let log = FarmLog::new(&buf);
        let pages: Vec<_> = log.pages().collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_id, 1);
        assert_eq!(pages[0].word(0), Some(0xdeadbeef));
    }

    #[test]
    fn ignores_a_trailing_short_chunk() {
        let buf = vec![0u8; FARM_PAGE_SIZE + 3];
        let log = FarmLog::new(&buf);
        assert_eq!(log.pages().count(), 1);
    }
}

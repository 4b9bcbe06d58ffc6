//! SMART self-test logs: the legacy 21-entry circular log (`0xd5` page
//! `0x06`), the GPL extended log (19 entries per 512-byte page), and the
//! selective self-test log (spec §3.5, §4.3, `SPEC_FULL.md` §2; layout from
//! `ata_smart_selftestlog`/`ata_smart_extselftestlog`/
//! `ata_selective_self_test_log` in `include/smartmon/ata.h`).

/// Self-test type codes for the execute-offline subcommand and the legacy
/// log's `selftestnumber` field (spec §4.3 "Self-test launcher"). Captive
/// forms set the high bit of the base code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTestType {
    OfflineFull,
    Short,
    Extended,
    Conveyance,
    Selective,
    ShortCaptive,
    ExtendedCaptive,
    ConveyanceCaptive,
    SelectiveCaptive,
    Abort,
}

impl SelfTestType {
    const CAPTIVE_BIT: u8 = 0x80;

    /// The subcommand byte written to LBA low for SMART EXECUTE OFFLINE
    /// IMMEDIATE.
    pub fn subcommand(self) -> u8 {
        match self {
            SelfTestType::OfflineFull => 0x00,
            SelfTestType::Short => 0x01,
            SelfTestType::Extended => 0x02,
            SelfTestType::Conveyance => 0x03,
            SelfTestType::Selective => 0x04,
            SelfTestType::ShortCaptive => 0x01 | Self::CAPTIVE_BIT,
            SelfTestType::ExtendedCaptive => 0x02 | Self::CAPTIVE_BIT,
            SelfTestType::ConveyanceCaptive => 0x03 | Self::CAPTIVE_BIT,
            SelfTestType::SelectiveCaptive => 0x04 | Self::CAPTIVE_BIT,
            SelfTestType::Abort => 0x7f,
        }
    }

    pub fn is_captive(self) -> bool {
        self.subcommand() & Self::CAPTIVE_BIT != 0
    }
}

const LEGACY_ENTRY_SIZE: usize = 24;
const LEGACY_ENTRY_COUNT: usize = 21;
/// Offset of the 1-based index of the most-recently-written entry (spec
/// §4.3: "`mostrecenttest` is the index of the newest entry").
const LEGACY_INDEX_OFFSET: usize = 508;

/// One 24-byte legacy self-test log entry.
#[derive(Debug, Clone, Copy)]
pub struct LegacySelfTestEntry<'a> {
    raw: &'a [u8; LEGACY_ENTRY_SIZE],
}

impl<'a> LegacySelfTestEntry<'a> {
    pub fn self_test_number(&self) -> u8 {
        self.raw[0]
    }

    /// High nibble: completion status code (0 = completed without error).
    pub fn status(&self) -> u8 {
        self.raw[1] >> 4
    }

    pub fn lifetime_hours(&self) -> u16 {
        u16::from_le_bytes([self.raw[2], self.raw[3]])
    }

    pub fn lba_of_first_failure(&self) -> u32 {
        u32::from_le_bytes([self.raw[5], self.raw[6], self.raw[7], self.raw[8]])
    }
}

/// The legacy 512-byte SMART self-test log (spec §3.5: "21 circular
/// entries of 24 B").
pub struct SelfTestLog {
    raw: [u8; 512],
}

impl SelfTestLog {
    pub fn from_bytes(raw: [u8; 512]) -> Self {
        Self { raw }
    }

    pub fn checksum_ok(&self) -> bool {
        crate::smart::checksum_ok(&self.raw)
    }

    /// 1-based index of the newest logged entry; 0 if the log is empty.
    pub fn most_recent_index(&self) -> u8 {
        self.raw[LEGACY_INDEX_OFFSET]
    }

    pub fn entry(&self, index: usize) -> LegacySelfTestEntry<'_> {
        assert!(index < LEGACY_ENTRY_COUNT);
        let start = 2 + index * LEGACY_ENTRY_SIZE;
        let raw: &[u8; LEGACY_ENTRY_SIZE] = self.raw[start..start + LEGACY_ENTRY_SIZE]
            .try_into()
            .unwrap();
        LegacySelfTestEntry { raw }
    }

    /// Entries ordered newest-first, wrapping modulo 21 from
    /// [`Self::most_recent_index`] (spec §4.3: "older entries are at
    /// decreasing indices modulo 21").
    pub fn entries_newest_first(&self) -> impl Iterator<Item = LegacySelfTestEntry<'_>> {
        let most_recent = self.most_recent_index();
        let start = if most_recent == 0 {
            0
        } else {
            (most_recent - 1) as usize
        };
        (0..LEGACY_ENTRY_COUNT)
            .map(move |i| (start + LEGACY_ENTRY_COUNT - i) % LEGACY_ENTRY_COUNT)
            .map(move |i| self.entry(i))
    }
}

const EXT_ENTRY_SIZE: usize = 26;
const EXT_ENTRY_COUNT: usize = 19;

/// One 26-byte extended (GPL) self-test log entry.
#[derive(Debug, Clone, Copy)]
pub struct ExtSelfTestEntry<'a> {
    raw: &'a [u8; EXT_ENTRY_SIZE],
}

impl<'a> ExtSelfTestEntry<'a> {
    pub fn self_test_number(&self) -> u8 {
        self.raw[0]
    }

    pub fn status(&self) -> u8 {
        self.raw[1] >> 4
    }

    pub fn lifetime_hours(&self) -> u16 {
        u16::from_le_bytes([self.raw[2], self.raw[3]])
    }

    pub fn lba_of_first_failure(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..6].copy_from_slice(&self.raw[5..11]);
        u64::from_le_bytes(bytes)
    }
}

/// A single 512-byte page of the GPL extended self-test log (log address
/// `0x07`); a full log may span several pages, most-recent page first.
pub struct ExtSelfTestLog {
    raw: [u8; 512],
}

impl ExtSelfTestLog {
    pub fn from_bytes(raw: [u8; 512]) -> Self {
        Self { raw }
    }

    /// Offset 2-3: 1-based index, within this page, of the newest entry.
    pub fn most_recent_index(&self) -> u16 {
        u16::from_le_bytes([self.raw[2], self.raw[3]])
    }

    pub fn entry(&self, index: usize) -> ExtSelfTestEntry<'_> {
        assert!(index < EXT_ENTRY_COUNT);
        let start = 4 + index * EXT_ENTRY_SIZE;
        let raw: &[u8; EXT_ENTRY_SIZE] = self.raw[start..start + EXT_ENTRY_SIZE]
            .try_into()
            .unwrap();
        ExtSelfTestEntry { raw }
    }

    pub fn entries(&self) -> impl Iterator<Item = ExtSelfTestEntry<'_>> {
        (0..EXT_ENTRY_COUNT).map(move |i| self.entry(i))
    }
}

/// Span-selection bits of the selective self-test log's flags word
/// (`SPEC_FULL.md` §2).
pub mod selective_flag {
    pub const DOSCAN: u16 = 0x8000;
    pub const PENDING: u16 = 0x4000;
    pub const ACTIVE: u16 = 0x2000;
}

/// One of the five selectable LBA spans in the selective self-test log.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectiveSpan {
    pub start_lba: u64,
    pub end_lba: u64,
    pub status: u16,
}

const SELECTIVE_SPAN_COUNT: usize = 5;
const SELECTIVE_SPAN_SIZE: usize = 18;

/// The 512-byte selective self-test log (spec `SPEC_FULL.md` §2): up to 5
/// spans plus a flags word and the pending/current span's LBA.
pub struct SelectiveSelfTestLog {
    raw: [u8; 512],
}

impl SelectiveSelfTestLog {
    pub fn from_bytes(raw: [u8; 512]) -> Self {
        Self { raw }
    }

    pub fn span(&self, index: usize) -> SelectiveSpan {
        assert!(index < SELECTIVE_SPAN_COUNT);
        let start = 2 + index * SELECTIVE_SPAN_SIZE;
        let mut start_lba = [0u8; 8];
        let mut end_lba = [0u8; 8];
        start_lba.copy_from_slice(&self.raw[start..start + 8]);
        end_lba.copy_from_slice(&self.raw[start + 8..start + 16]);
        SelectiveSpan {
            start_lba: u64::from_le_bytes(start_lba),
            end_lba: u64::from_le_bytes(end_lba),
            status: u16::from_le_bytes([self.raw[start + 16], self.raw[start + 17]]),
        }
    }

    pub fn spans(&self) -> impl Iterator<Item = SelectiveSpan> + '_ {
        (0..SELECTIVE_SPAN_COUNT).map(move |i| self.span(i))
    }

    /// Offset 92: the flags word (`selective_flag` bits).
    pub fn flags(&self) -> u16 {
        u16::from_le_bytes([self.raw[92], self.raw[93]])
    }

    /// Offset 94: LBA currently being, or next to be, scanned.
    pub fn current_lba(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.raw[94..102]);
        u64::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_type_captive_sets_high_bit() {
        assert!(SelfTestType::ShortCaptive.is_captive());
        assert!(!SelfTestType::Short.is_captive());
        assert_eq!(SelfTestType::Short.subcommand(), 0x01);
        assert_eq!(SelfTestType::ShortCaptive.subcommand(), 0x81);
    }

    #[test]
    fn legacy_log_most_recent_zero_means_empty() {
        let log = SelfTestLog::from_bytes([0u8; 512]);
        assert_eq!(log.most_recent_index(), 0);
    }

    #[test]
    fn legacy_log_entries_newest_first_wraps_modulo_21() {
        let mut raw = [0u8; 512];
        raw[LEGACY_INDEX_OFFSET] = 3; // most recent is entry index 2 (0-based)
        let log = SelfTestLog::from_bytes(raw);
        let order: Vec<usize> = (0..LEGACY_ENTRY_COUNT)
            .map(|i| {
                let start = 2usize;
                (start + LEGACY_ENTRY_COUNT - i) % LEGACY_ENTRY_COUNT
            })
            .collect();
        assert_eq!(order[0], 2);
        assert_eq!(log.entries_newest_first().count(), LEGACY_ENTRY_COUNT);
    }

    #[test]
    fn ext_log_entry_count_is_19() {
        let log = ExtSelfTestLog::from_bytes([0u8; 512]);
        assert_eq!(log.entries().count(), EXT_ENTRY_COUNT);
    }

    #[test]
    fn selective_log_spans_count_is_5() {
        let log = SelectiveSelfTestLog::from_bytes([0u8; 512]);
        assert_eq!(log.spans().count(), SELECTIVE_SPAN_COUNT);
    }
}

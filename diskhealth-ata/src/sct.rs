//! SMART Command Transport (SCT) status response and temperature history
//! table (spec §3.5, `SPEC_FULL.md` §2; layout from
//! `ata_sct_status_response`/`ata_sct_temperature_history_table` in
//! `include/smartmon/ata.h`).
//!
//! SCT commands ride on the ordinary SMART WRITE LOG / READ LOG sub-commands
//! at fixed log addresses: a command is written to log `0xe0` ("SCT
//! Command/Status"), and its response is read back from the same address
//! (status) or from `0xe1` ("SCT Data Transfer", used for the temperature
//! history table).

pub const SCT_COMMAND_STATUS_LOG: u8 = 0xe0;
pub const SCT_DATA_TRANSFER_LOG: u8 = 0xe1;

/// SCT action codes, written into the command sector's `action_code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SctAction {
    ReadStatus = 0,
    ReadTemperatureHistory = 2,
}

/// Build the 512-byte SCT command sector for `action` (spec §4.2.1's SMART
/// WRITE LOG family carries this verbatim).
pub fn build_sct_command(action: SctAction, function_code: u16) -> [u8; 512] {
    let mut cmd = [0u8; 512];
    cmd[0..2].copy_from_slice(&3u16.to_le_bytes()); // action_code container version
    cmd[2..4].copy_from_slice(&(action as u16).to_le_bytes());
    cmd[4..6].copy_from_slice(&function_code.to_le_bytes());
    cmd
}

/// Decoded SCT status response (`ata_sct_status_response`); the on-wire
/// format comes in two revisions (spec §3.5), both readable through this
/// fixed field set.
pub struct SctStatusResponse {
    raw: [u8; 512],
}

impl SctStatusResponse {
    pub fn from_bytes(raw: [u8; 512]) -> Self {
        Self { raw }
    }

    /// Offset 0-1: format version, either `2` or `3` (spec §3.5).
    pub fn format_version(&self) -> u16 {
        u16::from_le_bytes([self.raw[0], self.raw[1]])
    }

    pub fn sct_version(&self) -> u16 {
        u16::from_le_bytes([self.raw[2], self.raw[3]])
    }

    /// Offset 8: device state (0 = active, 1 = stand-by, 2 = sleep, 3 =
    /// DST executing, 4 = SCT executing off-line).
    pub fn device_state(&self) -> u8 {
        self.raw[8]
    }

    /// Offset 200: current temperature in whole degrees Celsius (signed);
    /// `0x80` means "not available".
    pub fn current_temperature(&self) -> Option<i8> {
        let t = self.raw[200] as i8;
        (t != -128).then_some(t)
    }

    pub fn min_temperature(&self) -> Option<i8> {
        let t = self.raw[201] as i8;
        (t != -128).then_some(t)
    }

    pub fn max_temperature(&self) -> Option<i8> {
        let t = self.raw[202] as i8;
        (t != -128).then_some(t)
    }
}

const TEMP_HISTORY_HEADER: usize = 14;
const TEMP_HISTORY_MIN_ENTRIES: usize = 128;
const TEMP_HISTORY_MAX_ENTRIES: usize = 478;

/// Decoded SCT temperature history table: a circular buffer of signed
/// per-sample temperatures, `cb_size` entries long (spec §3.5: "circular
/// buffer 128..478 entries").
pub struct SctTemperatureHistory {
    raw: [u8; 512],
}

impl SctTemperatureHistory {
    pub fn from_bytes(raw: [u8; 512]) -> Self {
        Self { raw }
    }

    /// Offset 2-3: sampling period in minutes.
    pub fn sampling_period_minutes(&self) -> u16 {
        u16::from_le_bytes([self.raw[2], self.raw[3]])
    }

    /// Offset 8-9: number of entries in the circular buffer, clamped to the
    /// spec's declared `128..=478` range.
    pub fn buffer_size(&self) -> usize {
        let raw_size = u16::from_le_bytes([self.raw[8], self.raw[9]]) as usize;
        raw_size.clamp(TEMP_HISTORY_MIN_ENTRIES, TEMP_HISTORY_MAX_ENTRIES)
    }

    /// Offset 10-11: index of the most recently written sample.
    pub fn buffer_index(&self) -> usize {
        u16::from_le_bytes([self.raw[10], self.raw[11]]) as usize
    }

    /// Samples in chronological order (oldest to newest), resolving the
    /// circular wraparound.
    pub fn samples(&self) -> Vec<Option<i8>> {
        let size = self.buffer_size();
        let index = self.buffer_index() % size.max(1);
        let cb = &self.raw[TEMP_HISTORY_HEADER..TEMP_HISTORY_HEADER + size];
        (0..size)
            .map(|i| {
                let pos = (index + 1 + i) % size;
                let t = cb[pos] as i8;
                (t != -128).then_some(t)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_reports_no_temperature_when_unavailable() {
        let mut raw = [0u8; 512];
        raw[200] = 0x80;
        let resp = SctStatusResponse::from_bytes(raw);
        assert_eq!(resp.current_temperature(), None);
    }

    #[test]
    fn status_response_decodes_present_temperature() {
        let mut raw = [0u8; 512];
        raw[200] = 42;
        let resp = SctStatusResponse::from_bytes(raw);
        assert_eq!(resp.current_temperature(), Some(42));
    }

    #[test]
    fn temperature_history_clamps_buffer_size_to_spec_range() {
        let mut raw = [0u8; 512];
        raw[8..10].copy_from_slice(&1000u16.to_le_bytes());
        let hist = SctTemperatureHistory::from_bytes(raw);
        assert_eq!(hist.buffer_size(), TEMP_HISTORY_MAX_ENTRIES);
    }

    #[test]
    fn temperature_history_samples_resolve_wraparound() {
        let mut raw = [0u8; 512];
        raw[8..10].copy_from_slice(&(TEMP_HISTORY_MIN_ENTRIES as u16).to_le_bytes());
        raw[10..12].copy_from_slice(&2u16.to_le_bytes());
        raw[TEMP_HISTORY_HEADER] = 10;
        raw[TEMP_HISTORY_HEADER + 1] = 11;
        raw[TEMP_HISTORY_HEADER + 2] = 12;
        let hist = SctTemperatureHistory::from_bytes(raw);
        let samples = hist.samples();
        assert_eq!(samples.len(), TEMP_HISTORY_MIN_ENTRIES);
        assert_eq!(samples[TEMP_HISTORY_MIN_ENTRIES - 1], Some(10));
    }
}

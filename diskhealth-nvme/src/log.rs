//! NVMe Get Log Page payloads (spec §3.5, §6.1; layouts from
//! `nvme_smart_log`/`nvme_error_log_page` in `nvmecmds.h`, and the self-test
//! log's result-entry fields as read back out in `nvmeprint.cpp`'s
//! `print_self_test_log`).

use bytemuck::{Pod, Zeroable};

/// Log Identifier values for Get Log Page (spec §4.2.3).
pub mod lid {
    pub const ERROR_INFORMATION: u8 = 0x01;
    pub const SMART_HEALTH: u8 = 0x02;
    pub const DEVICE_SELF_TEST: u8 = 0x06;
}

/// One 64-byte entry of the Error Information log (LID `0x01`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ErrorLogEntry {
    pub error_count: u64,
    pub sqid: u16,
    pub cmdid: u16,
    pub status_field: u16,
    pub parm_error_location: u16,
    pub lba: u64,
    pub nsid: u32,
    pub vs: u8,
    pub trtype: u8,
    pub rsvd30: [u8; 2],
    pub cs: u64,
    pub trtype_spec_info: [u8; 2],
    pub rsvd42: [u8; 22],
}

const _: () = assert!(std::mem::size_of::<ErrorLogEntry>() == 64);

impl ErrorLogEntry {
    pub fn from_bytes(buf: &[u8; 64]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    /// Decodes the Status Field's SCT/SC (bits 10:1 relative to the
    /// completion dword; see `diskhealth_nvme::status`).
    pub fn status_code(&self) -> (u8, u8) {
        let status = self.status_field >> 1;
        (((status >> 8) & 0x07) as u8, (status & 0xff) as u8)
    }

    pub fn byteswap_for_host(&mut self) {
        self.error_count = self.error_count.swap_bytes();
        self.sqid = self.sqid.swap_bytes();
        self.cmdid = self.cmdid.swap_bytes();
        self.status_field = self.status_field.swap_bytes();
        self.parm_error_location = self.parm_error_location.swap_bytes();
        self.lba = self.lba.swap_bytes();
        self.nsid = self.nsid.swap_bytes();
    }
}

/// The 512-byte SMART / Health Information log (LID `0x02`): ten 16-byte
/// little-endian 128-bit counters plus scalar health fields (spec §6.1).
///
/// `temperature`, `warning_temp_time` and `critical_comp_time` are modelled
/// as byte arrays rather than `u16`/`u32`: `repr(C)` would otherwise insert
/// padding to align those fields, shifting every field after them off the
/// wire offset `nvme_smart_log` (`nvmecmds.h`) actually uses and breaking
/// `bytemuck::Pod`'s no-padding requirement, exactly as
/// `diskhealth-ata/src/smart.rs`'s misaligned `flags` field is handled and
/// as this same struct's ten 128-bit counters already are.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SmartLog {
    pub critical_warning: u8,
    pub temperature: [u8; 2],
    pub avail_spare: u8,
    pub spare_thresh: u8,
    pub percent_used: u8,
    pub rsvd6: [u8; 26],
    pub data_units_read: [u8; 16],
    pub data_units_written: [u8; 16],
    pub host_reads: [u8; 16],
    pub host_writes: [u8; 16],
    pub ctrl_busy_time: [u8; 16],
    pub power_cycles: [u8; 16],
    pub power_on_hours: [u8; 16],
    pub unsafe_shutdowns: [u8; 16],
    pub media_errors: [u8; 16],
    pub num_err_log_entries: [u8; 16],
    pub warning_temp_time: [u8; 4],
    pub critical_comp_time: [u8; 4],
    pub temp_sensor: [[u8; 2]; 8],
    pub rsvd216: [u8; 296],
}

const _: () = assert!(std::mem::size_of::<SmartLog>() == 512);

impl SmartLog {
    pub fn from_bytes(buf: &[u8; 512]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    /// Critical Warning bit 1 (`0x02`): temperature above/below threshold.
    pub fn temperature_warning(&self) -> bool {
        self.critical_warning & 0x02 != 0
    }

    /// Composite temperature in degrees Celsius (field is Kelvin).
    pub fn temperature_celsius(&self) -> i32 {
        u16::from_le_bytes(self.temperature) as i32 - 273
    }

    /// 128-bit little-endian counters are read as `u128` (spec §6.1).
    pub fn data_units_read(&self) -> u128 {
        u128::from_le_bytes(self.data_units_read)
    }

    pub fn data_units_written(&self) -> u128 {
        u128::from_le_bytes(self.data_units_written)
    }

    pub fn power_on_hours(&self) -> u128 {
        u128::from_le_bytes(self.power_on_hours)
    }

    pub fn media_errors(&self) -> u128 {
        u128::from_le_bytes(self.media_errors)
    }

    pub fn byteswap_for_host(&mut self) {
        self.temperature.reverse();
        self.warning_temp_time.reverse();
        self.critical_comp_time.reverse();
        for t in &mut self.temp_sensor {
            t.reverse();
        }
        for field in [
            &mut self.data_units_read,
            &mut self.data_units_written,
            &mut self.host_reads,
            &mut self.host_writes,
            &mut self.ctrl_busy_time,
            &mut self.power_cycles,
            &mut self.power_on_hours,
            &mut self.unsafe_shutdowns,
            &mut self.media_errors,
            &mut self.num_err_log_entries,
        ] {
            field.reverse();
        }
    }
}

/// One 28-byte self-test result entry (spec §3.5; fields as decoded by
/// `print_self_test_log`: op type in `self_test_status`'s high nibble,
/// result code in the low nibble, `0xf` marks an unused slot).
///
/// `power_on_hours`/`nsid`/`failing_lba` are byte arrays rather than
/// `u64`/`u32`/`u64`: those fields' natural alignment would otherwise pull
/// in `repr(C)` padding after the four leading `u8`s, pushing `power_on_hours`
/// off byte offset 4 (`nvmeprint.cpp`'s `print_self_test_log`) and breaking
/// `Pod`'s no-padding requirement, the same issue `SmartLog` above has.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SelfTestResult {
    pub self_test_status: u8,
    pub segment_number: u8,
    pub valid_diagnostic_info: u8,
    pub rsvd3: u8,
    pub power_on_hours: [u8; 8],
    pub nsid: [u8; 4],
    pub failing_lba: [u8; 8],
    pub status_code_type: u8,
    pub status_code: u8,
    pub vendor_specific: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<SelfTestResult>() == 28);

impl SelfTestResult {
    /// Result code, low nibble of `self_test_status`; `0xf` = unused entry.
    pub fn result_code(&self) -> u8 {
        self.self_test_status & 0x0f
    }

    pub fn operation_code(&self) -> u8 {
        self.self_test_status >> 4
    }

    pub fn is_unused(&self) -> bool {
        self.result_code() == 0x0f
    }

    pub fn power_on_hours(&self) -> u64 {
        u64::from_le_bytes(self.power_on_hours)
    }

    pub fn nsid(&self) -> u32 {
        u32::from_le_bytes(self.nsid)
    }

    pub fn failing_lba(&self) -> u64 {
        u64::from_le_bytes(self.failing_lba)
    }

    pub fn byteswap_for_host(&mut self) {
        self.power_on_hours.reverse();
        self.nsid.reverse();
        self.failing_lba.reverse();
    }
}

/// The 564-byte Device Self-test log (LID `0x06`): a 4-byte header
/// (current operation/completion) plus 20 result entries.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SelfTestLog {
    pub current_operation: u8,
    pub current_completion: u8,
    pub rsvd2: [u8; 2],
    pub results: [SelfTestResult; 20],
}

const _: () = assert!(std::mem::size_of::<SelfTestLog>() == 564);

impl SelfTestLog {
    pub fn from_bytes(buf: &[u8; 564]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    /// `current_operation`'s low nibble: 0 = none in progress.
    pub fn in_progress(&self) -> bool {
        self.current_operation & 0x0f != 0
    }

    /// Completion percentage, valid only when `in_progress()`.
    pub fn completion_percent(&self) -> Option<u8> {
        self.in_progress().then_some(self.current_completion & 0x7f)
    }

    /// Completed results, most-recent-first, skipping unused slots.
    pub fn results(&self) -> impl Iterator<Item = &SelfTestResult> {
        self.results.iter().filter(|r| !r.is_unused())
    }

    pub fn byteswap_for_host(&mut self) {
        for r in &mut self.results {
            r.byteswap_for_host();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_entry_is_64_bytes() {
        assert_eq!(std::mem::size_of::<ErrorLogEntry>(), 64);
    }

    #[test]
    fn smart_log_is_512_bytes() {
        assert_eq!(std::mem::size_of::<SmartLog>(), 512);
    }

    #[test]
    fn self_test_log_is_564_bytes() {
        assert_eq!(std::mem::size_of::<SelfTestLog>(), 564);
    }

    #[test]
    fn temperature_celsius_converts_from_kelvin() {
        let mut raw = [0u8; 512];
        raw[1..3].copy_from_slice(&(273 + 40u16).to_le_bytes());
        let log = SmartLog::from_bytes(&raw);
        assert_eq!(log.temperature_celsius(), 40);
    }

    #[test]
    fn self_test_result_power_on_hours_at_offset_4() {
        // SelfTestLog has a 4-byte header, so entry 0 starts at raw[4];
        // power_on_hours sits at entry-relative offset 4, i.e. raw[8].
        let mut raw = [0u8; 564];
        raw[8] = 0xa0;
        raw[9] = 0x01;
        let log = SelfTestLog::from_bytes(&raw);
        assert_eq!(log.results[0].power_on_hours(), 0x01a0);
    }

    #[test]
    fn unused_self_test_entry_has_result_code_0xf() {
        let mut raw = [0u8; 564];
        raw[4] = 0x0f;
        let log = SelfTestLog::from_bytes(&raw);
        assert!(log.results[0].is_unused());
        assert_eq!(log.results().count(), 0);
    }

    #[test]
    fn completion_percent_none_when_idle() {
        let raw = [0u8; 564];
        let log = SelfTestLog::from_bytes(&raw);
        assert!(!log.in_progress());
        assert_eq!(log.completion_percent(), None);
    }
}

//! Semantic ATA operations composed from [`AtaTransport::ata_pass_through`]
//! calls (spec §4.2.1).

use diskhealth_core::{
    AtaCommand, AtaDirection, AtaTaskFileIn, AtaTaskFileOut, AtaTransport, DataPhase, Error,
};

const SMART_CMD: u8 = 0xb0;
const SMART_CYL_LOW: u8 = 0x4f;
const SMART_CYL_HIGH: u8 = 0xc2;

const FEATURE_SMART_READ_DATA: u16 = 0xd0;
const FEATURE_SMART_READ_THRESHOLDS: u16 = 0xd1;
const FEATURE_SMART_EXECUTE_OFFLINE: u16 = 0xd4;
const FEATURE_SMART_READ_LOG: u16 = 0xd5;
const FEATURE_SMART_WRITE_LOG: u16 = 0xd6;
const FEATURE_SMART_ENABLE: u16 = 0xd8;
const FEATURE_SMART_DISABLE: u16 = 0xd9;
const FEATURE_SMART_RETURN_STATUS: u16 = 0xda;

const CMD_IDENTIFY_DEVICE: u8 = 0xec;
const CMD_IDENTIFY_PACKET_DEVICE: u8 = 0xa1;

/// The codec's verdict from SMART RETURN STATUS (spec §4.2.1: "a returned
/// pair of `0x2c / 0xf4` means **FAILING**").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartReturnStatus {
    Passed,
    Failing,
    /// The device answered with neither the passing nor the failing magic
    /// pair; spec §9's Open Question notes some hosts mask these registers.
    Indeterminate,
}

/// Wraps one [`AtaTransport`] with the semantic ATA operations of §4.2.1.
pub struct AtaCodec<T: AtaTransport> {
    transport: T,
}

fn smart_taskfile(feature: u16, lba_low: u8) -> AtaTaskFileIn {
    AtaTaskFileIn {
        command: SMART_CMD,
        features: feature,
        lba_low,
        lba_mid: SMART_CYL_LOW,
        lba_high: SMART_CYL_HIGH,
        ..Default::default()
    }
}

impl<T: AtaTransport> AtaCodec<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Borrows the wrapped transport, for callers that need to reach
    /// tunnel-adapter-specific methods (e.g. JMB39x's `close`) without
    /// giving up the codec.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn issue(
        &mut self,
        tf: AtaTaskFileIn,
        direction: AtaDirection,
        phase: DataPhase<'_>,
    ) -> Result<AtaTaskFileOut, Error<T::Error>> {
        diskhealth_core::trace_command("ata", &[tf.command, tf.features as u8]);
        self.transport.ata_pass_through(AtaCommand {
            tf,
            direction,
            phase,
        })
    }

    /// IDENTIFY DEVICE (`0xec`). Does not decide ATA-vs-ATAPI addressing;
    /// the caller picks [`Self::identify_device`] or
    /// [`Self::identify_packet_device`] (spec §4.1.3).
    pub fn identify_device(&mut self) -> Result<[u8; 512], Error<T::Error>> {
        self.identify_with_command(CMD_IDENTIFY_DEVICE)
    }

    /// IDENTIFY PACKET DEVICE (`0xa1`), same 512-byte layout.
    pub fn identify_packet_device(&mut self) -> Result<[u8; 512], Error<T::Error>> {
        self.identify_with_command(CMD_IDENTIFY_PACKET_DEVICE)
    }

    fn identify_with_command(&mut self, command: u8) -> Result<[u8; 512], Error<T::Error>> {
        let mut buf = [0u8; 512];
        let tf = AtaTaskFileIn {
            command,
            ..Default::default()
        };
        self.issue(tf, AtaDirection::In, DataPhase::In(&mut buf))?;
        Ok(buf)
    }

    /// SMART READ VALUES (`0xb0`/`0xd0`). The codec verifies the checksum
    /// but returns the data regardless, recording only a warning on mismatch
    /// (spec §4.2.1 "Checksum policy", §7.2).
    pub fn smart_read_values(&mut self) -> Result<([u8; 512], bool), Error<T::Error>> {
        let mut buf = [0u8; 512];
        let tf = smart_taskfile(FEATURE_SMART_READ_DATA, 0);
        self.issue(tf, AtaDirection::In, DataPhase::In(&mut buf))?;
        let ok = crate::smart::checksum_ok(&buf);
        Ok((buf, ok))
    }

    /// SMART READ THRESHOLDS (`0xb0`/`0xd1`).
    pub fn smart_read_thresholds(&mut self) -> Result<([u8; 512], bool), Error<T::Error>> {
        let mut buf = [0u8; 512];
        let tf = smart_taskfile(FEATURE_SMART_READ_THRESHOLDS, 0);
        self.issue(tf, AtaDirection::In, DataPhase::In(&mut buf))?;
        let ok = crate::smart::checksum_ok(&buf);
        Ok((buf, ok))
    }

    /// SMART READ LOG SECTOR (`0xb0`/`0xd5`); `page` selects the log address
    /// (LBA low register), `count` the number of 512-byte sectors.
    pub fn smart_read_log(&mut self, page: u8, count: u8) -> Result<Vec<u8>, Error<T::Error>> {
        let mut buf = vec![0u8; 512 * count.max(1) as usize];
        let mut tf = smart_taskfile(FEATURE_SMART_READ_LOG, page);
        tf.sector_count = count as u16;
        self.issue(tf, AtaDirection::In, DataPhase::In(&mut buf))?;
        Ok(buf)
    }

    /// SMART WRITE LOG SECTOR (`0xb0`/`0xd6`).
    pub fn smart_write_log(&mut self, page: u8, data: &[u8]) -> Result<(), Error<T::Error>> {
        let count = (data.len() / 512).max(1) as u8;
        let mut tf = smart_taskfile(FEATURE_SMART_WRITE_LOG, page);
        tf.sector_count = count as u16;
        self.issue(tf, AtaDirection::Out, DataPhase::Out(data))?;
        Ok(())
    }

    /// SMART ENABLE OPERATIONS (`0xb0`/`0xd8`).
    pub fn smart_enable(&mut self) -> Result<(), Error<T::Error>> {
        let tf = smart_taskfile(FEATURE_SMART_ENABLE, 0);
        self.issue(tf, AtaDirection::NoData, DataPhase::None)?;
        Ok(())
    }

    /// SMART DISABLE OPERATIONS (`0xb0`/`0xd9`).
    pub fn smart_disable(&mut self) -> Result<(), Error<T::Error>> {
        let tf = smart_taskfile(FEATURE_SMART_DISABLE, 0);
        self.issue(tf, AtaDirection::NoData, DataPhase::None)?;
        Ok(())
    }

    /// SMART RETURN STATUS (`0xb0`/`0xda`). Writes the SMART magic to
    /// LBA mid/high before issuing and inspects the post-command values: a
    /// returned `0xf4/0x2c` (mid/high) pair means FAILING (spec §4.2.1).
    pub fn smart_return_status(&mut self) -> Result<SmartReturnStatus, Error<T::Error>> {
        let tf = smart_taskfile(FEATURE_SMART_RETURN_STATUS, 0);
        let out = self.issue(tf, AtaDirection::NoData, DataPhase::None)?;
        Ok(match (out.lba_mid, out.lba_high) {
            (0xf4, 0x2c) => SmartReturnStatus::Failing,
            (SMART_CYL_LOW, SMART_CYL_HIGH) => SmartReturnStatus::Passed,
            _ => SmartReturnStatus::Indeterminate,
        })
    }

    /// SMART EXECUTE OFFLINE IMMEDIATE (`0xb0`/`0xd4`); `subcommand` is
    /// placed in LBA low, matching the self-test type codes of §4.3's
    /// self-test launcher.
    pub fn smart_execute_offline(&mut self, subcommand: u8) -> Result<(), Error<T::Error>> {
        let tf = smart_taskfile(FEATURE_SMART_EXECUTE_OFFLINE, subcommand);
        self.issue(tf, AtaDirection::NoData, DataPhase::None)?;
        Ok(())
    }

    /// Issue an SCT command sector via SMART WRITE LOG `0xe0`, then read
    /// the response back from `page` via SMART READ LOG (`SPEC_FULL.md`
    /// §2: "SCT status/temperature-history reads").
    fn sct_round_trip(
        &mut self,
        command: [u8; 512],
        response_page: u8,
    ) -> Result<[u8; 512], Error<T::Error>> {
        self.smart_write_log(crate::sct::SCT_COMMAND_STATUS_LOG, &command)?;
        let buf = self.smart_read_log(response_page, 1)?;
        let mut out = [0u8; 512];
        out.copy_from_slice(&buf[..512]);
        Ok(out)
    }

    /// SCT status response (`SPEC_FULL.md` §2).
    pub fn read_sct_status(&mut self) -> Result<crate::sct::SctStatusResponse, Error<T::Error>> {
        let cmd = crate::sct::build_sct_command(crate::sct::SctAction::ReadStatus, 0);
        let raw = self.sct_round_trip(cmd, crate::sct::SCT_COMMAND_STATUS_LOG)?;
        Ok(crate::sct::SctStatusResponse::from_bytes(raw))
    }

    /// SCT temperature history table (`SPEC_FULL.md` §2).
    pub fn read_sct_temperature_history(
        &mut self,
    ) -> Result<crate::sct::SctTemperatureHistory, Error<T::Error>> {
        let cmd = crate::sct::build_sct_command(crate::sct::SctAction::ReadTemperatureHistory, 0);
        let raw = self.sct_round_trip(cmd, crate::sct::SCT_DATA_TRANSFER_LOG)?;
        Ok(crate::sct::SctTemperatureHistory::from_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskhealth_core::{AtaTaskFileOut, Capability, CapabilityProbe};

    struct MockTransport {
        identify: [u8; 512],
        return_status: (u8, u8),
    }

    impl AtaTransport for MockTransport {
        type Error = std::convert::Infallible;

        fn ata_pass_through(
            &mut self,
            cmd: AtaCommand<'_>,
        ) -> Result<AtaTaskFileOut, Error<Self::Error>> {
            match cmd.tf.command {
                CMD_IDENTIFY_DEVICE => {
                    if let DataPhase::In(buf) = cmd.phase {
                        buf.copy_from_slice(&self.identify);
                    }
                    Ok(AtaTaskFileOut::default())
                }
                SMART_CMD if cmd.tf.features == FEATURE_SMART_RETURN_STATUS => {
                    Ok(AtaTaskFileOut {
                        lba_mid: self.return_status.0,
                        lba_high: self.return_status.1,
                        ..Default::default()
                    })
                }
                SMART_CMD => Ok(AtaTaskFileOut::default()),
                _ => panic!("unexpected command {:#x}", cmd.tf.command),
            }
        }
    }

    impl CapabilityProbe for MockTransport {
        fn is_capability(&self, _cap: Capability) -> bool {
            false
        }
    }

    #[test]
    fn smart_return_status_passed() {
        let transport = MockTransport {
            identify: [0u8; 512],
            return_status: (SMART_CYL_LOW, SMART_CYL_HIGH),
        };
        let mut codec = AtaCodec::new(transport);
        assert_eq!(codec.smart_return_status().unwrap(), SmartReturnStatus::Passed);
    }

    #[test]
    fn smart_return_status_failing() {
        let transport = MockTransport {
            identify: [0u8; 512],
            return_status: (0xf4, 0x2c),
        };
        let mut codec = AtaCodec::new(transport);
        assert_eq!(codec.smart_return_status().unwrap(), SmartReturnStatus::Failing);
    }

    #[test]
    fn identify_device_round_trips_buffer() {
        let mut fixture = [0u8; 512];
        fixture[20] = 0x41;
        let transport = MockTransport {
            identify: fixture,
            return_status: (0, 0),
        };
        let mut codec = AtaCodec::new(transport);
        let buf = codec.identify_device().unwrap();
        assert_eq!(buf[20], 0x41);
    }
}

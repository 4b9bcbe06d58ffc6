//! Semantic SCSI operations composed from [`ScsiTransport::command`] calls
//! (spec §4.2.2), in the style of `cotton-scsi`'s
//! `ScsiDevice<T: ScsiTransport>`.

use crate::cdb::{
    self, Inquiry, LogSense, ModeSelect10, ModeSelect6, ModeSense10, ModeSense6, PageControl,
    ReadCapacity10, ReadCapacity10Reply, ReadCapacity16, ReadCapacity16Reply, ReadDefectData10,
    ReadDefectData12, RequestSense, SendDiagnostic, TestUnitReady,
};
use diskhealth_core::{DataPhase, Error, ScsiOutcome, ScsiTransport, SenseTuple, SimpleError};

/// TapeAlert (spec §4.2.2: "this double-fetch must be skipped for the
/// TapeAlert page which clears its state on each read").
pub const TAPEALERT_LOG_PAGE: u8 = 0x2e;

const DEFAULT_TIMEOUT_SECS: u32 = 60;
const SELF_TEST_TIMEOUT_SECS: u32 = 18000;

/// Standard INQUIRY result: peripheral type and the vendor/product/revision
/// strings at bytes 8..35 (spec §4.2.2).
#[derive(Debug, Clone)]
pub struct InquiryResult {
    pub peripheral_type: u8,
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

fn ascii_field(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().to_string()
}

/// Wraps one [`ScsiTransport`] with the semantic SCSI operations of §4.2.2.
pub struct ScsiCodec<T: ScsiTransport> {
    transport: T,
}

impl<T: ScsiTransport> ScsiCodec<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn run(
        &mut self,
        cdb: &[u8],
        phase: DataPhase<'_>,
        timeout_secs: u32,
    ) -> Result<ScsiOutcome, Error<T::Error>> {
        diskhealth_core::trace_command("scsi", cdb);
        self.transport.command(cdb, phase, timeout_secs)
    }

    /// Standard INQUIRY (spec §4.2.2: `len` ∈ {36, 64}).
    pub fn standard_inquiry(&mut self, len: u16) -> Result<InquiryResult, Error<T::Error>> {
        let cmd = Inquiry::standard(len);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(InquiryResult {
            peripheral_type: buf[0] & 0x1f,
            vendor: ascii_field(&buf[8..16.min(buf.len())]),
            product: ascii_field(&buf[16..32.min(buf.len())]),
            revision: ascii_field(&buf[32..36.min(buf.len())]),
        })
    }

    /// VPD INQUIRY for `page`. Validates that the returned page code
    /// matches the request (spec §4.2.2: "guards against devices that
    /// ignore EVPD").
    pub fn inquiry_vpd(&mut self, page: u8, len: u16) -> Result<Vec<u8>, Error<T::Error>> {
        let cmd = Inquiry::vpd(page, len);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        if buf.len() < 2 || buf[1] != page {
            return Err(Error::ProtocolError);
        }
        Ok(buf)
    }

    /// LOG SENSE (spec §4.2.2). When `known_resp_len` is zero, a first
    /// 4-byte fetch reads the declared page-length field before the full
    /// re-issue, except for the TapeAlert page which must not be
    /// double-fetched.
    pub fn log_sense(
        &mut self,
        page: u8,
        subpage: u8,
        known_resp_len: u16,
    ) -> Result<Vec<u8>, Error<T::Error>> {
        let len = if known_resp_len == 0 && page != TAPEALERT_LOG_PAGE {
            let cmd = LogSense::new(page, subpage, PageControl::Current, 4);
            let mut head = [0u8; 4];
            self.run(
                bytemuck::bytes_of(&cmd),
                DataPhase::In(&mut head),
                DEFAULT_TIMEOUT_SECS,
            )?;
            let declared = u16::from_be_bytes([head[2], head[3]]);
            if declared == 0 {
                return Err(Error::ProtocolError);
            }
            4 + declared
        } else if known_resp_len == 0 {
            // TapeAlert: no safe double fetch, ask for a generously sized
            // single read instead (spec §4.2.2).
            4096
        } else {
            known_resp_len
        };

        let cmd = LogSense::new(page, subpage, PageControl::Current, len);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(buf)
    }

    /// MODE SENSE (6). A buffer length beyond the 6-byte form's one-byte
    /// allocation-length field is a usage error, rejected without issuing a
    /// command (spec §8.3: "`mode_sense_6` with `bufLen > 255` returns
    /// `EINVAL` without issuing a command").
    pub fn mode_sense_6(
        &mut self,
        page: u8,
        subpage: u8,
        pc: PageControl,
        len: u16,
    ) -> Result<Vec<u8>, Error<T::Error>> {
        if len > 255 {
            return Err(Error::Transport(diskhealth_core::UniformError::new(
                diskhealth_core::Errno::Inval,
                "MODE SENSE (6) buffer length exceeds 255 bytes",
            )));
        }
        let cmd = ModeSense6::new(page, subpage, pc, len as u8);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(buf)
    }

    /// MODE SENSE (10).
    pub fn mode_sense_10(
        &mut self,
        page: u8,
        subpage: u8,
        pc: PageControl,
        len: u16,
    ) -> Result<Vec<u8>, Error<T::Error>> {
        let cmd = ModeSense10::new(page, subpage, pc, len);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(buf)
    }

    pub fn mode_select_6(
        &mut self,
        save_pages: bool,
        data: &[u8],
    ) -> Result<(), Error<T::Error>> {
        let cmd = ModeSelect6::new(true, save_pages, data.len() as u8);
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::Out(data),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(())
    }

    pub fn mode_select_10(
        &mut self,
        save_pages: bool,
        data: &[u8],
    ) -> Result<(), Error<T::Error>> {
        let cmd = ModeSelect10::new(true, save_pages, data.len() as u16);
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::Out(data),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(())
    }

    /// SEND DIAGNOSTIC. `self_test` selects the 18000s foreground-extended
    /// timeout; every other form uses the routine 60s timeout (spec
    /// §4.2.2).
    pub fn send_diagnostic(
        &mut self,
        function_code: u8,
        self_test: bool,
    ) -> Result<(), Error<T::Error>> {
        let cmd = SendDiagnostic::new(function_code, self_test);
        let timeout = if self_test {
            SELF_TEST_TIMEOUT_SECS
        } else {
            DEFAULT_TIMEOUT_SECS
        };
        self.run(bytemuck::bytes_of(&cmd), DataPhase::None, timeout)?;
        Ok(())
    }

    /// TEST UNIT READY; a UNIT ATTENTION on the first call is retried once
    /// (spec §4.2.2).
    pub fn test_unit_ready(&mut self) -> Result<(), Error<T::Error>> {
        let cmd = TestUnitReady::new();
        let outcome = self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::None,
            DEFAULT_TIMEOUT_SECS,
        )?;
        if outcome.status == 0 {
            return Ok(());
        }
        if let Some(tuple) = outcome.sense_tuple() {
            const UNIT_ATTENTION: u8 = 0x06;
            if tuple.sense_key == UNIT_ATTENTION {
                let retry = self.run(
                    bytemuck::bytes_of(&TestUnitReady::new()),
                    DataPhase::None,
                    DEFAULT_TIMEOUT_SECS,
                )?;
                if retry.status == 0 {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// REQUEST SENSE (spec §4.2.2; used when the IE log page is absent).
    pub fn request_sense(&mut self) -> Result<SenseTuple, Error<T::Error>> {
        let cmd = RequestSense::new(18);
        let mut buf = [0u8; 18];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(SenseTuple {
            response_code: buf[0],
            sense_key: buf[2] & 0x0f,
            asc: buf[12],
            ascq: buf[13],
        })
    }

    /// READ CAPACITY (10); 32-bit LBA, used as the RCAP-16 fallback (spec
    /// §4.2.2).
    pub fn read_capacity_10(&mut self) -> Result<(u32, u32), Error<T::Error>> {
        let cmd = ReadCapacity10::new();
        let mut reply = ReadCapacity10Reply::default();
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(bytemuck::bytes_of_mut(&mut reply)),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok((
            u32::from_be_bytes(reply.lba),
            u32::from_be_bytes(reply.block_size),
        ))
    }

    /// READ CAPACITY (16); falls back to RCAP-10 if unsupported or blocked
    /// (spec §4.2.2).
    pub fn read_capacity_16(&mut self) -> Result<(u64, u32), Error<T::Error>> {
        let cmd = ReadCapacity16::new();
        let mut reply = ReadCapacity16Reply::default();
        let outcome = self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(bytemuck::bytes_of_mut(&mut reply)),
            DEFAULT_TIMEOUT_SECS,
        )?;
        if outcome.status != 0 {
            let (blocks, block_size) = self.read_capacity_10()?;
            return Ok((blocks as u64, block_size));
        }
        Ok((
            u64::from_be_bytes(reply.lba),
            u32::from_be_bytes(reply.block_size),
        ))
    }

    pub fn read_defect_10(&mut self, len: u16) -> Result<Vec<u8>, Error<T::Error>> {
        let cmd = ReadDefectData10::new(len);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(buf)
    }

    pub fn read_defect_12(&mut self, len: u32) -> Result<Vec<u8>, Error<T::Error>> {
        let cmd = ReadDefectData12::new(len);
        let mut buf = vec![0u8; len as usize];
        self.run(
            bytemuck::bytes_of(&cmd),
            DataPhase::In(&mut buf),
            DEFAULT_TIMEOUT_SECS,
        )?;
        Ok(buf)
    }
}

/// Fold a SCSI outcome's sense data (if any) into the semantic taxonomy,
/// delegating to `diskhealth_core::scsi_sense_to_simple_error` (spec §4.5).
pub fn classify(outcome: &ScsiOutcome) -> SimpleError {
    match outcome.sense_tuple() {
        Some(tuple) => diskhealth_core::scsi_sense_to_simple_error(tuple),
        None if outcome.status == 0 => SimpleError::NoError,
        None => SimpleError::UnknownError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockTransport {
        responses: std::collections::VecDeque<(u8, Vec<u8>, Vec<u8>)>,
    }

    impl ScsiTransport for MockTransport {
        type Error = std::convert::Infallible;

        fn command(
            &mut self,
            _cdb: &[u8],
            phase: DataPhase<'_>,
            _timeout_secs: u32,
        ) -> Result<ScsiOutcome, Error<Self::Error>> {
            let (status, data, sense) = self.responses.pop_front().unwrap_or((0, vec![], vec![]));
            if let DataPhase::In(buf) = phase {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
            }
            Ok(ScsiOutcome {
                status,
                resid: 0,
                sense,
            })
        }
    }

    #[test]
    fn test_unit_ready_retries_once_on_unit_attention() {
        let ua_sense = vec![0x70, 0, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x29, 0x00];
        let transport = MockTransport {
            responses: vec![(2, vec![], ua_sense), (0, vec![], vec![])].into(),
        };
        let mut codec = ScsiCodec::new(transport);
        assert!(codec.test_unit_ready().is_ok());
    }

    #[test]
    fn inquiry_vpd_rejects_mismatched_page_code() {
        let mut page = vec![0u8; 8];
        page[1] = 0x81; // wrong page code (requested 0x80)
        let transport = MockTransport {
            responses: vec![(0, page, vec![])].into(),
        };
        let mut codec = ScsiCodec::new(transport);
        assert!(codec.inquiry_vpd(0x80, 8).is_err());
    }

    #[test]
    fn mode_sense_6_rejects_oversized_buffer_without_a_command() {
        let transport = MockTransport {
            responses: vec![].into(),
        };
        let mut codec = ScsiCodec::new(transport);
        let err = codec
            .mode_sense_6(0x1c, 0, PageControl::Current, 256)
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn log_sense_skips_double_fetch_for_tapealert() {
        let transport = MockTransport {
            responses: vec![(0, vec![0u8; 4096], vec![])].into(),
        };
        let mut codec = ScsiCodec::new(transport);
        let buf = codec.log_sense(TAPEALERT_LOG_PAGE, 0, 0).unwrap();
        assert_eq!(buf.len(), 4096);
    }
}

//! Semantic NVMe admin operations composed from
//! [`NvmeTransport::admin_command`] calls (spec §4.2.3): Identify, Get Log
//! Page (with 4KB chunking), and Device Self-test.

use diskhealth_core::{CapabilityProbe, Capability, DataPhase, Error, NvmeCommand, NvmeTransport};

const OPCODE_GET_LOG_PAGE: u8 = 0x02;
const OPCODE_IDENTIFY: u8 = 0x06;
const OPCODE_DEVICE_SELF_TEST: u8 = 0x14;

const LOG_PAGE_CHUNK: usize = 4096;
const BROADCAST_NSID: u32 = 0xffff_ffff;

/// Selects which Identify structure comes back from the single Identify
/// opcode (`0x06`); CDW10 bits 7:0 (spec §2 "NVMe opcode reconciliation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cns {
    Namespace = 0x00,
    Controller = 0x01,
}

/// Device Self-test Action, CDW10 bits 3:0 (spec §4.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTestAction {
    Short = 0x1,
    Extended = 0x2,
    VendorSpecific = 0xe,
    Abort = 0xf,
}

/// Wraps one [`NvmeTransport`] with the semantic NVMe operations of §4.2.3.
pub struct NvmeCodec<T: NvmeTransport> {
    transport: T,
}

impl<T: NvmeTransport> NvmeCodec<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn issue(
        &mut self,
        cmd: NvmeCommand,
        phase: DataPhase<'_>,
    ) -> Result<diskhealth_core::NvmeCompletion, Error<T::Error>> {
        diskhealth_core::trace_command("nvme", &[cmd.opcode]);
        self.transport.admin_command(cmd, phase)
    }

    /// Identify (opcode `0x06`), CNS-selected. `nsid` is ignored for
    /// [`Cns::Controller`].
    pub fn identify(&mut self, cns: Cns, nsid: u32) -> Result<[u8; 4096], Error<T::Error>> {
        let mut buf = [0u8; 4096];
        let cmd = NvmeCommand {
            opcode: OPCODE_IDENTIFY,
            nsid: match cns {
                Cns::Controller => 0,
                Cns::Namespace => nsid,
            },
            cdw10: cns as u32,
            ..Default::default()
        };
        self.issue(cmd, DataPhase::In(&mut buf))?;
        Ok(buf)
    }

    pub fn identify_controller(&mut self) -> Result<crate::identify::IdentifyController, Error<T::Error>> {
        let buf = self.identify(Cns::Controller, 0)?;
        Ok(crate::identify::IdentifyController::from_bytes(&buf))
    }

    pub fn identify_namespace(
        &mut self,
        nsid: u32,
    ) -> Result<crate::identify::IdentifyNamespace, Error<T::Error>> {
        let buf = self.identify(Cns::Namespace, nsid)?;
        Ok(crate::identify::IdentifyNamespace::from_bytes(&buf))
    }

    /// Get Log Page for a single ≤4KB chunk (spec §4.2.3; ported from
    /// `nvme_read_log_page_1`). `size` must satisfy `4 <= size <= 4096` and
    /// be a multiple of 4; `offset` must be a multiple of 4.
    fn get_log_page_chunk(
        &mut self,
        nsid: u32,
        lid: u8,
        buf: &mut [u8],
        offset: u32,
    ) -> Result<(), Error<T::Error>> {
        debug_assert!((4..=LOG_PAGE_CHUNK).contains(&buf.len()));
        debug_assert_eq!(buf.len() % 4, 0);
        debug_assert_eq!(offset % 4, 0);
        let numd = (buf.len() / 4) as u32 - 1;
        let cmd = NvmeCommand {
            opcode: OPCODE_GET_LOG_PAGE,
            nsid,
            cdw10: lid as u32 | (numd << 16),
            cdw12: offset,
            ..Default::default()
        };
        self.issue(cmd, DataPhase::In(buf))?;
        Ok(())
    }

    /// Get Log Page, chunked across 4KB boundaries (spec §4.2.3 "Large log
    /// page chunking"; ported from `nvme_read_log_page`). Refuses to read
    /// past the first chunk with `Errno::NoSys` unless the controller
    /// supports Log Page Offset, or `force_lpo` overrides that check.
    pub fn get_log_page(
        &mut self,
        nsid: u32,
        lid: u8,
        buf: &mut [u8],
        force_lpo: bool,
    ) -> Result<usize, Error<T::Error>>
    where
        T: CapabilityProbe,
    {
        let lpo_supported = force_lpo || self.transport.is_capability(Capability::NvmeLogPageOffset);
        let mut done = 0usize;
        while done < buf.len() {
            if done > 0 && !lpo_supported {
                return Err(Error::Transport(diskhealth_core::UniformError::new(
                    diskhealth_core::Errno::NoSys,
                    "controller does not support Log Page Offset",
                )));
            }
            let chunk_len = (buf.len() - done).min(LOG_PAGE_CHUNK);
            self.get_log_page_chunk(nsid, lid, &mut buf[done..done + chunk_len], done as u32)?;
            done += chunk_len;
        }
        Ok(done)
    }

    /// Error Information log (LID `0x01`), broadcast NSID.
    pub fn read_error_log(
        &mut self,
        entries: usize,
        force_lpo: bool,
    ) -> Result<Vec<crate::log::ErrorLogEntry>, Error<T::Error>>
    where
        T: CapabilityProbe,
    {
        let mut buf = vec![0u8; entries * 64];
        self.get_log_page(BROADCAST_NSID, crate::log::lid::ERROR_INFORMATION, &mut buf, force_lpo)?;
        Ok(buf
            .chunks_exact(64)
            .map(|chunk| crate::log::ErrorLogEntry::from_bytes(chunk.try_into().unwrap()))
            .collect())
    }

    /// SMART / Health Information log (LID `0x02`), broadcast NSID.
    pub fn read_smart_log(&mut self, force_lpo: bool) -> Result<crate::log::SmartLog, Error<T::Error>>
    where
        T: CapabilityProbe,
    {
        let mut buf = [0u8; 512];
        self.get_log_page(BROADCAST_NSID, crate::log::lid::SMART_HEALTH, &mut buf, force_lpo)?;
        Ok(crate::log::SmartLog::from_bytes(&buf))
    }

    /// Device Self-test log (LID `0x06`), broadcast NSID.
    pub fn read_self_test_log(
        &mut self,
        force_lpo: bool,
    ) -> Result<crate::log::SelfTestLog, Error<T::Error>>
    where
        T: CapabilityProbe,
    {
        let mut buf = [0u8; 564];
        self.get_log_page(BROADCAST_NSID, crate::log::lid::DEVICE_SELF_TEST, &mut buf, force_lpo)?;
        Ok(crate::log::SelfTestLog::from_bytes(&buf))
    }

    /// Device Self-test (opcode `0x14`); `nsid` of `0xffffffff` tests all
    /// namespaces.
    pub fn device_self_test(
        &mut self,
        action: SelfTestAction,
        nsid: u32,
    ) -> Result<(), Error<T::Error>> {
        let cmd = NvmeCommand {
            opcode: OPCODE_DEVICE_SELF_TEST,
            nsid,
            cdw10: action as u32,
            ..Default::default()
        };
        self.issue(cmd, DataPhase::None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskhealth_core::{NvmeCompletion, UniformError};

    struct MockTransport {
        log_page_offset_supported: bool,
        pages_served: std::cell::RefCell<Vec<(u8, u32, usize)>>,
    }

    impl NvmeTransport for MockTransport {
        type Error = std::convert::Infallible;

        fn admin_command(
            &mut self,
            cmd: NvmeCommand,
            phase: DataPhase<'_>,
        ) -> Result<NvmeCompletion, Error<Self::Error>> {
            if cmd.opcode == OPCODE_GET_LOG_PAGE {
                let lid = (cmd.cdw10 & 0xff) as u8;
                self.pages_served
                    .borrow_mut()
                    .push((lid, cmd.cdw12, phase.len()));
            }
            Ok(NvmeCompletion {
                sct: 0,
                sc: 0,
                result: 0,
                valid: true,
            })
        }
    }

    impl CapabilityProbe for MockTransport {
        fn is_capability(&self, cap: Capability) -> bool {
            matches!(cap, Capability::NvmeLogPageOffset) && self.log_page_offset_supported
        }
    }

    #[test]
    fn single_chunk_log_page_needs_no_lpo_support() {
        let mut codec = NvmeCodec::new(MockTransport {
            log_page_offset_supported: false,
            pages_served: std::cell::RefCell::new(Vec::new()),
        });
        let mut buf = vec![0u8; 512];
        let n = codec.get_log_page(0xffff_ffff, 0x02, &mut buf, false).unwrap();
        assert_eq!(n, 512);
    }

    #[test]
    fn multi_chunk_log_page_fails_without_lpo_support() {
        let mut codec = NvmeCodec::new(MockTransport {
            log_page_offset_supported: false,
            pages_served: std::cell::RefCell::new(Vec::new()),
        });
        let mut buf = vec![0u8; LOG_PAGE_CHUNK + 512];
        let err = codec.get_log_page(0xffff_ffff, 0x02, &mut buf, false).unwrap_err();
        match err {
            Error::Transport(UniformError { code, .. }) => {
                assert_eq!(code, diskhealth_core::Errno::NoSys)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn multi_chunk_log_page_succeeds_with_lpo_support() {
        let mut codec = NvmeCodec::new(MockTransport {
            log_page_offset_supported: true,
            pages_served: std::cell::RefCell::new(Vec::new()),
        });
        let mut buf = vec![0u8; LOG_PAGE_CHUNK + 512];
        let n = codec.get_log_page(0xffff_ffff, 0x02, &mut buf, false).unwrap();
        assert_eq!(n, LOG_PAGE_CHUNK + 512);
        assert_eq!(
            codec.transport.pages_served.borrow().as_slice(),
            &[(0x02, 0, LOG_PAGE_CHUNK), (0x02, LOG_PAGE_CHUNK as u32, 512)]
        );
    }

    #[test]
    fn force_lpo_overrides_capability_probe() {
        let mut codec = NvmeCodec::new(MockTransport {
            log_page_offset_supported: false,
            pages_served: std::cell::RefCell::new(Vec::new()),
        });
        let mut buf = vec![0u8; LOG_PAGE_CHUNK + 512];
        let n = codec.get_log_page(0xffff_ffff, 0x02, &mut buf, true).unwrap();
        assert_eq!(n, LOG_PAGE_CHUNK + 512);
    }
}

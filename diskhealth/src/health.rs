//! Semantic health operations (spec §4.3): overall health verdict,
//! attribute dump, self-test launch, and self-test log read. Each one
//! dispatches on [`Protocol`] and calls down into the matching codec crate;
//! none of them touches a transport directly.

use crate::device::{Device, Protocol};
use crate::opener::DeviceOpeners;
use diskhealth_ata::selftest::{SelfTestLog, SelfTestType};
use diskhealth_ata::{AtaCodec, SmartReturnStatus, SmartThresholds, SmartValues};
use diskhealth_core::{
    AtaTransport, Capability, CapabilityProbe, Errno, Error, NvmeTransport, ScsiTransport,
    UniformError,
};
use diskhealth_nvme::{NvmeCodec, SelfTestAction};
use diskhealth_scsi::ScsiCodec;
use std::fmt;

fn flatten<E: PartialEq + Eq + fmt::Debug>(e: Error<E>) -> UniformError {
    match e {
        Error::Transport(u) => u,
        Error::ProtocolError => UniformError::new(Errno::Io, "protocol error: malformed response"),
        Error::Host(h) => UniformError::new(Errno::Io, format!("host error: {h:?}")),
    }
}

/// Overall health verdict, folded from whichever protocol's own mechanism
/// answered (spec §4.3 "Overall health assessment"). Serialises as `Passed`
/// / `Failed` / `Unknown` to match the report tree's literal field values
/// (spec §8.4 scenarios 2 and 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum HealthVerdict {
    Passed,
    #[serde(rename = "Failed")]
    Failing,
    /// The device answered but gave no usable verdict (spec §9's Open
    /// Question: some hosts mask the SMART RETURN STATUS registers).
    Unknown,
}

/// ATA: SMART RETURN STATUS (spec §4.2.1, §4.3). Hosts that mask the
/// `lba_mid`/`lba_high` registers (spec §9's Open Question) advertise that
/// by answering `false` to [`Capability::AtaSmartStatusVerbatim`]; the codec
/// then falls back to the pseudo-check rather than trust an
/// `Indeterminate` magic pair that might just be the host's masking.
fn ata_health<T: AtaTransport + CapabilityProbe>(
    codec: &mut AtaCodec<T>,
) -> Result<HealthVerdict, UniformError> {
    if !codec
        .transport_mut()
        .is_capability(Capability::AtaSmartStatusVerbatim)
    {
        return ata_health_pseudo_check(codec);
    }
    match codec.smart_return_status().map_err(flatten)? {
        SmartReturnStatus::Passed => Ok(HealthVerdict::Passed),
        SmartReturnStatus::Failing => Ok(HealthVerdict::Failing),
        SmartReturnStatus::Indeterminate => ata_health_pseudo_check(codec),
    }
}

/// Compare every attribute to its threshold directly instead of trusting
/// SMART RETURN STATUS (spec §9's Open Question fallback): any prefailure
/// attribute at or below its threshold fails the whole device.
fn ata_health_pseudo_check<T: AtaTransport>(
    codec: &mut AtaCodec<T>,
) -> Result<HealthVerdict, UniformError> {
    let (values_buf, _) = codec.smart_read_values().map_err(flatten)?;
    let (thresh_buf, _) = codec.smart_read_thresholds().map_err(flatten)?;
    let values = SmartValues::from_bytes(values_buf);
    let thresholds = SmartThresholds::from_bytes(thresh_buf);
    let failing = values.attributes().any(|attr| {
        thresholds
            .threshold_for(attr.id())
            .map(|t| attr.failing_now(t))
            .unwrap_or(false)
    });
    Ok(if failing {
        HealthVerdict::Failing
    } else {
        HealthVerdict::Passed
    })
}

const IE_LOG_PAGE: u8 = 0x2f;

/// SCSI: the Informational Exceptions log page (`0x2f`) carries the same
/// ASC/ASCQ pair a background scan would report through CHECK CONDITION;
/// a device that doesn't support LOG SENSE for it falls back to an
/// immediate TEST UNIT READY + REQUEST SENSE round-trip (spec §4.3).
fn scsi_health<T: ScsiTransport>(codec: &mut ScsiCodec<T>) -> Result<HealthVerdict, UniformError> {
    match codec.log_sense(IE_LOG_PAGE, 0, 0) {
        Ok(buf) if buf.len() >= 6 => {
            let asc = buf[4];
            let ascq = buf[5];
            if asc == 0 && ascq == 0 {
                Ok(HealthVerdict::Passed)
            } else {
                Ok(HealthVerdict::Failing)
            }
        }
        Ok(_) => Ok(HealthVerdict::Unknown),
        Err(_) => {
            codec.test_unit_ready().map_err(flatten)?;
            let tuple = codec.request_sense().map_err(flatten)?;
            if tuple.sense_key == 0 {
                Ok(HealthVerdict::Passed)
            } else {
                Ok(HealthVerdict::Unknown)
            }
        }
    }
}

/// NVMe: Critical Warning byte of the SMART / Health Information log
/// (spec §4.3).
fn nvme_health<T: NvmeTransport + CapabilityProbe>(
    codec: &mut NvmeCodec<T>,
    force_lpo: bool,
) -> Result<HealthVerdict, UniformError> {
    let log = codec.read_smart_log(force_lpo).map_err(flatten)?;
    if log.critical_warning != 0 {
        Ok(HealthVerdict::Failing)
    } else {
        Ok(HealthVerdict::Passed)
    }
}

pub fn assess_health<O: DeviceOpeners>(device: &mut Device<O>) -> Result<HealthVerdict, UniformError> {
    let force_lpo = device.config().nvme_force_lpo;
    match &mut device.protocol {
        Protocol::Ata(codec) => ata_health(codec),
        Protocol::Scsi(codec) => scsi_health(codec),
        Protocol::Nvme(codec) => nvme_health(codec, force_lpo),
    }
}

/// One SMART attribute paired with its threshold (spec §4.3 "Attribute
/// dump"): ATA-only, since SCSI/NVMe have no equivalent vendor-attribute
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AttributeReport {
    pub id: u8,
    pub flags: u16,
    pub current: u8,
    pub worst: u8,
    pub raw_value: [u8; 6],
    pub threshold: Option<u8>,
    pub prefailure: bool,
    /// Bit 1 of `flags`: the attribute is updated during normal operation,
    /// not only during an off-line collection cycle (spec §4.3).
    pub updated_policy: bool,
    pub failing_now: bool,
    /// Set once the worst-ever recorded value has dropped to or below the
    /// threshold, even if the *current* value has since recovered (spec
    /// §4.3: `failed_ever` alongside `failed_now`).
    pub failed_ever: bool,
}

pub fn read_attributes<O: DeviceOpeners>(
    device: &mut Device<O>,
) -> Result<Vec<AttributeReport>, UniformError> {
    let codec = match &mut device.protocol {
        Protocol::Ata(codec) => codec,
        _ => {
            return Err(UniformError::new(
                Errno::NoSys,
                "attribute dump is only defined for ATA devices",
            ))
        }
    };
    let (values_buf, values_ok) = codec.smart_read_values().map_err(flatten)?;
    let (thresh_buf, thresh_ok) = codec.smart_read_thresholds().map_err(flatten)?;
    if !values_ok {
        log::warn!("SMART READ VALUES checksum mismatch");
    }
    if !thresh_ok {
        log::warn!("SMART READ THRESHOLDS checksum mismatch");
    }
    let values = SmartValues::from_bytes(values_buf);
    let thresholds = SmartThresholds::from_bytes(thresh_buf);
    Ok(values
        .attributes()
        .map(|attr| {
            let threshold = thresholds.threshold_for(attr.id());
            let failing_now = threshold.map(|t| attr.failing_now(t)).unwrap_or(false);
            let failed_ever = threshold
                .map(|t| attr.prefailure() && attr.worst() <= t)
                .unwrap_or(false);
            AttributeReport {
                id: attr.id(),
                flags: attr.flags(),
                current: attr.current(),
                worst: attr.worst(),
                raw_value: attr.raw_value(),
                threshold,
                prefailure: attr.prefailure(),
                updated_policy: attr.online(),
                failing_now,
                failed_ever,
            }
        })
        .collect())
}

/// Which self-test to launch, tagged by the protocol it applies to (spec
/// §4.3 "Self-test launcher"). A kind that doesn't match the open device's
/// protocol is rejected with `EINVAL` rather than silently ignored.
pub enum SelfTestKind {
    Ata(SelfTestType),
    /// SEND DIAGNOSTIC's SELFTEST bit plus function code (0 = default
    /// self-test, 4 = foreground extended).
    Scsi { function_code: u8, extended: bool },
    Nvme(SelfTestAction),
}

pub fn start_self_test<O: DeviceOpeners>(
    device: &mut Device<O>,
    kind: SelfTestKind,
) -> Result<(), UniformError> {
    match (&mut device.protocol, kind) {
        (Protocol::Ata(codec), SelfTestKind::Ata(t)) => {
            codec.smart_execute_offline(t.subcommand()).map_err(flatten)
        }
        (
            Protocol::Scsi(codec),
            SelfTestKind::Scsi {
                function_code,
                extended,
            },
        ) => codec.send_diagnostic(function_code, extended).map_err(flatten),
        (Protocol::Nvme(codec), SelfTestKind::Nvme(action)) => {
            codec.device_self_test(action, 0xffff_ffff).map_err(flatten)
        }
        _ => Err(UniformError::new(
            Errno::Inval,
            "self-test kind does not match this device's protocol",
        )),
    }
}

/// One self-test log entry, folded from whichever protocol's own log
/// layout answered (spec §4.3 "Self-test log read"). `number` is the
/// protocol's own numbering (ATA: circular slot, NVMe: completed-first
/// order); SCSI devices have no equivalent structured log in this
/// workspace and are rejected with `ENOSYS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SelfTestLogEntry {
    pub number: u8,
    pub status_code: u8,
    pub lifetime_hours: u32,
    pub failing_lba: Option<u64>,
}

const ATA_SELF_TEST_LOG_PAGE: u8 = 0x06;

pub fn read_self_test_log<O: DeviceOpeners>(
    device: &mut Device<O>,
) -> Result<Vec<SelfTestLogEntry>, UniformError> {
    let force_lpo = device.config().nvme_force_lpo;
    match &mut device.protocol {
        Protocol::Ata(codec) => {
            let raw = codec
                .smart_read_log(ATA_SELF_TEST_LOG_PAGE, 1)
                .map_err(flatten)?;
            let mut arr = [0u8; 512];
            arr.copy_from_slice(&raw[..512]);
            let log = SelfTestLog::from_bytes(arr);
            Ok(log
                .entries_newest_first()
                .map(|e| SelfTestLogEntry {
                    number: e.self_test_number(),
                    status_code: e.status(),
                    lifetime_hours: e.lifetime_hours() as u32,
                    failing_lba: (e.lba_of_first_failure() != 0)
                        .then(|| e.lba_of_first_failure() as u64),
                })
                .collect())
        }
        Protocol::Nvme(codec) => {
            let log = codec.read_self_test_log(force_lpo).map_err(flatten)?;
            Ok(log
                .results()
                .map(|r| SelfTestLogEntry {
                    number: 0,
                    status_code: r.result_code(),
                    lifetime_hours: r.power_on_hours() as u32,
                    failing_lba: (r.failing_lba() != 0).then_some(r.failing_lba()),
                })
                .collect())
        }
        Protocol::Scsi(_) => Err(UniformError::new(
            Errno::NoSys,
            "self-test log reading is not defined for SCSI devices in this workspace",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::open_device;
    use diskhealth_core::{AtaCommand, AtaTaskFileOut, Capability, Config, DataPhase, NvmeCommand, NvmeCompletion, ScsiOutcome};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct HostErr;

    struct MockAta {
        return_status: (u8, u8),
        values: [u8; 512],
        thresholds: [u8; 512],
        /// When set, the transport hides SMART RETURN STATUS (spec §9's
        /// Open Question); `assess_health` must fall back to comparing
        /// attributes to thresholds instead of the magic pair.
        masked: bool,
    }

    impl AtaTransport for MockAta {
        type Error = HostErr;

        fn ata_pass_through(
            &mut self,
            cmd: AtaCommand<'_>,
        ) -> Result<AtaTaskFileOut, Error<Self::Error>> {
            match (cmd.tf.command, cmd.tf.features) {
                (0xb0, 0xda) => Ok(AtaTaskFileOut {
                    lba_mid: self.return_status.0,
                    lba_high: self.return_status.1,
                    ..Default::default()
                }),
                (0xb0, 0xd0) => {
                    if let DataPhase::In(buf) = cmd.phase {
                        buf.copy_from_slice(&self.values);
                    }
                    Ok(AtaTaskFileOut::default())
                }
                (0xb0, 0xd1) => {
                    if let DataPhase::In(buf) = cmd.phase {
                        buf.copy_from_slice(&self.thresholds);
                    }
                    Ok(AtaTaskFileOut::default())
                }
                (0xb0, 0xd4) => Ok(AtaTaskFileOut::default()),
                _ => panic!("unexpected ATA command {:#x}/{:#x}", cmd.tf.command, cmd.tf.features),
            }
        }
    }

    impl CapabilityProbe for MockAta {
        fn is_capability(&self, cap: Capability) -> bool {
            matches!(cap, Capability::AtaSmartStatusVerbatim) && !self.masked
        }
    }

    struct MockScsi {
        ie_supported: bool,
        asc: u8,
        ascq: u8,
    }

    impl ScsiTransport for MockScsi {
        type Error = HostErr;

        fn command(
            &mut self,
            cdb: &[u8],
            phase: DataPhase<'_>,
            _timeout_secs: u32,
        ) -> Result<ScsiOutcome, Error<Self::Error>> {
            match cdb[0] {
                0x4d if self.ie_supported => {
                    // LOG SENSE
                    if let DataPhase::In(buf) = phase {
                        buf[0] = IE_LOG_PAGE;
                        if buf.len() >= 6 {
                            buf[4] = self.asc;
                            buf[5] = self.ascq;
                        }
                    }
                    Ok(ScsiOutcome {
                        status: 0,
                        resid: 0,
                        sense: Vec::new(),
                    })
                }
                0x4d => Ok(ScsiOutcome {
                    status: 0x02,
                    resid: 0,
                    sense: vec![0x70, 0, 0x05, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x20, 0x00],
                }),
                0x00 => Ok(ScsiOutcome {
                    status: 0,
                    resid: 0,
                    sense: Vec::new(),
                }),
                0x03 => {
                    if let DataPhase::In(buf) = phase {
                        buf[0] = 0x70;
                        buf[2] = 0x00;
                    }
                    Ok(ScsiOutcome {
                        status: 0,
                        resid: 0,
                        sense: Vec::new(),
                    })
                }
                _ => panic!("unexpected SCSI opcode {:#x}", cdb[0]),
            }
        }
    }

    impl CapabilityProbe for MockScsi {
        fn is_capability(&self, _cap: Capability) -> bool {
            false
        }
    }

    struct MockNvme {
        critical_warning: u8,
    }

    impl NvmeTransport for MockNvme {
        type Error = HostErr;

        fn admin_command(
            &mut self,
            cmd: NvmeCommand,
            phase: DataPhase<'_>,
        ) -> Result<NvmeCompletion, Error<Self::Error>> {
            if cmd.opcode == 0x02 {
                if let DataPhase::In(buf) = phase {
                    buf[0] = self.critical_warning;
                }
            }
            Ok(NvmeCompletion {
                sct: 0,
                sc: 0,
                result: 0,
                valid: true,
            })
        }
    }

    impl CapabilityProbe for MockNvme {
        fn is_capability(&self, _cap: Capability) -> bool {
            false
        }
    }

    struct MockOpeners {
        ata: Option<MockAta>,
        scsi: Option<MockScsi>,
        nvme: Option<MockNvme>,
    }

    impl DeviceOpeners for MockOpeners {
        type HostError = HostErr;
        type Ata = MockAta;
        type Scsi = MockScsi;
        type Nvme = MockNvme;

        fn open_ata(&mut self, _name: &str) -> Result<Self::Ata, UniformError> {
            Ok(self.ata.take().unwrap())
        }

        fn open_scsi(&mut self, _name: &str) -> Result<Self::Scsi, UniformError> {
            Ok(self.scsi.take().unwrap())
        }

        fn open_nvme(&mut self, _name: &str) -> Result<Self::Nvme, UniformError> {
            Ok(self.nvme.take().unwrap())
        }
    }

    fn passing_smart_bytes() -> [u8; 512] {
        let mut raw = [0u8; 512];
        // one attribute: id 5, prefailure bit set, current well above a
        // low threshold so it isn't failing.
        raw[2] = 5;
        raw[3] = 0x01;
        raw[5] = 100;
        raw
    }

    #[test]
    fn ata_health_reports_failing_on_smart_magic_pair() {
        let mut opener = MockOpeners {
            ata: Some(MockAta {
                return_status: (0xf4, 0x2c),
                values: [0u8; 512],
                thresholds: [0u8; 512],
                masked: false,
            }),
            scsi: None,
            nvme: None,
        };
        let mut device = open_device(&mut opener, "/dev/hda", None, Config::default()).unwrap();
        assert_eq!(assess_health(&mut device).unwrap(), HealthVerdict::Failing);
    }

    #[test]
    fn ata_attribute_dump_pairs_threshold_and_flags_failing_now_correct() {
        let mut opener = MockOpeners {
            ata: Some(MockAta {
                return_status: (0x4f, 0xc2),
                values: passing_smart_bytes(),
                thresholds: {
                    let mut t = [0u8; 512];
                    t[2] = 5;
                    t[3] = 50; // threshold above current(100)? below actually
                    t
                },
                masked: false,
            }),
            scsi: None,
            nvme: None,
        };
        let mut device = open_device(&mut opener, "/dev/hda", None, Config::default()).unwrap();
        let attrs = read_attributes(&mut device).unwrap();
        let attr5 = attrs.iter().find(|a| a.id == 5).unwrap();
        assert_eq!(attr5.current, 100);
        assert_eq!(attr5.threshold, Some(50));
        assert!(!attr5.failing_now);
    }

    #[test]
    fn ata_health_falls_back_to_pseudo_check_when_status_registers_are_masked() {
        // The host masks SMART RETURN STATUS's magic pair (both zero, which
        // would otherwise read as Indeterminate); the codec must fall back
        // to comparing the one prefailure attribute against its threshold
        // instead, and find it failing.
        let mut values = [0u8; 512];
        values[2] = 5; // attribute id
        values[3] = 0x01; // prefailure bit
        values[5] = 10; // current value
        let mut thresholds = [0u8; 512];
        thresholds[2] = 5;
        thresholds[3] = 20; // current(10) <= threshold(20): failing
        let mut opener = MockOpeners {
            ata: Some(MockAta {
                return_status: (0, 0),
                values,
                thresholds,
                masked: true,
            }),
            scsi: None,
            nvme: None,
        };
        let mut device = open_device(&mut opener, "/dev/hda", None, Config::default()).unwrap();
        assert_eq!(assess_health(&mut device).unwrap(), HealthVerdict::Failing);
    }

    #[test]
    fn scsi_health_uses_ie_log_page_when_supported() {
        let mut opener = MockOpeners {
            ata: None,
            scsi: Some(MockScsi {
                ie_supported: true,
                asc: 0,
                ascq: 0,
            }),
            nvme: None,
        };
        let mut device = open_device(&mut opener, "/dev/sda", Some("scsi"), Config::default()).unwrap();
        assert_eq!(assess_health(&mut device).unwrap(), HealthVerdict::Passed);
    }

    #[test]
    fn scsi_health_falls_back_to_request_sense_without_ie_log_page() {
        let mut opener = MockOpeners {
            ata: None,
            scsi: Some(MockScsi {
                ie_supported: false,
                asc: 0,
                ascq: 0,
            }),
            nvme: None,
        };
        let mut device = open_device(&mut opener, "/dev/sda", Some("scsi"), Config::default()).unwrap();
        assert_eq!(assess_health(&mut device).unwrap(), HealthVerdict::Passed);
    }

    #[test]
    fn nvme_health_fails_on_nonzero_critical_warning() {
        let mut opener = MockOpeners {
            ata: None,
            scsi: None,
            nvme: Some(MockNvme { critical_warning: 0x04 }),
        };
        let mut device = open_device(&mut opener, "/dev/nvme0n1", None, Config::default()).unwrap();
        assert_eq!(assess_health(&mut device).unwrap(), HealthVerdict::Failing);
    }

    #[test]
    fn self_test_kind_mismatch_is_rejected() {
        let mut opener = MockOpeners {
            ata: None,
            scsi: None,
            nvme: Some(MockNvme { critical_warning: 0 }),
        };
        let mut device = open_device(&mut opener, "/dev/nvme0n1", None, Config::default()).unwrap();
        let err = start_self_test(&mut device, SelfTestKind::Ata(SelfTestType::Short)).unwrap_err();
        assert_eq!(err.code, Errno::Inval);
    }

    #[test]
    fn self_test_log_unsupported_for_scsi() {
        let mut opener = MockOpeners {
            ata: None,
            scsi: Some(MockScsi {
                ie_supported: true,
                asc: 0,
                ascq: 0,
            }),
            nvme: None,
        };
        let mut device = open_device(&mut opener, "/dev/sda", Some("scsi"), Config::default()).unwrap();
        let err = read_self_test_log(&mut device).unwrap_err();
        assert_eq!(err.code, Errno::NoSys);
    }
}

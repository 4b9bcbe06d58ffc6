//! SAT: ATA commands tunnelled over SCSI (spec §4.4.1, T10 SAT-4).
//!
//! Builds ATA PASS-THROUGH (12) or (16) CDBs from an [`AtaCommand`] and, on
//! CHECK CONDITION with CK_COND set, decodes the returned ATA register set
//! out of the sense data's "ATA status return" descriptor (type `0x09`).

use crate::adapter::TunnelAdapter;
use diskhealth_core::{AtaCommand, AtaDirection, AtaTaskFileOut, DataPhase, Error, ScsiTransport};

const OPCODE_ATA_PASS_THROUGH_12: u8 = 0xa1;
const OPCODE_ATA_PASS_THROUGH_16: u8 = 0x85;
const ATA_RETURN_DESC_TYPE: u8 = 0x09;
const CHECK_CONDITION: u8 = 0x02;
const DEFAULT_TIMEOUT_SECS: u32 = 60;

/// SAT protocol field values (spec §4.4.1).
mod protocol {
    pub const NON_DATA: u8 = 3;
    pub const PIO_IN: u8 = 4;
    pub const PIO_OUT: u8 = 5;
    pub const DMA: u8 = 6;
}

fn protocol_for(direction: AtaDirection) -> u8 {
    match direction {
        AtaDirection::NoData => protocol::NON_DATA,
        AtaDirection::In => protocol::PIO_IN,
        AtaDirection::Out => protocol::PIO_OUT,
    }
}

/// T_DIR/BYT_BLOK/T_LENGTH/CK_COND packed into CDB byte 2 (spec §4.4.1).
fn flags_byte(direction: AtaDirection) -> u8 {
    const CK_COND: u8 = 1 << 5;
    const T_DIR_FROM_DEVICE: u8 = 1 << 3;
    const BYT_BLOK_BLOCKS: u8 = 1 << 2;
    const T_LENGTH_IN_SECTOR_COUNT: u8 = 2;

    let mut flags = CK_COND;
    if direction == AtaDirection::NoData {
        return flags;
    }
    flags |= BYT_BLOK_BLOCKS | T_LENGTH_IN_SECTOR_COUNT;
    if direction == AtaDirection::In {
        flags |= T_DIR_FROM_DEVICE;
    }
    flags
}

/// ATA PASS-THROUGH (12) for 28-bit commands (spec §4.4.1).
fn build_cdb12(tf: &diskhealth_core::AtaTaskFileIn, direction: AtaDirection) -> [u8; 12] {
    [
        OPCODE_ATA_PASS_THROUGH_12,
        protocol_for(direction) << 1,
        flags_byte(direction),
        tf.features as u8,
        tf.sector_count as u8,
        tf.lba_low,
        tf.lba_mid,
        tf.lba_high,
        tf.device,
        tf.command,
        0,
        0,
    ]
}

/// ATA PASS-THROUGH (16) for 48-bit commands, or when the 12-byte form
/// can't carry the transfer size (spec §4.4.1).
fn build_cdb16(tf: &diskhealth_core::AtaTaskFileIn, direction: AtaDirection) -> [u8; 16] {
    const EXTEND: u8 = 1;
    [
        OPCODE_ATA_PASS_THROUGH_16,
        (protocol_for(direction) << 1) | EXTEND,
        flags_byte(direction),
        tf.features_high,
        tf.features as u8,
        tf.sector_count_high,
        tf.sector_count as u8,
        tf.lba_low_high,
        tf.lba_low,
        tf.lba_mid_high,
        tf.lba_mid,
        tf.lba_high_high,
        tf.lba_high,
        tf.device,
        tf.command,
        0,
    ]
}

fn build_cdb(tf: &diskhealth_core::AtaTaskFileIn, direction: AtaDirection) -> Vec<u8> {
    if tf.is_48bit {
        build_cdb16(tf, direction).to_vec()
    } else {
        build_cdb12(tf, direction).to_vec()
    }
}

/// Finds a sense descriptor of `desc_type` in descriptor-format sense data
/// (spec §4.4.1: the 8-byte header precedes a sequence of TLV descriptors).
fn find_descriptor(sense: &[u8], desc_type: u8) -> Option<&[u8]> {
    if sense.len() < 8 {
        return None;
    }
    let mut i = 8;
    while i + 2 <= sense.len() {
        let t = sense[i];
        let len = sense[i + 1] as usize;
        if i + 2 + len > sense.len() {
            break;
        }
        if t == desc_type {
            return Some(&sense[i + 2..i + 2 + len]);
        }
        i += 2 + len;
    }
    None
}

/// Decodes the 12-byte "ATA status return" descriptor body into output
/// taskfile registers (spec §4.4.1).
fn decode_ata_return(desc: &[u8]) -> Option<AtaTaskFileOut> {
    if desc.len() < 12 {
        return None;
    }
    Some(AtaTaskFileOut {
        error: desc[1],
        sector_count: desc[2],
        lba_low: desc[4],
        lba_mid: desc[6],
        lba_high: desc[8],
        device: desc[10],
        status: desc[11],
    })
}

/// Wraps one [`ScsiTransport`], translating ATA pass-through calls into SAT
/// CDBs (spec §4.4.1).
pub struct SatAdapter<T: ScsiTransport> {
    transport: T,
}

impl<T: ScsiTransport> SatAdapter<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: ScsiTransport> TunnelAdapter for SatAdapter<T> {
    type Error = T::Error;

    fn pass_through(&mut self, cmd: AtaCommand<'_>) -> Result<AtaTaskFileOut, Error<Self::Error>> {
        let cdb = build_cdb(&cmd.tf, cmd.direction);
        diskhealth_core::trace_command("sat", &cdb);
        let outcome = self.transport.command(&cdb, cmd.phase, DEFAULT_TIMEOUT_SECS)?;
        if outcome.status != CHECK_CONDITION {
            return Ok(AtaTaskFileOut::default());
        }
        match find_descriptor(&outcome.sense, ATA_RETURN_DESC_TYPE).and_then(decode_ata_return) {
            Some(out) => Ok(out),
            None => Err(Error::ProtocolError),
        }
    }
}

impl<T: ScsiTransport> diskhealth_core::AtaTransport for SatAdapter<T> {
    type Error = T::Error;

    fn ata_pass_through(
        &mut self,
        cmd: AtaCommand<'_>,
    ) -> Result<AtaTaskFileOut, Error<Self::Error>> {
        self.pass_through(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskhealth_core::{AtaTaskFileIn, ScsiOutcome};

    struct MockTransport {
        status: u8,
        sense: Vec<u8>,
    }

    impl ScsiTransport for MockTransport {
        type Error = std::convert::Infallible;

        fn command(
            &mut self,
            _cdb: &[u8],
            _phase: DataPhase<'_>,
            _timeout_secs: u32,
        ) -> Result<ScsiOutcome, Error<Self::Error>> {
            Ok(ScsiOutcome {
                status: self.status,
                resid: 0,
                sense: self.sense.clone(),
            })
        }
    }

    fn ata_return_sense(status: u8, device: u8) -> Vec<u8> {
        let mut sense = vec![0u8; 8];
        sense.push(ATA_RETURN_DESC_TYPE);
        sense.push(12);
        sense.extend_from_slice(&[0u8; 1]); // extend flag
        sense.push(0); // error
        sense.extend_from_slice(&[0, 0]); // sector count (7:0),(15:8)
        sense.extend_from_slice(&[0, 0, 0, 0, 0]); // lba bytes 7:0..39:32
        sense.push(device);
        sense.push(status);
        sense
    }

    #[test]
    fn good_status_returns_default_taskfile() {
        let mut adapter = SatAdapter::new(MockTransport {
            status: 0,
            sense: Vec::new(),
        });
        let tf = AtaTaskFileIn::default();
        let out = adapter
            .pass_through(AtaCommand {
                tf,
                direction: AtaDirection::NoData,
                phase: DataPhase::None,
            })
            .unwrap();
        assert_eq!(out, AtaTaskFileOut::default());
    }

    #[test]
    fn check_condition_decodes_ata_return_descriptor() {
        let mut adapter = SatAdapter::new(MockTransport {
            status: CHECK_CONDITION,
            sense: ata_return_sense(0x50, 0xe0),
        });
        let tf = AtaTaskFileIn::default();
        let out = adapter
            .pass_through(AtaCommand {
                tf,
                direction: AtaDirection::NoData,
                phase: DataPhase::None,
            })
            .unwrap();
        assert_eq!(out.status, 0x50);
        assert_eq!(out.device, 0xe0);
    }

    #[test]
    fn check_condition_without_descriptor_is_protocol_error() {
        let mut adapter = SatAdapter::new(MockTransport {
            status: CHECK_CONDITION,
            sense: vec![0u8; 8],
        });
        let tf = AtaTaskFileIn::default();
        let err = adapter
            .pass_through(AtaCommand {
                tf,
                direction: AtaDirection::NoData,
                phase: DataPhase::None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolError));
    }

    #[test]
    fn uses_28bit_cdb_form_for_non_48bit_commands() {
        let tf = AtaTaskFileIn {
            command: 0xec,
            ..Default::default()
        };
        let cdb = build_cdb(&tf, AtaDirection::In);
        assert_eq!(cdb.len(), 12);
        assert_eq!(cdb[0], OPCODE_ATA_PASS_THROUGH_12);
    }

    #[test]
    fn uses_48bit_cdb_form_when_flagged() {
        let tf = AtaTaskFileIn {
            command: 0x24,
            is_48bit: true,
            ..Default::default()
        };
        let cdb = build_cdb(&tf, AtaDirection::In);
        assert_eq!(cdb.len(), 16);
        assert_eq!(cdb[0], OPCODE_ATA_PASS_THROUGH_16);
    }
}

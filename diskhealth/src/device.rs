//! Device construction: the polymorphic `Device<O>` tagged sum and the
//! `open_device` factory (spec §3.1, §4.1.2, §6.3, §9).
//!
//! A device is a tagged sum of exactly three pass-through families, never an
//! erased trait object (spec §9: "tagged sum, not an inheritance
//! hierarchy"). Tunnel adapters do not add a fourth family: they are folded
//! into the ATA arm as [`AtaLink`], itself a tagged sum over every way this
//! workspace knows to carry an ATA taskfile (spec §4.4), so `Device<O>`
//! composes SAT/JMB39x/vendor-RAID tunnels without boxing anything.

use crate::opener::DeviceOpeners;
use diskhealth_ata::AtaCodec;
use diskhealth_core::{
    naming, AtaCommand, AtaDirection, AtaTaskFileIn, Capability, CapabilityProbe, Config,
    DataPhase, DeviceKind, DeviceState, Errno, Error, UniformError,
};
use diskhealth_nvme::NvmeCodec;
use diskhealth_scsi::ScsiCodec;
use diskhealth_tunnel::{
    AtaSectorIo, CcissCodec, HighPointCodec, Jmb39xAdapter, MarvellCodec, Ps3storCodec,
    SatAdapter, ScsiSectorIo, ThreewareCodec, VendorAdapter, VendorCodec,
};
use std::fmt;

/// Every way this workspace can carry an ATA taskfile to a disk: a native
/// pass-through, or one of the tunnel adapters of spec §4.4.
pub enum AtaLink<O: DeviceOpeners> {
    Native(O::Ata),
    Sat(SatAdapter<O::Scsi>),
    JmbOverAta(Jmb39xAdapter<AtaSectorIo<O::Ata>>),
    JmbOverScsi(Jmb39xAdapter<ScsiSectorIo<O::Scsi>>),
    Threeware(VendorAdapter<O::Scsi, ThreewareCodec>),
    HighPoint(VendorAdapter<O::Scsi, HighPointCodec>),
    Marvell(VendorAdapter<O::Scsi, MarvellCodec>),
    Cciss(VendorAdapter<O::Scsi, CcissCodec>),
    Ps3stor(VendorAdapter<O::Scsi, Ps3storCodec>),
}

impl<O: DeviceOpeners> diskhealth_core::AtaTransport for AtaLink<O> {
    type Error = O::HostError;

    fn ata_pass_through(
        &mut self,
        cmd: AtaCommand<'_>,
    ) -> Result<diskhealth_core::AtaTaskFileOut, Error<Self::Error>> {
        match self {
            AtaLink::Native(t) => t.ata_pass_through(cmd),
            AtaLink::Sat(a) => a.ata_pass_through(cmd),
            AtaLink::JmbOverAta(a) => a.ata_pass_through(cmd),
            AtaLink::JmbOverScsi(a) => a.ata_pass_through(cmd),
            AtaLink::Threeware(a) => a.ata_pass_through(cmd),
            AtaLink::HighPoint(a) => a.ata_pass_through(cmd),
            AtaLink::Marvell(a) => a.ata_pass_through(cmd),
            AtaLink::Cciss(a) => a.ata_pass_through(cmd),
            AtaLink::Ps3stor(a) => a.ata_pass_through(cmd),
        }
    }
}

impl<O: DeviceOpeners> CapabilityProbe for AtaLink<O> {
    /// Only a native transport can answer capability queries meaningfully;
    /// every tunnel here is 28-bit PIO-shaped or implements its own framing
    /// that doesn't expose the underlying transport's capabilities.
    fn is_capability(&self, cap: Capability) -> bool {
        match self {
            AtaLink::Native(t) => t.is_capability(cap),
            _ => false,
        }
    }
}

/// Restores whichever tunnel adapter is active before the handle is
/// dropped (spec §4.4.2 "Restoration"). Native ATA/SAT/vendor links have
/// nothing to restore.
fn close_ata_link<O: DeviceOpeners>(link: &mut AtaLink<O>) {
    match link {
        AtaLink::JmbOverAta(a) => {
            a.close();
        }
        AtaLink::JmbOverScsi(a) => {
            a.close();
        }
        _ => {}
    }
}

/// The three pass-through families a device can wrap (spec §3.1).
pub enum Protocol<O: DeviceOpeners> {
    Ata(AtaCodec<AtaLink<O>>),
    Scsi(ScsiCodec<O::Scsi>),
    Nvme(NvmeCodec<O::Nvme>),
}

/// A live device handle (spec §3.1): bookkeeping plus one of the three
/// pass-through families, plus the `Config` it was opened with.
pub struct Device<O: DeviceOpeners> {
    pub(crate) state: DeviceState,
    pub(crate) protocol: Protocol<O>,
    pub(crate) config: Config,
}

impl<O: DeviceOpeners> Device<O> {
    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn requested_type(&self) -> &str {
        self.state.requested_type()
    }

    pub fn effective_type(&self) -> DeviceKind {
        self.state.effective_type()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn last_error(&self) -> Option<&UniformError> {
        self.state.last_error()
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn record_error(&mut self, err: UniformError) {
        self.state.record_error(err);
    }

    /// Restores any tunnel adapter state and marks the device closed.
    /// Idempotent; safe on every exit path (spec §3.1).
    pub fn close(&mut self) {
        if !self.state.is_open() {
            return;
        }
        if let Protocol::Ata(codec) = &mut self.protocol {
            close_ata_link(codec.transport_mut());
        }
        self.state.mark_closed();
    }
}

impl<O: DeviceOpeners> Drop for Device<O> {
    fn drop(&mut self) {
        self.close();
    }
}

fn make_device<O: DeviceOpeners>(
    name: &str,
    requested_type: &str,
    effective_type: DeviceKind,
    protocol: Protocol<O>,
    config: Config,
) -> Device<O> {
    Device {
        state: DeviceState::new(name, requested_type, effective_type),
        protocol,
        config,
    }
}

fn flatten<E: PartialEq + Eq + fmt::Debug>(e: Error<E>) -> UniformError {
    match e {
        Error::Transport(u) => u,
        Error::ProtocolError => UniformError::new(Errno::Io, "protocol error: malformed response"),
        Error::Host(h) => UniformError::new(Errno::Io, format!("host error: {h:?}")),
    }
}

fn bad_arg(s: &str) -> UniformError {
    UniformError::new(Errno::Inval, format!("invalid adapter argument {s:?}"))
}

fn synthetic_requested_type(synth: &naming::SyntheticName) -> String {
    if synth.args.is_empty() {
        synth.adapter.clone()
    } else {
        format!("{}+{}", synth.adapter, synth.args.join(","))
    }
}

/// Opens a device by name, applying spec §4.1.2's auto-detection policy when
/// `type_hint` is empty or absent, and §6.3's synthetic-name parsing for
/// tunnelled devices regardless of `type_hint`.
pub fn open_device<O: DeviceOpeners>(
    opener: &mut O,
    name: &str,
    type_hint: Option<&str>,
    config: Config,
) -> Result<Device<O>, UniformError> {
    if let Some(synth) = naming::parse_synthetic(name) {
        return open_synthetic(opener, &synth, config);
    }
    match type_hint.filter(|h| !h.is_empty()) {
        Some(hint) => open_explicit(opener, name, hint, config),
        None => open_auto(opener, name, config),
    }
}

fn open_auto<O: DeviceOpeners>(
    opener: &mut O,
    name: &str,
    config: Config,
) -> Result<Device<O>, UniformError> {
    match naming::classify(name) {
        Some(naming::TransportHint::Ata) => {
            let transport = opener.open_ata(name)?;
            Ok(make_device(
                name,
                "",
                DeviceKind::Ata,
                Protocol::Ata(AtaCodec::new(AtaLink::Native(transport))),
                config,
            ))
        }
        Some(naming::TransportHint::Nvme) => {
            let transport = opener.open_nvme(name)?;
            Ok(make_device(
                name,
                "",
                DeviceKind::Nvme,
                Protocol::Nvme(NvmeCodec::new(transport)),
                config,
            ))
        }
        Some(naming::TransportHint::Scsi) => open_scsi_or_sat(opener, name, config),
        None => Err(UniformError::new(
            Errno::NoEnt,
            format!("unrecognised device name {name:?}"),
        )),
    }
}

/// Step 2 of spec §4.1.2: a SCSI-shaped name might be a native SCSI device
/// or an ATA disk tunnelled through a SAT-capable bridge. An INQUIRY that
/// reports vendor `"ATA"` is followed by a live IDENTIFY DEVICE round-trip
/// through a SAT adapter; only a device that actually answers it is treated
/// as SAT-tunnelled, everything else falls back to native SCSI.
fn open_scsi_or_sat<O: DeviceOpeners>(
    opener: &mut O,
    name: &str,
    config: Config,
) -> Result<Device<O>, UniformError> {
    let transport = opener.open_scsi(name)?;
    let mut codec = ScsiCodec::new(transport);
    let inquiry = codec.standard_inquiry(36).map_err(flatten)?;
    let transport = codec.into_inner();

    if inquiry.vendor != "ATA" {
        return Ok(make_device(
            name,
            "",
            DeviceKind::Scsi,
            Protocol::Scsi(ScsiCodec::new(transport)),
            config,
        ));
    }

    let mut sat = SatAdapter::new(transport);
    let mut buf = [0u8; 512];
    let tf = AtaTaskFileIn {
        command: 0xec,
        ..Default::default()
    };
    let probe = diskhealth_core::AtaTransport::ata_pass_through(
        &mut sat,
        AtaCommand {
            tf,
            direction: AtaDirection::In,
            phase: DataPhase::In(&mut buf),
        },
    );
    match probe {
        Ok(_) => Ok(make_device(
            name,
            "",
            DeviceKind::Ata,
            Protocol::Ata(AtaCodec::new(AtaLink::Sat(sat))),
            config,
        )),
        Err(_) => Ok(make_device(
            name,
            "",
            DeviceKind::Scsi,
            Protocol::Scsi(ScsiCodec::new(sat.into_inner())),
            config,
        )),
    }
}

fn open_explicit<O: DeviceOpeners>(
    opener: &mut O,
    name: &str,
    hint: &str,
    config: Config,
) -> Result<Device<O>, UniformError> {
    match hint {
        "ata" => {
            let transport = opener.open_ata(name)?;
            Ok(make_device(
                name,
                hint,
                DeviceKind::Ata,
                Protocol::Ata(AtaCodec::new(AtaLink::Native(transport))),
                config,
            ))
        }
        "scsi" => {
            let transport = opener.open_scsi(name)?;
            Ok(make_device(
                name,
                hint,
                DeviceKind::Scsi,
                Protocol::Scsi(ScsiCodec::new(transport)),
                config,
            ))
        }
        "nvme" => {
            let transport = opener.open_nvme(name)?;
            Ok(make_device(
                name,
                hint,
                DeviceKind::Nvme,
                Protocol::Nvme(NvmeCodec::new(transport)),
                config,
            ))
        }
        "sat" => {
            let transport = opener.open_scsi(name)?;
            Ok(make_device(
                name,
                hint,
                DeviceKind::Ata,
                Protocol::Ata(AtaCodec::new(AtaLink::Sat(SatAdapter::new(transport)))),
                config,
            ))
        }
        other => Err(UniformError::new(
            Errno::NoSys,
            format!("unknown requested device type {other:?}"),
        )),
    }
}

fn open_synthetic<O: DeviceOpeners>(
    opener: &mut O,
    synth: &naming::SyntheticName,
    config: Config,
) -> Result<Device<O>, UniformError> {
    let requested = synthetic_requested_type(synth);
    match synth.adapter.as_str() {
        "sat" => {
            let transport = opener.open_scsi(&synth.parent)?;
            Ok(make_device(
                &synth.parent,
                &requested,
                DeviceKind::Ata,
                Protocol::Ata(AtaCodec::new(AtaLink::Sat(SatAdapter::new(transport)))),
                config,
            ))
        }
        "jmb39x" | "jmb39x-q" | "jms56x" => open_jmb39x(opener, synth, &requested, config),
        "3ware" | "areca" => {
            open_vendor(opener, synth, &requested, config, ThreewareCodec, AtaLink::Threeware)
        }
        "highpoint" => {
            open_vendor(opener, synth, &requested, config, HighPointCodec, AtaLink::HighPoint)
        }
        "marvell" => open_vendor(opener, synth, &requested, config, MarvellCodec, AtaLink::Marvell),
        "cciss" => open_vendor(opener, synth, &requested, config, CcissCodec, AtaLink::Cciss),
        "ps3stor" => {
            open_vendor(opener, synth, &requested, config, Ps3storCodec, AtaLink::Ps3stor)
        }
        other => Err(UniformError::new(
            Errno::NoSys,
            format!("unknown tunnel adapter {other:?}"),
        )),
    }
}

fn open_vendor<O, C>(
    opener: &mut O,
    synth: &naming::SyntheticName,
    requested: &str,
    config: Config,
    codec: C,
    wrap: impl FnOnce(VendorAdapter<O::Scsi, C>) -> AtaLink<O>,
) -> Result<Device<O>, UniformError>
where
    O: DeviceOpeners,
    C: VendorCodec,
{
    let port = parse_vendor_port(&synth.args)?;
    let transport = opener.open_scsi(&synth.parent)?;
    let adapter = VendorAdapter::new(transport, codec, port);
    Ok(make_device(
        &synth.parent,
        requested,
        DeviceKind::Ata,
        Protocol::Ata(AtaCodec::new(wrap(adapter))),
        config,
    ))
}

/// Vendor controllers address a disk by a single port index (3ware,
/// HighPoint, Marvell) or a `(bus/enclosure, target/slot)` pair (CCISS,
/// ps3stor), folded here into one `u16` (spec §4.4.3, §6.3).
fn parse_vendor_port(args: &[String]) -> Result<u16, UniformError> {
    match args {
        [a] => a.parse::<u16>().map_err(|_| bad_arg(a)),
        [hi, lo] => {
            let hi: u8 = hi.parse().map_err(|_| bad_arg(hi))?;
            let lo: u8 = lo.parse().map_err(|_| bad_arg(lo))?;
            Ok((hi as u16) << 8 | lo as u16)
        }
        _ => Err(UniformError::new(
            Errno::Inval,
            "expected 1 or 2 port arguments",
        )),
    }
}

/// `jmb39x,<port>[,s<lba>][,force]` (spec §6.3): the port is the only
/// required argument; `s<lba>` overrides the default cover-sector LBA and
/// `force` allows wake-up to proceed over a non-zero cover sector.
fn open_jmb39x<O: DeviceOpeners>(
    opener: &mut O,
    synth: &naming::SyntheticName,
    requested: &str,
    config: Config,
) -> Result<Device<O>, UniformError> {
    let version = match synth.adapter.as_str() {
        "jmb39x" => 0,
        "jmb39x-q" => 1,
        "jms56x" => 2,
        _ => unreachable!("caller matched on a jmb39x-family adapter keyword"),
    };

    let mut port = None;
    let mut lba = None;
    let mut force = false;
    for arg in &synth.args {
        if arg == "force" {
            force = true;
        } else if let Some(rest) = arg.strip_prefix('s') {
            lba = Some(rest.parse::<u8>().map_err(|_| bad_arg(arg))?);
        } else if port.is_none() {
            port = Some(arg.parse::<u8>().map_err(|_| bad_arg(arg))?);
        }
    }
    let port = port.ok_or_else(|| {
        UniformError::new(Errno::Inval, "jmb39x adapter requires a port number")
    })?;

    let link = match naming::classify(&synth.parent) {
        Some(naming::TransportHint::Ata) => {
            let transport = opener.open_ata(&synth.parent)?;
            let io = AtaSectorIo { transport };
            let mut adapter = match lba {
                Some(l) => Jmb39xAdapter::new(io, version, port, l, force),
                None => Jmb39xAdapter::with_default_lba(io, version, port, force),
            };
            adapter.open().map_err(flatten)?;
            AtaLink::JmbOverAta(adapter)
        }
        _ => {
            let transport = opener.open_scsi(&synth.parent)?;
            let io = ScsiSectorIo { transport };
            let mut adapter = match lba {
                Some(l) => Jmb39xAdapter::new(io, version, port, l, force),
                None => Jmb39xAdapter::with_default_lba(io, version, port, force),
            };
            adapter.open().map_err(flatten)?;
            AtaLink::JmbOverScsi(adapter)
        }
    };
    Ok(make_device(
        &synth.parent,
        requested,
        DeviceKind::Ata,
        Protocol::Ata(AtaCodec::new(link)),
        config,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskhealth_core::{AtaTaskFileOut, NvmeCommand, NvmeCompletion, NvmeTransport, ScsiOutcome, ScsiTransport};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct HostErr;

    struct MockAta {
        identify: [u8; 512],
    }

    impl diskhealth_core::AtaTransport for MockAta {
        type Error = HostErr;

        fn ata_pass_through(
            &mut self,
            cmd: AtaCommand<'_>,
        ) -> Result<AtaTaskFileOut, Error<Self::Error>> {
            if let DataPhase::In(buf) = cmd.phase {
                let n = buf.len().min(self.identify.len());
                buf[..n].copy_from_slice(&self.identify[..n]);
            }
            Ok(AtaTaskFileOut::default())
        }
    }

    impl CapabilityProbe for MockAta {
        fn is_capability(&self, _cap: Capability) -> bool {
            false
        }
    }

    /// A SCSI transport whose vendor string is "ATA" and which answers any
    /// ATA PASS-THROUGH CDB (opcode 0xa1/0x85) with GOOD status, simulating
    /// a SAT-capable USB/SAS bridge.
    struct MockScsiSat {
        vendor_ata: bool,
        sat_responds: bool,
    }

    impl ScsiTransport for MockScsiSat {
        type Error = HostErr;

        fn command(
            &mut self,
            cdb: &[u8],
            phase: DataPhase<'_>,
            _timeout_secs: u32,
        ) -> Result<ScsiOutcome, Error<Self::Error>> {
            if cdb[0] == 0x12 {
                // INQUIRY
                if let DataPhase::In(buf) = phase {
                    if self.vendor_ata {
                        buf[8..11].copy_from_slice(b"ATA");
                    } else {
                        buf[8..14].copy_from_slice(b"SEAGAT");
                    }
                }
                return Ok(ScsiOutcome {
                    status: 0,
                    resid: 0,
                    sense: Vec::new(),
                });
            }
            // ATA PASS-THROUGH (12) or (16)
            if self.sat_responds {
                Ok(ScsiOutcome {
                    status: 0,
                    resid: 0,
                    sense: Vec::new(),
                })
            } else {
                Ok(ScsiOutcome {
                    status: 0x02,
                    resid: 0,
                    sense: vec![0u8; 8],
                })
            }
        }
    }

    impl CapabilityProbe for MockScsiSat {
        fn is_capability(&self, _cap: Capability) -> bool {
            false
        }
    }

    struct MockNvme;

    impl NvmeTransport for MockNvme {
        type Error = HostErr;

        fn admin_command(
            &mut self,
            _cmd: NvmeCommand,
            _phase: DataPhase<'_>,
        ) -> Result<NvmeCompletion, Error<Self::Error>> {
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
        scsi_vendor_ata: bool,
        scsi_sat_responds: bool,
    }

    impl DeviceOpeners for MockOpeners {
        type HostError = HostErr;
        type Ata = MockAta;
        type Scsi = MockScsiSat;
        type Nvme = MockNvme;

        fn open_ata(&mut self, _name: &str) -> Result<Self::Ata, UniformError> {
            Ok(MockAta {
                identify: [0u8; 512],
            })
        }

        fn open_scsi(&mut self, _name: &str) -> Result<Self::Scsi, UniformError> {
            Ok(MockScsiSat {
                vendor_ata: self.scsi_vendor_ata,
                sat_responds: self.scsi_sat_responds,
            })
        }

        fn open_nvme(&mut self, _name: &str) -> Result<Self::Nvme, UniformError> {
            Ok(MockNvme)
        }
    }

    #[test]
    fn ata_prefix_opens_native_ata() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: false,
        };
        let device = open_device(&mut opener, "/dev/hda", None, Config::default()).unwrap();
        assert_eq!(device.effective_type(), DeviceKind::Ata);
        assert!(matches!(device.protocol, Protocol::Ata(_)));
    }

    #[test]
    fn nvme_prefix_opens_native_nvme() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: false,
        };
        let device = open_device(&mut opener, "/dev/nvme0n1", None, Config::default()).unwrap();
        assert_eq!(device.effective_type(), DeviceKind::Nvme);
    }

    #[test]
    fn scsi_vendor_is_not_ata_stays_scsi() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: false,
        };
        let device = open_device(&mut opener, "/dev/sda", None, Config::default()).unwrap();
        assert_eq!(device.effective_type(), DeviceKind::Scsi);
    }

    #[test]
    fn scsi_vendor_ata_and_sat_probe_succeeds_detects_ata() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: true,
            scsi_sat_responds: true,
        };
        let device = open_device(&mut opener, "/dev/sda", None, Config::default()).unwrap();
        assert_eq!(device.effective_type(), DeviceKind::Ata);
    }

    #[test]
    fn scsi_vendor_ata_but_sat_probe_fails_falls_back_to_scsi() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: true,
            scsi_sat_responds: false,
        };
        let device = open_device(&mut opener, "/dev/sda", None, Config::default()).unwrap();
        assert_eq!(device.effective_type(), DeviceKind::Scsi);
    }

    #[test]
    fn unrecognised_prefix_fails_with_enoent() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: false,
        };
        let err = open_device(&mut opener, "/dev/fd0", None, Config::default()).unwrap_err();
        assert_eq!(err.code, Errno::NoEnt);
    }

    #[test]
    fn explicit_sat_hint_skips_auto_detection() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: true,
        };
        let device = open_device(&mut opener, "/dev/sda", Some("sat"), Config::default()).unwrap();
        assert_eq!(device.effective_type(), DeviceKind::Ata);
    }

    #[test]
    fn synthetic_jmb39x_name_opens_via_scsi_sector_io() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: false,
        };
        // MockScsiSat answers any non-INQUIRY CDB with GOOD status and an
        // all-zero buffer; the wake-up handshake treats a zeroed cover
        // sector as eligible and the all-zero JMB response as "no device"
        // only past the handshake reply check, so this exercises the parse
        // and open path up through the wake-up write sequence.
        let result = open_device(
            &mut opener,
            "/dev/sdb+jmb39x,0,s40",
            None,
            Config::default(),
        );
        // The mock doesn't speak the JMB39x wire protocol, so the
        // handshake's response validation rejects it; what matters here is
        // that parsing and dispatch reached the adapter instead of failing
        // earlier on argument parsing or adapter-name lookup.
        assert!(result.is_err());
    }

    #[test]
    fn unknown_adapter_keyword_is_rejected() {
        let mut opener = MockOpeners {
            scsi_vendor_ata: false,
            scsi_sat_responds: false,
        };
        let err = open_device(&mut opener, "/dev/sdb+bogus,0", None, Config::default()).unwrap_err();
        assert_eq!(err.code, Errno::NoSys);
    }

    #[test]
    fn vendor_adapter_port_parses_single_and_dual_arguments() {
        assert_eq!(parse_vendor_port(&["3".to_string()]).unwrap(), 3);
        assert_eq!(
            parse_vendor_port(&["2".to_string(), "5".to_string()]).unwrap(),
            0x0205
        );
        assert!(parse_vendor_port(&["x".to_string()]).is_err());
    }
}

//! The pass-through contract (spec §4.1) each protocol's codec is built on
//! top of.
//!
//! Grounded in `cotton-scsi`'s `ScsiTransport`/`DataPhase`/`Error<T>` shape
//! (`examples/tshakah-cotton/cotton-scsi/src/scsi_device.rs`), but the
//! methods here are blocking rather than `async fn`: spec §5 requires every
//! pass-through call to block the caller until the underlying ioctl returns,
//! with no internal queueing.

use crate::error::{SimpleError, UniformError};
use std::fmt;

/// Which way data moves across one pass-through call, and the buffer it
/// moves through. Mirrors `cotton_scsi::scsi_transport::DataPhase` but keeps
/// ownership of the buffer with the caller for the duration of the (now
/// synchronous) call.
pub enum DataPhase<'a> {
    None,
    In(&'a mut [u8]),
    Out(&'a [u8]),
}

impl<'a> DataPhase<'a> {
    pub fn len(&self) -> usize {
        match self {
            DataPhase::None => 0,
            DataPhase::In(b) => b.len(),
            DataPhase::Out(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A transport-level failure, parametrised over the host shim's own error
/// type `T` so each platform shim can carry its native error without this
/// crate needing to know about it. Mirrors `cotton_scsi::scsi_transport::Error<T>`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<T: PartialEq + Eq> {
    /// The underlying OS call failed outright (spec §3.6 errno pair).
    Transport(UniformError),
    /// The command completed but the response failed a basic sanity check
    /// (wrong length, malformed header) before protocol-specific decoding.
    ProtocolError,
    /// Opaque host-shim error, not otherwise classified.
    Host(T),
}

impl<T: PartialEq + Eq + fmt::Debug> fmt::Display for Error<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::ProtocolError => write!(f, "protocol error: malformed response"),
            Error::Host(e) => write!(f, "host error: {e:?}"),
        }
    }
}

impl<T: PartialEq + Eq + fmt::Debug> std::error::Error for Error<T> {}

/// ATA taskfile registers sent to the device (spec §3.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtaTaskFileIn {
    pub command: u8,
    pub features: u16,
    pub sector_count: u16,
    pub lba_low: u8,
    pub lba_mid: u8,
    pub lba_high: u8,
    pub device: u8,
    /// Set when the command needs the 48-bit ("LBA48") register set; the
    /// high bytes below are only meaningful in that case.
    pub is_48bit: bool,
    pub features_high: u8,
    pub sector_count_high: u8,
    pub lba_low_high: u8,
    pub lba_mid_high: u8,
    pub lba_high_high: u8,
}

/// ATA taskfile registers sampled after completion, plus the status byte
/// (spec §3.2: "output is the same register set sampled after completion
/// plus a status byte").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtaTaskFileOut {
    pub status: u8,
    pub error: u8,
    pub sector_count: u8,
    pub lba_low: u8,
    pub lba_mid: u8,
    pub lba_high: u8,
    pub device: u8,
}

/// Direction of a single ATA pass-through call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaDirection {
    NoData,
    In,
    Out,
}

/// One ATA pass-through invocation (spec §4.1: `ata_pass_through(in) -> out`).
pub struct AtaCommand<'a> {
    pub tf: AtaTaskFileIn,
    pub direction: AtaDirection,
    /// Transfer size in 512-byte sectors; must be 0 for [`AtaDirection::NoData`]
    /// and a non-zero multiple of one sector otherwise (spec §3.2 invariant).
    pub phase: DataPhase<'a>,
}

/// Blocking ATA pass-through contract implemented by an OS shim or a tunnel
/// adapter that terminates in one (spec §4.1, §4.4).
pub trait AtaTransport {
    type Error: PartialEq + Eq + fmt::Debug;

    fn ata_pass_through(
        &mut self,
        cmd: AtaCommand<'_>,
    ) -> Result<AtaTaskFileOut, Error<Self::Error>>;
}

/// Outcome of one SCSI command (spec §3.3): status byte, residual byte
/// count, and the raw sense buffer as returned by the transport, with its
/// used length.
#[derive(Debug, Clone)]
pub struct ScsiOutcome {
    pub status: u8,
    pub resid: usize,
    pub sense: Vec<u8>,
}

/// A decomposed CHECK CONDITION sense tuple (spec §3.3, §4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseTuple {
    pub response_code: u8,
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl ScsiOutcome {
    /// Decode the sense tuple if the sense buffer is long enough to carry
    /// one (spec §4.2.2 "Sense decoding"): `sense_key` needs ≥8 bytes,
    /// `asc`/`ascq` need ≥14.
    pub fn sense_tuple(&self) -> Option<SenseTuple> {
        if self.sense.len() < 8 {
            return None;
        }
        let response_code = self.sense[0];
        let sense_key = self.sense[2] & 0x0f;
        let (asc, ascq) = if self.sense.len() >= 14 {
            (self.sense[12], self.sense[13])
        } else {
            (0, 0)
        };
        Some(SenseTuple {
            response_code,
            sense_key,
            asc,
            ascq,
        })
    }
}

/// Blocking SCSI pass-through contract (spec §4.1:
/// `scsi_pass_through(cdb, buf, dir, timeout) -> status`).
///
/// A CHECK CONDITION is not itself an `Err` here (spec §4.1 "Failure
/// semantics"); the caller inspects [`ScsiOutcome::status`] and the decoded
/// sense. Only a transport-level failure (no device, timeout, permission) is
/// an `Err`.
pub trait ScsiTransport {
    type Error: PartialEq + Eq + fmt::Debug;

    fn command(
        &mut self,
        cdb: &[u8],
        phase: DataPhase<'_>,
        timeout_secs: u32,
    ) -> Result<ScsiOutcome, Error<Self::Error>>;
}

/// One NVMe admin Submission Queue Entry (spec §3.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NvmeCommand {
    pub opcode: u8,
    pub nsid: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
}

/// Direction of an NVMe admin command's data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvmeDirection {
    None,
    In,
    Out,
}

/// Outcome of one NVMe admin command (spec §3.4): the 16-bit status field
/// (SCT in bits 8:10, SC in bits 0:7 contingent on kernel convention — this
/// crate keeps them pre-split), the result dword (CDW0), and validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvmeCompletion {
    pub sct: u8,
    pub sc: u8,
    pub result: u32,
    pub valid: bool,
}

/// Blocking NVMe admin pass-through contract (spec §4.1:
/// `nvme_pass_through(cmd) -> result`).
///
/// A non-zero NVMe status is not an `Err` here either (spec §4.1 "A
/// completed NVMe command with non-zero status is reported as success at
/// the pass-through boundary"); only a transport failure is.
pub trait NvmeTransport {
    type Error: PartialEq + Eq + fmt::Debug;

    fn admin_command(
        &mut self,
        cmd: NvmeCommand,
        phase: DataPhase<'_>,
    ) -> Result<NvmeCompletion, Error<Self::Error>>;
}

/// Boolean capability probes (spec §4.1: `is_capability(cap)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Ata48Bit,
    NvmeLogPageOffset,
    ScsiVpd,
    SctCommandTransport,
    /// The host delivers SMART RETURN STATUS's `lba_mid`/`lba_high`
    /// verbatim (spec §9's Open Question: some kernels mask these
    /// registers). A transport that answers `false` here is telling the
    /// codec its magic-pair read can't be trusted, so health assessment
    /// should fall back to the pseudo-check instead (compare every
    /// attribute to its threshold).
    AtaSmartStatusVerbatim,
}

/// Implemented by anything that can answer capability queries without
/// issuing I/O (a cached property from `open`, not a fresh probe).
pub trait CapabilityProbe {
    fn is_capability(&self, cap: Capability) -> bool;
}

/// Fold a decoded SCSI sense tuple into the semantic taxonomy (spec §4.5).
/// Lives here, not in `diskhealth-scsi`, because `diskhealth-tunnel`'s SAT
/// adapter also needs to fold CK_COND-carried ATA status without pulling in
/// the whole SCSI codec crate.
pub fn scsi_sense_to_simple_error(t: SenseTuple) -> SimpleError {
    const NOT_READY: u8 = 0x02;
    const ILLEGAL_REQUEST: u8 = 0x05;
    const UNIT_ATTENTION: u8 = 0x06;
    const MEDIUM_ERROR: u8 = 0x03;
    const HARDWARE_ERROR: u8 = 0x04;
    const ABORTED_COMMAND: u8 = 0x0b;

    match t.sense_key {
        NOT_READY if t.asc == 0x3a => SimpleError::NoMedium,
        NOT_READY if t.asc == 0x04 && t.ascq == 0x01 => SimpleError::BecomingReady,
        NOT_READY => SimpleError::NotReady,
        ILLEGAL_REQUEST if t.asc == 0x20 => SimpleError::BadOpcode,
        ILLEGAL_REQUEST if t.asc == 0x24 => SimpleError::BadField,
        ILLEGAL_REQUEST if t.asc == 0x26 => SimpleError::BadParam,
        UNIT_ATTENTION => SimpleError::TryAgain,
        MEDIUM_ERROR | HARDWARE_ERROR => SimpleError::MediumHardware,
        ABORTED_COMMAND => SimpleError::AbortedCommand,
        _ => SimpleError::UnknownError,
    }
}

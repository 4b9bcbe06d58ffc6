//! The one seam between this workspace and a concrete host I/O shim (spec
//! §1 "Out of scope... the host operating system's raw I/O primitives: the
//! core consumes these through a single narrow interface and does not
//! itself call them").
//!
//! `open_device` needs *something* that can turn a bare name into a
//! transport before it can run the auto-detection round-trips of §4.1.2;
//! [`DeviceOpeners`] is that something, supplied by whatever embeds this
//! crate. Associated types (not `Box<dyn Trait>`) keep the resulting
//! [`crate::device::Device`] a concrete tagged sum rather than an erased
//! one, matching spec §9's "tagged sum, not an inheritance hierarchy".

use diskhealth_core::{AtaTransport, CapabilityProbe, NvmeTransport, ScsiTransport, UniformError};
use std::fmt;

/// Opens one concrete transport per protocol family for a given device
/// name. A test suite implements this over mock transports exactly as
/// each codec crate's own unit tests do; a real host binding implements it
/// over actual ioctl-backed transports.
///
/// All three transports share one `HostError` type: a real binding has
/// exactly one host I/O shim underneath every protocol (spec §1 "the core
/// consumes these through a single narrow interface"), so there is only
/// ever one kind of opaque host error to carry, and unifying it here is
/// what lets [`crate::device::Device`] compose tunnel adapters (which wrap
/// one transport family's error type in another) without boxing.
pub trait DeviceOpeners {
    type HostError: PartialEq + Eq + fmt::Debug;
    type Ata: AtaTransport<Error = Self::HostError> + CapabilityProbe;
    type Scsi: ScsiTransport<Error = Self::HostError> + CapabilityProbe;
    type Nvme: NvmeTransport<Error = Self::HostError> + CapabilityProbe;

    fn open_ata(&mut self, name: &str) -> Result<Self::Ata, UniformError>;
    fn open_scsi(&mut self, name: &str) -> Result<Self::Scsi, UniformError>;
    fn open_nvme(&mut self, name: &str) -> Result<Self::Nvme, UniformError>;
}

//! Shared device-abstraction traits, uniform error model, naming rules and
//! configuration knobs for the diskhealth workspace (spec §3, §4.1, §5,
//! §6.2, §6.3, §7.1).
//!
//! Protocol-specific codecs (`diskhealth-ata`, `diskhealth-scsi`,
//! `diskhealth-nvme`) and tunnel adapters (`diskhealth-tunnel`) depend on
//! this crate for the traits their transports implement and the error types
//! their operations return; none of them depend on each other.

pub mod config;
pub mod device;
pub mod error;
pub mod naming;
pub mod transport;

pub use config::{debug_level, set_debug_level, trace_command, Config, HexDump};
pub use device::{DeviceKind, DeviceState};
pub use error::{Errno, ExitStatus, SimpleError, UniformError};
pub use transport::{
    AtaCommand, AtaDirection, AtaTaskFileIn, AtaTaskFileOut, AtaTransport, Capability,
    CapabilityProbe, DataPhase, Error, NvmeCommand, NvmeCompletion, NvmeDirection, NvmeTransport,
    ScsiOutcome, ScsiTransport, SenseTuple,
};

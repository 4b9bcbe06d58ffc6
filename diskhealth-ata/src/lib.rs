//! ATA/SATA command codec (spec §3.2, §3.5 ATA rows, §4.2.1; layouts from
//! `include/smartmon/ata.h`).
//!
//! Composes [`diskhealth_core::AtaTransport`] pass-through calls into the
//! semantic operations of §4.2.1: IDENTIFY, the SMART sub-command family,
//! and the supplemental SCT / self-test / error-log readers of
//! `SPEC_FULL.md` §2. None of this crate performs I/O itself; everything
//! here is a pure translation to and from taskfile registers and 512-byte
//! sectors.

pub mod codec;
pub mod errorlog;
pub mod farm;
pub mod identify;
pub mod sct;
pub mod selftest;
pub mod smart;

pub use codec::{AtaCodec, SmartReturnStatus};
pub use identify::IdentifyDevice;
pub use smart::{SmartAttribute, SmartThresholds, SmartValues};

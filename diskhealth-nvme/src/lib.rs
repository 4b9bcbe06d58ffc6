//! NVMe admin-command codec (spec §3.4, §4.2.3; layouts from
//! `nvmecmds.h`/`nvmecmds.cpp`).
//!
//! Composes [`diskhealth_core::NvmeTransport`] pass-through calls into the
//! semantic operations of §4.2.3: Identify (Controller/Namespace), Get Log
//! Page (error/SMART/self-test), and Device Self-test. None of this crate
//! performs I/O itself.

pub mod codec;
pub mod identify;
pub mod log;
pub mod status;

pub use codec::{Cns, NvmeCodec, SelfTestAction};
pub use identify::{IdentifyController, IdentifyNamespace};
pub use log::{ErrorLogEntry, SelfTestLog, SmartLog};
pub use status::{status_to_errno, status_to_str, SimpleNvmeStatus};

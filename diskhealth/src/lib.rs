//! Facade crate (spec §6.2): the semantic health operations of
//! [`health`], the `open_device` factory and `Device`/`Protocol`/`AtaLink`
//! tagged sums of [`device`], the report tree of [`report`], and the
//! [`opener::DeviceOpeners`] seam a host binding implements.
//!
//! This is the one crate an embedder depends on directly; everything under
//! `diskhealth-*` is an implementation detail reached only through the
//! types re-exported here.

pub mod device;
pub mod health;
pub mod opener;
pub mod report;

pub use device::{open_device, AtaLink, Device, Protocol};
pub use health::{assess_health, read_attributes, read_self_test_log, start_self_test};
pub use health::{AttributeReport, HealthVerdict, SelfTestKind, SelfTestLogEntry};
pub use opener::DeviceOpeners;
pub use report::{build_report, Report};

pub use diskhealth_core::{set_debug_level, Config, DeviceKind, Errno, ExitStatus, UniformError};

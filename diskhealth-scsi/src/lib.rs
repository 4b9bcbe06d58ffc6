//! SCSI/SAS command codec (spec §3.3, §4.2.2; grounded directly on
//! `cotton-scsi/src/scsi_device.rs`'s `ScsiDevice<T: ScsiTransport>`
//! pattern, its packed-CDB structs, and its const error-lookup tables).

pub mod cdb;
pub mod device;
pub mod iec;

pub use cdb::PageControl;
pub use device::{classify, InquiryResult, ScsiCodec, TAPEALERT_LOG_PAGE};

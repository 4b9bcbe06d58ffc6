//! The common tunnel contract (spec §4.4.3, §9 "Polymorphism over
//! transports"): every adapter carries an ATA taskfile through some other
//! transport and hands back the same `AtaTaskFileOut` an OS ATA shim would.
//!
//! Adapters own their wrapped device by value, forming a composition chain
//! terminated by a concrete OS device; each layer only needs to know the
//! layer directly beneath it.

use diskhealth_core::{AtaCommand, AtaTaskFileOut, Error};
use std::fmt;

/// Implemented by SAT, the JMB39x/JMS56x bridge, and the thin vendor
/// adapters (3ware, HighPoint, Marvell, CCISS, ps3stor): each exposes only
/// `pass_through`, delegating open/close lifecycle to the device it wraps.
pub trait TunnelAdapter {
    type Error: PartialEq + Eq + fmt::Debug;

    fn pass_through(&mut self, cmd: AtaCommand<'_>) -> Result<AtaTaskFileOut, Error<Self::Error>>;
}

//! Tunnelled-transport adapters (spec §4.4): ATA commands carried over a
//! transport that isn't itself an ATA pass-through ioctl. Each adapter
//! wraps one underlying device and exposes [`adapter::TunnelAdapter`], the
//! shared contract every one of them implements alongside
//! `diskhealth_core::AtaTransport` so they compose transparently with the
//! rest of the workspace.

pub mod adapter;
pub mod jmb;
pub mod other;
pub mod sat;

pub use adapter::TunnelAdapter;
pub use jmb::{AtaSectorIo, Jmb39xAdapter, ScsiSectorIo, SectorIo};
pub use other::{
    CcissCodec, HighPointCodec, MarvellCodec, Ps3storCodec, ThreewareCodec, VendorAdapter,
    VendorCodec,
};
pub use sat::SatAdapter;

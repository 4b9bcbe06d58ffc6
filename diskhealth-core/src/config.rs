//! Process-wide configuration knobs (spec §5 "Shared resource policy",
//! §6.2 "Caller interface").
//!
//! The debug-verbosity level is the one piece of state the whole workspace
//! shares; spec §9 considers a structured event sink the cleaner design but
//! accepts a process-wide atomic integer because "setting verbosity before
//! `open` suffices". It is set once, before any device is opened, and never
//! mutated afterward by this crate itself.

use std::sync::atomic::{AtomicU8, Ordering};

static DEBUG_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Set the process-wide debug level. `0` = silent, `1` = command trace,
/// `2` = command trace plus hex dumps of raw buffers.
pub fn set_debug_level(level: u8) {
    DEBUG_LEVEL.store(level, Ordering::Relaxed);
}

/// Read the current debug level; codec crates call this at each trace site
/// rather than caching it, since it is cheap and may legitimately differ
/// between test runs in the same process.
pub fn debug_level() -> u8 {
    DEBUG_LEVEL.load(Ordering::Relaxed)
}

/// Per-`open_device` configuration (spec §6.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// When set, serial numbers in parsed IDENTIFY / Identify-Controller /
    /// Identify-Namespace structures are overwritten with `X`s, and IEEE
    /// EUIs with zeros, before the codec hands the structure to a caller.
    pub sanitize_identifiers: bool,
    /// Assume the controller supports the Log Page Offset field even if
    /// Identify Controller's `lpa` byte does not advertise it (spec §4.2.3).
    pub nvme_force_lpo: bool,
}

/// A `[u8; N]` buffer wrapper whose `Display` prints a hex dump, used at
/// `debug_level() >= 2` trace sites instead of a bespoke formatting helper.
pub struct HexDump<'a>(pub &'a [u8]);

impl std::fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, chunk) in self.0.chunks(16).enumerate() {
            write!(f, "{:04x}: ", i * 16)?;
            for b in chunk {
                write!(f, "{b:02x} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Emit a command trace line if `debug_level() >= 1`, and a hex dump of
/// `data` if `debug_level() >= 2`. Codec crates call this around every
/// pass-through invocation.
pub fn trace_command(label: &str, data: &[u8]) {
    if debug_level() >= 1 {
        log::trace!("{label}: {} bytes", data.len());
    }
    if debug_level() >= 2 {
        log::trace!("{label} data:\n{}", HexDump(data));
    }
}

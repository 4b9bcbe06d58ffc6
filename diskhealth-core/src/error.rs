//! Uniform error model (spec §3.6, §7.1).
//!
//! Three orthogonal dimensions are kept distinct rather than collapsed into
//! one enum: a transport-level errno, a protocol-level detail carried by each
//! codec crate, and the semantic [`SimpleError`] every protocol folds into.

use std::fmt;

/// Errno-style transport failure, surfaced by the host I/O shim external to
/// this workspace and reported verbatim by `open`/pass-through calls.
///
/// Negative values are reserved for transports that hand back a negated
/// `errno` directly (spec §3.6); [`Errno::Other`] carries those unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, serde::Serialize)]
pub enum Errno {
    #[error("no such device or address")]
    NoEnt,
    #[error("I/O error")]
    Io,
    #[error("invalid argument")]
    Inval,
    #[error("function not implemented")]
    NoSys,
    #[error("device or resource busy")]
    Busy,
    #[error("operation timed out")]
    TimedOut,
    #[error("permission denied")]
    Access,
    #[error("errno {0}")]
    Other(i32),
}

impl Errno {
    /// The positive (or negative, for [`Errno::Other`]) numeric code this
    /// variant corresponds to, matching the platform's `errno.h` values
    /// where one exists.
    pub fn code(self) -> i32 {
        match self {
            Errno::NoEnt => 2,
            Errno::Io => 5,
            Errno::Inval => 22,
            Errno::NoSys => 38,
            Errno::Busy => 16,
            Errno::TimedOut => 110,
            Errno::Access => 13,
            Errno::Other(n) => n,
        }
    }
}

/// A transport error paired with a human-readable message, as returned from
/// `open` or from any pass-through call (spec §3.6: "every operation that
/// can fail yields a pair `(code, message)`").
#[derive(Debug, Clone, thiserror::Error, serde::Serialize)]
#[error("{code}: {message}")]
pub struct UniformError {
    pub code: Errno,
    pub message: String,
}

impl UniformError {
    pub fn new(code: Errno, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The semantic error taxonomy of spec §4.5, the single enum every protocol
/// folds its status into for cross-protocol health logic (§4.3 IE check,
/// §7.2 propagation policy).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SimpleError {
    #[default]
    NoError,
    NotReady,
    BadOpcode,
    BadField,
    BadParam,
    BadResp,
    NoMedium,
    BecomingReady,
    TryAgain,
    MediumHardware,
    AbortedCommand,
    UnknownError,
}

impl SimpleError {
    /// True for variants that represent success (spec §3.6: `code == 0`).
    pub fn is_ok(self) -> bool {
        matches!(self, SimpleError::NoError)
    }
}

/// The exit-intent bits accumulated across a monitoring session (spec §7.3).
/// OR-accumulated; external callers read this after one or more operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus(u8);

impl ExitStatus {
    pub const FAILID: u8 = 1 << 0;
    pub const FAILSMART: u8 = 1 << 1;
    pub const FAILSTATUS: u8 = 1 << 2;
    pub const FAILATTR: u8 = 1 << 3;
    pub const FAILAGE: u8 = 1 << 4;
    pub const FAILERR: u8 = 1 << 5;
    pub const FAILLOG: u8 = 1 << 6;
    pub const FAILCMD: u8 = 1 << 7;

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_set(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

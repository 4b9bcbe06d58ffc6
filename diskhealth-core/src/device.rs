//! Shared device bookkeeping (spec §3.1).
//!
//! `DeviceState` is the common state every concrete device (ATA, SCSI, NVMe,
//! or one behind a tunnel adapter) embeds: name, requested and effective
//! transport type, open/closed state, and the last-error slot. The
//! pass-through methods themselves live one level up, on the codec-specific
//! device wrapper in each protocol crate, mirroring how `cotton-scsi`'s
//! `ScsiDevice<T: ScsiTransport>` wraps a bare transport with semantic
//! methods rather than putting them on the transport trait itself.

use crate::error::UniformError;

/// Which of the three pass-through primitives a device exposes (spec §3.1:
/// "a sum of three variants — ATA, SCSI, NVMe").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Ata,
    Scsi,
    Nvme,
}

/// Bookkeeping common to every device, independent of which transport it
/// wraps. Embedded by value in each protocol crate's concrete device type.
#[derive(Debug, Clone)]
pub struct DeviceState {
    name: String,
    requested_type: String,
    effective_type: DeviceKind,
    open: bool,
    last_error: Option<UniformError>,
}

impl DeviceState {
    pub fn new(name: impl Into<String>, requested_type: impl Into<String>, effective_type: DeviceKind) -> Self {
        Self {
            name: name.into(),
            requested_type: requested_type.into(),
            effective_type,
            open: true,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requested_type(&self) -> &str {
        &self.requested_type
    }

    pub fn effective_type(&self) -> DeviceKind {
        self.effective_type
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Idempotent: a second call is a no-op (spec §3.1 "closing is
    /// idempotent and guaranteed on all exit paths").
    pub fn mark_closed(&mut self) {
        self.open = false;
    }

    pub fn record_error(&mut self, err: UniformError) {
        self.last_error = Some(err);
    }

    pub fn last_error(&self) -> Option<&UniformError> {
        self.last_error.as_ref()
    }
}

impl Drop for DeviceState {
    fn drop(&mut self) {
        // Closing is guaranteed on all exit paths (spec §3.1); a concrete
        // device's own Drop impl performs the actual OS-handle release and
        // tunnel restoration, this only asserts the bookkeeping agrees.
        self.open = false;
    }
}

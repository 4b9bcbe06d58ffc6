//! Report tree builder (spec §3, §6.2, §6.2 "a `report()` method returning
//! a typed tree ready for an external JSON serialiser"): folds the semantic
//! health operations of [`crate::health`] into one serialisable snapshot of
//! a device, plus the exit-intent word of spec §7.3.

use crate::device::{Device, Protocol};
use crate::health::{
    assess_health, read_attributes, read_self_test_log, AttributeReport, HealthVerdict,
    SelfTestLogEntry,
};
use crate::opener::DeviceOpeners;
use diskhealth_core::{DeviceKind, ExitStatus};

/// A reason string attached to `health_reason` when the NVMe Critical
/// Warning byte's temperature bit is set (spec §8.4 scenario 3).
const TEMPERATURE_REASON: &str = "temperature_above_or_below_threshold";

/// One device's full diagnostic snapshot, ready for `serde_json` (spec
/// §6.2). Every field beyond `name`/`requested_type`/`effective_type` is
/// best-effort: a command the device doesn't support or that fails leaves
/// the field `None`/empty and appends to `warnings` rather than failing the
/// whole report, mirroring §7.2's "protocol error... the device remains
/// usable" policy.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Report {
    pub name: String,
    pub requested_type: String,
    pub effective_type: DeviceKind,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_revision: Option<String>,
    pub health: HealthVerdict,
    pub health_reason: Option<String>,
    pub temperature_celsius: Option<i32>,
    pub attributes: Vec<AttributeReport>,
    pub self_test_log: Vec<SelfTestLogEntry>,
    pub warnings: Vec<String>,
}

/// Identity fields (model/serial/firmware), protocol-specific since each
/// wire format names and sanitises them differently.
fn ata_identity<O: DeviceOpeners>(
    device: &mut Device<O>,
) -> Result<(String, String, String), String> {
    let sanitize = device.config().sanitize_identifiers;
    let codec = match &mut device.protocol {
        Protocol::Ata(codec) => codec,
        _ => unreachable!("caller matched on Protocol::Ata"),
    };
    let buf = codec
        .identify_device()
        .map_err(|e| format!("IDENTIFY DEVICE failed: {e:?}"))?;
    let mut id = diskhealth_ata::identify::IdentifyDevice::from_bytes(&buf);
    if sanitize {
        id.sanitize();
    }
    Ok((id.model_number(), id.serial_number(), id.firmware_revision()))
}

fn scsi_identity<O: DeviceOpeners>(
    device: &mut Device<O>,
) -> Result<(String, String, String), String> {
    let codec = match &mut device.protocol {
        Protocol::Scsi(codec) => codec,
        _ => unreachable!("caller matched on Protocol::Scsi"),
    };
    let inquiry = codec
        .standard_inquiry(36)
        .map_err(|e| format!("INQUIRY failed: {e:?}"))?;
    Ok((inquiry.product, String::new(), inquiry.revision))
}

fn nvme_identity<O: DeviceOpeners>(
    device: &mut Device<O>,
) -> Result<(String, String, String), String> {
    let sanitize = device.config().sanitize_identifiers;
    let codec = match &mut device.protocol {
        Protocol::Nvme(codec) => codec,
        _ => unreachable!("caller matched on Protocol::Nvme"),
    };
    let mut ctrl = codec
        .identify_controller()
        .map_err(|e| format!("Identify Controller failed: {e:?}"))?;
    if sanitize {
        ctrl.sanitize_serial();
    }
    Ok((ctrl.model_number(), ctrl.serial_number(), ctrl.firmware_revision()))
}

/// NVMe temperature and Critical Warning reason, read once here rather than
/// threaded out of [`assess_health`] since only NVMe attaches a reason
/// string (spec §8.4 scenario 3).
fn nvme_temperature<O: DeviceOpeners>(
    device: &mut Device<O>,
    force_lpo: bool,
) -> Option<(i32, bool)> {
    let codec = match &mut device.protocol {
        Protocol::Nvme(codec) => codec,
        _ => return None,
    };
    let log = codec.read_smart_log(force_lpo).ok()?;
    Some((log.temperature_celsius(), log.temperature_warning()))
}

/// ATA SCT current temperature, best-effort: many ATA disks lack SCT
/// Command Transport support, so a failure here is silent rather than a
/// warning (spec §4.2.1's SCT status response is itself already
/// best-effort at the codec layer).
fn ata_temperature<O: DeviceOpeners>(device: &mut Device<O>) -> Option<i32> {
    let codec = match &mut device.protocol {
        Protocol::Ata(codec) => codec,
        _ => return None,
    };
    let status = codec.read_sct_status().ok()?;
    status.current_temperature.map(|t| t as i32)
}

/// Builds the report tree for one device, accumulating exit-intent bits as
/// it goes (spec §7.3). Returns the report together with the bits this one
/// call contributed; callers that track a whole session OR the returned
/// [`ExitStatus`] into their own running total.
pub fn build_report<O: DeviceOpeners>(device: &mut Device<O>) -> (Report, ExitStatus) {
    let mut exit = ExitStatus::default();
    let mut warnings = Vec::new();

    let identity = match &device.protocol {
        Protocol::Ata(_) => ata_identity(device),
        Protocol::Scsi(_) => scsi_identity(device),
        Protocol::Nvme(_) => nvme_identity(device),
    };
    let (model, serial_number, firmware_revision) = match identity {
        Ok((m, s, f)) => (Some(m), Some(s), Some(f)),
        Err(msg) => {
            exit.set(ExitStatus::FAILID);
            warnings.push(msg);
            (None, None, None)
        }
    };

    let health = match assess_health(device) {
        Ok(h) => h,
        Err(e) => {
            exit.set(ExitStatus::FAILSMART);
            warnings.push(format!("health assessment failed: {}", e.message));
            HealthVerdict::Unknown
        }
    };
    if health == HealthVerdict::Failing {
        exit.set(ExitStatus::FAILSTATUS);
    }

    let force_lpo = device.config().nvme_force_lpo;
    let (temperature_celsius, health_reason) = match &device.protocol {
        Protocol::Nvme(_) => match nvme_temperature(device, force_lpo) {
            Some((celsius, warn)) => (
                Some(celsius),
                warn.then(|| TEMPERATURE_REASON.to_string()),
            ),
            None => (None, None),
        },
        Protocol::Ata(_) => (ata_temperature(device), None),
        Protocol::Scsi(_) => (None, None),
    };

    let attributes = match &device.protocol {
        Protocol::Ata(_) => match read_attributes(device) {
            Ok(attrs) => {
                if attrs.iter().any(|a| a.failing_now) {
                    exit.set(ExitStatus::FAILATTR);
                }
                attrs
            }
            Err(e) => {
                warnings.push(format!("attribute dump failed: {}", e.message));
                Vec::new()
            }
        },
        _ => Vec::new(),
    };

    let self_test_log = match read_self_test_log(device) {
        Ok(entries) => {
            // status_code high nibble 0 means "completed without error"
            // (spec §4.2.1 self-test log layout); anything else is a
            // recorded failure.
            if entries.iter().any(|e| e.status_code != 0) {
                exit.set(ExitStatus::FAILLOG);
            }
            entries
        }
        Err(_) => Vec::new(),
    };

    let report = Report {
        name: device.name().to_string(),
        requested_type: device.requested_type().to_string(),
        effective_type: device.effective_type(),
        model,
        serial_number,
        firmware_revision,
        health,
        health_reason,
        temperature_celsius,
        attributes,
        self_test_log,
        warnings,
    };
    (report, exit)
}

//! Device naming and auto-detection (spec §4.1.2, §6.3).
//!
//! Device names are free-form, OS-specific strings; this module only
//! recognises the *shape* of a name well enough to pick a transport family
//! before the first pass-through call. It performs no I/O — the SAT-vs-native
//! distinction in step 2 of §4.1.2 needs an INQUIRY round-trip, which is the
//! caller's job (`diskhealth::open_device`), not this module's.

/// The transport family a device name suggests, before any I/O has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHint {
    Ata,
    /// SCSI/SAS-shaped name; native vs. SAT-tunnelled ATA is only knowable
    /// after an INQUIRY (spec §4.1.2 step 2).
    Scsi,
    Nvme,
}

/// A parsed synthetic name of the form `parent+adapter,args`, e.g.
/// `/dev/sdb+jmb39x,0,s40,force` (spec §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticName {
    pub parent: String,
    pub adapter: String,
    pub args: Vec<String>,
}

/// Apply spec §4.1.2's auto-detection policy to a bare device name (no
/// `+adapter` suffix). Returns `None` for unrecognised prefixes (policy step
/// 4: "fail with `ENOENT`" is the caller's responsibility once this returns
/// `None`).
pub fn classify(name: &str) -> Option<TransportHint> {
    const ATA_PREFIXES: &[&str] = &["/dev/hd", "/dev/wd"];
    const SCSI_PREFIXES: &[&str] = &["/dev/sd"];
    const NVME_PREFIX: &str = "/dev/nvme";

    if ATA_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Some(TransportHint::Ata);
    }
    if name.starts_with(NVME_PREFIX) {
        return Some(TransportHint::Nvme);
    }
    if SCSI_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Some(TransportHint::Scsi);
    }
    None
}

/// Split a name of the form `parent+adapter,arg1,arg2` into its parent
/// device name and the synthetic tunnel/adapter spec, if one is present.
///
/// Recognised adapter keywords (spec §6.3): `sat`, `jmb39x`, `jmb39x-q`,
/// `jms56x`, `3ware`, `areca`, and similar vendor-RAID bridges; this parser
/// does not validate the keyword itself, leaving that to
/// `diskhealth-tunnel`'s adapter registry.
pub fn parse_synthetic(name: &str) -> Option<SyntheticName> {
    let (parent, rest) = name.split_once('+')?;
    let mut parts = rest.split(',');
    let adapter = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();
    Some(SyntheticName {
        parent: parent.to_string(),
        adapter,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_prefixes() {
        assert_eq!(classify("/dev/sda"), Some(TransportHint::Scsi));
        assert_eq!(classify("/dev/hda"), Some(TransportHint::Ata));
        assert_eq!(classify("/dev/wdc"), Some(TransportHint::Ata));
        assert_eq!(classify("/dev/nvme0n1"), Some(TransportHint::Nvme));
    }

    #[test]
    fn unknown_prefix_yields_none() {
        assert_eq!(classify("/dev/fd0"), None);
    }

    #[test]
    fn parses_synthetic_jmb39x_name() {
        let parsed = parse_synthetic("/dev/sdb+jmb39x,0,s40,force").unwrap();
        assert_eq!(parsed.parent, "/dev/sdb");
        assert_eq!(parsed.adapter, "jmb39x");
        assert_eq!(parsed.args, vec!["0", "s40", "force"]);
    }

    #[test]
    fn plain_name_has_no_synthetic_part() {
        assert_eq!(parse_synthetic("/dev/sda"), None);
    }
}

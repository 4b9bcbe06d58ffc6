//! NVMe Identify Controller and Identify Namespace structures (spec §3.5,
//! §6.1; layout from `nvme_id_ctrl`/`nvme_id_ns`/`nvme_id_power_state`/
//! `nvme_lbaf` in `nvmecmds.h`, itself imported from `<linux/nvme.h>`).
//!
//! Every field here sits at its natural C alignment, so the 4096-byte size
//! the original's `STATIC_ASSERT` checks falls out without any
//! compiler-specific packing pragma — exactly the approach spec §9 calls for.

use bytemuck::{Pod, Zeroable};

/// One of the 32 power-state descriptors embedded in Identify Controller.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PowerStateDescriptor {
    pub max_power: u16,
    pub rsvd2: u8,
    pub flags: u8,
    pub entry_lat: u32,
    pub exit_lat: u32,
    pub read_tput: u8,
    pub read_lat: u8,
    pub write_tput: u8,
    pub write_lat: u8,
    pub idle_power: u16,
    pub idle_scale: u8,
    pub rsvd19: u8,
    pub active_power: u16,
    pub active_work_scale: u8,
    pub rsvd23: [u8; 9],
}

const _: () = assert!(std::mem::size_of::<PowerStateDescriptor>() == 32);

/// The 4096-byte response to Identify (CNS=0x01): the controller's static
/// attributes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct IdentifyController {
    pub vid: u16,
    pub ssvid: u16,
    pub sn: [u8; 20],
    pub mn: [u8; 40],
    pub fr: [u8; 8],
    pub rab: u8,
    pub ieee: [u8; 3],
    pub cmic: u8,
    pub mdts: u8,
    pub cntlid: u16,
    pub ver: u32,
    pub rtd3r: u32,
    pub rtd3e: u32,
    pub oaes: u32,
    pub ctratt: u32,
    pub rsvd100: [u8; 156],
    pub oacs: u16,
    pub acl: u8,
    pub aerl: u8,
    pub frmw: u8,
    pub lpa: u8,
    pub elpe: u8,
    pub npss: u8,
    pub avscc: u8,
    pub apsta: u8,
    pub wctemp: u16,
    pub cctemp: u16,
    pub mtfa: u16,
    pub hmpre: u32,
    pub hmmin: u32,
    pub tnvmcap: [u8; 16],
    pub unvmcap: [u8; 16],
    pub rpmbs: u32,
    pub edstt: u16,
    pub dsto: u8,
    pub fwug: u8,
    pub kas: u16,
    pub hctma: u16,
    pub mntmt: u16,
    pub mxtmt: u16,
    pub sanicap: u32,
    pub rsvd332: [u8; 180],
    pub sqes: u8,
    pub cqes: u8,
    pub maxcmd: u16,
    pub nn: u32,
    pub oncs: u16,
    pub fuses: u16,
    pub fna: u8,
    pub vwc: u8,
    pub awun: u16,
    pub awupf: u16,
    pub nvscc: u8,
    pub rsvd531: u8,
    pub acwu: u16,
    pub rsvd534: [u8; 2],
    pub sgls: u32,
    pub rsvd540: [u8; 228],
    pub subnqn: [u8; 256],
    pub rsvd1024: [u8; 768],
    pub ioccsz: u32,
    pub iorcsz: u32,
    pub icdoff: u16,
    pub ctrattr: u8,
    pub msdbd: u8,
    pub rsvd1804: [u8; 244],
    pub psd: [PowerStateDescriptor; 32],
    pub vs: [u8; 1024],
}

const _: () = assert!(std::mem::size_of::<IdentifyController>() == 4096);

impl IdentifyController {
    pub fn from_bytes(buf: &[u8; 4096]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    pub fn serial_number(&self) -> String {
        ascii_trim(&self.sn)
    }

    pub fn model_number(&self) -> String {
        ascii_trim(&self.mn)
    }

    pub fn firmware_revision(&self) -> String {
        ascii_trim(&self.fr)
    }

    /// `lpa` bit 2 (`0x04`): Log Page Offset support (spec §4.2.3 "Large log
    /// page chunking").
    pub fn supports_log_page_offset(&self) -> bool {
        self.lpa & 0x04 != 0
    }

    /// `oacs` bit 4 (`0x10`): Device Self-test command support.
    pub fn supports_self_test(&self) -> bool {
        self.oacs & 0x0010 != 0
    }

    /// Overwrite the serial number with `X`s in place (spec §6.2
    /// `sanitize_identifiers`).
    pub fn sanitize_serial(&mut self) {
        self.sn = [b'X'; 20];
    }

    /// Byte-swap the scalar fields a big-endian host must correct (spec
    /// §4.2.3 "Endianness"; field list from `nvme_read_id_ctrl`).
    pub fn byteswap_for_host(&mut self) {
        self.vid = self.vid.swap_bytes();
        self.ssvid = self.ssvid.swap_bytes();
        self.cntlid = self.cntlid.swap_bytes();
        self.ver = self.ver.swap_bytes();
        self.oacs = self.oacs.swap_bytes();
        self.wctemp = self.wctemp.swap_bytes();
        self.cctemp = self.cctemp.swap_bytes();
        self.mtfa = self.mtfa.swap_bytes();
        self.hmpre = self.hmpre.swap_bytes();
        self.hmmin = self.hmmin.swap_bytes();
        self.rpmbs = self.rpmbs.swap_bytes();
        self.nn = self.nn.swap_bytes();
        self.oncs = self.oncs.swap_bytes();
        self.fuses = self.fuses.swap_bytes();
        self.awun = self.awun.swap_bytes();
        self.awupf = self.awupf.swap_bytes();
        self.acwu = self.acwu.swap_bytes();
        self.sgls = self.sgls.swap_bytes();
        for psd in &mut self.psd {
            psd.max_power = psd.max_power.swap_bytes();
            psd.entry_lat = psd.entry_lat.swap_bytes();
            psd.exit_lat = psd.exit_lat.swap_bytes();
            psd.idle_power = psd.idle_power.swap_bytes();
            psd.active_power = psd.active_power.swap_bytes();
        }
    }
}

/// One 4-byte LBA format descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LbaFormat {
    pub ms: u16,
    pub ds: u8,
    pub rp: u8,
}

const _: () = assert!(std::mem::size_of::<LbaFormat>() == 4);

/// The 4096-byte response to Identify (CNS=0x00, NSID=n): the namespace's
/// static attributes and its array of supported LBA formats.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct IdentifyNamespace {
    pub nsze: u64,
    pub ncap: u64,
    pub nuse: u64,
    pub nsfeat: u8,
    pub nlbaf: u8,
    pub flbas: u8,
    pub mc: u8,
    pub dpc: u8,
    pub dps: u8,
    pub nmic: u8,
    pub rescap: u8,
    pub fpi: u8,
    pub rsvd33: u8,
    pub nawun: u16,
    pub nawupf: u16,
    pub nacwu: u16,
    pub nabsn: u16,
    pub nabo: u16,
    pub nabspf: u16,
    pub rsvd46: [u8; 2],
    pub nvmcap: [u8; 16],
    pub rsvd64: [u8; 40],
    pub nguid: [u8; 16],
    pub eui64: [u8; 8],
    pub lbaf: [LbaFormat; 16],
    pub rsvd192: [u8; 192],
    pub vs: [u8; 3712],
}

const _: () = assert!(std::mem::size_of::<IdentifyNamespace>() == 4096);

impl IdentifyNamespace {
    pub fn from_bytes(buf: &[u8; 4096]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    /// The LBA format currently in use, selected by `flbas` bits 3:0.
    pub fn current_lba_format(&self) -> LbaFormat {
        self.lbaf[(self.flbas & 0x0f) as usize]
    }

    /// Overwrite the IEEE EUI-64 with zeros (spec §6.2
    /// `sanitize_identifiers`).
    pub fn sanitize_eui64(&mut self) {
        self.eui64 = [0u8; 8];
    }

    pub fn byteswap_for_host(&mut self) {
        self.nsze = self.nsze.swap_bytes();
        self.ncap = self.ncap.swap_bytes();
        self.nuse = self.nuse.swap_bytes();
        self.nawun = self.nawun.swap_bytes();
        self.nawupf = self.nawupf.swap_bytes();
        self.nacwu = self.nacwu.swap_bytes();
        self.nabsn = self.nabsn.swap_bytes();
        self.nabo = self.nabo.swap_bytes();
        self.nabspf = self.nabspf.swap_bytes();
        for fmt in &mut self.lbaf {
            fmt.ms = fmt.ms.swap_bytes();
        }
    }
}

fn ascii_trim(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_controller_is_4096_bytes() {
        assert_eq!(std::mem::size_of::<IdentifyController>(), 4096);
    }

    #[test]
    fn identify_namespace_is_4096_bytes() {
        assert_eq!(std::mem::size_of::<IdentifyNamespace>(), 4096);
    }

    #[test]
    fn sanitize_serial_overwrites_with_x() {
        let mut raw = [0u8; 4096];
        raw[4..8].copy_from_slice(b"abcd");
        let mut ctrl = IdentifyController::from_bytes(&raw);
        ctrl.sanitize_serial();
        assert_eq!(ctrl.serial_number(), "XXXXXXXXXXXXXXXXXXXX");
    }

    #[test]
    fn current_lba_format_selects_by_flbas_low_nibble() {
        let mut raw = [0u8; 4096];
        raw[26] = 2; // flbas = 2
        let lbaf_off = 128 + 2 * 4;
        raw[lbaf_off..lbaf_off + 2].copy_from_slice(&512u16.to_le_bytes());
        let ns = IdentifyNamespace::from_bytes(&raw);
        assert_eq!(ns.current_lba_format().ms, 512);
    }
}

//! Packed SCSI CDBs and their reply structures (spec §3.3, §4.2.2), in the
//! style of `cotton-scsi/src/scsi_device.rs`: each CDB is a `#[repr(C)]`,
//! `bytemuck::Pod` struct built by a `new()` constructor, with a
//! similarly packed reply type where the command returns fixed-format
//! data.

use bytemuck::{Pod, Zeroable};

#[derive(Copy, Clone)]
#[repr(C)]
pub struct TestUnitReady {
    operation_code: u8,
    reserved: [u8; 4],
    control: u8,
}

unsafe impl Zeroable for TestUnitReady {}
unsafe impl Pod for TestUnitReady {}

impl TestUnitReady {
    pub fn new() -> Self {
        assert!(std::mem::size_of::<Self>() == 6);
        Self {
            operation_code: 0x00,
            reserved: [0; 4],
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct RequestSense {
    operation_code: u8,
    desc: u8,
    reserved: [u8; 2],
    allocation_length: u8,
    control: u8,
}

unsafe impl Zeroable for RequestSense {}
unsafe impl Pod for RequestSense {}

impl RequestSense {
    pub fn new(allocation_length: u8) -> Self {
        assert!(std::mem::size_of::<Self>() == 6);
        Self {
            operation_code: 0x03,
            desc: 0,
            reserved: [0; 2],
            allocation_length,
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct Inquiry {
    operation_code: u8,
    evpd: u8,
    page_code: u8,
    allocation_length_be: [u8; 2],
    control: u8,
}

unsafe impl Zeroable for Inquiry {}
unsafe impl Pod for Inquiry {}

impl Inquiry {
    /// Standard INQUIRY (spec §4.2.2: `len` ∈ {36, 64}).
    pub fn standard(len: u16) -> Self {
        assert!(std::mem::size_of::<Self>() == 6);
        Self {
            operation_code: 0x12,
            evpd: 0,
            page_code: 0,
            allocation_length_be: len.to_be_bytes(),
            control: 0,
        }
    }

    /// Vital Product Data INQUIRY for `page`.
    pub fn vpd(page: u8, len: u16) -> Self {
        Self {
            operation_code: 0x12,
            evpd: 1,
            page_code: page,
            allocation_length_be: len.to_be_bytes(),
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct LogSense {
    operation_code: u8,
    sp: u8,
    pc_page_code: u8,
    subpage_code: u8,
    reserved: u8,
    parameter_pointer_be: [u8; 2],
    allocation_length_be: [u8; 2],
    control: u8,
}

unsafe impl Zeroable for LogSense {}
unsafe impl Pod for LogSense {}

/// Page Control field values for LOG SENSE / MODE SENSE (spec §4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageControl {
    Current,
    Changeable,
    Default,
    Saved,
}

impl PageControl {
    fn bits(self) -> u8 {
        match self {
            PageControl::Current => 0,
            PageControl::Changeable => 1,
            PageControl::Default => 2,
            PageControl::Saved => 3,
        }
    }
}

impl LogSense {
    pub fn new(page: u8, subpage: u8, pc: PageControl, len: u16) -> Self {
        assert!(std::mem::size_of::<Self>() == 10);
        Self {
            operation_code: 0x4d,
            sp: 0,
            pc_page_code: (pc.bits() << 6) | (page & 0x3f),
            subpage_code: subpage,
            reserved: 0,
            parameter_pointer_be: [0, 0],
            allocation_length_be: len.to_be_bytes(),
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ModeSense6 {
    operation_code: u8,
    dbd: u8,
    pc_page_code: u8,
    subpage_code: u8,
    allocation_length: u8,
    control: u8,
}

unsafe impl Zeroable for ModeSense6 {}
unsafe impl Pod for ModeSense6 {}

impl ModeSense6 {
    pub fn new(page: u8, subpage: u8, pc: PageControl, len: u8) -> Self {
        assert!(std::mem::size_of::<Self>() == 6);
        Self {
            operation_code: 0x1a,
            dbd: 0x08,
            pc_page_code: (pc.bits() << 6) | (page & 0x3f),
            subpage_code: subpage,
            allocation_length: len,
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ModeSense10 {
    operation_code: u8,
    dbd: u8,
    pc_page_code: u8,
    subpage_code: u8,
    reserved: [u8; 3],
    allocation_length_be: [u8; 2],
    control: u8,
}

unsafe impl Zeroable for ModeSense10 {}
unsafe impl Pod for ModeSense10 {}

impl ModeSense10 {
    pub fn new(page: u8, subpage: u8, pc: PageControl, len: u16) -> Self {
        assert!(std::mem::size_of::<Self>() == 10);
        Self {
            operation_code: 0x5a,
            dbd: 0x08,
            pc_page_code: (pc.bits() << 6) | (page & 0x3f),
            subpage_code: subpage,
            reserved: [0; 3],
            allocation_length_be: len.to_be_bytes(),
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ModeSelect6 {
    operation_code: u8,
    flags: u8,
    reserved: [u8; 2],
    parameter_list_length: u8,
    control: u8,
}

unsafe impl Zeroable for ModeSelect6 {}
unsafe impl Pod for ModeSelect6 {}

impl ModeSelect6 {
    /// `pf` = Page Format, `sp` = Save Pages (spec §4.2.2: "preserving the
    /// SP bit from the original PS bit").
    pub fn new(pf: bool, sp: bool, parameter_list_length: u8) -> Self {
        assert!(std::mem::size_of::<Self>() == 6);
        Self {
            operation_code: 0x15,
            flags: ((pf as u8) << 4) | (sp as u8),
            reserved: [0; 2],
            parameter_list_length,
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ModeSelect10 {
    operation_code: u8,
    flags: u8,
    reserved: [u8; 5],
    parameter_list_length_be: [u8; 2],
    control: u8,
}

unsafe impl Zeroable for ModeSelect10 {}
unsafe impl Pod for ModeSelect10 {}

impl ModeSelect10 {
    pub fn new(pf: bool, sp: bool, parameter_list_length: u16) -> Self {
        assert!(std::mem::size_of::<Self>() == 10);
        Self {
            operation_code: 0x55,
            flags: ((pf as u8) << 4) | (sp as u8),
            reserved: [0; 5],
            parameter_list_length_be: parameter_list_length.to_be_bytes(),
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct SendDiagnostic {
    operation_code: u8,
    flags: u8,
    reserved: u8,
    parameter_list_length_be: [u8; 2],
    control: u8,
}

unsafe impl Zeroable for SendDiagnostic {}
unsafe impl Pod for SendDiagnostic {}

impl SendDiagnostic {
    /// `function_code` occupies bits 7:5 of the flags byte; `self_test`
    /// sets the SELFTEST bit (spec §4.2.2: distinct timeouts apply to
    /// self-test forms — that distinction is the caller's, not the CDB's).
    pub fn new(function_code: u8, self_test: bool) -> Self {
        assert!(std::mem::size_of::<Self>() == 6);
        Self {
            operation_code: 0x1d,
            flags: (function_code << 5) | ((self_test as u8) << 2),
            reserved: 0,
            parameter_list_length_be: [0, 0],
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ReadCapacity10 {
    operation_code: u8,
    reserved1: u8,
    lba_be: [u8; 4],
    reserved6: [u8; 3],
    control: u8,
}

unsafe impl Zeroable for ReadCapacity10 {}
unsafe impl Pod for ReadCapacity10 {}

impl ReadCapacity10 {
    pub fn new() -> Self {
        assert!(std::mem::size_of::<Self>() == 10);
        Self {
            operation_code: 0x25,
            reserved1: 0,
            lba_be: [0; 4],
            reserved6: [0; 3],
            control: 0,
        }
    }
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
pub struct ReadCapacity10Reply {
    pub lba: [u8; 4],
    pub block_size: [u8; 4],
}

unsafe impl Zeroable for ReadCapacity10Reply {}
unsafe impl Pod for ReadCapacity10Reply {}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ReadCapacity16 {
    operation_code: u8,
    service_action: u8,
    lba_be: [u8; 8],
    allocation_length_be: [u8; 4],
    reserved: u8,
    control: u8,
}

unsafe impl Zeroable for ReadCapacity16 {}
unsafe impl Pod for ReadCapacity16 {}

impl ReadCapacity16 {
    pub fn new() -> Self {
        assert!(std::mem::size_of::<Self>() == 16);
        Self {
            operation_code: 0x9e,
            service_action: 0x10,
            lba_be: [0; 8],
            allocation_length_be: [0, 0, 0, 32],
            reserved: 0,
            control: 0,
        }
    }
}

#[derive(Copy, Clone, Default)]
#[repr(C)]
pub struct ReadCapacity16Reply {
    pub lba: [u8; 8],
    pub block_size: [u8; 4],
    pub flags: [u8; 2],
    pub lowest_aligned_lba: [u8; 2],
    pub reserved: [u8; 16],
}

unsafe impl Zeroable for ReadCapacity16Reply {}
unsafe impl Pod for ReadCapacity16Reply {}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ReadDefectData10 {
    operation_code: u8,
    flags: u8,
    defect_list_format: u8,
    reserved: [u8; 4],
    allocation_length_be: [u8; 2],
    control: u8,
}

unsafe impl Zeroable for ReadDefectData10 {}
unsafe impl Pod for ReadDefectData10 {}

impl ReadDefectData10 {
    pub fn new(len: u16) -> Self {
        assert!(std::mem::size_of::<Self>() == 10);
        Self {
            operation_code: 0x37,
            flags: 0x18, // req_plist | req_glist
            defect_list_format: 0,
            reserved: [0; 4],
            allocation_length_be: len.to_be_bytes(),
            control: 0,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct ReadDefectData12 {
    operation_code: u8,
    flags: u8,
    defect_list_format: u8,
    address_descriptor_index_be: [u8; 4],
    allocation_length_be: [u8; 4],
    reserved: u8,
    control: u8,
}

unsafe impl Zeroable for ReadDefectData12 {}
unsafe impl Pod for ReadDefectData12 {}

impl ReadDefectData12 {
    pub fn new(len: u32) -> Self {
        assert!(std::mem::size_of::<Self>() == 12);
        Self {
            operation_code: 0xb7,
            flags: 0x18,
            defect_list_format: 0,
            address_descriptor_index_be: [0; 4],
            allocation_length_be: len.to_be_bytes(),
            reserved: 0,
            control: 0,
        }
    }
}

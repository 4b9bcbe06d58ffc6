//! JMicron JMB39x / JMS56x USB-to-ATA bridge tunnel (spec §4.4.2).
//!
//! Up to five ATA disks behind one bridge are addressed by a virtual port
//! number; commands ride piggyback on 512-byte sector reads/writes at a
//! fixed LBA, obfuscated with a per-byte XOR table and protected by a
//! bridge-specific CRC-32. Grounded directly on `dev_jmb39x_raid.cpp`'s
//! `jmb_xor`/`jmb_crc`/`jmb_set_wakeup_sector`/`jmb_set_request_sector`/
//! `jmb39x_device`.

use crate::adapter::TunnelAdapter;
use diskhealth_core::{
    AtaCommand, AtaDirection, AtaTaskFileOut, DataPhase, Error, ScsiTransport, UniformError,
};
use std::fmt;

const WAKEUP_TAG: u32 = 0x197b0325;
const MIN_LBA: u8 = 33;
const MAX_LBA: u8 = 62;
const DEFAULT_LBA: u8 = 33;

/// The fixed 512-byte XOR obfuscation table (spec §4.4.2 "Sector
/// obfuscation"), verbatim from `jmb_xor`'s `xor_table`.
#[rustfmt::skip]
const XOR_TABLE: [u8; 512] = [
    0x08, 0xc1, 0x67, 0x44, 0x04, 0x91, 0x0d, 0x3d, 0x9c, 0x44, 0xdb, 0x61, 0xba, 0x63, 0x00, 0x5c,
    0x48, 0x78, 0xc4, 0x19, 0x9f, 0xc8, 0x8a, 0x1f, 0x8f, 0xa3, 0x7f, 0x83, 0x08, 0xcf, 0x7a, 0x71,
    0x89, 0xa4, 0x1d, 0xcd, 0xe7, 0xd2, 0x32, 0xe1, 0x27, 0xad, 0xd4, 0xfa, 0x0e, 0x03, 0x99, 0xeb,
    0xf7, 0x83, 0x50, 0x50, 0x11, 0x2d, 0x79, 0xbe, 0x3c, 0xb4, 0xf1, 0xe3, 0x8f, 0xd9, 0x3b, 0x9f,
    0xd9, 0xb0, 0xf3, 0x67, 0x87, 0x90, 0xe0, 0x5d, 0xff, 0xf9, 0xf0, 0x60, 0x61, 0x55, 0x1a, 0x2e,
    0x81, 0x52, 0xaf, 0x73, 0xee, 0x25, 0xad, 0xc7, 0x01, 0x6e, 0xce, 0x6b, 0x01, 0x8d, 0x49, 0x74,
    0x9c, 0x9e, 0xed, 0x7e, 0xe9, 0x3b, 0xf3, 0xa2, 0x8e, 0x45, 0xa0, 0x39, 0x0f, 0xcd, 0x96, 0x6b,
    0x90, 0x3c, 0xa7, 0xb4, 0x5a, 0x6f, 0x72, 0xba, 0x08, 0x6b, 0x58, 0x1f, 0x35, 0x42, 0x2a, 0xc6,
    0x4f, 0xf4, 0x51, 0xa2, 0xa1, 0x48, 0x6e, 0x89, 0xe9, 0x36, 0x6d, 0xc8, 0x3b, 0x12, 0xec, 0x3a,
    0xad, 0x89, 0x2f, 0x37, 0xab, 0x1a, 0xde, 0x63, 0x2f, 0xef, 0x74, 0xee, 0xc7, 0xa9, 0x51, 0xd1,
    0xae, 0x63, 0xad, 0x92, 0x1b, 0x78, 0x98, 0xf1, 0xb6, 0x40, 0xbb, 0xfa, 0x22, 0x07, 0xf3, 0x22,
    0x95, 0xb7, 0x46, 0xa3, 0xca, 0x2b, 0x16, 0x85, 0x40, 0x41, 0x0a, 0xc5, 0xf3, 0x61, 0xc7, 0xad,
    0x53, 0xfb, 0x1b, 0x65, 0xac, 0xc9, 0x55, 0xee, 0x73, 0xc1, 0x02, 0xa0, 0x29, 0xfe, 0x53, 0x15,
    0x8f, 0x1f, 0xad, 0x8d, 0x77, 0xde, 0x15, 0xef, 0x6b, 0xf3, 0x1b, 0xd8, 0x44, 0x96, 0xe3, 0xaa,
    0x5a, 0x2a, 0xdc, 0x10, 0x7b, 0x96, 0xda, 0x3c, 0x8b, 0xf2, 0x3d, 0x38, 0xa4, 0x81, 0xf3, 0x2c,
    0x58, 0x41, 0xf5, 0x54, 0x73, 0x45, 0x9d, 0x73, 0xc5, 0xfd, 0xe8, 0x2a, 0xbe, 0xc6, 0x30, 0x50,
    0x9e, 0x4f, 0x8f, 0xa0, 0x29, 0xed, 0x4a, 0xe9, 0x2f, 0x32, 0x03, 0xca, 0x13, 0xd8, 0x5b, 0x7a,
    0xae, 0x9d, 0x58, 0xe6, 0x88, 0x73, 0x22, 0x90, 0x0a, 0x43, 0x6c, 0x41, 0x5b, 0x17, 0xc4, 0x1a,
    0x27, 0x5e, 0xf9, 0xef, 0x63, 0x9f, 0x57, 0x23, 0x6c, 0x27, 0x97, 0x70, 0xf5, 0xa8, 0x5b, 0x7b,
    0x5d, 0xa9, 0x0f, 0x37, 0xae, 0xff, 0x8b, 0xb2, 0xc8, 0xca, 0xd9, 0x28, 0x8e, 0x5b, 0xb2, 0x46,
    0xbe, 0x80, 0x40, 0x38, 0xe4, 0xee, 0xbb, 0x2c, 0xd2, 0x82, 0xc1, 0x72, 0x5a, 0x11, 0x4f, 0x4b,
    0x54, 0xe2, 0xb9, 0xf1, 0x24, 0x96, 0x53, 0x3d, 0x33, 0x81, 0xf1, 0x50, 0x2e, 0x1a, 0x04, 0x71,
    0x80, 0xf9, 0xbf, 0x66, 0x69, 0x9c, 0x6f, 0x22, 0x44, 0xd0, 0x69, 0xbb, 0xad, 0x93, 0x84, 0x98,
    0x74, 0xaf, 0x67, 0x32, 0xb9, 0x8f, 0x65, 0xf3, 0x4b, 0x0f, 0xf4, 0x85, 0xef, 0xb5, 0xba, 0xff,
    0xe1, 0xda, 0x9e, 0x9e, 0x32, 0x96, 0xa9, 0x19, 0xb8, 0x4f, 0x43, 0xf7, 0xf6, 0x4c, 0x1c, 0x0f,
    0xce, 0xd2, 0x67, 0xb6, 0xe3, 0xe3, 0x8d, 0x27, 0x1e, 0x27, 0x98, 0x4c, 0x73, 0x37, 0x5c, 0xff,
    0xab, 0x16, 0xca, 0x64, 0x7d, 0x91, 0xc0, 0x6d, 0xae, 0x60, 0xf0, 0x1a, 0x43, 0x12, 0xe6, 0xf4,
    0xd6, 0xe8, 0xba, 0xc2, 0x9b, 0x2f, 0xe6, 0xce, 0x07, 0x08, 0x6a, 0x8d, 0x28, 0x62, 0xa7, 0x31,
    0xe9, 0x3d, 0x4b, 0x9b, 0x5b, 0x19, 0x18, 0x13, 0xd2, 0xa9, 0xc1, 0x08, 0xce, 0x62, 0x12, 0x8c,
    0x12, 0x64, 0xe3, 0x43, 0xbb, 0xe3, 0x59, 0x1c, 0x57, 0x7f, 0xcd, 0xb9, 0x72, 0x65, 0x47, 0xab,
    0xb8, 0xfe, 0x61, 0xc1, 0x08, 0xc2, 0xec, 0x25, 0x8e, 0xb9, 0x1c, 0x89, 0xdf, 0x6d, 0xd2, 0xa7,
    0x36, 0xa7, 0x10, 0x52, 0x2a, 0x21, 0x2d, 0xaa, 0x98, 0x31, 0xd1, 0x77, 0x35, 0xa8, 0x3b, 0x40,
];

/// CRC-32 table, polynomial `0x04c11db7` (spec §4.4.2), verbatim from
/// `jmb_crc`'s `crc_table`.
#[rustfmt::skip]
const CRC_TABLE: [u32; 256] = [
    0x00000000, 0x04c11db7, 0x09823b6e, 0x0d4326d9, 0x130476dc, 0x17c56b6b, 0x1a864db2, 0x1e475005,
    0x2608edb8, 0x22c9f00f, 0x2f8ad6d6, 0x2b4bcb61, 0x350c9b64, 0x31cd86d3, 0x3c8ea00a, 0x384fbdbd,
    0x4c11db70, 0x48d0c6c7, 0x4593e01e, 0x4152fda9, 0x5f15adac, 0x5bd4b01b, 0x569796c2, 0x52568b75,
    0x6a1936c8, 0x6ed82b7f, 0x639b0da6, 0x675a1011, 0x791d4014, 0x7ddc5da3, 0x709f7b7a, 0x745e66cd,
    0x9823b6e0, 0x9ce2ab57, 0x91a18d8e, 0x95609039, 0x8b27c03c, 0x8fe6dd8b, 0x82a5fb52, 0x8664e6e5,
    0xbe2b5b58, 0xbaea46ef, 0xb7a96036, 0xb3687d81, 0xad2f2d84, 0xa9ee3033, 0xa4ad16ea, 0xa06c0b5d,
    0xd4326d90, 0xd0f37027, 0xddb056fe, 0xd9714b49, 0xc7361b4c, 0xc3f706fb, 0xceb42022, 0xca753d95,
    0xf23a8028, 0xf6fb9d9f, 0xfbb8bb46, 0xff79a6f1, 0xe13ef6f4, 0xe5ffeb43, 0xe8bccd9a, 0xec7dd02d,
    0x34867077, 0x30476dc0, 0x3d044b19, 0x39c556ae, 0x278206ab, 0x23431b1c, 0x2e003dc5, 0x2ac12072,
    0x128e9dcf, 0x164f8078, 0x1b0ca6a1, 0x1fcdbb16, 0x018aeb13, 0x054bf6a4, 0x0808d07d, 0x0cc9cdca,
    0x7897ab07, 0x7c56b6b0, 0x71159069, 0x75d48dde, 0x6b93dddb, 0x6f52c06c, 0x6211e6b5, 0x66d0fb02,
    0x5e9f46bf, 0x5a5e5b08, 0x571d7dd1, 0x53dc6066, 0x4d9b3063, 0x495a2dd4, 0x44190b0d, 0x40d816ba,
    0xaca5c697, 0xa864db20, 0xa527fdf9, 0xa1e6e04e, 0xbfa1b04b, 0xbb60adfc, 0xb6238b25, 0xb2e29692,
    0x8aad2b2f, 0x8e6c3698, 0x832f1041, 0x87ee0df6, 0x99a95df3, 0x9d684044, 0x902b669d, 0x94ea7b2a,
    0xe0b41de7, 0xe4750050, 0xe9362689, 0xedf73b3e, 0xf3b06b3b, 0xf771768c, 0xfa325055, 0xfef34de2,
    0xc6bcf05f, 0xc27dede8, 0xcf3ecb31, 0xcbffd686, 0xd5b88683, 0xd1799b34, 0xdc3abded, 0xd8fba05a,
    0x690ce0ee, 0x6dcdfd59, 0x608edb80, 0x644fc637, 0x7a089632, 0x7ec98b85, 0x738aad5c, 0x774bb0eb,
    0x4f040d56, 0x4bc510e1, 0x46863638, 0x42472b8f, 0x5c007b8a, 0x58c1663d, 0x558240e4, 0x51435d53,
    0x251d3b9e, 0x21dc2629, 0x2c9f00f0, 0x285e1d47, 0x36194d42, 0x32d850f5, 0x3f9b762c, 0x3b5a6b9b,
    0x0315d626, 0x07d4cb91, 0x0a97ed48, 0x0e56f0ff, 0x1011a0fa, 0x14d0bd4d, 0x19939b94, 0x1d528623,
    0xf12f560e, 0xf5ee4bb9, 0xf8ad6d60, 0xfc6c70d7, 0xe22b20d2, 0xe6ea3d65, 0xeba91bbc, 0xef68060b,
    0xd727bbb6, 0xd3e6a601, 0xdea580d8, 0xda649d6f, 0xc423cd6a, 0xc0e2d0dd, 0xcda1f604, 0xc960ebb3,
    0xbd3e8d7e, 0xb9ff90c9, 0xb4bcb610, 0xb07daba7, 0xae3afba2, 0xaafbe615, 0xa7b8c0cc, 0xa379dd7b,
    0x9b3660c6, 0x9ff77d71, 0x92b45ba8, 0x9675461f, 0x8832161a, 0x8cf30bad, 0x81b02d74, 0x857130c3,
    0x5d8a9099, 0x594b8d2e, 0x5408abf7, 0x50c9b640, 0x4e8ee645, 0x4a4ffbf2, 0x470cdd2b, 0x43cdc09c,
    0x7b827d21, 0x7f436096, 0x7200464f, 0x76c15bf8, 0x68860bfd, 0x6c47164a, 0x61043093, 0x65c52d24,
    0x119b4be9, 0x155a565e, 0x18197087, 0x1cd86d30, 0x029f3d35, 0x065e2082, 0x0b1d065b, 0x0fdc1bec,
    0x3793a651, 0x3352bbe6, 0x3e119d3f, 0x3ad08088, 0x2497d08d, 0x2056cd3a, 0x2d15ebe3, 0x29d4f654,
    0xc5a92679, 0xc1683bce, 0xcc2b1d17, 0xc8ea00a0, 0xd6ad50a5, 0xd26c4d12, 0xdf2f6bcb, 0xdbee767c,
    0xe3a1cbc1, 0xe760d676, 0xea23f0af, 0xeee2ed18, 0xf0a5bd1d, 0xf464a0aa, 0xf9278673, 0xfde69bc4,
    0x89b8fd09, 0x8d79e0be, 0x803ac667, 0x84fbdbd0, 0x9abc8bd5, 0x9e7d9662, 0x933eb0bb, 0x97ffad0c,
    0xafb010b1, 0xab710d06, 0xa6322bdf, 0xa2f33668, 0xbcb4666d, 0xb8757bda, 0xb5365d03, 0xb1f740b4,
];

/// XORs every byte of `data` with the fixed obfuscation table, in place.
/// Self-inverse: `jmb_xor(jmb_xor(b)) == b` (spec §8.1).
pub fn jmb_xor(data: &mut [u8; 512]) {
    for (b, x) in data.iter_mut().zip(XOR_TABLE.iter()) {
        *b ^= x;
    }
}

/// CRC-32 over the first 508 bytes of `data`, fed big-endian dword by
/// dword, seeded with `0x52325032` (spec §4.4.2).
pub fn jmb_crc(data: &[u8; 512]) -> u32 {
    let mut crc: u32 = 0x52325032;
    for dw_bytes in data[..508].chunks_exact(4) {
        let dw = u32::from_be_bytes(dw_bytes.try_into().unwrap());
        for shift in [0, 8, 16, 24] {
            let byte = ((dw >> shift) & 0xff) as u8;
            crc = CRC_TABLE[(byte ^ (crc >> 24) as u8) as usize] ^ (crc << 8);
        }
    }
    crc
}

fn jmb_get_crc(data: &[u8; 512]) -> u32 {
    u32::from_le_bytes(data[508..512].try_into().unwrap())
}

fn jmb_put_crc(data: &mut [u8; 512], crc: u32) {
    data[508..512].copy_from_slice(&crc.to_le_bytes());
}

/// True if the trailing CRC-32 matches the sector's contents.
pub fn jmb_check_crc(data: &[u8; 512]) -> bool {
    jmb_get_crc(data) == jmb_crc(data)
}

fn jmb_put_le32(data: &mut [u8; 512], index: usize, val: u32) {
    data[index..index + 4].copy_from_slice(&val.to_le_bytes());
}

/// Builds one of the four fixed wake-up sectors (spec §4.4.2 "Wake-up
/// sequence" step 2; exact constants from `jmb_set_wakeup_sector`).
pub fn jmb_set_wakeup_sector(id: u8) -> [u8; 512] {
    let (code, crc) = match id {
        0 => (0x3c75a80bu32, 0x706d10d9u32),
        1 => (0x0388e337, 0x6958511e),
        2 => (0x689705f3, 0xfe234b07),
        3 => (0xe00c523a, 0x5be57adb),
        _ => panic!("wakeup sector id must be 0..=3"),
    };
    let mut data = [0u8; 512];
    jmb_put_le32(&mut data, 0, WAKEUP_TAG);
    jmb_put_le32(&mut data, 4, code);
    for (i, b) in data.iter_mut().enumerate().take(512 - 8).skip(16) {
        *b = i as u8;
    }
    jmb_put_le32(&mut data, 512 - 8, 0x10eca1db);
    jmb_put_crc(&mut data, crc);
    data
}

/// The scrambled command code for a given protocol variant (spec §4.4.2
/// "Request framing").
fn scrambled_cmd_code(version: u8) -> u32 {
    match version {
        1 => 0x197b0393,
        2 => 0x197b0562,
        _ => 0x197b0322,
    }
}

/// Builds one request sector: header, monotonically increasing command
/// ID, command body, then CRC (spec §4.4.2 "Request framing").
pub fn jmb_set_request_sector(version: u8, cmd_id: u32, cmd: &[u8]) -> [u8; 512] {
    assert!((4..=24).contains(&cmd.len()));
    let mut data = [0u8; 512];
    jmb_put_le32(&mut data, 0, scrambled_cmd_code(version));
    jmb_put_le32(&mut data, 4, cmd_id);
    data[8..8 + cmd.len()].copy_from_slice(cmd);
    let crc = jmb_crc(&data);
    jmb_put_crc(&mut data, crc);
    data
}

/// Classifies a sector: `0` = neither, `1` = plain wake-up sector, `2` =
/// XOR-obfuscated request/response sector (spec §8.1).
pub fn jmb_get_sector_type(data: &[u8; 512]) -> u8 {
    if jmb_check_crc(data) {
        return 1;
    }
    let mut unxored = *data;
    jmb_xor(&mut unxored);
    if jmb_check_crc(&unxored) {
        return 2;
    }
    0
}

fn nonempty(data: &[u8; 512]) -> bool {
    data.iter().any(|&b| b != 0)
}

/// Commands the bridge's 24-byte ATA-over-JMB framing can actually carry:
/// whole-sector responses only, no arbitrary register echoes (spec §4.4.2
/// "ATA-over-JMB"). The `bool` is whether the caller should subtract off
/// the bridge's own checksum byte to suppress a spurious SMART checksum
/// warning (ported from `is_supported_by_jmb`'s return `2`).
fn is_supported_by_jmb(tf: &diskhealth_core::AtaTaskFileIn) -> Option<bool> {
    const ATA_IDENTIFY_DEVICE: u8 = 0xec;
    const ATA_SMART_CMD: u8 = 0xb0;
    const ATA_SMART_READ_VALUES: u16 = 0xd0;
    const ATA_SMART_READ_THRESHOLDS: u16 = 0xd1;
    const ATA_SMART_READ_LOG_SECTOR: u16 = 0xd5;

    match tf.command {
        ATA_IDENTIFY_DEVICE => Some(false),
        ATA_SMART_CMD => match tf.features {
            ATA_SMART_READ_VALUES | ATA_SMART_READ_THRESHOLDS => Some(true),
            ATA_SMART_READ_LOG_SECTOR => match tf.lba_low {
                0x00 => Some(false),
                0x01 => Some(true),
                0xe0 => Some(false),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// A device that can read/write one fixed-size sector by 8-bit LBA: the
/// minimal contract the bridge tunnel needs from its wrapped transport,
/// whether that transport is ATA or SCSI (spec §4.4.2: "the underlying
/// device may be either ATA or SCSI").
pub trait SectorIo {
    type Error: PartialEq + Eq + fmt::Debug;

    fn read_sector(&mut self, lba: u8) -> Result<[u8; 512], Error<Self::Error>>;
    fn write_sector(&mut self, lba: u8, data: &[u8; 512]) -> Result<(), Error<Self::Error>>;
}

/// [`SectorIo`] over a raw ATA transport, via READ/WRITE SECTORS (28-bit
/// PIO, opcodes `0x20`/`0x30`), matching `ata_read_lba8`/`ata_write_lba8`.
pub struct AtaSectorIo<T: diskhealth_core::AtaTransport> {
    pub transport: T,
}

impl<T: diskhealth_core::AtaTransport> SectorIo for AtaSectorIo<T> {
    type Error = T::Error;

    fn read_sector(&mut self, lba: u8) -> Result<[u8; 512], Error<Self::Error>> {
        let mut buf = [0u8; 512];
        let tf = diskhealth_core::AtaTaskFileIn {
            command: 0x20,
            lba_low: lba,
            device: 0x40,
            ..Default::default()
        };
        self.transport.ata_pass_through(AtaCommand {
            tf,
            direction: AtaDirection::In,
            phase: DataPhase::In(&mut buf),
        })?;
        Ok(buf)
    }

    fn write_sector(&mut self, lba: u8, data: &[u8; 512]) -> Result<(), Error<Self::Error>> {
        let tf = diskhealth_core::AtaTaskFileIn {
            command: 0x30,
            lba_low: lba,
            device: 0x40,
            ..Default::default()
        };
        self.transport.ata_pass_through(AtaCommand {
            tf,
            direction: AtaDirection::Out,
            phase: DataPhase::Out(data),
        })?;
        Ok(())
    }
}

/// [`SectorIo`] over a raw SCSI transport, via READ(10)/WRITE(10) with a
/// single-byte LBA, matching `scsi_read_lba8`/`scsi_write_lba8`.
pub struct ScsiSectorIo<T: ScsiTransport> {
    pub transport: T,
}

fn rw10_cdb(opcode: u8, lba: u8) -> [u8; 10] {
    [opcode, 0x00, 0x00, 0x00, 0x00, lba, 0x00, 0x00, 0x01, 0x00]
}

impl<T: ScsiTransport> SectorIo for ScsiSectorIo<T> {
    type Error = T::Error;

    fn read_sector(&mut self, lba: u8) -> Result<[u8; 512], Error<Self::Error>> {
        let mut buf = [0u8; 512];
        let cdb = rw10_cdb(0x28, lba);
        self.transport.command(&cdb, DataPhase::In(&mut buf), 60)?;
        Ok(buf)
    }

    fn write_sector(&mut self, lba: u8, data: &[u8; 512]) -> Result<(), Error<Self::Error>> {
        let cdb = rw10_cdb(0x2a, lba);
        self.transport.command(&cdb, DataPhase::Out(data), 60)?;
        Ok(())
    }
}

/// The JMicron JMB39x/JMS56x bridge tunnel (spec §4.4.2). Owns its wrapped
/// [`SectorIo`] device; restores the original cover sector on drop.
pub struct Jmb39xAdapter<IO: SectorIo> {
    io: IO,
    version: u8,
    port: u8,
    lba: u8,
    force: bool,
    blocked: bool,
    orig_write_back: bool,
    cmd_id: u32,
    orig_data: [u8; 512],
}

impl<IO: SectorIo> Jmb39xAdapter<IO> {
    /// `version`: 0 = `jmb39x`, 1 = `jmb39x-q` (QNAP), 2 = `jms56x`.
    /// `lba` must be in `33..=62`; `port` in `0..=4` (spec §4.4.2).
    pub fn new(io: IO, version: u8, port: u8, lba: u8, force: bool) -> Self {
        assert!((MIN_LBA..=MAX_LBA).contains(&lba));
        assert!(port <= 4);
        Self {
            io,
            version,
            port,
            lba,
            force,
            blocked: false,
            orig_write_back: false,
            cmd_id: 0,
            orig_data: [0u8; 512],
        }
    }

    pub fn with_default_lba(io: IO, version: u8, port: u8, force: bool) -> Self {
        Self::new(io, version, port, DEFAULT_LBA, force)
    }

    fn blocked_error(message: &str) -> Error<IO::Error> {
        Error::Transport(UniformError::new(diskhealth_core::Errno::Io, message))
    }

    fn run_jmb_command(&mut self, cmd: &[u8]) -> Result<[u8; 512], Error<IO::Error>> {
        let mut request = jmb_set_request_sector(self.version, self.cmd_id, cmd);
        diskhealth_core::trace_command("jmb39x", &request[..8]);
        jmb_xor(&mut request);
        if let Err(e) = self.io.write_sector(self.lba, &request) {
            self.blocked = true;
            return Err(e);
        }
        jmb_xor(&mut request); // undo, to compare against the unobfuscated response

        let mut response = match self.io.read_sector(self.lba) {
            Ok(r) => r,
            Err(e) => {
                self.blocked = true;
                return Err(e);
            }
        };
        jmb_xor(&mut response);

        if request == response {
            self.blocked = true;
            return Err(Self::blocked_error("No JMB39x response detected"));
        }
        if !jmb_check_crc(&response) {
            self.blocked = true;
            return Err(Self::blocked_error("CRC error in JMB39x response"));
        }
        if request[..8] != response[..8] {
            self.blocked = true;
            return Err(Self::blocked_error("Invalid header in JMB39x response"));
        }

        self.cmd_id += 1;
        Ok(response)
    }

    fn restore_orig_data(&mut self) -> bool {
        if self.io.write_sector(self.lba, &self.orig_data).is_err() {
            self.blocked = true;
            return false;
        }
        true
    }

    /// Runs the wake-up sequence and Identify-Disk handshake (spec §4.4.2
    /// "Wake-up sequence").
    pub fn open(&mut self) -> Result<(), Error<IO::Error>> {
        self.orig_write_back = false;
        if self.blocked {
            return Err(Self::blocked_error("Device blocked due to previous errors"));
        }

        let mut orig = self.io.read_sector(self.lba)?;
        if nonempty(&orig) {
            let kind = jmb_get_sector_type(&orig);
            if !self.force {
                self.blocked = true;
                let reason = match kind {
                    0 => "is not zero filled",
                    1 => "contains JMB39x wakeup data",
                    _ => "contains JMB39x protocol data",
                };
                return Err(Error::Transport(UniformError::new(
                    diskhealth_core::Errno::Inval,
                    format!("Original sector at LBA {} {}", self.lba, reason),
                )));
            }
            if kind != 0 {
                orig = [0u8; 512];
            }
        }
        self.orig_data = orig;

        for id in 0..4u8 {
            let wakeup = jmb_set_wakeup_sector(id);
            if let Err(e) = self.io.write_sector(self.lba, &wakeup) {
                self.blocked = true;
                return Err(e);
            }
        }
        self.orig_write_back = true;
        self.cmd_id = 1;

        let b: u8 = if self.version != 1 { 0x02 } else { 0x01 };
        let mut cmd = [0u8; 24];
        cmd[1] = b;
        cmd[2] = b;
        cmd[3] = 0xff;
        cmd[4] = self.port;
        cmd[8] = self.port;
        let response = self.run_jmb_command(&cmd)?;

        if response[16] < b' ' {
            self.close();
            return Err(Error::Transport(UniformError::new(
                diskhealth_core::Errno::NoEnt,
                format!("No device connected to JMB39x port {}", self.port),
            )));
        }
        Ok(())
    }

    /// Restores the cover sector (spec §4.4.2 "Restoration"). Safe to call
    /// more than once; only the first call after a successful `open` does
    /// anything.
    pub fn close(&mut self) -> bool {
        let mut ok = true;
        if self.orig_write_back {
            ok = self.restore_orig_data();
            self.orig_write_back = false;
        }
        ok
    }
}

impl<IO: SectorIo> Drop for Jmb39xAdapter<IO> {
    fn drop(&mut self) {
        if self.orig_write_back {
            let _ = self.restore_orig_data();
        }
    }
}

impl<IO: SectorIo> TunnelAdapter for Jmb39xAdapter<IO> {
    type Error = IO::Error;

    fn pass_through(&mut self, cmd: AtaCommand<'_>) -> Result<AtaTaskFileOut, Error<Self::Error>> {
        if self.blocked {
            return Err(Self::blocked_error("Device blocked due to previous errors"));
        }
        if cmd.direction == AtaDirection::NoData {
            return Err(Error::Transport(UniformError::new(
                diskhealth_core::Errno::NoSys,
                "NO DATA ATA commands not implemented [JMB39x]",
            )));
        }
        let supported = is_supported_by_jmb(&cmd.tf).ok_or_else(|| {
            Error::Transport(UniformError::new(
                diskhealth_core::Errno::NoSys,
                "ATA command not implemented due to truncated response [JMB39x]",
            ))
        })?;

        let mut body = [0u8; 24];
        body[1] = 0x02;
        body[2] = 0x03;
        body[3] = 0xff;
        body[4] = self.port;
        body[5] = 0x02;
        body[7] = 0xe0;
        body[10] = cmd.tf.features as u8;
        body[12] = cmd.tf.sector_count as u8;
        body[14] = cmd.tf.lba_low;
        body[16] = cmd.tf.lba_mid;
        body[18] = cmd.tf.lba_high;
        body[20] = 0xa0;
        body[22] = cmd.tf.command;

        let response = self.run_jmb_command(&body)?;
        let status = response[31];
        if status == 0x00 {
            self.blocked = true;
            return Err(Self::blocked_error(&format!(
                "No device connected to JMB39x port {}",
                self.port
            )));
        }
        const BSY_DRDY_ERR_MASK: u8 = 0xc1;
        const BSY_CLEAR_DRDY_SET: u8 = 0x40;
        if status & BSY_DRDY_ERR_MASK != BSY_CLEAR_DRDY_SET {
            return Err(Self::blocked_error(&format!(
                "ATA command failed (status=0x{status:02x})"
            )));
        }

        if let DataPhase::In(buf) = cmd.phase {
            let copy_len = buf.len().saturating_sub(32 + 16);
            buf.fill(0);
            buf[..copy_len].copy_from_slice(&response[32..32 + copy_len]);
            if supported && !buf.is_empty() {
                let last = buf.len() - 1;
                buf[last] = buf[last].wrapping_sub(checksum(buf));
            }
        }

        Ok(AtaTaskFileOut {
            status,
            ..Default::default()
        })
    }
}

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

impl<IO: SectorIo> diskhealth_core::AtaTransport for Jmb39xAdapter<IO> {
    type Error = IO::Error;

    fn ata_pass_through(
        &mut self,
        cmd: AtaCommand<'_>,
    ) -> Result<AtaTaskFileOut, Error<Self::Error>> {
        self.pass_through(cmd)
    }
}

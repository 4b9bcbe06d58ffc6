//! Informational Exceptions Control mode page (page `0x1c`): the SCSI
//! analogue of enabling/disabling SMART (spec §4.2.2).

use crate::cdb::PageControl;
use crate::device::ScsiCodec;
use diskhealth_core::{Error, ScsiTransport};

pub const IEC_MODE_PAGE: u8 = 0x1c;
const IEC_PAGE_LEN: u8 = 12;

/// EWASC (Enable Warning) bit, byte offset 2 of the mode page body.
const EWASC_BIT: u8 = 0x10;
/// DEXCPT (Disable Exception control) bit, same byte.
const DEXCPT_BIT: u8 = 0x08;
/// MRIE = 6: "report on unrequested REQUEST SENSE" (spec §4.2.2 step 2).
const MRIE_REPORT_ON_REQUEST: u8 = 0x06;

/// Which mode-page form answered a prior fetch, so the write-back uses the
/// same one (spec §4.2.2 step 1: "remember which worked").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeForm {
    Six,
    Ten,
}

/// The current and changeable bytes of the IEC mode page, plus which mode
/// form (6 or 10-byte) answered.
pub struct IecPage {
    pub form: ModeForm,
    pub current: Vec<u8>,
    pub changeable: Vec<u8>,
}

/// Offset, within the mode page *parameter block* (after the mode
/// parameter header and any block descriptor), of the IEC page body. Both
/// MODE SENSE forms return a 4- or 8-byte header before the page itself;
/// this module works on the page body alone, which callers slice out.
pub const PAGE_BODY_OFFSET: usize = 2;

/// Fetch both the current and changeable values of the IEC page, trying
/// MODE SENSE 6 first and falling back to MODE SENSE 10 on "bad opcode"
/// (spec §4.2.2 step 1).
pub fn fetch<T: ScsiTransport>(codec: &mut ScsiCodec<T>) -> Result<IecPage, Error<T::Error>> {
    let six_current = codec.mode_sense_6(IEC_MODE_PAGE, 0, PageControl::Current, IEC_PAGE_LEN as u16);
    match six_current {
        Ok(current) => {
            let changeable =
                codec.mode_sense_6(IEC_MODE_PAGE, 0, PageControl::Changeable, IEC_PAGE_LEN as u16)?;
            Ok(IecPage {
                form: ModeForm::Six,
                current,
                changeable,
            })
        }
        Err(_) => {
            let current = codec.mode_sense_10(
                IEC_MODE_PAGE,
                0,
                PageControl::Current,
                IEC_PAGE_LEN as u16 + 4,
            )?;
            let changeable = codec.mode_sense_10(
                IEC_MODE_PAGE,
                0,
                PageControl::Changeable,
                IEC_PAGE_LEN as u16 + 4,
            )?;
            Ok(IecPage {
                form: ModeForm::Ten,
                current,
                changeable,
            })
        }
    }
}

/// Apply the "enable" transformation to a fetched current page in place
/// (spec §4.2.2 step 2): set EWASC, MRIE=6, zero the interval timer, set
/// report count to 1, masked by the changeable bitmap.
pub fn apply_enable(page: &mut IecPage) {
    let body_off = PAGE_BODY_OFFSET;
    mask_and_set(page, body_off + 2, EWASC_BIT, 0);
    mask_and_set(page, body_off + 3, MRIE_REPORT_ON_REQUEST, 0x0f);
    for off in body_off + 4..body_off + 8 {
        set_masked_byte(page, off, 0);
    }
    set_masked_byte(page, body_off + 11, 1);
}

/// Apply the "disable" transformation (spec §4.2.2 step 3): clear EWASC,
/// set DEXCPT, preserve every other bit.
pub fn apply_disable(page: &mut IecPage) {
    let body_off = PAGE_BODY_OFFSET;
    if let Some(b) = page.current.get_mut(body_off + 2) {
        *b &= !EWASC_BIT;
        *b |= DEXCPT_BIT;
    }
}

fn mask_and_set(page: &mut IecPage, offset: usize, value: u8, mask_low_bits: u8) {
    let changeable_bits = page
        .changeable
        .get(offset)
        .copied()
        .unwrap_or(0xff);
    if let Some(b) = page.current.get_mut(offset) {
        let write_mask = if mask_low_bits != 0 {
            mask_low_bits
        } else {
            value
        };
        *b = (*b & !(write_mask & changeable_bits)) | (value & changeable_bits);
    }
}

fn set_masked_byte(page: &mut IecPage, offset: usize, value: u8) {
    let changeable_bits = page.changeable.get(offset).copied().unwrap_or(0xff);
    if let Some(b) = page.current.get_mut(offset) {
        *b = (*b & !changeable_bits) | (value & changeable_bits);
    }
}

/// Write the (possibly modified) current page back via the matching MODE
/// SELECT form, preserving the SP bit from the original page's PS bit
/// (spec §4.2.2 step 4).
pub fn write_back<T: ScsiTransport>(
    codec: &mut ScsiCodec<T>,
    page: &IecPage,
) -> Result<(), Error<T::Error>> {
    let ps_bit_set = page.current.first().map(|b| b & 0x80 != 0).unwrap_or(false);
    match page.form {
        ModeForm::Six => codec.mode_select_6(ps_bit_set, &page.current),
        ModeForm::Ten => codec.mode_select_10(ps_bit_set, &page.current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> IecPage {
        IecPage {
            form: ModeForm::Six,
            current: vec![0u8; 4 + IEC_PAGE_LEN as usize],
            changeable: vec![0xffu8; 4 + IEC_PAGE_LEN as usize],
        }
    }

    #[test]
    fn enable_sets_ewasc_and_mrie() {
        let mut page = sample_page();
        apply_enable(&mut page);
        let body = PAGE_BODY_OFFSET;
        assert_eq!(page.current[body + 2] & EWASC_BIT, EWASC_BIT);
        assert_eq!(page.current[body + 3] & 0x0f, MRIE_REPORT_ON_REQUEST);
        assert_eq!(page.current[body + 11], 1);
    }

    #[test]
    fn disable_clears_ewasc_sets_dexcpt() {
        let mut page = sample_page();
        page.current[PAGE_BODY_OFFSET + 2] = EWASC_BIT;
        apply_disable(&mut page);
        assert_eq!(page.current[PAGE_BODY_OFFSET + 2] & EWASC_BIT, 0);
        assert_eq!(page.current[PAGE_BODY_OFFSET + 2] & DEXCPT_BIT, DEXCPT_BIT);
    }

    #[test]
    fn enable_respects_changeable_mask() {
        let mut page = sample_page();
        page.changeable[PAGE_BODY_OFFSET + 2] = 0; // nothing changeable
        apply_enable(&mut page);
        assert_eq!(page.current[PAGE_BODY_OFFSET + 2], 0);
    }
}

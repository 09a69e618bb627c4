//! PowerPC trampoline encoding.
//!
//! The trampoline is the exact 20-byte sequence
//!
//! ```text
//! li    r12, lo16(dest)        ; 0x39800000 | lo16
//! addis r12, r12, hi16(dest)   ; 0x3d8c0000 | hi16
//! mtctr r12                    ; 0x7d8903a6
//! bctr                         ; 0x4e800420
//! .long 0                      ; sentinel for trampoline detection
//! ```
//!
//! `addis` adds to the low half already in r12, and the `li` immediate is
//! sign extended, so `hi16` must compensate when bit 15 of the address is
//! set. The zero word is an illegal instruction; no real function entry
//! starts with this shape, which is what makes detection reliable.

use crate::isa::{PatchIsa, Prologue};
use crate::target::Target;
use smallvec::{smallvec, SmallVec};

/// Size in bytes of the whole sequence, sentinel included.
pub const TRAMPOLINE_SIZE: usize = 20;

const LI_R12: u32 = 0x3980_0000;
const ADDIS_R12_R12: u32 = 0x3d8c_0000;
const MTCTR_R12: u32 = 0x7d89_03a6;
const BCTR: u32 = 0x4e80_0420;

/// `bcl 20,31,.+4`: the call-next-instruction idiom every PIC prologue uses
/// to discover its own address.
const BCL_PIC: u32 = 0x429f_0005;
/// `mflr r0` with a zero register field; the real register is bits 21..26.
const MFLR_MASK: u32 = 0xfc1f_ffff;
const MFLR_BASE: u32 = 0x7c08_02a6;

/// The low 16 bits of an address, as the `li` immediate.
pub fn encode_lo16(addr: u64) -> u16 {
    (addr & 0xffff) as u16
}

/// The high 16 bits of an address, adjusted for the sign extension of the
/// low half: when bit 15 is set, `li` produced a value 0x10000 too small,
/// so `addis` must add one more.
pub fn encode_hi16(addr: u64) -> u16 {
    let mut hi = (addr >> 16) as u16;
    if addr & 0x8000 != 0 {
        hi = hi.wrapping_add(1);
    }
    hi
}

/// Reassemble an address from its `hi16`/`lo16` split.
pub fn decode_hi16_lo16(hi16: u16, lo16: u16) -> u64 {
    let hi = if lo16 & 0x8000 != 0 {
        hi16.wrapping_sub(1)
    } else {
        hi16
    };
    (u64::from(hi) << 16) | u64::from(lo16)
}

/// The PowerPC variant of the trampoline codec.
pub struct PpcIsa;

impl PatchIsa for PpcIsa {
    fn name(&self) -> &'static str {
        "ppc"
    }

    fn trampoline_size(&self) -> usize {
        TRAMPOLINE_SIZE
    }

    fn trampoline_words(&self, dest: u64) -> SmallVec<[u32; 5]> {
        smallvec![
            LI_R12 | u32::from(encode_lo16(dest)),
            ADDIS_R12_R12 | u32::from(encode_hi16(dest)),
            MTCTR_R12,
            BCTR,
            0,
        ]
    }

    fn decode_trampoline(&self, bytes: &[u8], target: &Target) -> Option<u64> {
        if bytes.len() < TRAMPOLINE_SIZE {
            return None;
        }
        let word = |i: usize| target.read_uint(&bytes[i * 4..i * 4 + 4]) as u32;

        let w0 = word(0);
        if w0 & 0xffff_0000 != LI_R12 {
            return None;
        }
        let lo16 = (w0 & 0xffff) as u16;

        let w1 = word(1);
        if w1 & 0xffff_0000 != ADDIS_R12_R12 {
            return None;
        }
        let hi16 = (w1 & 0xffff) as u16;

        if word(2) != MTCTR_R12 || word(3) != BCTR || word(4) != 0 {
            return None;
        }

        Some(decode_hi16_lo16(hi16, lo16))
    }

    fn parse_prologue(&self, code: &[u8], start: u64, target: &Target) -> Prologue {
        let words = code.len() / 4;
        let word = |i: usize| target.read_uint(&code[i * 4..i * 4 + 4]) as u32;

        for i in 0..words {
            if word(i) != BCL_PIC {
                continue;
            }
            // The link register now holds the address of the next
            // instruction; the prologue copies it into the PIC base.
            for j in i + 1..words {
                let w = word(j);
                if w & MFLR_MASK == MFLR_BASE {
                    return Prologue {
                        pic_base_reg: Some(((w >> 21) & 31) as u8),
                        pic_base_addr: Some(start + (i as u64 + 1) * 4),
                    };
                }
            }
        }
        Prologue::default()
    }
}

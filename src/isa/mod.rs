//! Instruction Set Architectures.
//!
//! The `isa` module provides a `PatchIsa` trait which captures the one
//! ISA-specific capability the engine needs: emit a minimum-size absolute
//! jump from a replaced function's entry to its new implementation, and
//! recognize such a jump after the fact. Every variant shares the
//! trailing-zero-word sentinel convention so a backtrace consumer can detect
//! a patched entry by opcode-masking the instruction slots and checking the
//! sentinel.
//!
//! Only PowerPC is currently implemented; `isa::lookup()` is the entry point
//! that selects the variant for a target triple.

use crate::target::Target;
use core::fmt;
use smallvec::SmallVec;
use target_lexicon::{Architecture, Triple};

pub mod ppc;

/// What a function prologue told us about its position-independent-code
/// base: which register holds it and the absolute address it computes.
/// Either half may be unknown; callers treat that as "no PIC base".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Prologue {
    pub pic_base_reg: Option<u8>,
    pub pic_base_addr: Option<u64>,
}

/// ISA-specific encoding of the fix trampoline.
pub trait PatchIsa {
    /// Name of this ISA, for diagnostics.
    fn name(&self) -> &'static str;

    /// Size in bytes of the trampoline, sentinel included. A replaced
    /// function must span at least this much rewritable text.
    fn trampoline_size(&self) -> usize;

    /// The instruction words overwriting a function entry so that execution
    /// vectors to `dest`. The final word is the zero sentinel.
    fn trampoline_words(&self, dest: u64) -> SmallVec<[u32; 5]>;

    /// Decode a trampoline from the raw bytes at a function entry. Returns
    /// the destination iff the opcode fields match and the sentinel word is
    /// zero.
    fn decode_trampoline(&self, bytes: &[u8], target: &Target) -> Option<u64>;

    /// Scan a function's prologue for the PIC-base idiom.
    fn parse_prologue(&self, code: &[u8], start: u64, target: &Target) -> Prologue;
}

/// Look for an ISA supporting fix trampolines for the given triple.
pub fn lookup(triple: &Triple) -> Result<Box<dyn PatchIsa>, LookupError> {
    match triple.architecture {
        Architecture::Powerpc => Ok(Box::new(ppc::PpcIsa)),
        _ => Err(LookupError::Unsupported),
    }
}

/// Describes reason for target lookup failure
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LookupError {
    /// Trampolines for this ISA are not implemented.
    Unsupported,
}

impl std::error::Error for LookupError {}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LookupError::Unsupported => write!(f, "support for this ISA is not implemented"),
        }
    }
}

//! Byte-order and pointer-width properties of the debug target.

use target_lexicon::{Endianness, Triple};

/// The properties of the target needed to read and write inferior memory:
/// integer byte order and pointer width.
#[derive(Copy, Clone, Debug)]
pub struct Target {
    pub endian: Endianness,
    pub pointer_bytes: usize,
}

impl Target {
    /// Derive the target properties from a triple. Returns `None` when the
    /// triple doesn't determine them.
    pub fn from_triple(triple: &Triple) -> Option<Target> {
        let endian = triple.endianness().ok()?;
        let pointer_bytes = usize::from(triple.pointer_width().ok()?.bytes());
        Some(Target {
            endian,
            pointer_bytes,
        })
    }

    /// Extract an unsigned integer of `buf.len()` bytes in target byte order.
    pub fn read_uint(&self, buf: &[u8]) -> u64 {
        debug_assert!(buf.len() <= 8);
        match self.endian {
            Endianness::Big => buf.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b)),
            Endianness::Little => buf
                .iter()
                .rev()
                .fold(0, |acc, &b| (acc << 8) | u64::from(b)),
        }
    }

    /// Store an unsigned integer into `buf` in target byte order.
    pub fn write_uint(&self, buf: &mut [u8], mut value: u64) {
        debug_assert!(buf.len() <= 8);
        match self.endian {
            Endianness::Big => {
                for b in buf.iter_mut().rev() {
                    *b = value as u8;
                    value >>= 8;
                }
            }
            Endianness::Little => {
                for b in buf.iter_mut() {
                    *b = value as u8;
                    value >>= 8;
                }
            }
        }
    }

    /// A pointer-sized buffer holding `value` in target byte order.
    pub fn pointer_bytes_of(&self, value: u64) -> Vec<u8> {
        let mut buf = vec![0; self.pointer_bytes];
        self.write_uint(&mut buf, value);
        buf
    }
}

//! Buffer integrity tag
//!
//! The tag is a cheap checksum over the identity of a buffer. It is stamped
//! when the buffer is created and recomputed when it is deleted; a mismatch
//! means the handle was corrupted while the caller held it.

/// Compute the integrity tag for a buffer identity.
///
/// Arithmetic wraps; only the low 32 bits of the address participate.
///
/// # Examples
///
/// ```
/// use nerve_memory::integrity_tag;
///
/// assert_eq!(integrity_tag(0x1000, 0, 0), 0x1000);
/// assert_eq!(integrity_tag(0, 1, 1), 0xFF + 0x11);
/// ```
pub fn integrity_tag(address: u64, size: usize, offset: usize) -> u32 {
    let low = address as u32;
    low.wrapping_add((size as u32).wrapping_mul(0xFF))
        .wrapping_add((offset as u32).wrapping_mul(0x11))
}

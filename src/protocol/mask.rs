//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking is its own inverse: applying the same key twice restores the data.

/// XOR `data` in place with the repeating 4-byte `mask`.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    for (byte, key) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= key;
    }
}

/// Draw a fresh masking key from the OS random source.
///
/// Falls back to a time derived key if the random source is unavailable.
#[must_use]
pub fn random_mask() -> [u8; 4] {
    let mut key = [0u8; 4];
    if getrandom::getrandom(&mut key).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0x1234_5678);
        key = nanos.wrapping_mul(0x9E37_79B9).to_le_bytes();
    }
    key
}

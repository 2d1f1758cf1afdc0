//! Stable 64-bit hashing for type, path and query keys.

use xxhash_rust::xxh64::xxh64;

const SEED: u64 = 0;

/// xxHash64 of `bytes`.  Deterministic across runs and platforms.
#[inline]
pub fn hash(bytes: &[u8]) -> u64 {
    xxh64(bytes, SEED)
}

#[inline]
pub fn hash_str(s: &str) -> u64 {
    hash(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(hash(b""), 0xEF46_DB37_51D8_E999);
    }

    #[test]
    fn distinct_inputs_differ() {
        assert_ne!(hash_str("PICT"), hash_str("PICS"));
        assert_eq!(hash_str("snd "), hash(b"snd "));
    }
}

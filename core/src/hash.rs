//! Seeded hashing for table keys.
//! The hash has to be stable across processes and platforms since table images are persisted, so
//! the std hasher is not usable here.

/// MurmurHash64A over data with seed.
pub fn murmur_hash_64a(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let len = data.len();
    let mut h: u64 = seed ^ (len as u64).wrapping_mul(M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(chunk);
        let mut k = u64::from_le_bytes(buf);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, b) in tail.iter().enumerate() {
            h ^= (*b as u64) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

/// Seed multiplier for the cuckoo hash functions, function n uses (n + 1) * this.
pub const HASH_SEED_MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// Hash function `func_id` of a table key's bytes.
#[inline]
pub fn seeded_hash(key_bytes: &[u8], func_id: u8) -> u64 {
    murmur_hash_64a(
        key_bytes,
        (func_id as u64 + 1).wrapping_mul(HASH_SEED_MULTIPLIER),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur_stable() {
        // Same input, same output; different seeds diverge.
        let a = murmur_hash_64a(b"hello world", 1);
        assert_eq!(a, murmur_hash_64a(b"hello world", 1));
        assert_ne!(a, murmur_hash_64a(b"hello world", 2));
        assert_ne!(a, murmur_hash_64a(b"hello worle", 1));
        // Empty input only mixes the seed.
        assert_eq!(murmur_hash_64a(b"", 0), 0);
    }

    #[test]
    fn test_murmur_known_answers() {
        // Reference MurmurHash64A outputs, persisted images depend on these exact values.
        assert_eq!(murmur_hash_64a(b"", 0x1234), 0xed3a_6663_690e_3630);
        assert_eq!(murmur_hash_64a(b"abc", 0x1234), 0x6f68_b6e7_d1fc_d0ca);
        assert_eq!(murmur_hash_64a(b"abcdefgh", 0x1234), 0x65f0_c6de_00db_5d8e);
        assert_eq!(murmur_hash_64a(b"hello world", 0x1234), 0x45bd_b14e_d628_cade);
        assert_eq!(seeded_hash(&42_u64.to_le_bytes(), 0), 0x40f6_5da8_a062_25b1);
    }

    #[test]
    fn test_seeded_functions_differ() {
        let key = 42_u64.to_le_bytes();
        let h0 = seeded_hash(&key, 0);
        let h1 = seeded_hash(&key, 1);
        let h2 = seeded_hash(&key, 2);
        assert_ne!(h0, h1);
        assert_ne!(h1, h2);
    }
}

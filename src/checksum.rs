//! Streaming 128-bit window hash used as the demo computation.
//!
//! Four 32-bit lanes are mixed over 16-byte blocks with the murmur3 x86/128
//! round constants. Unlike a one-shot murmur3, each `update` call mixes its
//! own tail bytes, so the digest depends on how the input was split into
//! windows. Scans over the same file with the same window size always agree.

use std::fmt;

const C1: u32 = 0x239b_961b;
const C2: u32 = 0xab0e_9789;
const C3: u32 = 0x38b3_4ae5;
const C4: u32 = 0xa1e3_8b93;

/// Running hash state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowHash {
    h: [u32; 4],
}

impl WindowHash {
    /// Starts a hash with every lane seeded to `seed`.
    pub fn new(seed: u32) -> Self {
        Self { h: [seed; 4] }
    }

    /// Mixes `data` into the state, including its trailing partial block.
    pub fn update(&mut self, data: &[u8]) {
        let [mut h1, mut h2, mut h3, mut h4] = self.h;

        let mut blocks = data.chunks_exact(16);
        for block in &mut blocks {
            let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
            let k2 = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
            let k3 = u32::from_le_bytes([block[8], block[9], block[10], block[11]]);
            let k4 = u32::from_le_bytes([block[12], block[13], block[14], block[15]]);

            h1 ^= mix_k1(k1);
            h1 = h1
                .rotate_left(19)
                .wrapping_add(h2)
                .wrapping_mul(5)
                .wrapping_add(0x561c_cd1b);

            h2 ^= mix_k2(k2);
            h2 = h2
                .rotate_left(17)
                .wrapping_add(h3)
                .wrapping_mul(5)
                .wrapping_add(0x0bca_a747);

            h3 ^= mix_k3(k3);
            h3 = h3
                .rotate_left(15)
                .wrapping_add(h4)
                .wrapping_mul(5)
                .wrapping_add(0x96cd_1c35);

            h4 ^= mix_k4(k4);
            h4 = h4
                .rotate_left(13)
                .wrapping_add(h1)
                .wrapping_mul(5)
                .wrapping_add(0x32ac_3b17);
        }

        let tail = blocks.remainder();
        let mut k = [0u32; 4];
        for (i, &byte) in tail.iter().enumerate() {
            k[i / 4] ^= u32::from(byte) << (8 * (i % 4));
        }
        // Lanes are mixed from the highest populated one down.
        let lanes = tail.len().div_ceil(4);
        if lanes >= 4 {
            h4 ^= mix_k4(k[3]);
        }
        if lanes >= 3 {
            h3 ^= mix_k3(k[2]);
        }
        if lanes >= 2 {
            h2 ^= mix_k2(k[1]);
        }
        if lanes >= 1 {
            h1 ^= mix_k1(k[0]);
        }

        self.h = [h1, h2, h3, h4];
    }

    /// Folds in the total input length and finalizes.
    ///
    /// Only the low 32 bits of `total_len` take part.
    pub fn finish(self, total_len: u64) -> Digest {
        let len = total_len as u32;
        let [mut h1, mut h2, mut h3, mut h4] = self.h;

        h1 ^= len;
        h2 ^= len;
        h3 ^= len;
        h4 ^= len;

        h1 = h1.wrapping_add(h2).wrapping_add(h3).wrapping_add(h4);
        h2 = h2.wrapping_add(h1);
        h3 = h3.wrapping_add(h1);
        h4 = h4.wrapping_add(h1);

        h1 = fmix32(h1);
        h2 = fmix32(h2);
        h3 = fmix32(h3);
        h4 = fmix32(h4);

        h1 = h1.wrapping_add(h2).wrapping_add(h3).wrapping_add(h4);
        h2 = h2.wrapping_add(h1);
        h3 = h3.wrapping_add(h1);
        h4 = h4.wrapping_add(h1);

        Digest([h1, h2, h3, h4])
    }
}

impl Default for WindowHash {
    fn default() -> Self {
        Self::new(0)
    }
}

#[inline]
fn mix_k1(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k: u32) -> u32 {
    k.wrapping_mul(C2).rotate_left(16).wrapping_mul(C3)
}

#[inline]
fn mix_k3(k: u32) -> u32 {
    k.wrapping_mul(C3).rotate_left(17).wrapping_mul(C4)
}

#[inline]
fn mix_k4(k: u32) -> u32 {
    k.wrapping_mul(C4).rotate_left(18).wrapping_mul(C1)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Final 128-bit hash value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Digest(pub [u32; 4]);

impl Digest {
    /// Digest bytes in memory order (each lane little-endian).
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (chunk, lane) in out.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&lane.to_le_bytes());
        }
        out
    }
}

/// Four space-separated groups of eight uppercase hex digits, in byte order.
impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.to_bytes().chunks_exact(4).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            for byte in group {
                write!(f, "{byte:02X}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_with_zero_seed_is_zero() {
        let digest = WindowHash::new(0).finish(0);
        assert_eq!(digest, Digest([0; 4]));
        assert_eq!(digest.to_string(), "00000000 00000000 00000000 00000000");
    }

    #[test]
    fn deterministic_and_input_sensitive() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31) as u8).collect();

        let mut a = WindowHash::default();
        a.update(&data);
        let mut b = WindowHash::default();
        b.update(&data);
        assert_eq!(a.finish(1000), b.finish(1000));

        let mut flipped = data.clone();
        flipped[999] ^= 1;
        let mut c = WindowHash::default();
        c.update(&flipped);
        assert_ne!(a.finish(1000), c.finish(1000));

        // The length fold alone changes the digest.
        assert_ne!(a.finish(1000), a.finish(1001));
    }

    #[test]
    fn tail_bytes_are_mixed() {
        for len in 1..16 {
            let data = vec![0xAB; len];
            let mut h = WindowHash::default();
            h.update(&data);
            assert_ne!(h, WindowHash::default(), "tail of {len} bytes ignored");
        }
    }

    fn hash_once(data: &[u8], seed: u32) -> Digest {
        let mut h = WindowHash::new(seed);
        h.update(data);
        h.finish(data.len() as u64)
    }

    #[test]
    fn single_update_matches_murmur3_x86_128() {
        let digest = hash_once(b"The quick brown fox jumps over the lazy dog", 0);
        assert_eq!(
            digest,
            Digest([0x2f15_83c3, 0xecee_2c67, 0x5d7b_f66c, 0xe5e9_1d2c])
        );
        assert_eq!(digest.to_string(), "C383152F 672CEEEC 6CF67B5D 2C1DE9E5");

        let digest = hash_once(b"hello", 0);
        assert_eq!(digest.to_string(), "A044242B F7DE91DB B631DB9A B631DB9A");
    }

    /// SMHasher verification: hash keys `[0..i)` with seed `256 - i`, hash the
    /// concatenated digests with seed 0, read the first four bytes.
    #[test]
    fn smhasher_verification_value() {
        let key: Vec<u8> = (0..=255u8).collect();
        let mut digests = Vec::with_capacity(16 * 256);
        for i in 0..256usize {
            digests.extend_from_slice(&hash_once(&key[..i], 256 - i as u32).to_bytes());
        }
        let last = hash_once(&digests, 0).to_bytes();
        let verification = u32::from_le_bytes([last[0], last[1], last[2], last[3]]);
        assert_eq!(verification, 0xB3EC_E62A);
    }

    #[test]
    fn digest_display_uses_byte_order() {
        let digest = Digest([0x0403_0201, 0, 0, 0xDEAD_BEEF]);
        assert_eq!(
            digest.to_string(),
            "01020304 00000000 00000000 EFBEADDE"
        );
    }
}

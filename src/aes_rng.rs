//! PRG based on AES-128 in counter mode.
//!
//! The OT extension expands every 16-byte base-OT seed into a column of the extension matrix
//! with an [`AesRng`]. Both parties must derive the same stream from the same seed, so the output
//! only depends on the seed and the number of bytes drawn so far.
use aes::{
    Aes128,
    cipher::{BlockCipherEncrypt, KeyInit},
};
use rand::{CryptoRng, RngCore, SeedableRng};

use crate::block::Block;

/// A counter-mode AES PRG, keyed with the seed.
#[derive(Clone)]
pub struct AesRng {
    aes: Aes128,
    counter: u128,
    buffer: [u8; Block::BYTES],
    used: usize,
}

impl std::fmt::Debug for AesRng {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "AesRng {{ counter: {} }}", self.counter)
    }
}

impl AesRng {
    /// Encrypts the next counter value into the internal buffer.
    #[inline]
    fn refill(&mut self) {
        let mut blk = aes::Block::from(Block::from(self.counter));
        self.aes.encrypt_block(&mut blk);
        self.buffer = Block::from(blk).into();
        self.counter += 1;
        self.used = 0;
    }
}

impl RngCore for AesRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0; 4];
        self.fill_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0; 8];
        self.fill_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, mut dest: &mut [u8]) {
        while !dest.is_empty() {
            if self.used == Block::BYTES {
                self.refill();
            }
            let n = dest.len().min(Block::BYTES - self.used);
            dest[..n].copy_from_slice(&self.buffer[self.used..self.used + n]);
            self.used += n;
            dest = &mut dest[n..];
        }
    }
}

impl SeedableRng for AesRng {
    type Seed = Block;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        let key: [u8; 16] = seed.into();
        AesRng {
            aes: Aes128::new(&key.into()),
            counter: 0,
            buffer: [0; Block::BYTES],
            used: Block::BYTES,
        }
    }
}

impl CryptoRng for AesRng {}

//! Fixed-key AES and the hash functions built on top of it.
//!
//! This implementation of a correlation robust AES hash function is based on the findings of
//! <https://eprint.iacr.org/2019/074>.
use aes::{
    Aes128,
    cipher::{BlockCipherEncrypt, KeyInit},
};

use crate::block::Block;

/// The AES key used by [`FixedKeyAes`] unless the caller injects a different one.
///
/// The key was randomly chosen once. Any publicly known key is fine, garbler and evaluator only
/// need to agree on it.
pub const FIXED_AES_KEY: [u8; 16] = 193502124791825095790518994062991136444_u128.to_le_bytes();

/// AES-128 with a fixed, public key, used as a random permutation `π`.
#[derive(Clone)]
pub struct FixedKeyAes {
    aes: Aes128,
}

impl std::fmt::Debug for FixedKeyAes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("FixedKeyAes")
    }
}

impl Default for FixedKeyAes {
    fn default() -> Self {
        Self::new(FIXED_AES_KEY)
    }
}

impl FixedKeyAes {
    /// Create a new `FixedKeyAes` with the given key.
    pub fn new(key: [u8; 16]) -> Self {
        Self {
            aes: Aes128::new(&key.into()),
        }
    }

    /// Applies the permutation, `π(x)`.
    #[inline]
    pub fn permute(&self, x: Block) -> Block {
        let mut blk = aes::Block::from(x);
        self.aes.encrypt_block(&mut blk);
        blk.into()
    }

    /// Compute the correlation robust hash of a block, `π(x) ^ x`.
    ///
    /// # Warning: only secure in semi-honest setting!
    #[inline]
    pub fn cr_hash(&self, x: Block) -> Block {
        self.permute(x) ^ x
    }

    /// Tweakable circular correlation robust hash function, `π(π(x) ^ tweak) ^ π(x)`.
    ///
    /// This is the TMMO function.
    #[inline]
    pub fn tccr_hash(&self, tweak: Block, x: Block) -> Block {
        let x_enc = self.permute(x);
        self.permute(x_enc ^ tweak) ^ x_enc
    }

    /// Fills `out` with a mask derived from `x` using [`FixedKeyAes::tccr_hash`].
    ///
    /// Chunk `c` of the mask uses the tweak `(index, c)`, so masks of different indices and
    /// different chunks are independent.
    pub fn tccr_mask(&self, index: u64, x: Block, out: &mut [u8]) {
        for (c, chunk) in out.chunks_mut(Block::BYTES).enumerate() {
            let h = self.tccr_hash(Block::pack(index, c as u64), x);
            chunk.copy_from_slice(&h.as_bytes()[..chunk.len()]);
        }
    }
}

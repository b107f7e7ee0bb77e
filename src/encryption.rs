//! Multi-key encryption of garbled table rows.
//!
//! A row is encrypted under the keys of the 1 or 2 input wires of a gate, plus a tweak (the gate
//! index). Two schemes implement [`MultiKeyEncryptionScheme`]:
//!
//! * [`FixedKeyEncryption`]: `π(K) ⊕ K ⊕ m` with a fixed-key AES permutation `π`, where `K`
//!   combines the wire keys and the tweak. No key schedule is run per gate.
//! * [`HashEncryption`]: `BLAKE3(k_1 ‖ k_2 ‖ tweak) ⊕ m`.
//!
//! Both schemes are involutions once key and tweak are set: `decrypt` and `encrypt` compute the
//! same function.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    block::Block,
    crypto::{FIXED_AES_KEY, FixedKeyAes},
};

/// The maximum length of plaintexts, ciphertexts and tweaks.
pub const BLOCK_SIZE: usize = Block::BYTES;

/// Errors raised by a [`MultiKeyEncryptionScheme`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `encrypt` or `decrypt` was called before `set_key`.
    #[error("no key was set before encrypting/decrypting")]
    KeyNotSet,
    /// `encrypt` or `decrypt` was called before `set_tweak`.
    #[error("no tweak was set before encrypting/decrypting")]
    TweakNotSet,
    /// The plaintext does not fit into a single block.
    #[error("plaintext of {0} bytes exceeds the block size")]
    PlaintextTooLong(usize),
    /// The ciphertext does not fit into a single block.
    #[error("ciphertext of {0} bytes exceeds the block size")]
    CiphertextTooLong(usize),
    /// The tweak does not fit into a single block.
    #[error("tweak of {0} bytes exceeds the block size")]
    TweakTooLong(usize),
    /// A multi-key must consist of 1 or 2 keys.
    #[error("a multi-key needs 1 or 2 keys, found {0}")]
    InvalidKeyCount(usize),
}

/// The ordered keys (1 or 2) of the input wires of a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiSecretKey {
    /// The key of the only input wire of a 1-input gate.
    Single(Block),
    /// The keys of the left and right input wire of a 2-input gate.
    Pair(Block, Block),
}

impl MultiSecretKey {
    /// Builds a multi-key from a slice of 1 or 2 keys.
    pub fn new(keys: &[Block]) -> Result<Self, Error> {
        match *keys {
            [k] => Ok(Self::Single(k)),
            [a, b] => Ok(Self::Pair(a, b)),
            _ => Err(Error::InvalidKeyCount(keys.len())),
        }
    }

    /// The number of keys.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pair(_, _) => 2,
        }
    }

    /// Always `false`, a multi-key holds at least one key.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Symmetric encryption under the keys of multiple wires plus a tweak.
pub trait MultiKeyEncryptionScheme {
    /// Sets the keys used by subsequent calls to `encrypt`/`decrypt`.
    fn set_key(&mut self, key: MultiSecretKey);

    /// Sets the tweak (at most [`BLOCK_SIZE`] bytes, zero-padded).
    fn set_tweak(&mut self, tweak: &[u8]) -> Result<(), Error>;

    /// Encrypts at most [`BLOCK_SIZE`] bytes.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Decrypts at most [`BLOCK_SIZE`] bytes.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Encrypts a whole block.
    fn encrypt_block(&self, plaintext: Block) -> Result<Block, Error> {
        let ciphertext = self.encrypt(plaintext.as_bytes())?;
        Block::try_from(ciphertext.as_slice()).map_err(|e| Error::CiphertextTooLong(e.0))
    }

    /// Decrypts a whole block.
    fn decrypt_block(&self, ciphertext: Block) -> Result<Block, Error> {
        let plaintext = self.decrypt(ciphertext.as_bytes())?;
        Block::try_from(plaintext.as_slice()).map_err(|e| Error::PlaintextTooLong(e.0))
    }
}

/// Selects the [`MultiKeyEncryptionScheme`] used to garble gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionBackend {
    /// [`FixedKeyEncryption`] with [`FIXED_AES_KEY`].
    #[default]
    FixedKey,
    /// [`HashEncryption`].
    Hash,
}

impl EncryptionBackend {
    /// Instantiates the scheme, in free-XOR mode if `free_xor` is set.
    pub fn scheme(self, free_xor: bool) -> Box<dyn MultiKeyEncryptionScheme + Send + Sync> {
        match self {
            EncryptionBackend::FixedKey => {
                Box::new(FixedKeyEncryption::new(FixedKeyAes::new(FIXED_AES_KEY), free_xor))
            }
            EncryptionBackend::Hash => Box::new(HashEncryption::default()),
        }
    }
}

fn tweak_block(tweak: &[u8]) -> Result<Block, Error> {
    if tweak.len() > BLOCK_SIZE {
        return Err(Error::TweakTooLong(tweak.len()));
    }
    let mut bytes = [0; BLOCK_SIZE];
    bytes[..tweak.len()].copy_from_slice(tweak);
    Ok(Block::new(bytes))
}

fn xor_into(data: &[u8], mask: &[u8]) -> Vec<u8> {
    data.iter().zip(mask).map(|(d, m)| d ^ m).collect()
}

/// `π(K) ⊕ K ⊕ m` using a fixed-key AES permutation `π`.
///
/// In free-XOR mode the keys `a` and `b` of a 2-input gate are combined as `(a << 1) ⊕ (b >> 1)`.
/// A plain `a ⊕ b` would map the rows `(a_0, b_1)` and `(a_1, b_0)` to the same `K`, since both
/// equal `a_0 ⊕ b_0 ⊕ Δ`, and the equal masks would leak Δ to the evaluator.
#[derive(Debug, Clone)]
pub struct FixedKeyEncryption {
    aes: FixedKeyAes,
    free_xor: bool,
    key: Option<MultiSecretKey>,
    tweak: Option<Block>,
}

impl FixedKeyEncryption {
    /// Creates the scheme with an injected fixed-key permutation.
    pub fn new(aes: FixedKeyAes, free_xor: bool) -> Self {
        Self {
            aes,
            free_xor,
            key: None,
            tweak: None,
        }
    }

    fn combined_key(&self) -> Result<Block, Error> {
        let key = self.key.ok_or(Error::KeyNotSet)?;
        let tweak = self.tweak.ok_or(Error::TweakNotSet)?;
        let k = match (key, self.free_xor) {
            (MultiSecretKey::Single(a), false) => a,
            (MultiSecretKey::Pair(a, b), false) => a ^ b,
            (MultiSecretKey::Single(a), true) => a << 1,
            (MultiSecretKey::Pair(a, b), true) => (a << 1) ^ (b >> 1),
        };
        Ok(k ^ tweak)
    }

    fn apply(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let k = self.combined_key()?;
        let mask = self.aes.cr_hash(k);
        Ok(xor_into(data, mask.as_bytes()))
    }
}

impl MultiKeyEncryptionScheme for FixedKeyEncryption {
    fn set_key(&mut self, key: MultiSecretKey) {
        self.key = Some(key);
    }

    fn set_tweak(&mut self, tweak: &[u8]) -> Result<(), Error> {
        self.tweak = Some(tweak_block(tweak)?);
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if plaintext.len() > BLOCK_SIZE {
            return Err(Error::PlaintextTooLong(plaintext.len()));
        }
        self.apply(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() > BLOCK_SIZE {
            return Err(Error::CiphertextTooLong(ciphertext.len()));
        }
        self.apply(ciphertext)
    }
}

/// `H(k_1 ‖ k_2 ‖ tweak) ⊕ m` with BLAKE3 as `H`.
///
/// Concatenation already distinguishes the left from the right key, so no special free-XOR
/// handling is needed.
#[derive(Debug, Clone, Default)]
pub struct HashEncryption {
    key: Option<MultiSecretKey>,
    tweak: Option<Block>,
}

impl HashEncryption {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let key = self.key.ok_or(Error::KeyNotSet)?;
        let tweak = self.tweak.ok_or(Error::TweakNotSet)?;
        let mut hasher = blake3::Hasher::new();
        match key {
            MultiSecretKey::Single(a) => {
                hasher.update(a.as_bytes());
            }
            MultiSecretKey::Pair(a, b) => {
                hasher.update(a.as_bytes());
                hasher.update(b.as_bytes());
            }
        }
        hasher.update(tweak.as_bytes());
        let mut mask = [0u8; BLOCK_SIZE];
        hasher.finalize_xof().fill(&mut mask);
        Ok(xor_into(data, &mask))
    }
}

impl MultiKeyEncryptionScheme for HashEncryption {
    fn set_key(&mut self, key: MultiSecretKey) {
        self.key = Some(key);
    }

    fn set_tweak(&mut self, tweak: &[u8]) -> Result<(), Error> {
        self.tweak = Some(tweak_block(tweak)?);
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if plaintext.len() > BLOCK_SIZE {
            return Err(Error::PlaintextTooLong(plaintext.len()));
        }
        self.apply(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() > BLOCK_SIZE {
            return Err(Error::CiphertextTooLong(ciphertext.len()));
        }
        self.apply(ciphertext)
    }
}

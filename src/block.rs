//! A 128-bit [`Block`], used for wire keys, ciphertext rows and OT messages.
//!
//! All integer conversions use little-endian byte order, so that both parties interpret a block
//! identically regardless of their platform.
use std::{
    fmt,
    ops::{BitXor, BitXorAssign, Shl, Shr},
};

use bytemuck::{Pod, Zeroable};
use rand::{Rng, distr::StandardUniform, prelude::Distribution};
use subtle::ConstantTimeEq;
use thiserror::Error;
use wide::u8x16;

/// A 128-bit block. Uses SIMD operations where available.
///
/// The least significant bit doubles as the point-and-permute signal bit of a wire key.
#[derive(Clone, Copy, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Block(u8x16);

impl Block {
    /// All bits set to 0.
    pub const ZERO: Self = Self(u8x16::ZERO);
    /// Lsb set to 1, all others zero.
    pub const ONE: Self = Self::new(1_u128.to_le_bytes());

    /// 16 bytes in a Block.
    pub const BYTES: usize = 16;
    /// 128 bits in a block.
    pub const BITS: usize = 128;

    /// Create a new block from bytes.
    #[inline]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(u8x16::new(bytes))
    }

    /// Pack two `u64` into a Block, `low` in the first 8 bytes. Usable in const context.
    #[inline]
    pub const fn pack(low: u64, high: u64) -> Self {
        Self::new(((high as u128) << 64 | low as u128).to_le_bytes())
    }

    /// Bytes of the block.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_array_ref()
    }

    /// Least significant bit of the block.
    #[inline]
    pub fn lsb(&self) -> bool {
        self.as_bytes()[0] & 1 == 1
    }

    /// Returns a copy of the block with its least significant bit set to `bit`.
    #[inline]
    pub fn with_lsb(self, bit: bool) -> Self {
        let mut bytes = *self.as_bytes();
        bytes[0] = (bytes[0] & !1) | bit as u8;
        Self::new(bytes)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({:032x})", u128::from(*self))
    }
}

impl BitXor for Block {
    type Output = Self;

    #[inline]
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for Block {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        *self = *self ^ rhs;
    }
}

impl<Rhs> Shl<Rhs> for Block
where
    u128: Shl<Rhs, Output = u128>,
{
    type Output = Block;

    #[inline]
    fn shl(self, rhs: Rhs) -> Self::Output {
        Self::from(u128::from(self) << rhs)
    }
}

impl<Rhs> Shr<Rhs> for Block
where
    u128: Shr<Rhs, Output = u128>,
{
    type Output = Block;

    #[inline]
    fn shr(self, rhs: Rhs) -> Self::Output {
        Self::from(u128::from(self) >> rhs)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for Block {}

impl Distribution<Block> for StandardUniform {
    #[inline]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Block {
        let mut bytes = [0; 16];
        rng.fill_bytes(&mut bytes);
        Block::new(bytes)
    }
}

impl From<[u8; 16]> for Block {
    #[inline]
    fn from(value: [u8; 16]) -> Self {
        Self::new(value)
    }
}

impl From<Block> for [u8; 16] {
    #[inline]
    fn from(value: Block) -> Self {
        *value.as_bytes()
    }
}

impl From<Block> for u128 {
    #[inline]
    fn from(value: Block) -> Self {
        u128::from_le_bytes(*value.as_bytes())
    }
}

impl AsRef<[u8]> for Block {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl AsMut<[u8]> for Block {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }
}

impl From<u128> for Block {
    #[inline]
    fn from(value: u128) -> Self {
        Self::new(value.to_le_bytes())
    }
}

impl From<Block> for aes::Block {
    #[inline]
    fn from(value: Block) -> Self {
        aes::cipher::Array(*value.as_bytes())
    }
}

impl From<aes::Block> for Block {
    #[inline]
    fn from(value: aes::Block) -> Self {
        Self::new(value.0)
    }
}

/// The error returned when converting a slice that is not exactly 16 bytes long.
#[derive(Debug, Error)]
#[error("slice must have length of 16, found {0}")]
pub struct WrongLength(pub usize);

impl TryFrom<&[u8]> for Block {
    type Error = WrongLength;

    #[inline]
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let arr = value.try_into().map_err(|_| WrongLength(value.len()))?;
        Ok(Self::new(arr))
    }
}

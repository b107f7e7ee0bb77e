//! Lets `curve25519-dalek`, which still uses `rand_core` 0.6, sample from our `rand` 0.9 RNGs.
use rand::{CryptoRng, RngCore};

/// Borrows a `rand_core` 0.9 RNG as a [`rand_core_0_6::RngCore`] + [`rand_core_0_6::CryptoRng`].
pub(crate) struct RngCompat<'a, R: ?Sized>(pub(crate) &'a mut R);

impl<R: RngCore + ?Sized> rand_core_0_6::RngCore for RngCompat<'_, R> {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: CryptoRng + ?Sized> rand_core_0_6::CryptoRng for RngCompat<'_, R> {}

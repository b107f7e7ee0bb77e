//! Bit-level helpers shared by the OT implementations.
use std::ops::BitXorAssign;

mod rand_compat;

pub(crate) use rand_compat::RngCompat;

pub(crate) fn xor_inplace<T: Copy + BitXorAssign>(a: &mut [T], b: &[T]) {
    a.iter_mut().zip(b).for_each(|(a, b)| {
        *a ^= *b;
    });
}

#[inline]
fn get_bit(src: &[u8], i: usize) -> bool {
    src[i / 8] & (1 << (i % 8)) != 0
}

#[inline]
fn set_bit(dst: &mut [u8], i: usize, b: bool) {
    if b {
        dst[i / 8] |= 1 << (i % 8);
    } else {
        dst[i / 8] &= !(1 << (i % 8));
    }
}

/// Transposes a row-major bit matrix of `nrows × ncols` bits (LSB-first within each byte).
///
/// Both dimensions must be multiples of 8.
pub(crate) fn transpose(m: &[u8], nrows: usize, ncols: usize) -> Vec<u8> {
    debug_assert_eq!(nrows % 8, 0);
    debug_assert_eq!(ncols % 8, 0);
    debug_assert_eq!(nrows * ncols, m.len() * 8);
    let mut out = vec![0u8; m.len()];
    for i in 0..nrows * ncols {
        let (row, col) = (i / ncols, i % ncols);
        set_bit(&mut out, col * nrows + row, get_bit(m, i));
    }
    out
}

/// Packs bits LSB-first into `bytes` bytes, padding with zeros.
pub(crate) fn boolvec_to_u8vec(bv: &[bool], bytes: usize) -> Vec<u8> {
    let mut v = vec![0u8; bytes.max(bv.len().div_ceil(8))];
    for (i, b) in bv.iter().enumerate() {
        v[i / 8] |= (*b as u8) << (i % 8);
    }
    v
}

/// Unpacks the first `len` bits of `v`, LSB-first.
pub(crate) fn u8vec_to_boolvec(v: &[u8], len: usize) -> Vec<bool> {
    (0..len.min(v.len() * 8)).map(|i| get_bit(v, i)).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arbitrary_bitmat() -> impl Strategy<Value = (Vec<u8>, usize, usize)> {
        (1..16usize, 1..16usize).prop_flat_map(|(rows, cols)| {
            let (rows, cols) = (rows * 8, cols * 8);
            (
                prop::collection::vec(any::<u8>(), rows * cols / 8),
                Just(rows),
                Just(cols),
            )
        })
    }

    proptest! {
        #[test]
        fn double_transpose((m, rows, cols) in arbitrary_bitmat()) {
            let transposed = transpose(&m, rows, cols);
            prop_assert_eq!(transpose(&transposed, cols, rows), m);
        }
    }

    #[test]
    fn packs_bits_lsb_first() {
        let bits = [true, false, true, true, false, false, false, false, true];
        let bytes = boolvec_to_u8vec(&bits, 4);
        assert_eq!(bytes, vec![0b0000_1101, 0b1, 0, 0]);
        assert_eq!(u8vec_to_boolvec(&bytes, bits.len()), bits);
    }

    #[test]
    fn transpose_moves_single_bit() {
        // 8 rows of 16 bits, bit (row 2, col 9)
        let mut m = vec![0u8; 16];
        set_bit(&mut m, 2 * 16 + 9, true);
        let t = transpose(&m, 8, 16);
        for i in 0..128 {
            assert_eq!(get_bit(&t, i), i == 9 * 8 + 2);
        }
    }

    #[test]
    fn xor_slices() {
        let mut a = [1u8, 2, 3];
        xor_inplace(&mut a, &[1, 1, 1]);
        assert_eq!(a, [0, 3, 2]);
    }
}

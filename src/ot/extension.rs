//! Semi-honest IKNP OT extension (<https://www.iacr.org/archive/crypto2003/27290145/27290145.pdf>)
//! with the message layout of ALSZ (<https://eprint.iacr.org/2013/552>).
//!
//! The extension sender acts as receiver of 128 base OTs with a random choice string `s` and
//! learns one seed per column. The extension receiver expands both seeds of column `i` with an
//! AES-CTR PRG and sends `u_i = G(k0_i) ⊕ G(k1_i) ⊕ r`, where `r` packs its choice bits. Row `j`
//! of the transposed matrix is then `t_j` on the receiver side and `q_j = t_j ⊕ σ_j·s` on the
//! sender side, and `H(j, q_j)`, `H(j, q_j ⊕ s)` mask the two messages of OT `j`.
use rand::{CryptoRng, Rng, RngCore, SeedableRng};

use super::{Error, ddh};
use crate::{
    aes_rng::AesRng,
    block::Block,
    channel::{Channel, MsgChannel},
    crypto::FixedKeyAes,
    utils::{boolvec_to_u8vec, transpose, u8vec_to_boolvec, xor_inplace},
};

/// The number of base OTs, which is also the security parameter.
const KAPPA: usize = Block::BITS;

/// The byte length of a matrix column, for `n` OTs padded to whole bytes.
fn row_len(n: usize) -> usize {
    n.div_ceil(8)
}

fn check_msg_len(msg_len: usize) -> Result<(), Error> {
    if msg_len == 0 {
        return Err(Error::LengthMismatch(
            "messages must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// The rows of the transposed matrix, one block per OT.
fn rows(transposed: &[u8], n: usize) -> Vec<Block> {
    bytemuck::pod_collect_to_vec(&transposed[..n * Block::BYTES])
}

pub(super) async fn send<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    x0: &[u8],
    x1: &[u8],
    msg_len: usize,
    rng: &mut R,
) -> Result<(), Error> {
    check_msg_len(msg_len)?;
    if x0.len() != x1.len() || x0.len() % msg_len != 0 {
        return Err(Error::LengthMismatch(format!(
            "buffers of {} and {} bytes for messages of {msg_len} bytes",
            x0.len(),
            x1.len()
        )));
    }
    let n = x0.len() / msg_len;
    let row_len = row_len(n);

    let s: Block = rng.random();
    let s_bits = u8vec_to_boolvec(s.as_bytes(), KAPPA);
    let seeds = ddh::receive_bytes(channel, &s_bits, rng).await?;

    let u: Vec<u8> = channel
        .recv_vec_from("OT extension matrix", KAPPA * row_len)
        .await?;
    let mut q = vec![0u8; KAPPA * row_len];
    if row_len > 0 {
        for (i, (row, seed)) in q.chunks_exact_mut(row_len).zip(&seeds).enumerate() {
            let seed = Block::try_from(seed.as_slice())
                .map_err(|_| Error::CheatAttempt("base OT seed is not a block".to_string()))?;
            AesRng::from_seed(seed).fill_bytes(row);
            if s_bits[i] {
                xor_inplace(row, &u[i * row_len..(i + 1) * row_len]);
            }
        }
    }
    let q = rows(&transpose(&q, KAPPA, row_len * 8), n);

    let aes = FixedKeyAes::default();
    let mut y = vec![0u8; 2 * n * msg_len];
    let (y0, y1) = y.split_at_mut(n * msg_len);
    for (j, qj) in q.into_iter().enumerate() {
        let range = j * msg_len..(j + 1) * msg_len;
        aes.tccr_mask(j as u64, qj, &mut y0[range.clone()]);
        xor_inplace(&mut y0[range.clone()], &x0[range.clone()]);
        aes.tccr_mask(j as u64, qj ^ s, &mut y1[range.clone()]);
        xor_inplace(&mut y1[range.clone()], &x1[range]);
    }
    channel.send_to("OT extension ciphertexts", &y).await?;
    Ok(())
}

pub(super) async fn receive<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    sigma: &[bool],
    msg_len: usize,
    rng: &mut R,
) -> Result<Vec<u8>, Error> {
    check_msg_len(msg_len)?;
    let n = sigma.len();
    let row_len = row_len(n);

    let seeds: Vec<(Block, Block)> = (0..KAPPA).map(|_| (rng.random(), rng.random())).collect();
    let k0: Vec<Vec<u8>> = seeds.iter().map(|(k, _)| k.as_bytes().to_vec()).collect();
    let k1: Vec<Vec<u8>> = seeds.iter().map(|(_, k)| k.as_bytes().to_vec()).collect();
    ddh::send_bytes(channel, &k0, &k1, rng).await?;

    let r = boolvec_to_u8vec(sigma, row_len);
    let mut t = vec![0u8; KAPPA * row_len];
    let mut u = vec![0u8; KAPPA * row_len];
    if row_len > 0 {
        for ((t_row, u_row), (k0, k1)) in t
            .chunks_exact_mut(row_len)
            .zip(u.chunks_exact_mut(row_len))
            .zip(seeds)
        {
            AesRng::from_seed(k0).fill_bytes(t_row);
            AesRng::from_seed(k1).fill_bytes(u_row);
            xor_inplace(u_row, t_row);
            xor_inplace(u_row, &r);
        }
    }
    channel.send_to("OT extension matrix", &u).await?;
    let t = rows(&transpose(&t, KAPPA, row_len * 8), n);

    let y: Vec<u8> = channel
        .recv_vec_from("OT extension ciphertexts", 2 * n * msg_len)
        .await?;
    let aes = FixedKeyAes::default();
    let mut out = vec![0u8; n * msg_len];
    for (j, (tj, &choice)) in t.into_iter().zip(sigma).enumerate() {
        let range = j * msg_len..(j + 1) * msg_len;
        let offset = if choice { n * msg_len } else { 0 };
        aes.tccr_mask(j as u64, tj, &mut out[range.clone()]);
        xor_inplace(
            &mut out[range.clone()],
            &y[offset + range.start..offset + range.end],
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    async fn run(n: usize, msg_len: usize) -> (Vec<u8>, Vec<u8>, Vec<bool>, Vec<u8>) {
        let mut rng = ChaCha20Rng::seed_from_u64(n as u64);
        let mut x0 = vec![0u8; n * msg_len];
        let mut x1 = vec![0u8; n * msg_len];
        rng.fill(&mut x0[..]);
        rng.fill(&mut x1[..]);
        let sigma: Vec<bool> = (0..n).map(|_| rng.random()).collect();
        let (a, b) = SimpleChannel::pair();
        let (mut a, mut b) = (MsgChannel(a), MsgChannel(b));
        let mut rng_b = ChaCha20Rng::seed_from_u64(99);
        let (sent, received) = tokio::join!(
            send(&mut a, &x0, &x1, msg_len, &mut rng),
            receive(&mut b, &sigma, msg_len, &mut rng_b),
        );
        sent.unwrap();
        (x0, x1, sigma, received.unwrap())
    }

    #[tokio::test]
    async fn batch_sizes_that_are_not_byte_aligned() {
        for (n, msg_len) in [(1, 16), (13, 5), (130, 16), (0, 16)] {
            let (x0, x1, sigma, out) = run(n, msg_len).await;
            assert_eq!(out.len(), n * msg_len);
            for (j, b) in sigma.iter().enumerate() {
                let range = j * msg_len..(j + 1) * msg_len;
                let expected = if *b { &x1[range.clone()] } else { &x0[range.clone()] };
                assert_eq!(&out[range], expected);
            }
        }
    }

    #[tokio::test]
    async fn rejects_invalid_lengths() {
        let (mut a, _b) = SimpleChannel::pair();
        let mut a = MsgChannel(&mut a);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert!(matches!(
            send(&mut a, &[0; 10], &[0; 10], 0, &mut rng).await,
            Err(Error::LengthMismatch(_))
        ));
        assert!(matches!(
            send(&mut a, &[0; 10], &[0; 10], 3, &mut rng).await,
            Err(Error::LengthMismatch(_))
        ));
        assert!(matches!(
            send(&mut a, &[0; 10], &[0; 5], 5, &mut rng).await,
            Err(Error::LengthMismatch(_))
        ));
        assert!(matches!(
            receive(&mut a, &[true], 0, &mut rng).await,
            Err(Error::LengthMismatch(_))
        ));
    }
}

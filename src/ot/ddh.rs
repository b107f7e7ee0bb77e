//! Privacy-only OT based on the DDH assumption over the Ristretto group.
//!
//! For each `i` the receiver sends `(x, y, z_0, z_1) = (αG, βG, αβG, γG)` with `z_σ = αβG` and
//! `z_{1-σ} = γG`. The sender re-randomizes both tuples, `w_b = u_b·x + v_b·G` and
//! `k_b = u_b·z_b + v_b·y`, and masks `x_b` with `k_b`. Only `k_σ = β·w_σ` is computable by the
//! receiver, `k_{1-σ}` is uniformly random since `(x, y, z_{1-σ})` is not a DDH tuple.
use curve25519_dalek::{
    RistrettoPoint,
    ristretto::CompressedRistretto,
    scalar::Scalar,
};
use rand::CryptoRng;
use serde::{Deserialize, Serialize};

use super::Error;
use crate::{
    channel::{Channel, MsgChannel},
    utils::{RngCompat, xor_inplace},
};

type Compressed = [u8; 32];

/// The first message, sent by the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Challenge {
    x: Compressed,
    y: Compressed,
    z0: Compressed,
    z1: Compressed,
}

/// The second message, sent by the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reply {
    w0: Compressed,
    c0: Vec<u8>,
    w1: Compressed,
    c1: Vec<u8>,
}

fn decompress(bytes: &Compressed, what: &str) -> Result<RistrettoPoint, Error> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or_else(|| Error::CheatAttempt(format!("{what} is not a valid group element")))
}

fn random_scalar<R: CryptoRng + ?Sized>(rng: &mut R) -> Scalar {
    Scalar::random(&mut RngCompat(rng))
}

/// Derives a `len`-byte mask from the shared group element of OT `index`.
fn kdf(k: &RistrettoPoint, index: usize, len: usize) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_derive_key("yao2pc DDH OT mask derivation");
    hasher.update(k.compress().as_bytes());
    hasher.update(&(index as u64).to_le_bytes());
    let mut mask = vec![0; len];
    hasher.finalize_xof().fill(&mut mask);
    mask
}

/// Receives and checks the challenges, returns `(w_0, w_1)` and `(k_0, k_1)` per OT.
async fn sender_keys<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    n: usize,
    rng: &mut R,
) -> Result<Vec<([Compressed; 2], [RistrettoPoint; 2])>, Error> {
    let challenges: Vec<Challenge> = channel.recv_vec_from("DDH OT challenge", n).await?;
    let mut keys = Vec::with_capacity(n);
    for challenge in challenges {
        let x = decompress(&challenge.x, "x")?;
        let y = decompress(&challenge.y, "y")?;
        let z = [
            decompress(&challenge.z0, "z0")?,
            decompress(&challenge.z1, "z1")?,
        ];
        if z[0] == z[1] {
            return Err(Error::CheatAttempt("z0 equals z1".to_string()));
        }
        let mut w = [[0; 32]; 2];
        let mut k = [RistrettoPoint::default(); 2];
        for b in 0..2 {
            let u = random_scalar(rng);
            let v = random_scalar(rng);
            w[b] = (u * x + RistrettoPoint::mul_base(&v)).compress().to_bytes();
            k[b] = u * z[b] + v * y;
        }
        keys.push((w, k));
    }
    Ok(keys)
}

/// Sends the challenges for `sigma` and returns `β` per OT.
async fn send_challenges<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    sigma: &[bool],
    rng: &mut R,
) -> Result<Vec<Scalar>, Error> {
    let mut betas = Vec::with_capacity(sigma.len());
    let mut challenges = Vec::with_capacity(sigma.len());
    for &choice in sigma {
        let alpha = random_scalar(rng);
        let beta = random_scalar(rng);
        let gamma = random_scalar(rng);
        let ddh = RistrettoPoint::mul_base(&(alpha * beta)).compress().to_bytes();
        let random = RistrettoPoint::mul_base(&gamma).compress().to_bytes();
        let (z0, z1) = if choice { (random, ddh) } else { (ddh, random) };
        challenges.push(Challenge {
            x: RistrettoPoint::mul_base(&alpha).compress().to_bytes(),
            y: RistrettoPoint::mul_base(&beta).compress().to_bytes(),
            z0,
            z1,
        });
        betas.push(beta);
    }
    channel.send_to("DDH OT challenge", &challenges).await?;
    Ok(betas)
}

/// Receives the replies, returns `k_σ` and `c_σ` per OT.
async fn receiver_keys<C: Channel>(
    channel: &mut MsgChannel<C>,
    sigma: &[bool],
    betas: &[Scalar],
) -> Result<Vec<(RistrettoPoint, Vec<u8>)>, Error> {
    let replies: Vec<Reply> = channel.recv_vec_from("DDH OT reply", sigma.len()).await?;
    let mut keys = Vec::with_capacity(sigma.len());
    for ((reply, &choice), beta) in replies.into_iter().zip(sigma).zip(betas) {
        if reply.c0.len() != reply.c1.len() {
            return Err(Error::CheatAttempt(
                "ciphertexts of different lengths".to_string(),
            ));
        }
        let (w, c) = if choice {
            (reply.w1, reply.c1)
        } else {
            (reply.w0, reply.c0)
        };
        keys.push((beta * decompress(&w, "w")?, c));
    }
    Ok(keys)
}

pub(super) async fn send_bytes<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    x0: &[Vec<u8>],
    x1: &[Vec<u8>],
    rng: &mut R,
) -> Result<(), Error> {
    if x0.len() != x1.len() {
        return Err(Error::LengthMismatch(format!(
            "{} messages for 0, {} for 1",
            x0.len(),
            x1.len()
        )));
    }
    if let Some(i) = x0.iter().zip(x1).position(|(a, b)| a.len() != b.len()) {
        return Err(Error::LengthMismatch(format!(
            "messages {i} differ in length"
        )));
    }
    let keys = sender_keys(channel, x0.len(), rng).await?;
    let replies: Vec<Reply> = keys
        .into_iter()
        .zip(x0.iter().zip(x1))
        .enumerate()
        .map(|(i, (([w0, w1], [k0, k1]), (m0, m1)))| {
            let mut c0 = kdf(&k0, i, m0.len());
            xor_inplace(&mut c0, m0);
            let mut c1 = kdf(&k1, i, m1.len());
            xor_inplace(&mut c1, m1);
            Reply { w0, c0, w1, c1 }
        })
        .collect();
    channel.send_to("DDH OT reply", &replies).await?;
    Ok(())
}

pub(super) async fn receive_bytes<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    sigma: &[bool],
    rng: &mut R,
) -> Result<Vec<Vec<u8>>, Error> {
    let betas = send_challenges(channel, sigma, rng).await?;
    let keys = receiver_keys(channel, sigma, &betas).await?;
    Ok(keys
        .into_iter()
        .enumerate()
        .map(|(i, (k, mut c))| {
            let mask = kdf(&k, i, c.len());
            xor_inplace(&mut c, &mask);
            c
        })
        .collect())
}

pub(super) async fn send_points<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    x0: &[RistrettoPoint],
    x1: &[RistrettoPoint],
    rng: &mut R,
) -> Result<(), Error> {
    if x0.len() != x1.len() {
        return Err(Error::LengthMismatch(format!(
            "{} messages for 0, {} for 1",
            x0.len(),
            x1.len()
        )));
    }
    let keys = sender_keys(channel, x0.len(), rng).await?;
    let replies: Vec<Reply> = keys
        .into_iter()
        .zip(x0.iter().zip(x1))
        .map(|(([w0, w1], [k0, k1]), (m0, m1))| Reply {
            w0,
            c0: (m0 + k0).compress().to_bytes().to_vec(),
            w1,
            c1: (m1 + k1).compress().to_bytes().to_vec(),
        })
        .collect();
    channel.send_to("DDH OT reply", &replies).await?;
    Ok(())
}

pub(super) async fn receive_points<C: Channel, R: CryptoRng + ?Sized>(
    channel: &mut MsgChannel<C>,
    sigma: &[bool],
    rng: &mut R,
) -> Result<Vec<RistrettoPoint>, Error> {
    let betas = send_challenges(channel, sigma, rng).await?;
    let keys = receiver_keys(channel, sigma, &betas).await?;
    keys.into_iter()
        .map(|(k, c)| {
            let c: Compressed = c
                .try_into()
                .map_err(|_| Error::CheatAttempt("c is not a group element".to_string()))?;
            Ok(decompress(&c, "c")? - k)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    fn valid_point() -> Compressed {
        RistrettoPoint::mul_base(&Scalar::from(5u64))
            .compress()
            .to_bytes()
    }

    async fn send_with_challenge(challenge: Challenge) -> Error {
        let (a, b) = SimpleChannel::pair();
        let (mut sender, mut cheater) = (MsgChannel(a), MsgChannel(b));
        cheater
            .send_to("DDH OT challenge", &vec![challenge])
            .await
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        send_bytes(&mut sender, &[vec![1; 16]], &[vec![2; 16]], &mut rng)
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn rejects_invalid_group_elements() {
        let err = send_with_challenge(Challenge {
            x: [0xff; 32],
            y: valid_point(),
            z0: valid_point(),
            z1: [7; 32],
        })
        .await;
        assert!(matches!(err, Error::CheatAttempt(_)));
    }

    #[tokio::test]
    async fn rejects_equal_z() {
        let err = send_with_challenge(Challenge {
            x: valid_point(),
            y: valid_point(),
            z0: valid_point(),
            z1: valid_point(),
        })
        .await;
        assert!(matches!(err, Error::CheatAttempt(msg) if msg.contains("z0")));
    }

    #[tokio::test]
    async fn rejects_wrong_number_of_challenges() {
        let (a, b) = SimpleChannel::pair();
        let (mut sender, mut cheater) = (MsgChannel(a), MsgChannel(b));
        cheater
            .send_to("DDH OT challenge", &Vec::<Challenge>::new())
            .await
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let err = send_bytes(&mut sender, &[vec![1; 16]], &[vec![2; 16]], &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CheatAttempt(_)), "{err}");
    }

    #[tokio::test]
    async fn rejects_undecodable_reply() {
        let (a, b) = SimpleChannel::pair();
        let (mut receiver, mut cheater) = (MsgChannel(a), MsgChannel(b));
        cheater
            .send_bytes("DDH OT reply", vec![0xff; 7])
            .await
            .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let err = receive_bytes(&mut receiver, &[false], &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CheatAttempt(_)), "{err}");
    }

    #[tokio::test]
    async fn closed_channel_is_not_a_cheat_attempt() {
        let (a, b) = SimpleChannel::pair();
        drop(b);
        let mut sender = MsgChannel(a);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let err = send_bytes(&mut sender, &[vec![1; 16]], &[vec![2; 16]], &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Channel(_)), "{err}");
    }

    #[tokio::test]
    async fn rejects_uneven_ciphertexts() {
        let (a, b) = SimpleChannel::pair();
        let (mut receiver, mut cheater) = (MsgChannel(a), MsgChannel(b));
        let reply = Reply {
            w0: valid_point(),
            c0: vec![0; 16],
            w1: valid_point(),
            c1: vec![0; 17],
        };
        cheater.send_to("DDH OT reply", &vec![reply]).await.unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let err = receive_bytes(&mut receiver, &[true], &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CheatAttempt(_)));
    }

    #[test]
    fn kdf_separates_indices() {
        let k = RistrettoPoint::mul_base(&Scalar::from(9u64));
        assert_eq!(kdf(&k, 0, 16), kdf(&k, 0, 40)[..16]);
        assert_ne!(kdf(&k, 0, 16), kdf(&k, 1, 16));
    }
}

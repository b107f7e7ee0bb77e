//! Batch 1-out-of-2 oblivious transfer.
//!
//! The sender inputs `N` pairs `(x0[i], x1[i])`, the receiver `N` choice bits `σ[i]` and learns
//! exactly `x_σ[i][i]`. Two backends are available:
//!
//! * [`OtBackend::Ddh`]: privacy-only OT based on the DDH assumption over the Ristretto group,
//!   transferring byte arrays or group elements.
//! * [`OtBackend::Extension`]: semi-honest IKNP OT extension (with the ALSZ message layout),
//!   which runs 128 DDH base OTs and then only symmetric crypto for the whole batch.
use curve25519_dalek::RistrettoPoint;
use rand::CryptoRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, debug, instrument};

use crate::{
    block::Block,
    channel::{self, Channel, MsgChannel},
};

mod ddh;
mod extension;

/// Errors raised during an oblivious transfer.
#[derive(Debug, Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(channel::Error),
    /// The other party sent a malformed message or invalid group element.
    #[error("cheat attempt: {0}")]
    CheatAttempt(String),
    /// The payload variant does not match the backend.
    #[error("the {backend:?} backend does not accept {input} inputs")]
    UnsupportedInput {
        /// The backend of the sender or receiver.
        backend: OtBackend,
        /// The name of the payload variant.
        input: &'static str,
    },
    /// The inputs of the sender are inconsistent.
    #[error("inconsistent OT inputs: {0}")]
    LengthMismatch(String),
    /// An output has an unexpected length.
    #[error("expected {expected} bytes, found {actual}")]
    InvalidLength {
        /// The expected length.
        expected: usize,
        /// The actual length.
        actual: usize,
    },
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        if e.is_malformed_message() {
            Error::CheatAttempt(e.to_string())
        } else {
            Error::Channel(e)
        }
    }
}

/// Selects the OT protocol used to transfer input keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtBackend {
    /// Privacy-only DDH OT, one group operation per transferred message.
    #[default]
    Ddh,
    /// IKNP/ALSZ OT extension on top of 128 DDH base OTs.
    Extension,
}

/// The messages of the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtSenderInput {
    /// Byte arrays, `x0[i]` and `x1[i]` must have the same length. DDH backend only.
    ByteArray {
        /// The messages for choice bit 0.
        x0: Vec<Vec<u8>>,
        /// The messages for choice bit 1.
        x1: Vec<Vec<u8>>,
    },
    /// Group elements. DDH backend only.
    GroupElement {
        /// The messages for choice bit 0.
        x0: Vec<RistrettoPoint>,
        /// The messages for choice bit 1.
        x1: Vec<RistrettoPoint>,
    },
    /// Flat buffers of `N × msg_len` bytes. Extension backend only.
    Extension {
        /// The messages for choice bit 0, concatenated.
        x0: Vec<u8>,
        /// The messages for choice bit 1, concatenated.
        x1: Vec<u8>,
        /// The length of a single message.
        msg_len: usize,
    },
}

/// The choice bits of the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtReceiverInput {
    /// Receive byte arrays. DDH backend only.
    ByteArray {
        /// The choice bits.
        sigma: Vec<bool>,
    },
    /// Receive group elements. DDH backend only.
    GroupElement {
        /// The choice bits.
        sigma: Vec<bool>,
    },
    /// Receive a flat buffer of `N × msg_len` bytes. Extension backend only.
    Extension {
        /// The choice bits.
        sigma: Vec<bool>,
        /// The length of a single message.
        msg_len: usize,
    },
}

/// The messages learned by the receiver, `x_σ[i][i]` for every `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtReceiverOutput {
    /// The chosen byte arrays.
    ByteArray(Vec<Vec<u8>>),
    /// The chosen group elements.
    GroupElement(Vec<RistrettoPoint>),
    /// The chosen messages, concatenated.
    Extension {
        /// `N × msg_len` bytes.
        buffer: Vec<u8>,
        /// The length of a single message.
        msg_len: usize,
    },
}

impl OtSenderInput {
    /// Wraps pairs of blocks in the payload variant of `backend`.
    pub fn from_blocks(backend: OtBackend, pairs: &[(Block, Block)]) -> Self {
        match backend {
            OtBackend::Ddh => Self::ByteArray {
                x0: pairs.iter().map(|(a, _)| a.as_bytes().to_vec()).collect(),
                x1: pairs.iter().map(|(_, b)| b.as_bytes().to_vec()).collect(),
            },
            OtBackend::Extension => Self::Extension {
                x0: pairs.iter().flat_map(|(a, _)| *a.as_bytes()).collect(),
                x1: pairs.iter().flat_map(|(_, b)| *b.as_bytes()).collect(),
                msg_len: Block::BYTES,
            },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ByteArray { .. } => "byte array",
            Self::GroupElement { .. } => "group element",
            Self::Extension { .. } => "extension",
        }
    }
}

impl OtReceiverInput {
    /// Choice bits for receiving blocks in the payload variant of `backend`.
    pub fn for_blocks(backend: OtBackend, sigma: Vec<bool>) -> Self {
        match backend {
            OtBackend::Ddh => Self::ByteArray { sigma },
            OtBackend::Extension => Self::Extension {
                sigma,
                msg_len: Block::BYTES,
            },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ByteArray { .. } => "byte array",
            Self::GroupElement { .. } => "group element",
            Self::Extension { .. } => "extension",
        }
    }
}

impl OtReceiverOutput {
    /// The number of received messages.
    pub fn len(&self) -> usize {
        match self {
            Self::ByteArray(v) => v.len(),
            Self::GroupElement(v) => v.len(),
            Self::Extension { buffer, msg_len } => buffer.len().checked_div(*msg_len).unwrap_or(0),
        }
    }

    /// Whether no message was received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interprets the received messages as blocks.
    pub fn into_blocks(self) -> Result<Vec<Block>, Error> {
        let invalid = |actual: usize| Error::InvalidLength {
            expected: Block::BYTES,
            actual,
        };
        match self {
            Self::ByteArray(v) => v
                .iter()
                .map(|m| Block::try_from(m.as_slice()).map_err(|_| invalid(m.len())))
                .collect(),
            Self::Extension { msg_len, .. } if msg_len != Block::BYTES => Err(invalid(msg_len)),
            Self::Extension { buffer, .. } if buffer.len() % Block::BYTES != 0 => {
                Err(invalid(buffer.len() % Block::BYTES))
            }
            Self::Extension { buffer, .. } => Ok(bytemuck::pod_collect_to_vec(&buffer)),
            Self::GroupElement(_) => Err(Error::UnsupportedInput {
                backend: OtBackend::Ddh,
                input: "group element",
            }),
        }
    }
}

/// The sending side of a batch OT.
#[derive(Debug, Clone, Copy)]
pub struct OtBatchSender {
    backend: OtBackend,
}

impl OtBatchSender {
    /// Creates a sender using the given backend.
    pub fn new(backend: OtBackend) -> Self {
        Self { backend }
    }

    /// Runs a complete batch transfer with the receiver on the other end of `channel`.
    #[instrument(level = Level::DEBUG, skip_all, fields(backend = ?self.backend), err)]
    pub async fn transfer<C: Channel + Send, R: CryptoRng + ?Sized>(
        self,
        channel: &mut C,
        input: &OtSenderInput,
        rng: &mut R,
    ) -> Result<(), Error> {
        let mut channel = MsgChannel(channel);
        match (self.backend, input) {
            (OtBackend::Ddh, OtSenderInput::ByteArray { x0, x1 }) => {
                debug!(n = x0.len(), "DDH OT of byte arrays");
                ddh::send_bytes(&mut channel, x0, x1, rng).await
            }
            (OtBackend::Ddh, OtSenderInput::GroupElement { x0, x1 }) => {
                debug!(n = x0.len(), "DDH OT of group elements");
                ddh::send_points(&mut channel, x0, x1, rng).await
            }
            (OtBackend::Extension, OtSenderInput::Extension { x0, x1, msg_len }) => {
                debug!(bytes = x0.len(), msg_len, "OT extension");
                extension::send(&mut channel, x0, x1, *msg_len, rng).await
            }
            (backend, input) => Err(Error::UnsupportedInput {
                backend,
                input: input.name(),
            }),
        }
    }
}

/// The receiving side of a batch OT.
#[derive(Debug, Clone, Copy)]
pub struct OtBatchReceiver {
    backend: OtBackend,
}

impl OtBatchReceiver {
    /// Creates a receiver using the given backend.
    pub fn new(backend: OtBackend) -> Self {
        Self { backend }
    }

    /// Runs a complete batch transfer with the sender on the other end of `channel`.
    #[instrument(level = Level::DEBUG, skip_all, fields(backend = ?self.backend), err)]
    pub async fn transfer<C: Channel + Send, R: CryptoRng + ?Sized>(
        self,
        channel: &mut C,
        input: &OtReceiverInput,
        rng: &mut R,
    ) -> Result<OtReceiverOutput, Error> {
        let mut channel = MsgChannel(channel);
        match (self.backend, input) {
            (OtBackend::Ddh, OtReceiverInput::ByteArray { sigma }) => {
                debug!(n = sigma.len(), "DDH OT of byte arrays");
                let received = ddh::receive_bytes(&mut channel, sigma, rng).await?;
                Ok(OtReceiverOutput::ByteArray(received))
            }
            (OtBackend::Ddh, OtReceiverInput::GroupElement { sigma }) => {
                debug!(n = sigma.len(), "DDH OT of group elements");
                let received = ddh::receive_points(&mut channel, sigma, rng).await?;
                Ok(OtReceiverOutput::GroupElement(received))
            }
            (OtBackend::Extension, OtReceiverInput::Extension { sigma, msg_len }) => {
                debug!(n = sigma.len(), msg_len, "OT extension");
                let buffer = extension::receive(&mut channel, sigma, *msg_len, rng).await?;
                Ok(OtReceiverOutput::Extension {
                    buffer,
                    msg_len: *msg_len,
                })
            }
            (backend, input) => Err(Error::UnsupportedInput {
                backend,
                input: input.name(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::channel::SimpleChannel;

    /// Records the length of every message sent through the wrapped channel.
    pub(crate) struct RecordingChannel<C> {
        pub(crate) inner: C,
        pub(crate) sent: Arc<Mutex<Vec<usize>>>,
    }

    impl<C: Channel + Send> Channel for RecordingChannel<C> {
        type SendError = C::SendError;
        type RecvError = C::RecvError;

        async fn send_bytes(&mut self, msg: Vec<u8>) -> Result<(), Self::SendError> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(msg.len());
            }
            self.inner.send_bytes(msg).await
        }

        async fn recv_bytes(&mut self) -> Result<Vec<u8>, Self::RecvError> {
            self.inner.recv_bytes().await
        }
    }

    pub(crate) async fn run_ot(
        backend: OtBackend,
        input: &OtSenderInput,
        choices: &OtReceiverInput,
        seed: u64,
    ) -> (Result<(), Error>, Result<OtReceiverOutput, Error>, Vec<usize>) {
        let (a, b) = SimpleChannel::pair();
        let sent = Arc::new(Mutex::new(vec![]));
        let mut a = RecordingChannel {
            inner: a,
            sent: sent.clone(),
        };
        let mut b = RecordingChannel {
            inner: b,
            sent: sent.clone(),
        };
        let mut rng_a = ChaCha20Rng::seed_from_u64(seed);
        let mut rng_b = ChaCha20Rng::seed_from_u64(seed + 1);
        let (s, r) = tokio::join!(
            OtBatchSender::new(backend).transfer(&mut a, input, &mut rng_a),
            OtBatchReceiver::new(backend).transfer(&mut b, choices, &mut rng_b),
        );
        let mut lengths = sent.lock().map(|s| s.clone()).unwrap_or_default();
        lengths.sort_unstable();
        (s, r, lengths)
    }

    fn random_pairs(n: usize, seed: u64) -> Vec<(Block, Block)> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        (0..n).map(|_| (rng.random(), rng.random())).collect()
    }

    #[tokio::test]
    async fn block_transfer_for_both_backends() {
        let pairs = random_pairs(37, 1);
        let sigma: Vec<bool> = (0..pairs.len()).map(|i| i % 3 == 0).collect();
        for backend in [OtBackend::Ddh, OtBackend::Extension] {
            let input = OtSenderInput::from_blocks(backend, &pairs);
            let choices = OtReceiverInput::for_blocks(backend, sigma.clone());
            let (s, r, _) = run_ot(backend, &input, &choices, 2).await;
            s.unwrap();
            let received = r.unwrap().into_blocks().unwrap();
            for ((x0, x1), (b, x)) in pairs.iter().zip(sigma.iter().zip(received)) {
                assert_eq!(x, if *b { *x1 } else { *x0 });
            }
        }
    }

    #[tokio::test]
    async fn flipping_choices_yields_the_other_message() {
        let pairs = random_pairs(8, 3);
        let sigma = vec![true, false, true, true, false, false, true, false];
        let flipped: Vec<bool> = sigma.iter().map(|b| !b).collect();
        for backend in [OtBackend::Ddh, OtBackend::Extension] {
            let input = OtSenderInput::from_blocks(backend, &pairs);
            let (_, r, _) = run_ot(
                backend,
                &input,
                &OtReceiverInput::for_blocks(backend, flipped.clone()),
                4,
            )
            .await;
            let received = r.unwrap().into_blocks().unwrap();
            for ((x0, x1), (b, x)) in pairs.iter().zip(sigma.iter().zip(received)) {
                assert_eq!(x, if *b { *x0 } else { *x1 });
            }
        }
    }

    #[tokio::test]
    async fn byte_arrays_of_different_lengths() {
        let x0 = vec![vec![1u8; 3], vec![2u8; 40], vec![]];
        let x1 = vec![vec![4u8; 3], vec![5u8; 40], vec![]];
        let input = OtSenderInput::ByteArray {
            x0: x0.clone(),
            x1: x1.clone(),
        };
        let choices = OtReceiverInput::ByteArray {
            sigma: vec![false, true, true],
        };
        let (s, r, _) = run_ot(OtBackend::Ddh, &input, &choices, 5).await;
        s.unwrap();
        assert_eq!(
            r.unwrap(),
            OtReceiverOutput::ByteArray(vec![x0[0].clone(), x1[1].clone(), x1[2].clone()])
        );
    }

    #[tokio::test]
    async fn group_elements() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let points = |rng: &mut ChaCha20Rng| -> Vec<RistrettoPoint> {
            (0..4)
                .map(|_| {
                    let mut bytes = [0u8; 64];
                    rng.fill(&mut bytes[..]);
                    RistrettoPoint::from_uniform_bytes(&bytes)
                })
                .collect()
        };
        let x0 = points(&mut rng);
        let x1 = points(&mut rng);
        let input = OtSenderInput::GroupElement {
            x0: x0.clone(),
            x1: x1.clone(),
        };
        let sigma = vec![true, true, false, true];
        let choices = OtReceiverInput::GroupElement {
            sigma: sigma.clone(),
        };
        let (s, r, _) = run_ot(OtBackend::Ddh, &input, &choices, 7).await;
        s.unwrap();
        let OtReceiverOutput::GroupElement(received) = r.unwrap() else {
            panic!("expected group elements");
        };
        for (i, b) in sigma.iter().enumerate() {
            assert_eq!(received[i], if *b { x1[i] } else { x0[i] });
        }
    }

    #[tokio::test]
    async fn extension_with_long_messages() {
        let n = 200;
        let msg_len = 40;
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let mut x0 = vec![0u8; n * msg_len];
        let mut x1 = vec![0u8; n * msg_len];
        rng.fill(&mut x0[..]);
        rng.fill(&mut x1[..]);
        let sigma: Vec<bool> = (0..n).map(|_| rng.random()).collect();
        let input = OtSenderInput::Extension {
            x0: x0.clone(),
            x1: x1.clone(),
            msg_len,
        };
        let choices = OtReceiverInput::Extension {
            sigma: sigma.clone(),
            msg_len,
        };
        let (s, r, lengths) = run_ot(OtBackend::Extension, &input, &choices, 9).await;
        s.unwrap();
        assert_eq!(lengths.len(), 4);
        let OtReceiverOutput::Extension { buffer, .. } = r.unwrap() else {
            panic!("expected an extension output");
        };
        for (i, b) in sigma.iter().enumerate() {
            let expected = if *b { &x1 } else { &x0 };
            let range = i * msg_len..(i + 1) * msg_len;
            assert_eq!(buffer[range.clone()], expected[range]);
        }
    }

    #[tokio::test]
    async fn transcript_length_is_independent_of_choices() {
        let pairs = random_pairs(20, 10);
        for backend in [OtBackend::Ddh, OtBackend::Extension] {
            let input = OtSenderInput::from_blocks(backend, &pairs);
            let mut transcripts = vec![];
            for sigma in [vec![false; 20], vec![true; 20], (0..20).map(|i| i % 2 == 1).collect()] {
                let choices = OtReceiverInput::for_blocks(backend, sigma);
                let (s, r, lengths) = run_ot(backend, &input, &choices, 11).await;
                s.unwrap();
                r.unwrap();
                transcripts.push(lengths);
            }
            assert_eq!(transcripts[0], transcripts[1]);
            assert_eq!(transcripts[0], transcripts[2]);
        }
    }

    #[tokio::test]
    async fn rejects_mismatched_payloads() {
        let pairs = random_pairs(2, 12);
        let input = OtSenderInput::from_blocks(OtBackend::Extension, &pairs);
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let (mut a, _b) = SimpleChannel::pair();
        let err = OtBatchSender::new(OtBackend::Ddh)
            .transfer(&mut a, &input, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedInput {
                backend: OtBackend::Ddh,
                input: "extension"
            }
        ));

        let choices = OtReceiverInput::ByteArray { sigma: vec![true] };
        let err = OtBatchReceiver::new(OtBackend::Extension)
            .transfer(&mut a, &choices, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput { .. }));

        let uneven = OtSenderInput::ByteArray {
            x0: vec![vec![0; 16]],
            x1: vec![vec![0; 15]],
        };
        let err = OtBatchSender::new(OtBackend::Ddh)
            .transfer(&mut a, &uneven, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LengthMismatch(_)));
    }
}

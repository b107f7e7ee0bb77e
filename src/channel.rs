//! A communication channel used to send/receive messages to/from the other party.

use std::{fmt, future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::mpsc::{Receiver, Sender, channel, error::SendError},
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel error while {}: {:?}", self.phase, self.reason)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether a message was received but could not be decoded or had an unexpected length.
    ///
    /// Transport failures (closed channels, timeouts) and failures while sending return `false`.
    pub fn is_malformed_message(&self) -> bool {
        match self.reason {
            ErrorKind::InvalidLength => true,
            ErrorKind::SerdeError(_) => self.phase.starts_with("receiving "),
            ErrorKind::RecvError(_) | ErrorKind::SendError(_) => false,
        }
    }
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The message could not be received over the channel.
    RecvError(String),
    /// The message could not be sent over the channel.
    SendError(String),
    /// The message could not be (de-)serialized.
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength,
}

/// A reliable, ordered, message-oriented connection to the other party.
///
/// Every `send_bytes` on one side is matched by exactly one `recv_bytes` on the other side, which
/// returns the same bytes.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the other party.
    fn send_bytes(
        &mut self,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits the next message from the other party.
    fn recv_bytes(&mut self) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

impl<C: Channel + Send> Channel for &mut C {
    type SendError = C::SendError;
    type RecvError = C::RecvError;

    fn send_bytes(
        &mut self,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send {
        (**self).send_bytes(msg)
    }

    fn recv_bytes(&mut self) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send {
        (**self).recv_bytes()
    }
}

/// A wrapper around [`Channel`] that attaches the protocol phase to errors and takes care of
/// (de-)serializing messages.
#[derive(Debug)]
pub(crate) struct MsgChannel<C: Channel>(pub C);

impl<C: Channel> MsgChannel<C> {
    /// Sends an already encoded message.
    pub(crate) async fn send_bytes(&mut self, phase: &str, msg: Vec<u8>) -> Result<(), Error> {
        trace!(phase, bytes = msg.len(), "sending message");
        self.0.send_bytes(msg).await.map_err(|e| Error {
            phase: format!("sending {phase}"),
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
    }

    /// Receives a message without decoding it.
    pub(crate) async fn recv_bytes(&mut self, phase: &str) -> Result<Vec<u8>, Error> {
        let msg = self.0.recv_bytes().await.map_err(|e| Error {
            phase: format!("receiving {phase}"),
            reason: ErrorKind::RecvError(format!("{e:?}")),
        })?;
        trace!(phase, bytes = msg.len(), "received message");
        Ok(msg)
    }

    /// Serializes and sends a message to the other party.
    pub(crate) async fn send_to(&mut self, phase: &str, msg: &impl Serialize) -> Result<(), Error> {
        let msg = bincode::serialize(msg).map_err(|e| Error {
            phase: format!("sending {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })?;
        self.send_bytes(phase, msg).await
    }

    /// Receives and deserializes a message from the other party.
    pub(crate) async fn recv_from<T: DeserializeOwned>(&mut self, phase: &str) -> Result<T, Error> {
        let msg = self.recv_bytes(phase).await?;
        bincode::deserialize(&msg).map_err(|e| Error {
            phase: format!("receiving {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })
    }

    /// Receives and deserializes a Vec from the other party (while checking the length).
    pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
        &mut self,
        phase: &str,
        len: usize,
    ) -> Result<Vec<T>, Error> {
        let v: Vec<T> = self.recv_from(phase).await?;
        if v.len() == len {
            Ok(v)
        } else {
            Err(Error {
                phase: format!("receiving {phase}"),
                reason: ErrorKind::InvalidLength,
            })
        }
    }
}

/// An in-memory channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Sender<Vec<u8>>,
    r: Receiver<Vec<u8>>,
}

impl SimpleChannel {
    /// Creates the two connected ends of a channel.
    pub fn pair() -> (Self, Self) {
        let buffer_capacity = 1024;
        let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
        let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
        (
            SimpleChannel {
                s: send_a_to_b,
                r: recv_b_to_a,
            },
            SimpleChannel {
                s: send_b_to_a,
                r: recv_a_to_b,
            },
        )
    }
}

#[derive(Debug)]
/// The error raised by `recv` calls of a [`SimpleChannel`].
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = SendError<Vec<u8>>;
    type RecvError = AsyncRecvError;

    async fn send_bytes(&mut self, msg: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        self.s.send(msg).await
    }

    async fn recv_bytes(&mut self) -> Result<Vec<u8>, AsyncRecvError> {
        match timeout(Duration::from_secs(10 * 60), self.r.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

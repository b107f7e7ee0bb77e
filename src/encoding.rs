//! Explicit binary encoding of the messages exchanged between garbler and evaluator.
//!
//! Every message starts with a one-byte tag naming its type, followed by a little-endian `u32`
//! entry count and the entries. Decoding checks the tag, all lengths and rejects trailing bytes,
//! so that a message of the wrong type or shape never decodes successfully.
use thiserror::Error;

use crate::block::Block;

/// Tag of an encoded [`crate::garble::GarbledTables`].
pub const TAG_GARBLED_TABLES: u8 = b'G';
/// Tag of an encoded [`crate::garble::TranslationTable`].
pub const TAG_TRANSLATION_TABLE: u8 = b'T';
/// Tag of an encoded list of input keys.
pub const TAG_KEY_LIST: u8 = b'K';

/// Errors raised while decoding a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The message is of a different type than expected.
    #[error("expected message tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag {
        /// The tag of the expected message type.
        expected: u8,
        /// The tag found in the message.
        found: u8,
    },
    /// The message ended early.
    #[error("message truncated")]
    Truncated,
    /// The message is longer than its entries.
    #[error("{0} trailing bytes after the message")]
    TrailingBytes(usize),
    /// A value is out of range for its field.
    #[error("invalid value {value} for {field}")]
    InvalidValue {
        /// The name of the field.
        field: &'static str,
        /// The offending value.
        value: u64,
    },
}

/// Appends fields to a message.
///
/// Counts and indices are written as `u32`. [`BooleanCircuit::new`](crate::circuit::BooleanCircuit::new)
/// bounds gate and wire indices below `u32::MAX`.
pub(crate) struct Writer(Vec<u8>);

impl Writer {
    pub(crate) fn new(tag: u8, entries: usize) -> Self {
        let mut bytes = Vec::with_capacity(5 + entries * Block::BYTES);
        bytes.push(tag);
        debug_assert!(u32::try_from(entries).is_ok());
        bytes.extend((entries as u32).to_le_bytes());
        Self(bytes)
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.0.push(value);
    }

    pub(crate) fn u32(&mut self, value: usize) {
        debug_assert!(u32::try_from(value).is_ok());
        self.0.extend((value as u32).to_le_bytes());
    }

    pub(crate) fn block(&mut self, block: &Block) {
        self.0.extend(block.as_bytes());
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.0
    }
}

/// Reads fields from a message.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Checks the tag and returns the reader together with the entry count.
    pub(crate) fn new(bytes: &'a [u8], tag: u8) -> Result<(Self, usize), DecodeError> {
        let (&found, rest) = bytes.split_first().ok_or(DecodeError::Truncated)?;
        if found != tag {
            return Err(DecodeError::UnexpectedTag {
                expected: tag,
                found,
            });
        }
        let mut reader = Self { bytes: rest };
        let entries = reader.u32()?;
        Ok((reader, entries))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.bytes.len() < n {
            return Err(DecodeError::Truncated);
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<usize, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    pub(crate) fn block(&mut self) -> Result<Block, DecodeError> {
        let bytes = self.take(Block::BYTES)?;
        Block::try_from(bytes).map_err(|_| DecodeError::Truncated)
    }

    /// Fails unless all bytes were consumed.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        match self.bytes.len() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// Encodes an ordered list of wire keys.
pub fn encode_keys(keys: &[Block]) -> Vec<u8> {
    let mut w = Writer::new(TAG_KEY_LIST, keys.len());
    for key in keys {
        w.block(key);
    }
    w.finish()
}

/// Decodes an ordered list of wire keys.
pub fn decode_keys(bytes: &[u8]) -> Result<Vec<Block>, DecodeError> {
    let (mut r, n) = Reader::new(bytes, TAG_KEY_LIST)?;
    // the count is untrusted, never reserve more than the message can hold
    let mut keys = Vec::with_capacity(n.min(bytes.len() / Block::BYTES));
    for _ in 0..n {
        keys.push(r.block()?);
    }
    r.finish()?;
    Ok(keys)
}

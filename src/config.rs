//! Protocol configuration and plaintext input files.
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{encryption::EncryptionBackend, ot::OtBackend};

/// The parameters both parties must agree on before running the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// The scheme used to encrypt garbled table rows.
    pub encryption: EncryptionBackend,
    /// The OT used to transfer the evaluator's input keys.
    pub ot: OtBackend,
    /// Whether to garble with a global offset Δ, which makes XOR/XNOR gates free.
    pub free_xor: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            encryption: EncryptionBackend::default(),
            ot: OtBackend::default(),
            free_xor: true,
        }
    }
}

impl ProtocolConfig {
    /// Sets the encryption backend.
    pub fn with_encryption(mut self, encryption: EncryptionBackend) -> Self {
        self.encryption = encryption;
        self
    }

    /// Sets the OT backend.
    pub fn with_ot(mut self, ot: OtBackend) -> Self {
        self.ot = ot;
        self
    }

    /// Enables or disables free-XOR garbling.
    pub fn with_free_xor(mut self, free_xor: bool) -> Self {
        self.free_xor = free_xor;
        self
    }
}

/// Errors raised while reading plaintext input bits.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file could not be read.
    #[error("could not read input file: {0}")]
    Io(#[from] std::io::Error),
    /// The first line is not a count.
    #[error("the first line must contain the number of input bits")]
    MissingCount,
    /// A line does not contain `0` or `1`.
    #[error("line {line}: expected 0 or 1, found '{found}'")]
    InvalidBit {
        /// The 1-based line number.
        line: usize,
        /// The offending content.
        found: String,
    },
    /// The number of bits does not match the declared count.
    #[error("expected {expected} input bits, found {actual}")]
    CountMismatch {
        /// The count on the first line.
        expected: usize,
        /// The number of bits found.
        actual: usize,
    },
}

/// Parses plaintext inputs: the first line holds the count, each further line a `0` or `1`.
///
/// Blank lines are ignored.
pub fn parse_input_bits(text: &str) -> Result<Vec<bool>, InputError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());
    let expected: usize = lines
        .next()
        .and_then(|(_, l)| l.parse().ok())
        .ok_or(InputError::MissingCount)?;
    let bits = lines
        .map(|(line, l)| match l {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(InputError::InvalidBit {
                line,
                found: l.to_string(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if bits.len() != expected {
        return Err(InputError::CountMismatch {
            expected,
            actual: bits.len(),
        });
    }
    Ok(bits)
}

/// Reads an input file, see [`parse_input_bits`].
pub fn read_input_bits(path: impl AsRef<Path>) -> Result<Vec<bool>, InputError> {
    parse_input_bits(&fs::read_to_string(path)?)
}

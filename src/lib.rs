//! Semi-honest secure two-party computation with Yao's garbled circuits.
//!
//! Party one (the garbler) and party two (the evaluator) each hold private input bits for a shared
//! [`circuit::BooleanCircuit`]. The garbler encrypts every gate, sends the garbled tables together
//! with the keys encoding its own inputs, and obliviously transfers the keys encoding the
//! evaluator's inputs. The evaluator decrypts exactly one row per gate and learns the output, and
//! nothing else.
//!
//! ## Main Components
//!
//! * [`garble`]: garbling and evaluation with point-and-permute and optional free-XOR.
//! * [`encryption`]: the [`encryption::MultiKeyEncryptionScheme`] used for table rows, based on
//!   fixed-key AES or BLAKE3.
//! * [`ot`]: batch 1-out-of-2 oblivious transfer, either DDH-based or IKNP OT extension.
//! * [`protocol`]: [`protocol::PartyOne`] and [`protocol::PartyTwo`], which run the protocol over
//!   a [`channel::Channel`].
//!
//! ## Example
//!
//! ```
//! use yao2pc::{
//!     circuit::{BooleanCircuit, Gate},
//!     config::ProtocolConfig,
//!     protocol::simulate_yao,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let circuit = BooleanCircuit::new(
//!     vec![0],
//!     vec![1],
//!     vec![Gate::new(&[0, 1], 2, &Gate::AND)],
//!     vec![2],
//! )?;
//! let output = simulate_yao(&circuit, &[true], &[true], ProtocolConfig::default())?;
//! assert_eq!(output, vec![true]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! Both parties are assumed to follow the protocol (semi-honest security). The evaluator checks
//! the shape of every message it receives and aborts with a cheat-attempt error on mismatches, but
//! a malicious garbler can still garble a different function.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod aes_rng;
pub mod block;
pub mod channel;
pub mod circuit;
pub mod config;
mod crypto;
pub mod encoding;
pub mod encryption;
pub mod garble;
pub mod ot;
pub mod protocol;
mod utils;

pub use crypto::{FIXED_AES_KEY, FixedKeyAes};

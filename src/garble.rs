//! Garbling and evaluation of a [`BooleanCircuit`].
//!
//! Every wire gets two keys, one per bit. Keys of the same wire always have different
//! least-significant bits (the signal bit), which selects the table row the evaluator decrypts
//! (point-and-permute). With free-XOR all key pairs share the global offset Δ and XOR/XNOR gates
//! need no table at all.
use std::collections::{BTreeMap, BTreeSet};

use rand::{CryptoRng, Rng};
use thiserror::Error;
use tracing::{Level, debug, instrument};

use crate::{
    block::Block,
    circuit::{BooleanCircuit, Gate},
    config::ProtocolConfig,
    encoding::{DecodeError, Reader, TAG_GARBLED_TABLES, TAG_TRANSLATION_TABLE, Writer},
    encryption::{self, MultiKeyEncryptionScheme, MultiSecretKey},
};

/// Errors raised while garbling or evaluating a circuit.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state of the circuit.
        state: State,
    },
    /// A wire that is needed for evaluation has no key.
    #[error("no key was set for input wire {0}")]
    NotAllInputsSet(usize),
    /// A key was provided for a wire that is not an input wire.
    #[error("wire {0} is not an input wire")]
    NotAnInputWire(usize),
    /// A key was provided twice for the same wire.
    #[error("a key was already set for wire {0}")]
    KeyAlreadySet(usize),
    /// An output wire has no key to translate.
    #[error("no key for output wire {0}")]
    MissingOutputKey(usize),
    /// Data received from the garbler does not match the circuit.
    #[error("cheat attempt: {0}")]
    CheatAttempt(String),
    /// The encryption scheme failed.
    #[error(transparent)]
    Encryption(#[from] encryption::Error),
}

/// The lifecycle of a [`GarbledCircuit`].
///
/// The garbler goes from `Created` to `Garbled`. The evaluator goes from `Created` through
/// `TablesSet`, `InputsSet` and `Computed` to `Translated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing has happened yet.
    Created,
    /// Keys and tables were generated.
    Garbled,
    /// The evaluator received the garbled tables.
    TablesSet,
    /// The evaluator holds one key for each input wire.
    InputsSet,
    /// The evaluator holds one key for each output wire.
    Computed,
    /// The output keys were translated to bits.
    Translated,
}

/// The global free-XOR offset, `k_1 = k_0 ⊕ Δ` for every wire.
///
/// Its least-significant bit is always set, so `k_0` and `k_1` have different signal bits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Delta(Block);

impl Delta {
    /// Samples a fresh offset.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.random::<Block>().with_lsb(true))
    }

    /// The offset as a block.
    pub fn as_block(&self) -> Block {
        self.0
    }
}

impl std::fmt::Debug for Delta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Delta(..)")
    }
}

/// The encrypted rows of every gate that needs a table, keyed by gate index.
///
/// Row `2·lsb(k_a) + lsb(k_b)` (or `lsb(k_a)` for 1-input gates) encrypts the output key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbledTables {
    tables: BTreeMap<usize, Vec<Block>>,
}

impl GarbledTables {
    /// The rows of a gate, `None` if the gate has no table.
    pub fn get(&self, gate: usize) -> Option<&[Block]> {
        self.tables.get(&gate).map(Vec::as_slice)
    }

    /// The number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no gate has a table, e.g. for circuits of XOR gates under free-XOR.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Gate indices and rows in ascending gate order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[Block])> {
        self.tables.iter().map(|(&g, rows)| (g, rows.as_slice()))
    }

    /// Encodes the tables: per table the gate index, the row count and the rows.
    pub fn to_bytes(&self) -> Vec<u8> {
        let rows: usize = self.tables.values().map(Vec::len).sum();
        let mut w = Writer::new(TAG_GARBLED_TABLES, self.tables.len());
        w.reserve(rows * Block::BYTES);
        for (&gate, rows) in &self.tables {
            w.u32(gate);
            // 2 or 4 rows, checked by `from_bytes` and produced by `garble`
            w.u8(rows.len() as u8);
            for row in rows {
                w.block(row);
            }
        }
        w.finish()
    }

    /// Decodes tables encoded by [`GarbledTables::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (mut r, n) = Reader::new(bytes, TAG_GARBLED_TABLES)?;
        let mut tables = BTreeMap::new();
        for _ in 0..n {
            let gate = r.u32()?;
            let len = r.u8()?;
            if len != 2 && len != 4 {
                return Err(DecodeError::InvalidValue {
                    field: "row count",
                    value: len as u64,
                });
            }
            let rows = (0..len).map(|_| r.block()).collect::<Result<Vec<_>, _>>()?;
            if tables.insert(gate, rows).is_some() {
                return Err(DecodeError::InvalidValue {
                    field: "gate index",
                    value: gate as u64,
                });
            }
        }
        r.finish()?;
        Ok(Self { tables })
    }
}

/// The signal bit of `k_0` for every output wire, keyed by wire.
///
/// The output bit of key `k` is `lsb(k) ⊕ t`. The table reveals nothing about other wires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    bits: BTreeMap<usize, bool>,
}

impl TranslationTable {
    /// The entry of an output wire.
    pub fn get(&self, wire: usize) -> Option<bool> {
        self.bits.get(&wire).copied()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Translates an output key to its bit.
    pub fn translate(&self, wire: usize, key: Block) -> Option<bool> {
        self.get(wire).map(|t| key.lsb() ^ t)
    }

    /// Encodes the table: per entry the wire and the bit.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new(TAG_TRANSLATION_TABLE, self.bits.len());
        for (&wire, &bit) in &self.bits {
            w.u32(wire);
            w.u8(bit as u8);
        }
        w.finish()
    }

    /// Decodes a table encoded by [`TranslationTable::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (mut r, n) = Reader::new(bytes, TAG_TRANSLATION_TABLE)?;
        let mut bits = BTreeMap::new();
        for _ in 0..n {
            let wire = r.u32()?;
            let bit = match r.u8()? {
                0 => false,
                1 => true,
                b => {
                    return Err(DecodeError::InvalidValue {
                        field: "translation bit",
                        value: b as u64,
                    });
                }
            };
            if bits.insert(wire, bit).is_some() {
                return Err(DecodeError::InvalidValue {
                    field: "output wire",
                    value: wire as u64,
                });
            }
        }
        r.finish()?;
        Ok(Self { bits })
    }
}

/// The secrets the garbler keeps: both keys of every input wire (and Δ under free-XOR).
///
/// Never sent over the network as a whole, only single keys are released.
#[derive(Clone)]
pub struct CircuitCreationValues {
    input_keys: BTreeMap<usize, (Block, Block)>,
    delta: Option<Delta>,
}

impl std::fmt::Debug for CircuitCreationValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitCreationValues")
            .field("input_wires", &self.input_keys.len())
            .field("free_xor", &self.delta.is_some())
            .finish()
    }
}

impl CircuitCreationValues {
    /// `(k_0, k_1)` of an input wire.
    pub fn keys(&self, wire: usize) -> Option<(Block, Block)> {
        self.input_keys.get(&wire).copied()
    }

    /// The key encoding `bit` on an input wire.
    pub fn key(&self, wire: usize, bit: bool) -> Option<Block> {
        self.keys(wire).map(|(k0, k1)| if bit { k1 } else { k0 })
    }

    /// The keys encoding `bits` on `wires`, in order.
    pub fn select(&self, wires: &[usize], bits: &[bool]) -> Result<Vec<Block>, Error> {
        wires
            .iter()
            .zip(bits)
            .map(|(&w, &b)| self.key(w, b).ok_or(Error::NotAnInputWire(w)))
            .collect()
    }

    /// The global offset, if the circuit was garbled with free-XOR.
    pub fn delta(&self) -> Option<Delta> {
        self.delta
    }
}

/// A circuit that is garbled (by party 1) or evaluated (by party 2).
pub struct GarbledCircuit<'c> {
    circuit: &'c BooleanCircuit,
    scheme: Box<dyn MultiKeyEncryptionScheme + Send + Sync>,
    free_xor: bool,
    state: State,
    tables: Option<GarbledTables>,
    translation: Option<TranslationTable>,
    keys: Vec<Option<Block>>,
}

impl std::fmt::Debug for GarbledCircuit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbledCircuit")
            .field("gates", &self.circuit.gates().len())
            .field("free_xor", &self.free_xor)
            .field("state", &self.state)
            .finish()
    }
}

impl<'c> GarbledCircuit<'c> {
    /// Creates a garbled circuit for the configured encryption scheme and garbling mode.
    pub fn new(circuit: &'c BooleanCircuit, config: &ProtocolConfig) -> Self {
        Self {
            circuit,
            scheme: config.encryption.scheme(config.free_xor),
            free_xor: config.free_xor,
            state: State::Created,
            tables: None,
            translation: None,
            keys: vec![None; circuit.num_wires()],
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The underlying circuit.
    pub fn circuit(&self) -> &'c BooleanCircuit {
        self.circuit
    }

    fn expect_state(&self, operation: &'static str, allowed: &[State]) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn has_table(&self, gate: &Gate) -> bool {
        !(self.free_xor && gate.is_linear())
    }

    /// Generates fresh wire keys and the tables of all gates.
    ///
    /// Can only be called once, a new run needs a new `GarbledCircuit`.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub fn garble<R: CryptoRng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<CircuitCreationValues, Error> {
        self.expect_state("garble", &[State::Created])?;
        let circuit = self.circuit;
        let delta = self.free_xor.then(|| Delta::random(rng));
        let mut pairs: Vec<Option<(Block, Block)>> = vec![None; circuit.num_wires()];
        let mut input_keys = BTreeMap::new();
        for w in circuit.all_input_wires() {
            let pair = fresh_pair(rng, delta);
            pairs[w] = Some(pair);
            input_keys.insert(w, pair);
        }

        let mut tables = BTreeMap::new();
        for gate in circuit.gates() {
            let inputs = gate
                .inputs
                .iter()
                .map(|&w| pairs[w].ok_or(Error::NotAllInputsSet(w)))
                .collect::<Result<Vec<_>, _>>()?;
            let out = match delta {
                Some(delta) if gate.is_linear() => {
                    let mut k0 = inputs[0].0 ^ inputs[1].0;
                    if gate.truth_table == Gate::XNOR {
                        k0 ^= delta.0;
                    }
                    (k0, k0 ^ delta.0)
                }
                _ => {
                    let out = fresh_pair(rng, delta);
                    tables.insert(gate.index, self.garble_gate(gate, &inputs, out)?);
                    out
                }
            };
            pairs[gate.output] = Some(out);
        }

        let mut bits = BTreeMap::new();
        for &w in circuit.output_wires() {
            let (k0, _) = pairs[w].ok_or(Error::MissingOutputKey(w))?;
            bits.insert(w, k0.lsb());
        }
        debug!(tables = tables.len(), "garbled circuit");
        self.tables = Some(GarbledTables { tables });
        self.translation = Some(TranslationTable { bits });
        self.state = State::Garbled;
        Ok(CircuitCreationValues { input_keys, delta })
    }

    fn garble_gate(
        &mut self,
        gate: &Gate,
        inputs: &[(Block, Block)],
        out: (Block, Block),
    ) -> Result<Vec<Block>, Error> {
        let arity = inputs.len();
        let mut rows = vec![Block::ZERO; 1 << arity];
        self.scheme.set_tweak(&(gate.index as u64).to_le_bytes())?;
        for (combination, &output_bit) in gate.truth_table.iter().enumerate() {
            // combination `2a + b` uses k_a of the left and k_b of the right input
            let keys: Vec<Block> = inputs
                .iter()
                .enumerate()
                .map(|(i, &(k0, k1))| {
                    if (combination >> (arity - 1 - i)) & 1 == 1 {
                        k1
                    } else {
                        k0
                    }
                })
                .collect();
            self.scheme.set_key(MultiSecretKey::new(&keys)?);
            let out_key = if output_bit { out.1 } else { out.0 };
            rows[row_position(&keys)] = self.scheme.encrypt_block(out_key)?;
        }
        Ok(rows)
    }

    /// The garbled tables, available after garbling or after they were set.
    pub fn garbled_tables(&self) -> Result<&GarbledTables, Error> {
        self.tables.as_ref().ok_or(Error::InvalidState {
            operation: "read the garbled tables",
            state: self.state,
        })
    }

    /// The translation table, available after garbling or after it was set.
    pub fn translation_table(&self) -> Result<&TranslationTable, Error> {
        self.translation.as_ref().ok_or(Error::InvalidState {
            operation: "read the translation table",
            state: self.state,
        })
    }

    /// Installs the tables received from the garbler.
    ///
    /// Fails with [`Error::CheatAttempt`] unless every gate that needs a table has exactly one
    /// with `2^arity` rows, and no other gate has one.
    pub fn set_garbled_tables(&mut self, tables: GarbledTables) -> Result<(), Error> {
        self.expect_state("set the garbled tables", &[State::Created])?;
        let mut expected = 0;
        for gate in self.circuit.gates() {
            match (self.has_table(gate), tables.get(gate.index)) {
                (false, None) => {}
                (false, Some(_)) => {
                    return Err(Error::CheatAttempt(format!(
                        "unexpected table for free gate {}",
                        gate.index
                    )));
                }
                (true, None) => {
                    return Err(Error::CheatAttempt(format!(
                        "missing table for gate {}",
                        gate.index
                    )));
                }
                (true, Some(rows)) if rows.len() != 1 << gate.inputs.len() => {
                    return Err(Error::CheatAttempt(format!(
                        "table of gate {} has {} rows",
                        gate.index,
                        rows.len()
                    )));
                }
                (true, Some(_)) => expected += 1,
            }
        }
        if tables.len() != expected {
            return Err(Error::CheatAttempt(format!(
                "{} tables for unknown gates",
                tables.len() - expected
            )));
        }
        self.tables = Some(tables);
        self.state = State::TablesSet;
        Ok(())
    }

    /// Installs the translation table received from the garbler.
    ///
    /// Fails with [`Error::CheatAttempt`] unless it has exactly one entry per output wire.
    pub fn set_translation_table(&mut self, table: TranslationTable) -> Result<(), Error> {
        self.expect_state(
            "set the translation table",
            &[State::Created, State::TablesSet],
        )?;
        if self.translation.is_some() {
            return Err(Error::InvalidState {
                operation: "set the translation table twice",
                state: self.state,
            });
        }
        let outputs = self.circuit.output_wires();
        let mut distinct = outputs.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        if table.len() != distinct.len() || outputs.iter().any(|&w| table.get(w).is_none()) {
            return Err(Error::CheatAttempt(
                "translation table does not match the output wires".to_string(),
            ));
        }
        self.translation = Some(table);
        Ok(())
    }

    /// Sets the evaluator's keys of (some of the) input wires.
    ///
    /// Either all keys are set or, on error, none of them.
    pub fn set_inputs(
        &mut self,
        inputs: impl IntoIterator<Item = (usize, Block)>,
    ) -> Result<(), Error> {
        self.expect_state("set inputs", &[State::TablesSet, State::InputsSet])?;
        let inputs: Vec<(usize, Block)> = inputs.into_iter().collect();
        let mut seen = BTreeSet::new();
        for &(wire, _) in &inputs {
            if !self.circuit.is_input_wire(wire) {
                return Err(Error::NotAnInputWire(wire));
            }
            if self.keys[wire].is_some() || !seen.insert(wire) {
                return Err(Error::KeyAlreadySet(wire));
            }
        }
        for (wire, key) in inputs {
            self.keys[wire] = Some(key);
        }
        self.state = State::InputsSet;
        Ok(())
    }

    /// The key the evaluator holds for a wire.
    pub fn wire_key(&self, wire: usize) -> Option<Block> {
        self.keys.get(wire).copied().flatten()
    }

    /// Evaluates all gates in order and returns the key of every output wire.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub fn compute(&mut self) -> Result<BTreeMap<usize, Block>, Error> {
        self.expect_state("compute", &[State::TablesSet, State::InputsSet])?;
        let circuit = self.circuit;
        let Some(tables) = self.tables.as_ref() else {
            return Err(Error::InvalidState {
                operation: "compute",
                state: self.state,
            });
        };
        for gate in circuit.gates() {
            let inputs = gate
                .inputs
                .iter()
                .map(|&w| self.keys[w].ok_or(Error::NotAllInputsSet(w)))
                .collect::<Result<Vec<_>, _>>()?;
            let out = if self.free_xor && gate.is_linear() {
                inputs[0] ^ inputs[1]
            } else {
                let rows = tables.get(gate.index).ok_or_else(|| {
                    Error::CheatAttempt(format!("missing table for gate {}", gate.index))
                })?;
                self.scheme
                    .set_tweak(&(gate.index as u64).to_le_bytes())?;
                self.scheme.set_key(MultiSecretKey::new(&inputs)?);
                self.scheme.decrypt_block(rows[row_position(&inputs)])?
            };
            self.keys[gate.output] = Some(out);
        }
        let outputs = circuit
            .output_wires()
            .iter()
            .map(|&w| self.keys[w].map(|k| (w, k)).ok_or(Error::NotAllInputsSet(w)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        self.state = State::Computed;
        Ok(outputs)
    }

    /// Translates output keys to bits using the translation table.
    pub fn translate(
        &mut self,
        outputs: &BTreeMap<usize, Block>,
    ) -> Result<BTreeMap<usize, bool>, Error> {
        self.expect_state("translate", &[State::Computed, State::Translated])?;
        let table = self.translation_table()?;
        let bits = self
            .circuit
            .output_wires()
            .iter()
            .map(|&w| {
                let key = outputs.get(&w).ok_or(Error::MissingOutputKey(w))?;
                let bit = table.translate(w, *key).ok_or(Error::MissingOutputKey(w))?;
                Ok((w, bit))
            })
            .collect::<Result<BTreeMap<_, _>, Error>>()?;
        self.state = State::Translated;
        Ok(bits)
    }

    /// Translates output keys to bits, in the declared order of the output wires.
    pub fn translate_outputs(
        &mut self,
        outputs: &BTreeMap<usize, Block>,
    ) -> Result<Vec<bool>, Error> {
        let bits = self.translate(outputs)?;
        Ok(self
            .circuit
            .output_wires()
            .iter()
            .filter_map(|w| bits.get(w).copied())
            .collect())
    }
}

fn fresh_pair<R: CryptoRng + ?Sized>(rng: &mut R, delta: Option<Delta>) -> (Block, Block) {
    let k0: Block = rng.random();
    let k1 = match delta {
        Some(delta) => k0 ^ delta.0,
        None => rng.random::<Block>().with_lsb(!k0.lsb()),
    };
    (k0, k1)
}

fn row_position(keys: &[Block]) -> usize {
    keys.iter().fold(0, |p, k| 2 * p + k.lsb() as usize)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::encryption::EncryptionBackend;

    fn and_circuit() -> BooleanCircuit {
        BooleanCircuit::new(
            vec![0],
            vec![1],
            vec![Gate::new(&[0, 1], 2, &Gate::AND)],
            vec![2],
        )
        .unwrap()
    }

    fn mixed_circuit() -> BooleanCircuit {
        // out = (!(a ^ b) & c, a xnor c)
        BooleanCircuit::new(
            vec![0, 1],
            vec![2],
            vec![
                Gate::new(&[0, 1], 3, &Gate::XOR),
                Gate::new(&[3], 4, &Gate::NOT),
                Gate::new(&[4, 2], 5, &Gate::AND),
                Gate::new(&[0, 2], 6, &Gate::XNOR),
            ],
            vec![5, 6],
        )
        .unwrap()
    }

    fn configs() -> Vec<ProtocolConfig> {
        let mut configs = vec![];
        for encryption in [EncryptionBackend::FixedKey, EncryptionBackend::Hash] {
            for free_xor in [true, false] {
                configs.push(
                    ProtocolConfig::default()
                        .with_encryption(encryption)
                        .with_free_xor(free_xor),
                );
            }
        }
        configs
    }

    /// Garbles and evaluates locally, moving tables through their encoding.
    fn run(
        circuit: &BooleanCircuit,
        config: &ProtocolConfig,
        a: &[bool],
        b: &[bool],
    ) -> Result<Vec<bool>, Error> {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let mut garbler = GarbledCircuit::new(circuit, config);
        let secrets = garbler.garble(&mut rng)?;
        let tables = GarbledTables::from_bytes(&garbler.garbled_tables()?.to_bytes()).unwrap();
        let translation =
            TranslationTable::from_bytes(&garbler.translation_table()?.to_bytes()).unwrap();

        let mut evaluator = GarbledCircuit::new(circuit, config);
        evaluator.set_garbled_tables(tables)?;
        evaluator.set_translation_table(translation)?;
        let wires: Vec<usize> = circuit.all_input_wires().collect();
        let bits: Vec<bool> = a.iter().chain(b).copied().collect();
        let keys = secrets.select(&wires, &bits)?;
        evaluator.set_inputs(wires.into_iter().zip(keys))?;
        let outputs = evaluator.compute()?;
        evaluator.translate_outputs(&outputs)
    }

    #[test]
    fn evaluates_all_gate_types() -> Result<(), Error> {
        let circuit = mixed_circuit();
        for config in configs() {
            for x in 0..8u8 {
                let a = [x & 1 == 1, x & 2 == 2];
                let b = [x & 4 == 4];
                let expected = circuit.evaluate(&a, &b).unwrap();
                assert_eq!(run(&circuit, &config, &a, &b)?, expected, "{config:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn free_xor_key_pairs_share_delta() -> Result<(), Error> {
        let circuit = mixed_circuit();
        let mut garbler = GarbledCircuit::new(&circuit, &ProtocolConfig::default());
        let secrets = garbler.garble(&mut ChaCha20Rng::seed_from_u64(1))?;
        let delta = secrets.delta().unwrap().as_block();
        assert!(delta.lsb());
        for w in circuit.all_input_wires() {
            let (k0, k1) = secrets.keys(w).unwrap();
            assert_eq!(k0 ^ k1, delta);
        }

        let sent = [
            garbler.garbled_tables()?.to_bytes(),
            garbler.translation_table()?.to_bytes(),
        ];
        for bytes in sent {
            assert!(!bytes.windows(16).any(|w| w == delta.as_bytes()));
        }
        Ok(())
    }

    #[test]
    fn keys_have_opposite_signal_bits_without_free_xor() -> Result<(), Error> {
        let circuit = mixed_circuit();
        let config = ProtocolConfig::default().with_free_xor(false);
        let mut garbler = GarbledCircuit::new(&circuit, &config);
        let secrets = garbler.garble(&mut ChaCha20Rng::seed_from_u64(2))?;
        assert!(secrets.delta().is_none());
        for w in circuit.all_input_wires() {
            let (k0, k1) = secrets.keys(w).unwrap();
            assert_ne!(k0.lsb(), k1.lsb());
        }
        // every gate has a table, XOR and XNOR included
        let tables = garbler.garbled_tables()?;
        assert_eq!(tables.len(), 4);
        assert_eq!(tables.get(0).map(<[Block]>::len), Some(4));
        Ok(())
    }

    #[test]
    fn table_shapes() -> Result<(), Error> {
        let circuit = mixed_circuit();
        let mut garbler = GarbledCircuit::new(&circuit, &ProtocolConfig::default());
        garbler.garble(&mut ChaCha20Rng::seed_from_u64(3))?;
        let tables = garbler.garbled_tables()?;
        assert_eq!(tables.get(0), None);
        assert_eq!(tables.get(1).map(<[Block]>::len), Some(2));
        assert_eq!(tables.get(2).map(<[Block]>::len), Some(4));
        assert_eq!(tables.get(3), None);
        assert_eq!(tables.len(), 2);
        assert_eq!(garbler.translation_table()?.len(), 2);
        Ok(())
    }

    #[test]
    fn and_gate_selects_the_signal_row() -> Result<(), Error> {
        let circuit = and_circuit();
        let config = ProtocolConfig::default();
        let mut garbler = GarbledCircuit::new(&circuit, &config);
        let secrets = garbler.garble(&mut ChaCha20Rng::seed_from_u64(4))?;
        let rows = garbler.garbled_tables()?.get(0).unwrap().to_vec();
        let translation = garbler.translation_table()?.clone();

        let mut scheme = config.encryption.scheme(config.free_xor);
        scheme.set_tweak(&0u64.to_le_bytes())?;
        let mut decrypted = vec![];
        for a in [false, true] {
            for b in [false, true] {
                let ka = secrets.key(0, a).unwrap();
                let kb = secrets.key(1, b).unwrap();
                let position = 2 * ka.lsb() as usize + kb.lsb() as usize;
                scheme.set_key(MultiSecretKey::Pair(ka, kb));
                let out = scheme.decrypt_block(rows[position])?;
                assert_eq!(translation.translate(2, out), Some(a & b));
                decrypted.push(out);
            }
        }
        // the three zero rows decrypt to the same key, the one row to the other
        assert_eq!(decrypted[0], decrypted[1]);
        assert_eq!(decrypted[0], decrypted[2]);
        assert_ne!(decrypted[0], decrypted[3]);
        Ok(())
    }

    #[test]
    fn evaluator_holds_one_key_per_wire() -> Result<(), Error> {
        let circuit = and_circuit();
        let config = ProtocolConfig::default();
        let mut garbler = GarbledCircuit::new(&circuit, &config);
        let secrets = garbler.garble(&mut ChaCha20Rng::seed_from_u64(5))?;
        let mut evaluator = GarbledCircuit::new(&circuit, &config);
        evaluator.set_garbled_tables(garbler.garbled_tables()?.clone())?;
        let k0 = secrets.key(0, true).unwrap();
        evaluator.set_inputs([(0, k0)])?;
        assert_eq!(evaluator.wire_key(0), Some(k0));
        assert_eq!(evaluator.wire_key(1), None);
        let k1 = secrets.key(1, false).unwrap();
        assert!(matches!(
            evaluator.set_inputs([(0, k1)]),
            Err(Error::KeyAlreadySet(0))
        ));
        assert_eq!(evaluator.wire_key(0), Some(k0));
        // a failing batch leaves the keys of its valid wires unset
        assert!(matches!(
            evaluator.set_inputs([(1, k1), (2, k0)]),
            Err(Error::NotAnInputWire(2))
        ));
        assert!(matches!(
            evaluator.set_inputs([(1, k1), (1, k1)]),
            Err(Error::KeyAlreadySet(1))
        ));
        assert_eq!(evaluator.wire_key(1), None);
        assert!(matches!(evaluator.compute(), Err(Error::NotAllInputsSet(1))));
        Ok(())
    }

    #[test]
    fn lifecycle_is_enforced() -> Result<(), Error> {
        let circuit = and_circuit();
        let config = ProtocolConfig::default();
        let mut garbler = GarbledCircuit::new(&circuit, &config);
        assert!(matches!(
            garbler.garbled_tables(),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            garbler.compute(),
            Err(Error::InvalidState {
                state: State::Created,
                ..
            })
        ));
        garbler.garble(&mut ChaCha20Rng::seed_from_u64(6))?;
        assert_eq!(garbler.state(), State::Garbled);
        assert!(matches!(
            garbler.garble(&mut ChaCha20Rng::seed_from_u64(6)),
            Err(Error::InvalidState { .. })
        ));

        let mut evaluator = GarbledCircuit::new(&circuit, &config);
        assert!(matches!(
            evaluator.set_inputs(std::iter::empty()),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            evaluator.translate(&BTreeMap::new()),
            Err(Error::InvalidState { .. })
        ));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tables() -> Result<(), Error> {
        let circuit = mixed_circuit();
        let config = ProtocolConfig::default();
        let mut garbler = GarbledCircuit::new(&circuit, &config);
        garbler.garble(&mut ChaCha20Rng::seed_from_u64(7))?;
        let tables = garbler.garbled_tables()?.clone();

        let mut missing = tables.clone();
        missing.tables.remove(&2);
        let mut extra = tables.clone();
        extra.tables.insert(0, vec![Block::ZERO; 4]);
        let mut unknown = tables.clone();
        unknown.tables.insert(99, vec![Block::ZERO; 4]);
        let mut short = tables;
        short.tables.insert(2, vec![Block::ZERO; 2]);
        for bad in [missing, extra, unknown, short] {
            let mut evaluator = GarbledCircuit::new(&circuit, &config);
            assert!(matches!(
                evaluator.set_garbled_tables(bad),
                Err(Error::CheatAttempt(_))
            ));
        }

        let mut evaluator = GarbledCircuit::new(&circuit, &config);
        let wrong = TranslationTable {
            bits: BTreeMap::from([(5, true)]),
        };
        assert!(matches!(
            evaluator.set_translation_table(wrong),
            Err(Error::CheatAttempt(_))
        ));
        Ok(())
    }

    #[test]
    fn table_encoding() -> Result<(), Error> {
        let circuit = mixed_circuit();
        let mut garbler = GarbledCircuit::new(&circuit, &ProtocolConfig::default());
        garbler.garble(&mut ChaCha20Rng::seed_from_u64(8))?;
        let tables = garbler.garbled_tables()?;
        let bytes = tables.to_bytes();
        // tag, count, then (index, row count, rows) for the NOT and AND gate
        assert_eq!(bytes.len(), 5 + (5 + 2 * 16) + (5 + 4 * 16));
        assert_eq!(&GarbledTables::from_bytes(&bytes).unwrap(), tables);
        assert!(matches!(
            TranslationTable::from_bytes(&bytes),
            Err(DecodeError::UnexpectedTag { .. })
        ));

        let translation = garbler.translation_table()?;
        let mut bytes = translation.to_bytes();
        assert_eq!(&TranslationTable::from_bytes(&bytes).unwrap(), translation);
        let last = bytes.len() - 1;
        bytes[last] = 7;
        assert_eq!(
            TranslationTable::from_bytes(&bytes),
            Err(DecodeError::InvalidValue {
                field: "translation bit",
                value: 7
            })
        );
        Ok(())
    }

    #[test]
    fn rerandomized_per_run() -> Result<(), Error> {
        let circuit = and_circuit();
        let config = ProtocolConfig::default();
        let mut first = GarbledCircuit::new(&circuit, &config);
        first.garble(&mut ChaCha20Rng::seed_from_u64(9))?;
        let mut second = GarbledCircuit::new(&circuit, &config);
        second.garble(&mut ChaCha20Rng::seed_from_u64(10))?;
        assert_ne!(first.garbled_tables()?, second.garbled_tables()?);
        Ok(())
    }
}

//! The two parties of the Yao protocol.
//!
//! [`PartyOne`] garbles the circuit and sends, in this order, the garbled tables, the translation
//! table and the keys of its own inputs. It then acts as OT sender for the keys of party two's
//! input wires. [`PartyTwo`] receives and validates these messages, obtains its input keys as OT
//! receiver, evaluates the circuit and translates the output keys to bits.
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tokio::runtime::Builder;
use tracing::{Level, debug, instrument};

use crate::{
    block::Block,
    channel::{self, Channel, MsgChannel, SimpleChannel},
    circuit::{BooleanCircuit, CircuitError},
    config::ProtocolConfig,
    encoding::{decode_keys, encode_keys},
    garble::{self, GarbledCircuit, GarbledTables, TranslationTable},
    ot::{self, OtBatchReceiver, OtBatchSender, OtReceiverInput, OtSenderInput},
};

/// Errors occurring during a protocol run.
#[derive(Debug, Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The circuit or the inputs are invalid.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// Garbling or evaluation failed.
    #[error(transparent)]
    Garbling(#[from] garble::Error),
    /// The oblivious transfer failed.
    #[error(transparent)]
    Ot(#[from] ot::Error),
    /// The other party sent a message of unexpected type or shape.
    #[error("cheat attempt: {0}")]
    CheatAttempt(String),
    /// The runtime for [`simulate_yao`] could not be started.
    #[error("could not start the tokio runtime: {0}")]
    Runtime(std::io::Error),
}

impl Error {
    /// Whether the run was aborted because the other party deviated from the protocol.
    pub fn is_cheat_attempt(&self) -> bool {
        matches!(
            self,
            Error::CheatAttempt(_)
                | Error::Garbling(garble::Error::CheatAttempt(_))
                | Error::Ot(ot::Error::CheatAttempt(_) | ot::Error::InvalidLength { .. })
        )
    }
}

fn per_run_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_rng(&mut rand::rng())
}

/// The garbler, contributing the input bits of party 1.
#[derive(Debug, Clone)]
pub struct PartyOne<'c> {
    circuit: &'c BooleanCircuit,
    inputs: Vec<bool>,
    config: ProtocolConfig,
}

impl<'c> PartyOne<'c> {
    /// Prepares a run, failing if `inputs` does not match party 1's input wires.
    pub fn new(
        circuit: &'c BooleanCircuit,
        inputs: &[bool],
        config: ProtocolConfig,
    ) -> Result<Self, Error> {
        circuit.check_input_len(1, inputs.len())?;
        Ok(Self {
            circuit,
            inputs: inputs.to_vec(),
            config,
        })
    }

    /// Executes one run of the protocol with party 2 on the other end of `channel`.
    ///
    /// Every call garbles the circuit anew, with fresh keys and a fresh Δ.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run<C: Channel + Send>(&self, channel: &mut C) -> Result<(), Error> {
        let mut rng = per_run_rng();
        let circuit = self.circuit;
        let mut garbled = GarbledCircuit::new(circuit, &self.config);
        let secrets = garbled.garble(&mut rng)?;

        let tables = garbled.garbled_tables()?;
        debug!(
            gates = circuit.gates().len(),
            tables = tables.len(),
            "sending garbled circuit"
        );
        let mut msg = MsgChannel(&mut *channel);
        msg.send_bytes("garbled tables", tables.to_bytes()).await?;
        msg.send_bytes("translation table", garbled.translation_table()?.to_bytes())
            .await?;
        let own_keys = secrets.select(circuit.input_wires(1), &self.inputs)?;
        msg.send_bytes("garbler input keys", encode_keys(&own_keys))
            .await?;

        let pairs = circuit
            .input_wires(2)
            .iter()
            .map(|&w| secrets.keys(w).ok_or(garble::Error::NotAnInputWire(w)))
            .collect::<Result<Vec<(Block, Block)>, _>>()?;
        debug!(keys = pairs.len(), "transferring evaluator input keys");
        let input = OtSenderInput::from_blocks(self.config.ot, &pairs);
        OtBatchSender::new(self.config.ot)
            .transfer(channel, &input, &mut rng)
            .await?;
        Ok(())
    }
}

/// The evaluator, contributing the input bits of party 2 and learning the output.
#[derive(Debug, Clone)]
pub struct PartyTwo<'c> {
    circuit: &'c BooleanCircuit,
    inputs: Vec<bool>,
    config: ProtocolConfig,
}

impl<'c> PartyTwo<'c> {
    /// Prepares a run, failing if `inputs` does not match party 2's input wires.
    pub fn new(
        circuit: &'c BooleanCircuit,
        inputs: &[bool],
        config: ProtocolConfig,
    ) -> Result<Self, Error> {
        circuit.check_input_len(2, inputs.len())?;
        Ok(Self {
            circuit,
            inputs: inputs.to_vec(),
            config,
        })
    }

    /// Executes one run of the protocol with party 1 on the other end of `channel`.
    ///
    /// Returns the output bits in the declared order of the output wires.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run<C: Channel + Send>(&self, channel: &mut C) -> Result<Vec<bool>, Error> {
        let mut rng = per_run_rng();
        let circuit = self.circuit;
        let mut garbled = GarbledCircuit::new(circuit, &self.config);

        let mut msg = MsgChannel(&mut *channel);
        let bytes = msg.recv_bytes("garbled tables").await?;
        let tables = GarbledTables::from_bytes(&bytes)
            .map_err(|e| Error::CheatAttempt(format!("garbled tables: {e}")))?;
        garbled.set_garbled_tables(tables)?;
        let bytes = msg.recv_bytes("translation table").await?;
        let translation = TranslationTable::from_bytes(&bytes)
            .map_err(|e| Error::CheatAttempt(format!("translation table: {e}")))?;
        garbled.set_translation_table(translation)?;

        let bytes = msg.recv_bytes("garbler input keys").await?;
        let garbler_keys = decode_keys(&bytes)
            .map_err(|e| Error::CheatAttempt(format!("garbler input keys: {e}")))?;
        let garbler_wires = circuit.input_wires(1);
        if garbler_keys.len() != garbler_wires.len() {
            return Err(Error::CheatAttempt(format!(
                "received {} garbler input keys for {} wires",
                garbler_keys.len(),
                garbler_wires.len()
            )));
        }
        garbled.set_inputs(garbler_wires.iter().copied().zip(garbler_keys))?;

        let input = OtReceiverInput::for_blocks(self.config.ot, self.inputs.clone());
        let own_keys = OtBatchReceiver::new(self.config.ot)
            .transfer(channel, &input, &mut rng)
            .await?
            .into_blocks()?;
        let own_wires = circuit.input_wires(2);
        if own_keys.len() != own_wires.len() {
            return Err(Error::CheatAttempt(format!(
                "received {} evaluator input keys for {} wires",
                own_keys.len(),
                own_wires.len()
            )));
        }
        garbled.set_inputs(own_wires.iter().copied().zip(own_keys))?;

        let outputs = garbled.compute()?;
        let bits = garbled.translate_outputs(&outputs)?;
        debug!(outputs = bits.len(), "evaluated circuit");
        Ok(bits)
    }
}

/// Runs both parties over an in-memory channel and returns the output bits of party 2.
pub fn simulate_yao(
    circuit: &BooleanCircuit,
    party_one_inputs: &[bool],
    party_two_inputs: &[bool],
    config: ProtocolConfig,
) -> Result<Vec<bool>, Error> {
    let garbler = PartyOne::new(circuit, party_one_inputs, config)?;
    let evaluator = PartyTwo::new(circuit, party_two_inputs, config)?;
    let runtime = Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(Error::Runtime)?;
    let (mut a, mut b) = SimpleChannel::pair();
    runtime.block_on(async {
        let ((), outputs) = futures::try_join!(garbler.run(&mut a), evaluator.run(&mut b))?;
        Ok(outputs)
    })
}

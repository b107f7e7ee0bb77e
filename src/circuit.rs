//! Boolean circuits with 1- and 2-input gates and two input-contributing parties.
use std::{fs, path::Path};

use thiserror::Error;

/// Errors raised while loading or validating a [`BooleanCircuit`].
#[derive(Debug, Error)]
pub enum CircuitError {
    /// The circuit description could not be parsed.
    #[error("line {line}: {msg}")]
    Parse {
        /// The 1-based line on which the error occurred.
        line: usize,
        /// What went wrong.
        msg: String,
    },
    /// The circuit file could not be read.
    #[error("could not read circuit file: {0}")]
    Io(#[from] std::io::Error),
    /// A gate has no or more than 2 inputs.
    #[error("gate {0} must have 1 or 2 inputs")]
    InvalidArity(usize),
    /// The truth table length does not match the arity of the gate.
    #[error("gate {gate} needs a truth table with {expected} rows, found {actual}")]
    InvalidTruthTable {
        /// The index of the offending gate.
        gate: usize,
        /// `2^arity`
        expected: usize,
        /// The length of the table.
        actual: usize,
    },
    /// A gate reads a wire that is neither an input wire nor written by an earlier gate.
    #[error("gate {gate} reads wire {wire} before it is set")]
    UnsetWire {
        /// The index of the offending gate.
        gate: usize,
        /// The wire that has no value yet.
        wire: usize,
    },
    /// A wire is an input wire more than once or written by more than one gate.
    #[error("wire {0} is driven more than once")]
    WireDrivenTwice(usize),
    /// An output wire is never set.
    #[error("output wire {0} is never set")]
    UnsetOutput(usize),
    /// A wire index is not below the wire limit of the circuit.
    #[error("wire {wire} is out of range, wire indices must be below {limit}")]
    WireOutOfRange {
        /// The offending wire index.
        wire: usize,
        /// The number of input wires, gates and outputs, capped at `u32::MAX`.
        limit: usize,
    },
    /// The circuit has more gates than fit in a 32-bit gate index.
    #[error("{0} gates do not fit in a 32-bit gate index")]
    TooManyGates(usize),
    /// The circuit is not a 2-party circuit.
    #[error("expected 2 parties, found {0}")]
    UnsupportedParties(usize),
    /// A different number of input bits than the party has input wires was provided.
    #[error("party {party} has {expected} input wires, but {actual} bits were provided")]
    WrongInputSize {
        /// The party (1 or 2).
        party: u8,
        /// The number of input wires of the party.
        expected: usize,
        /// The number of provided bits.
        actual: usize,
    },
}

/// A single gate of a [`BooleanCircuit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    /// The position of the gate in the circuit, used as the encryption tweak.
    pub index: usize,
    /// The 1 or 2 input wires, left before right.
    pub inputs: Vec<usize>,
    /// The output wire.
    pub output: usize,
    /// Row `2a + b` (or `a` for 1-input gates) holds the output for the inputs `(a, b)`.
    pub truth_table: Vec<bool>,
}

impl Gate {
    /// The table of an XOR gate.
    pub const XOR: [bool; 4] = [false, true, true, false];
    /// The table of an XNOR gate.
    pub const XNOR: [bool; 4] = [true, false, false, true];
    /// The table of an AND gate.
    pub const AND: [bool; 4] = [false, false, false, true];
    /// The table of an OR gate.
    pub const OR: [bool; 4] = [false, true, true, true];
    /// The table of a NOT gate.
    pub const NOT: [bool; 2] = [true, false];

    /// Creates a gate, the index is assigned by [`BooleanCircuit::new`].
    pub fn new(inputs: &[usize], output: usize, truth_table: &[bool]) -> Self {
        Self {
            index: 0,
            inputs: inputs.to_vec(),
            output,
            truth_table: truth_table.to_vec(),
        }
    }

    /// Whether the gate computes XOR or XNOR and can be evaluated without a table under free-XOR.
    pub fn is_linear(&self) -> bool {
        self.inputs.len() == 2 && (self.truth_table == Self::XOR || self.truth_table == Self::XNOR)
    }

    /// Evaluates the gate on plaintext bits.
    fn eval(&self, bits: &[bool]) -> bool {
        let row = bits.iter().fold(0, |row, b| 2 * row + *b as usize);
        self.truth_table[row]
    }
}

/// An immutable Boolean circuit with two input-contributing parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanCircuit {
    gates: Vec<Gate>,
    party_one_inputs: Vec<usize>,
    party_two_inputs: Vec<usize>,
    outputs: Vec<usize>,
    num_wires: usize,
}

impl BooleanCircuit {
    /// Builds and validates a circuit. Gates are indexed in the given order.
    pub fn new(
        party_one_inputs: Vec<usize>,
        party_two_inputs: Vec<usize>,
        mut gates: Vec<Gate>,
        outputs: Vec<usize>,
    ) -> Result<Self, CircuitError> {
        if u32::try_from(gates.len()).is_err() {
            return Err(CircuitError::TooManyGates(gates.len()));
        }
        for (i, gate) in gates.iter_mut().enumerate() {
            gate.index = i;
        }
        let limit = (party_one_inputs.len()
            + party_two_inputs.len()
            + gates.len()
            + outputs.len())
        .min(u32::MAX as usize);
        let wires = party_one_inputs
            .iter()
            .chain(&party_two_inputs)
            .chain(&outputs)
            .copied()
            .chain(gates.iter().flat_map(|g| g.inputs.iter().copied().chain([g.output])));
        let mut num_wires = 0;
        for wire in wires {
            if wire >= limit {
                return Err(CircuitError::WireOutOfRange { wire, limit });
            }
            num_wires = num_wires.max(wire + 1);
        }
        let circuit = Self {
            gates,
            party_one_inputs,
            party_two_inputs,
            outputs,
            num_wires,
        };
        circuit.validate()?;
        Ok(circuit)
    }

    /// Checks that wires are driven once, gates are topologically sorted and tables are well-formed.
    ///
    /// Wire indices are bounded when the circuit is built: every wire is below the total number
    /// of input wires, gates and outputs, and below `u32::MAX`, so indices fit the 32-bit fields of
    /// the message encoding. A gate may read the same wire twice.
    pub fn validate(&self) -> Result<(), CircuitError> {
        let mut set = vec![false; self.num_wires];
        for &w in self.party_one_inputs.iter().chain(&self.party_two_inputs) {
            if std::mem::replace(&mut set[w], true) {
                return Err(CircuitError::WireDrivenTwice(w));
            }
        }
        for gate in &self.gates {
            let arity = gate.inputs.len();
            if !(1..=2).contains(&arity) {
                return Err(CircuitError::InvalidArity(gate.index));
            }
            if gate.truth_table.len() != 1 << arity {
                return Err(CircuitError::InvalidTruthTable {
                    gate: gate.index,
                    expected: 1 << arity,
                    actual: gate.truth_table.len(),
                });
            }
            for &wire in &gate.inputs {
                if !set[wire] {
                    return Err(CircuitError::UnsetWire {
                        gate: gate.index,
                        wire,
                    });
                }
            }
            if std::mem::replace(&mut set[gate.output], true) {
                return Err(CircuitError::WireDrivenTwice(gate.output));
            }
        }
        if let Some(&w) = self.outputs.iter().find(|&&w| !set[w]) {
            return Err(CircuitError::UnsetOutput(w));
        }
        Ok(())
    }

    /// Parses the textual circuit description.
    ///
    /// The description is a sequence of whitespace-separated tokens, `#` starts a comment:
    ///
    /// ```text
    /// <num_gates> 2
    /// 1 <n1> <n1 input wires of party 1>
    /// 2 <n2> <n2 input wires of party 2>
    /// <num_outputs> <output wires>
    /// <n_in> 1 <input wires> <output wire> <truth table, e.g. 0001>   (once per gate)
    /// ```
    pub fn parse(description: &str) -> Result<Self, CircuitError> {
        let mut tokens = Tokens::new(description);
        let num_gates = tokens.number("number of gates")?;
        let parties = tokens.number("number of parties")?;
        if parties != 2 {
            return Err(CircuitError::UnsupportedParties(parties));
        }
        let mut inputs = [vec![], vec![]];
        for (expected, party_inputs) in (1..=2).zip(inputs.iter_mut()) {
            let party = tokens.number("party number")?;
            if party != expected {
                return Err(tokens.error(format!("expected inputs of party {expected}")));
            }
            let n = tokens.number("number of inputs")?;
            for _ in 0..n {
                party_inputs.push(tokens.number("input wire")?);
            }
        }
        let num_outputs = tokens.number("number of outputs")?;
        // the counts are untrusted, each entry needs at least two characters of the description
        let max_entries = description.len() / 2 + 1;
        let mut outputs = Vec::with_capacity(num_outputs.min(max_entries));
        for _ in 0..num_outputs {
            outputs.push(tokens.number("output wire")?);
        }
        let mut gates = Vec::with_capacity(num_gates.min(max_entries));
        for _ in 0..num_gates {
            let n_in = tokens.number("gate input count")?;
            if !(1..=2).contains(&n_in) {
                return Err(tokens.error(format!("gates need 1 or 2 inputs, found {n_in}")));
            }
            let n_out = tokens.number("gate output count")?;
            if n_out != 1 {
                return Err(tokens.error(format!("gates need 1 output, found {n_out}")));
            }
            let mut gate_inputs = Vec::with_capacity(n_in);
            for _ in 0..n_in {
                gate_inputs.push(tokens.number("gate input wire")?);
            }
            let output = tokens.number("gate output wire")?;
            let table = tokens.truth_table()?;
            gates.push(Gate::new(&gate_inputs, output, &table));
        }
        if let Some((line, t)) = tokens.next() {
            return Err(CircuitError::Parse {
                line,
                msg: format!("unexpected trailing token '{t}'"),
            });
        }
        let [p1, p2] = inputs;
        Self::new(p1, p2, gates, outputs)
    }

    /// Reads and parses a circuit file, see [`BooleanCircuit::parse`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CircuitError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// The gates in evaluation order.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// The input wires of party 1 (1) or party 2 (2), in declared order.
    pub fn input_wires(&self, party: u8) -> &[usize] {
        match party {
            1 => &self.party_one_inputs,
            _ => &self.party_two_inputs,
        }
    }

    /// All input wires, party 1 before party 2.
    pub fn all_input_wires(&self) -> impl Iterator<Item = usize> + '_ {
        self.party_one_inputs
            .iter()
            .chain(&self.party_two_inputs)
            .copied()
    }

    /// Whether the wire is an input wire of either party.
    pub fn is_input_wire(&self, wire: usize) -> bool {
        self.party_one_inputs.contains(&wire) || self.party_two_inputs.contains(&wire)
    }

    /// The output wires, in declared order.
    pub fn output_wires(&self) -> &[usize] {
        &self.outputs
    }

    /// `1 + ` the highest wire index.
    pub fn num_wires(&self) -> usize {
        self.num_wires
    }

    /// Evaluates the circuit in plaintext.
    pub fn evaluate(
        &self,
        party_one_bits: &[bool],
        party_two_bits: &[bool],
    ) -> Result<Vec<bool>, CircuitError> {
        self.check_input_len(1, party_one_bits.len())?;
        self.check_input_len(2, party_two_bits.len())?;
        let mut values = vec![false; self.num_wires];
        for (&w, &b) in self
            .party_one_inputs
            .iter()
            .chain(&self.party_two_inputs)
            .zip(party_one_bits.iter().chain(party_two_bits))
        {
            values[w] = b;
        }
        for gate in &self.gates {
            let bits: Vec<bool> = gate.inputs.iter().map(|&w| values[w]).collect();
            values[gate.output] = gate.eval(&bits);
        }
        Ok(self.outputs.iter().map(|&w| values[w]).collect())
    }

    /// Fails with [`CircuitError::WrongInputSize`] unless `party` has `actual` input wires.
    pub fn check_input_len(&self, party: u8, actual: usize) -> Result<(), CircuitError> {
        let expected = self.input_wires(party).len();
        if expected != actual {
            return Err(CircuitError::WrongInputSize {
                party,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

struct Tokens<'a> {
    tokens: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = text.lines().enumerate().flat_map(|(i, line)| {
            let line_no = i + 1;
            let content = line.split('#').next().unwrap_or_default();
            content.split_whitespace().map(move |t| (line_no, t))
        });
        Self {
            tokens: Box::new(tokens),
            line: 0,
        }
    }

    fn next(&mut self) -> Option<(usize, &'a str)> {
        let next = self.tokens.next();
        if let Some((line, _)) = next {
            self.line = line;
        }
        next
    }

    fn error(&self, msg: String) -> CircuitError {
        CircuitError::Parse {
            line: self.line,
            msg,
        }
    }

    fn token(&mut self, what: &str) -> Result<&'a str, CircuitError> {
        match self.next() {
            Some((_, t)) => Ok(t),
            None => Err(self.error(format!("unexpected end of input, expected {what}"))),
        }
    }

    fn number(&mut self, what: &str) -> Result<usize, CircuitError> {
        let t = self.token(what)?;
        t.parse()
            .map_err(|_| self.error(format!("expected {what}, found '{t}'")))
    }

    fn truth_table(&mut self) -> Result<Vec<bool>, CircuitError> {
        let t = self.token("truth table")?;
        t.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(self.error(format!("invalid truth table '{t}'"))),
            })
            .collect()
    }
}

use std::marker::PhantomData;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::error::InstructionError;
use crate::instruction::{Architecture, Instruction, Operation};
use crate::word::Word;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Resolves mnemonics and opcodes of one architecture to instruction variants.
pub struct InstructionFactory<A: Architecture> {
    /// Mnemonic -> every variant spelled that way, in descriptor order.
    mnemonics: FxMap<&'static str, Vec<A::Op>>,
    opcodes: FxMap<u64, A::Op>,
    arch: PhantomData<A>,
}

impl<A: Architecture> InstructionFactory<A> {
    pub fn new() -> Self {
        let mut mnemonics: FxMap<&'static str, Vec<A::Op>> = FxMap::default();
        let mut opcodes = FxMap::default();
        for descriptor in <A::Op as Operation>::DESCRIPTORS {
            mnemonics
                .entry(descriptor.mnemonic)
                .or_default()
                .push(descriptor.op);
            let previous = opcodes.insert(descriptor.opcode, descriptor.op);
            debug_assert!(
                previous.is_none(),
                "opcode {:#b} of {} is used twice",
                descriptor.opcode,
                A::NAME
            );
        }
        InstructionFactory {
            mnemonics,
            opcodes,
            arch: PhantomData,
        }
    }

    /// Build an instruction from assembly. The register and immediate forms of a mnemonic are
    /// told apart by the shape of `args`.
    pub fn create_from_mnemonic(
        &self,
        mnemonic: &str,
        args: Vec<String>,
    ) -> Result<Instruction<A::Op>, InstructionError> {
        let op = self.op_for_mnemonic(mnemonic, &args)?;
        // Encoding validates registers and literal ranges
        op.encode(&args)?;
        Ok(Instruction::new(op, args))
    }

    pub fn op_for_mnemonic(&self, mnemonic: &str, args: &[String]) -> Result<A::Op, InstructionError> {
        let candidates = self
            .mnemonics
            .get(mnemonic.to_ascii_lowercase().as_str())
            .ok_or_else(|| InstructionError::UnknownMnemonic {
                mnemonic: mnemonic.to_owned(),
            })?;
        candidates
            .iter()
            .copied()
            .find(|op| op.accepts(args))
            .ok_or_else(|| InstructionError::InvalidOperands {
                mnemonic: candidates[0].mnemonic(),
                expected: candidates[0].expected_operands(),
                found: args.to_vec(),
            })
    }

    pub fn op_for_opcode(&self, opcode: u64) -> Option<A::Op> {
        self.opcodes.get(&opcode).copied()
    }

    /// Value of the opcode prefix of an instruction word.
    pub fn opcode_of(word: Word) -> u64 {
        word.to_unsigned() >> (A::WORD_SIZE - A::OPCODE_SIZE)
    }

    /// Decode a machine code bit string. A missing immediate word reads as zero.
    pub fn create_from_machine_code(&self, bits: &str) -> Result<Instruction<A::Op>, InstructionError> {
        let word_size = A::WORD_SIZE as usize;
        let first = Word::from_bit_str(bits.get(..word_size).unwrap_or(bits), A::WORD_SIZE)?;
        let op = self.lookup(first)?;
        let total = op.words() as usize * word_size;
        let bits = format!("{:0<total$}", bits.get(..total).unwrap_or(bits));
        Ok(Instruction::new(op, op.decode(&bits)?))
    }

    /// Decode the instruction starting at `address`. Immediate-carrying variants also consume
    /// the following word(s); reads past the end of memory yield zero.
    pub fn create_from_memory(
        &self,
        memory: &[Word],
        address: usize,
    ) -> Result<Instruction<A::Op>, InstructionError> {
        let zero = Word::zero(A::WORD_SIZE);
        let first = memory.get(address).copied().unwrap_or(zero);
        let op = self.lookup(first)?;
        let bits: String = (0..op.words() as usize)
            .map(|offset| {
                let word = memory.get(address + offset).copied().unwrap_or(zero);
                word.to_bit_string()
            })
            .collect();
        let mut instr = Instruction::new(op, op.decode(&bits)?);
        instr.set_address(address as u64);
        Ok(instr)
    }

    fn lookup(&self, word: Word) -> Result<A::Op, InstructionError> {
        self.op_for_opcode(Self::opcode_of(word))
            .or_else(<A::Op as Operation>::fallback)
            .ok_or_else(|| InstructionError::UnknownOpcode {
                bits: word.to_bit_string(),
            })
    }

    pub fn mnemonics(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.mnemonics.keys().copied()
    }
}

impl<A: Architecture> Default for InstructionFactory<A> {
    fn default() -> Self {
        Self::new()
    }
}

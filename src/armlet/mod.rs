//! Armlet: a 16-bit teaching architecture with eight registers and a 3-bit flag register.
//!
//! Instruction words are laid out as `opcode[15:10] a[9:7] b[6:4] c[3:1] 0`. Variants taking an
//! immediate carry it in a second word, so `add $1, $2, $3` is one word long and
//! `add $1, $2, 300` two.

mod ops;

pub use self::ops::{AluOp, Cond, Op, Source};

use lazy_static::lazy_static;
use regex::Regex;

use crate::emulator::{Emulator, RegisterSpec};
use crate::instruction::{immediate_value, Architecture, Instruction, Syntax};
use crate::interrupt::InterruptSink;
use crate::word::Word;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Armlet;

pub const WORD_SIZE: u32 = 16;

/// Comparison result register: bit 0 equal, bit 1 signed less-than, bit 2 unsigned below.
pub const FLAGS: &str = "flags";

pub const REGISTERS: [&str; 8] = ["$0", "$1", "$2", "$3", "$4", "$5", "$6", "$7"];

impl Architecture for Armlet {
    type Op = Op;

    const NAME: &'static str = "armlet";
    const WORD_SIZE: u32 = WORD_SIZE;
    const ADDRESS_SIZE: u32 = 16;
    const OPCODE_SIZE: u32 = 6;
    const SYNTAX: Syntax = Syntax {
        comment: '#',
        label_separator: ':',
        label_reference: '>',
        data_directive: ".data",
    };

    fn registers() -> Vec<RegisterSpec> {
        std::iter::once(RegisterSpec::zero(REGISTERS[0], WORD_SIZE))
            .chain(
                REGISTERS
                    .into_iter()
                    .skip(1)
                    .map(|name| RegisterSpec::new(name, WORD_SIZE)),
            )
            .chain(std::iter::once(RegisterSpec::new(FLAGS, 3)))
            .collect()
    }
}

lazy_static! {
    static ref REGISTER: Regex = Regex::new(r"^\$([0-7])$").unwrap();
}

/// Index of a register operand such as `$5`.
pub fn register_index(arg: &str) -> Option<usize> {
    REGISTER
        .captures(arg)
        .and_then(|captures| captures[1].parse().ok())
}

/// Anything starting with `$` is meant as a register, valid or not.
fn looks_like_register(arg: &str) -> bool {
    arg.starts_with('$')
}

// Operand accessors. A missing or malformed argument reads as `$0` or zero.

fn register_name(instr: &Instruction<Op>, index: usize) -> &'static str {
    let register = instr.arg(index).and_then(register_index).unwrap_or(0);
    REGISTERS[register]
}

fn read<S: InterruptSink>(
    emulator: &Emulator<Armlet, S>,
    instr: &Instruction<Op>,
    index: usize,
) -> Word {
    emulator
        .register(register_name(instr, index))
        .unwrap_or(Word::zero(WORD_SIZE))
}

fn write<S: InterruptSink>(
    emulator: &mut Emulator<Armlet, S>,
    instr: &Instruction<Op>,
    index: usize,
    value: Word,
) {
    emulator.set_register(register_name(instr, index), value);
}

fn immediate(instr: &Instruction<Op>, index: usize) -> Word {
    let value = instr
        .arg(index)
        .and_then(|arg| immediate_value(arg, &Armlet::SYNTAX).ok())
        .unwrap_or(0);
    Word::from_signed(value, WORD_SIZE)
}

fn operand<S: InterruptSink>(
    emulator: &Emulator<Armlet, S>,
    instr: &Instruction<Op>,
    index: usize,
    source: Source,
) -> Word {
    match source {
        Source::Reg => read(emulator, instr, index),
        Source::Imm => immediate(instr, index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_syntax() {
        assert_eq!(register_index("$0"), Some(0));
        assert_eq!(register_index("$7"), Some(7));
        assert_eq!(register_index("$8"), None);
        assert_eq!(register_index("$12"), None);
        assert_eq!(register_index("7"), None);
        assert!(looks_like_register("$8"));
    }

    #[test]
    fn register_file() {
        let registers = Armlet::registers();
        assert_eq!(registers.len(), 9);
        assert!(registers[0].hardwired_zero);
        assert!(registers[1..].iter().all(|spec| !spec.hardwired_zero));
        assert_eq!(registers[8], RegisterSpec::new(FLAGS, 3));
    }

    #[test]
    fn accessors_default_missing_operands() {
        let instr = Instruction::new(Op::Mov(Source::Imm), vec![]);
        assert_eq!(register_name(&instr, 0), "$0");
        assert!(immediate(&instr, 1).is_zero());

        let instr = Instruction::new(Op::Mov(Source::Imm), vec!["$4".into(), ">later".into()]);
        assert_eq!(register_name(&instr, 0), "$4");
        assert!(immediate(&instr, 1).is_zero());
    }
}

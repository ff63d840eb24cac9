use super::{
    looks_like_register, operand, read, register_index, register_name, write, Armlet, FLAGS,
    WORD_SIZE,
};
use crate::emulator::Emulator;
use crate::error::InstructionError;
use crate::instruction::{
    check_range, immediate_value, pack_fields, parse_literal, unpack_fields, Architecture,
    Descriptor, Flow, Instruction, Operation,
};
use crate::interrupt::{Interrupt, InterruptSink};
use crate::word::Word;

use self::{AluOp as A, Cond as C, Source::*};

/// Where the last operand comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    Reg,
    /// Second instruction word.
    Imm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    /// Logical shift left by the signed amount in the last operand.
    Lsl,
    Lsr,
    Asr,
}

/// Branch condition, evaluated against the flag register set by `cmp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned less-than.
    Below,
    /// Unsigned greater-than.
    Above,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Nop,
    Halt,
    /// `$d = $s <op> (src)`
    Alu(AluOp, Source),
    /// `$d = ~$s`
    Not,
    Mov(Source),
    /// Compare a register with (src) and set `flags`.
    Cmp(Source),
    /// `$d = mem[(src)]`
    Load(Source),
    /// `mem[(src)] = $s`
    Store(Source),
    Jump(Source),
    Branch(Cond, Source),
    /// Read a number through the `input` interrupt.
    In,
    /// Print a register through the `output` interrupt.
    Out,
}

/// Field usage of the first instruction word, plus whether an immediate word follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Bare,
    R,
    RR,
    RRR,
    I,
    RI,
    RRI,
}

impl Layout {
    fn registers(self) -> usize {
        match self {
            Layout::Bare | Layout::I => 0,
            Layout::R | Layout::RI => 1,
            Layout::RR | Layout::RRI => 2,
            Layout::RRR => 3,
        }
    }

    fn immediate(self) -> bool {
        matches!(self, Layout::I | Layout::RI | Layout::RRI)
    }

    fn arity(self) -> usize {
        self.registers() + self.immediate() as usize
    }
}

const OPCODE_BITS: u32 = 6;
const REGISTER_BITS: u32 = 3;

const fn one(op: Op, mnemonic: &'static str, opcode: u64) -> Descriptor<Op> {
    Descriptor {
        op,
        mnemonic,
        opcode,
        words: 1,
    }
}

const fn two(op: Op, mnemonic: &'static str, opcode: u64) -> Descriptor<Op> {
    Descriptor {
        op,
        mnemonic,
        opcode,
        words: 2,
    }
}

#[rustfmt::skip]
const DESCRIPTORS: &[Descriptor<Op>] = &[
    one(Op::Nop,                   "nop",  0),
    one(Op::Halt,                  "halt", 1),
    one(Op::Alu(A::Add, Reg),      "add",  2),
    two(Op::Alu(A::Add, Imm),      "add",  3),
    one(Op::Alu(A::Sub, Reg),      "sub",  4),
    two(Op::Alu(A::Sub, Imm),      "sub",  5),
    one(Op::Alu(A::And, Reg),      "and",  6),
    two(Op::Alu(A::And, Imm),      "and",  7),
    one(Op::Alu(A::Or, Reg),       "or",   8),
    two(Op::Alu(A::Or, Imm),       "or",   9),
    one(Op::Alu(A::Xor, Reg),      "xor",  10),
    two(Op::Alu(A::Xor, Imm),      "xor",  11),
    one(Op::Alu(A::Lsl, Reg),      "lsl",  12),
    two(Op::Alu(A::Lsl, Imm),      "lsl",  13),
    one(Op::Alu(A::Lsr, Reg),      "lsr",  14),
    two(Op::Alu(A::Lsr, Imm),      "lsr",  15),
    one(Op::Alu(A::Asr, Reg),      "asr",  16),
    two(Op::Alu(A::Asr, Imm),      "asr",  17),
    one(Op::Not,                   "not",  18),
    one(Op::Mov(Reg),              "mov",  19),
    two(Op::Mov(Imm),              "mov",  20),
    one(Op::Cmp(Reg),              "cmp",  21),
    two(Op::Cmp(Imm),              "cmp",  22),
    one(Op::Load(Reg),             "ld",   23),
    two(Op::Load(Imm),             "ld",   24),
    one(Op::Store(Reg),            "st",   25),
    two(Op::Store(Imm),            "st",   26),
    one(Op::Jump(Reg),             "jmp",  27),
    two(Op::Jump(Imm),             "jmp",  28),
    one(Op::Branch(C::Eq, Reg),    "beq",  29),
    two(Op::Branch(C::Eq, Imm),    "beq",  30),
    one(Op::Branch(C::Ne, Reg),    "bne",  31),
    two(Op::Branch(C::Ne, Imm),    "bne",  32),
    one(Op::Branch(C::Lt, Reg),    "blt",  33),
    two(Op::Branch(C::Lt, Imm),    "blt",  34),
    one(Op::Branch(C::Le, Reg),    "ble",  35),
    two(Op::Branch(C::Le, Imm),    "ble",  36),
    one(Op::Branch(C::Gt, Reg),    "bgt",  37),
    two(Op::Branch(C::Gt, Imm),    "bgt",  38),
    one(Op::Branch(C::Ge, Reg),    "bge",  39),
    two(Op::Branch(C::Ge, Imm),    "bge",  40),
    one(Op::Branch(C::Below, Reg), "bbl",  41),
    two(Op::Branch(C::Below, Imm), "bbl",  42),
    one(Op::Branch(C::Above, Reg), "bab",  43),
    two(Op::Branch(C::Above, Imm), "bab",  44),
    one(Op::In,                    "in",   45),
    one(Op::Out,                   "out",  46),
];

impl Op {
    fn layout(self) -> Layout {
        match self {
            Op::Nop | Op::Halt => Layout::Bare,
            Op::Alu(_, Reg) => Layout::RRR,
            Op::Alu(_, Imm) => Layout::RRI,
            Op::Not | Op::Mov(Reg) | Op::Cmp(Reg) | Op::Load(Reg) | Op::Store(Reg) => Layout::RR,
            Op::Mov(Imm) | Op::Cmp(Imm) | Op::Load(Imm) | Op::Store(Imm) => Layout::RI,
            Op::Jump(Reg) | Op::Branch(_, Reg) | Op::In | Op::Out => Layout::R,
            Op::Jump(Imm) | Op::Branch(_, Imm) => Layout::I,
        }
    }

    fn opcode(self) -> u64 {
        self.descriptor().opcode
    }
}

impl AluOp {
    fn apply(self, lhs: Word, rhs: Word) -> Word {
        match self {
            AluOp::Add => lhs.add(rhs),
            AluOp::Sub => lhs.subtract(rhs),
            AluOp::And => lhs.and(rhs),
            AluOp::Or => lhs.or(rhs),
            AluOp::Xor => lhs.xor(rhs),
            AluOp::Lsl => lhs.shift(rhs.to_signed()),
            AluOp::Lsr => lhs.shift(-rhs.to_signed()),
            AluOp::Asr => lhs.arithmetic_shift(-rhs.to_signed()),
        }
    }
}

/// Flag register value for comparing `a` with `b`.
pub fn compare(a: Word, b: Word) -> Word {
    let equal = a == b;
    let less = a.to_signed() < b.to_signed();
    let below = a.to_unsigned() < b.to_unsigned();
    Word::from_bits(&[equal, less, below])
}

impl Cond {
    pub fn holds(self, flags: Word) -> bool {
        let (equal, less, below) = (flags.bit(0), flags.bit(1), flags.bit(2));
        match self {
            Cond::Eq => equal,
            Cond::Ne => !equal,
            Cond::Lt => less,
            Cond::Le => less || equal,
            Cond::Gt => !less && !equal,
            Cond::Ge => !less,
            Cond::Below => below,
            Cond::Above => !below && !equal,
        }
    }
}

impl Operation for Op {
    type Arch = Armlet;

    const DESCRIPTORS: &'static [Descriptor<Op>] = DESCRIPTORS;

    fn accepts(self, args: &[String]) -> bool {
        let layout = self.layout();
        if args.len() != layout.arity() {
            return false;
        }
        let (registers, rest) = args.split_at(layout.registers());
        registers.iter().all(|arg| register_index(arg).is_some())
            && rest.iter().all(|arg| !looks_like_register(arg))
    }

    fn expected_operands(self) -> &'static str {
        match self {
            Op::Nop | Op::Halt => "no operands",
            Op::Alu(..) => "register, register, register or literal",
            Op::Not => "register, register",
            Op::Mov(_) | Op::Cmp(_) | Op::Load(_) | Op::Store(_) => "register, register or literal",
            Op::Jump(_) | Op::Branch(..) => "register or literal",
            Op::In | Op::Out => "register",
        }
    }

    fn encode(self, args: &[String]) -> Result<String, InstructionError> {
        let layout = self.layout();
        let mut registers = [0i64; 3];
        for (index, register) in registers.iter_mut().enumerate().take(layout.registers()) {
            if let Some(arg) = args.get(index) {
                *register = register_index(arg).ok_or_else(|| InstructionError::InvalidRegister {
                    argument: arg.clone(),
                })? as i64;
            }
        }

        let mut bits = pack_fields(&[
            (self.opcode() as i64, OPCODE_BITS),
            (registers[0], REGISTER_BITS),
            (registers[1], REGISTER_BITS),
            (registers[2], REGISTER_BITS),
            (0, 1),
        ]);
        if layout.immediate() {
            let value = match args.get(layout.registers()) {
                Some(arg) => check_range(immediate_value(arg, &Armlet::SYNTAX)?, WORD_SIZE)?,
                None => 0,
            };
            bits.push_str(&pack_fields(&[(value, WORD_SIZE)]));
        }
        Ok(bits)
    }

    fn decode(self, bits: &str) -> Result<Vec<String>, InstructionError> {
        let layout = self.layout();
        let fields = unpack_fields(
            bits,
            &[
                OPCODE_BITS,
                REGISTER_BITS,
                REGISTER_BITS,
                REGISTER_BITS,
                1,
                WORD_SIZE,
            ],
        )?;
        let mut args: Vec<String> = fields[1..1 + layout.registers()]
            .iter()
            .map(|field| format!("${}", field.to_unsigned()))
            .collect();
        if layout.immediate() {
            args.push(fields[5].to_signed().to_string());
        }
        Ok(args)
    }

    fn execute<S: InterruptSink>(
        self,
        instr: &Instruction<Op>,
        emulator: &mut Emulator<Armlet, S>,
    ) -> Flow {
        match self {
            Op::Nop => {}
            Op::Halt => emulator.halt(),
            Op::Alu(alu, source) => {
                let lhs = read(emulator, instr, 1);
                let rhs = operand(emulator, instr, 2, source);
                write(emulator, instr, 0, alu.apply(lhs, rhs));
            }
            Op::Not => {
                let value = read(emulator, instr, 1).invert();
                write(emulator, instr, 0, value);
            }
            Op::Mov(source) => {
                let value = operand(emulator, instr, 1, source);
                write(emulator, instr, 0, value);
            }
            Op::Cmp(source) => {
                let a = read(emulator, instr, 0);
                let b = operand(emulator, instr, 1, source);
                emulator.set_register(FLAGS, compare(a, b));
            }
            Op::Load(source) => {
                let address = operand(emulator, instr, 1, source).to_unsigned();
                let value = emulator.memory(address);
                write(emulator, instr, 0, value);
            }
            Op::Store(source) => {
                let address = operand(emulator, instr, 1, source).to_unsigned();
                let value = read(emulator, instr, 0);
                emulator.set_memory(address, value);
            }
            Op::Jump(source) => {
                return Flow::Jump(operand(emulator, instr, 0, source).to_unsigned());
            }
            Op::Branch(cond, source) => {
                let flags = emulator
                    .register(FLAGS)
                    .unwrap_or(Word::zero(3));
                if cond.holds(flags) {
                    return Flow::Jump(operand(emulator, instr, 0, source).to_unsigned());
                }
            }
            Op::In => input(emulator, instr),
            Op::Out => {
                let text = read(emulator, instr, 0).to_signed().to_string();
                emulator.call_interrupt(Interrupt::Output(&text));
            }
        }
        Flow::Next
    }

    fn fallback() -> Option<Op> {
        Some(Op::Halt)
    }
}

fn input<S: InterruptSink>(emulator: &mut Emulator<Armlet, S>, instr: &Instruction<Op>) {
    let prompt = format!("in {}", register_name(instr, 0));
    let Some(text) = emulator.call_interrupt(Interrupt::Input(&prompt)) else {
        emulator.call_interrupt(Interrupt::Alert("No input available, halting"));
        emulator.halt();
        return;
    };
    let value = match parse_literal(text.trim()) {
        Ok(value) => value,
        Err(_) => {
            let message = format!("Invalid input `{}`, storing 0", text.trim());
            emulator.call_interrupt(Interrupt::Alert(&message));
            0
        }
    };
    write(emulator, instr, 0, Word::from_signed(value, WORD_SIZE));
}

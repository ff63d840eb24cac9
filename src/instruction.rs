use std::fmt::{self, Debug, Display};
use std::hash::Hash;

use crate::emulator::{Emulator, RegisterSpec};
use crate::error::{EncodingError, InstructionError};
use crate::interrupt::InterruptSink;
use crate::word::Word;

/// Everything the framework needs to know about one concrete machine.
pub trait Architecture: Sized + 'static {
    type Op: Operation<Arch = Self>;

    const NAME: &'static str;
    /// Width of a memory cell and of an instruction word.
    const WORD_SIZE: u32;
    /// Width of an address; memory holds `2^ADDRESS_SIZE` words.
    const ADDRESS_SIZE: u32;
    /// Width of the opcode prefix of an instruction word.
    const OPCODE_SIZE: u32;
    const SYNTAX: Syntax;

    /// Architecture registers. `pc` is added by the emulator and must not be listed.
    fn registers() -> Vec<RegisterSpec>;
}

/// Textual conventions of an assembly language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Syntax {
    /// Starts a comment running to the end of the line.
    pub comment: char,
    /// Ends a label definition, as in `loop:`.
    pub label_separator: char,
    /// Marks a label used as an operand, as in `jmp >loop`.
    pub label_reference: char,
    /// Pseudo-instruction emitting its operands as raw words.
    pub data_directive: &'static str,
}

/// Static description of one instruction variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor<O: 'static> {
    pub op: O,
    pub mnemonic: &'static str,
    /// Value of the `OPCODE_SIZE`-bit prefix.
    pub opcode: u64,
    /// Encoded length in words, counting any trailing immediate word.
    pub words: u32,
}

/// Closed set of instruction variants of one architecture.
pub trait Operation: Copy + Eq + Hash + Debug + 'static {
    type Arch: Architecture<Op = Self>;

    /// Every variant exactly once. The factory tables are built by scanning this list.
    const DESCRIPTORS: &'static [Descriptor<Self>];

    /// Whether `args` has the operand shape of this variant.
    fn accepts(self, args: &[String]) -> bool;

    /// Human readable operand shape, used in error messages.
    fn expected_operands(self) -> &'static str;

    /// Machine code for this variant with `args`. Unresolved label references encode as zero.
    fn encode(self, args: &[String]) -> Result<String, InstructionError>;

    /// Arguments recovered from machine code previously produced by `encode`.
    fn decode(self, bits: &str) -> Result<Vec<String>, InstructionError>;

    fn execute<S: InterruptSink>(
        self,
        instr: &Instruction<Self>,
        emulator: &mut Emulator<Self::Arch, S>,
    ) -> Flow;

    /// Operand value written in place of a label reference to `target` by an instruction
    /// placed at `address`.
    fn resolve_label(self, target: u64, _address: u64) -> i64 {
        target as i64
    }

    /// Variant executed when fetch meets an unknown opcode. `None` propagates the error.
    fn fallback() -> Option<Self> {
        None
    }

    fn descriptor(self) -> &'static Descriptor<Self> {
        Self::DESCRIPTORS
            .iter()
            .find(|descriptor| descriptor.op == self)
            .unwrap_or_else(|| panic!("operation {:?} is missing from its descriptor table", self))
    }

    fn mnemonic(self) -> &'static str {
        self.descriptor().mnemonic
    }

    fn words(self) -> u32 {
        self.descriptor().words
    }
}

/// What the emulator does with `pc` after an instruction executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Advance past the instruction.
    Next,
    /// Continue at exactly this address.
    Jump(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind<O> {
    Op(O),
    /// Raw words, one per argument.
    Data,
    /// Run of comment-only source lines. Emits no machine code.
    Comment,
}

/// Label definition attached to an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    /// Line the label was written on, which may precede the instruction's own line.
    pub line: usize,
}

/// Single statement of a program: an operation with its textual arguments, or a
/// pseudo-instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction<O> {
    kind: Kind<O>,
    args: Vec<String>,
    labels: Vec<Label>,
    comment: Option<String>,
    /// 1-based source line, 0 for decoded instructions.
    line: usize,
    address: Option<u64>,
}

impl<O: Operation> Instruction<O> {
    pub fn new(op: O, args: Vec<String>) -> Self {
        Self::with_kind(Kind::Op(op), args)
    }

    pub fn data(values: Vec<String>) -> Self {
        Self::with_kind(Kind::Data, values)
    }

    pub fn comment_block(text: impl Into<String>) -> Self {
        let mut instr = Self::with_kind(Kind::Comment, Vec::new());
        instr.comment = Some(text.into());
        instr
    }

    fn with_kind(kind: Kind<O>, args: Vec<String>) -> Self {
        Instruction {
            kind,
            args,
            labels: Vec::new(),
            comment: None,
            line: 0,
            address: None,
        }
    }

    pub fn kind(&self) -> Kind<O> {
        self.kind
    }

    pub fn op(&self) -> Option<O> {
        match self.kind {
            Kind::Op(op) => Some(op),
            Kind::Data | Kind::Comment => None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Address assigned during label resolution.
    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub(crate) fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    pub(crate) fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub(crate) fn set_address(&mut self, address: u64) {
        self.address = Some(address);
    }

    pub(crate) fn labels_mut(&mut self) -> &mut Vec<Label> {
        &mut self.labels
    }

    pub(crate) fn args_mut(&mut self) -> &mut Vec<String> {
        &mut self.args
    }

    /// Encoded length in words.
    pub fn word_count(&self) -> u32 {
        match self.kind {
            Kind::Op(op) => op.words(),
            Kind::Data => self.args.len() as u32,
            Kind::Comment => 0,
        }
    }

    /// MSB-first machine code, a whole number of words long.
    pub fn to_machine_code(&self) -> Result<String, InstructionError> {
        match self.kind {
            Kind::Op(op) => op.encode(&self.args),
            Kind::Data => {
                let syntax = O::Arch::SYNTAX;
                let word_size = O::Arch::WORD_SIZE;
                let mut bits = String::new();
                for arg in &self.args {
                    let value = check_range(immediate_value(arg, &syntax)?, word_size)?;
                    bits.push_str(&Word::from_signed(value, word_size).to_bit_string());
                }
                Ok(bits)
            }
            Kind::Comment => Ok(String::new()),
        }
    }

    /// Run against `emulator`. Pseudo-instructions do nothing.
    pub fn execute_on<S: InterruptSink>(&self, emulator: &mut Emulator<O::Arch, S>) -> Flow {
        match self.kind {
            Kind::Op(op) => op.execute(self, emulator),
            Kind::Data | Kind::Comment => Flow::Next,
        }
    }

    /// Source text including labels and comment, as it would be written by hand.
    pub fn to_source(&self) -> String {
        let syntax = O::Arch::SYNTAX;
        let mut out = String::new();
        for label in &self.labels {
            out.push_str(&label.name);
            out.push(syntax.label_separator);
            out.push(' ');
        }
        if self.kind == Kind::Comment {
            let block = self
                .comment()
                .unwrap_or_default()
                .lines()
                .map(|line| format!("{} {}", syntax.comment, line))
                .collect::<Vec<_>>()
                .join("\n");
            out.push_str(&block);
            return out.trim_end().to_owned();
        }
        out.push_str(&self.to_string());
        if let Some(comment) = self.comment() {
            out.push_str(&format!(" {} {}", syntax.comment, comment));
        }
        out
    }
}

impl<O: Operation> Display for Instruction<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            Kind::Op(op) => op.mnemonic(),
            Kind::Data => O::Arch::SYNTAX.data_directive,
            Kind::Comment => return Ok(()),
        };
        if self.args.is_empty() {
            write!(f, "{}", name)
        } else {
            write!(f, "{} {}", name, self.args.join(", "))
        }
    }
}

/// Machine code of a whole program, the exact memory image starting at address 0.
pub fn machine_code<O: Operation>(program: &[Instruction<O>]) -> Result<String, InstructionError> {
    let mut bits = String::new();
    for instr in program {
        bits.push_str(&instr.to_machine_code()?);
    }
    Ok(bits)
}

/// Concatenate `(value, width)` fields, most significant field first.
pub fn pack_fields(fields: &[(i64, u32)]) -> String {
    fields
        .iter()
        .map(|(value, width)| Word::from_signed(*value, *width).to_bit_string())
        .collect()
}

/// Split `bits` into consecutive fields of the given widths. Missing trailing bits read as zero.
pub fn unpack_fields(bits: &str, widths: &[u32]) -> Result<Vec<Word>, EncodingError> {
    let mut start = 0usize;
    let mut fields = Vec::with_capacity(widths.len());
    for width in widths {
        let end = start + *width as usize;
        let field = bits.get(start..end.min(bits.len())).unwrap_or("");
        // Truncated fields are padded on the right
        let padded = format!("{:0<width$}", field, width = *width as usize);
        fields.push(Word::from_bit_str(&padded, *width)?);
        start = end;
    }
    Ok(fields)
}

pub fn is_label_reference(arg: &str, syntax: &Syntax) -> bool {
    arg.starts_with(syntax.label_reference)
}

/// Parse a decimal, `0x` hexadecimal or `0b` binary literal with an optional sign.
pub fn parse_literal(arg: &str) -> Result<i64, InstructionError> {
    let invalid = || InstructionError::InvalidImmediate {
        argument: arg.to_owned(),
    };
    let (negative, digits) = match arg.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, arg.strip_prefix('+').unwrap_or(arg)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lower.as_str())
    };
    // The sign only goes in front of the prefix
    if body.starts_with(['-', '+']) {
        return Err(invalid());
    }
    let magnitude = i64::from_str_radix(body, radix).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Literal value of an immediate operand. Label references count as zero until resolved.
pub fn immediate_value(arg: &str, syntax: &Syntax) -> Result<i64, InstructionError> {
    if is_label_reference(arg, syntax) {
        Ok(0)
    } else {
        parse_literal(arg)
    }
}

/// Accept values representable in `width` bits as either signed or unsigned.
pub fn check_range(value: i64, width: u32) -> Result<i64, InstructionError> {
    let min = -(1i64 << (width - 1));
    let max = (1i64 << width) - 1;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(InstructionError::ImmediateOutOfRange { value, min, max })
    }
}

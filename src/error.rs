use std::error::Error;
use std::fmt;
use std::ops::Range;

use miette::{Diagnostic, LabeledSpan};

/// Malformed bit string handed to [`crate::Word::from_bit_str`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodingError {
    pub input: String,
    /// Character index, counted from the most-significant end.
    pub position: usize,
    pub character: char,
}

/// Failure to build, encode or decode an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstructionError {
    UnknownMnemonic {
        mnemonic: String,
    },
    UnknownOpcode {
        bits: String,
    },
    InvalidOperands {
        mnemonic: &'static str,
        expected: &'static str,
        found: Vec<String>,
    },
    InvalidRegister {
        argument: String,
    },
    InvalidImmediate {
        argument: String,
    },
    ImmediateOutOfRange {
        value: i64,
        min: i64,
        max: i64,
    },
    Encoding(EncodingError),
}

/// Malformed assembly source. Always refers to a 1-based source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsingError {
    pub line: usize,
    pub message: String,
    kind: ParsingErrorKind,
    span: Option<Range<usize>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParsingErrorKind {
    Instruction,
    DuplicateLabel,
    UndefinedLabel,
    ReservedLabel,
    InvalidLabel,
}

/// Program image could not be placed into memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    ProgramTooLarge { words: usize, capacity: usize },
    Misaligned { bits: usize, word_size: u32 },
    Instruction(InstructionError),
    Encoding(EncodingError),
}

impl ParsingError {
    pub fn new(kind: ParsingErrorKind, line: usize, message: impl Into<String>) -> Self {
        ParsingError {
            line,
            message: message.into(),
            kind,
            span: None,
        }
    }

    pub fn kind(&self) -> ParsingErrorKind {
        self.kind
    }

    /// Attach the byte range of the offending line, used when rendering diagnostics.
    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.span = Some(span);
        self
    }
}

impl Error for EncodingError {}
impl Error for InstructionError {}
impl Error for ParsingError {}
impl Error for LoadError {}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid character `{}` at position {} of bit string `{}`",
            self.character, self.position, self.input
        )
    }
}

impl fmt::Display for InstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMnemonic { mnemonic } => write!(f, "Unknown instruction `{}`", mnemonic),
            Self::UnknownOpcode { bits } => {
                write!(f, "Unknown instruction for machine code `{}`", bits)
            }
            Self::InvalidOperands {
                mnemonic,
                expected,
                found,
            } => write!(
                f,
                "Invalid operands for `{}` (expected {}, found `{}`)",
                mnemonic,
                expected,
                found.join(", ")
            ),
            Self::InvalidRegister { argument } => write!(f, "Not a register: `{}`", argument),
            Self::InvalidImmediate { argument } => {
                write!(f, "Not a numeric literal: `{}`", argument)
            }
            Self::ImmediateOutOfRange { value, min, max } => write!(
                f,
                "Literal {} does not fit (allowed range {} to {})",
                value, min, max
            ),
            Self::Encoding(error) => write!(f, "{}", error),
        }
    }
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramTooLarge { words, capacity } => write!(
                f,
                "Program is {} words long but memory only holds {}",
                words, capacity
            ),
            Self::Misaligned { bits, word_size } => write!(
                f,
                "Machine code of {} bits is not aligned to {}-bit words",
                bits, word_size
            ),
            Self::Instruction(error) => write!(f, "{}", error),
            Self::Encoding(error) => write!(f, "{}", error),
        }
    }
}

impl From<EncodingError> for InstructionError {
    fn from(value: EncodingError) -> Self {
        InstructionError::Encoding(value)
    }
}

impl From<InstructionError> for LoadError {
    fn from(value: InstructionError) -> Self {
        LoadError::Instruction(value)
    }
}

impl From<EncodingError> for LoadError {
    fn from(value: EncodingError) -> Self {
        LoadError::Encoding(value)
    }
}

impl Diagnostic for ParsingError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.kind {
            ParsingErrorKind::Instruction => "parse::instruction",
            ParsingErrorKind::DuplicateLabel => "parse::duplicate_label",
            ParsingErrorKind::UndefinedLabel => "parse::undefined_label",
            ParsingErrorKind::ReservedLabel => "parse::reserved_label",
            ParsingErrorKind::InvalidLabel => "parse::invalid_label",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self.kind {
            ParsingErrorKind::Instruction => "check the mnemonic and operands of this instruction",
            ParsingErrorKind::DuplicateLabel => "labels can only be defined once per program",
            ParsingErrorKind::UndefinedLabel => "define the label in front of an instruction",
            ParsingErrorKind::ReservedLabel => {
                "the reference prefix is only allowed when using a label as an operand"
            }
            ParsingErrorKind::InvalidLabel => {
                "labels consist of letters, digits, `_`, `@` and `.` and cannot start with a digit"
            }
        };
        Some(Box::new(help))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span.clone()?;
        let label = match self.kind {
            ParsingErrorKind::Instruction => "invalid instruction",
            ParsingErrorKind::DuplicateLabel => "duplicate label",
            ParsingErrorKind::UndefinedLabel => "undefined label",
            ParsingErrorKind::ReservedLabel | ParsingErrorKind::InvalidLabel => "invalid label",
        };
        Some(Box::new(std::iter::once(LabeledSpan::at(span, label))))
    }
}

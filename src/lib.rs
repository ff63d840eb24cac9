// Machine model
mod word;
pub use word::Word;
pub mod error;
pub use error::{EncodingError, InstructionError, LoadError, ParsingError, ParsingErrorKind};

// Instructions
pub mod instruction;
pub use instruction::{Architecture, Flow, Instruction, Kind, Label, Operation, Syntax};
mod factory;
pub use factory::InstructionFactory;

// Running
pub mod interrupt;
pub use interrupt::{Interrupt, InterruptSink, NullSink, ScriptedSink, Signal};
pub mod emulator;
pub use emulator::{Emulator, RegisterSpec, Status, StepOutcome};

// Assembling
mod parser;
pub use parser::Parser;

// Architectures
pub mod armlet;

// Console
#[macro_use]
pub mod output;
pub mod terminal;
pub use terminal::TerminalSink;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;

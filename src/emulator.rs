use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::error::{InstructionError, LoadError};
use crate::factory::InstructionFactory;
use crate::instruction::{machine_code, Architecture, Flow, Instruction};
use crate::interrupt::{Interrupt, InterruptSink, NullSink, Signal};
use crate::word::Word;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Name of the program counter, which every architecture gets.
pub const PC: &str = "pc";

/// Declaration of one architecture register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterSpec {
    pub name: &'static str,
    pub width: u32,
    /// Always reads as zero, writes are dropped.
    pub hardwired_zero: bool,
}

impl RegisterSpec {
    pub const fn new(name: &'static str, width: u32) -> Self {
        RegisterSpec {
            name,
            width,
            hardwired_zero: false,
        }
    }

    pub const fn zero(name: &'static str, width: u32) -> Self {
        RegisterSpec {
            name,
            width,
            hardwired_zero: true,
        }
    }
}

/// Name-keyed registers in declaration order.
#[derive(Clone, Debug)]
pub struct RegisterBank {
    registers: FxMap<&'static str, Register>,
}

#[derive(Clone, Copy, Debug)]
struct Register {
    value: Word,
    hardwired_zero: bool,
}

impl RegisterBank {
    pub fn new(specs: impl IntoIterator<Item = RegisterSpec>) -> Self {
        let registers = specs
            .into_iter()
            .map(|spec| {
                let register = Register {
                    value: Word::zero(spec.width),
                    hardwired_zero: spec.hardwired_zero,
                };
                (spec.name, register)
            })
            .collect();
        RegisterBank { registers }
    }

    pub fn get(&self, name: &str) -> Option<Word> {
        self.registers.get(name).map(|register| register.value)
    }

    /// Write `value` resized to the register's width. Returns `false` for unknown names.
    pub fn set(&mut self, name: &str, value: Word) -> bool {
        match self.registers.get_mut(name) {
            Some(register) => {
                if !register.hardwired_zero {
                    register.value.set(value);
                }
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        for register in self.registers.values_mut() {
            register.value = Word::zero(register.value.len());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Word)> + '_ {
        self.registers
            .iter()
            .map(|(name, register)| (*name, register.value))
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    Running,
    #[default]
    Paused,
    /// Final until the machine is reset.
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    /// The instruction stopped the machine.
    Halted,
    /// Nothing ran; an alert was raised instead.
    Refused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: u64,
    pub status: Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryLocation {
    pub address: u64,
    pub value: Word,
}

/// Fetch-decode-execute core for architecture `A`, reporting to host `S`.
pub struct Emulator<A: Architecture, S: InterruptSink = NullSink> {
    factory: InstructionFactory<A>,
    registers: RegisterBank,
    memory: Vec<Word>,
    /// Words written by the last load. Zero means no program.
    loaded_program_size: usize,
    status: Status,
    sink: S,
    /// Every string sent through the `output` interrupt.
    output: Vec<String>,
    steps: u64,
}

impl<A: Architecture> Default for Emulator<A, NullSink> {
    fn default() -> Self {
        Self::new(NullSink)
    }
}

impl<A: Architecture, S: InterruptSink> Emulator<A, S> {
    pub fn new(sink: S) -> Self {
        let pc = RegisterSpec::new(PC, A::ADDRESS_SIZE);
        Emulator {
            factory: InstructionFactory::new(),
            registers: RegisterBank::new(std::iter::once(pc).chain(A::registers())),
            memory: vec![Word::zero(A::WORD_SIZE); 1 << A::ADDRESS_SIZE],
            loaded_program_size: 0,
            status: Status::Paused,
            sink,
            output: Vec::new(),
            steps: 0,
        }
    }

    /// Assemble the memory image of `program` and place it at address 0.
    pub fn load_program(&mut self, program: &[Instruction<A::Op>]) -> Result<(), LoadError> {
        self.load_machine_code(&machine_code(program)?)
    }

    /// Load a machine code string, ignoring whitespace. Memory is untouched on failure.
    pub fn load_machine_code(&mut self, code: &str) -> Result<(), LoadError> {
        let bits: Vec<char> = code.chars().filter(|c| !c.is_whitespace()).collect();
        let word_size = A::WORD_SIZE as usize;
        if bits.len() % word_size != 0 {
            return Err(LoadError::Misaligned {
                bits: bits.len(),
                word_size: A::WORD_SIZE,
            });
        }
        let words = bits.len() / word_size;
        if words > self.memory.len() {
            return Err(LoadError::ProgramTooLarge {
                words,
                capacity: self.memory.len(),
            });
        }
        let image = bits
            .chunks(word_size)
            .map(|chunk| Word::from_bit_str(&chunk.iter().collect::<String>(), A::WORD_SIZE))
            .collect::<Result<Vec<_>, _>>()?;

        self.reset_memory();
        self.memory[..words].copy_from_slice(&image);
        self.loaded_program_size = words;
        self.set_pc(0);
        Ok(())
    }

    pub fn start_execution(&mut self) -> bool {
        if self.status == Status::Terminated {
            self.call_interrupt(Interrupt::Alert(
                "Cannot start: the machine has halted, reset it first",
            ));
            return false;
        }
        if self.loaded_program_size == 0 {
            self.call_interrupt(Interrupt::Alert("Cannot start: no program loaded"));
            return false;
        }
        self.status = Status::Running;
        true
    }

    pub fn pause_execution(&mut self) {
        if self.status == Status::Running {
            self.status = Status::Paused;
        }
    }

    pub fn halt(&mut self) {
        if self.status == Status::Terminated {
            return;
        }
        self.call_interrupt(Interrupt::Halt);
        self.status = Status::Terminated;
    }

    /// Fetch, decode and execute the instruction at `pc`.
    ///
    /// Stepping without a program or after termination raises an alert and changes nothing.
    pub fn execute_single_instruction(&mut self) -> Result<StepOutcome, InstructionError> {
        if self.status == Status::Terminated {
            self.call_interrupt(Interrupt::Alert(
                "Cannot step: the machine has halted, reset it first",
            ));
            return Ok(StepOutcome::Refused);
        }
        if self.loaded_program_size == 0 {
            self.call_interrupt(Interrupt::Alert("Cannot step: no program loaded"));
            return Ok(StepOutcome::Refused);
        }

        let instr = self.peek_instruction()?;
        let flow = instr.execute_on(self);
        self.steps += 1;

        if self.status == Status::Terminated {
            return Ok(StepOutcome::Halted);
        }
        match flow {
            Flow::Next => {
                let next = self.pc().wrapping_add(instr.word_count() as u64);
                self.set_pc(next);
            }
            Flow::Jump(target) => self.set_pc(target),
        }
        Ok(StepOutcome::Executed)
    }

    /// Decode the instruction at `pc` without executing it.
    pub fn peek_instruction(&self) -> Result<Instruction<A::Op>, InstructionError> {
        self.factory
            .create_from_memory(&self.memory, self.pc() as usize)
    }

    /// Step until the machine stops running or `max_steps` instructions were executed, in
    /// which case it is paused.
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<RunSummary, InstructionError> {
        let mut steps = 0;
        if self.start_execution() {
            while self.status == Status::Running {
                if max_steps.is_some_and(|max| steps >= max) {
                    self.pause_execution();
                    break;
                }
                if let Err(error) = self.execute_single_instruction() {
                    self.pause_execution();
                    return Err(error);
                }
                steps += 1;
            }
        }
        Ok(RunSummary {
            steps,
            status: self.status,
        })
    }

    /// Invoke a host handler with the run loop paused. Running resumes afterwards only if it
    /// was running before and the machine was not terminated meanwhile.
    pub fn call_interrupt(&mut self, interrupt: Interrupt<'_>) -> Option<String> {
        let was_running = self.status == Status::Running;
        if was_running {
            self.status = Status::Paused;
        }

        let (reply, signal) = match interrupt {
            Interrupt::Input(prompt) => (self.sink.input(prompt), Signal::Resume),
            Interrupt::Output(text) => {
                self.output.push(text.to_owned());
                (None, self.sink.output(text))
            }
            Interrupt::Halt => {
                self.sink.halt();
                (None, Signal::Terminate)
            }
            Interrupt::Alert(message) => (None, self.sink.alert(message)),
        };

        if signal == Signal::Terminate {
            self.status = Status::Terminated;
        } else if was_running && self.status != Status::Terminated {
            self.status = Status::Running;
        }
        reply
    }

    pub fn reset_memory(&mut self) {
        self.memory.fill(Word::zero(A::WORD_SIZE));
        self.loaded_program_size = 0;
    }

    pub fn reset_registers(&mut self) {
        self.registers.reset();
    }

    /// Clear memory, registers, output and counters, and leave the terminated state.
    pub fn reset(&mut self) {
        self.reset_memory();
        self.reset_registers();
        self.output.clear();
        self.steps = 0;
        self.status = Status::Paused;
    }

    pub fn register(&self, name: &str) -> Option<Word> {
        self.registers.get(name)
    }

    pub fn set_register(&mut self, name: &str, value: Word) -> bool {
        self.registers.set(name, value)
    }

    pub fn registers(&self) -> &RegisterBank {
        &self.registers
    }

    pub fn pc(&self) -> u64 {
        self.registers
            .get(PC)
            .map_or(0, |pc| pc.to_unsigned())
    }

    pub fn set_pc(&mut self, address: u64) {
        self.registers
            .set(PC, Word::from_unsigned(address, A::ADDRESS_SIZE));
    }

    /// Word at `address`; addresses wrap around the address space.
    pub fn memory(&self, address: u64) -> Word {
        self.memory[self.index(address)]
    }

    pub fn set_memory(&mut self, address: u64, value: Word) {
        let index = self.index(address);
        self.memory[index].set(value);
    }

    /// Locations `start..=end`, clamped to the end of memory.
    pub fn memory_fragment(&self, start: u64, end: u64) -> Vec<MemoryLocation> {
        let last = (self.memory.len() - 1) as u64;
        if start > last {
            return Vec::new();
        }
        (start..=end.min(last))
            .map(|address| MemoryLocation {
                address,
                value: self.memory[address as usize],
            })
            .collect()
    }

    pub fn memory_image(&self) -> &[Word] {
        &self.memory
    }

    pub fn loaded_program_size(&self) -> usize {
        self.loaded_program_size
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == Status::Paused
    }

    pub fn is_terminated(&self) -> bool {
        self.status == Status::Terminated
    }

    /// Instructions executed since construction or the last full reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn factory(&self) -> &InstructionFactory<A> {
        &self.factory
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn index(&self, address: u64) -> usize {
        (address % self.memory.len() as u64) as usize
    }
}

use isakit::armlet::Armlet;
use isakit::instruction::{
    check_range, immediate_value, machine_code, pack_fields, unpack_fields, Descriptor,
};
use isakit::{
    Architecture, Emulator, Flow, Instruction, InstructionError, Interrupt, InterruptSink,
    Operation, Parser, ParsingErrorKind, RegisterSpec, ScriptedSink, Status, StepOutcome, Syntax,
    Word,
};

/// Minimal 8-bit accumulator machine with pc-relative branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Tally;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TallyOp {
    Halt,
    Set,
    Add,
    Out,
    Bnz,
}

const ACC: &str = "acc";

impl Architecture for Tally {
    type Op = TallyOp;

    const NAME: &'static str = "tally";
    const WORD_SIZE: u32 = 8;
    const ADDRESS_SIZE: u32 = 5;
    const OPCODE_SIZE: u32 = 3;
    const SYNTAX: Syntax = Syntax {
        comment: ';',
        label_separator: ':',
        label_reference: '&',
        data_directive: ".word",
    };

    fn registers() -> Vec<RegisterSpec> {
        vec![RegisterSpec::new(ACC, 8)]
    }
}

const fn op(op: TallyOp, mnemonic: &'static str, opcode: u64) -> Descriptor<TallyOp> {
    Descriptor {
        op,
        mnemonic,
        opcode,
        words: 1,
    }
}

impl TallyOp {
    fn has_immediate(self) -> bool {
        matches!(self, TallyOp::Set | TallyOp::Add | TallyOp::Bnz)
    }
}

impl Operation for TallyOp {
    type Arch = Tally;

    const DESCRIPTORS: &'static [Descriptor<Self>] = &[
        op(TallyOp::Halt, "halt", 0),
        op(TallyOp::Set, "set", 1),
        op(TallyOp::Add, "add", 2),
        op(TallyOp::Out, "out", 3),
        op(TallyOp::Bnz, "bnz", 4),
    ];

    fn accepts(self, args: &[String]) -> bool {
        args.len() == usize::from(self.has_immediate())
    }

    fn expected_operands(self) -> &'static str {
        if self.has_immediate() {
            "literal"
        } else {
            "no operands"
        }
    }

    fn encode(self, args: &[String]) -> Result<String, InstructionError> {
        let immediate = match args.first() {
            Some(arg) => check_range(immediate_value(arg, &Tally::SYNTAX)?, 5)?,
            None => 0,
        };
        Ok(pack_fields(&[(self.descriptor().opcode as i64, 3), (immediate, 5)]))
    }

    fn decode(self, bits: &str) -> Result<Vec<String>, InstructionError> {
        let fields = unpack_fields(bits, &[3, 5])?;
        if self.has_immediate() {
            Ok(vec![fields[1].to_signed().to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    fn execute<S: InterruptSink>(
        self,
        instr: &Instruction<Self>,
        emulator: &mut Emulator<Tally, S>,
    ) -> Flow {
        let immediate = instr
            .arg(0)
            .and_then(|arg| arg.parse::<i64>().ok())
            .unwrap_or(0);
        let acc = emulator.register(ACC).unwrap_or(Word::zero(8));
        match self {
            TallyOp::Halt => emulator.halt(),
            TallyOp::Set => {
                emulator.set_register(ACC, Word::from_signed(immediate, 8));
            }
            TallyOp::Add => {
                emulator.set_register(ACC, acc.add(Word::from_signed(immediate, 8)));
            }
            TallyOp::Out => {
                let text = acc.to_signed().to_string();
                emulator.call_interrupt(Interrupt::Output(&text));
            }
            TallyOp::Bnz => {
                if !acc.is_zero() {
                    return Flow::Jump(emulator.pc().wrapping_add_signed(immediate));
                }
            }
        }
        Flow::Next
    }

    fn resolve_label(self, target: u64, address: u64) -> i64 {
        match self {
            TallyOp::Bnz => target as i64 - address as i64,
            _ => target as i64,
        }
    }
}

const COUNTDOWN: &str = "
; Count down from 3
        set 3
loop:   out
        add -1
        bnz &loop
        halt
";

#[test]
fn custom_architecture_runs() {
    let program = Parser::<Tally>::new().parse_code(COUNTDOWN, true).unwrap();
    // Comment block plus five instructions
    assert_eq!(program.len(), 6);
    assert_eq!(program[4].args(), ["-2"]);
    assert_eq!(program[4].to_machine_code().unwrap(), "10011110");

    let mut emulator = Emulator::<Tally, ScriptedSink>::new(ScriptedSink::new());
    emulator.load_program(&program).unwrap();
    let summary = emulator.run(Some(100)).unwrap();
    assert_eq!(summary.status, Status::Terminated);
    assert_eq!(emulator.output(), ["3", "2", "1"]);
    assert_eq!(emulator.sink().halts, 1);
}

#[test]
fn custom_architecture_dry_parse_keeps_references() {
    let program = Parser::<Tally>::new().parse_code(COUNTDOWN, false).unwrap();
    assert_eq!(program[4].args(), ["&loop"]);
    assert_eq!(program[4].address(), Some(3));
}

#[test]
fn relative_label_out_of_range() {
    let source = format!("bnz &far\n{}far: halt", ".word 0\n".repeat(40));
    let error = Parser::<Tally>::new().parse_code(&source, true).unwrap_err();
    assert_eq!(error.kind(), ParsingErrorKind::Instruction);
    assert_eq!(error.line, 1);
}

#[test]
fn custom_architecture_memory_wraps() {
    let mut emulator = Emulator::<Tally>::default();
    assert_eq!(emulator.memory_image().len(), 32);
    emulator.set_memory(33, Word::from_signed(5, 8));
    assert_eq!(emulator.memory(1).to_signed(), 5);
    let fragment = emulator.memory_fragment(30, 40);
    assert_eq!(fragment.len(), 2);
    assert_eq!(fragment[0].address, 30);
}

#[test]
fn armlet_program_with_data() {
    let source = "
        mov $1, >table
        mov $2, 0
next:   ld $3, $1
        cmp $3, 0
        beq >done
        add $2, $2, $3
        add $1, $1, 1
        jmp >next
done:   st $2, >result
        out $2
        halt
table:  .data 10, 20, 0x0c, -2, 0
result: .data 0
";
    let program = Parser::<Armlet>::new().parse_code(source, true).unwrap();
    let mut emulator = Emulator::<Armlet, ScriptedSink>::new(ScriptedSink::new());
    emulator.load_program(&program).unwrap();
    assert_eq!(
        emulator.loaded_program_size(),
        machine_code(&program).unwrap().len() / 16
    );

    let summary = emulator.run(None).unwrap();
    assert_eq!(summary.status, Status::Terminated);
    assert_eq!(emulator.output(), ["40"]);

    let result = program.last().unwrap().address().unwrap();
    assert_eq!(emulator.memory(result).to_signed(), 40);
}

#[test]
fn armlet_add_changes_only_destination() {
    let program = Parser::<Armlet>::new()
        .parse_code("add $2, $4, $5", true)
        .unwrap();
    let mut emulator = Emulator::<Armlet, ScriptedSink>::new(ScriptedSink::new());
    emulator.load_program(&program).unwrap();
    emulator.set_register("$4", Word::from_signed(234, 16));
    emulator.set_register("$5", Word::from_signed(67, 16));

    let before: Vec<(&str, Word)> = emulator.registers().iter().collect();
    assert!(emulator.start_execution());
    assert_eq!(
        emulator.execute_single_instruction().unwrap(),
        StepOutcome::Executed
    );
    let after: Vec<(&str, Word)> = emulator.registers().iter().collect();

    assert_eq!(emulator.register("$2").unwrap().to_signed(), 301);
    let changed: Vec<&str> = before
        .iter()
        .zip(&after)
        .filter(|(old, new)| old != new)
        .map(|(old, _)| old.0)
        .collect();
    assert_eq!(changed, vec!["pc", "$2"]);
    assert_eq!(emulator.pc(), 1);
}

#[test]
fn armlet_terminated_machine_only_alerts() {
    let program = Parser::<Armlet>::new()
        .parse_code("mov $1, 9\nhalt", true)
        .unwrap();
    let mut emulator = Emulator::<Armlet, ScriptedSink>::new(ScriptedSink::new());
    emulator.load_program(&program).unwrap();
    emulator.run(None).unwrap();
    assert!(emulator.is_terminated());

    emulator.halt();
    assert_eq!(emulator.sink().halts, 1);

    let pc = emulator.pc();
    assert_eq!(
        emulator.execute_single_instruction().unwrap(),
        StepOutcome::Refused
    );
    assert_eq!(emulator.pc(), pc);
    assert_eq!(emulator.register("$1").unwrap().to_signed(), 9);
    assert_eq!(emulator.sink().alerts.len(), 1);

    emulator.reset();
    assert!(emulator.is_paused());
    assert_eq!(emulator.loaded_program_size(), 0);
}

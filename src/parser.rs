use std::mem;
use std::ops::Range;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{InstructionError, ParsingError, ParsingErrorKind};
use crate::factory::InstructionFactory;
use crate::instruction::{
    is_label_reference, Architecture, Instruction, Kind, Label, Operation, Syntax,
};

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

lazy_static! {
    static ref OPERAND_SEPARATOR: Regex = Regex::new(r"[,\s]+").unwrap();
    static ref LABEL: Regex = Regex::new(r"^[A-Za-z_@.][A-Za-z0-9_@.]*$").unwrap();
}

/// Two-pass assembler for architecture `A`.
///
/// The first pass builds instructions line by line and assigns addresses; the second replaces
/// label references with the values the architecture asks for.
pub struct Parser<A: Architecture> {
    factory: InstructionFactory<A>,
}

/// One physical source line split into its parts.
struct SourceLine<'a> {
    number: usize,
    span: Range<usize>,
    labels: Vec<Label>,
    /// Mnemonic and operands, trimmed. Empty for label-only and comment-only lines.
    body: &'a str,
    comment: Option<&'a str>,
}

impl<A: Architecture> Default for Parser<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Architecture> Parser<A> {
    pub fn new() -> Self {
        Parser {
            factory: InstructionFactory::new(),
        }
    }

    pub fn factory(&self) -> &InstructionFactory<A> {
        &self.factory
    }

    /// Turn `source` into a program.
    ///
    /// With `resolve_labels` unset label references are kept verbatim, which is enough to
    /// validate a program or compute its layout. Duplicate labels are reported either way.
    pub fn parse_code(
        &self,
        source: &str,
        resolve_labels: bool,
    ) -> Result<Vec<Instruction<A::Op>>, ParsingError> {
        let lines = split_lines(source)
            .map(|(number, span, text)| analyze_line(number, span, text, &A::SYNTAX))
            .collect::<Result<Vec<_>, _>>()?;
        let spans: Vec<Range<usize>> = lines.iter().map(|line| line.span.clone()).collect();

        let mut program = self.build(&lines)?;
        resolve::<A>(&mut program, resolve_labels, &spans)?;
        Ok(program)
    }

    fn build(&self, lines: &[SourceLine]) -> Result<Vec<Instruction<A::Op>>, ParsingError> {
        let mut program = Vec::new();
        let mut pending_labels: Vec<Label> = Vec::new();
        // Finished comment runs and the one still being collected
        let mut blocks: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in lines {
            if line.body.is_empty() {
                pending_labels.extend(line.labels.iter().cloned());
                match line.comment {
                    Some(comment) => current.push(comment),
                    // Blank line
                    None if line.labels.is_empty() && !current.is_empty() => {
                        blocks.push(mem::take(&mut current).join("\n"));
                    }
                    None => {}
                }
                continue;
            }

            if !current.is_empty() {
                blocks.push(mem::take(&mut current).join("\n"));
            }
            for block in blocks.drain(..) {
                let mut comment = Instruction::comment_block(block);
                comment.set_line(line.number);
                program.push(comment);
            }

            let mut instr = self.instruction(line.body).map_err(|error| {
                ParsingError::new(ParsingErrorKind::Instruction, line.number, error.to_string())
                    .with_span(line.span.clone())
            })?;
            instr.set_line(line.number);
            instr.set_comment(line.comment.map(str::to_owned));
            let labels = instr.labels_mut();
            labels.append(&mut pending_labels);
            labels.extend(line.labels.iter().cloned());
            program.push(instr);
        }

        // Whatever trails the last instruction still belongs to the program
        let last_line = lines.last().map_or(0, |line| line.number);
        if !current.is_empty() {
            blocks.push(current.join("\n"));
        }
        for block in blocks {
            let mut comment = Instruction::comment_block(block);
            comment.set_line(last_line);
            program.push(comment);
        }
        if !pending_labels.is_empty() {
            let line = pending_labels[0].line;
            let mut end = Instruction::comment_block(String::new());
            end.set_comment(None);
            end.set_line(line);
            end.labels_mut().append(&mut pending_labels);
            program.push(end);
        }
        Ok(program)
    }

    fn instruction(&self, body: &str) -> Result<Instruction<A::Op>, InstructionError> {
        let (mnemonic, operands) = match body.find(char::is_whitespace) {
            Some(index) => body.split_at(index),
            None => (body, ""),
        };
        let args: Vec<String> = OPERAND_SEPARATOR
            .split(operands.trim())
            .filter(|arg| !arg.is_empty())
            .map(str::to_owned)
            .collect();

        if mnemonic.eq_ignore_ascii_case(A::SYNTAX.data_directive) {
            if args.is_empty() {
                return Err(InstructionError::InvalidOperands {
                    mnemonic: A::SYNTAX.data_directive,
                    expected: "one or more values",
                    found: args,
                });
            }
            let data = Instruction::data(args);
            // Range checks
            data.to_machine_code()?;
            return Ok(data);
        }
        self.factory.create_from_mnemonic(mnemonic, args)
    }
}

/// Lines numbered from 1 with their byte range in `source`, line terminators excluded.
fn split_lines(source: &str) -> impl Iterator<Item = (usize, Range<usize>, &str)> {
    let mut offset = 0;
    source.split('\n').enumerate().map(move |(index, raw)| {
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        let span = offset..offset + text.len();
        offset += raw.len() + 1;
        (index + 1, span, text)
    })
}

fn analyze_line<'a>(
    number: usize,
    span: Range<usize>,
    text: &'a str,
    syntax: &Syntax,
) -> Result<SourceLine<'a>, ParsingError> {
    let (code, comment) = match text.find(syntax.comment) {
        Some(index) => (
            &text[..index],
            Some(text[index + syntax.comment.len_utf8()..].trim()),
        ),
        None => (text, None),
    };

    let mut rest = code.trim();
    let mut labels = Vec::new();
    while let Some(index) = rest.find(syntax.label_separator) {
        let name = rest[..index].trim_end();
        // A separator after the mnemonic belongs to the operands
        if name.contains(char::is_whitespace) {
            break;
        }
        check_label(name, syntax).map_err(|(kind, message)| {
            ParsingError::new(kind, number, message).with_span(span.clone())
        })?;
        labels.push(Label {
            name: name.to_owned(),
            line: number,
        });
        rest = rest[index + syntax.label_separator.len_utf8()..].trim_start();
    }

    Ok(SourceLine {
        number,
        span,
        labels,
        body: rest,
        comment,
    })
}

fn check_label(name: &str, syntax: &Syntax) -> Result<(), (ParsingErrorKind, String)> {
    if name.starts_with(syntax.label_reference) {
        return Err((
            ParsingErrorKind::ReservedLabel,
            format!(
                "Label `{}` starts with the label reference prefix `{}`",
                name, syntax.label_reference
            ),
        ));
    }
    if !LABEL.is_match(name) {
        return Err((
            ParsingErrorKind::InvalidLabel,
            format!("Invalid label name `{}`", name),
        ));
    }
    Ok(())
}

/// Assign addresses and collect labels, then substitute label references if asked to.
fn resolve<A: Architecture>(
    program: &mut [Instruction<A::Op>],
    resolve_labels: bool,
    spans: &[Range<usize>],
) -> Result<(), ParsingError> {
    let error = |kind, line: usize, message: String| {
        let error = ParsingError::new(kind, line, message);
        match spans.get(line.wrapping_sub(1)) {
            Some(span) => error.with_span(span.clone()),
            None => error,
        }
    };

    let mut table: FxMap<String, u64> = FxMap::default();
    let mut address = 0u64;
    for instr in program.iter_mut() {
        instr.set_address(address);
        for label in instr.labels() {
            if table.contains_key(&label.name) {
                return Err(error(
                    ParsingErrorKind::DuplicateLabel,
                    label.line,
                    format!("Duplicate label `{}`", label.name),
                ));
            }
            table.insert(label.name.clone(), address);
        }
        address += instr.word_count() as u64;
    }

    if !resolve_labels {
        return Ok(());
    }

    let syntax = A::SYNTAX;
    for instr in program.iter_mut() {
        let kind = instr.kind();
        let line = instr.line();
        let address = instr.address().unwrap_or_default();
        let mut changed = false;
        for arg in instr.args_mut() {
            if !is_label_reference(arg, &syntax) {
                continue;
            }
            let name = &arg[syntax.label_reference.len_utf8()..];
            let target = *table.get(name).ok_or_else(|| {
                error(
                    ParsingErrorKind::UndefinedLabel,
                    line,
                    format!("Undefined label `{}`", name),
                )
            })?;
            let value = match kind {
                Kind::Op(op) => op.resolve_label(target, address),
                Kind::Data | Kind::Comment => target as i64,
            };
            *arg = value.to_string();
            changed = true;
        }
        // Resolved values must still fit their fields
        if changed {
            instr
                .to_machine_code()
                .map_err(|e| error(ParsingErrorKind::Instruction, line, e.to_string()))?;
        }
    }
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, NamedSource, Report, Result};

use isakit::armlet::{Armlet, WORD_SIZE};
use isakit::instruction::machine_code;
use isakit::output::Output;
use isakit::{dprintln, Emulator, Instruction, Kind, StepOutcome, TerminalSink};

/// isakit assembles and runs programs for small, bit-precise instruction set architectures.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` or `.mc` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.asm` or machine code `.mc` file and output to terminal
    Run {
        /// `.asm` or `.mc` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Pause after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
        /// Milliseconds to wait between instructions
        #[arg(short, long, default_value_t = 0)]
        interval: u64,
    },
    /// Create machine code `.mc` file, one word per line
    Assemble {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination to output `.mc` file
        dest: Option<PathBuf>,
    },
    /// Check a `.asm` file without running or outputting machine code
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Show address, machine code and source of every instruction
    List {
        /// `.asm` file to list
        name: PathBuf,
    },
    /// Place a watch on a `.asm` file to receive constant assembler updates
    Watch {
        /// `.asm` file to watch
        name: PathBuf,
    },
}

struct RunOptions {
    minimal: bool,
    max_steps: Option<u64>,
    interval: Duration,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    isakit::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(isakit::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                minimal,
                max_steps,
                interval,
            } => {
                let options = RunOptions {
                    minimal,
                    max_steps,
                    interval: Duration::from_millis(interval),
                };
                run(&name, &options)
            }
            Command::Assemble { name, dest } => {
                file_message(Green, "Assembling", &name);
                let program = assemble(&name)?;
                let bits = machine_code(&program).into_diagnostic()?;

                let mut contents = String::new();
                for word in bits.as_bytes().chunks(WORD_SIZE as usize) {
                    contents.push_str(&String::from_utf8_lossy(word));
                    contents.push('\n');
                }
                let out_file_name = dest.unwrap_or_else(|| name.with_extension("mc"));
                fs::write(&out_file_name, contents).into_diagnostic()?;

                message(Green, "Finished", "emit machine code");
                file_message(Green, "Saved", &out_file_name);
                Ok(())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let _ = assemble(&name)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::List { name } => {
                let program = assemble(&name)?;
                for instr in &program {
                    print_listing(instr)?;
                }
                Ok(())
            }
            Command::Watch { name } => {
                if !name.exists() {
                    bail!("File does not exist. Exiting...")
                }
                // Vim breaks if watching a single file
                let folder_path = match name.parent() {
                    Some(pth) if pth.is_dir() => pth.to_path_buf(),
                    _ => Path::new(".").to_path_buf(),
                };

                // Clear screen and move cursor to top left
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Cyan, "Help", "press CTRL+C to exit");

                let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500))
                    .into_diagnostic()?;

                watcher
                    .watch(folder_path, move |event: Event| match event.kind {
                        // Watch remove for vim changes
                        EventKind::Modify(_) | EventKind::Remove(_) => {
                            // Clear screen
                            print!("\x1B[2J\x1B[2;1H");
                            file_message(Green, "Watching", &name);
                            message(Green, "Re-checking", "file change detected");
                            message(Cyan, "Help", "press CTRL+C to exit");

                            // Makes reruns more obvious
                            sleep(Duration::from_millis(50));

                            match assemble(&name) {
                                Ok(_) => message(Green, "Success", "no errors found!"),
                                Err(e) => eprintln!("\n{:?}", e),
                            }
                            Flow::Continue
                        }
                        _ => Flow::Continue,
                    })
                    .into_diagnostic()?;
                watcher.run();
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        let options = RunOptions {
            minimal: false,
            max_steps: None,
            interval: Duration::ZERO,
        };
        run(&path, &options)
    } else {
        println!("\n~ isakit v{VERSION} ~");
        println!("{}", LOGO.truecolor(126, 200, 227).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

/// Status line on stderr, dropped with `--minimal`.
fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    eprintln!("{left:>12} {right}");
}

fn run(name: &Path, options: &RunOptions) -> Result<()> {
    Output::set_minimal(options.minimal);
    let mut emulator = Emulator::<Armlet, TerminalSink>::new(TerminalSink::new());

    match name.extension().and_then(|ext| ext.to_str()) {
        Some("asm") => {
            file_message(MsgColor::Green, "Assembling", name);
            let program = assemble(name)?;
            emulator.load_program(&program).into_diagnostic()?;
        }
        Some("mc") => {
            file_message(MsgColor::Green, "Loading", name);
            let contents = fs::read_to_string(name).into_diagnostic()?;
            emulator.load_machine_code(&contents).into_diagnostic()?;
        }
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    }

    message(MsgColor::Green, "Running", "loaded program");
    if !emulator.start_execution() {
        bail!("Program could not be started");
    }

    let trace = isakit::env::is_trace_enabled();
    while emulator.is_running() {
        if options
            .max_steps
            .is_some_and(|max| emulator.steps() >= max)
        {
            emulator.pause_execution();
            Output::Normal.start_new_line();
            message(MsgColor::Red, "Stopped", "step limit reached");
            break;
        }
        if trace {
            let instr = emulator.peek_instruction().into_diagnostic()?;
            dprintln!(Sometimes, "{:>6}  {}", emulator.pc(), instr);
        }
        if emulator.execute_single_instruction().into_diagnostic()? == StepOutcome::Refused {
            break;
        }
        if !options.interval.is_zero() {
            sleep(options.interval);
        }
    }

    if trace {
        Output::Normal.start_new_line();
        Output::Diagnostic(isakit::output::Condition::Sometimes).print_registers(&emulator);
    }
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

/// Assemble a source file, rendering parse errors against its text.
fn assemble(name: &Path) -> Result<Vec<Instruction<isakit::armlet::Op>>> {
    let source = fs::read_to_string(name).into_diagnostic()?;
    let parser = isakit::Parser::<Armlet>::new();
    parser.parse_code(&source, true).map_err(|error| {
        Report::new(error).with_source_code(NamedSource::new(name.display().to_string(), source))
    })
}

fn print_listing(instr: &Instruction<isakit::armlet::Op>) -> Result<()> {
    let source = instr.to_source();
    // Also carries labels naming the end of the program
    if instr.kind() == Kind::Comment {
        for line in source.lines() {
            println!("{:>6}  {:>16}  {}", "", "", line.dimmed());
        }
        return Ok(());
    }

    let address = instr.address().unwrap_or_default();
    let bits = instr.to_machine_code().into_diagnostic()?;
    let mut words = bits.as_bytes().chunks(WORD_SIZE as usize);
    let first = words.next().map(String::from_utf8_lossy).unwrap_or_default();
    println!("{:>6}  {:>16}  {}", format!("{:04x}", address).cyan(), first, source);
    for (offset, word) in words.enumerate() {
        let address = address + offset as u64 + 1;
        println!(
            "{:>6}  {:>16}",
            format!("{:04x}", address).cyan(),
            String::from_utf8_lossy(word)
        );
    }
    Ok(())
}

const LOGO: &str = r#"
  _           _    _ _
 (_)___  __ _| | _(_) |_
 | / __|/ _` | |/ / | __|
 | \__ \ (_| |   <| | |_
 |_|___/\__,_|_|\_\_|\__|"#;

const SHORT_INFO: &str = r"
Welcome to isakit, a toolkit for assembling and emulating small instruction set
architectures. Programs are written for the 16-bit Armlet machine.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");

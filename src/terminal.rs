use std::io::{self, BufRead, Write};

use colored::Colorize;

use crate::interrupt::{InterruptSink, Signal};
use crate::output::{Condition, Output};

/// Interrupt handlers for an interactive terminal.
///
/// Input is read line by line from stdin; output goes to stdout one value per line.
#[derive(Debug, Default)]
pub struct TerminalSink {
    alerts: usize,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts raised so far.
    pub fn alerts(&self) -> usize {
        self.alerts
    }
}

impl InterruptSink for TerminalSink {
    fn input(&mut self, prompt: &str) -> Option<String> {
        Output::Normal.start_new_line();
        dprint!(Sometimes, "{}> ", prompt);
        // A prompt that fails to show does not stop the read
        let _ = io::stderr().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                // Echoed newline from the terminal
                Output::set_line_start(true);
                Some(line.trim_end_matches(['\r', '\n']).to_owned())
            }
        }
    }

    fn output(&mut self, text: &str) -> Signal {
        Output::Normal.print_str(text);
        Output::Normal.print_str("\n");
        // `print!` already panics on a closed stdout, so a failed flush only delays output
        let _ = io::stdout().flush();
        Signal::Resume
    }

    fn halt(&mut self) {
        Output::Normal.start_new_line();
        dprintln!(Sometimes, "Halted");
    }

    fn alert(&mut self, message: &str) -> Signal {
        self.alerts += 1;
        Output::Normal.start_new_line();
        let text = format!("{} {}\n", "Alert:".red().bold(), message);
        Output::Diagnostic(Condition::Always).print_str(&text);
        Signal::Resume
    }
}

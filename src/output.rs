use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::emulator::Emulator;
use crate::instruction::Architecture;
use crate::interrupt::InterruptSink;

#[macro_export]
macro_rules! dprint {
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            $fmt
            $($tt)*
        );
        $crate::output::Output::Diagnostic($cond).print_str(&s);
    }};
    // Trigger type error if missing condition
    ( $fmt:literal $($tt:tt)* ) => {{
        $crate::output::Output::Diagnostic($fmt);
    }};
}

#[macro_export]
macro_rules! dprintln {
    ( $cond:expr ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        $crate::output::Output::Diagnostic($cond).print_str("\n");
    }};
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Diagnostic($cond).print_str(&s);
    }};
    // Trigger type error if missing condition
    ( $fmt:literal $($tt:tt)* ) => {{
        $crate::output::Output::Diagnostic($fmt);
    }};
}

/// Where text goes: program output on stdout, everything about the run on stderr.
#[derive(Clone, Copy, Debug)]
pub enum Output {
    Normal,
    Diagnostic(Condition),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Printed even with `--minimal`, without colour.
    Always,
    /// Dropped with `--minimal`.
    Sometimes,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_line_start(new_value: bool) -> bool {
        Self::IS_LINE_START.with(|value| value.replace(new_value))
    }
    /// Private. Use [`Output::start_new_line`].
    fn is_line_start() -> bool {
        Self::IS_LINE_START.with(|value| *value.borrow())
    }
    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    fn set_line_start_from_str(string: &str) {
        let last = Decolored::new(string).last();
        if let Some(ch) = last {
            Output::set_line_start(ch == '\n');
        }
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                // Program output is printed as is, even if `--minimal`
                print!("{}", string);
                Self::set_line_start_from_str(string);
            }

            Self::Diagnostic(condition) => match (Self::is_minimal(), *condition) {
                (false, _) => {
                    eprint!("{}", ColoredString::from(string).blue());
                    Self::set_line_start_from_str(string);
                }
                // Always remove color if `--minimal`
                (true, Condition::Always) => {
                    eprint_colorless(string);
                    Self::set_line_start_from_str(string);
                }
                (true, Condition::Sometimes) => (),
            },
        }
    }

    pub fn start_new_line(&self) {
        if !Self::is_line_start() {
            self.print_str("\n");
        }
    }

    /// Table of every register in declaration order, `pc` first.
    pub fn print_registers<A: Architecture, S: InterruptSink>(&self, emulator: &Emulator<A, S>) {
        if Self::is_minimal() {
            for (name, value) in emulator.registers().iter() {
                self.print_str(&format!("{} {}\n", name, value.to_signed()));
            }
            return;
        }

        let header = format!("{:>5}  {:>8}  {:>7}  {:>6}", "", "hex", "int", "uint");
        let rows: Vec<String> = emulator
            .registers()
            .iter()
            .map(|(name, value)| {
                let digits = value.len().div_ceil(4) as usize;
                let hex = format!("0x{:0digits$x}", value.to_unsigned(), digits = digits);
                format!(
                    "{:>5}  {:>8}  {:>7}  {:>6}",
                    name,
                    hex,
                    value.to_signed(),
                    value.to_unsigned()
                )
            })
            .collect();
        let width = rows
            .iter()
            .map(|row| row.chars().count())
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or_default();
        let rule = "─".repeat(width + 2);

        self.print_str(&format!("\x1b[2m┌{}┐\x1b[0m\n", rule));
        self.print_str(&format!(
            "\x1b[2m│ \x1b[3m{:width$}\x1b[0m\x1b[2m │\x1b[0m\n",
            header,
            width = width
        ));
        for row in rows {
            self.print_str(&format!(
                "\x1b[2m│\x1b[0m \x1b[1m{:width$}\x1b[0m \x1b[2m│\x1b[0m\n",
                row,
                width = width
            ));
        }
        self.print_str(&format!("\x1b[2m└{}┘\x1b[0m\n", rule));
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn eprint_colorless(string: &str) {
    for ch in Decolored::new(string) {
        eprint!("{}", ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decolored() {
        assert_eq!(Decolored::new("abcdef").collect::<String>(), "abcdef");
        assert_eq!(
            Decolored::new("abc\x1b[0;2mdef\x1b[0m").collect::<String>(),
            "abcdef"
        );
        assert_eq!(Decolored::new("abc\x1b[0xyz").collect::<String>(), "abc");
        assert_eq!(
            Decolored::new("abc\x1bw[0bxyzmdef").collect::<String>(),
            "abcdef"
        );
    }

    #[test]
    fn line_start_tracking() {
        Output::set_line_start(true);
        Output::set_line_start_from_str("abc\x1b[0m");
        assert!(!Output::is_line_start());
        Output::set_line_start_from_str("abc\n\x1b[0m");
        assert!(Output::is_line_start());
        // Colour codes alone do not move the cursor
        Output::set_line_start_from_str("\x1b[2m");
        assert!(Output::is_line_start());
    }
}

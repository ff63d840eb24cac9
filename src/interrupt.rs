use std::collections::VecDeque;

/// Named synchronous call from the emulator to its host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt<'a> {
    /// Ask the host for a line of input.
    Input(&'a str),
    /// Print a value.
    Output(&'a str),
    /// The machine is stopping for good.
    Halt,
    /// Something the user should know about, such as stepping a terminated machine.
    Alert(&'a str),
}

impl Interrupt<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Interrupt::Input(_) => "input",
            Interrupt::Output(_) => "output",
            Interrupt::Halt => "halt",
            Interrupt::Alert(_) => "alert",
        }
    }
}

/// What the machine should do once a handler returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Signal {
    #[default]
    Resume,
    Terminate,
}

/// Host side of the interrupt table. Handlers run while the machine is paused.
pub trait InterruptSink {
    /// `None` when no input is available.
    fn input(&mut self, _prompt: &str) -> Option<String> {
        None
    }

    fn output(&mut self, _text: &str) -> Signal {
        Signal::Resume
    }

    fn halt(&mut self) {}

    fn alert(&mut self, _message: &str) -> Signal {
        Signal::Resume
    }
}

/// Ignores every interrupt.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl InterruptSink for NullSink {}

/// Replays queued input and records everything else.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSink {
    inputs: VecDeque<String>,
    pub outputs: Vec<String>,
    pub alerts: Vec<String>,
    pub prompts: Vec<String>,
    pub halts: usize,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I, T>(inputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        ScriptedSink {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn push_input(&mut self, input: impl Into<String>) {
        self.inputs.push_back(input.into());
    }
}

impl InterruptSink for ScriptedSink {
    fn input(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_owned());
        self.inputs.pop_front()
    }

    fn output(&mut self, text: &str) -> Signal {
        self.outputs.push(text.to_owned());
        Signal::Resume
    }

    fn halt(&mut self) {
        self.halts += 1;
    }

    fn alert(&mut self, message: &str) -> Signal {
        self.alerts.push(message.to_owned());
        Signal::Resume
    }
}

//! Compiled device script

use std::fmt::{self, Write as _};

/// Number of pins in the GPIO register
pub const GPIO_PINS: u8 = 32;

/// What a `pin` statement does to its bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinAction {
    High,
    Low,
    Toggle,
}

impl PinAction {
    /// Apply the action to a register value
    pub fn apply(self, register: u32, pin: u8) -> u32 {
        let mask = 1u32 << pin;
        match self {
            PinAction::High => register | mask,
            PinAction::Low => register & !mask,
            PinAction::Toggle => register ^ mask,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PinAction::High => "high",
            PinAction::Low => "low",
            PinAction::Toggle => "toggle",
        }
    }
}

/// A single VM instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Append text to the console
    Print(String),
    /// Change one GPIO bit
    Pin { pin: u8, action: PinAction },
    /// Suspend for a number of ticks
    Wait(u32),
    /// Enter a loop; `count` of None loops forever. `end` is the index of
    /// the matching [`Op::LoopEnd`].
    LoopStart { count: Option<u32>, end: usize },
    /// Close a loop opened at `start`
    LoopEnd { start: usize },
    /// Report a recoverable device error
    Error(String),
    /// Report an unrecoverable device error and stop
    Abort(String),
    /// Stop the program
    Halt,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Print(text) => write!(f, "PRINT {:?}", text),
            Op::Pin { pin, action } => write!(f, "PIN {} {}", pin, action.name()),
            Op::Wait(ticks) => write!(f, "WAIT {}", ticks),
            Op::LoopStart { count: None, end } => write!(f, "LOOP -> {:04}", end),
            Op::LoopStart {
                count: Some(count),
                end,
            } => write!(f, "REPEAT {} -> {:04}", count, end),
            Op::LoopEnd { start } => write!(f, "END <- {:04}", start),
            Op::Error(msg) => write!(f, "ERROR {:?}", msg),
            Op::Abort(msg) => write!(f, "ABORT {:?}", msg),
            Op::Halt => write!(f, "HALT"),
        }
    }
}

/// Where an instruction came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A compiled program ready to load into a [`ScriptMachine`](crate::ScriptMachine)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// Project the program was built from
    pub name: String,
    /// Instructions in execution order
    pub ops: Vec<Op>,
    /// Source location of each op; empty unless built for debugging
    pub locations: Vec<SourceLocation>,
}

impl Program {
    /// Create a program without debug information
    pub fn new(name: impl Into<String>, ops: Vec<Op>) -> Self {
        Self {
            name: name.into(),
            ops,
            locations: Vec::new(),
        }
    }

    /// Whether source locations were recorded
    pub fn has_debug_info(&self) -> bool {
        !self.locations.is_empty()
    }

    /// Source location of the op at `index`
    pub fn location(&self, index: usize) -> Option<&SourceLocation> {
        self.locations.get(index)
    }

    /// Render the generated code, one instruction per line
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; {} ({} ops)", self.name, self.ops.len());
        for (index, op) in self.ops.iter().enumerate() {
            match self.location(index) {
                Some(at) => {
                    let _ = writeln!(out, "{:04}  {:<32}; {}", index, op.to_string(), at);
                }
                None => {
                    let _ = writeln!(out, "{:04}  {}", index, op);
                }
            }
        }
        out
    }

    /// Bytes of text held by the program's instructions
    pub fn string_bytes(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                Op::Print(text) | Op::Error(text) | Op::Abort(text) => text.len(),
                _ => 0,
            })
            .sum()
    }

    /// Number of text constants in the program
    pub fn string_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Print(_) | Op::Error(_) | Op::Abort(_)))
            .count()
    }
}

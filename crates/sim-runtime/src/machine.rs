//! Script virtual machine
//!
//! Executes a compiled [`Program`] one tick at a time. A tick runs until the
//! program waits, ends, faults, or uses up its instruction budget, so a
//! single step never blocks the caller for long.

use std::mem::size_of;

use tracing::{debug, trace};

use crate::program::{Op, Program};
use crate::{DeviceRuntime, MemoryStats, StepOutcome};

/// Default number of instructions executed per tick
pub const DEFAULT_INSTRUCTION_BUDGET: u32 = 1000;

/// Heap the simulated device starts with
pub const DEVICE_HEAP_SIZE: usize = 40 * 1024;

/// An active `loop`/`repeat`
#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    /// Iterations left including the current one; None loops forever
    remaining: Option<u32>,
}

/// A running device script
#[derive(Debug)]
pub struct ScriptMachine {
    program: Program,
    pc: usize,
    loops: Vec<LoopFrame>,
    /// Ticks left before execution resumes
    sleep: u32,
    gpio: u32,
    console: String,
    budget: u32,
    finished: bool,
}

impl ScriptMachine {
    /// Load a program
    pub fn new(program: Program, budget: u32) -> Self {
        Self {
            program,
            pc: 0,
            loops: Vec::new(),
            sleep: 0,
            gpio: 0,
            console: String::new(),
            budget: budget.max(1),
            finished: false,
        }
    }

    /// The loaded program
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Whether the program has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.loops.clear();
    }

    /// Fault text, with the source location in debug builds
    fn fault_message(&self, at: usize, message: &str) -> String {
        match self.program.location(at) {
            Some(location) => format!("{} (at {})", message, location),
            None => message.to_string(),
        }
    }
}

impl DeviceRuntime for ScriptMachine {
    fn step(&mut self) -> StepOutcome {
        if self.finished {
            return StepOutcome::Finished;
        }
        if self.sleep > 0 {
            self.sleep -= 1;
            if self.sleep > 0 {
                return StepOutcome::Continue;
            }
        }

        for _ in 0..self.budget {
            let Some(op) = self.program.ops.get(self.pc) else {
                debug!("Program {} ran off the end", self.program.name);
                self.finish();
                return StepOutcome::Finished;
            };
            let at = self.pc;
            self.pc += 1;
            trace!("{:04} {}", at, op);

            match op {
                Op::Print(text) => self.console.push_str(text),
                Op::Pin { pin, action } => self.gpio = action.apply(self.gpio, *pin),
                Op::Wait(ticks) => {
                    self.sleep = *ticks;
                    return StepOutcome::Continue;
                }
                Op::LoopStart { count: Some(0), end } => self.pc = end + 1,
                Op::LoopStart { count, .. } => self.loops.push(LoopFrame { remaining: *count }),
                Op::LoopEnd { start } => {
                    let body = start + 1;
                    match self.loops.last_mut() {
                        Some(LoopFrame { remaining: None }) => self.pc = body,
                        Some(LoopFrame { remaining: Some(n) }) if *n > 1 => {
                            *n -= 1;
                            self.pc = body;
                        }
                        _ => {
                            self.loops.pop();
                        }
                    }
                }
                Op::Error(message) => {
                    return StepOutcome::Fault {
                        message: self.fault_message(at, message),
                        fatal: false,
                    };
                }
                Op::Abort(message) => {
                    let message = self.fault_message(at, message);
                    self.finish();
                    return StepOutcome::Fault {
                        message,
                        fatal: true,
                    };
                }
                Op::Halt => {
                    self.finish();
                    return StepOutcome::Finished;
                }
            }
        }

        // Budget exhausted; pick up at the same pc next tick
        StepOutcome::Continue
    }

    fn take_console(&mut self) -> String {
        std::mem::take(&mut self.console)
    }

    fn gpio_state(&self) -> u32 {
        self.gpio
    }

    fn listing(&self) -> Option<String> {
        Some(self.program.listing())
    }

    fn memory(&self) -> Option<MemoryStats> {
        let code = self.program.ops.len() * size_of::<Op>();
        let strings = self.program.string_bytes() + self.console.len();
        let frames = self.loops.len() * size_of::<LoopFrame>();
        Some(MemoryStats {
            free: DEVICE_HEAP_SIZE.saturating_sub(code + strings + frames),
            objects: self.loops.len(),
            strings: self.program.string_count(),
            other: self.program.ops.len(),
        })
    }
}

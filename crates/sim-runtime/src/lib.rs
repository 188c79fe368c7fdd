//! Device Runtime Library
//!
//! This crate defines the seam between the simulation controller and the
//! embedded interpreter it drives, and ships the built-in device script VM:
//!
//! - **DeviceRuntime**: one running device, advanced a tick at a time
//! - **RuntimeLoader**: compiles a file set into a fresh runtime
//! - **ScriptLoader**: the line-oriented device script language
//!
//! # Example
//!
//! ```rust
//! use sim_package::VirtualFileSet;
//! use sim_runtime::{RuntimeLoader, ScriptLoader, StepOutcome};
//!
//! let mut files = VirtualFileSet::new();
//! files.add("main.script", b"pin 2 high\nprintln \"hello\"\n".to_vec()).unwrap();
//!
//! let mut runtime = ScriptLoader::new().load(&files, "demo").unwrap();
//! assert_eq!(runtime.step(), StepOutcome::Finished);
//! assert_eq!(runtime.take_console(), "hello\n");
//! assert_eq!(runtime.gpio_state(), 0x04);
//! ```

pub mod compiler;
pub mod error;
pub mod loader;
pub mod machine;
pub mod program;

use serde::{Deserialize, Serialize};
use sim_package::VirtualFileSet;

pub use compiler::{compile, compile_with};
pub use error::{BuildError, Diagnostic};
pub use loader::{ScriptConfig, ScriptLoader, DEFAULT_ENTRY};
pub use machine::{ScriptMachine, DEFAULT_INSTRUCTION_BUDGET, DEVICE_HEAP_SIZE};
pub use program::{Op, PinAction, Program, SourceLocation, GPIO_PINS};

/// Result of advancing a runtime by one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The device is still running
    Continue,
    /// The program ended normally
    Finished,
    /// A device-level error. Fatal faults end the session.
    Fault { message: String, fatal: bool },
}

/// Options for one build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Keep source locations for listings and fault messages
    pub debug: bool,
}

/// Heap usage reported by a runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Free heap in bytes
    pub free: usize,
    /// Live objects
    pub objects: usize,
    /// Live strings
    pub strings: usize,
    /// Other allocations
    pub other: usize,
}

/// A running embedded device
pub trait DeviceRuntime: Send {
    /// Advance simulated time by one tick. Must return promptly.
    fn step(&mut self) -> StepOutcome;

    /// Take console text produced since the last call
    fn take_console(&mut self) -> String;

    /// Current GPIO register value
    fn gpio_state(&self) -> u32;

    /// Human-readable listing of the loaded code, if the runtime has one
    fn listing(&self) -> Option<String> {
        None
    }

    /// Current heap usage, if the runtime tracks it
    fn memory(&self) -> Option<MemoryStats> {
        None
    }
}

/// Builds runtimes from project files
pub trait RuntimeLoader {
    /// Compile `files` and load the result into a new runtime
    fn load(
        &self,
        files: &VirtualFileSet,
        project_name: &str,
    ) -> Result<Box<dyn DeviceRuntime>, BuildError>;

    /// Compile with build options. Loaders without debug support ignore them.
    fn load_with(
        &self,
        files: &VirtualFileSet,
        project_name: &str,
        options: BuildOptions,
    ) -> Result<Box<dyn DeviceRuntime>, BuildError> {
        let _ = options;
        self.load(files, project_name)
    }
}

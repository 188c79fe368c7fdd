//! Simulation controller
//!
//! The state machine that sequences build, run, pause, and stop for one
//! project and owns the device runtime while a session is live.
//!
//! ```text
//! Idle --build--> Built --run--> Running <--pause/run--> Paused
//!   ^               |               |                      |
//!   +-----stop------+------stop-----+---------stop---------+
//! ```
//!
//! `build` is accepted from every state and replaces any live runtime.
//! Output is pushed to an optional handler as it is produced and also
//! accumulated for callers that prefer to poll.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sim_package::VirtualFileSet;
use sim_runtime::{
    BuildError, BuildOptions, MemoryStats, RuntimeLoader, ScriptConfig, ScriptLoader, StepOutcome,
};
use tracing::{debug, error, info, warn};

use crate::error::ControlError;
use crate::gpio::{GpioSample, LedIndicator};
use crate::handle::RuntimeHandle;
use crate::poll::DEFAULT_POLL_PERIOD;

/// Simulation lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationState {
    /// No runtime loaded
    #[default]
    Idle,
    /// Runtime loaded, not started
    Built,
    /// Runtime advancing on every tick
    Running,
    /// Runtime loaded, ticking suspended
    Paused,
}

impl SimulationState {
    /// Lowercase name for logs and messages
    pub fn name(&self) -> &'static str {
        match self {
            SimulationState::Idle => "idle",
            SimulationState::Built => "built",
            SimulationState::Running => "running",
            SimulationState::Paused => "paused",
        }
    }
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a piece of output belongs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    /// Text printed by the device, and device faults
    Console,
    /// Build diagnostics and session notices
    Build,
}

impl OutputChannel {
    /// Whether this is the build channel
    pub fn is_build(self) -> bool {
        self == OutputChannel::Build
    }
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationEvent {
    /// The lifecycle state changed
    StateChanged {
        from: SimulationState,
        to: SimulationState,
    },
    /// At least one GPIO bit changed during a tick
    GpioChanged(GpioSample),
}

/// What one tick produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number within the session, starting at 1
    pub tick: u64,
    /// Console text produced during the tick
    pub console: String,
    /// GPIO sample taken after the tick
    pub gpio: GpioSample,
    /// How the device step ended
    pub outcome: StepOutcome,
    /// Heap usage after the tick, if the runtime reports it
    pub memory: Option<MemoryStats>,
}

/// Controller and polling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Script runtime settings
    pub script: ScriptConfig,
    /// Poll period in milliseconds
    pub poll_period_ms: u64,
    /// Status LED wiring
    pub led: LedIndicator,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            script: ScriptConfig::default(),
            poll_period_ms: DEFAULT_POLL_PERIOD.as_millis() as u64,
            led: LedIndicator::default(),
        }
    }
}

impl ControllerConfig {
    /// Poll period as a duration
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }
}

type OutputHandler = Box<dyn FnMut(&str, OutputChannel) + Send>;

/// Drives one device runtime through its lifecycle
pub struct SimulationController<L = ScriptLoader> {
    loader: L,
    state: SimulationState,
    handle: Option<RuntimeHandle>,
    project_name: String,
    console: String,
    build_log: String,
    output: Option<OutputHandler>,
    event_buffer: Vec<SimulationEvent>,
    /// Last heap usage sampled this session
    memory: Option<MemoryStats>,
}

impl SimulationController<ScriptLoader> {
    /// Create a controller for the built-in script runtime
    pub fn new() -> Self {
        Self::with_loader(ScriptLoader::new())
    }

    /// Create a controller from configuration
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::with_loader(ScriptLoader::from_config(config.script.clone()))
    }
}

impl Default for SimulationController<ScriptLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: RuntimeLoader> SimulationController<L> {
    /// Create a controller that builds runtimes with `loader`
    pub fn with_loader(loader: L) -> Self {
        Self {
            loader,
            state: SimulationState::Idle,
            handle: None,
            project_name: String::new(),
            console: String::new(),
            build_log: String::new(),
            output: None,
            event_buffer: Vec::new(),
            memory: None,
        }
    }

    /// Install the output callback
    pub fn set_output_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str, OutputChannel) + Send + 'static,
    {
        self.output = Some(Box::new(handler));
    }

    /// Compile `files` into a fresh runtime
    ///
    /// Any live runtime is released first. On failure the diagnostics go to
    /// the build channel and the controller is left idle.
    pub fn build(&mut self, files: VirtualFileSet, project_name: &str) -> Result<(), BuildError> {
        self.build_with(files, project_name, BuildOptions::default())
    }

    /// Compile with explicit build options
    pub fn build_with(
        &mut self,
        files: VirtualFileSet,
        project_name: &str,
        options: BuildOptions,
    ) -> Result<(), BuildError> {
        self.handle = None;
        self.memory = None;
        self.console.clear();
        self.build_log.clear();
        self.project_name = project_name.to_string();

        if options.debug {
            self.notice(&format!("Building {} (debug)", project_name));
        } else {
            self.notice(&format!("Building {}", project_name));
        }
        match self.loader.load_with(&files, project_name, options) {
            Ok(runtime) => {
                let handle = RuntimeHandle::new(runtime, project_name);
                self.memory = handle.memory();
                self.handle = Some(handle);
                self.notice("0 errors. Ready to run");
                self.set_state(SimulationState::Built);
                Ok(())
            }
            Err(err) => {
                warn!("Build of {} failed: {}", project_name, err);
                for diagnostic in &err.diagnostics {
                    self.notice(&diagnostic.to_string());
                }
                let count = err.diagnostics.len();
                self.notice(&format!(
                    "***** {} error{}",
                    count,
                    if count == 1 { "" } else { "s" }
                ));
                self.set_state(SimulationState::Idle);
                Err(err)
            }
        }
    }

    /// Start or resume ticking
    pub fn run(&mut self) -> Result<(), ControlError> {
        if !self.can_run() {
            return Err(self.reject("run"));
        }
        if self.state == SimulationState::Paused {
            self.notice("*** Resumed");
        } else {
            self.notice("*** Program started");
        }
        self.set_state(SimulationState::Running);
        Ok(())
    }

    /// Suspend ticking, keeping the runtime
    pub fn pause(&mut self) -> Result<(), ControlError> {
        if !self.can_pause() {
            return Err(self.reject("pause"));
        }
        self.notice("*** Paused");
        self.set_state(SimulationState::Paused);
        Ok(())
    }

    /// Release the runtime and return to idle
    pub fn stop(&mut self) -> Result<(), ControlError> {
        if !self.can_stop() {
            return Err(self.reject("stop"));
        }
        self.handle = None;
        self.console.clear();
        self.notice("*** Stopped");
        self.set_state(SimulationState::Idle);
        Ok(())
    }

    /// Build and start in one step
    pub fn simulate(&mut self, files: VirtualFileSet, project_name: &str) -> Result<(), BuildError> {
        self.simulate_with(files, project_name, BuildOptions::default())
    }

    /// Build with explicit options and start
    pub fn simulate_with(
        &mut self,
        files: VirtualFileSet,
        project_name: &str,
        options: BuildOptions,
    ) -> Result<(), BuildError> {
        self.build_with(files, project_name, options)?;
        if let Err(e) = self.run() {
            error!("Freshly built project could not start: {}", e);
        }
        Ok(())
    }

    /// Whether `run` would be accepted
    pub fn can_run(&self) -> bool {
        matches!(self.state, SimulationState::Built | SimulationState::Paused)
            && self.handle.is_some()
    }

    /// Whether `pause` would be accepted
    pub fn can_pause(&self) -> bool {
        self.state == SimulationState::Running
    }

    /// Whether `stop` would be accepted
    pub fn can_stop(&self) -> bool {
        self.state != SimulationState::Idle
    }

    /// Advance the device by one tick
    ///
    /// Does nothing unless running. Console text is accumulated and pushed
    /// to the console channel; a GPIO change emits an event.
    pub fn tick(&mut self) -> Option<TickReport> {
        if self.state != SimulationState::Running {
            return None;
        }
        let (outcome, console, gpio, tick, memory) = {
            let handle = self.handle.as_mut()?;
            let outcome = handle.advance();
            (
                outcome,
                handle.drain_console(),
                handle.sample_gpio(),
                handle.ticks(),
                handle.memory(),
            )
        };
        if memory.is_some() {
            self.memory = memory;
        }

        if !console.is_empty() {
            self.emit(&console, OutputChannel::Console);
        }
        if gpio.has_changes() {
            debug!(
                "GPIO {:#010X} changed {:#010X}",
                gpio.value, gpio.changed
            );
            self.event_buffer.push(SimulationEvent::GpioChanged(gpio));
        }

        match &outcome {
            StepOutcome::Continue => {}
            StepOutcome::Fault {
                message,
                fatal: false,
            } => {
                warn!("Device error in {}: {}", self.project_name, message);
                self.emit(&format!("*** Error: {}\n", message), OutputChannel::Console);
            }
            StepOutcome::Fault {
                message,
                fatal: true,
            } => {
                error!("Fatal device error in {}: {}", self.project_name, message);
                self.emit(
                    &format!("*** Fatal error: {}\n", message),
                    OutputChannel::Console,
                );
                self.handle = None;
                self.set_state(SimulationState::Idle);
            }
            StepOutcome::Finished => {
                self.notice("*** Finished");
                self.handle = None;
                self.set_state(SimulationState::Idle);
            }
        }

        Some(TickReport {
            tick,
            console,
            gpio,
            outcome,
            memory,
        })
    }

    /// Write the loaded program's listing to the build channel
    pub fn print_code(&mut self) -> Option<String> {
        let listing = self.handle.as_ref()?.listing()?;
        self.emit(&listing, OutputChannel::Build);
        Some(listing)
    }

    /// Current state
    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Whether a runtime is loaded
    pub fn has_runtime(&self) -> bool {
        self.handle.is_some()
    }

    /// Ticks advanced in the current session
    pub fn ticks(&self) -> u64 {
        self.handle.as_ref().map_or(0, RuntimeHandle::ticks)
    }

    /// Name given to the last build
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Console text accumulated this session
    pub fn console(&self) -> &str {
        &self.console
    }

    /// Build channel text since the last build
    pub fn build_log(&self) -> &str {
        &self.build_log
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        std::mem::take(&mut self.event_buffer)
    }

    /// Heap usage at the last tick, kept after the session ends
    pub fn memory_stats(&self) -> Option<MemoryStats> {
        self.memory
    }

    fn set_state(&mut self, to: SimulationState) {
        let from = self.state;
        if from != to {
            info!("Simulation {}: {} -> {}", self.project_name, from, to);
            self.state = to;
            self.event_buffer
                .push(SimulationEvent::StateChanged { from, to });
        }
    }

    fn reject(&self, action: &'static str) -> ControlError {
        warn!("Ignoring {} while {}", action, self.state);
        ControlError::InvalidTransition {
            action,
            state: self.state,
        }
    }

    fn notice(&mut self, line: &str) {
        self.emit(&format!("{}\n", line), OutputChannel::Build);
    }

    fn emit(&mut self, text: &str, channel: OutputChannel) {
        match channel {
            OutputChannel::Console => self.console.push_str(text),
            OutputChannel::Build => self.build_log.push_str(text),
        }
        if let Some(output) = self.output.as_mut() {
            output(text, channel);
        }
    }
}

//! Owned device runtime
//!
//! A [`RuntimeHandle`] is acquired when a build succeeds and released when
//! it is dropped: on stop, rebuild, fatal fault, program end, or when the
//! owning controller goes away.

use std::fmt;

use sim_runtime::{DeviceRuntime, MemoryStats, StepOutcome};
use tracing::{debug, info};

use crate::gpio::GpioSample;

/// Exclusive owner of one running device
pub struct RuntimeHandle {
    runtime: Box<dyn DeviceRuntime>,
    project: String,
    ticks: u64,
    /// GPIO value at the previous drain
    last_gpio: u32,
}

impl RuntimeHandle {
    /// Take ownership of a freshly loaded runtime
    pub fn new(runtime: Box<dyn DeviceRuntime>, project: impl Into<String>) -> Self {
        let project = project.into();
        info!("Acquired device runtime for {}", project);
        Self {
            runtime,
            project,
            ticks: 0,
            last_gpio: 0,
        }
    }

    /// Advance the device by one tick
    pub fn advance(&mut self) -> StepOutcome {
        self.ticks += 1;
        let outcome = self.runtime.step();
        debug!("{} tick {}: {:?}", self.project, self.ticks, outcome);
        outcome
    }

    /// Take console text produced since the last drain
    pub fn drain_console(&mut self) -> String {
        self.runtime.take_console()
    }

    /// Sample the GPIO register against the previous sample
    pub fn sample_gpio(&mut self) -> GpioSample {
        let value = self.runtime.gpio_state();
        let sample = GpioSample::between(self.last_gpio, value);
        self.last_gpio = value;
        sample
    }

    /// Ticks advanced so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Heap usage reported by the runtime
    pub fn memory(&self) -> Option<MemoryStats> {
        self.runtime.memory()
    }

    /// Listing of the loaded code
    pub fn listing(&self) -> Option<String> {
        self.runtime.listing()
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("project", &self.project)
            .field("ticks", &self.ticks)
            .field("last_gpio", &format_args!("{:#010X}", self.last_gpio))
            .finish_non_exhaustive()
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        info!(
            "Released device runtime for {} after {} ticks",
            self.project, self.ticks
        );
    }
}

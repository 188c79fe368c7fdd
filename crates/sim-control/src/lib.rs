//! Simulation Control Library
//!
//! This crate drives device scripts through a simulation session:
//!
//! - **SimulationController**: the build/run/pause/stop state machine
//! - **PollLoop**: the fixed-period driver that ticks a running controller
//! - **LedIndicator**: edge-triggered GPIO reporting for status LEDs
//! - **ProjectDocument**: a package on disk paired with a controller
//!
//! # Example
//!
//! ```rust
//! use sim_control::{LedIndicator, SimulationController, SimulationEvent, SimulationState};
//! use sim_package::VirtualFileSet;
//!
//! let mut files = VirtualFileSet::new();
//! files.add("main.script", b"loop\n pin 2 toggle\n wait 1\nend\n".to_vec()).unwrap();
//!
//! let mut ctl = SimulationController::new();
//! ctl.simulate(files, "blink").unwrap();
//! assert_eq!(ctl.state(), SimulationState::Running);
//!
//! ctl.tick();
//! let led = LedIndicator::default();
//! for event in ctl.drain_events() {
//!     if let SimulationEvent::GpioChanged(sample) = event {
//!         // The status LED is active-low: pin 2 going high turns it off
//!         assert_eq!(led.update(&sample), Some(false));
//!     }
//! }
//! ```

pub mod controller;
pub mod document;
pub mod error;
pub mod gpio;
pub mod handle;
pub mod poll;

pub use controller::{
    ControllerConfig, OutputChannel, SimulationController, SimulationEvent, SimulationState,
    TickReport,
};
pub use document::ProjectDocument;
pub use error::{ControlError, DocumentError};
pub use gpio::{GpioEdge, GpioSample, LedIndicator};
pub use handle::RuntimeHandle;
pub use poll::{run_poll_loop, PollCommand, PollExit, PollLoop, PollSummary, DEFAULT_POLL_PERIOD};

//! Fixed-period polling driver
//!
//! The controller never schedules itself. [`PollLoop::poll`] is the
//! synchronous entry point a host event loop calls on its own timer;
//! [`run_poll_loop`] is an async driver that does the same with a tokio
//! interval, takes control commands over a channel, and publishes controller
//! events on a broadcast channel. Commands are applied before the next tick,
//! so pause and stop take effect immediately.

use std::time::Duration;

use sim_runtime::RuntimeLoader;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::{SimulationController, SimulationEvent, SimulationState, TickReport};

/// Default tick period
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(50);

/// Shortest accepted tick period
const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Ticks a controller at a fixed period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLoop {
    period: Duration,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self {
            period: DEFAULT_POLL_PERIOD,
        }
    }
}

impl PollLoop {
    /// Create a driver with the given period
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_POLL_PERIOD),
        }
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tick the controller if it is running
    pub fn poll<L: RuntimeLoader>(
        &self,
        controller: &mut SimulationController<L>,
    ) -> Option<TickReport> {
        if controller.state() == SimulationState::Running {
            controller.tick()
        } else {
            None
        }
    }
}

/// Commands accepted by [`run_poll_loop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    /// Start or resume the simulation
    Run,
    /// Pause the simulation
    Pause,
    /// Stop the simulation; ends the loop
    Stop,
    /// End the loop, leaving the controller as it is
    Shutdown,
}

/// Why [`run_poll_loop`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The controller went idle (stopped, finished, or faulted)
    Idle,
    /// Shutdown was requested or the command channel closed
    Shutdown,
    /// The tick limit was reached
    TickLimit,
}

/// Result of a [`run_poll_loop`] run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Ticks performed by this loop
    pub ticks: u64,
    /// Why the loop ended
    pub exit: PollExit,
}

/// Drive a controller until it goes idle, a shutdown arrives, or
/// `max_ticks` ticks have run
///
/// The controller is borrowed for the duration of the loop. Console and
/// build text reach the caller through the controller's output handler;
/// controller events are drained after every command and tick and sent on
/// `event_tx`.
pub async fn run_poll_loop<L: RuntimeLoader>(
    controller: &mut SimulationController<L>,
    poll: PollLoop,
    mut cmd_rx: mpsc::Receiver<PollCommand>,
    event_tx: broadcast::Sender<SimulationEvent>,
    max_ticks: Option<u64>,
) -> PollSummary {
    let mut timer: Interval = interval(poll.period());
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    info!(
        "Starting poll loop for {} every {:?}",
        controller.project_name(),
        poll.period()
    );

    let exit = loop {
        for event in controller.drain_events() {
            // No subscribers is fine
            let _ = event_tx.send(event);
        }
        if controller.state() == SimulationState::Idle {
            break PollExit::Idle;
        }
        if max_ticks.is_some_and(|max| ticks >= max) {
            break PollExit::TickLimit;
        }

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                let result = match cmd {
                    Some(PollCommand::Run) => {
                        timer.reset();
                        controller.run()
                    }
                    Some(PollCommand::Pause) => controller.pause(),
                    Some(PollCommand::Stop) => controller.stop(),
                    Some(PollCommand::Shutdown) => {
                        info!("Shutdown requested for poll loop");
                        break PollExit::Shutdown;
                    }
                    None => {
                        debug!("Poll command channel closed");
                        break PollExit::Shutdown;
                    }
                };
                if let Err(e) = result {
                    warn!("Poll command {:?} rejected: {}", cmd, e);
                }
            }

            _ = timer.tick(), if controller.state() == SimulationState::Running => {
                if poll.poll(controller).is_some() {
                    ticks += 1;
                }
            }
        }
    };

    info!("Poll loop ended after {} ticks ({:?})", ticks, exit);
    PollSummary { ticks, exit }
}

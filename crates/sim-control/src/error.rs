//! Error types for simulation control and documents

use sim_package::{FormatError, PackageError};
use sim_runtime::BuildError;
use thiserror::Error;

use crate::controller::SimulationState;

/// Errors from the simulation state machine
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// A control call was made in a state that forbids it.
    /// The controller is left unchanged.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// The rejected action
        action: &'static str,
        /// State at the time of the call
        state: SimulationState,
    },
}

/// Errors from project document operations
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Package could not be read or written
    #[error("package error: {0}")]
    Package(#[from] PackageError),

    /// Binary image could not be decoded
    #[error("image error: {0}")]
    Image(#[from] FormatError),

    /// Build failed
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Control call rejected
    #[error(transparent)]
    Control(#[from] ControlError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

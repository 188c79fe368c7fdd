//! GPIO sampling and edge detection
//!
//! The controller samples the device's GPIO register after every tick and
//! reports the value together with a change mask: the XOR against the
//! previous sample. Observers react to set bits in the mask only.

use serde::{Deserialize, Serialize};

use sim_runtime::GPIO_PINS;

/// One GPIO register sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioSample {
    /// Raw register value
    pub value: u32,
    /// Bits that differ from the previous sample
    pub changed: u32,
}

impl GpioSample {
    /// Sample `current`, diffing against `previous`
    pub fn between(previous: u32, current: u32) -> Self {
        Self {
            value: current,
            changed: previous ^ current,
        }
    }

    /// Whether any bit changed
    pub fn has_changes(&self) -> bool {
        self.changed != 0
    }

    /// Raw level of a pin
    pub fn level(&self, pin: u8) -> bool {
        pin_mask(pin) & self.value != 0
    }

    /// One edge per changed bit, lowest pin first
    pub fn edges(self) -> impl Iterator<Item = GpioEdge> {
        (0..GPIO_PINS)
            .filter(move |&pin| pin_mask(pin) & self.changed != 0)
            .map(move |pin| GpioEdge {
                pin,
                level: self.level(pin),
            })
    }
}

/// A single pin transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioEdge {
    /// Pin number
    pub pin: u8,
    /// Raw level after the edge
    pub level: bool,
}

impl GpioEdge {
    /// Bit went from clear to set
    pub fn is_rising(&self) -> bool {
        self.level
    }
}

/// Maps one GPIO pin to an on/off UI indicator
///
/// The board's status LED sits on pin 2 and is wired active-low: the LED
/// is lit while the raw bit is clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedIndicator {
    /// Pin the LED is wired to
    pub pin: u8,
    /// LED is lit when the bit is clear
    pub active_low: bool,
}

impl Default for LedIndicator {
    fn default() -> Self {
        Self {
            pin: 2,
            active_low: true,
        }
    }
}

impl LedIndicator {
    /// Register mask for this LED
    pub fn mask(&self) -> u32 {
        pin_mask(self.pin)
    }

    /// UI state for a raw register value
    pub fn is_on(&self, value: u32) -> bool {
        (value & self.mask() != 0) != self.active_low
    }

    /// New UI state if this LED's bit changed in `sample`
    pub fn update(&self, sample: &GpioSample) -> Option<bool> {
        (sample.changed & self.mask() != 0).then(|| self.is_on(sample.value))
    }
}

fn pin_mask(pin: u8) -> u32 {
    1u32.checked_shl(u32::from(pin)).unwrap_or(0)
}

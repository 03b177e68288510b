//! The extracted weather record and the single-slot handoff to its consumer.

use std::sync::{Mutex, MutexGuard};

/// Kelvin offset used when presenting temperatures in Celsius.
pub const KELVIN_OFFSET: f32 = 273.15;

/// One weather reading as served by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeatherSample {
    /// Relative humidity in percent.
    pub humidity: u32,
    /// Temperature in kelvin.
    pub temperature: f32,
    /// Pressure in hPa.
    pub pressure: f32,
    /// Set when the sample was published and not yet consumed.
    pub valid: bool,
}

impl WeatherSample {
    pub fn celsius(&self) -> f32 {
        self.temperature - KELVIN_OFFSET
    }
}

/// Single-slot mailbox between the fetch task and its consumer.
///
/// Not a queue: publishing over an unconsumed sample replaces it. The valid
/// flag is written together with the fields under one lock, so a reader never
/// observes a half-written sample.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<WeatherSample>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `sample` and mark it fresh.
    pub fn publish(&self, sample: WeatherSample) {
        let mut slot = self.lock();
        *slot = WeatherSample {
            valid: true,
            ..sample
        };
    }

    /// Clear the valid flag, keeping the last values.
    pub fn invalidate(&self) {
        self.lock().valid = false;
    }

    /// Read a fresh sample and clear its flag. `None` when nothing new arrived.
    pub fn take(&self) -> Option<WeatherSample> {
        let mut slot = self.lock();
        if !slot.valid {
            return None;
        }
        let sample = *slot;
        slot.valid = false;
        Some(sample)
    }

    /// Current slot contents, flag included, without clearing anything.
    pub fn peek(&self) -> WeatherSample {
        *self.lock()
    }

    pub fn is_fresh(&self) -> bool {
        self.lock().valid
    }

    fn lock(&self) -> MutexGuard<'_, WeatherSample> {
        // The slot holds plain data; a panic mid-write cannot leave it torn.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

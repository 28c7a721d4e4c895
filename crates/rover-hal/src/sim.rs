//! In-process simulated hardware for headless runs and CI.
//!
//! These stubs record what they were told and return plausible readings so
//! the whole rover stack can run on a development machine.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::sensor::DistanceSource;
//! use rover_hal::sim::ScriptedDistance;
//!
//! let mut sensor = ScriptedDistance::new([30.0, 18.0]);
//! assert_eq!(sensor.read_cm(), Some(30.0));
//! assert_eq!(sensor.read_cm(), Some(18.0));
//! assert_eq!(sensor.read_cm(), Some(18.0)); // last value repeats
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rover_types::RoverError;
use tracing::debug;

use crate::actuator::Actuator;
use crate::motor::MotorDriver;
use crate::sensor::{DistanceSource, VoltageSource};

// ────────────────────────────────────────────────────────────────────────────
// Servo and motor stubs
// ────────────────────────────────────────────────────────────────────────────

/// A simulated servo that records the most recent commanded position.
pub struct SimServo {
    id: String,
    position: f32,
}

impl SimServo {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            position: 0.0,
        })
    }
}

impl Actuator for SimServo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_position(&mut self, value: f32) -> Result<(), RoverError> {
        debug!(servo = %self.id, value, "[SIM] servo position");
        self.position = value;
        Ok(())
    }

    fn position(&self) -> f32 {
        self.position
    }
}

/// Shared record of every level a [`SimMotor`] was commanded to.
/// `stop()` is recorded as `0.0`.
#[derive(Clone, Default)]
pub struct MotorLog(Arc<Mutex<Vec<f32>>>);

impl MotorLog {
    pub fn levels(&self) -> Vec<f32> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, level: f32) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(level);
    }
}

/// A simulated motor.  Always succeeds.
pub struct SimMotor {
    id: String,
    level: f32,
    log: Option<MotorLog>,
}

impl SimMotor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level: 0.0,
            log: None,
        }
    }

    /// A motor plus a handle to the levels it receives.
    pub fn with_log(id: impl Into<String>) -> (Self, MotorLog) {
        let log = MotorLog::default();
        let motor = Self {
            id: id.into(),
            level: 0.0,
            log: Some(log.clone()),
        };
        (motor, log)
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

impl MotorDriver for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_level(&mut self, level: f32) -> Result<(), RoverError> {
        self.level = level;
        if let Some(log) = &self.log {
            log.push(level);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RoverError> {
        self.set_level(0.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Distance sensors
// ────────────────────────────────────────────────────────────────────────────

/// Length of one cycle of the synthetic ultrasonic pattern, in seconds.
const PATTERN_PERIOD_S: f32 = 8.0;

/// Ultrasonic sensor stand-in that sweeps a repeating far → near → far
/// pattern so the guard and autonomy loops have something to react to.
///
/// | Phase (s) | Reading |
/// |---|---|
/// | 0–2 | 120 cm |
/// | 2–4 | ramps from 120 cm down to 40 cm |
/// | 4–6 | 20 cm |
/// | 6–8 | 80 cm |
pub struct SimulatedUltrasonic {
    start: Instant,
    override_cm: Option<f32>,
}

impl SimulatedUltrasonic {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            override_cm: None,
        }
    }

    /// Pin the reading to `cm`; `None` restores the automatic pattern.
    pub fn set_distance(&mut self, cm: Option<f32>) {
        self.override_cm = cm;
    }

    fn pattern_at(elapsed_s: f32) -> f32 {
        let t = elapsed_s % PATTERN_PERIOD_S;
        if t < 2.0 {
            120.0
        } else if t < 4.0 {
            120.0 - (t - 2.0) * 40.0
        } else if t < 6.0 {
            20.0
        } else {
            80.0
        }
    }
}

impl Default for SimulatedUltrasonic {
    fn default() -> Self {
        Self::new()
    }
}

impl DistanceSource for SimulatedUltrasonic {
    fn read_cm(&mut self) -> Option<f32> {
        if let Some(cm) = self.override_cm {
            return Some(cm.max(0.0));
        }
        Some(Self::pattern_at(self.start.elapsed().as_secs_f32()))
    }
}

/// Replays a fixed list of readings, repeating the last one forever.
///
/// Negative values replay as-is (the "unavailable" sentinel); an empty
/// script reads as `None`.
pub struct ScriptedDistance {
    readings: VecDeque<f32>,
    last: Option<f32>,
    closed: Arc<AtomicBool>,
}

impl ScriptedDistance {
    pub fn new(readings: impl IntoIterator<Item = f32>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that flips to `true` when the sensor is closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl DistanceSource for ScriptedDistance {
    fn read_cm(&mut self) -> Option<f32> {
        if let Some(next) = self.readings.pop_front() {
            self.last = Some(next);
        }
        self.last
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Voltage sources
// ────────────────────────────────────────────────────────────────────────────

/// Default environment variable consulted by [`EnvVoltage`].
pub const DEFAULT_BATTERY_ENV: &str = "ROBOT_BATTERY_VOLTS";

/// Reads the battery voltage from an environment variable, falling back to a
/// fixed value when it is unset or unparsable.  Lets an operator simulate a
/// draining battery from another shell.
pub struct EnvVoltage {
    var: String,
    default: f32,
}

impl EnvVoltage {
    pub fn new(var: impl Into<String>, default: f32) -> Self {
        Self {
            var: var.into(),
            default,
        }
    }
}

impl Default for EnvVoltage {
    fn default() -> Self {
        Self::new(DEFAULT_BATTERY_ENV, 12.0)
    }
}

impl VoltageSource for EnvVoltage {
    fn read_volts(&mut self) -> f32 {
        match std::env::var(&self.var) {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                debug!(var = %self.var, value = %raw, "unparsable battery voltage, using default");
                self.default
            }),
            Err(_) => self.default,
        }
    }
}

/// Replays a fixed list of voltages, repeating the last one forever.
pub struct ScriptedVoltage {
    readings: VecDeque<f32>,
    last: f32,
}

impl ScriptedVoltage {
    pub fn new(readings: impl IntoIterator<Item = f32>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last: 0.0,
        }
    }
}

impl VoltageSource for ScriptedVoltage {
    fn read_volts(&mut self) -> f32 {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        self.last
    }
}

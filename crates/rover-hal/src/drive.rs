//! [`DriveTrain`] – the drive-train command model.
//!
//! Translates high-level maneuvers (forward, backward, turn, stop) into two
//! per-side levels, applying a global speed scale and a per-side trim that
//! corrects motor asymmetry.  Without physical motors the same commands move
//! a simulated robot around a grid.
//!
//! One `DriveTrain` is shared (behind an [`Arc`][std::sync::Arc]) by the
//! command dispatcher, the autonomy loop, and the safety loops.  Every method
//! takes `&self`; the per-side computation and the motor writes happen under
//! a single internal lock, so each call is atomic with respect to the others.
//! Pre-emption between callers is last-writer-wins: the safety loops re-assert
//! [`DriveTrain::stop`] on every poll while their condition holds.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::drive::{DriveConfig, DriveTrain, Motors};
//! use rover_types::{Heading, MotionKind};
//!
//! let drive = DriveTrain::new(DriveConfig::default(), Motors::Simulated).unwrap();
//! drive.forward(1.0).unwrap();
//! drive.turn_right(0.5).unwrap();
//! drive.stop().unwrap();
//!
//! assert_eq!(drive.position(), (0.0, 1.0));
//! assert_eq!(drive.heading(), Heading::East);
//! assert_eq!(drive.last_action(), (MotionKind::Stop, 0.0));
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rover_types::{Heading, MotionKind, RoverError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::motor::MotorDriver;

pub const SPEED_SCALE_MIN: f32 = 0.1;
pub const SPEED_SCALE_MAX: f32 = 2.0;
pub const TRIM_LIMIT: f32 = 0.5;
/// Highest usable BCM GPIO number on a 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Static drive-train wiring and simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// `(forward, backward)` BCM pins of the left motor.
    pub left_pins: (u8, u8),
    /// `(forward, backward)` BCM pins of the right motor.
    pub right_pins: (u8, u8),
    /// Simulated distance travelled per poll at full output.
    pub sim_step: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            left_pins: (17, 18),
            right_pins: (22, 23),
            sim_step: 1.0,
        }
    }
}

impl DriveConfig {
    /// Reject out-of-range or overlapping pins and a non-positive `sim_step`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] describing the first problem.
    pub fn validate(&self) -> Result<(), RoverError> {
        let pins = [
            self.left_pins.0,
            self.left_pins.1,
            self.right_pins.0,
            self.right_pins.1,
        ];
        if let Some(pin) = pins.iter().find(|p| **p > MAX_BCM_PIN) {
            return Err(RoverError::Configuration(format!(
                "motor pin {pin} is outside BCM range 0..={MAX_BCM_PIN}"
            )));
        }
        let unique: HashSet<u8> = pins.iter().copied().collect();
        if unique.len() != pins.len() {
            return Err(RoverError::Configuration(format!(
                "motor pins must be distinct, got left={:?} right={:?}",
                self.left_pins, self.right_pins
            )));
        }
        if self.sim_step.is_nan() || self.sim_step <= 0.0 {
            return Err(RoverError::Configuration(format!(
                "sim_step must be positive, got {}",
                self.sim_step
            )));
        }
        Ok(())
    }
}

/// Which actuators sit behind the drive train, chosen at construction.
pub enum Motors {
    /// No hardware: commands update simulated odometry.
    Simulated,
    Physical {
        left: Box<dyn MotorDriver>,
        right: Box<dyn MotorDriver>,
    },
}

struct DriveState {
    speed_scale: f32,
    trim: (f32, f32),
    last_action: (MotionKind, f32),
    outputs: (f32, f32),
    position: (f32, f32),
    heading: Heading,
    motors: Motors,
}

/// Shared drive-train handle.  See the module docs.
pub struct DriveTrain {
    config: DriveConfig,
    state: Mutex<DriveState>,
}

impl DriveTrain {
    /// Build a drive train over `motors`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] when `config` fails
    /// [`DriveConfig::validate`].
    pub fn new(config: DriveConfig, motors: Motors) -> Result<Self, RoverError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(DriveState {
                speed_scale: 1.0,
                trim: (0.0, 0.0),
                last_action: (MotionKind::Stop, 0.0),
                outputs: (0.0, 0.0),
                position: (0.0, 0.0),
                heading: Heading::North,
                motors,
            }),
        })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn is_simulation(&self) -> bool {
        matches!(self.lock().motors, Motors::Simulated)
    }

    // -------------------------------------------------------------------------
    // Maneuvers
    // -------------------------------------------------------------------------

    /// Drive both sides forward at `speed`.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidSpeed`] for a negative `speed`, or the motor
    /// driver's [`RoverError::HardwareFault`].
    pub fn forward(&self, speed: f32) -> Result<(), RoverError> {
        self.maneuver(MotionKind::Forward, speed)
    }

    /// Drive both sides backward at `speed`.
    ///
    /// # Errors
    ///
    /// As for [`DriveTrain::forward`].
    pub fn backward(&self, speed: f32) -> Result<(), RoverError> {
        self.maneuver(MotionKind::Backward, speed)
    }

    /// Spin in place counter-clockwise: left side back, right side forward.
    ///
    /// # Errors
    ///
    /// As for [`DriveTrain::forward`].
    pub fn turn_left(&self, speed: f32) -> Result<(), RoverError> {
        self.maneuver(MotionKind::TurnLeft, speed)
    }

    /// Spin in place clockwise: left side forward, right side back.
    ///
    /// # Errors
    ///
    /// As for [`DriveTrain::forward`].
    pub fn turn_right(&self, speed: f32) -> Result<(), RoverError> {
        self.maneuver(MotionKind::TurnRight, speed)
    }

    /// Stop both sides.
    ///
    /// Both motors are always commanded; if either fails the first failure is
    /// returned after the other has been attempted.
    ///
    /// # Errors
    ///
    /// The first [`RoverError::HardwareFault`] reported by a motor.
    pub fn stop(&self) -> Result<(), RoverError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.last_action = (MotionKind::Stop, 0.0);
        state.outputs = (0.0, 0.0);
        match &mut state.motors {
            Motors::Simulated => {
                debug!("simulated stop");
                Ok(())
            }
            Motors::Physical { left, right } => stop_both(&mut **left, &mut **right),
        }
    }

    /// Return the simulated robot to the origin facing north and stop.
    ///
    /// # Errors
    ///
    /// As for [`DriveTrain::stop`].
    pub fn reset(&self) -> Result<(), RoverError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.position = (0.0, 0.0);
        state.heading = Heading::North;
        state.last_action = (MotionKind::Reset, 0.0);
        state.outputs = (0.0, 0.0);
        match &mut state.motors {
            Motors::Simulated => {
                debug!("simulation reset to origin facing north");
                Ok(())
            }
            Motors::Physical { left, right } => stop_both(&mut **left, &mut **right),
        }
    }

    // -------------------------------------------------------------------------
    // Tuning
    // -------------------------------------------------------------------------

    pub fn set_speed_scale(&self, scale: f32) {
        let mut state = self.lock();
        state.speed_scale = clamp_finite(state.speed_scale, scale, SPEED_SCALE_MIN, SPEED_SCALE_MAX);
        debug!(speed_scale = state.speed_scale, "speed scale set");
    }

    pub fn adjust_speed_scale(&self, delta: f32) {
        let mut state = self.lock();
        let target = state.speed_scale + delta;
        state.speed_scale = clamp_finite(state.speed_scale, target, SPEED_SCALE_MIN, SPEED_SCALE_MAX);
        debug!(speed_scale = state.speed_scale, "speed scale adjusted");
    }

    pub fn set_trim(&self, left: f32, right: f32) {
        let mut state = self.lock();
        state.trim = (
            clamp_finite(state.trim.0, left, -TRIM_LIMIT, TRIM_LIMIT),
            clamp_finite(state.trim.1, right, -TRIM_LIMIT, TRIM_LIMIT),
        );
        debug!(left = state.trim.0, right = state.trim.1, "trim set");
    }

    pub fn adjust_trim(&self, left_delta: f32, right_delta: f32) {
        let mut state = self.lock();
        let (left, right) = state.trim;
        state.trim = (
            clamp_finite(left, left + left_delta, -TRIM_LIMIT, TRIM_LIMIT),
            clamp_finite(right, right + right_delta, -TRIM_LIMIT, TRIM_LIMIT),
        );
        debug!(left = state.trim.0, right = state.trim.1, "trim adjusted");
    }

    pub fn reset_trim(&self) {
        self.lock().trim = (0.0, 0.0);
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn speed_scale(&self) -> f32 {
        self.lock().speed_scale
    }

    /// `(left, right)` trim.
    pub fn trim(&self) -> (f32, f32) {
        self.lock().trim
    }

    /// Most recent command and its (clamped, unscaled) magnitude.
    pub fn last_action(&self) -> (MotionKind, f32) {
        self.lock().last_action
    }

    /// `(left, right)` levels produced by the most recent command.
    pub fn outputs(&self) -> (f32, f32) {
        self.lock().outputs
    }

    /// Simulated `(x, y)` position.  Stays at the origin on physical motors.
    pub fn position(&self) -> (f32, f32) {
        self.lock().position
    }

    pub fn heading(&self) -> Heading {
        self.lock().heading
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, DriveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn maneuver(&self, kind: MotionKind, speed: f32) -> Result<(), RoverError> {
        let speed = clamp_speed(speed)?;
        let (raw_left, raw_right) = match kind {
            MotionKind::Forward => (speed, speed),
            MotionKind::Backward => (-speed, -speed),
            MotionKind::TurnLeft => (-speed, speed),
            MotionKind::TurnRight => (speed, -speed),
            MotionKind::Stop | MotionKind::Reset => (0.0, 0.0),
        };

        let mut guard = self.lock();
        let state = &mut *guard;
        let left = side_output(raw_left, state.speed_scale, state.trim.0);
        let right = side_output(raw_right, state.speed_scale, state.trim.1);
        state.last_action = (kind, speed);
        state.outputs = (left, right);

        match &mut state.motors {
            Motors::Physical {
                left: left_motor,
                right: right_motor,
            } => {
                left_motor.set_level(left)?;
                right_motor.set_level(right)?;
            }
            Motors::Simulated => match kind {
                MotionKind::Forward | MotionKind::Backward => {
                    let distance = self.config.sim_step * (left + right) / 2.0;
                    let (dx, dy) = state.heading.delta();
                    state.position.0 += dx * distance;
                    state.position.1 += dy * distance;
                    debug!(
                        x = state.position.0,
                        y = state.position.1,
                        heading = ?state.heading,
                        "simulated move"
                    );
                }
                MotionKind::TurnLeft => {
                    state.heading = state.heading.rotated_left();
                    debug!(heading = ?state.heading, "simulated turn");
                }
                MotionKind::TurnRight => {
                    state.heading = state.heading.rotated_right();
                    debug!(heading = ?state.heading, "simulated turn");
                }
                MotionKind::Stop | MotionKind::Reset => {}
            },
        }
        Ok(())
    }
}

fn clamp_speed(speed: f32) -> Result<f32, RoverError> {
    if !(speed >= 0.0) {
        return Err(RoverError::InvalidSpeed(speed));
    }
    if speed > 1.0 {
        debug!(requested = speed, "clamped speed to 1.0");
        return Ok(1.0);
    }
    Ok(speed)
}

/// Scale `raw`, push it away from zero by `trim`, and clamp so the result
/// keeps the sign of `raw`.  A zero target stays zero.
fn side_output(raw: f32, scale: f32, trim: f32) -> f32 {
    if raw > 0.0 {
        (raw * scale + trim).clamp(0.0, 1.0)
    } else if raw < 0.0 {
        (raw * scale - trim).clamp(-1.0, 0.0)
    } else {
        0.0
    }
}

/// Clamp `target` into `[min, max]`, keeping `current` for non-finite input.
fn clamp_finite(current: f32, target: f32, min: f32, max: f32) -> f32 {
    if target.is_finite() {
        target.clamp(min, max)
    } else {
        current
    }
}

fn stop_both(left: &mut dyn MotorDriver, right: &mut dyn MotorDriver) -> Result<(), RoverError> {
    let left_result = left.stop();
    let right_result = right.stop();
    left_result.and(right_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimMotor;

    const EPS: f32 = 1e-5;

    fn sim() -> DriveTrain {
        DriveTrain::new(DriveConfig::default(), Motors::Simulated).unwrap()
    }

    struct FaultyMotor;

    impl MotorDriver for FaultyMotor {
        fn id(&self) -> &str {
            "faulty"
        }

        fn set_level(&mut self, _level: f32) -> Result<(), RoverError> {
            Err(RoverError::HardwareFault {
                component: "faulty".to_string(),
                details: "h-bridge fault".to_string(),
            })
        }

        fn stop(&mut self) -> Result<(), RoverError> {
            self.set_level(0.0)
        }
    }

    #[test]
    fn forward_and_backward_move_simulation() {
        let drive = sim();
        drive.forward(1.0).unwrap();
        assert_eq!(drive.position(), (0.0, 1.0));
        assert_eq!(drive.last_action(), (MotionKind::Forward, 1.0));

        let drive = sim();
        drive.backward(1.0).unwrap();
        assert_eq!(drive.position(), (0.0, -1.0));
        assert_eq!(drive.last_action(), (MotionKind::Backward, 1.0));
    }

    #[test]
    fn turns_rotate_heading_without_translating() {
        let drive = sim();
        drive.turn_left(1.0).unwrap();
        assert_eq!(drive.heading(), Heading::West);
        assert_eq!(drive.last_action(), (MotionKind::TurnLeft, 1.0));

        let drive = sim();
        drive.turn_right(1.0).unwrap();
        assert_eq!(drive.heading(), Heading::East);
        assert_eq!(drive.position(), (0.0, 0.0));

        drive.forward(1.0).unwrap();
        assert_eq!(drive.position(), (1.0, 0.0));
    }

    #[test]
    fn stop_always_overwrites_last_action() {
        for speed in [0.0, 0.25, 0.5, 1.0] {
            let drive = sim();
            drive.turn_left(0.3).unwrap();
            drive.forward(speed).unwrap();
            drive.stop().unwrap();
            assert_eq!(drive.last_action(), (MotionKind::Stop, 0.0));
            assert_eq!(drive.outputs(), (0.0, 0.0));
        }
    }

    #[test]
    fn negative_speed_is_rejected() {
        let drive = sim();
        assert_eq!(drive.forward(-0.1), Err(RoverError::InvalidSpeed(-0.1)));
        assert!(matches!(drive.backward(-1.0), Err(RoverError::InvalidSpeed(_))));
        assert!(matches!(drive.turn_left(-0.5), Err(RoverError::InvalidSpeed(_))));
        assert!(matches!(drive.turn_right(-2.0), Err(RoverError::InvalidSpeed(_))));
        assert!(matches!(drive.forward(f32::NAN), Err(RoverError::InvalidSpeed(_))));
        assert_eq!(drive.last_action(), (MotionKind::Stop, 0.0));
    }

    #[test]
    fn speed_above_one_is_clamped() {
        let drive = sim();
        drive.forward(2.5).unwrap();
        assert_eq!(drive.position(), (0.0, 1.0));
        assert_eq!(drive.last_action(), (MotionKind::Forward, 1.0));
    }

    #[test]
    fn speed_scale_is_clamped_and_idempotent() {
        let drive = sim();
        drive.set_speed_scale(10.0);
        assert_eq!(drive.speed_scale(), 2.0);
        drive.set_speed_scale(10.0);
        assert_eq!(drive.speed_scale(), 2.0);
        drive.set_speed_scale(0.0);
        assert_eq!(drive.speed_scale(), 0.1);
        drive.adjust_speed_scale(-5.0);
        assert_eq!(drive.speed_scale(), 0.1);
        drive.set_speed_scale(f32::NAN);
        assert_eq!(drive.speed_scale(), 0.1);
    }

    #[test]
    fn trim_is_clamped_per_side() {
        let drive = sim();
        drive.set_trim(1.0, -1.0);
        assert_eq!(drive.trim(), (0.5, -0.5));
        drive.set_trim(1.0, -1.0);
        assert_eq!(drive.trim(), (0.5, -0.5));
        drive.adjust_trim(-0.2, 0.0);
        assert!((drive.trim().0 - 0.3).abs() < EPS);
    }

    #[test]
    fn reset_trim_after_adjustments_returns_to_zero() {
        let drive = sim();
        drive.adjust_trim(0.2, -0.1);
        drive.adjust_trim(0.4, -0.7);
        drive.adjust_trim(-0.05, 0.3);
        drive.reset_trim();
        assert_eq!(drive.trim(), (0.0, 0.0));
    }

    #[test]
    fn scale_and_trim_shape_outputs() {
        let drive = sim();
        drive.set_speed_scale(1.5);
        drive.set_trim(0.1, 0.0);
        drive.forward(0.5).unwrap();
        let (left, right) = drive.outputs();
        assert!((left - 0.85).abs() < EPS);
        assert!((right - 0.75).abs() < EPS);

        drive.backward(0.5).unwrap();
        let (left, right) = drive.outputs();
        assert!((left + 0.85).abs() < EPS);
        assert!((right + 0.75).abs() < EPS);

        drive.set_speed_scale(2.0);
        drive.forward(1.0).unwrap();
        assert_eq!(drive.outputs(), (1.0, 1.0));
    }

    #[test]
    fn trim_cannot_reverse_direction() {
        let drive = sim();
        drive.set_speed_scale(0.1);
        drive.set_trim(-0.5, -0.5);
        drive.forward(0.5).unwrap();
        assert_eq!(drive.outputs(), (0.0, 0.0));
        drive.turn_right(0.5).unwrap();
        assert_eq!(drive.outputs(), (0.0, 0.0));
    }

    #[test]
    fn trim_does_not_move_a_stopped_wheel() {
        let drive = sim();
        drive.set_trim(0.5, 0.5);
        drive.forward(0.0).unwrap();
        assert_eq!(drive.outputs(), (0.0, 0.0));
        drive.stop().unwrap();
        assert_eq!(drive.outputs(), (0.0, 0.0));
    }

    #[test]
    fn reset_restores_origin() {
        let drive = sim();
        drive.forward(1.0).unwrap();
        drive.turn_right(1.0).unwrap();
        drive.reset().unwrap();
        assert_eq!(drive.position(), (0.0, 0.0));
        assert_eq!(drive.heading(), Heading::North);
        assert_eq!(drive.last_action(), (MotionKind::Reset, 0.0));
    }

    #[test]
    fn invalid_pin_mappings_are_rejected() {
        let duplicate = DriveConfig {
            left_pins: (17, 18),
            right_pins: (18, 23),
            ..DriveConfig::default()
        };
        assert!(matches!(
            DriveTrain::new(duplicate, Motors::Simulated),
            Err(RoverError::Configuration(_))
        ));

        let out_of_range = DriveConfig {
            left_pins: (40, 18),
            ..DriveConfig::default()
        };
        assert!(DriveTrain::new(out_of_range, Motors::Simulated).is_err());

        let bad_step = DriveConfig {
            sim_step: 0.0,
            ..DriveConfig::default()
        };
        assert!(DriveTrain::new(bad_step, Motors::Simulated).is_err());
    }

    #[test]
    fn physical_motors_receive_levels() {
        let (left, left_log) = SimMotor::with_log("left_motor");
        let (right, right_log) = SimMotor::with_log("right_motor");
        let drive = DriveTrain::new(
            DriveConfig::default(),
            Motors::Physical {
                left: Box::new(left),
                right: Box::new(right),
            },
        )
        .unwrap();
        assert!(!drive.is_simulation());

        drive.turn_left(0.4).unwrap();
        drive.stop().unwrap();
        assert_eq!(left_log.levels(), vec![-0.4, 0.0]);
        assert_eq!(right_log.levels(), vec![0.4, 0.0]);
        assert_eq!(drive.position(), (0.0, 0.0));
    }

    #[test]
    fn stop_is_attempted_on_both_motors() {
        let (right, right_log) = SimMotor::with_log("right_motor");
        let drive = DriveTrain::new(
            DriveConfig::default(),
            Motors::Physical {
                left: Box::new(FaultyMotor),
                right: Box::new(right),
            },
        )
        .unwrap();

        assert!(matches!(drive.stop(), Err(RoverError::HardwareFault { .. })));
        assert_eq!(right_log.levels(), vec![0.0]);
        assert_eq!(drive.last_action(), (MotionKind::Stop, 0.0));
    }
}

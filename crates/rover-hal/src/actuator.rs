//! Generic `Actuator` trait for hobby servos driving the arms and the claw.
//!
//! Drivers implement this trait and are handed to
//! [`ServoArms`][crate::gesture::ServoArms] or
//! [`ServoGripper`][crate::gripper::ServoGripper].  Nothing above the HAL
//! knows which pin or PWM channel sits behind it.

use rover_types::RoverError;

/// A position-controlled servo.
///
/// Positions are normalised: `-1.0` is one end stop, `1.0` the other.
pub trait Actuator: Send {
    /// Stable identifier, e.g. `"left_arm"` or `"claw"`.
    fn id(&self) -> &str;

    /// Command the servo to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the command cannot be applied.
    fn set_position(&mut self, value: f32) -> Result<(), RoverError>;

    /// Most recently commanded position.
    fn position(&self) -> f32;
}

//! `MotorDriver` trait: one side of the differential drive.

use rover_types::RoverError;

/// A bidirectional DC motor behind an H-bridge.
///
/// `level` is signed: positive drives forward, negative backward, magnitude
/// is the duty in `[0, 1]`.  Callers clamp before calling.
pub trait MotorDriver: Send {
    /// Stable identifier, e.g. `"left_motor"`.
    fn id(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the driver rejects the command.
    fn set_level(&mut self, level: f32) -> Result<(), RoverError>;

    /// Coast to a stop.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the driver rejects the command.
    fn stop(&mut self) -> Result<(), RoverError>;
}

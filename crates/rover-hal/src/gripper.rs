//! [`ServoGripper`] – single-servo claw.

use rover_types::RoverError;
use tracing::info;

use crate::actuator::Actuator;
use crate::sim::SimServo;

/// Claw control, as seen by the dispatcher.
pub trait GripperControl: Send {
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the servo rejects the command.
    fn open(&mut self) -> Result<(), RoverError>;

    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the servo rejects the command.
    fn close(&mut self) -> Result<(), RoverError>;

    /// Close unless currently closed, in which case open.
    fn toggle(&mut self) -> Result<(), RoverError>;

    /// Open the claw before powering down.
    fn release(&mut self) -> Result<(), RoverError> {
        self.open()
    }
}

pub const OPEN_POSITION: f32 = -0.8;
pub const CLOSED_POSITION: f32 = 0.8;

pub struct ServoGripper {
    servo: Box<dyn Actuator>,
    open_value: f32,
    closed_value: f32,
    closed: bool,
}

impl ServoGripper {
    /// Wrap `servo` with the default open/close positions and open the claw.
    pub fn new(servo: Box<dyn Actuator>) -> Result<Self, RoverError> {
        Self::with_values(servo, OPEN_POSITION, CLOSED_POSITION)
    }

    pub fn with_values(
        servo: Box<dyn Actuator>,
        open_value: f32,
        closed_value: f32,
    ) -> Result<Self, RoverError> {
        let mut gripper = Self {
            servo,
            open_value: open_value.clamp(-1.0, 1.0),
            closed_value: closed_value.clamp(-1.0, 1.0),
            closed: true,
        };
        gripper.open()?;
        Ok(gripper)
    }

    pub fn simulated() -> Self {
        Self {
            servo: SimServo::new("claw"),
            open_value: OPEN_POSITION,
            closed_value: CLOSED_POSITION,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl GripperControl for ServoGripper {
    fn open(&mut self) -> Result<(), RoverError> {
        info!(servo = self.servo.id(), "gripper open");
        self.servo.set_position(self.open_value)?;
        self.closed = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RoverError> {
        info!(servo = self.servo.id(), "gripper close");
        self.servo.set_position(self.closed_value)?;
        self.closed = true;
        Ok(())
    }

    fn toggle(&mut self) -> Result<(), RoverError> {
        if self.closed { self.open() } else { self.close() }
    }
}

//! [`ServoArms`] – two hobby-servo arms with a small set of named poses.

use rover_types::RoverError;
use tracing::{debug, info};

use crate::actuator::Actuator;
use crate::sim::SimServo;

/// Arm gestures, as seen by the dispatcher.
pub trait GestureControl: Send {
    /// Move both arms to the pose called `name`.  Unknown names rest.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if a servo rejects the command.
    fn perform(&mut self, name: &str) -> Result<(), RoverError>;

    /// Set both arm positions directly.  Values are clamped to `[-1, 1]`.
    fn set_positions(&mut self, left: f32, right: f32) -> Result<(), RoverError>;

    /// Nudge both arms by the given deltas.
    fn adjust(&mut self, left_delta: f32, right_delta: f32) -> Result<(), RoverError>;

    /// Current `(left, right)` positions.
    fn positions(&self) -> (f32, f32);

    /// Return to rest.  Called on shutdown.
    fn close(&mut self) -> Result<(), RoverError> {
        self.perform("rest")
    }
}

/// Named poses as `(name, left, right)`.
const POSES: &[(&str, f32, f32)] = &[
    ("rest", 0.0, 0.0),
    ("wave", 0.6, -0.6),
    ("point", -0.7, 0.7),
    ("nod", 0.2, 0.2),
    ("salute", 0.8, -0.2),
];

fn pose(name: &str) -> (f32, f32) {
    let name = name.trim().to_ascii_lowercase();
    POSES
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, l, r)| (l, r))
        .unwrap_or((0.0, 0.0))
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

pub struct ServoArms {
    left: Box<dyn Actuator>,
    right: Box<dyn Actuator>,
}

impl ServoArms {
    /// Wrap two servos and move them to the rest pose.
    ///
    /// # Errors
    ///
    /// Propagates the servo error if the initial rest pose cannot be applied.
    pub fn new(left: Box<dyn Actuator>, right: Box<dyn Actuator>) -> Result<Self, RoverError> {
        let mut arms = Self { left, right };
        arms.perform("rest")?;
        Ok(arms)
    }

    /// Arms backed by [`SimServo`]s.
    pub fn simulated() -> Self {
        Self {
            left: SimServo::new("left_arm"),
            right: SimServo::new("right_arm"),
        }
    }
}

impl GestureControl for ServoArms {
    fn perform(&mut self, name: &str) -> Result<(), RoverError> {
        let (left, right) = pose(name);
        info!(gesture = name, left, right, "performing gesture");
        self.set_positions(left, right)
    }

    fn set_positions(&mut self, left: f32, right: f32) -> Result<(), RoverError> {
        let (left, right) = (clamp_unit(left), clamp_unit(right));
        debug!(left, right, "arm positions");
        self.left.set_position(left)?;
        self.right.set_position(right)
    }

    fn adjust(&mut self, left_delta: f32, right_delta: f32) -> Result<(), RoverError> {
        let (left, right) = self.positions();
        self.set_positions(left + left_delta, right + right_delta)
    }

    fn positions(&self) -> (f32, f32) {
        (self.left.position(), self.right.position())
    }
}

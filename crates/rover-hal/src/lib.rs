//! `rover-hal` – Hardware Abstraction Layer
//!
//! Everything above this crate talks to hardware through traits, so the same
//! control code runs against real drivers or the in-process simulation.
//!
//! # Modules
//!
//! - [`motor`] – [`MotorDriver`][motor::MotorDriver]: one side of the
//!   differential drive, commanded with a signed level in `[-1, 1]`.
//! - [`actuator`] – [`Actuator`][actuator::Actuator]: a position servo
//!   (arm, claw) commanded with a normalised value in `[-1, 1]`.
//! - [`sensor`] – [`DistanceSource`][sensor::DistanceSource] and
//!   [`VoltageSource`][sensor::VoltageSource].
//! - [`drive`] – [`DriveTrain`][drive::DriveTrain]: the drive-train command
//!   model (speed scale, per-side trim, simulated odometry).  One instance is
//!   shared by every actuation source.
//! - [`gesture`] – [`ServoArms`][gesture::ServoArms]: named arm poses.
//! - [`gripper`] – [`ServoGripper`][gripper::ServoGripper]: open/close claw.
//! - [`sim`] – simulated motors, servos, and sensors for headless runs and
//!   tests.

pub mod actuator;
pub mod drive;
pub mod gesture;
pub mod gripper;
pub mod motor;
pub mod sensor;
pub mod sim;

pub use actuator::Actuator;
pub use drive::{DriveConfig, DriveTrain, Motors};
pub use gesture::{GestureControl, ServoArms};
pub use gripper::{GripperControl, ServoGripper};
pub use motor::MotorDriver;
pub use sensor::{DistanceSource, SharedSensor, VoltageSource, share_sensor};

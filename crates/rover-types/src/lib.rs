//! `rover-types` – shared vocabulary of the rover workspace.
//!
//! Everything that crosses a crate boundary lives here: the wire-level
//! [`ActionRecord`] and its typed [`Action`] form, drive-train bookkeeping
//! ([`MotionKind`], [`Heading`]), battery classification, perception
//! observations, bus [`Event`]s, and the global [`RoverError`].

pub mod action;

pub use action::{
    Action, ActionRecord, ArmsCommand, AutonomyCommand, GripperCommand, IntentBatch,
    MotionCommand, Side, TuningCommand,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kind of the most recent drive-train command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
    Reset,
}

impl std::fmt::Display for MotionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MotionKind::Forward => "forward",
            MotionKind::Backward => "backward",
            MotionKind::TurnLeft => "turn_left",
            MotionKind::TurnRight => "turn_right",
            MotionKind::Stop => "stop",
            MotionKind::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Cardinal heading tracked by the simulated odometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Heading {
    #[default]
    North,
    East,
    South,
    West,
}

impl Heading {
    /// Heading after a quarter turn counter-clockwise.
    pub fn rotated_left(self) -> Self {
        match self {
            Heading::North => Heading::West,
            Heading::West => Heading::South,
            Heading::South => Heading::East,
            Heading::East => Heading::North,
        }
    }

    /// Heading after a quarter turn clockwise.
    pub fn rotated_right(self) -> Self {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
        }
    }

    /// Unit step `(dx, dy)` along this heading.
    pub fn delta(self) -> (f32, f32) {
        match self {
            Heading::North => (0.0, 1.0),
            Heading::East => (1.0, 0.0),
            Heading::South => (0.0, -1.0),
            Heading::West => (-1.0, 0.0),
        }
    }
}

/// Battery classification produced by the battery watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryStatus {
    Ok,
    Low,
    Critical,
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryStatus::Ok => f.write_str("ok"),
            BatteryStatus::Low => f.write_str("low"),
            BatteryStatus::Critical => f.write_str("critical"),
        }
    }
}

/// One object reported by the vision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub label: String,
    pub distance_cm: f32,
    /// Positive means the object is to the right of the robot.
    pub angle_deg: f32,
    pub color: String,
    pub shape: String,
}

impl Observation {
    /// Label with underscores replaced by spaces, for speech.
    pub fn friendly_label(&self) -> String {
        self.label.replace('_', " ")
    }

    pub fn direction_hint(&self) -> &'static str {
        if self.angle_deg < -12.0 {
            "to your left"
        } else if self.angle_deg > 12.0 {
            "to your right"
        } else {
            "straight ahead"
        }
    }

    /// Spoken description, e.g. `"red square (red cube) about 30 cm away straight ahead"`.
    pub fn description(&self) -> String {
        format!(
            "{} {} ({}) about {:.0} cm away {}",
            self.color.replace('_', " "),
            self.shape.replace('_', " "),
            self.friendly_label(),
            self.distance_cm,
            self.direction_hint()
        )
    }
}

/// Event wrapper routed over the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"rover-runtime::guard"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Safety and housekeeping notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// The proximity guard latched into the blocked state.
    ObstacleDetected { distance_cm: f32 },
    /// The proximity guard released the blocked state.
    PathClear { distance_cm: f32 },
    /// Periodic battery classification.
    Battery { status: BatteryStatus, voltage: f32 },
    /// Battery-critical shutdown has been latched.
    ShutdownInitiated { voltage: f32 },
}

/// Global error type for the rover workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Invalid speed {0}: speed must be non-negative")]
    InvalidSpeed(f32),

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Collaborator Error: {0}")]
    Collaborator(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_rotations_cycle() {
        let mut h = Heading::North;
        for _ in 0..4 {
            h = h.rotated_right();
        }
        assert_eq!(h, Heading::North);
        assert_eq!(Heading::North.rotated_left(), Heading::West);
        assert_eq!(Heading::North.rotated_right(), Heading::East);
    }

    #[test]
    fn observation_description_and_hint() {
        let obs = Observation {
            label: "orange_mug".to_string(),
            distance_cm: 31.6,
            angle_deg: -20.0,
            color: "orange".to_string(),
            shape: "cylinder".to_string(),
        };
        assert_eq!(obs.direction_hint(), "to your left");
        assert_eq!(
            obs.description(),
            "orange cylinder (orange mug) about 32 cm away to your left"
        );
    }

    #[test]
    fn battery_status_serializes_lowercase() {
        let json = serde_json::to_string(&BatteryStatus::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert_eq!(BatteryStatus::Low.to_string(), "low");
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "rover-runtime::guard",
            EventPayload::ObstacleDetected { distance_cm: 18.0 },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(back.payload, EventPayload::ObstacleDetected { distance_cm: 18.0 });
    }

    #[test]
    fn rover_error_display() {
        assert!(RoverError::InvalidSpeed(-0.1).to_string().contains("non-negative"));
        let err = RoverError::HardwareFault {
            component: "left_motor".to_string(),
            details: "driver offline".to_string(),
        };
        assert!(err.to_string().contains("left_motor"));
    }
}

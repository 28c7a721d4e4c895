//! Action records and their typed form.
//!
//! Intent sources emit loosely-typed `{type, value}` pairs. [`Action::parse`]
//! turns each one into a closed enum so the dispatcher can match
//! exhaustively. Payloads that cannot be parsed become
//! [`Action::Malformed`]; unrecognised types become [`Action::Unknown`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RoverError;

/// Wire-level action record, e.g. `{"type": "movement", "value": "forward"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

impl ActionRecord {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Parses the compact `type:value` token form, e.g. `arms:set:0.5:-0.5`.
impl FromStr for ActionRecord {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RoverError::Collaborator("empty action token".to_string()));
        }
        match s.split_once(':') {
            Some((kind, value)) => Ok(ActionRecord::new(kind, value)),
            None => Ok(ActionRecord::new(s, "")),
        }
    }
}

/// One utterance worth of intent: what to say and what to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentBatch {
    #[serde(default)]
    pub speech: String,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonomyCommand {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperCommand {
    Open,
    Close,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Arm servo commands. Single-side variants hold the other side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArmsCommand {
    Set { left: f32, right: f32 },
    SetLeft(f32),
    SetRight(f32),
    Adjust { left: f32, right: f32 },
}

/// Drive-train tuning sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuningCommand {
    SpeedSet(f32),
    SpeedAdjust(f32),
    TrimSet { side: Side, value: f32 },
    TrimAdjust { side: Side, delta: f32 },
    TrimReset,
}

/// Typed form of an [`ActionRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Movement(MotionCommand),
    Autonomy(AutonomyCommand),
    Gesture(String),
    Gripper(GripperCommand),
    Arms(ArmsCommand),
    Tuning(TuningCommand),
    Grab { label: String },
    Describe { label: Option<String> },
    Speech(String),
    /// Known type with a payload that could not be parsed.
    Malformed {
        kind: String,
        value: String,
        reason: String,
    },
    Unknown { kind: String },
}

impl Action {
    pub fn parse(record: &ActionRecord) -> Action {
        let value = record.value.trim();
        let parsed = match record.kind.as_str() {
            "movement" => parse_movement(value).map(Action::Movement),
            "autonomy" => match value {
                "start" => Ok(Action::Autonomy(AutonomyCommand::Start)),
                "stop" => Ok(Action::Autonomy(AutonomyCommand::Stop)),
                other => Err(format!("unknown autonomy command '{other}'")),
            },
            "gesture" => non_empty(value).map(|v| Action::Gesture(v.to_string())),
            "gripper" => match value {
                "open" => Ok(Action::Gripper(GripperCommand::Open)),
                "close" => Ok(Action::Gripper(GripperCommand::Close)),
                "toggle" => Ok(Action::Gripper(GripperCommand::Toggle)),
                other => Err(format!("unknown gripper command '{other}'")),
            },
            "arms" => parse_arms(value).map(Action::Arms),
            "tuning" => parse_tuning(value).map(Action::Tuning),
            "task" => match value.split_once(':') {
                Some(("grab", label)) if !label.trim().is_empty() => Ok(Action::Grab {
                    label: label.trim().to_string(),
                }),
                _ => Err(format!("unsupported task '{value}'")),
            },
            "vision" => {
                let label = value
                    .split_once(':')
                    .map(|(_, detail)| detail.trim())
                    .filter(|detail| !detail.is_empty())
                    .map(str::to_string);
                Ok(Action::Describe { label })
            }
            "speech" => non_empty(value).map(|v| Action::Speech(v.to_string())),
            other => {
                return Action::Unknown {
                    kind: other.to_string(),
                };
            }
        };
        parsed.unwrap_or_else(|reason| Action::Malformed {
            kind: record.kind.clone(),
            value: record.value.clone(),
            reason,
        })
    }
}

impl From<&ActionRecord> for Action {
    fn from(record: &ActionRecord) -> Self {
        Action::parse(record)
    }
}

fn non_empty(value: &str) -> Result<&str, String> {
    if value.is_empty() {
        Err("empty payload".to_string())
    } else {
        Ok(value)
    }
}

fn parse_number(raw: &str) -> Result<f32, String> {
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("'{raw}' is not a number")),
    }
}

fn parse_side(raw: &str) -> Result<Side, String> {
    match raw {
        "left" => Ok(Side::Left),
        "right" => Ok(Side::Right),
        other => Err(format!("unknown side '{other}'")),
    }
}

fn parse_movement(value: &str) -> Result<MotionCommand, String> {
    match value {
        "forward" => Ok(MotionCommand::Forward),
        "backward" => Ok(MotionCommand::Backward),
        "left" | "turn_left" => Ok(MotionCommand::TurnLeft),
        "right" | "turn_right" => Ok(MotionCommand::TurnRight),
        "stop" => Ok(MotionCommand::Stop),
        other => Err(format!("unknown movement '{other}'")),
    }
}

fn parse_arms(value: &str) -> Result<ArmsCommand, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let [mode, left, right] = parts.as_slice() else {
        return Err("expected <mode>:<left>:<right>".to_string());
    };
    let left = parse_number(left)?;
    let right = parse_number(right)?;
    match *mode {
        "set" => Ok(ArmsCommand::Set { left, right }),
        "set_left" => Ok(ArmsCommand::SetLeft(left)),
        "set_right" => Ok(ArmsCommand::SetRight(right)),
        "adjust" => Ok(ArmsCommand::Adjust { left, right }),
        other => Err(format!("unknown arms mode '{other}'")),
    }
}

fn parse_tuning(value: &str) -> Result<TuningCommand, String> {
    if value == "trim_reset" {
        return Ok(TuningCommand::TrimReset);
    }
    let Some((op, rest)) = value.split_once(':') else {
        return Err(format!("unknown tuning op '{value}'"));
    };
    match op {
        "speed_set" => parse_number(rest).map(TuningCommand::SpeedSet),
        "speed_adj" => parse_number(rest).map(TuningCommand::SpeedAdjust),
        "trim_set" | "trim_adj" => {
            let (side, amount) = rest
                .split_once(':')
                .ok_or_else(|| format!("expected {op}:<side>:<amount>"))?;
            let side = parse_side(side)?;
            let amount = parse_number(amount)?;
            if op == "trim_set" {
                Ok(TuningCommand::TrimSet { side, value: amount })
            } else {
                Ok(TuningCommand::TrimAdjust {
                    side,
                    delta: amount,
                })
            }
        }
        other => Err(format!("unknown tuning op '{other}'")),
    }
}

//! [`SceneVision`] – a fixed scene standing in for camera perception.

use async_trait::async_trait;
use rover_types::{ActionRecord, Observation};
use tracing::info;

use crate::collaborators::Vision;

/// Objects further off-axis than this are turned towards before approaching.
const ALIGN_ANGLE_DEG: f32 = 15.0;
/// Objects further away than this are driven towards before grabbing.
const REACH_DISTANCE_CM: f32 = 15.0;

pub struct SceneVision {
    scene: Vec<Observation>,
}

impl SceneVision {
    pub fn new(scene: Vec<Observation>) -> Self {
        Self { scene }
    }

    /// A small tabletop scene for simulated runs.
    pub fn demo() -> Self {
        Self::new(vec![
            observation("red_cube", 42.0, -20.0, "red", "cube"),
            observation("blue_cube", 28.0, 4.0, "blue", "cube"),
            observation("orange_cup", 65.0, 30.0, "orange", "cup"),
        ])
    }

    /// Find the observation a free-form query refers to.
    ///
    /// Matches the exact label, a fragment of the spoken label, or a query
    /// naming both the colour and the shape.
    pub fn locate(&self, query: &str) -> Option<&Observation> {
        let candidate = normalise(query);
        if candidate.is_empty() {
            return None;
        }
        let key = candidate.replace(' ', "_");
        self.scene
            .iter()
            .find(|o| o.label == key)
            .or_else(|| {
                self.scene.iter().find(|o| {
                    o.friendly_label().contains(&candidate)
                        || (candidate.contains(&o.color) && candidate.contains(&o.shape))
                })
            })
    }
}

fn observation(label: &str, distance_cm: f32, angle_deg: f32, color: &str, shape: &str) -> Observation {
    Observation {
        label: label.into(),
        distance_cm,
        angle_deg,
        color: color.into(),
        shape: shape.into(),
    }
}

fn normalise(query: &str) -> String {
    query.trim().to_lowercase().replace(['-', '_'], " ")
}

#[async_trait]
impl Vision for SceneVision {
    async fn describe(&self, label: Option<&str>) -> String {
        if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
            return match self.locate(label) {
                Some(obs) => format!("I see {}.", obs.description()),
                None => format!("I don't see a {} right now.", normalise(label)),
            };
        }

        let descriptions: Vec<String> = self.scene.iter().map(Observation::description).collect();
        match descriptions.as_slice() {
            [] => "I don't see anything important right now.".to_string(),
            [only] => format!("I see {only}."),
            [first, second] => format!("I see {first} and {second}."),
            [lead @ .., last] => format!("I see {}, and {last}.", lead.join(", ")),
        }
    }

    async fn plan_grab(&self, label: &str) -> Vec<ActionRecord> {
        let Some(obs) = self.locate(label) else {
            info!(label, "object not found");
            return vec![ActionRecord::new(
                "speech",
                format!("I can't find a {}.", label.replace('_', " ")),
            )];
        };

        let mut plan = Vec::with_capacity(4);
        if obs.angle_deg.abs() > ALIGN_ANGLE_DEG {
            let turn = if obs.angle_deg < 0.0 { "left" } else { "right" };
            plan.push(ActionRecord::new("movement", turn));
        }
        if obs.distance_cm > REACH_DISTANCE_CM {
            plan.push(ActionRecord::new("movement", "forward"));
        }
        plan.push(ActionRecord::new("movement", "stop"));
        plan.push(ActionRecord::new("gripper", "close"));
        plan
    }

    async fn observations(&self) -> Vec<Observation> {
        self.scene.clone()
    }
}

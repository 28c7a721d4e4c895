//! [`WallGuard`] – hysteresis proximity guard.
//!
//! The guard reads the forward range finder and decides whether forward
//! motion is allowed.  Two thresholds keep it from chattering around a single
//! distance:
//!
//! ```text
//!   distance ≤ stop_threshold    → blocked
//!   distance ≥ resume_threshold  → clear
//!   in between                   → unchanged
//!   unavailable / negative       → forward allowed, state unchanged
//! ```
//!
//! The guard owns no timer.  A supervisor polls it (default every 100 ms) and
//! re-asserts `stop()` on the drive train while it vetoes.

use std::sync::{Arc, Mutex, PoisonError};

use rover_hal::sensor::SharedSensor;
use rover_types::RoverError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Sentinel distance meaning "no sample yet" or "sensor unavailable".
pub const NO_DISTANCE: f32 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub stop_threshold_cm: f32,
    pub resume_threshold_cm: f32,
    /// Interval of the supervising poll loop.
    pub poll_interval_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            stop_threshold_cm: 20.0,
            resume_threshold_cm: 25.0,
            poll_interval_ms: 100,
        }
    }
}

impl GuardConfig {
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] unless
    /// `stop_threshold_cm < resume_threshold_cm`.
    pub fn validate(&self) -> Result<(), RoverError> {
        let ordered = self.stop_threshold_cm < self.resume_threshold_cm;
        if !ordered {
            return Err(RoverError::Configuration(format!(
                "resume threshold ({} cm) must be greater than stop threshold ({} cm)",
                self.resume_threshold_cm, self.stop_threshold_cm
            )));
        }
        Ok(())
    }
}

/// Edge reported when the guard enters or leaves the blocked state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardTransition {
    Blocked { distance_cm: f32 },
    Cleared { distance_cm: f32 },
}

/// Result of one guard sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardReading {
    pub allows_forward: bool,
    /// `None` when the sensor produced no usable sample.
    pub distance_cm: Option<f32>,
    pub transition: Option<GuardTransition>,
}

type Observer = Box<dyn Fn(GuardTransition) + Send + Sync>;

struct GuardState {
    blocked: bool,
    last_distance: f32,
}

/// Proximity guard shared between the dispatcher and the guard poller.
pub struct WallGuard {
    sensor: SharedSensor,
    config: GuardConfig,
    state: Mutex<GuardState>,
    observer: Option<Observer>,
}

impl WallGuard {
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] if the thresholds are inverted.
    pub fn new(sensor: SharedSensor, config: GuardConfig) -> Result<Self, RoverError> {
        config.validate()?;
        Ok(Self {
            sensor,
            config,
            state: Mutex::new(GuardState {
                blocked: false,
                last_distance: NO_DISTANCE,
            }),
            observer: None,
        })
    }

    /// Register a closure called once per blocked/cleared edge.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(GuardTransition) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// The sensor this guard reads, for wiring it into other activities.
    pub fn sensor(&self) -> SharedSensor {
        Arc::clone(&self.sensor)
    }

    /// Take one sample and update the hysteresis state.
    pub fn poll(&self) -> GuardReading {
        let sample = self
            .sensor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_cm();

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let distance = match sample {
            Some(d) if d >= 0.0 => d,
            other => {
                state.last_distance = other.filter(|d| !d.is_nan()).unwrap_or(NO_DISTANCE);
                debug!("distance unavailable; assuming clear path");
                return GuardReading {
                    allows_forward: true,
                    distance_cm: None,
                    transition: None,
                };
            }
        };
        state.last_distance = distance;

        let mut transition = None;
        if distance <= self.config.stop_threshold_cm {
            if !state.blocked {
                info!(distance_cm = distance, "obstacle detected");
                transition = Some(GuardTransition::Blocked {
                    distance_cm: distance,
                });
            }
            state.blocked = true;
        } else if distance >= self.config.resume_threshold_cm {
            if state.blocked {
                info!(distance_cm = distance, "path clear");
                transition = Some(GuardTransition::Cleared {
                    distance_cm: distance,
                });
            }
            state.blocked = false;
        }
        let allows_forward = !state.blocked;
        drop(state);

        if let (Some(t), Some(observer)) = (transition, &self.observer) {
            observer(t);
        }
        GuardReading {
            allows_forward,
            distance_cm: Some(distance),
            transition,
        }
    }

    /// `true` unless the guard is latched in the blocked state.
    pub fn allows_forward(&self) -> bool {
        self.poll().allows_forward
    }

    /// Most recent sample, or a negative value if none was usable.
    pub fn last_distance(&self) -> f32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_distance
    }

    pub fn is_blocked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocked
    }

    /// Release the sensor.
    pub fn close(&self) {
        self.sensor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rover_hal::sensor::share_sensor;
    use rover_hal::sim::ScriptedDistance;

    use super::*;

    fn guard(readings: &[f32]) -> WallGuard {
        let sensor = share_sensor(ScriptedDistance::new(readings.to_vec()));
        WallGuard::new(sensor, GuardConfig::default()).unwrap()
    }

    #[test]
    fn hysteresis_sequence() {
        let guard = guard(&[30.0, 18.0, 22.0, 27.0]);
        let results: Vec<bool> = (0..4).map(|_| guard.allows_forward()).collect();
        assert_eq!(results, vec![true, false, false, true]);
    }

    #[test]
    fn between_thresholds_keeps_clear_state() {
        let guard = guard(&[22.0]);
        assert!(guard.allows_forward());
        assert!(!guard.is_blocked());
    }

    #[test]
    fn unavailable_sample_allows_forward_and_keeps_state() {
        let guard = guard(&[10.0, -1.0]);
        assert!(!guard.allows_forward());
        assert!(guard.allows_forward());
        assert!(guard.is_blocked());
        assert_eq!(guard.last_distance(), -1.0);
    }

    #[test]
    fn initial_last_distance_is_sentinel() {
        assert_eq!(guard(&[50.0]).last_distance(), NO_DISTANCE);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let sensor = share_sensor(ScriptedDistance::new([]));
        let config = GuardConfig {
            stop_threshold_cm: 25.0,
            resume_threshold_cm: 25.0,
            ..GuardConfig::default()
        };
        assert!(matches!(
            WallGuard::new(sensor, config),
            Err(RoverError::Configuration(_))
        ));
    }

    #[test]
    fn observer_sees_each_edge_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sensor = share_sensor(ScriptedDistance::new([15.0, 12.0, 30.0, 40.0, 10.0]));
        let guard = WallGuard::new(sensor, GuardConfig::default())
            .unwrap()
            .with_observer(move |t| sink.lock().unwrap().push(t));

        let readings: Vec<GuardReading> = (0..5).map(|_| guard.poll()).collect();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                GuardTransition::Blocked { distance_cm: 15.0 },
                GuardTransition::Cleared { distance_cm: 30.0 },
                GuardTransition::Blocked { distance_cm: 10.0 },
            ]
        );
        assert!(readings[1].transition.is_none());
        assert!(readings[3].transition.is_none());
    }

    #[test]
    fn close_releases_sensor() {
        let scripted = ScriptedDistance::new([50.0]);
        let closed = scripted.closed_flag();
        let guard = WallGuard::new(share_sensor(scripted), GuardConfig::default()).unwrap();
        guard.close();
        assert!(closed.load(Ordering::Acquire));
    }
}

//! Obstacle-avoidance autonomy.
//!
//! [`AutoDriver`] is the loop itself: drive forward until something is closer
//! than the threshold, then back up, turn right, stop, and carry on.
//! [`Autopilot`] runs one `AutoDriver` as a background task and owns its
//! lifecycle.
//!
//! ```text
//!   idle ──start──► driving ──obstacle──► avoiding ──maneuver done──┐
//!                     ▲                                            │
//!                     └────────────────────────────────────────────┘
//!   driving ──stop requested──► stopped (final stop(), owned sensor closed)
//! ```

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use rover_hal::drive::DriveTrain;
use rover_hal::sensor::{DistanceSource, SharedSensor};
use rover_kernel::pacer::{Pacer, StopHandle, StopToken};
use rover_types::RoverError;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long [`Autopilot::stop`] waits for the loop to finish.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDriveConfig {
    pub speed: f32,
    pub reverse_speed: f32,
    pub obstacle_threshold_cm: f32,
    pub reverse_duration_s: f32,
    pub turn_duration_s: f32,
    pub poll_interval_s: f32,
}

impl Default for AutoDriveConfig {
    fn default() -> Self {
        Self {
            speed: 0.6,
            reverse_speed: 0.4,
            obstacle_threshold_cm: 25.0,
            reverse_duration_s: 0.5,
            turn_duration_s: 0.4,
            poll_interval_s: 0.1,
        }
    }
}

fn secs(s: f32) -> Duration {
    Duration::try_from_secs_f32(s).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonomyState {
    Idle,
    Driving,
    Avoiding,
    Stopped,
}

/// Where the autonomy loop gets its distance readings.
pub enum SensorLease {
    /// Borrowed from the proximity guard; never closed by autonomy.
    Shared(SharedSensor),
    /// Created for this run; closed when autonomy stops.
    Owned(Box<dyn DistanceSource>),
}

impl SensorLease {
    fn read_cm(&mut self) -> Option<f32> {
        match self {
            SensorLease::Shared(sensor) => sensor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read_cm(),
            SensorLease::Owned(sensor) => sensor.read_cm(),
        }
    }

    fn release(&mut self) {
        if let SensorLease::Owned(sensor) = self {
            debug!("closing autonomy distance sensor");
            sensor.close();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AutoDriver
// ────────────────────────────────────────────────────────────────────────────

pub struct AutoDriver {
    drive: Arc<DriveTrain>,
    sensor: SensorLease,
    config: AutoDriveConfig,
    state: AutonomyState,
}

impl AutoDriver {
    pub fn new(drive: Arc<DriveTrain>, sensor: SensorLease, config: AutoDriveConfig) -> Self {
        Self {
            drive,
            sensor,
            config,
            state: AutonomyState::Idle,
        }
    }

    pub fn state(&self) -> AutonomyState {
        self.state
    }

    /// One cycle: read the distance and either drive on or avoid.
    ///
    /// An unusable reading skips the cycle without commanding anything.
    ///
    /// # Errors
    ///
    /// The drive train's error, if a command failed.
    pub async fn step(&mut self) -> Result<(), RoverError> {
        if self.state == AutonomyState::Idle {
            self.state = AutonomyState::Driving;
        }
        let distance = match self.sensor.read_cm() {
            Some(d) if d > 0.0 => d,
            other => {
                warn!(distance = ?other, "distance sensor returned no usable reading; skipping cycle");
                return Ok(());
            }
        };
        debug!(distance_cm = distance, "autonomy step");

        if distance < self.config.obstacle_threshold_cm {
            self.state = AutonomyState::Avoiding;
            let result = self.avoid(distance).await;
            self.state = AutonomyState::Driving;
            result
        } else {
            self.drive.forward(self.config.speed)
        }
    }

    async fn avoid(&mut self, distance: f32) -> Result<(), RoverError> {
        info!(distance_cm = distance, "obstacle ahead; executing avoidance maneuver");
        self.drive.backward(self.config.reverse_speed)?;
        tokio::time::sleep(secs(self.config.reverse_duration_s)).await;
        self.drive.turn_right(self.config.speed)?;
        tokio::time::sleep(secs(self.config.turn_duration_s)).await;
        self.drive.stop()
    }

    /// Step every `poll_interval_s` until `stop` fires, then stop the drive
    /// train and release an owned sensor.
    pub async fn run(&mut self, stop: StopToken) {
        self.state = AutonomyState::Driving;
        info!(speed = self.config.speed, threshold_cm = self.config.obstacle_threshold_cm, "autonomy running");
        let mut pacer = Pacer::new(secs(self.config.poll_interval_s), stop);
        while !pacer.is_stopped() {
            if let Err(e) = self.step().await {
                warn!(error = %e, "autonomy actuation failed");
            }
            if !pacer.pause().await {
                break;
            }
        }
        self.finish();
    }

    /// Enter `stopped`, stop the drive train, and close an owned sensor.
    pub fn finish(&mut self) {
        self.state = AutonomyState::Stopped;
        if let Err(e) = self.drive.stop() {
            warn!(error = %e, "final autonomy stop failed");
        }
        self.sensor.release();
        info!("autonomy stopped");
    }
}

impl Drop for AutoDriver {
    fn drop(&mut self) {
        // Reached without `finish` when the loop is aborted mid-maneuver.
        if self.state != AutonomyState::Stopped {
            self.sensor.release();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Autopilot
// ────────────────────────────────────────────────────────────────────────────

type SensorProvider = Box<dyn Fn() -> SensorLease + Send + Sync>;

struct Running {
    stop: StopHandle,
    task: JoinHandle<()>,
}

/// Background handle for the autonomy loop.
pub struct Autopilot {
    drive: Arc<DriveTrain>,
    config: AutoDriveConfig,
    sensors: SensorProvider,
    running: Option<Running>,
}

impl Autopilot {
    /// `sensors` is called on each start to pick the distance source.
    pub fn new<F>(drive: Arc<DriveTrain>, config: AutoDriveConfig, sensors: F) -> Self
    where
        F: Fn() -> SensorLease + Send + Sync + 'static,
    {
        Self {
            drive,
            config,
            sensors: Box::new(sensors),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Start with the provider's sensor.  No-op when already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            debug!("autonomy already running");
            return false;
        }
        let sensor = (self.sensors)();
        self.start_with(sensor)
    }

    /// Start with an explicit sensor.  When already running the sensor is
    /// released and nothing else happens.
    pub fn start_with(&mut self, mut sensor: SensorLease) -> bool {
        if self.is_running() {
            sensor.release();
            return false;
        }
        let stop = StopHandle::new();
        let token = stop.token();
        let mut driver = AutoDriver::new(Arc::clone(&self.drive), sensor, self.config);
        let task = tokio::spawn(async move { driver.run(token).await });
        self.running = Some(Running { stop, task });
        true
    }

    /// Signal the loop, wait up to [`STOP_TIMEOUT`], and make sure the drive
    /// train ends on `stop`.  No-op when not running.
    ///
    /// A loop that overruns the timeout is aborted; an owned sensor is still
    /// closed before this returns.
    pub async fn stop(&mut self) {
        let Some(Running { stop, mut task }) = self.running.take() else {
            return;
        };
        stop.stop();
        match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "autonomy task ended abnormally"),
            Err(_) => {
                warn!("autonomy did not stop in time; aborting");
                task.abort();
                if let Err(e) = task.await
                    && !e.is_cancelled()
                {
                    warn!(error = %e, "autonomy task ended abnormally");
                }
            }
        }
        if let Err(e) = self.drive.stop() {
            warn!(error = %e, "stop after autonomy failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rover_hal::drive::{DriveConfig, Motors};
    use rover_hal::sensor::share_sensor;
    use rover_hal::sim::{ScriptedDistance, SimMotor};
    use rover_types::MotionKind;

    use super::*;

    fn sim_drive() -> Arc<DriveTrain> {
        Arc::new(DriveTrain::new(DriveConfig::default(), Motors::Simulated).unwrap())
    }

    fn fast_config() -> AutoDriveConfig {
        AutoDriveConfig {
            poll_interval_s: 0.01,
            reverse_duration_s: 0.01,
            turn_duration_s: 0.01,
            ..AutoDriveConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn obstacle_triggers_backward_turn_stop() {
        let (left, left_log) = SimMotor::with_log("left_motor");
        let (right, right_log) = SimMotor::with_log("right_motor");
        let drive = Arc::new(
            DriveTrain::new(
                DriveConfig::default(),
                Motors::Physical {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
            .unwrap(),
        );
        let sensor = SensorLease::Owned(Box::new(ScriptedDistance::new([10.0])));
        let mut driver = AutoDriver::new(Arc::clone(&drive), sensor, AutoDriveConfig::default());

        driver.step().await.unwrap();

        assert_eq!(left_log.levels(), vec![-0.4, 0.6, 0.0]);
        assert_eq!(right_log.levels(), vec![-0.4, -0.6, 0.0]);
        assert_eq!(driver.state(), AutonomyState::Driving);
        assert_eq!(drive.last_action().0, MotionKind::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn avoidance_is_followed_by_forward_on_clear_reading() {
        let (left, left_log) = SimMotor::with_log("left_motor");
        let (right, right_log) = SimMotor::with_log("right_motor");
        let drive = Arc::new(
            DriveTrain::new(
                DriveConfig::default(),
                Motors::Physical {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
            .unwrap(),
        );
        let sensor = SensorLease::Owned(Box::new(ScriptedDistance::new([10.0, 80.0])));
        let mut driver = AutoDriver::new(Arc::clone(&drive), sensor, AutoDriveConfig::default());

        driver.step().await.unwrap();
        driver.step().await.unwrap();

        assert_eq!(left_log.levels(), vec![-0.4, 0.6, 0.0, 0.6]);
        assert_eq!(right_log.levels(), vec![-0.4, -0.6, 0.0, 0.6]);
        assert_eq!(drive.last_action(), (MotionKind::Forward, 0.6));
    }

    #[tokio::test]
    async fn clear_path_drives_forward() {
        let drive = sim_drive();
        let sensor = SensorLease::Owned(Box::new(ScriptedDistance::new([80.0])));
        let mut driver = AutoDriver::new(Arc::clone(&drive), sensor, AutoDriveConfig::default());
        driver.step().await.unwrap();
        assert_eq!(drive.last_action(), (MotionKind::Forward, 0.6));
    }

    #[tokio::test]
    async fn unusable_reading_commands_nothing() {
        let drive = sim_drive();
        drive.turn_left(0.3).unwrap();
        for reading in [Some(0.0), Some(-1.0), None] {
            let sensor = match reading {
                Some(r) => ScriptedDistance::new([r]),
                None => ScriptedDistance::new([]),
            };
            let mut driver =
                AutoDriver::new(Arc::clone(&drive), SensorLease::Owned(Box::new(sensor)), fast_config());
            driver.step().await.unwrap();
            assert_eq!(drive.last_action(), (MotionKind::TurnLeft, 0.3));
        }
    }

    #[test]
    fn finish_closes_owned_but_not_shared_sensor() {
        let owned = ScriptedDistance::new([50.0]);
        let owned_closed = owned.closed_flag();
        let mut driver = AutoDriver::new(sim_drive(), SensorLease::Owned(Box::new(owned)), fast_config());
        driver.finish();
        assert!(owned_closed.load(Ordering::Acquire));
        assert_eq!(driver.state(), AutonomyState::Stopped);

        let shared = ScriptedDistance::new([50.0]);
        let shared_closed = shared.closed_flag();
        let mut driver = AutoDriver::new(
            sim_drive(),
            SensorLease::Shared(share_sensor(shared)),
            fast_config(),
        );
        driver.finish();
        assert!(!shared_closed.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn autopilot_start_is_idempotent_and_stop_ends_on_stop() {
        let drive = sim_drive();
        let mut autopilot = Autopilot::new(Arc::clone(&drive), fast_config(), || {
            SensorLease::Owned(Box::new(ScriptedDistance::new([100.0])))
        });
        assert!(autopilot.start());
        assert!(!autopilot.start());
        assert!(autopilot.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(drive.last_action().0, MotionKind::Forward);

        autopilot.stop().await;
        assert!(!autopilot.is_running());
        assert_eq!(drive.last_action().0, MotionKind::Stop);

        // Stopping again is harmless.
        autopilot.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn autopilot_releases_owned_sensor_on_stop() {
        let scripted = ScriptedDistance::new([100.0]);
        let closed = scripted.closed_flag();
        let mut autopilot = Autopilot::new(sim_drive(), fast_config(), || {
            SensorLease::Owned(Box::new(ScriptedDistance::new([])))
        });
        assert!(autopilot.start_with(SensorLease::Owned(Box::new(scripted))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        autopilot.stop().await;
        assert!(closed.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_maneuver_is_aborted_and_sensor_closed() {
        let drive = sim_drive();
        let scripted = ScriptedDistance::new([10.0]);
        let closed = scripted.closed_flag();
        let config = AutoDriveConfig {
            reverse_duration_s: 2.0,
            ..fast_config()
        };
        let mut autopilot = Autopilot::new(Arc::clone(&drive), config, || {
            SensorLease::Owned(Box::new(ScriptedDistance::new([])))
        });
        assert!(autopilot.start_with(SensorLease::Owned(Box::new(scripted))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(drive.last_action().0, MotionKind::Backward);

        let started = tokio::time::Instant::now();
        autopilot.stop().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!autopilot.is_running());
        assert!(closed.load(Ordering::Acquire));
        assert_eq!(drive.last_action().0, MotionKind::Stop);
    }

    #[tokio::test]
    async fn start_with_while_running_releases_extra_sensor() {
        let mut autopilot = Autopilot::new(sim_drive(), fast_config(), || {
            SensorLease::Owned(Box::new(ScriptedDistance::new([100.0])))
        });
        assert!(autopilot.start());
        let extra = ScriptedDistance::new([100.0]);
        let closed = extra.closed_flag();
        assert!(!autopilot.start_with(SensorLease::Owned(Box::new(extra))));
        assert!(closed.load(Ordering::Acquire));
        autopilot.stop().await;
    }
}

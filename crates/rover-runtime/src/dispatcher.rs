//! [`Dispatcher`] – applies a batch of action records, in order, to the
//! drive train and the collaborators.
//!
//! Each record is parsed into an [`Action`]; malformed and unknown records
//! are logged and skipped.  A failing actuation is logged and the batch goes
//! on.  A `forward` the proximity guard vetoes becomes a `stop()` plus a
//! single spoken notice per blocked episode.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rover_hal::drive::DriveTrain;
use rover_hal::gesture::GestureControl;
use rover_hal::gripper::GripperControl;
use rover_kernel::wall_guard::{GuardTransition, WallGuard};
use rover_types::{
    Action, ActionRecord, ArmsCommand, AutonomyCommand, GripperCommand, MotionCommand,
    RoverError, Side, TuningCommand,
};
use tracing::{debug, info, warn};

use crate::autonomy::Autopilot;
use crate::collaborators::{SpeechIo, Vision};

/// Spoken when forward motion is vetoed.
pub const WALL_NOTICE: &str = "Wall ahead, stopping.";

/// Speed used for directly commanded movement.
pub const DIRECT_SPEED: f32 = 1.0;

pub type SharedGestures = Arc<Mutex<dyn GestureControl>>;
pub type SharedGripper = Arc<Mutex<dyn GripperControl>>;
pub type SharedAutopilot = Arc<tokio::sync::Mutex<Autopilot>>;

// ────────────────────────────────────────────────────────────────────────────
// Notice latch
// ────────────────────────────────────────────────────────────────────────────

/// Ensures one wall notice per blocked episode, across every path that can
/// hit the veto.  Re-armed when the guard reports the path clear.
#[derive(Debug, Clone, Default)]
pub struct NoticeLatch(Arc<AtomicBool>);

impl NoticeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` for the first caller since the latch was last re-armed.
    pub fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn rearm(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Guard observer that re-arms this latch on every `Cleared` edge.
    pub fn rearm_on_clear(&self) -> impl Fn(GuardTransition) + Send + Sync + 'static + use<> {
        let latch = self.clone();
        move |transition| {
            if let GuardTransition::Cleared { .. } = transition {
                latch.rearm();
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────────────────

pub struct Dispatcher {
    drive: Arc<DriveTrain>,
    autopilot: SharedAutopilot,
    gestures: SharedGestures,
    gripper: SharedGripper,
    vision: Arc<dyn Vision>,
    speech: Arc<dyn SpeechIo>,
    guard: Option<Arc<WallGuard>>,
    notice: NoticeLatch,
}

impl Dispatcher {
    pub fn new(
        drive: Arc<DriveTrain>,
        autopilot: SharedAutopilot,
        gestures: SharedGestures,
        gripper: SharedGripper,
        vision: Arc<dyn Vision>,
        speech: Arc<dyn SpeechIo>,
    ) -> Self {
        Self {
            drive,
            autopilot,
            gestures,
            gripper,
            vision,
            speech,
            guard: None,
            notice: NoticeLatch::new(),
        }
    }

    /// Gate `forward` on `guard`, sharing `notice` with other veto paths.
    pub fn with_guard(mut self, guard: Arc<WallGuard>, notice: NoticeLatch) -> Self {
        self.guard = Some(guard);
        self.notice = notice;
        self
    }

    /// Apply `actions` strictly in order.
    pub fn dispatch<'a>(
        &'a self,
        actions: &'a [ActionRecord],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            for record in actions {
                if let Err(e) = self.execute(record).await {
                    warn!(action = %record, error = %e, "action failed");
                }
            }
        })
    }

    async fn execute(&self, record: &ActionRecord) -> Result<(), RoverError> {
        match Action::parse(record) {
            Action::Movement(command) => self.movement(command).await,
            Action::Autonomy(AutonomyCommand::Start) => {
                self.autopilot.lock().await.start();
                Ok(())
            }
            Action::Autonomy(AutonomyCommand::Stop) => {
                self.autopilot.lock().await.stop().await;
                Ok(())
            }
            Action::Gesture(name) => {
                let mut arms = lock(&self.gestures);
                arms.perform(&name)
            }
            Action::Gripper(command) => {
                let mut gripper = lock(&self.gripper);
                match command {
                    GripperCommand::Open => gripper.open(),
                    GripperCommand::Close => gripper.close(),
                    GripperCommand::Toggle => gripper.toggle(),
                }
            }
            Action::Arms(command) => self.arms(command),
            Action::Tuning(command) => {
                self.tuning(command);
                Ok(())
            }
            Action::Grab { label } => {
                let plan = self.vision.plan_grab(&label).await;
                info!(label = %label, steps = plan.len(), "executing grab plan");
                self.dispatch(&plan).await;
                Ok(())
            }
            Action::Describe { label } => {
                let text = self.vision.describe(label.as_deref()).await;
                self.speech.speak(&text).await
            }
            Action::Speech(text) => self.speech.speak(&text).await,
            Action::Malformed {
                kind,
                value,
                reason,
            } => {
                debug!(kind = %kind, value = %value, reason = %reason, "dropping malformed action");
                Ok(())
            }
            Action::Unknown { kind } => {
                debug!(kind = %kind, "ignoring unrecognised action");
                Ok(())
            }
        }
    }

    async fn movement(&self, command: MotionCommand) -> Result<(), RoverError> {
        match command {
            MotionCommand::Forward => {
                if let Some(guard) = &self.guard
                    && !guard.allows_forward()
                {
                    info!(distance_cm = guard.last_distance(), "forward vetoed by proximity guard");
                    self.drive.stop()?;
                    if self.notice.claim() {
                        self.speech.speak(WALL_NOTICE).await?;
                    }
                    return Ok(());
                }
                self.drive.forward(DIRECT_SPEED)
            }
            MotionCommand::Backward => self.drive.backward(DIRECT_SPEED),
            MotionCommand::TurnLeft => self.drive.turn_left(DIRECT_SPEED),
            MotionCommand::TurnRight => self.drive.turn_right(DIRECT_SPEED),
            MotionCommand::Stop => self.drive.stop(),
        }
    }

    fn arms(&self, command: ArmsCommand) -> Result<(), RoverError> {
        let mut arms = lock(&self.gestures);
        let (left, right) = arms.positions();
        match command {
            ArmsCommand::Set { left, right } => arms.set_positions(left, right),
            ArmsCommand::SetLeft(value) => arms.set_positions(value, right),
            ArmsCommand::SetRight(value) => arms.set_positions(left, value),
            ArmsCommand::Adjust { left, right } => arms.adjust(left, right),
        }
    }

    fn tuning(&self, command: TuningCommand) {
        let drive = &self.drive;
        match command {
            TuningCommand::SpeedSet(value) => drive.set_speed_scale(value),
            TuningCommand::SpeedAdjust(delta) => drive.adjust_speed_scale(delta),
            TuningCommand::TrimSet { side, value } => {
                let (left, right) = drive.trim();
                match side {
                    Side::Left => drive.set_trim(value, right),
                    Side::Right => drive.set_trim(left, value),
                }
            }
            TuningCommand::TrimAdjust { side, delta } => match side {
                Side::Left => drive.adjust_trim(delta, 0.0),
                Side::Right => drive.adjust_trim(0.0, delta),
            },
            TuningCommand::TrimReset => drive.reset_trim(),
        }
        debug!(scale = drive.speed_scale(), trim = ?drive.trim(), "drive tuning updated");
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! [`Orchestrator`] – the master control loop.
//!
//! Wires the drive train, the proximity guard, the autonomy loop, the battery
//! watchdog, and the collaborators together, then runs the foreground
//! listen → interpret → dispatch loop.
//!
//! Four activities share one drive train:
//!
//! | Activity | Task | Cadence |
//! |---|---|---|
//! | Foreground loop | caller of [`Orchestrator::run`] | per utterance |
//! | Guard poller | background | `GuardConfig::poll_interval_ms` |
//! | Autonomy loop | background, on demand | `AutoDriveConfig::poll_interval_s` |
//! | Battery watchdog | background | `OrchestratorConfig::battery_interval` |
//!
//! The safety activities pre-empt by re-asserting `stop()` every poll.  Once
//! the battery latch fires, autonomy is parked and the drive train is held on
//! `stop()` until [`Orchestrator::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use rover_hal::drive::DriveTrain;
use rover_hal::sensor::DistanceSource;
use rover_kernel::pacer::{Pacer, StopHandle, StopToken};
use rover_kernel::safe_shutdown::{SafeShutdown, ShutdownLatch};
use rover_kernel::wall_guard::{GuardTransition, WallGuard};
use rover_types::{EventPayload, MotionKind};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autonomy::{AutoDriveConfig, Autopilot, SensorLease};
use crate::bus::EventBus;
use crate::collaborators::{IntentSource, SpeechIo, Vision};
use crate::dispatcher::{
    Dispatcher, NoticeLatch, SharedAutopilot, SharedGestures, SharedGripper, WALL_NOTICE,
};

/// Spoken before leaving the main loop on a quit word.
pub const FAREWELL: &str = "Shutting down systems.";

const QUIT_WORDS: &[&str] = &["quit", "shutdown", "power down"];

/// Bounded wait for the guard poller and the battery task on shutdown.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How often a latched battery shutdown re-asserts `stop()`.
const HALT_HOLD_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub auto_start: bool,
    pub autonomy: AutoDriveConfig,
    pub battery_interval: Duration,
    pub listen_timeout: Duration,
    pub phrase_limit: Duration,
    /// Persona text handed to the intent source.
    pub persona: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_start: false,
            autonomy: AutoDriveConfig::default(),
            battery_interval: Duration::from_secs(15),
            listen_timeout: Duration::from_secs(5),
            phrase_limit: Duration::from_secs(5),
            persona: None,
        }
    }
}

/// Everything outside the control core.
pub struct Collaborators {
    pub gestures: SharedGestures,
    pub gripper: SharedGripper,
    pub vision: Arc<dyn Vision>,
    pub speech: Arc<dyn SpeechIo>,
}

/// Why [`Orchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The operator said a quit word.
    Quit,
    /// Battery-critical shutdown was latched.
    BatteryCritical,
    /// [`Orchestrator::interrupter`] was triggered (e.g. Ctrl-C).
    Interrupted,
    /// The speech input will never produce another utterance.
    InputClosed,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    drive: Arc<DriveTrain>,
    guard: Option<Arc<WallGuard>>,
    autopilot: SharedAutopilot,
    dispatcher: Dispatcher,
    gestures: SharedGestures,
    gripper: SharedGripper,
    speech: Arc<dyn SpeechIo>,
    bus: EventBus,
    notice: NoticeLatch,
    shutdown_latch: ShutdownLatch,
    watchdog: Option<SafeShutdown>,
    battery: Option<Background>,
    poller: Option<Background>,
    interrupt: Arc<StopHandle>,
    /// Fired by the battery task once it has latched a shutdown.
    halted: Arc<StopHandle>,
}

struct Background {
    stop: StopHandle,
    task: JoinHandle<()>,
}

impl Orchestrator {
    /// Wire the components together.  Nothing runs until
    /// [`Orchestrator::start`].
    ///
    /// When there is no guard, autonomy gets a fresh sensor from
    /// `owned_sensor` on every start and closes it when it stops.
    pub fn new<F>(
        drive: Arc<DriveTrain>,
        guard: Option<WallGuard>,
        watchdog: SafeShutdown,
        collaborators: Collaborators,
        config: OrchestratorConfig,
        owned_sensor: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn DistanceSource> + Send + Sync + 'static,
    {
        let bus = EventBus::default();
        let notice = NoticeLatch::new();

        let guard = guard
            .map(|g| Arc::new(g.with_observer(guard_observer(notice.clone(), bus.clone()))));

        let battery_bus = bus.clone();
        let watchdog = watchdog.with_notifier(move |payload| battery_bus.emit("battery", payload));
        let shutdown_latch = watchdog.latch();

        let shared_sensor = guard.as_ref().map(|g| g.sensor());
        let autopilot = Autopilot::new(Arc::clone(&drive), config.autonomy, move || match &shared_sensor {
            Some(sensor) => SensorLease::Shared(Arc::clone(sensor)),
            None => SensorLease::Owned(owned_sensor()),
        });
        let autopilot: SharedAutopilot = Arc::new(tokio::sync::Mutex::new(autopilot));

        let Collaborators {
            gestures,
            gripper,
            vision,
            speech,
        } = collaborators;

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&drive),
            Arc::clone(&autopilot),
            Arc::clone(&gestures),
            Arc::clone(&gripper),
            vision,
            Arc::clone(&speech),
        );
        if let Some(guard) = &guard {
            dispatcher = dispatcher.with_guard(Arc::clone(guard), notice.clone());
        }

        Self {
            config,
            drive,
            guard,
            autopilot,
            dispatcher,
            gestures,
            gripper,
            speech,
            bus,
            notice,
            shutdown_latch,
            watchdog: Some(watchdog),
            battery: None,
            poller: None,
            interrupt: Arc::new(StopHandle::new()),
            halted: Arc::new(StopHandle::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn drive(&self) -> &Arc<DriveTrain> {
        &self.drive
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn shutdown_latch(&self) -> ShutdownLatch {
        self.shutdown_latch.clone()
    }

    /// Handle that makes [`Orchestrator::run`] return
    /// [`ExitReason::Interrupted`].  Safe to trigger from any thread.
    pub fn interrupter(&self) -> Arc<StopHandle> {
        Arc::clone(&self.interrupt)
    }

    /// Spawn the battery watchdog and the guard poller, and start autonomy if
    /// configured.  Must be called from within a tokio runtime.
    pub async fn start(&mut self) {
        if let Some(mut watchdog) = self.watchdog.take() {
            let stop = StopHandle::new();
            let token = stop.token();
            let interval = self.config.battery_interval;
            let autopilot = Arc::clone(&self.autopilot);
            let drive = Arc::clone(&self.drive);
            let halted = Arc::clone(&self.halted);
            let task = tokio::spawn(async move {
                if watchdog.monitor_loop(interval, token.clone()).await {
                    halted.stop();
                    hold_stopped(autopilot, drive, token).await;
                }
            });
            self.battery = Some(Background { stop, task });
            info!(interval_s = interval.as_secs_f32(), "battery watchdog started");
        }

        if self.poller.is_none()
            && let Some(guard) = &self.guard
        {
            let stop = StopHandle::new();
            let task = tokio::spawn(guard_poller(
                Arc::clone(guard),
                Arc::clone(&self.drive),
                Arc::clone(&self.speech),
                self.notice.clone(),
                stop.token(),
            ));
            self.poller = Some(Background { stop, task });
            info!("proximity guard poller started");
        }

        if self.config.auto_start {
            self.autopilot.lock().await.start();
        }
    }

    /// The foreground loop.  Returns when told to quit, when the battery
    /// shutdown latch fires, when interrupted, or when input runs dry.
    pub async fn run(&self, intents: &dyn IntentSource) -> ExitReason {
        let mut interrupted = self.interrupt.token();
        let mut halted = self.halted.token();
        loop {
            if self.shutdown_latch.is_set() {
                warn!("battery shutdown latched; leaving main loop");
                return ExitReason::BatteryCritical;
            }
            if interrupted.is_stopped() {
                return ExitReason::Interrupted;
            }
            if self.speech.is_closed() {
                info!("speech input closed");
                return ExitReason::InputClosed;
            }

            let heard = tokio::select! {
                heard = self.speech.listen(self.config.listen_timeout, self.config.phrase_limit) => heard,
                _ = interrupted.stopped() => return ExitReason::Interrupted,
                _ = halted.stopped() => {
                    warn!("battery shutdown latched; leaving main loop");
                    return ExitReason::BatteryCritical;
                }
            };
            let Some(text) = heard else { continue };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            debug!(text, "heard");

            if is_quit_word(text) {
                self.say(FAREWELL).await;
                return ExitReason::Quit;
            }

            match intents.interpret(text, self.config.persona.as_deref()).await {
                Ok(batch) => {
                    if !batch.speech.trim().is_empty() {
                        self.say(&batch.speech).await;
                    }
                    self.dispatcher.dispatch(&batch.actions).await;
                }
                Err(e) => warn!(error = %e, "could not interpret utterance"),
            }
        }
    }

    /// Bring everything to rest.  Every step is attempted even if an earlier
    /// one fails.
    pub async fn shutdown(&mut self) {
        info!("shutting down");
        if let Some(poller) = self.poller.take() {
            join_bounded("guard poller", poller).await;
        }
        self.autopilot.lock().await.stop().await;
        self.shutdown_latch.cancel();
        if let Some(battery) = self.battery.take() {
            join_bounded("battery watchdog", battery).await;
        }
        if let Err(e) = self.drive.stop() {
            warn!(error = %e, "drive train stop failed");
        }
        if let Err(e) = self
            .gestures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .close()
        {
            warn!(error = %e, "arms failed to rest");
        }
        if let Err(e) = self
            .gripper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .release()
        {
            warn!(error = %e, "gripper failed to open");
        }
        if let Some(guard) = &self.guard {
            guard.close();
        }
        info!("shutdown complete");
    }

    async fn say(&self, text: &str) {
        if let Err(e) = self.speech.speak(text).await {
            warn!(error = %e, "speech failed");
        }
    }
}

fn is_quit_word(text: &str) -> bool {
    let lower = text
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    QUIT_WORDS.contains(&lower.as_str())
}

/// Re-arm the wall notice on clear and publish guard edges on the bus.
fn guard_observer(notice: NoticeLatch, bus: EventBus) -> impl Fn(GuardTransition) + Send + Sync + 'static {
    let rearm = notice.rearm_on_clear();
    move |transition| {
        rearm(transition);
        let payload = match transition {
            GuardTransition::Blocked { distance_cm } => EventPayload::ObstacleDetected { distance_cm },
            GuardTransition::Cleared { distance_cm } => EventPayload::PathClear { distance_cm },
        };
        bus.emit("wall_guard", payload);
    }
}

/// Sample the guard every poll; while the robot is driving forward into a
/// veto, stop it and speak the notice once per blocked episode.
async fn guard_poller(
    guard: Arc<WallGuard>,
    drive: Arc<DriveTrain>,
    speech: Arc<dyn SpeechIo>,
    notice: NoticeLatch,
    stop: StopToken,
) {
    let interval = Duration::from_millis(guard.config().poll_interval_ms);
    let mut pacer = Pacer::new(interval, stop);
    while !pacer.is_stopped() {
        let reading = guard.poll();
        let driving_forward = drive.last_action().0 == MotionKind::Forward;
        if driving_forward && !reading.allows_forward {
            if let Err(e) = drive.stop() {
                warn!(error = %e, "guard stop failed");
            }
            if notice.claim()
                && let Err(e) = speech.speak(WALL_NOTICE).await
            {
                warn!(error = %e, "wall notice failed");
            }
        }
        if !pacer.pause().await {
            break;
        }
    }
    debug!("guard poller exiting");
}

/// Keep autonomy parked and the drive train on `stop()` after the battery
/// latch fires, until `stop` is requested.
async fn hold_stopped(autopilot: SharedAutopilot, drive: Arc<DriveTrain>, stop: StopToken) {
    let mut pacer = Pacer::new(HALT_HOLD_INTERVAL, stop);
    loop {
        {
            let mut autopilot = autopilot.lock().await;
            if autopilot.is_running() {
                warn!("battery shutdown latched; stopping autonomy");
                autopilot.stop().await;
            }
        }
        if drive.last_action().0 != MotionKind::Stop {
            warn!("battery shutdown latched; re-asserting stop");
            if let Err(e) = drive.stop() {
                warn!(error = %e, "latched stop failed");
            }
        }
        if !pacer.pause().await {
            break;
        }
    }
    debug!("battery hold exiting");
}

async fn join_bounded(name: &str, background: Background) {
    let Background { stop, task } = background;
    stop.stop();
    let abort = task.abort_handle();
    match tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await {
        Ok(Ok(())) => debug!(task = name, "stopped"),
        Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
        Err(_) => {
            warn!(task = name, "did not stop in time; aborting");
            abort.abort();
        }
    }
}

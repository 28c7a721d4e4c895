//! [`SafeShutdown`] – battery-critical power-down.
//!
//! On the first critical classification the drive train is stopped, the
//! shutdown latch is set, and (unless simulating) the host is asked to halt.
//! The latch is monotonic: once set, later checks only log.
//!
//! ```text
//!   check_once ── ok ──────────────────────────► (nothing)
//!              ── low ─────────────────────────► warn!
//!              ── critical, latch clear ───────► stop drive train
//!                                                set latch
//!                                                halt host (unless simulated)
//!              ── critical, latch set ─────────► error!
//! ```

use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rover_hal::drive::DriveTrain;
use rover_types::{BatteryStatus, EventPayload, RoverError};
use tracing::{debug, error, info, warn};

use crate::battery::BatteryMonitor;
use crate::pacer::{Pacer, StopToken};

// ────────────────────────────────────────────────────────────────────────────
// Host halt
// ────────────────────────────────────────────────────────────────────────────

/// Requests that the host operating system power off.
pub trait SystemHalt: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the request could not be made.
    fn halt(&self) -> Result<(), RoverError>;
}

/// Runs `sudo shutdown -h now`.
///
/// Inside a tokio runtime the command runs on the blocking pool and failures
/// are only logged; outside one it runs inline and failures are returned.
pub struct HostHalt {
    program: String,
    args: Vec<String>,
}

impl Default for HostHalt {
    fn default() -> Self {
        Self::with_command("sudo", ["shutdown", "-h", "now"])
    }
}

impl HostHalt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `program` with `args` in place of the host shutdown command.
    pub fn with_command<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

fn run_halt(mut command: Command) -> Result<(), RoverError> {
    let status = command.status().map_err(|e| RoverError::HardwareFault {
        component: "host".into(),
        details: format!("failed to run shutdown: {e}"),
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(RoverError::HardwareFault {
            component: "host".into(),
            details: format!("shutdown exited with {status}"),
        })
    }
}

impl SystemHalt for HostHalt {
    fn halt(&self) -> Result<(), RoverError> {
        let command = self.command();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || {
                    if let Err(e) = run_halt(command) {
                        error!(error = %e, "host shutdown request failed");
                    }
                });
                Ok(())
            }
            Err(_) => run_halt(command),
        }
    }
}

/// What to do once the battery goes critical.
pub enum ShutdownMode {
    /// Stop the motors and log; never touch the host.
    Simulated,
    Halt(Box<dyn SystemHalt>),
}

// ────────────────────────────────────────────────────────────────────────────
// Latch
// ────────────────────────────────────────────────────────────────────────────

/// Monotonic "shutdown initiated" flag, shareable across tasks.
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch(Arc<AtomicBool>);

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Set the latch without stopping anything or halting the host.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Set the latch; `true` if this call was the one that set it.
    fn fire(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SafeShutdown
// ────────────────────────────────────────────────────────────────────────────

type Notifier = Box<dyn Fn(EventPayload) + Send + Sync>;

pub struct SafeShutdown {
    monitor: BatteryMonitor,
    drive: Arc<DriveTrain>,
    mode: ShutdownMode,
    latch: ShutdownLatch,
    fired: bool,
    notifier: Option<Notifier>,
}

impl SafeShutdown {
    pub fn new(monitor: BatteryMonitor, drive: Arc<DriveTrain>, mode: ShutdownMode) -> Self {
        Self {
            monitor,
            drive,
            mode,
            latch: ShutdownLatch::new(),
            fired: false,
            notifier: None,
        }
    }

    /// Receive a [`EventPayload::Battery`] per check and one
    /// [`EventPayload::ShutdownInitiated`] when the latch fires.
    pub fn with_notifier<F>(mut self, notifier: F) -> Self
    where
        F: Fn(EventPayload) + Send + Sync + 'static,
    {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// A clone of the latch, for cancelling from another task.
    pub fn latch(&self) -> ShutdownLatch {
        self.latch.clone()
    }

    pub fn is_initiated(&self) -> bool {
        self.latch.is_set()
    }

    pub fn cancel(&self) {
        self.latch.cancel();
    }

    pub fn monitor(&self) -> &BatteryMonitor {
        &self.monitor
    }

    /// Classify once and act on the result.
    pub fn check_once(&mut self) -> BatteryStatus {
        let status = self.monitor.classify();
        let voltage = self.monitor.voltage().unwrap_or(0.0);
        self.notify(EventPayload::Battery { status, voltage });

        match status {
            BatteryStatus::Critical if self.latch.fire() => {
                self.fired = true;
                self.initiate(voltage);
            }
            BatteryStatus::Critical => error!(voltage, "battery critical"),
            BatteryStatus::Low => warn!(voltage, "battery low"),
            BatteryStatus::Ok => debug!(voltage, "battery ok"),
        }
        status
    }

    /// Run [`SafeShutdown::check_once`] every `interval` until the latch is
    /// set or `stop` fires.
    ///
    /// Returns `true` only when this watchdog fired the latch itself; a
    /// cancelled latch or a stop request returns `false`.
    pub async fn monitor_loop(&mut self, interval: Duration, stop: StopToken) -> bool {
        let mut pacer = Pacer::new(interval, stop);
        while !self.latch.is_set() && !pacer.is_stopped() {
            self.check_once();
            if !pacer.pause().await {
                break;
            }
        }
        debug!(initiated = self.fired, "battery watchdog exiting");
        self.fired
    }

    fn initiate(&self, voltage: f32) {
        error!(voltage, "critical battery; stopping motors and shutting down");
        if let Err(e) = self.drive.stop() {
            error!(error = %e, "failed to stop drive train during shutdown");
        }
        self.notify(EventPayload::ShutdownInitiated { voltage });
        match &self.mode {
            ShutdownMode::Simulated => info!("[SIM] host shutdown skipped"),
            ShutdownMode::Halt(halt) => {
                if let Err(e) = halt.halt() {
                    error!(error = %e, "failed to request host shutdown");
                }
            }
        }
    }

    fn notify(&self, payload: EventPayload) {
        if let Some(notifier) = &self.notifier {
            notifier(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use rover_hal::drive::{DriveConfig, Motors};
    use rover_hal::sim::ScriptedVoltage;
    use rover_types::MotionKind;

    use super::*;
    use crate::battery::BatteryConfig;
    use crate::pacer::StopHandle;

    struct CountingHalt(Arc<AtomicUsize>);

    impl SystemHalt for CountingHalt {
        fn halt(&self) -> Result<(), RoverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn drive() -> Arc<DriveTrain> {
        Arc::new(DriveTrain::new(DriveConfig::default(), Motors::Simulated).unwrap())
    }

    fn monitor(readings: &[f32], critical: f32, warn: f32) -> BatteryMonitor {
        let config = BatteryConfig {
            critical_voltage: critical,
            warn_voltage: warn,
            smoothing: 1.0,
            ..BatteryConfig::default()
        };
        BatteryMonitor::new(Box::new(ScriptedVoltage::new(readings.to_vec())), config).unwrap()
    }

    #[test]
    fn critical_reading_stops_and_latches() {
        let drive = drive();
        drive.forward(0.5).unwrap();
        let mut shutdown = SafeShutdown::new(
            monitor(&[10.5], 11.0, 11.5),
            Arc::clone(&drive),
            ShutdownMode::Simulated,
        );
        assert_eq!(shutdown.check_once(), BatteryStatus::Critical);
        assert!(shutdown.is_initiated());
        assert_eq!(drive.last_action().0, MotionKind::Stop);
    }

    #[test]
    fn low_reading_only_warns() {
        let mut shutdown = SafeShutdown::new(
            monitor(&[11.2], 10.0, 11.5),
            drive(),
            ShutdownMode::Simulated,
        );
        assert_eq!(shutdown.check_once(), BatteryStatus::Low);
        assert!(!shutdown.is_initiated());
    }

    #[test]
    fn latch_persists_after_recovery() {
        let mut shutdown = SafeShutdown::new(
            monitor(&[10.0, 12.6], 10.8, 11.4),
            drive(),
            ShutdownMode::Simulated,
        );
        shutdown.check_once();
        assert_eq!(shutdown.check_once(), BatteryStatus::Ok);
        assert!(shutdown.is_initiated());
    }

    #[test]
    fn host_halt_requested_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut shutdown = SafeShutdown::new(
            monitor(&[10.0, 9.5, 9.0], 10.8, 11.4),
            drive(),
            ShutdownMode::Halt(Box::new(CountingHalt(Arc::clone(&calls)))),
        );
        for _ in 0..3 {
            assert_eq!(shutdown.check_once(), BatteryStatus::Critical);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_suppresses_shutdown_side_effects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let drive = drive();
        drive.forward(0.5).unwrap();
        let mut shutdown = SafeShutdown::new(
            monitor(&[10.0], 10.8, 11.4),
            Arc::clone(&drive),
            ShutdownMode::Halt(Box::new(CountingHalt(Arc::clone(&calls)))),
        );
        shutdown.latch().cancel();
        assert!(shutdown.is_initiated());
        shutdown.check_once();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(drive.last_action().0, MotionKind::Forward);
    }

    #[test]
    fn notifier_sees_battery_and_shutdown_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut shutdown = SafeShutdown::new(
            monitor(&[12.6, 10.0], 10.8, 11.4),
            drive(),
            ShutdownMode::Simulated,
        )
        .with_notifier(move |e| sink.lock().unwrap().push(e));
        shutdown.check_once();
        shutdown.check_once();
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                EventPayload::Battery {
                    status: BatteryStatus::Ok,
                    voltage: 12.6
                },
                EventPayload::Battery {
                    status: BatteryStatus::Critical,
                    voltage: 10.0
                },
                EventPayload::ShutdownInitiated { voltage: 10.0 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_loop_exits_when_latch_fires() {
        let mut shutdown = SafeShutdown::new(
            monitor(&[12.0, 11.0, 10.0, 12.0], 10.8, 11.4),
            drive(),
            ShutdownMode::Simulated,
        );
        let handle = StopHandle::new();
        let fired = shutdown
            .monitor_loop(Duration::from_secs(15), handle.token())
            .await;
        assert!(fired);
        assert!(shutdown.is_initiated());
        assert_eq!(shutdown.monitor().voltage(), Some(10.0));
    }

    #[tokio::test]
    async fn monitor_loop_honours_stop() {
        let mut shutdown = SafeShutdown::new(
            monitor(&[12.0], 10.8, 11.4),
            drive(),
            ShutdownMode::Simulated,
        );
        let handle = StopHandle::new();
        handle.stop();
        let fired = shutdown
            .monitor_loop(Duration::from_secs(15), handle.token())
            .await;
        assert!(!fired);
        assert!(!shutdown.is_initiated());
        assert_eq!(shutdown.monitor().voltage(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_latch_is_not_reported_as_fired() {
        let mut shutdown = SafeShutdown::new(
            monitor(&[12.0, 10.0], 10.8, 11.4),
            drive(),
            ShutdownMode::Simulated,
        );
        let latch = shutdown.latch();
        let handle = StopHandle::new();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            latch.cancel();
        });
        let fired = shutdown
            .monitor_loop(Duration::from_secs(15), handle.token())
            .await;
        assert!(!fired);
        assert!(shutdown.is_initiated());
    }

    #[cfg(unix)]
    #[test]
    fn host_halt_reports_failure_outside_a_runtime() {
        assert!(HostHalt::with_command("true", Vec::<String>::new()).halt().is_ok());
        assert!(matches!(
            HostHalt::with_command("false", Vec::<String>::new()).halt(),
            Err(RoverError::HardwareFault { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn host_halt_does_not_block_the_runtime() {
        let halt = HostHalt::with_command("sleep", ["1"]);
        let started = std::time::Instant::now();
        assert!(halt.halt().is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}

//! `rover-runtime` – The Control Core
//!
//! Everything that turns utterances into motion: the action dispatcher, the
//! autonomy loop, the event bus, and the orchestrator that runs them
//! alongside the safety activities from `rover-kernel`.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]:
//!   the master control loop.  Owns the background guard poller and battery
//!   watchdog, runs listen → interpret → dispatch in the foreground, and
//!   brings every actuator to rest on shutdown.
//! - [`dispatcher`] – [`Dispatcher`][dispatcher::Dispatcher]:
//!   applies a batch of [`ActionRecord`][rover_types::ActionRecord]s strictly
//!   in order.  Forward motion is gated by the
//!   [`WallGuard`][rover_kernel::WallGuard].
//! - [`autonomy`] – [`Autopilot`][autonomy::Autopilot]:
//!   the reactive obstacle-avoidance loop (drive, back off, turn, repeat) as
//!   a stoppable background task.
//! - [`bus`] – [`EventBus`][bus::EventBus]:
//!   topic-based broadcast of safety alerts and telemetry.
//! - [`collaborators`] – seams to intent extraction, speech, and vision.
//! - [`vision`] – [`SceneVision`][vision::SceneVision]:
//!   a fixed scene for simulated runs.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.
//!
//! # Safety
//!
//! No actuation path bypasses the [`DriveTrain`][rover_hal::DriveTrain]: the
//! dispatcher, the autonomy loop, the guard poller, and the battery watchdog
//! all share one instance, and the safety activities pre-empt the others by
//! re-asserting `stop()`.

pub mod autonomy;
pub mod bus;
pub mod collaborators;
pub mod dispatcher;
pub mod orchestrator;
pub mod telemetry;
pub mod vision;

pub use autonomy::{AutoDriveConfig, AutoDriver, Autopilot, AutonomyState, SensorLease};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use collaborators::{IntentSource, SpeechIo, Vision};
pub use dispatcher::{Dispatcher, NoticeLatch, WALL_NOTICE};
pub use orchestrator::{Collaborators, ExitReason, Orchestrator, OrchestratorConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use vision::SceneVision;

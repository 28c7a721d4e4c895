//! `rover-kernel` – Safety
//!
//! The brainstem of the rover.  It does not decide where to go; it vetoes
//! motion that would hurt the robot and powers it down before the battery
//! does.
//!
//! # Modules
//!
//! - [`pacer`] – [`StopHandle`][pacer::StopHandle] /
//!   [`StopToken`][pacer::StopToken] / [`Pacer`][pacer::Pacer]: the
//!   cancellation primitive every background loop is paced by.
//! - [`wall_guard`] – [`WallGuard`][wall_guard::WallGuard]: hysteresis
//!   proximity guard that vetoes forward motion near an obstacle.
//! - [`battery`] – [`BatteryMonitor`][battery::BatteryMonitor]: smoothed
//!   voltage sampling and ok/low/critical classification.
//! - [`safe_shutdown`] – [`SafeShutdown`][safe_shutdown::SafeShutdown]: stops
//!   the drive train and halts the host on the first critical reading.

pub mod battery;
pub mod pacer;
pub mod safe_shutdown;
pub mod wall_guard;

pub use battery::{BatteryConfig, BatteryMonitor};
pub use pacer::{Pacer, StopHandle, StopToken};
pub use safe_shutdown::{HostHalt, SafeShutdown, ShutdownLatch, ShutdownMode, SystemHalt};
pub use wall_guard::{GuardConfig, GuardReading, GuardTransition, WallGuard};

//! Sensor traits.
//!
//! Sensor failures are never errors at this layer: an unavailable distance
//! sample is `None` (or a negative value), and callers treat it as
//! "assume safe" for that cycle.

use std::sync::{Arc, Mutex};

/// A forward-facing range finder (ultrasonic or similar).
pub trait DistanceSource: Send {
    /// Distance to the nearest obstacle in centimetres, or `None` when the
    /// sensor could not produce a sample.
    fn read_cm(&mut self) -> Option<f32>;

    /// Release the underlying device.  Default is a no-op.
    fn close(&mut self) {}
}

/// A battery voltage probe.
pub trait VoltageSource: Send {
    /// Battery voltage in volts.  Non-positive values signal a bad sample.
    fn read_volts(&mut self) -> f32;
}

/// Distance sensor shared between the proximity guard and the autonomy loop.
pub type SharedSensor = Arc<Mutex<dyn DistanceSource>>;

/// Wrap `sensor` so it can be shared between activities.
pub fn share_sensor<S: DistanceSource + 'static>(sensor: S) -> SharedSensor {
    Arc::new(Mutex::new(sensor))
}

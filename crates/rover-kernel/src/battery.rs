//! [`BatteryMonitor`] – smoothed battery voltage and ok/low/critical
//! classification.
//!
//! Raw readings are blended into an exponential moving average; the first
//! reading seeds it.  A non-positive reading is logged but still blended so a
//! disconnected probe drags the average towards critical instead of being
//! silently ignored.

use std::sync::Arc;
use std::time::Duration;

use rover_hal::sensor::VoltageSource;
use rover_types::{BatteryStatus, RoverError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pacer::{Pacer, StopHandle};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// At or below this the pack is critical (3S LiPo ≈ 3.6 V per cell).
    pub critical_voltage: f32,
    pub warn_voltage: f32,
    pub sample_interval_s: f32,
    /// Weight of the newest reading in the moving average, in `[0, 1]`.
    pub smoothing: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            critical_voltage: 10.8,
            warn_voltage: 11.4,
            sample_interval_s: 5.0,
            smoothing: 0.6,
        }
    }
}

impl BatteryConfig {
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] unless
    /// `critical_voltage < warn_voltage` and the sample interval is positive.
    pub fn validate(&self) -> Result<(), RoverError> {
        let ordered = self.critical_voltage < self.warn_voltage;
        if !ordered {
            return Err(RoverError::Configuration(format!(
                "critical voltage ({} V) must be below warn voltage ({} V)",
                self.critical_voltage, self.warn_voltage
            )));
        }
        let positive = self.sample_interval_s > 0.0 && self.sample_interval_s.is_finite();
        if !positive {
            return Err(RoverError::Configuration(format!(
                "battery sample interval must be positive, got {}",
                self.sample_interval_s
            )));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f32(self.sample_interval_s)
    }
}

pub struct BatteryMonitor {
    source: Box<dyn VoltageSource>,
    config: BatteryConfig,
    ema: Option<f32>,
    stop: Arc<StopHandle>,
}

impl BatteryMonitor {
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] if `config` fails validation.
    pub fn new(source: Box<dyn VoltageSource>, config: BatteryConfig) -> Result<Self, RoverError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            ema: None,
            stop: Arc::new(StopHandle::new()),
        })
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    /// Smoothed voltage, or `None` before the first sample.
    pub fn voltage(&self) -> Option<f32> {
        self.ema
    }

    /// Read the source once and fold it into the moving average.
    pub fn sample(&mut self) -> f32 {
        let reading = self.source.read_volts();
        if reading <= 0.0 {
            warn!(reading, "battery probe returned a non-positive voltage");
        }
        let ema = match self.ema {
            None => reading,
            Some(previous) => {
                let alpha = self.config.smoothing.clamp(0.0, 1.0);
                alpha * reading + (1.0 - alpha) * previous
            }
        };
        self.ema = Some(ema);
        debug!(reading, ema, "battery sample");
        ema
    }

    /// Sample, then classify the smoothed voltage.
    pub fn classify(&mut self) -> BatteryStatus {
        let voltage = self.sample();
        self.status_for(voltage)
    }

    fn status_for(&self, voltage: f32) -> BatteryStatus {
        if voltage <= self.config.critical_voltage {
            BatteryStatus::Critical
        } else if voltage <= self.config.warn_voltage {
            BatteryStatus::Low
        } else {
            BatteryStatus::Ok
        }
    }

    /// Classify every `interval` and hand the result to `callback` until the
    /// monitor is stopped.  [`BatteryConfig::sample_interval`] is the usual
    /// choice.
    ///
    /// The stop request is honoured before the next sample is taken.  Stopping
    /// is terminal: a later `watch` on the same monitor returns immediately.
    pub async fn watch<F>(&mut self, interval: Duration, mut callback: F)
    where
        F: FnMut(BatteryStatus, f32),
    {
        let mut pacer = Pacer::new(interval, self.stop.token());
        while !pacer.is_stopped() {
            let status = self.classify();
            callback(status, self.ema.unwrap_or(0.0));
            if !pacer.pause().await {
                break;
            }
        }
    }

    /// A handle that can stop [`BatteryMonitor::watch`] from another task.
    pub fn stopper(&self) -> Arc<StopHandle> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.stop();
    }
}

#[cfg(test)]
mod tests {
    use rover_hal::sim::ScriptedVoltage;

    use super::*;

    fn monitor(readings: &[f32], config: BatteryConfig) -> BatteryMonitor {
        BatteryMonitor::new(Box::new(ScriptedVoltage::new(readings.to_vec())), config).unwrap()
    }

    #[test]
    fn classification_without_smoothing() {
        let config = BatteryConfig {
            smoothing: 1.0,
            ..BatteryConfig::default()
        };
        let mut m = monitor(&[12.6, 12.5, 12.0, 11.2, 10.7], config);
        let statuses: Vec<BatteryStatus> = (0..5).map(|_| m.classify()).collect();
        assert_eq!(
            statuses,
            vec![
                BatteryStatus::Ok,
                BatteryStatus::Ok,
                BatteryStatus::Ok,
                BatteryStatus::Low,
                BatteryStatus::Critical,
            ]
        );
    }

    #[test]
    fn first_reading_seeds_average() {
        let mut m = monitor(&[12.0, 11.0], BatteryConfig::default());
        assert_eq!(m.voltage(), None);
        assert_eq!(m.sample(), 12.0);
        // 0.6 * 11.0 + 0.4 * 12.0
        assert!((m.sample() - 11.4).abs() < 1e-4);
    }

    #[test]
    fn non_positive_reading_is_still_blended() {
        let config = BatteryConfig {
            smoothing: 0.5,
            ..BatteryConfig::default()
        };
        let mut m = monitor(&[12.0, 0.0], config);
        m.sample();
        assert!((m.sample() - 6.0).abs() < 1e-4);
    }

    #[test]
    fn smoothing_is_clamped() {
        let config = BatteryConfig {
            smoothing: 4.0,
            ..BatteryConfig::default()
        };
        let mut m = monitor(&[12.0, 10.0], config);
        m.sample();
        assert_eq!(m.sample(), 10.0);
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let config = BatteryConfig {
            critical_voltage: 11.5,
            warn_voltage: 11.0,
            ..BatteryConfig::default()
        };
        assert!(matches!(
            BatteryMonitor::new(Box::new(ScriptedVoltage::new([12.0])), config),
            Err(RoverError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_reports_until_stopped() {
        let config = BatteryConfig {
            smoothing: 1.0,
            ..BatteryConfig::default()
        };
        let mut m = monitor(&[12.6, 11.2, 10.5, 9.0], config);
        let stopper = m.stopper();
        let started = tokio::time::Instant::now();
        let mut seen = Vec::new();
        m.watch(Duration::from_millis(10), |status, voltage| {
            seen.push((status, voltage));
            if seen.len() == 3 {
                stopper.stop();
            }
        })
        .await;
        assert_eq!(
            seen,
            vec![
                (BatteryStatus::Ok, 12.6),
                (BatteryStatus::Low, 11.2),
                (BatteryStatus::Critical, 10.5),
            ]
        );
        // Paced by the argument, not the 5 s configured default.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn stop_before_watch_takes_no_sample() {
        let mut m = monitor(&[12.0], BatteryConfig::default());
        m.stop();
        let mut calls = 0;
        let interval = m.config().sample_interval();
        m.watch(interval, |_, _| calls += 1).await;
        assert_eq!(calls, 0);
        assert_eq!(m.voltage(), None);
    }
}

//! Safety supervisor: limit checks, sensor loss and the stuck-heater watchdog.
//!
//! Every check fails toward heater-off. The supervisor only ever reports a
//! `FaultReason`; latching it (and clearing it on reset) belongs to the
//! controller.

use crate::config::{SafetyCfg, WatchCfg};
use crate::error::FaultReason;
use crate::zone::Zone;

/// Stuck-heater watchdog progress for one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WatchState {
    armed: bool,
    deadline_ms: u64,
    baseline_c: f32,
}

impl WatchState {
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.armed.then_some(self.deadline_ms)
    }

    fn arm(&mut self, baseline_c: f32, deadline_ms: u64) {
        self.armed = true;
        self.baseline_c = baseline_c;
        self.deadline_ms = deadline_ms;
    }

    pub fn disarm(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone)]
pub struct SafetySupervisor {
    cfg: SafetyCfg,
}

impl SafetySupervisor {
    pub fn new(cfg: SafetyCfg) -> Self {
        Self { cfg }
    }

    pub fn watch_cfg(&self) -> &WatchCfg {
        &self.cfg.watch
    }

    /// Validate a fresh reading against the zone limits.
    pub fn check_reading(&self, zone: &Zone) -> Option<FaultReason> {
        let t = zone.current_c;
        if !t.is_finite() {
            return Some(FaultReason::SensorFault);
        }
        if t > zone.max_temp() {
            return Some(FaultReason::MaxTemp);
        }
        if t < zone.min_temp_c {
            return Some(FaultReason::MinTemp);
        }
        if zone.redundant_sensor {
            match zone.redundant_c {
                Some(r) if r.is_finite() && (t - r).abs() <= self.cfg.redundant_max_diff_c => {}
                _ => return Some(FaultReason::RedundantMismatch),
            }
        }
        None
    }

    /// Count a failed read; past the limit the sensor is considered lost.
    pub fn record_read_failure(&self, zone: &mut Zone) -> Option<FaultReason> {
        zone.read_errors = zone.read_errors.saturating_add(1);
        (zone.read_errors > self.cfg.sensor_error_limit).then_some(FaultReason::SensorTimeout)
    }

    pub fn record_read_success(&self, zone: &mut Zone) {
        zone.read_errors = 0;
    }

    /// Advance the watchdog for a zone about to be driven towards `setpoint`.
    ///
    /// Armed while the previous output was at least `min_power` and the zone
    /// sits more than `settle_band_c` below its setpoint outside standby.
    /// A zone under autotune is watched whatever its standby state.
    pub fn check_watchdog(
        &self,
        zone: &mut Zone,
        setpoint: f32,
        tuning: bool,
        now_ms: u64,
    ) -> Option<FaultReason> {
        let w = &self.cfg.watch;
        if w.period_ms == 0 {
            zone.watch.disarm();
            return None;
        }
        let current = zone.current_c;
        let driving = zone.power >= w.min_power
            && (tuning || !zone.state.is_standby())
            && setpoint - current > w.settle_band_c;
        if !driving {
            zone.watch.disarm();
            return None;
        }
        if !zone.watch.armed {
            zone.watch.arm(current, now_ms.saturating_add(w.period_ms));
            return None;
        }
        if current >= zone.watch.baseline_c + w.min_rise_c {
            zone.watch.arm(current, now_ms.saturating_add(w.period_ms));
            return None;
        }
        (now_ms >= zone.watch.deadline_ms).then_some(FaultReason::HeatingStalled)
    }
}

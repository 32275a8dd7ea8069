//! PID evaluation with anti-windup, filtered derivative-on-measurement and
//! an optional extrusion feed-forward term.
//!
//! Gains are stored pre-scaled for the tick period: `ki = Ki * dt` and
//! `kd = Kd / dt`, so the per-tick arithmetic never divides by time.

use std::collections::VecDeque;

use crate::config::{ExtrusionCfg, PidCfg};
use crate::util::period_secs;

/// Gains scaled to the tick period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    /// Integral gain per tick.
    pub ki: f32,
    /// Derivative gain in ticks.
    pub kd: f32,
}

impl PidGains {
    /// Scale per-second gains to a tick period.
    pub fn from_unscaled(kp: f32, ki: f32, kd: f32, period_ms: u64) -> Self {
        let dt = period_secs(period_ms);
        Self {
            kp,
            ki: ki * dt,
            kd: kd / dt,
        }
    }

    /// Per-second (kp, ki, kd), the inverse of `from_unscaled`.
    pub fn unscaled(&self, period_ms: u64) -> (f32, f32, f32) {
        let dt = period_secs(period_ms);
        (self.kp, self.ki / dt, self.kd * dt)
    }

    pub fn is_valid(&self) -> bool {
        [self.kp, self.ki, self.kd]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Per-zone PID running state.
#[derive(Debug, Clone, Default)]
pub struct PidState {
    /// Sum of errors, clamped so `ki * i_state <= integral_drive_max`.
    i_state: f32,
    d_term: f32,
    prev_temp: Option<f32>,
    /// Set when the output left the functional range; clears the integral on re-entry.
    reset_pending: bool,
    /// Filament fed since the last tick, in millimetres.
    pending_feed_mm: f32,
    /// Feed history, oldest first.
    feed_history: VecDeque<f32>,
}

impl PidState {
    pub fn reset(&mut self) {
        self.i_state = 0.0;
        self.d_term = 0.0;
        self.prev_temp = None;
        self.reset_pending = false;
        self.pending_feed_mm = 0.0;
        self.feed_history.clear();
    }

    pub fn integral(&self) -> f32 {
        self.i_state
    }

    pub fn derivative(&self) -> f32 {
        self.d_term
    }

    pub fn is_clean(&self) -> bool {
        self.i_state == 0.0 && self.d_term == 0.0 && self.prev_temp.is_none()
    }

    pub(crate) fn add_feed(&mut self, mm: f32) {
        if mm.is_finite() && mm > 0.0 {
            self.pending_feed_mm += mm;
        }
    }
}

/// Terms of one evaluation, reported for tracing and traces.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidOutput {
    pub power: u8,
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub c: f32,
}

/// Stateless evaluator shared by every zone.
#[derive(Debug, Clone)]
pub struct PidController {
    cfg: PidCfg,
    extrusion: ExtrusionCfg,
}

impl PidController {
    pub fn new(cfg: PidCfg, extrusion: ExtrusionCfg) -> Self {
        Self { cfg, extrusion }
    }

    pub fn max_power(&self) -> u8 {
        self.cfg.max_power
    }

    /// Compute the actuation for one tick and advance `state`.
    pub fn evaluate(
        &self,
        gains: &PidGains,
        state: &mut PidState,
        setpoint: f32,
        current: f32,
    ) -> PidOutput {
        let max = f32::from(self.cfg.max_power);
        let error = setpoint - current;
        let prev = state.prev_temp.replace(current);
        let feed = self.rotate_feed(state);

        if setpoint <= 0.0 {
            state.reset_pending = true;
            return PidOutput::default();
        }
        if let Some(range) = self.cfg.functional_range_c {
            if error < -range {
                state.reset_pending = true;
                return PidOutput::default();
            }
            if error > range {
                state.reset_pending = true;
                return PidOutput {
                    power: self.cfg.max_power,
                    ..PidOutput::default()
                };
            }
        }
        if state.reset_pending {
            state.i_state = 0.0;
            state.reset_pending = false;
        }

        let p = gains.kp * error;

        state.i_state += error;
        let i_max = if gains.ki > 0.0 {
            self.cfg.integral_drive_max / gains.ki
        } else {
            0.0
        };
        state.i_state = state.i_state.clamp(0.0, i_max);
        let i = gains.ki * state.i_state;

        let k1 = self.cfg.d_filter;
        let k2 = 1.0 - k1;
        if let Some(prev) = prev {
            state.d_term = k2 * gains.kd * (prev - current) + k1 * state.d_term;
        }
        let d = state.d_term;

        let c = if self.extrusion.enabled {
            self.extrusion.kc * feed
        } else {
            0.0
        };

        let raw = p + i + d + c;
        let power = if raw.is_finite() {
            raw.clamp(0.0, max).round() as u8
        } else {
            0
        };
        tracing::trace!(setpoint, current, p, i, d, c, power, "pid");
        PidOutput { power, p, i, d, c }
    }

    /// Push this tick's feed into the lag window and return the feed that
    /// leaves it (the load arriving at the heater now).
    fn rotate_feed(&self, state: &mut PidState) -> f32 {
        let fed = std::mem::take(&mut state.pending_feed_mm);
        if !self.extrusion.enabled {
            return 0.0;
        }
        state.feed_history.push_back(fed);
        if state.feed_history.len() > self.extrusion.lag_ticks {
            state.feed_history.pop_front().unwrap_or(0.0)
        } else {
            0.0
        }
    }
}

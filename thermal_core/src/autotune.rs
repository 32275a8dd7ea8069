//! Relay-feedback PID autotune.
//!
//! The session forces its zone fully on until the temperature passes
//! `target + hysteresis`, then fully off until it falls below
//! `target - hysteresis`. Each cooling-to-heating switch completes a cycle.
//! The first cycle is the heat-up from ambient and only starts the clock;
//! every later cycle yields an amplitude `a` and period `Tu`, from which
//!
//! ```text
//! Ku = 4d / (pi * a)     d = max_power / 2
//! Kp = 0.6 Ku   Ki = 2 Kp / Tu   Kd = Kp Tu / 8
//! ```
//!
//! averaged over the measured cycles. Time is counted in ticks so a session
//! is deterministic for a given temperature sequence.

use std::f32::consts::PI;
use std::ops::ControlFlow;

use crate::config::AutotuneCfg;
use crate::error::AutotuneError;
use crate::pid::PidGains;
use crate::util::{ticks_for, ticks_to_secs};
use crate::zone::ZoneId;

/// Fewest cycles a session runs: one heat-up plus one measured oscillation.
pub const MIN_CYCLES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutotuneState {
    #[default]
    Idle,
    Heating,
    Cooling,
    Evaluating,
    Done,
    Aborted,
}

/// Gains in per-second units, as an operator would store them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TunedGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Reported once per completed cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutotuneProgress {
    pub zone: ZoneId,
    pub state: AutotuneState,
    pub cycle: u32,
    pub cycles: u32,
    pub current_c: f32,
    pub peak_c: f32,
    pub trough_c: f32,
    /// Running average once at least one oscillation has been measured.
    pub gains: Option<TunedGains>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutotuneReport {
    pub zone: ZoneId,
    pub target_c: f32,
    pub cycles: u32,
    /// Ultimate gain and period (seconds), averaged.
    pub ku: f32,
    pub tu_s: f32,
    pub tuned: TunedGains,
    /// `tuned` scaled to the tick period.
    pub gains: PidGains,
    pub elapsed_ticks: u64,
}

/// Receives autotune progress and exactly one terminal result.
pub trait AutotuneObserver {
    /// Return `ControlFlow::Break(())` to cancel the session.
    fn on_cycle(&mut self, _progress: &AutotuneProgress) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_finish(&mut self, result: &Result<AutotuneReport, AutotuneError>);
}

/// Adapts a closure into an observer that only cares about the result.
pub struct FnObserver<F>(pub F);

impl<F> AutotuneObserver for FnObserver<F>
where
    F: FnMut(&Result<AutotuneReport, AutotuneError>),
{
    fn on_finish(&mut self, result: &Result<AutotuneReport, AutotuneError>) {
        (self.0)(result);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AutotuneObserver for NoopObserver {
    fn on_finish(&mut self, _result: &Result<AutotuneReport, AutotuneError>) {}
}

pub(crate) enum SessionStep {
    Drive(u8),
    Finish(Result<AutotuneReport, AutotuneError>),
}

#[derive(Debug, Default, Clone, Copy)]
struct Sums {
    ku: f32,
    tu: f32,
    kp: f32,
    ki: f32,
    kd: f32,
    n: u32,
}

impl Sums {
    fn average(&self) -> (f32, f32, TunedGains) {
        let n = self.n.max(1) as f32;
        (
            self.ku / n,
            self.tu / n,
            TunedGains {
                kp: self.kp / n,
                ki: self.ki / n,
                kd: self.kd / n,
            },
        )
    }
}

pub(crate) struct AutotuneSession {
    pub(crate) zone: ZoneId,
    target_c: f32,
    requested: u32,
    hysteresis_c: f32,
    ceiling_c: f32,
    max_temp_c: f32,
    max_power: u8,
    period_ms: u64,
    timeout_ticks: u64,
    state: AutotuneState,
    ticks: u64,
    completed: u32,
    cycle_start_tick: Option<u64>,
    peak_c: f32,
    trough_c: f32,
    sums: Sums,
    observer: Box<dyn AutotuneObserver + Send>,
}

impl AutotuneSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        zone: ZoneId,
        target_c: f32,
        cycles: u32,
        cfg: &AutotuneCfg,
        max_temp_c: f32,
        max_power: u8,
        period_ms: u64,
        observer: Box<dyn AutotuneObserver + Send>,
    ) -> Self {
        Self {
            zone,
            target_c,
            requested: cycles.max(MIN_CYCLES),
            hysteresis_c: cfg.hysteresis_c,
            ceiling_c: target_c + cfg.overshoot_ceiling_c,
            max_temp_c,
            max_power,
            period_ms,
            timeout_ticks: ticks_for(cfg.timeout_ms, period_ms).max(1),
            state: AutotuneState::Idle,
            ticks: 0,
            completed: 0,
            cycle_start_tick: None,
            peak_c: f32::NEG_INFINITY,
            trough_c: f32::INFINITY,
            sums: Sums::default(),
            observer,
        }
    }

    pub(crate) fn state(&self) -> AutotuneState {
        self.state
    }

    pub(crate) fn target(&self) -> f32 {
        self.target_c
    }

    pub(crate) fn abort(&mut self) {
        self.state = AutotuneState::Aborted;
    }

    /// Deliver the terminal result and consume the session.
    pub(crate) fn finish(mut self, result: &Result<AutotuneReport, AutotuneError>) {
        match result {
            Ok(r) => tracing::info!(
                zone = %self.zone,
                kp = r.tuned.kp,
                ki = r.tuned.ki,
                kd = r.tuned.kd,
                "autotune done"
            ),
            Err(e) => tracing::warn!(zone = %self.zone, error = %e, "autotune failed"),
        }
        self.observer.on_finish(result);
    }

    /// Advance one tick with the zone's fresh reading.
    pub(crate) fn step(&mut self, current: f32) -> SessionStep {
        self.ticks += 1;

        let ceiling = self.ceiling_c.min(self.max_temp_c);
        if current > ceiling {
            self.state = AutotuneState::Aborted;
            return SessionStep::Finish(Err(AutotuneError::TemperatureTooHigh {
                celsius: current,
                ceiling,
            }));
        }
        if self.ticks > self.timeout_ticks {
            self.state = AutotuneState::Aborted;
            return SessionStep::Finish(Err(AutotuneError::Timeout {
                cycles: self.completed,
                requested: self.requested,
            }));
        }

        match self.state {
            AutotuneState::Idle => {
                tracing::info!(
                    zone = %self.zone,
                    target = self.target_c,
                    cycles = self.requested,
                    "autotune start"
                );
                self.state = AutotuneState::Heating;
                self.trough_c = current;
            }
            AutotuneState::Heating => {
                self.trough_c = self.trough_c.min(current);
                if current > self.target_c + self.hysteresis_c {
                    self.state = AutotuneState::Cooling;
                    self.peak_c = current;
                }
            }
            AutotuneState::Cooling => {
                self.peak_c = self.peak_c.max(current);
                if current < self.target_c - self.hysteresis_c {
                    self.state = AutotuneState::Heating;
                    if let Some(step) = self.complete_cycle(current) {
                        return step;
                    }
                }
            }
            AutotuneState::Evaluating | AutotuneState::Done | AutotuneState::Aborted => {}
        }

        let power = if self.state == AutotuneState::Heating {
            self.max_power
        } else {
            0
        };
        SessionStep::Drive(power)
    }

    fn complete_cycle(&mut self, current: f32) -> Option<SessionStep> {
        self.completed += 1;
        if let Some(start) = self.cycle_start_tick {
            let tu = ticks_to_secs(self.ticks - start, self.period_ms).max(f32::EPSILON);
            let amplitude = ((self.peak_c - self.trough_c) / 2.0).max(f32::EPSILON);
            let d = f32::from(self.max_power) / 2.0;
            let ku = 4.0 * d / (PI * amplitude);
            let kp = 0.6 * ku;
            self.sums.ku += ku;
            self.sums.tu += tu;
            self.sums.kp += kp;
            self.sums.ki += 2.0 * kp / tu;
            self.sums.kd += kp * tu / 8.0;
            self.sums.n += 1;
        }
        self.cycle_start_tick = Some(self.ticks);

        let progress = AutotuneProgress {
            zone: self.zone,
            state: self.state,
            cycle: self.completed,
            cycles: self.requested,
            current_c: current,
            peak_c: self.peak_c,
            trough_c: self.trough_c,
            gains: (self.sums.n > 0).then(|| self.sums.average().2),
        };
        tracing::info!(
            zone = %self.zone,
            cycle = self.completed,
            peak = self.peak_c,
            trough = self.trough_c,
            "autotune cycle"
        );
        self.trough_c = current;

        if self.observer.on_cycle(&progress).is_break() {
            self.state = AutotuneState::Aborted;
            return Some(SessionStep::Finish(Err(AutotuneError::Cancelled)));
        }
        if self.completed >= self.requested {
            self.state = AutotuneState::Evaluating;
            let report = self.report();
            self.state = AutotuneState::Done;
            return Some(SessionStep::Finish(Ok(report)));
        }
        None
    }

    fn report(&self) -> AutotuneReport {
        let (ku, tu_s, tuned) = self.sums.average();
        AutotuneReport {
            zone: self.zone,
            target_c: self.target_c,
            cycles: self.completed,
            ku,
            tu_s,
            tuned,
            gains: PidGains::from_unscaled(tuned.kp, tuned.ki, tuned.kd, self.period_ms),
            elapsed_ticks: self.ticks,
        }
    }
}

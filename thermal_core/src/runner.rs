use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thermal_traits::{HeaterOutput, TemperatureSensor};

use crate::command::CommandReceiver;
use crate::controller::ThermalController;
use crate::error::Result;
use crate::status::TickStatus;

/// Limits for a `run` invocation.
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    /// Stop after this many ticks (`None` runs until shutdown).
    pub max_ticks: Option<u64>,
    /// Checked before every tick; set from a signal handler.
    pub shutdown: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    TickBudget,
    Shutdown,
    /// The `on_tick` hook returned `Break`.
    Hook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks whose work overran the control period.
    pub missed_deadlines: u64,
    /// Zones holding a fault when the loop stopped.
    pub faulted: usize,
    pub stopped_by: StopReason,
}

/// Whether the loop may start another tick.
#[inline]
fn should_stop(params: &RunParams, ticks: u64) -> Option<StopReason> {
    if params
        .shutdown
        .as_ref()
        .is_some_and(|f| f.load(Ordering::Relaxed))
    {
        return Some(StopReason::Shutdown);
    }
    if params.max_ticks.is_some_and(|max| ticks >= max) {
        return Some(StopReason::TickBudget);
    }
    None
}

/// Drive the controller at its fixed cadence.
///
/// Each period: drain queued commands, tick, call `on_tick`, then sleep for
/// what remains of the period on the controller's clock. Heaters are switched
/// off when the loop ends, including when a tick fails.
pub fn run<S, H, F>(
    ctrl: &mut ThermalController<S, H>,
    commands: Option<&CommandReceiver>,
    params: &RunParams,
    mut on_tick: F,
) -> Result<RunSummary>
where
    S: TemperatureSensor,
    H: HeaterOutput,
    F: FnMut(&ThermalController<S, H>, &TickStatus) -> ControlFlow<()>,
{
    if !ctrl.is_initialized()
        && let Err(e) = ctrl.initialize()
    {
        ctrl.heaters_off();
        return Err(e);
    }

    let clock = ctrl.clock();
    let period = Duration::from_millis(ctrl.period_ms());
    let mut summary = RunSummary::default();
    tracing::info!(period_ms = ctrl.period_ms(), max_ticks = ?params.max_ticks, "control loop start");

    let reason = loop {
        if let Some(reason) = should_stop(params, summary.ticks) {
            break reason;
        }
        let started = clock.now();

        if let Some(rx) = commands {
            for cmd in rx.drain() {
                if let Err(e) = ctrl.apply_command(cmd) {
                    tracing::warn!(error = %e, "command rejected");
                }
            }
        }

        let status = match ctrl.tick() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "tick failed; switching heaters off");
                ctrl.heaters_off();
                return Err(e);
            }
        };
        summary.ticks += 1;
        summary.faulted = status.faulted;

        if on_tick(ctrl, &status).is_break() {
            break StopReason::Hook;
        }

        let spent = clock.now().saturating_duration_since(started);
        if spent < period {
            clock.sleep(period - spent);
        } else {
            summary.missed_deadlines += 1;
            tracing::debug!(spent_us = spent.as_micros() as u64, "tick overran its period");
        }
    };

    ctrl.heaters_off();
    summary.stopped_by = reason;
    tracing::info!(
        ticks = summary.ticks,
        missed = summary.missed_deadlines,
        faulted = summary.faulted,
        reason = ?reason,
        "control loop stop"
    );
    Ok(summary)
}

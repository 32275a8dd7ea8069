//! Control loop execution: config mapping, plant assembly, heat and autotune.

use std::fs::File;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

use eyre::WrapErr;
use serde_json::json;
use thermal_core::error::{AutotuneError, Result as CoreResult, ThermalError};
use thermal_core::util::ticks_for;
use thermal_core::{
    AutotuneObserver, AutotuneProgress, AutotuneReport, ControllerCfg, RunParams, RunSummary,
    ThermalController, ZoneId, ZoneKind, ZoneView,
};
use thermal_hardware::{PlantParams, SimFault, SimHeater, SimSensor, SimulatedPlant};
use thermal_traits::{Clock, ManualClock, MonotonicClock};

use crate::cli::{LoopOpts, RtLock};
use crate::error_fmt::fault_reason_name;
use crate::rt::{RtRequest, setup_rt_once};

type Controller = ThermalController<SimSensor, SimHeater>;

/// Test hook: `THERMAL_TEST_SIM_FAULT=<kind>[@zone]` injects a plant fault
/// before the loop starts.
const FAULT_ENV: &str = "THERMAL_TEST_SIM_FAULT";

fn plant_params(cfg: &thermal_config::Config) -> PlantParams {
    PlantParams {
        ambient_c: cfg.sim.ambient_c,
        heat_rate_c_per_s: cfg.sim.heat_rate_c_per_s,
        loss_per_s: cfg.sim.loss_per_s,
        lag_ticks: cfg.sim.lag_ticks,
        period_ms: cfg.control.period_ms,
        max_power: cfg.pid.max_power,
    }
}

fn parse_fault(spec: &str) -> Option<(usize, SimFault)> {
    let (kind, zone) = match spec.split_once('@') {
        Some((k, z)) => (k, z.trim().parse().ok()?),
        None => (spec, 0),
    };
    let fault = match kind.trim() {
        "failing-reads" => SimFault::FailingReads,
        "open-sensor" => SimFault::OpenSensor,
        "frozen-sensor" => SimFault::FrozenSensor,
        "heater-disconnected" => SimFault::HeaterDisconnected,
        _ => return None,
    };
    Some((zone, fault))
}

/// Simulated plant plus a controller wired to it.
pub fn assemble(cfg: &thermal_config::Config, realtime: bool) -> CoreResult<(Controller, SimulatedPlant)> {
    let plant = SimulatedPlant::new(cfg.zones.len(), plant_params(cfg));
    for (i, z) in cfg.zones.iter().enumerate() {
        if z.redundant_sensor {
            plant.set_redundant_offset(i, Some(0.0));
        }
    }
    if let Ok(spec) = std::env::var(FAULT_ENV) {
        match parse_fault(&spec) {
            Some((zone, fault)) => plant.inject(zone, fault),
            None => tracing::warn!(spec, "ignoring unrecognized {FAULT_ENV}"),
        }
    }

    let clock: Box<dyn Clock + Send + Sync> = if realtime {
        Box::new(MonotonicClock::new())
    } else {
        Box::new(ManualClock::new())
    };
    let ctrl = thermal_core::build_controller(
        plant.sensor(),
        plant.heater(),
        ControllerCfg::from(cfg),
        Some(clock),
    )?;
    Ok((ctrl, plant))
}

fn apply_rt(opts: &LoopOpts) {
    if opts.rt {
        setup_rt_once(RtRequest {
            prio: opts.rt_prio,
            lock: opts.rt_lock.unwrap_or_else(RtLock::os_default),
            cpu: opts.rt_cpu,
        });
    }
}

// ── Trace recording ──────────────────────────────────────────────────────────

struct Trace {
    w: csv::Writer<File>,
}

impl Trace {
    fn create(path: &Path) -> eyre::Result<Self> {
        let mut w = csv::Writer::from_path(path)
            .wrap_err_with(|| format!("create trace {}", path.display()))?;
        w.write_record([
            "tick", "time_ms", "zone", "label", "setpoint_c", "temp_c", "power", "state",
        ])?;
        Ok(Self { w })
    }

    fn record(&mut self, ctrl: &Controller) -> csv::Result<()> {
        let tick = ctrl.ticks().to_string();
        let time = ctrl.now_ms().to_string();
        for id in ctrl.zones().ids() {
            let z = ctrl.zone(id);
            let zone = id.to_string();
            let setpoint = format!("{:.2}", z.setpoint_c);
            let temp = format!("{:.2}", z.current_c);
            let power = z.power.to_string();
            let state = state_name(&z);
            self.w.write_record([
                tick.as_str(),
                time.as_str(),
                zone.as_str(),
                ctrl.label(id),
                setpoint.as_str(),
                temp.as_str(),
                power.as_str(),
                state.as_str(),
            ])?;
        }
        Ok(())
    }

    fn finish(mut self) -> eyre::Result<()> {
        self.w.flush().wrap_err("flush trace")
    }
}

fn state_name(z: &ZoneView) -> String {
    match z.fault {
        Some(r) => format!("Faulted({})", fault_reason_name(r)),
        None => format!("{:?}", z.state),
    }
}

/// Run the loop, recording a trace when asked. Trace write failures stop the
/// loop and are reported after the heaters are off.
fn drive(
    ctrl: &mut Controller,
    opts: &LoopOpts,
    params: &RunParams,
    mut stop_when: impl FnMut(&Controller) -> bool,
) -> CoreResult<RunSummary> {
    let mut trace = opts.csv.as_deref().map(Trace::create).transpose()?;
    let mut trace_err = None;
    let summary = thermal_core::run(ctrl, None, params, |c, status| {
        if let Some(t) = trace.as_mut()
            && let Err(e) = t.record(c)
        {
            trace_err = Some(e);
            return ControlFlow::Break(());
        }
        if status.any_faulted() || stop_when(c) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    if let Some(e) = trace_err {
        return Err(eyre::Report::new(e).wrap_err("write trace"));
    }
    if let Some(t) = trace {
        t.finish()?;
    }
    if opts.stats {
        eprintln!("\n--- Thermal Stats ---");
        eprintln!("Ticks: {}", summary.ticks);
        eprintln!("Period (ms): {}", ctrl.period_ms());
        eprintln!("Missed deadlines (> period): {}", summary.missed_deadlines);
        eprintln!("Stopped by: {:?}", summary.stopped_by);
        eprintln!("---------------------\n");
    }
    Ok(summary)
}

/// First faulted zone as a typed error.
fn first_fault(ctrl: &Controller) -> Option<ThermalError> {
    ctrl.zones().iter().find_map(|z| {
        let v = z.view();
        v.fault.map(|reason| ThermalError::Fault {
            zone: v.id.index(),
            reason,
        })
    })
}

fn zones_json(ctrl: &Controller) -> serde_json::Value {
    let zones: Vec<_> = ctrl
        .zones()
        .ids()
        .map(|id| {
            let z = ctrl.zone(id);
            json!({
                "zone": id.index(),
                "label": ctrl.label(id),
                "kind": match z.kind { ZoneKind::Hotend => "hotend", ZoneKind::Bed => "bed" },
                "target_c": z.effective_target_c,
                "temp_c": z.current_c,
                "power": z.power,
                "state": format!("{:?}", z.state),
                "fault": z.fault.map(fault_reason_name),
            })
        })
        .collect();
    serde_json::Value::Array(zones)
}

fn print_zones(ctrl: &Controller) {
    for id in ctrl.zones().ids() {
        let z = ctrl.zone(id);
        println!(
            "{:<8} {:>7.1} °C  target {:>6.1} °C  power {:>3}  {}",
            ctrl.label(id),
            z.current_c,
            z.effective_target_c,
            z.power,
            state_name(&z)
        );
    }
}

fn unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Commands ─────────────────────────────────────────────────────────────────

pub fn run_heat(
    cfg: &thermal_config::Config,
    hotend: Option<f32>,
    bed: Option<f32>,
    seconds: u64,
    opts: &LoopOpts,
    shutdown: Arc<AtomicBool>,
    json_mode: bool,
) -> eyre::Result<()> {
    apply_rt(opts);
    let (mut ctrl, _plant) = assemble(cfg, opts.realtime)?;
    for id in ctrl.zones().ids() {
        let target = match ctrl.zone(id).kind {
            ZoneKind::Hotend => hotend,
            ZoneKind::Bed => bed,
        };
        if let Some(c) = target {
            ctrl.set_target(id, c);
        }
    }
    tracing::info!(?hotend, ?bed, seconds, "heat start");

    let params = RunParams {
        max_ticks: Some(ticks_for(seconds * 1000, cfg.control.period_ms)),
        shutdown: Some(shutdown),
    };
    let summary = drive(&mut ctrl, opts, &params, |_| false)?;
    let fault = first_fault(&ctrl);

    if json_mode {
        let line = json!({
            "timestamp": unix_ms(),
            "duration_ms": ctrl.now_ms(),
            "ticks": summary.ticks,
            "missed_deadlines": summary.missed_deadlines,
            "stopped_by": format!("{:?}", summary.stopped_by),
            "zones": zones_json(&ctrl),
            "abort_reason": match &fault {
                Some(ThermalError::Fault { reason, .. }) => Some(fault_reason_name(*reason)),
                _ => None,
            },
        });
        println!("{line}");
    } else {
        print_zones(&ctrl);
    }

    match fault {
        Some(err) => Err(eyre::Report::new(err)),
        None => {
            if !json_mode {
                println!("Heat complete after {:.1} s.", ctrl.now_ms() as f32 / 1000.0);
            }
            Ok(())
        }
    }
}

type Outcome = Arc<Mutex<Option<Result<AutotuneReport, AutotuneError>>>>;

/// Prints progress per cycle and keeps the terminal result.
struct CliObserver {
    outcome: Outcome,
    json_mode: bool,
}

impl AutotuneObserver for CliObserver {
    fn on_cycle(&mut self, p: &AutotuneProgress) -> ControlFlow<()> {
        if self.json_mode {
            let line = json!({
                "event": "cycle",
                "zone": p.zone.index(),
                "cycle": p.cycle,
                "cycles": p.cycles,
                "peak_c": p.peak_c,
                "trough_c": p.trough_c,
                "kp": p.gains.map(|g| g.kp),
                "ki": p.gains.map(|g| g.ki),
                "kd": p.gains.map(|g| g.kd),
            });
            println!("{line}");
        } else {
            match p.gains {
                Some(g) => println!(
                    "cycle {}/{}: peak {:.1} trough {:.1}  Kp {:.2} Ki {:.3} Kd {:.1}",
                    p.cycle, p.cycles, p.peak_c, p.trough_c, g.kp, g.ki, g.kd
                ),
                None => println!("cycle {}/{}: heating up", p.cycle, p.cycles),
            }
        }
        ControlFlow::Continue(())
    }

    fn on_finish(&mut self, result: &Result<AutotuneReport, AutotuneError>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(*result);
    }
}

pub fn run_autotune(
    cfg: &thermal_config::Config,
    zone: usize,
    target: f32,
    cycles: u32,
    opts: &LoopOpts,
    shutdown: Arc<AtomicBool>,
    json_mode: bool,
) -> eyre::Result<()> {
    apply_rt(opts);
    let (mut ctrl, _plant) = assemble(cfg, opts.realtime)?;
    let outcome: Outcome = Arc::default();
    ctrl.initialize()?;
    ctrl.start_autotune(
        ZoneId(zone),
        target,
        cycles,
        Box::new(CliObserver {
            outcome: Arc::clone(&outcome),
            json_mode,
        }),
    )?;

    // One tick past the session timeout so the engine reports it.
    let budget = ticks_for(cfg.autotune.timeout_ms, cfg.control.period_ms) + 1;
    let params = RunParams {
        max_ticks: Some(budget),
        shutdown: Some(shutdown),
    };
    drive(&mut ctrl, opts, &params, |c| c.autotune_state().is_none())?;
    // Shutdown or a fault elsewhere ends the loop first.
    ctrl.cancel_autotune();

    let result = outcome
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .unwrap_or(Err(AutotuneError::Cancelled));
    let report = match result {
        Ok(r) => r,
        Err(e) => {
            if json_mode {
                println!(
                    "{}",
                    json!({ "event": "finish", "zone": zone, "kp": null, "ki": null, "kd": null })
                );
            }
            return Err(eyre::Report::new(e));
        }
    };

    if json_mode {
        let line = json!({
            "event": "finish",
            "timestamp": unix_ms(),
            "zone": zone,
            "target_c": report.target_c,
            "cycles": report.cycles,
            "ku": report.ku,
            "tu_s": report.tu_s,
            "kp": report.tuned.kp,
            "ki": report.tuned.ki,
            "kd": report.tuned.kd,
            "duration_ms": ctrl.now_ms(),
        });
        println!("{line}");
    } else {
        println!("Autotune complete: Ku {:.2}, Tu {:.1} s", report.ku, report.tu_s);
        println!(
            "Kp = {:.2}\nKi = {:.3}\nKd = {:.1}",
            report.tuned.kp, report.tuned.ki, report.tuned.kd
        );
    }
    Ok(())
}

pub fn run_self_check(cfg: &thermal_config::Config) -> eyre::Result<()> {
    let (mut ctrl, _plant) = assemble(cfg, false)?;
    ctrl.initialize()?;
    ctrl.tick()?;
    if let Some(err) = first_fault(&ctrl) {
        return Err(eyre::Report::new(err));
    }
    ctrl.heaters_off();
    probe_heaters(cfg)?;
    println!("OK: {} zone(s)", ctrl.zone_count());
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn probe_heaters(cfg: &thermal_config::Config) -> eyre::Result<()> {
    use thermal_traits::HeaterOutput;
    if cfg.hardware.heater_pins.is_empty() {
        return Ok(());
    }
    let mut heater = thermal_hardware::GpioHeater::new(
        &cfg.hardware.heater_pins,
        cfg.hardware.pwm_frequency_hz,
        cfg.pid.max_power,
    )
    .map_err(|e| eyre::Report::new(ThermalError::HardwareFault(e.to_string())))
    .wrap_err("open heater pins")?;
    for zone in 0..cfg.hardware.heater_pins.len() {
        heater
            .set_power(zone, 0)
            .map_err(|e| eyre::eyre!("{e}"))
            .wrap_err_with(|| format!("drive heater {zone} low"))?;
    }
    tracing::info!(pins = ?cfg.hardware.heater_pins, "heater pins ok");
    Ok(())
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn probe_heaters(cfg: &thermal_config::Config) -> eyre::Result<()> {
    if !cfg.hardware.heater_pins.is_empty() {
        tracing::debug!("heater pins configured but built without the hardware feature");
    }
    Ok(())
}

//! The control loop orchestrator (`ThermalController`).
//!
//! One `tick()` walks every zone in index order:
//! refresh the reading, skip disabled or faulted zones, run the safety
//! checks, resolve the setpoint, evaluate PID (or the autotune relay for the
//! zone being tuned) and emit the clamped power. Nothing here blocks.

use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;
use thermal_traits::{Clock, HeaterOutput, TemperatureSensor};

use crate::autotune::{
    AutotuneObserver, AutotuneReport, AutotuneSession, AutotuneState, SessionStep,
};
use crate::command::ControlCommand;
use crate::config::AutotuneCfg;
use crate::error::{AutotuneError, FaultReason, Result, ThermalError};
use crate::hw_error::map_hw_error;
use crate::pid::{PidController, PidGains};
use crate::safety::SafetySupervisor;
use crate::standby::StandbyPolicy;
use crate::status::TickStatus;
use crate::zone::{ZoneId, ZoneState, ZoneView, Zones};

pub struct ThermalController<S: TemperatureSensor, H: HeaterOutput> {
    pub(crate) sensor: S,
    pub(crate) heater: H,
    pub(crate) zones: Zones,
    pub(crate) pid: PidController,
    pub(crate) safety: SafetySupervisor,
    pub(crate) standby: StandbyPolicy,
    pub(crate) autotune: AutotuneCfg,
    pub(crate) session: Option<AutotuneSession>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) period_ms: u64,
    pub(crate) ticks: u64,
    pub(crate) initialized: bool,
}

impl<S: TemperatureSensor, H: HeaterOutput> core::fmt::Debug for ThermalController<S, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThermalController")
            .field("zones", &self.zones.len())
            .field("period_ms", &self.period_ms)
            .field("ticks", &self.ticks)
            .field("autotune_zone", &self.session.as_ref().map(|s| s.zone))
            .finish()
    }
}

impl<S: TemperatureSensor, H: HeaterOutput> ThermalController<S, H> {
    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Take a first reading of every zone and switch all heaters off.
    pub fn initialize(&mut self) -> Result<()> {
        self.epoch = self.clock.now();
        self.ticks = 0;
        for id in self.zones.ids() {
            match self.sensor.read(id.0) {
                Ok(r) => self.zones.set_current(id, r.celsius, r.redundant),
                Err(e) => {
                    let err = map_hw_error(&*e);
                    tracing::warn!(zone = %id, error = %err, "initial sensor read failed");
                }
            }
            let zone = self.zones.zone_mut(id);
            zone.last_activity_ms = 0;
            zone.pid.reset();
            zone.watch.disarm();
            zone.power = 0;
            self.heater
                .set_power(id.0, 0)
                .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                .wrap_err_with(|| format!("initialize heater {id}"))?;
        }
        self.initialized = true;
        tracing::info!(
            zones = self.zones.len(),
            period_ms = self.period_ms,
            "thermal controller initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// One control period for every zone.
    pub fn tick(&mut self) -> Result<TickStatus> {
        if !self.initialized {
            return Err(eyre::Report::new(ThermalError::State(
                "tick() called before initialize()".into(),
            )));
        }
        let now = self.now_ms();
        self.ticks += 1;
        let mut newly_faulted = 0;
        let mut first_err = None;

        // A failed write does not skip the remaining zones.
        for id in self.zones.ids() {
            let read_ok = self.refresh(id);
            let was_faulted = self.zones.zone(id).fault.is_some();
            let power = self.evaluate_zone(id, read_ok, now);
            if !was_faulted && self.zones.zone(id).fault.is_some() {
                newly_faulted += 1;
            }
            if let Err(e) = self.emit(id, power)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        Ok(TickStatus {
            tick: self.ticks,
            newly_faulted,
            faulted: self.zones.iter().filter(|z| z.fault.is_some()).count(),
            autotune_active: self.session.is_some(),
        })
    }

    fn refresh(&mut self, id: ZoneId) -> bool {
        match self.sensor.read(id.0) {
            Ok(r) => {
                self.zones.set_current(id, r.celsius, r.redundant);
                self.safety.record_read_success(self.zones.zone_mut(id));
                true
            }
            Err(e) => {
                let err = map_hw_error(&*e);
                tracing::warn!(zone = %id, error = %err, "sensor read failed");
                false
            }
        }
    }

    fn evaluate_zone(&mut self, id: ZoneId, read_ok: bool, now: u64) -> u8 {
        if !self.zones.zone(id).is_active() {
            return 0;
        }

        if !read_ok {
            let lost = self.safety.record_read_failure(self.zones.zone_mut(id));
            if let Some(reason) = lost {
                self.fault_zone(id, reason);
            }
            return 0;
        }

        if let Some(reason) = self.safety.check_reading(self.zones.zone(id)) {
            self.fault_zone(id, reason);
            return 0;
        }

        // A zone being tuned counts as in use and bypasses standby.
        let tuning = self.session.as_ref().filter(|s| s.zone == id).map(|s| s.target());
        let setpoint = match tuning {
            Some(target) => {
                let zone = self.zones.zone_mut(id);
                zone.last_activity_ms = now;
                zone.setpoint_c = target;
                target
            }
            None => self.standby.resolve(self.zones.zone_mut(id), now),
        };

        if let Some(reason) = self.safety.check_watchdog(
            self.zones.zone_mut(id),
            setpoint,
            tuning.is_some(),
            now,
        ) {
            self.fault_zone(id, reason);
            return 0;
        }

        if tuning.is_some() {
            return self.step_autotune(id);
        }
        let zone = self.zones.zone_mut(id);
        let current = zone.current_c;
        let out = self.pid.evaluate(&zone.gains, &mut zone.pid, setpoint, current);
        out.power
    }

    fn step_autotune(&mut self, id: ZoneId) -> u8 {
        let current = self.zones.zone(id).current_c;
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        match session.step(current) {
            SessionStep::Drive(power) => power,
            SessionStep::Finish(result) => {
                if matches!(result, Err(AutotuneError::TemperatureTooHigh { .. })) {
                    self.latch_fault(id, FaultReason::AutotuneOverheat);
                }
                self.end_autotune(result);
                0
            }
        }
    }

    fn emit(&mut self, id: ZoneId, power: u8) -> Result<()> {
        self.zones.zone_mut(id).power = power;
        self.heater
            .set_power(id.0, power)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("set heater {id} to {power}"))
    }

    /// Latch a fault and end any session tuning the zone.
    fn fault_zone(&mut self, id: ZoneId, reason: FaultReason) {
        self.latch_fault(id, reason);
        if self.session.as_ref().is_some_and(|s| s.zone == id) {
            self.end_autotune(Err(AutotuneError::ZoneFaulted(reason)));
        }
    }

    fn latch_fault(&mut self, id: ZoneId, reason: FaultReason) {
        let zone = self.zones.zone_mut(id);
        if zone.fault.is_none() {
            zone.fault = Some(reason);
            tracing::error!(
                zone = %id,
                label = zone.label(),
                celsius = zone.current_c,
                reason = %reason,
                "zone faulted"
            );
        }
        zone.state = ZoneState::Disabled;
        zone.power = 0;
        zone.pid.reset();
        zone.watch.disarm();
    }

    fn end_autotune(&mut self, result: std::result::Result<AutotuneReport, AutotuneError>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if result.is_err() {
            session.abort();
        }
        let zone = self.zones.zone_mut(session.zone);
        zone.pid.reset();
        if let Ok(report) = &result
            && self.autotune.apply_result
        {
            zone.gains = report.gains;
        }
        session.finish(&result);
    }

    /// Best-effort: drive every heater to zero without changing zone state.
    pub fn heaters_off(&mut self) {
        for id in self.zones.ids() {
            self.zones.zone_mut(id).power = 0;
            if let Err(e) = self.heater.set_power(id.0, 0) {
                let err = map_hw_error(&*e);
                tracing::warn!(zone = %id, error = %err, "heater off failed");
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn zones(&self) -> &Zones {
        &self.zones
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn bed(&self) -> Option<ZoneId> {
        self.zones.bed()
    }

    #[track_caller]
    pub fn zone(&self, id: ZoneId) -> ZoneView {
        self.zones.get(id)
    }

    #[track_caller]
    pub fn label(&self, id: ZoneId) -> &str {
        self.zones.zone(id).label()
    }

    #[track_caller]
    pub fn temperature(&self, id: ZoneId) -> f32 {
        self.zones.zone(id).current_c
    }

    /// Requested target, without the offset.
    #[track_caller]
    pub fn get_target(&self, id: ZoneId) -> f32 {
        self.zones.zone(id).target()
    }

    /// Target plus offset.
    #[track_caller]
    pub fn effective_target(&self, id: ZoneId) -> f32 {
        self.zones.zone(id).effective_target()
    }

    #[track_caller]
    pub fn is_heating(&self, id: ZoneId) -> bool {
        let z = self.zones.zone(id);
        z.effective_target() > z.current_c
    }

    #[track_caller]
    pub fn is_cooling(&self, id: ZoneId) -> bool {
        let z = self.zones.zone(id);
        z.effective_target() < z.current_c
    }

    #[track_caller]
    pub fn get_actuation_power(&self, id: ZoneId) -> u8 {
        self.zones.zone(id).power
    }

    #[track_caller]
    pub fn get_max_temp_limit(&self, id: ZoneId) -> f32 {
        self.zones.zone(id).max_temp()
    }

    /// Gains scaled to the tick period.
    #[track_caller]
    pub fn gains(&self, id: ZoneId) -> PidGains {
        self.zones.zone(id).gains
    }

    /// Gains in per-second units.
    #[track_caller]
    pub fn gains_unscaled(&self, id: ZoneId) -> (f32, f32, f32) {
        self.zones.zone(id).gains.unscaled(self.period_ms)
    }

    #[track_caller]
    pub fn pid_is_clean(&self, id: ZoneId) -> bool {
        self.zones.zone(id).pid.is_clean()
    }

    /// Zone being tuned and the relay state.
    pub fn autotune_state(&self) -> Option<(ZoneId, AutotuneState)> {
        self.session.as_ref().map(|s| (s.zone, s.state()))
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Milliseconds since `initialize()`.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    // ── Setpoints and limits ─────────────────────────────────────────────────

    #[track_caller]
    pub fn set_target(&mut self, id: ZoneId, celsius: f32) {
        let now = self.now_ms();
        self.zones.set_target(id, celsius);
        StandbyPolicy::touch(self.zones.zone_mut(id), now);
        tracing::debug!(
            zone = %id,
            requested = celsius,
            target = self.zones.zone(id).target(),
            "set target"
        );
    }

    #[track_caller]
    pub fn set_target_offset(&mut self, id: ZoneId, delta: f32) {
        let now = self.now_ms();
        self.zones.set_target_offset(id, delta);
        StandbyPolicy::touch(self.zones.zone_mut(id), now);
    }

    #[track_caller]
    pub fn set_max_temp_limit(
        &mut self,
        id: ZoneId,
        celsius: f32,
    ) -> std::result::Result<(), ThermalError> {
        self.zones.set_max_temp_limit(id, celsius)
    }

    /// Replace a zone's gains, given in per-second units.
    #[track_caller]
    pub fn set_gains(
        &mut self,
        id: ZoneId,
        kp: f32,
        ki: f32,
        kd: f32,
    ) -> std::result::Result<(), ThermalError> {
        let gains = PidGains::from_unscaled(kp, ki, kd, self.period_ms);
        if !gains.is_valid() {
            return Err(ThermalError::Config(format!(
                "gains for zone {id} must be finite and >= 0 (kp={kp}, ki={ki}, kd={kd})"
            )));
        }
        let zone = self.zones.zone_mut(id);
        zone.gains = gains;
        zone.pid.reset();
        Ok(())
    }

    #[track_caller]
    pub fn notify_activity(&mut self, id: ZoneId) {
        let now = self.now_ms();
        StandbyPolicy::touch(self.zones.zone_mut(id), now);
    }

    /// Report filament fed through a hotend since the last call.
    #[track_caller]
    pub fn notify_extrusion(&mut self, id: ZoneId, mm: f32) {
        let now = self.now_ms();
        let zone = self.zones.zone_mut(id);
        zone.pid.add_feed(mm);
        StandbyPolicy::touch(zone, now);
    }

    #[track_caller]
    pub fn set_standby(&mut self, id: ZoneId, on: bool) {
        let now = self.now_ms();
        StandbyPolicy::set_standby(self.zones.zone_mut(id), on, now);
    }

    // ── Emergency paths ──────────────────────────────────────────────────────

    /// Disable a zone and write zero power immediately.
    ///
    /// The zone stays disabled, with its target cleared, until `reset_zone`.
    #[track_caller]
    pub fn disable_zone(&mut self, id: ZoneId) -> Result<()> {
        {
            let zone = self.zones.zone_mut(id);
            zone.state = ZoneState::Disabled;
            zone.set_target(0.0);
            zone.power = 0;
            zone.pid.reset();
            zone.watch.disarm();
        }
        if self.session.as_ref().is_some_and(|s| s.zone == id) {
            self.end_autotune(Err(AutotuneError::Cancelled));
        }
        tracing::warn!(zone = %id, "zone disabled");
        self.heater
            .set_power(id.0, 0)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("disable heater {id}"))
    }

    /// Disable every zone; reports the first write failure after trying all.
    pub fn disable_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for id in self.zones.ids() {
            if let Err(e) = self.disable_zone(id)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Clear a latched fault or a disable. The target is left at zero.
    #[track_caller]
    pub fn reset_zone(&mut self, id: ZoneId) {
        let now = self.now_ms();
        let zone = self.zones.zone_mut(id);
        let previous = zone.fault.take();
        zone.state = ZoneState::Preheat;
        zone.set_target(0.0);
        zone.read_errors = 0;
        zone.pid.reset();
        zone.watch.disarm();
        zone.last_activity_ms = now;
        tracing::info!(zone = %id, cleared = ?previous, "zone reset");
    }

    // ── Autotune ─────────────────────────────────────────────────────────────

    /// Start relay autotune on a zone.
    ///
    /// Immediate rejections are returned and also delivered to the observer,
    /// so the observer always sees exactly one terminal result.
    pub fn start_autotune(
        &mut self,
        id: ZoneId,
        target_c: f32,
        cycles: u32,
        mut observer: Box<dyn AutotuneObserver + Send>,
    ) -> std::result::Result<(), AutotuneError> {
        let target = match self.autotune_target(id, target_c) {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!(zone = %id, error = %err, "autotune rejected");
                observer.on_finish(&Err(err));
                return Err(err);
            }
        };
        let max_power = self.pid.max_power();
        let now = self.now_ms();
        let zone = self.zones.zone_mut(id);
        StandbyPolicy::wake(zone, now);
        zone.pid.reset();
        zone.watch.disarm();
        self.session = Some(AutotuneSession::new(
            id,
            target,
            cycles,
            &self.autotune,
            zone.max_temp(),
            max_power,
            self.period_ms,
            observer,
        ));
        Ok(())
    }

    /// Clamped tuning target, or the reason the session cannot start.
    fn autotune_target(
        &self,
        id: ZoneId,
        target_c: f32,
    ) -> std::result::Result<f32, AutotuneError> {
        if !self.zones.contains(id) {
            return Err(AutotuneError::InvalidZone(id.0));
        }
        if let Some(s) = &self.session {
            return Err(AutotuneError::Busy(s.zone.0));
        }
        let zone = self.zones.zone(id);
        if !zone.is_active() {
            return Err(AutotuneError::ZoneUnavailable(id.0));
        }
        let requested = if target_c.is_finite() { target_c } else { 0.0 };
        let target = requested.clamp(0.0, zone.ceiling());
        let ceiling = (target + self.autotune.overshoot_ceiling_c).min(zone.max_temp());
        if zone.current_c > ceiling {
            return Err(AutotuneError::TemperatureTooHigh {
                celsius: zone.current_c,
                ceiling,
            });
        }
        Ok(target)
    }

    /// Cancel the running session, if any.
    pub fn cancel_autotune(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }
        self.end_autotune(Err(AutotuneError::Cancelled));
        true
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Apply a queued command. Unknown zones are rejected instead of panicking.
    pub fn apply_command(&mut self, cmd: ControlCommand) -> Result<()> {
        if let Some(zone) = cmd.zone()
            && !self.zones.contains(zone)
        {
            if let ControlCommand::StartAutotune { mut observer, .. } = cmd {
                observer.on_finish(&Err(AutotuneError::InvalidZone(zone.0)));
            }
            return Err(eyre::Report::new(ThermalError::Config(format!(
                "zone {zone} out of range (have {})",
                self.zones.len()
            ))));
        }
        match cmd {
            ControlCommand::SetTarget { zone, celsius } => self.set_target(zone, celsius),
            ControlCommand::SetTargetOffset { zone, delta } => self.set_target_offset(zone, delta),
            ControlCommand::SetStandby { zone, on } => self.set_standby(zone, on),
            ControlCommand::SetMaxTemp { zone, celsius } => {
                self.set_max_temp_limit(zone, celsius)?;
            }
            ControlCommand::SetGains { zone, kp, ki, kd } => self.set_gains(zone, kp, ki, kd)?,
            ControlCommand::NotifyActivity { zone } => self.notify_activity(zone),
            ControlCommand::NotifyExtrusion { zone, mm } => self.notify_extrusion(zone, mm),
            ControlCommand::Disable { zone } => self.disable_zone(zone)?,
            ControlCommand::DisableAll => self.disable_all()?,
            ControlCommand::Reset { zone } => self.reset_zone(zone),
            ControlCommand::StartAutotune {
                zone,
                target_c,
                cycles,
                observer,
            } => self.start_autotune(zone, target_c, cycles, observer)?,
        }
        Ok(())
    }
}

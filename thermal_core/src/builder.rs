//! Type-state builder for `ThermalController` and the generic
//! `build_controller` constructor.
//!
//! `build()` only exists once both a sensor and a heater have been supplied;
//! configuration problems surface as `BuildError::InvalidConfig`.

use std::sync::Arc;

use thermal_traits::{Clock, HeaterOutput, MonotonicClock, TemperatureSensor};

use crate::config::{ControllerCfg, SAFETY_MARGIN_C};
use crate::controller::ThermalController;
use crate::error::{BuildError, Result};
use crate::pid::{PidController, PidGains};
use crate::safety::SafetySupervisor;
use crate::standby::StandbyPolicy;
use crate::zone::{ZoneKind, Zones};

/// Upper bound on zones per controller.
pub const MAX_ZONES: usize = thermal_config::MAX_ZONES;

// ── Type-state markers ───────────────────────────────────────────────────────

/// Placeholder for a collaborator that has not been supplied yet.
pub struct Missing;

pub struct ThermalControllerBuilder<S, H> {
    sensor: S,
    heater: H,
    config: Option<ControllerCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

impl Default for ThermalControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalControllerBuilder<Missing, Missing> {
    pub fn new() -> Self {
        Self {
            sensor: Missing,
            heater: Missing,
            config: None,
            clock: None,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<S, H> ThermalControllerBuilder<S, H> {
    pub fn with_config(mut self, config: ControllerCfg) -> Self {
        self.config = Some(config);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<H> ThermalControllerBuilder<Missing, H> {
    pub fn with_sensor<S: TemperatureSensor>(self, sensor: S) -> ThermalControllerBuilder<S, H> {
        ThermalControllerBuilder {
            sensor,
            heater: self.heater,
            config: self.config,
            clock: self.clock,
        }
    }
}

impl<S> ThermalControllerBuilder<S, Missing> {
    pub fn with_heater<H: HeaterOutput>(self, heater: H) -> ThermalControllerBuilder<S, H> {
        ThermalControllerBuilder {
            sensor: self.sensor,
            heater,
            config: self.config,
            clock: self.clock,
        }
    }
}

impl<S: TemperatureSensor, H: HeaterOutput> ThermalControllerBuilder<S, H> {
    /// Validate and build. The controller still needs `initialize()`.
    pub fn build(self) -> Result<ThermalController<S, H>> {
        let config = self
            .config
            .ok_or_else(|| eyre::Report::new(BuildError::MissingZones))?;
        validate_and_build(self.sensor, self.heater, config, self.clock)
    }
}

/// Build a controller from concrete collaborators.
///
/// Delegates to the same validation as the builder.
pub fn build_controller<S, H>(
    sensor: S,
    heater: H,
    config: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ThermalController<S, H>>
where
    S: TemperatureSensor,
    H: HeaterOutput,
{
    validate_and_build(sensor, heater, config, clock)
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Validate configuration and construct the controller.
fn validate_and_build<S: TemperatureSensor, H: HeaterOutput>(
    sensor: S,
    heater: H,
    config: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ThermalController<S, H>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if config.zones.is_empty() {
        return Err(eyre::Report::new(BuildError::MissingZones));
    }
    if config.zones.len() > MAX_ZONES {
        return Err(invalid("too many zones"));
    }
    if config
        .zones
        .iter()
        .filter(|z| z.kind == ZoneKind::Bed)
        .count()
        > 1
    {
        return Err(invalid("at most one bed zone"));
    }
    if !(1..=1000).contains(&config.period_ms) {
        return Err(invalid("period_ms must be in [1, 1000]"));
    }
    if config.pid.max_power == 0 {
        return Err(invalid("max_power must be > 0"));
    }
    if !(0.0..1.0).contains(&config.pid.d_filter) {
        return Err(invalid("d_filter must be in [0, 1)"));
    }
    if !(config.pid.integral_drive_max.is_finite() && config.pid.integral_drive_max > 0.0) {
        return Err(invalid("integral_drive_max must be > 0"));
    }
    if config
        .pid
        .functional_range_c
        .is_some_and(|r| !(r.is_finite() && r > 0.0))
    {
        return Err(invalid("functional_range_c must be > 0"));
    }
    if config.safety.sensor_error_limit == 0 {
        return Err(invalid("sensor_error_limit must be >= 1"));
    }
    if !(config.autotune.hysteresis_c.is_finite() && config.autotune.hysteresis_c > 0.0) {
        return Err(invalid("autotune hysteresis must be > 0"));
    }
    let ceiling = config.autotune.overshoot_ceiling_c;
    if !(ceiling.is_finite() && ceiling > config.autotune.hysteresis_c) {
        return Err(invalid("autotune ceiling must exceed hysteresis"));
    }
    for z in &config.zones {
        if !(z.max_temp_c.is_finite() && z.min_temp_c.is_finite()) {
            return Err(invalid("zone temperatures must be finite"));
        }
        if z.max_temp_c - SAFETY_MARGIN_C <= z.min_temp_c {
            return Err(invalid("zone max temp must exceed min temp by the safety margin"));
        }
        let (kp, ki, kd) = z.gains;
        if !PidGains::from_unscaled(kp, ki, kd, config.period_ms).is_valid() {
            return Err(invalid("zone gains must be finite and >= 0"));
        }
    }

    // ── Construct ────────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();

    Ok(ThermalController {
        sensor,
        heater,
        zones: Zones::new(&config.zones, config.period_ms),
        pid: PidController::new(config.pid, config.extrusion),
        safety: SafetySupervisor::new(config.safety),
        standby: StandbyPolicy::new(config.standby),
        autotune: config.autotune,
        session: None,
        clock,
        epoch,
        period_ms: config.period_ms,
        ticks: 0,
        initialized: false,
    })
}

#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the thermal control core.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Zones are declared as an array of tables (`[[zones]]`); gains are given
//!   in per-second units and scaled to the loop period by the core.
use serde::Deserialize;
use std::path::Path;

/// Upper bound on configured zones (three hotends plus a bed in practice).
pub const MAX_ZONES: usize = 8;

/// Degrees kept between a zone's max temperature and any accepted target.
pub const SAFETY_MARGIN_C: f32 = 15.0;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    #[default]
    Hotend,
    Bed,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Control loop period in milliseconds.
    pub period_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { period_ms: 100 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PidCfg {
    /// Full-scale actuation value.
    pub max_power: u8,
    /// Outside this band below target the heater runs flat out; above it, off.
    /// Absent disables the functional range.
    pub functional_range_c: Option<f32>,
    /// Cap on the integral contribution, in power units.
    pub integral_drive_max: f32,
    /// Low-pass weight of the previous derivative term (0 disables filtering).
    pub d_filter: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            max_power: 255,
            functional_range_c: Some(10.0),
            integral_drive_max: 255.0,
            d_filter: 0.95,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ZoneCfg {
    #[serde(default)]
    pub kind: ZoneKind,
    /// Human-readable name used in logs; defaults to kind + index.
    #[serde(default)]
    pub label: Option<String>,
    pub max_temp_c: f32,
    #[serde(default = "default_min_temp_c")]
    pub min_temp_c: f32,
    /// Proportional gain. Defaults depend on `kind`.
    #[serde(default)]
    pub kp: Option<f32>,
    /// Integral gain per second.
    #[serde(default)]
    pub ki: Option<f32>,
    /// Derivative gain in seconds.
    #[serde(default)]
    pub kd: Option<f32>,
    /// Setpoint used while the zone is in standby.
    #[serde(default)]
    pub standby_temp_c: f32,
    /// Zone carries a second sensor cross-checked against the primary.
    #[serde(default)]
    pub redundant_sensor: bool,
}

fn default_min_temp_c() -> f32 {
    5.0
}

impl ZoneCfg {
    /// Resolved (kp, ki, kd) in per-second units.
    pub fn gains(&self) -> (f32, f32, f32) {
        let (kp, ki, kd) = match self.kind {
            ZoneKind::Hotend => (22.2, 1.08, 114.0),
            ZoneKind::Bed => (10.0, 0.023, 305.4),
        };
        (
            self.kp.unwrap_or(kp),
            self.ki.unwrap_or(ki),
            self.kd.unwrap_or(kd),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Largest tolerated gap between primary and redundant sensor.
    pub redundant_max_diff_c: f32,
    /// Consecutive failed sensor reads before the zone is faulted.
    pub sensor_error_limit: u32,
    /// Stuck-heater watchdog window; 0 disables the watchdog.
    pub watch_period_ms: u64,
    /// Required rise within one watch window.
    pub watch_min_rise_c: f32,
    /// Output at or above this arms the watchdog.
    pub watch_min_power: u8,
    /// Within this distance of the setpoint the watchdog disarms.
    pub watch_settle_band_c: f32,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            redundant_max_diff_c: 10.0,
            sensor_error_limit: 3,
            watch_period_ms: 20_000,
            watch_min_rise_c: 2.0,
            watch_min_power: 128,
            watch_settle_band_c: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StandbyCfg {
    /// Idle time before hotends drop to their standby setpoint; 0 disables.
    pub auto_standby_after_ms: u64,
}

impl Default for StandbyCfg {
    fn default() -> Self {
        Self {
            auto_standby_after_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutotuneCfg {
    pub hysteresis_c: f32,
    /// Abort and fault when the zone overshoots the tuning target by this much.
    pub overshoot_ceiling_c: f32,
    /// Abort (without fault) when cycles have not completed in this time.
    pub timeout_ms: u64,
    /// Write tuned gains back into the zone on success.
    pub apply_result: bool,
}

impl Default for AutotuneCfg {
    fn default() -> Self {
        Self {
            hysteresis_c: 5.0,
            overshoot_ceiling_c: 20.0,
            timeout_ms: 20 * 60 * 1000,
            apply_result: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtrusionCfg {
    /// Add a feed-forward term proportional to recent filament feed.
    pub enabled: bool,
    /// Power units per millimetre fed during the lag window.
    pub kc: f32,
    /// Lag window length in control ticks.
    pub lag_ticks: usize,
}

impl Default for ExtrusionCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            kc: 1.0,
            lag_ticks: 10,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// First-order thermal model parameters for the simulated backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    pub ambient_c: f32,
    /// Heating rate at full power, °C per second.
    pub heat_rate_c_per_s: f32,
    /// Fraction of the excess over ambient lost per second.
    pub loss_per_s: f32,
    /// Transport delay between heater and sensor, in ticks.
    pub lag_ticks: usize,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            heat_rate_c_per_s: 4.0,
            loss_per_s: 0.01,
            lag_ticks: 20,
        }
    }
}

/// GPIO wiring for the heater outputs, used only with real hardware.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HardwareCfg {
    /// BCM pin per zone, in zone order.
    pub heater_pins: Vec<u8>,
    pub pwm_frequency_hz: f64,
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self {
            heater_pins: Vec::new(),
            pwm_frequency_hz: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub pid: PidCfg,
    pub zones: Vec<ZoneCfg>,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub standby: StandbyCfg,
    #[serde(default)]
    pub autotune: AutotuneCfg,
    #[serde(default)]
    pub extrusion: ExtrusionCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub sim: SimCfg,
    #[serde(default)]
    pub hardware: HardwareCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.period_ms == 0 || self.control.period_ms > 1000 {
            eyre::bail!("control.period_ms must be in [1, 1000]");
        }

        // PID
        if self.pid.max_power == 0 {
            eyre::bail!("pid.max_power must be > 0");
        }
        if let Some(range) = self.pid.functional_range_c
            && !(range.is_finite() && range > 0.0)
        {
            eyre::bail!("pid.functional_range_c must be > 0");
        }
        if !(self.pid.integral_drive_max.is_finite() && self.pid.integral_drive_max > 0.0) {
            eyre::bail!("pid.integral_drive_max must be > 0");
        }
        if !(0.0..1.0).contains(&self.pid.d_filter) {
            eyre::bail!("pid.d_filter must be in [0.0, 1.0)");
        }

        // Zones
        if self.zones.is_empty() {
            eyre::bail!("at least one [[zones]] entry is required");
        }
        if self.zones.len() > MAX_ZONES {
            eyre::bail!("at most {MAX_ZONES} zones are supported");
        }
        if self.zones.iter().filter(|z| z.kind == ZoneKind::Bed).count() > 1 {
            eyre::bail!("at most one bed zone may be configured");
        }
        for (i, z) in self.zones.iter().enumerate() {
            if !z.max_temp_c.is_finite() || !z.min_temp_c.is_finite() {
                eyre::bail!("zones[{i}]: temperatures must be finite");
            }
            if z.max_temp_c - SAFETY_MARGIN_C <= z.min_temp_c {
                eyre::bail!(
                    "zones[{i}]: max_temp_c must exceed min_temp_c by more than {SAFETY_MARGIN_C}"
                );
            }
            let (kp, ki, kd) = z.gains();
            for (name, v) in [("kp", kp), ("ki", ki), ("kd", kd)] {
                if !(v.is_finite() && v >= 0.0) {
                    eyre::bail!("zones[{i}].{name} must be finite and >= 0");
                }
            }
            if !(z.standby_temp_c.is_finite() && z.standby_temp_c >= 0.0) {
                eyre::bail!("zones[{i}].standby_temp_c must be >= 0");
            }
        }

        // Safety
        if !(self.safety.redundant_max_diff_c.is_finite() && self.safety.redundant_max_diff_c > 0.0)
        {
            eyre::bail!("safety.redundant_max_diff_c must be > 0");
        }
        if self.safety.sensor_error_limit == 0 {
            eyre::bail!("safety.sensor_error_limit must be >= 1");
        }
        if self.safety.watch_period_ms > 0 {
            if self.safety.watch_period_ms < self.control.period_ms {
                eyre::bail!("safety.watch_period_ms must span at least one control period");
            }
            if !(self.safety.watch_min_rise_c.is_finite() && self.safety.watch_min_rise_c > 0.0) {
                eyre::bail!("safety.watch_min_rise_c must be > 0");
            }
            if self.safety.watch_min_power == 0 {
                eyre::bail!("safety.watch_min_power must be >= 1");
            }
            if !(self.safety.watch_settle_band_c.is_finite()
                && self.safety.watch_settle_band_c >= 0.0)
            {
                eyre::bail!("safety.watch_settle_band_c must be >= 0");
            }
        }

        // Autotune
        if !(self.autotune.hysteresis_c.is_finite() && self.autotune.hysteresis_c > 0.0) {
            eyre::bail!("autotune.hysteresis_c must be > 0");
        }
        if !(self.autotune.overshoot_ceiling_c.is_finite()
            && self.autotune.overshoot_ceiling_c > self.autotune.hysteresis_c)
        {
            eyre::bail!("autotune.overshoot_ceiling_c must exceed autotune.hysteresis_c");
        }
        if self.autotune.timeout_ms < self.control.period_ms {
            eyre::bail!("autotune.timeout_ms must span at least one control period");
        }

        // Extrusion
        if self.extrusion.enabled {
            if !self.extrusion.kc.is_finite() {
                eyre::bail!("extrusion.kc must be finite");
            }
            if self.extrusion.lag_ticks == 0 {
                eyre::bail!("extrusion.lag_ticks must be >= 1");
            }
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Sim
        if !(self.sim.heat_rate_c_per_s.is_finite() && self.sim.heat_rate_c_per_s > 0.0) {
            eyre::bail!("sim.heat_rate_c_per_s must be > 0");
        }
        if !(self.sim.loss_per_s.is_finite() && (0.0..1.0).contains(&self.sim.loss_per_s)) {
            eyre::bail!("sim.loss_per_s must be in [0.0, 1.0)");
        }

        // Hardware
        if !self.hardware.heater_pins.is_empty() {
            if self.hardware.heater_pins.len() != self.zones.len() {
                eyre::bail!("hardware.heater_pins must list one pin per zone");
            }
            if !(self.hardware.pwm_frequency_hz.is_finite() && self.hardware.pwm_frequency_hz > 0.0)
            {
                eyre::bail!("hardware.pwm_frequency_hz must be > 0");
            }
        }

        Ok(())
    }

    /// Index of the bed zone, if one is configured.
    pub fn bed_index(&self) -> Option<usize> {
        self.zones.iter().position(|z| z.kind == ZoneKind::Bed)
    }
}

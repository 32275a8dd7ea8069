//! Configuration types for the thermal controller.
//!
//! These are the runtime configuration structs used by `ThermalController`.
//! They are separate from the TOML-deserialized config in `thermal_config`;
//! see `conversions` for the mapping.

use crate::zone::ZoneKind;

pub use thermal_config::SAFETY_MARGIN_C;

/// PID evaluation limits shared by every zone.
#[derive(Debug, Clone)]
pub struct PidCfg {
    /// Full-scale actuation value.
    pub max_power: u8,
    /// Band around the setpoint in which PID is evaluated. Below it the
    /// heater runs at full power, above it the heater is off. `None` always
    /// evaluates PID.
    pub functional_range_c: Option<f32>,
    /// Upper bound of the integral contribution in power units.
    pub integral_drive_max: f32,
    /// Weight of the previous derivative term in the low-pass filter.
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

/// Stuck-heater watchdog tuning.
#[derive(Debug, Clone)]
pub struct WatchCfg {
    /// Window in which the temperature must rise; 0 disables the watchdog.
    pub period_ms: u64,
    pub min_rise_c: f32,
    /// Output at or above this value counts as "driving the heater".
    pub min_power: u8,
    /// Within this distance below the setpoint the watchdog stays disarmed.
    pub settle_band_c: f32,
}

impl Default for WatchCfg {
    fn default() -> Self {
        Self {
            period_ms: 20_000,
            min_rise_c: 2.0,
            min_power: 128,
            settle_band_c: 10.0,
        }
    }
}

/// Safety supervisor configuration.
#[derive(Debug, Clone)]
pub struct SafetyCfg {
    /// Largest tolerated gap between primary and redundant readings.
    pub redundant_max_diff_c: f32,
    /// Consecutive failed reads tolerated before `SensorTimeout`.
    pub sensor_error_limit: u32,
    pub watch: WatchCfg,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            redundant_max_diff_c: 10.0,
            sensor_error_limit: 3,
            watch: WatchCfg::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StandbyCfg {
    /// Idle time before a hotend drops to its standby setpoint; 0 disables.
    pub auto_standby_after_ms: u64,
}

impl Default for StandbyCfg {
    fn default() -> Self {
        Self {
            auto_standby_after_ms: 300_000,
        }
    }
}

/// Relay autotune parameters.
#[derive(Debug, Clone)]
pub struct AutotuneCfg {
    pub hysteresis_c: f32,
    /// Tuning aborts and faults the zone above target + this value.
    pub overshoot_ceiling_c: f32,
    /// Session budget, converted to ticks at start.
    pub timeout_ms: u64,
    /// Write the tuned gains into the zone on success.
    pub apply_result: bool,
}

impl Default for AutotuneCfg {
    fn default() -> Self {
        Self {
            hysteresis_c: 5.0,
            overshoot_ceiling_c: 20.0,
            timeout_ms: 1_200_000,
            apply_result: true,
        }
    }
}

/// Extrusion-rate feed-forward (Kc term).
#[derive(Debug, Clone)]
pub struct ExtrusionCfg {
    pub enabled: bool,
    /// Power units per millimetre of filament fed.
    pub kc: f32,
    /// Delay between feed and its thermal load, in ticks.
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

/// Static description of one heater zone.
#[derive(Debug, Clone)]
pub struct ZoneCfg {
    pub kind: ZoneKind,
    pub label: String,
    pub max_temp_c: f32,
    pub min_temp_c: f32,
    /// (kp, ki, kd) in per-second units; scaled to the tick period at build.
    pub gains: (f32, f32, f32),
    pub standby_temp_c: f32,
    pub redundant_sensor: bool,
}

impl ZoneCfg {
    pub fn hotend(label: impl Into<String>, max_temp_c: f32) -> Self {
        Self {
            kind: ZoneKind::Hotend,
            label: label.into(),
            max_temp_c,
            min_temp_c: 5.0,
            gains: (22.2, 1.08, 114.0),
            standby_temp_c: 0.0,
            redundant_sensor: false,
        }
    }

    pub fn bed(max_temp_c: f32) -> Self {
        Self {
            kind: ZoneKind::Bed,
            label: "bed".to_string(),
            max_temp_c,
            min_temp_c: 5.0,
            gains: (10.0, 0.023, 305.4),
            standby_temp_c: 0.0,
            redundant_sensor: false,
        }
    }
}

/// Everything the controller needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ControllerCfg {
    /// Tick period in milliseconds; gains and timeouts are scaled by it.
    pub period_ms: u64,
    pub pid: PidCfg,
    pub safety: SafetyCfg,
    pub standby: StandbyCfg,
    pub autotune: AutotuneCfg,
    pub extrusion: ExtrusionCfg,
    pub zones: Vec<ZoneCfg>,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            period_ms: 100,
            pid: PidCfg::default(),
            safety: SafetyCfg::default(),
            standby: StandbyCfg::default(),
            autotune: AutotuneCfg::default(),
            extrusion: ExtrusionCfg::default(),
            zones: Vec::new(),
        }
    }
}

impl ControllerCfg {
    /// Default tuning with the given zones.
    pub fn with_zones(zones: Vec<ZoneCfg>) -> Self {
        Self {
            zones,
            ..Self::default()
        }
    }
}

//! `From` implementations bridging `thermal_config` types to `thermal_core` types.

use crate::config::{
    AutotuneCfg, ControllerCfg, ExtrusionCfg, PidCfg, SafetyCfg, StandbyCfg, WatchCfg, ZoneCfg,
};
use crate::zone::ZoneKind;

// ── ZoneKind ─────────────────────────────────────────────────────────────────

impl From<thermal_config::ZoneKind> for ZoneKind {
    fn from(k: thermal_config::ZoneKind) -> Self {
        match k {
            thermal_config::ZoneKind::Hotend => ZoneKind::Hotend,
            thermal_config::ZoneKind::Bed => ZoneKind::Bed,
        }
    }
}

// ── PidCfg ───────────────────────────────────────────────────────────────────

impl From<&thermal_config::PidCfg> for PidCfg {
    fn from(c: &thermal_config::PidCfg) -> Self {
        Self {
            max_power: c.max_power,
            functional_range_c: c.functional_range_c,
            integral_drive_max: c.integral_drive_max,
            d_filter: c.d_filter,
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&thermal_config::Safety> for SafetyCfg {
    fn from(c: &thermal_config::Safety) -> Self {
        Self {
            redundant_max_diff_c: c.redundant_max_diff_c,
            sensor_error_limit: c.sensor_error_limit,
            watch: WatchCfg {
                period_ms: c.watch_period_ms,
                min_rise_c: c.watch_min_rise_c,
                min_power: c.watch_min_power,
                settle_band_c: c.watch_settle_band_c,
            },
        }
    }
}

// ── StandbyCfg / AutotuneCfg / ExtrusionCfg ──────────────────────────────────

impl From<&thermal_config::StandbyCfg> for StandbyCfg {
    fn from(c: &thermal_config::StandbyCfg) -> Self {
        Self {
            auto_standby_after_ms: c.auto_standby_after_ms,
        }
    }
}

impl From<&thermal_config::AutotuneCfg> for AutotuneCfg {
    fn from(c: &thermal_config::AutotuneCfg) -> Self {
        Self {
            hysteresis_c: c.hysteresis_c,
            overshoot_ceiling_c: c.overshoot_ceiling_c,
            timeout_ms: c.timeout_ms,
            apply_result: c.apply_result,
        }
    }
}

impl From<&thermal_config::ExtrusionCfg> for ExtrusionCfg {
    fn from(c: &thermal_config::ExtrusionCfg) -> Self {
        Self {
            enabled: c.enabled,
            kc: c.kc,
            lag_ticks: c.lag_ticks,
        }
    }
}

// ── Zones ────────────────────────────────────────────────────────────────────

impl ZoneCfg {
    /// Map a config entry, naming unlabeled zones after their kind and index.
    pub fn from_config(index: usize, c: &thermal_config::ZoneCfg) -> Self {
        let kind = ZoneKind::from(c.kind);
        let label = c.label.clone().unwrap_or_else(|| match kind {
            ZoneKind::Hotend => format!("hotend{index}"),
            ZoneKind::Bed => "bed".to_string(),
        });
        Self {
            kind,
            label,
            max_temp_c: c.max_temp_c,
            min_temp_c: c.min_temp_c,
            gains: c.gains(),
            standby_temp_c: c.standby_temp_c,
            redundant_sensor: c.redundant_sensor,
        }
    }
}

impl From<&thermal_config::Config> for ControllerCfg {
    fn from(c: &thermal_config::Config) -> Self {
        Self {
            period_ms: c.control.period_ms,
            pid: PidCfg::from(&c.pid),
            safety: SafetyCfg::from(&c.safety),
            standby: StandbyCfg::from(&c.standby),
            autotune: AutotuneCfg::from(&c.autotune),
            extrusion: ExtrusionCfg::from(&c.extrusion),
            zones: c
                .zones
                .iter()
                .enumerate()
                .map(|(i, z)| ZoneCfg::from_config(i, z))
                .collect(),
        }
    }
}

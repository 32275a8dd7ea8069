//! Heater zone registry.
//!
//! Zones are created once from configuration and live for the lifetime of
//! the controller. Every write of target, offset or limit re-establishes
//! `effective_target <= max_temp - SAFETY_MARGIN_C`; reads never clamp.

use crate::config::{SAFETY_MARGIN_C, ZoneCfg};
use crate::error::{FaultReason, ThermalError};
use crate::pid::{PidGains, PidState};
use crate::safety::WatchState;

/// Signed trim range, matching an 8-bit babystep offset.
pub const OFFSET_MIN_C: f32 = -128.0;
pub const OFFSET_MAX_C: f32 = 127.0;

/// Index of a zone in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub usize);

impl ZoneId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneKind {
    #[default]
    Hotend,
    Bed,
}

/// Operating intent of a zone. Faults are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneState {
    #[default]
    Preheat,
    Standby,
    AutoStandby,
    Disabled,
}

impl ZoneState {
    pub fn is_standby(self) -> bool {
        matches!(self, ZoneState::Standby | ZoneState::AutoStandby)
    }
}

/// Read-only snapshot of a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneView {
    pub id: ZoneId,
    pub kind: ZoneKind,
    pub current_c: f32,
    pub redundant_c: Option<f32>,
    pub target_c: f32,
    pub offset_c: f32,
    pub effective_target_c: f32,
    /// Setpoint used on the last tick (after standby resolution).
    pub setpoint_c: f32,
    pub max_temp_c: f32,
    pub min_temp_c: f32,
    pub state: ZoneState,
    pub fault: Option<FaultReason>,
    pub power: u8,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub(crate) id: ZoneId,
    pub(crate) kind: ZoneKind,
    pub(crate) label: String,
    pub(crate) current_c: f32,
    pub(crate) redundant_c: Option<f32>,
    target_c: f32,
    offset_c: f32,
    max_temp_c: f32,
    pub(crate) min_temp_c: f32,
    pub(crate) standby_temp_c: f32,
    pub(crate) redundant_sensor: bool,
    pub(crate) state: ZoneState,
    pub(crate) fault: Option<FaultReason>,
    pub(crate) last_activity_ms: u64,
    pub(crate) setpoint_c: f32,
    pub(crate) gains: PidGains,
    pub(crate) pid: PidState,
    pub(crate) watch: WatchState,
    pub(crate) read_errors: u32,
    pub(crate) power: u8,
}

impl Zone {
    fn new(id: ZoneId, cfg: &ZoneCfg, period_ms: u64) -> Self {
        let (kp, ki, kd) = cfg.gains;
        Self {
            id,
            kind: cfg.kind,
            label: cfg.label.clone(),
            current_c: 0.0,
            redundant_c: None,
            target_c: 0.0,
            offset_c: 0.0,
            max_temp_c: cfg.max_temp_c,
            min_temp_c: cfg.min_temp_c,
            standby_temp_c: cfg.standby_temp_c,
            redundant_sensor: cfg.redundant_sensor,
            state: ZoneState::Preheat,
            fault: None,
            last_activity_ms: 0,
            setpoint_c: 0.0,
            gains: PidGains::from_unscaled(kp, ki, kd, period_ms),
            pid: PidState::default(),
            watch: WatchState::default(),
            read_errors: 0,
            power: 0,
        }
    }

    /// Highest effective target the zone accepts.
    pub fn ceiling(&self) -> f32 {
        (self.max_temp_c - SAFETY_MARGIN_C).max(0.0)
    }

    pub fn target(&self) -> f32 {
        self.target_c
    }

    pub fn offset(&self) -> f32 {
        self.offset_c
    }

    pub fn effective_target(&self) -> f32 {
        self.target_c + self.offset_c
    }

    pub fn max_temp(&self) -> f32 {
        self.max_temp_c
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_active(&self) -> bool {
        self.state != ZoneState::Disabled && self.fault.is_none()
    }

    pub(crate) fn set_target(&mut self, celsius: f32) {
        let c = if celsius.is_finite() { celsius } else { 0.0 };
        self.target_c = c.clamp(0.0, self.ceiling());
        self.clamp_offset();
    }

    pub(crate) fn set_offset(&mut self, delta: f32) {
        self.offset_c = if delta.is_finite() { delta } else { 0.0 };
        self.clamp_offset();
    }

    pub(crate) fn set_max_temp(&mut self, celsius: f32) -> Result<(), ThermalError> {
        if !celsius.is_finite() || celsius - SAFETY_MARGIN_C <= self.min_temp_c {
            return Err(ThermalError::Config(format!(
                "max temp {celsius} for zone {} must exceed min temp {} by more than {SAFETY_MARGIN_C}",
                self.id, self.min_temp_c
            )));
        }
        self.max_temp_c = celsius;
        self.set_target(self.target_c);
        Ok(())
    }

    /// Keep the trim in range and the effective target inside `[0, ceiling]`.
    fn clamp_offset(&mut self) {
        let lo = -self.target_c;
        let hi = self.ceiling() - self.target_c;
        self.offset_c = self
            .offset_c
            .clamp(OFFSET_MIN_C, OFFSET_MAX_C)
            .clamp(lo, hi);
    }

    pub fn view(&self) -> ZoneView {
        ZoneView {
            id: self.id,
            kind: self.kind,
            current_c: self.current_c,
            redundant_c: self.redundant_c,
            target_c: self.target_c,
            offset_c: self.offset_c,
            effective_target_c: self.effective_target(),
            setpoint_c: self.setpoint_c,
            max_temp_c: self.max_temp_c,
            min_temp_c: self.min_temp_c,
            state: self.state,
            fault: self.fault,
            power: self.power,
        }
    }
}

/// Fixed collection of zones built at startup.
#[derive(Debug, Clone)]
pub struct Zones {
    zones: Vec<Zone>,
    bed: Option<ZoneId>,
}

impl Zones {
    pub fn new(cfgs: &[ZoneCfg], period_ms: u64) -> Self {
        let zones: Vec<Zone> = cfgs
            .iter()
            .enumerate()
            .map(|(i, c)| Zone::new(ZoneId(i), c, period_ms))
            .collect();
        let bed = zones.iter().find(|z| z.kind == ZoneKind::Bed).map(|z| z.id);
        Self { zones, bed }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn contains(&self, id: ZoneId) -> bool {
        id.0 < self.zones.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = ZoneId> + use<> {
        (0..self.zones.len()).map(ZoneId)
    }

    pub fn bed(&self) -> Option<ZoneId> {
        self.bed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// # Panics
    /// When `id` is not a configured zone.
    #[track_caller]
    pub fn zone(&self, id: ZoneId) -> &Zone {
        match self.zones.get(id.0) {
            Some(z) => z,
            None => panic!("zone {id} out of range (have {})", self.zones.len()),
        }
    }

    #[track_caller]
    pub(crate) fn zone_mut(&mut self, id: ZoneId) -> &mut Zone {
        let len = self.zones.len();
        match self.zones.get_mut(id.0) {
            Some(z) => z,
            None => panic!("zone {id} out of range (have {len})"),
        }
    }

    #[track_caller]
    pub fn get(&self, id: ZoneId) -> ZoneView {
        self.zone(id).view()
    }

    #[track_caller]
    pub fn set_target(&mut self, id: ZoneId, celsius: f32) {
        self.zone_mut(id).set_target(celsius);
    }

    #[track_caller]
    pub fn set_target_offset(&mut self, id: ZoneId, delta: f32) {
        self.zone_mut(id).set_offset(delta);
    }

    /// Record a sensor refresh.
    #[track_caller]
    pub fn set_current(&mut self, id: ZoneId, celsius: f32, redundant: Option<f32>) {
        let z = self.zone_mut(id);
        z.current_c = celsius;
        z.redundant_c = redundant;
    }

    #[track_caller]
    pub fn set_max_temp_limit(&mut self, id: ZoneId, celsius: f32) -> Result<(), ThermalError> {
        self.zone_mut(id).set_max_temp(celsius)
    }
}

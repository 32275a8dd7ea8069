//! Heater state manager: resolves the setpoint a zone tracks this tick.

use crate::config::StandbyCfg;
use crate::zone::{Zone, ZoneKind, ZoneState};

#[derive(Debug, Clone)]
pub struct StandbyPolicy {
    cfg: StandbyCfg,
}

impl StandbyPolicy {
    pub fn new(cfg: StandbyCfg) -> Self {
        Self { cfg }
    }

    /// Apply the idle timeout and return the setpoint for this tick.
    ///
    /// The user target is never modified, so leaving standby restores it.
    pub fn resolve(&self, zone: &mut Zone, now_ms: u64) -> f32 {
        if self.idle_expired(zone, now_ms) {
            tracing::info!(zone = %zone.id, label = zone.label(), "auto standby");
            zone.state = ZoneState::AutoStandby;
        }
        let effective = zone.effective_target();
        let setpoint = match zone.state {
            ZoneState::Preheat => effective,
            ZoneState::Standby | ZoneState::AutoStandby => zone.standby_temp_c.min(effective),
            ZoneState::Disabled => 0.0,
        };
        zone.setpoint_c = setpoint;
        setpoint
    }

    fn idle_expired(&self, zone: &Zone, now_ms: u64) -> bool {
        self.cfg.auto_standby_after_ms > 0
            && zone.kind == ZoneKind::Hotend
            && zone.state == ZoneState::Preheat
            && zone.effective_target() > 0.0
            && now_ms.saturating_sub(zone.last_activity_ms) >= self.cfg.auto_standby_after_ms
    }

    /// Record use of a zone; wakes it from auto standby.
    pub fn touch(zone: &mut Zone, now_ms: u64) {
        zone.last_activity_ms = now_ms;
        if zone.state == ZoneState::AutoStandby {
            tracing::info!(zone = %zone.id, "leaving auto standby");
            zone.state = ZoneState::Preheat;
        }
    }

    /// Leave either standby and restart the idle timer.
    pub fn wake(zone: &mut Zone, now_ms: u64) {
        zone.last_activity_ms = now_ms;
        if zone.state.is_standby() {
            tracing::info!(zone = %zone.id, from = ?zone.state, "leaving standby");
            zone.state = ZoneState::Preheat;
        }
    }

    /// Toggle explicit standby. Disabled zones are left alone.
    pub fn set_standby(zone: &mut Zone, on: bool, now_ms: u64) {
        match (zone.state, on) {
            (ZoneState::Disabled, _) => {}
            (_, true) => zone.state = ZoneState::Standby,
            (ZoneState::Standby | ZoneState::AutoStandby, false) => {
                zone.state = ZoneState::Preheat;
                zone.last_activity_ms = now_ms;
            }
            (ZoneState::Preheat, false) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneCfg;
    use crate::zone::{ZoneId, Zones};

    fn zones() -> Zones {
        let mut e0 = ZoneCfg::hotend("e0", 275.0);
        e0.standby_temp_c = 150.0;
        let mut bed = ZoneCfg::bed(150.0);
        bed.standby_temp_c = 40.0;
        Zones::new(&[e0, bed], 100)
    }

    #[test]
    fn hotend_drops_to_standby_after_idle_and_wakes_on_activity() {
        let policy = StandbyPolicy::new(StandbyCfg {
            auto_standby_after_ms: 1_000,
        });
        let mut z = zones();
        z.set_target(ZoneId(0), 210.0);
        let zone = z.zone_mut(ZoneId(0));
        assert_eq!(policy.resolve(zone, 999), 210.0);
        assert_eq!(policy.resolve(zone, 1_000), 150.0);
        assert_eq!(zone.state, ZoneState::AutoStandby);
        assert_eq!(zone.target(), 210.0);
        StandbyPolicy::touch(zone, 1_500);
        assert_eq!(policy.resolve(zone, 1_600), 210.0);
    }

    #[test]
    fn bed_never_auto_standbys() {
        let policy = StandbyPolicy::new(StandbyCfg {
            auto_standby_after_ms: 1_000,
        });
        let mut z = zones();
        z.set_target(ZoneId(1), 60.0);
        let bed = z.zone_mut(ZoneId(1));
        assert_eq!(policy.resolve(bed, 60_000), 60.0);
        assert_eq!(bed.state, ZoneState::Preheat);
    }

    #[test]
    fn explicit_standby_uses_lower_of_standby_and_target() {
        let policy = StandbyPolicy::new(StandbyCfg::default());
        let mut z = zones();
        z.set_target(ZoneId(0), 120.0);
        let zone = z.zone_mut(ZoneId(0));
        StandbyPolicy::set_standby(zone, true, 0);
        assert_eq!(policy.resolve(zone, 0), 120.0);
        zone.set_target(200.0);
        assert_eq!(policy.resolve(zone, 0), 150.0);
        StandbyPolicy::set_standby(zone, false, 0);
        assert_eq!(policy.resolve(zone, 0), 200.0);
    }

    #[test]
    fn disabled_is_sticky() {
        let policy = StandbyPolicy::new(StandbyCfg::default());
        let mut z = zones();
        z.set_target(ZoneId(0), 200.0);
        let zone = z.zone_mut(ZoneId(0));
        zone.state = ZoneState::Disabled;
        StandbyPolicy::set_standby(zone, false, 0);
        StandbyPolicy::touch(zone, 0);
        assert_eq!(zone.state, ZoneState::Disabled);
        assert_eq!(policy.resolve(zone, 0), 0.0);
    }
}

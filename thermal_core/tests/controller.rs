use rstest::rstest;
use thermal_core::mocks::{RecordingHeater, ScriptedSensor};
use thermal_core::{
    ControlCommand, ControllerCfg, FaultReason, NoopObserver, StandbyCfg, ThermalController,
    ThermalControllerBuilder, TickStatus, ZoneCfg, ZoneId, ZoneState,
};
use thermal_traits::{ManualClock, Reading};

const E0: ZoneId = ZoneId(0);
const BED: ZoneId = ZoneId(1);

struct Rig {
    ctrl: ThermalController<ScriptedSensor, RecordingHeater>,
    sensor: ScriptedSensor,
    heater: RecordingHeater,
    clock: ManualClock,
}

impl Rig {
    fn new(cfg: ControllerCfg, start_c: f32) -> Self {
        let sensor = ScriptedSensor::new(cfg.zones.len(), start_c);
        let heater = RecordingHeater::new();
        let clock = ManualClock::new();
        let mut ctrl = ThermalControllerBuilder::new()
            .with_sensor(sensor.clone())
            .with_heater(heater.clone())
            .with_config(cfg)
            .with_clock(Box::new(clock.clone()))
            .build()
            .expect("controller build");
        ctrl.initialize().expect("initialize");
        Self {
            ctrl,
            sensor,
            heater,
            clock,
        }
    }

    fn tick(&mut self) -> TickStatus {
        self.clock.advance_ms(self.ctrl.period_ms());
        self.ctrl.tick().unwrap_or_else(|e| panic!("tick: {e:?}"))
    }
}

fn hotend(max_temp_c: f32) -> ControllerCfg {
    ControllerCfg::with_zones(vec![ZoneCfg::hotend("e0", max_temp_c)])
}

fn hotend_and_bed() -> ControllerCfg {
    ControllerCfg::with_zones(vec![ZoneCfg::hotend("e0", 275.0), ZoneCfg::bed(150.0)])
}

#[test]
fn over_limit_request_is_capped_and_heats_at_full_power() {
    let mut r = Rig::new(hotend(260.0), 25.0);
    r.ctrl.set_target(E0, 280.0);
    assert_eq!(r.ctrl.get_target(E0), 245.0);
    r.tick();
    assert_eq!(r.ctrl.get_actuation_power(E0), 255);
    assert_eq!(r.heater.power(0), 255);
    assert!(r.ctrl.is_heating(E0));
    assert!(!r.ctrl.is_cooling(E0));
}

#[test]
fn set_target_is_idempotent() {
    let mut r = Rig::new(hotend_and_bed(), 25.0);
    r.ctrl.set_target(E0, 215.0);
    let first = r.ctrl.zone(E0);
    r.ctrl.set_target(E0, 215.0);
    assert_eq!(r.ctrl.zone(E0), first);
}

#[test]
fn over_temperature_jump_latches_fault() {
    let mut r = Rig::new(hotend(275.0), 198.0);
    r.ctrl.set_target(E0, 200.0);
    r.tick();
    assert!(r.ctrl.get_actuation_power(E0) > 0);

    r.sensor.set(0, 290.0);
    let status = r.tick();
    assert_eq!(status.newly_faulted, 1);
    assert_eq!(status.faulted, 1);
    assert_eq!(r.ctrl.zone(E0).fault, Some(FaultReason::MaxTemp));
    assert_eq!(r.ctrl.zone(E0).state, ZoneState::Disabled);
    assert_eq!(r.heater.power(0), 0);

    // Cooling back into range does not clear the fault.
    r.sensor.set(0, 150.0);
    for _ in 0..50 {
        let s = r.tick();
        assert_eq!(s.newly_faulted, 0);
        assert_eq!(r.heater.power(0), 0);
    }
    // The reading is still tracked.
    assert_eq!(r.ctrl.temperature(E0), 150.0);
}

#[rstest]
#[case::max_temp(Reading::new(300.0), FaultReason::MaxTemp)]
#[case::open_sensor(Reading::new(-14.0), FaultReason::MinTemp)]
#[case::nan(Reading::new(f32::NAN), FaultReason::SensorFault)]
fn faulted_zone_outputs_zero_every_tick(#[case] bad: Reading, #[case] reason: FaultReason) {
    let mut r = Rig::new(hotend(275.0), 25.0);
    r.ctrl.set_target(E0, 200.0);
    r.tick();
    r.sensor.set_reading(0, bad);
    r.tick();
    assert_eq!(r.ctrl.zone(E0).fault, Some(reason));

    r.sensor.set(0, 25.0);
    r.heater.clear();
    for _ in 0..100 {
        r.tick();
    }
    assert!(r.heater.history(0).iter().all(|&p| p == 0));
    assert_eq!(r.heater.history(0).len(), 100);
}

#[test]
fn reset_zone_clears_fault_and_target() {
    let mut r = Rig::new(hotend(275.0), 25.0);
    r.ctrl.set_target(E0, 200.0);
    r.sensor.set(0, 300.0);
    r.tick();
    assert!(r.ctrl.zone(E0).fault.is_some());

    r.sensor.set(0, 25.0);
    r.ctrl.reset_zone(E0);
    let z = r.ctrl.zone(E0);
    assert_eq!(z.fault, None);
    assert_eq!(z.target_c, 0.0);
    r.ctrl.set_target(E0, 200.0);
    r.tick();
    assert_eq!(r.heater.power(0), 255);
}

#[test]
fn sensor_loss_faults_after_limit_and_zeroes_meanwhile() {
    let mut r = Rig::new(hotend(275.0), 25.0);
    r.ctrl.set_target(E0, 200.0);
    r.tick();
    assert_eq!(r.heater.power(0), 255);

    r.sensor.fail(0);
    for _ in 0..3 {
        r.tick();
        assert_eq!(r.heater.power(0), 0);
        assert_eq!(r.ctrl.zone(E0).fault, None);
    }
    r.tick();
    assert_eq!(r.ctrl.zone(E0).fault, Some(FaultReason::SensorTimeout));
}

#[test]
fn redundant_disagreement_faults_only_that_zone() {
    let mut cfg = hotend_and_bed();
    cfg.zones[0].redundant_sensor = true;
    let mut r = Rig::new(cfg, 25.0);
    r.sensor.set_reading(0, Reading::with_redundant(25.0, 25.5));
    r.ctrl.set_target(E0, 200.0);
    r.ctrl.set_target(BED, 60.0);
    r.tick();
    assert_eq!(r.ctrl.zone(E0).fault, None);

    r.sensor.set_reading(0, Reading::with_redundant(40.0, 25.0));
    r.tick();
    assert_eq!(r.ctrl.zone(E0).fault, Some(FaultReason::RedundantMismatch));
    assert_eq!(r.ctrl.zone(BED).fault, None);
    assert_eq!(r.heater.power(1), 255);
}

#[test]
fn disable_zone_writes_zero_immediately_and_sticks() {
    let mut r = Rig::new(hotend_and_bed(), 25.0);
    r.ctrl.set_target(E0, 200.0);
    r.tick();
    assert_eq!(r.heater.power(0), 255);

    r.ctrl.disable_zone(E0).expect("disable");
    assert_eq!(r.heater.power(0), 0);
    assert_eq!(r.ctrl.zone(E0).state, ZoneState::Disabled);
    assert_eq!(r.ctrl.get_target(E0), 0.0);

    r.ctrl.set_target(E0, 200.0);
    r.ctrl.set_standby(E0, false);
    r.ctrl.notify_activity(E0);
    for _ in 0..10 {
        r.tick();
        assert_eq!(r.heater.power(0), 0);
    }
    // Temperature is still refreshed while disabled.
    r.sensor.set(0, 30.0);
    r.tick();
    assert_eq!(r.ctrl.temperature(E0), 30.0);
}

#[test]
fn disable_all_covers_every_zone() {
    let mut r = Rig::new(hotend_and_bed(), 25.0);
    r.ctrl.set_target(E0, 200.0);
    r.ctrl.set_target(BED, 60.0);
    r.tick();
    r.ctrl.disable_all().expect("disable all");
    for id in [E0, BED] {
        assert_eq!(r.ctrl.zone(id).state, ZoneState::Disabled);
        assert_eq!(r.ctrl.get_actuation_power(id), 0);
    }
}

#[test]
fn pid_state_resets_around_disable() {
    let mut r = Rig::new(hotend(275.0), 195.0);
    r.ctrl.set_target(E0, 200.0);
    for _ in 0..20 {
        r.tick();
    }
    assert!(!r.ctrl.pid_is_clean(E0));
    r.ctrl.disable_zone(E0).expect("disable");
    assert!(r.ctrl.pid_is_clean(E0));
    r.ctrl.reset_zone(E0);
    assert!(r.ctrl.pid_is_clean(E0));
}

#[test]
fn pid_state_resets_entering_and_leaving_autotune() {
    let mut r = Rig::new(hotend(275.0), 195.0);
    r.ctrl.set_target(E0, 200.0);
    for _ in 0..20 {
        r.tick();
    }
    assert!(!r.ctrl.pid_is_clean(E0));

    r.ctrl
        .start_autotune(E0, 200.0, 5, Box::new(NoopObserver))
        .expect("start");
    assert!(r.ctrl.pid_is_clean(E0));
    for _ in 0..5 {
        r.tick();
    }
    // The relay drove the zone; PID state was not touched.
    assert!(r.ctrl.pid_is_clean(E0));
    assert!(r.ctrl.cancel_autotune());
    assert!(r.ctrl.pid_is_clean(E0));

    r.tick();
    r.tick();
    assert!(!r.ctrl.pid_is_clean(E0));
}

#[test]
fn offset_trims_the_setpoint() {
    let mut r = Rig::new(hotend(275.0), 200.0);
    r.ctrl.set_target(E0, 250.0);
    r.ctrl.set_target_offset(E0, 30.0);
    assert_eq!(r.ctrl.effective_target(E0), 260.0);
    r.ctrl.set_target_offset(E0, -5.0);
    r.tick();
    assert_eq!(r.ctrl.zone(E0).setpoint_c, 245.0);
}

#[test]
fn lowering_max_temp_reclamps_and_bad_limits_are_rejected() {
    let mut r = Rig::new(hotend(275.0), 25.0);
    r.ctrl.set_target(E0, 250.0);
    r.ctrl.set_max_temp_limit(E0, 230.0).expect("limit");
    assert_eq!(r.ctrl.get_max_temp_limit(E0), 230.0);
    assert_eq!(r.ctrl.get_target(E0), 215.0);
    assert!(r.ctrl.set_max_temp_limit(E0, f32::NAN).is_err());
    assert!(r.ctrl.set_max_temp_limit(E0, 15.0).is_err());
    assert_eq!(r.ctrl.get_max_temp_limit(E0), 230.0);
}

#[test]
fn gains_are_validated_and_stored_per_second() {
    let mut r = Rig::new(hotend(275.0), 25.0);
    r.ctrl.set_gains(E0, 10.0, 0.5, 40.0).expect("gains");
    let (kp, ki, kd) = r.ctrl.gains_unscaled(E0);
    assert!((kp - 10.0).abs() < 1e-5);
    assert!((ki - 0.5).abs() < 1e-5);
    assert!((kd - 40.0).abs() < 1e-3);
    assert!((r.ctrl.gains(E0).ki - 0.05).abs() < 1e-6);
    assert!(r.ctrl.set_gains(E0, -1.0, 0.5, 40.0).is_err());
    assert!(r.ctrl.set_gains(E0, 1.0, f32::INFINITY, 40.0).is_err());
}

#[test]
fn idle_hotend_drops_to_standby_until_activity() {
    let mut cfg = hotend_and_bed();
    cfg.zones[0].standby_temp_c = 150.0;
    cfg.standby = StandbyCfg {
        auto_standby_after_ms: 1_000,
    };
    let mut r = Rig::new(cfg, 195.0);
    r.ctrl.set_target(E0, 200.0);
    r.ctrl.set_target(BED, 60.0);
    for _ in 0..9 {
        r.tick();
    }
    assert_eq!(r.ctrl.zone(E0).state, ZoneState::Preheat);
    r.tick();
    let z = r.ctrl.zone(E0);
    assert_eq!(z.state, ZoneState::AutoStandby);
    assert_eq!(z.setpoint_c, 150.0);
    assert_eq!(z.target_c, 200.0);
    assert_eq!(r.heater.power(0), 0);
    assert_eq!(r.ctrl.zone(BED).state, ZoneState::Preheat);

    r.ctrl.notify_extrusion(E0, 1.5);
    r.tick();
    assert_eq!(r.ctrl.zone(E0).state, ZoneState::Preheat);
    assert_eq!(r.ctrl.zone(E0).setpoint_c, 200.0);
}

#[test]
fn target_write_after_long_idle_heats_at_once() {
    // Default policy: 300 s idle, standby setpoint 0.
    let mut r = Rig::new(hotend(275.0), 25.0);
    for _ in 0..3_600 {
        r.tick();
    }
    r.ctrl.set_target(E0, 200.0);
    r.tick();
    r.tick();
    let z = r.ctrl.zone(E0);
    assert_eq!(z.state, ZoneState::Preheat);
    assert_eq!(z.setpoint_c, 200.0);
    assert_eq!(r.heater.power(0), 255);
}

#[test]
fn offset_write_wakes_auto_standby() {
    let mut cfg = hotend(275.0);
    cfg.standby = StandbyCfg {
        auto_standby_after_ms: 1_000,
    };
    let mut r = Rig::new(cfg, 25.0);
    r.ctrl.set_target(E0, 200.0);
    for _ in 0..11 {
        r.tick();
    }
    assert_eq!(r.ctrl.zone(E0).state, ZoneState::AutoStandby);
    assert_eq!(r.heater.power(0), 0);

    r.ctrl.set_target_offset(E0, 5.0);
    r.tick();
    assert_eq!(r.ctrl.zone(E0).state, ZoneState::Preheat);
    assert_eq!(r.ctrl.zone(E0).setpoint_c, 205.0);
    assert_eq!(r.heater.power(0), 255);
}

#[test]
fn tick_before_initialize_is_an_error() {
    let mut ctrl = ThermalControllerBuilder::new()
        .with_sensor(ScriptedSensor::new(1, 25.0))
        .with_heater(RecordingHeater::new())
        .with_config(hotend(275.0))
        .build()
        .expect("build");
    let err = ctrl.tick().expect_err("not initialized");
    assert!(format!("{err}").contains("initialize"));
}

#[test]
fn heater_write_failure_propagates() {
    let mut r = Rig::new(hotend(275.0), 25.0);
    r.heater.set_failing(true);
    r.clock.advance_ms(100);
    let err = r.ctrl.tick().expect_err("write fails");
    let chain = format!("{err:?}");
    assert!(chain.contains("set heater 0"), "{chain}");
}

#[test]
fn write_failure_still_evaluates_later_zones() {
    let mut r = Rig::new(hotend_and_bed(), 25.0);
    r.ctrl.set_target(BED, 60.0);
    r.sensor.set(1, 31.0);
    r.heater.set_failing(true);
    r.clock.advance_ms(100);
    let err = r.ctrl.tick().expect_err("write fails");
    assert!(format!("{err:?}").contains("set heater 0"));
    assert_eq!(r.ctrl.temperature(BED), 31.0);
    assert_eq!(r.ctrl.get_actuation_power(BED), 255);
}

#[test]
fn commands_for_unknown_zones_are_rejected() {
    let mut r = Rig::new(hotend(275.0), 25.0);
    let err = r
        .ctrl
        .apply_command(ControlCommand::SetTarget {
            zone: ZoneId(9),
            celsius: 200.0,
        })
        .expect_err("unknown zone");
    assert!(format!("{err}").contains("out of range"));

    r.ctrl
        .apply_command(ControlCommand::SetTarget {
            zone: E0,
            celsius: 180.0,
        })
        .expect("valid command");
    assert_eq!(r.ctrl.get_target(E0), 180.0);
}

#[test]
#[should_panic(expected = "out of range")]
fn direct_access_to_unknown_zone_panics() {
    let r = Rig::new(hotend(275.0), 25.0);
    let _ = r.ctrl.zone(ZoneId(3));
}

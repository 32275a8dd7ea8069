use rstest::rstest;
use thermal_core::mocks::{RecordingHeater, ScriptedSensor};
use thermal_core::{
    ControllerCfg, FaultReason, NoopObserver, StandbyCfg, ThermalController,
    ThermalControllerBuilder, ZoneCfg, ZoneId, ZoneState,
};
use thermal_traits::ManualClock;

const E0: ZoneId = ZoneId(0);

fn controller(
    cfg: ControllerCfg,
    start_c: f32,
) -> (ThermalController<ScriptedSensor, RecordingHeater>, ScriptedSensor, ManualClock) {
    let sensor = ScriptedSensor::new(cfg.zones.len(), start_c);
    let clock = ManualClock::new();
    let mut ctrl = ThermalControllerBuilder::new()
        .with_sensor(sensor.clone())
        .with_heater(RecordingHeater::new())
        .with_config(cfg)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build");
    ctrl.initialize().expect("initialize");
    (ctrl, sensor, clock)
}

fn hotend() -> ControllerCfg {
    let mut e0 = ZoneCfg::hotend("e0", 275.0);
    e0.standby_temp_c = 150.0;
    ControllerCfg::with_zones(vec![e0])
}

#[test]
fn stuck_heater_faults_one_window_after_arming() {
    let (mut ctrl, _sensor, clock) = controller(hotend(), 100.0);
    ctrl.set_target(E0, 200.0);

    // Tick 1 commands full power; tick 2 arms with a 20 s window.
    for tick in 1..=201 {
        clock.advance_ms(100);
        let s = ctrl.tick().expect("tick");
        assert_eq!(s.faulted, 0, "faulted early at tick {tick}");
        assert_eq!(ctrl.get_actuation_power(E0), 255);
    }
    clock.advance_ms(100);
    let s = ctrl.tick().expect("tick");
    assert_eq!(s.newly_faulted, 1);
    assert_eq!(ctrl.zone(E0).fault, Some(FaultReason::HeatingStalled));
    assert_eq!(ctrl.now_ms(), 20_200);
    assert_eq!(ctrl.get_actuation_power(E0), 0);
}

#[rstest]
#[case::half_degree_per_second(0.05)]
#[case::fast(0.4)]
fn rising_zone_never_trips(#[case] per_tick: f32) {
    let (mut ctrl, sensor, clock) = controller(hotend(), 40.0);
    ctrl.set_target(E0, 250.0);
    let mut t = 40.0;
    for _ in 0..600 {
        clock.advance_ms(100);
        ctrl.tick().expect("tick");
        assert_eq!(ctrl.zone(E0).fault, None);
        t = (t + per_tick).min(245.0);
        sensor.set(0, t);
    }
}

#[test]
fn standby_setpoint_does_not_arm_watchdog() {
    let (mut ctrl, _sensor, clock) = controller(hotend(), 100.0);
    ctrl.set_target(E0, 200.0);
    ctrl.set_standby(E0, true);
    for _ in 0..400 {
        clock.advance_ms(100);
        ctrl.tick().expect("tick");
    }
    assert_eq!(ctrl.zone(E0).setpoint_c, 150.0);
    assert_eq!(ctrl.get_actuation_power(E0), 255);
    assert_eq!(ctrl.zone(E0).fault, None);
}

#[test]
fn zero_period_disables_watchdog() {
    let mut cfg = hotend();
    cfg.safety.watch.period_ms = 0;
    let (mut ctrl, _sensor, clock) = controller(cfg, 100.0);
    ctrl.set_target(E0, 200.0);
    for _ in 0..400 {
        clock.advance_ms(100);
        ctrl.tick().expect("tick");
    }
    assert_eq!(ctrl.zone(E0).fault, None);
}

#[test]
fn close_to_setpoint_stays_disarmed() {
    let (mut ctrl, _sensor, clock) = controller(hotend(), 195.0);
    ctrl.set_target(E0, 200.0);
    for _ in 0..400 {
        clock.advance_ms(100);
        ctrl.tick().expect("tick");
    }
    assert_eq!(ctrl.zone(E0).fault, None);
}

#[test]
fn autotune_after_idle_is_still_watched() {
    let mut cfg = hotend();
    cfg.standby = StandbyCfg {
        auto_standby_after_ms: 1_000,
    };
    let (mut ctrl, _sensor, clock) = controller(cfg, 175.0);
    ctrl.set_target(E0, 180.0);
    for _ in 0..20 {
        clock.advance_ms(100);
        ctrl.tick().expect("tick");
    }
    assert_eq!(ctrl.zone(E0).state, ZoneState::AutoStandby);

    ctrl.start_autotune(E0, 200.0, 5, Box::new(NoopObserver))
        .expect("start");
    assert_eq!(ctrl.zone(E0).state, ZoneState::Preheat);

    // Sensor frozen at 175 while the relay drives full power.
    let mut faulted_at = None;
    for tick in 1..=3_000 {
        clock.advance_ms(100);
        ctrl.tick().expect("tick");
        if ctrl.zone(E0).fault.is_some() {
            faulted_at = Some(tick);
            break;
        }
        assert_eq!(ctrl.zone(E0).state, ZoneState::Preheat);
    }
    let tick = faulted_at.expect("watchdog should trip");
    assert!(tick <= 210, "tripped late at tick {tick}");
    assert_eq!(ctrl.zone(E0).fault, Some(FaultReason::HeatingStalled));
    assert!(ctrl.autotune_state().is_none());
    assert_eq!(ctrl.get_actuation_power(E0), 0);
}

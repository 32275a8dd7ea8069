use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thermal_core::mocks::{RecordingHeater, ScriptedSensor};
use thermal_core::{
    ControlCommand, ControllerCfg, RunParams, StopReason, ThermalController,
    ThermalControllerBuilder, ZoneCfg, ZoneId, command_channel, run,
};
use thermal_traits::ManualClock;

const E0: ZoneId = ZoneId(0);

fn setup() -> (
    ThermalController<ScriptedSensor, RecordingHeater>,
    RecordingHeater,
    ManualClock,
) {
    let heater = RecordingHeater::new();
    let clock = ManualClock::new();
    let ctrl = ThermalControllerBuilder::new()
        .with_sensor(ScriptedSensor::new(1, 25.0))
        .with_heater(heater.clone())
        .with_config(ControllerCfg::with_zones(vec![ZoneCfg::hotend("e0", 275.0)]))
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build");
    (ctrl, heater, clock)
}

#[test]
fn stops_at_tick_budget_and_keeps_cadence() {
    let (mut ctrl, heater, _clock) = setup();
    ctrl.set_target(E0, 200.0);
    let params = RunParams {
        max_ticks: Some(25),
        shutdown: None,
    };
    let mut seen = 0;
    let summary = run(&mut ctrl, None, &params, |c, status| {
        seen += 1;
        assert_eq!(status.tick, seen);
        assert_eq!(c.get_actuation_power(E0), 255);
        ControlFlow::Continue(())
    })
    .expect("run");

    assert_eq!(summary.ticks, 25);
    assert_eq!(summary.stopped_by, StopReason::TickBudget);
    assert_eq!(summary.missed_deadlines, 0);
    assert_eq!(ctrl.now_ms(), 2_500);
    assert_eq!(heater.power(0), 0);
}

#[test]
fn shutdown_flag_stops_before_next_tick() {
    let (mut ctrl, heater, _clock) = setup();
    ctrl.set_target(E0, 200.0);
    let flag = Arc::new(AtomicBool::new(false));
    let params = RunParams {
        max_ticks: None,
        shutdown: Some(Arc::clone(&flag)),
    };
    let summary = run(&mut ctrl, None, &params, |c, _| {
        if c.ticks() == 10 {
            flag.store(true, Ordering::Relaxed);
        }
        ControlFlow::Continue(())
    })
    .expect("run");
    assert_eq!(summary.ticks, 10);
    assert_eq!(summary.stopped_by, StopReason::Shutdown);
    assert_eq!(heater.power(0), 0);
}

#[test]
fn hook_break_stops_loop() {
    let (mut ctrl, _heater, _clock) = setup();
    let summary = run(&mut ctrl, None, &RunParams::default(), |c, _| {
        if c.ticks() >= 3 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .expect("run");
    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.stopped_by, StopReason::Hook);
}

#[test]
fn queued_commands_apply_before_the_tick() {
    let (mut ctrl, heater, _clock) = setup();
    let (tx, rx) = command_channel(8);
    tx.send(ControlCommand::SetTarget {
        zone: ZoneId(5),
        celsius: 100.0,
    })
    .expect("send");
    tx.send(ControlCommand::SetTarget {
        zone: E0,
        celsius: 210.0,
    })
    .expect("send");

    let params = RunParams {
        max_ticks: Some(1),
        shutdown: None,
    };
    let mut powered = 0;
    let summary = run(&mut ctrl, Some(&rx), &params, |c, _| {
        powered = c.get_actuation_power(E0);
        ControlFlow::Continue(())
    })
    .expect("run");
    assert_eq!(summary.ticks, 1);
    assert_eq!(powered, 255);
    assert_eq!(ctrl.get_target(E0), 210.0);
    assert!(rx.is_empty());
    assert_eq!(heater.power(0), 0);
}

#[test]
fn overrun_counts_missed_deadline() {
    let (mut ctrl, _heater, clock) = setup();
    let params = RunParams {
        max_ticks: Some(4),
        shutdown: None,
    };
    let summary = run(&mut ctrl, None, &params, |c, _| {
        if c.ticks() % 2 == 0 {
            clock.advance_ms(150);
        }
        ControlFlow::Continue(())
    })
    .expect("run");
    assert_eq!(summary.missed_deadlines, 2);
}

#[test]
fn tick_error_ends_run() {
    let (mut ctrl, heater, _clock) = setup();
    ctrl.initialize().expect("initialize");
    heater.set_failing(true);
    let err = run(&mut ctrl, None, &RunParams::default(), |_, _| {
        ControlFlow::Continue(())
    })
    .expect_err("heater failure");
    assert!(format!("{err:?}").contains("set heater 0"));
}

#[test]
fn faulted_zone_is_reported_in_summary() {
    let sensor = ScriptedSensor::new(1, 25.0);
    let mut ctrl = ThermalControllerBuilder::new()
        .with_sensor(sensor.clone())
        .with_heater(RecordingHeater::new())
        .with_config(ControllerCfg::with_zones(vec![ZoneCfg::hotend("e0", 275.0)]))
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .expect("build");
    let params = RunParams {
        max_ticks: Some(5),
        shutdown: None,
    };
    let summary = run(&mut ctrl, None, &params, |c, status| {
        if c.ticks() == 2 {
            sensor.set(0, 400.0);
        }
        if status.any_faulted() {
            assert_eq!(status.faulted, 1);
        }
        ControlFlow::Continue(())
    })
    .expect("run");
    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.faulted, 1);
}

use rstest::rstest;
use thermal_hardware::error::HwError;
use thermal_hardware::{OPEN_SENSOR_C, PlantParams, SimFault, SimulatedPlant};
use thermal_traits::{HeaterOutput, TemperatureSensor};

fn plant() -> SimulatedPlant {
    SimulatedPlant::new(
        2,
        PlantParams {
            lag_ticks: 0,
            ..PlantParams::default()
        },
    )
}

#[test]
fn failing_reads_surface_sensor_timeout() {
    let p = plant();
    p.inject(0, SimFault::FailingReads);
    let err = p.sensor().read(0).expect_err("read should fail");
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::SensorTimeout)
    ));
    // The other zone is unaffected.
    assert!(p.sensor().read(1).is_ok());
}

#[test]
fn open_sensor_reads_below_ambient() {
    let p = plant();
    p.inject(1, SimFault::OpenSensor);
    let r = p.sensor().read(1).expect("read");
    assert_eq!(r.celsius, OPEN_SENSOR_C);
}

#[test]
fn frozen_sensor_hides_real_heating() {
    let p = plant();
    let mut s = p.sensor();
    let mut h = p.heater();
    p.inject(0, SimFault::FrozenSensor);
    h.set_power(0, 255).expect("write");
    for _ in 0..50 {
        let r = s.read(0).expect("read");
        assert_eq!(r.celsius, 22.0);
    }
    assert!(p.temperature(0).expect("zone") > 30.0);
    p.clear_fault(0);
    assert!(s.read(0).expect("read").celsius > 30.0);
}

#[test]
fn disconnected_heater_does_not_heat() {
    let p = plant();
    let mut s = p.sensor();
    let mut h = p.heater();
    p.inject(0, SimFault::HeaterDisconnected);
    h.set_power(0, 255).expect("write");
    for _ in 0..50 {
        s.read(0).expect("read");
    }
    assert!((p.temperature(0).expect("zone") - 22.0).abs() < 1e-3);
    assert_eq!(p.power(0), Some(255));
}

#[rstest]
#[case(Some(0.5), Some(22.5))]
#[case(None, None)]
fn redundant_channel_follows_offset(#[case] offset: Option<f32>, #[case] expect: Option<f32>) {
    let p = plant();
    p.set_redundant_offset(0, offset);
    let r = p.sensor().read(0).expect("read");
    assert_eq!(r.redundant, expect);
}

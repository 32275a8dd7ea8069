#![no_main]
use libfuzzer_sys::fuzz_target;
use thermal_hardware::{PlantParams, SimulatedPlant};
use thermal_traits::ManualClock;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = thermal_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }

    // Anything that validates must also build and run a few ticks.
    let plant = SimulatedPlant::new(
        cfg.zones.len(),
        PlantParams {
            period_ms: cfg.control.period_ms,
            max_power: cfg.pid.max_power,
            ..PlantParams::default()
        },
    );
    let built = thermal_core::build_controller(
        plant.sensor(),
        plant.heater(),
        thermal_core::ControllerCfg::from(&cfg),
        Some(Box::new(ManualClock::new())),
    );
    let Ok(mut ctrl) = built else {
        return;
    };
    if ctrl.initialize().is_err() {
        return;
    }
    for _ in 0..5 {
        let _ = ctrl.tick();
    }
});

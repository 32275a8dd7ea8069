//! Human-readable error descriptions and structured JSON error formatting.

use thermal_core::error::{AutotuneError, BuildError, FaultReason, ThermalError};

pub fn fault_reason_name(r: FaultReason) -> &'static str {
    match r {
        FaultReason::MaxTemp => "MaxTemp",
        FaultReason::MinTemp => "MinTemp",
        FaultReason::RedundantMismatch => "RedundantMismatch",
        FaultReason::SensorFault => "SensorFault",
        FaultReason::SensorTimeout => "SensorTimeout",
        FaultReason::HeatingStalled => "HeatingStalled",
        FaultReason::AutotuneOverheat => "AutotuneOverheat",
    }
}

fn fault_text(reason: FaultReason) -> &'static str {
    match reason {
        FaultReason::MaxTemp => {
            "What happened: A zone went above its maximum temperature.\nLikely causes: Heater MOSFET stuck on, wrong max_temp_c, or a thermistor reading low then recovering.\nHow to fix: Let the zone cool, check the heater wiring and driver, then reset the zone."
        }
        FaultReason::MinTemp => {
            "What happened: A zone read below its minimum temperature.\nLikely causes: Disconnected or broken thermistor, or min_temp_c set above ambient.\nHow to fix: Check the sensor connector and cable; verify zones[].min_temp_c in the config."
        }
        FaultReason::RedundantMismatch => {
            "What happened: The redundant sensor disagreed with the primary one.\nLikely causes: One probe loose or damaged, or redundant_max_diff_c too tight.\nHow to fix: Inspect both probes; adjust safety.redundant_max_diff_c if the probes sit apart."
        }
        FaultReason::SensorFault => {
            "What happened: The sensor delivered a value that is not a number.\nLikely causes: Conversion fault in the sensor driver.\nHow to fix: Check the sensor driver and re-run with --log-level=debug."
        }
        FaultReason::SensorTimeout => {
            "What happened: The temperature sensor stopped answering.\nLikely causes: Loose wiring, a failing ADC, or sensor_error_limit set too low.\nHow to fix: Check the sensor wiring; consider raising safety.sensor_error_limit."
        }
        FaultReason::HeatingStalled => {
            "What happened: The heater was driven hard but the temperature did not rise (thermal runaway protection).\nLikely causes: Heater cartridge disconnected, thermistor fallen out of the block, or a weak heater.\nHow to fix: Check the heater and thermistor seating; adjust safety.watch_period_ms / watch_min_rise_c only if the hardware is known good."
        }
        FaultReason::AutotuneOverheat => {
            "What happened: Autotune overshot its temperature ceiling.\nLikely causes: Tuning target too close to max_temp_c, or a very fast heater.\nHow to fix: Lower the tuning target or raise autotune.overshoot_ceiling_c."
        }
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingZones => {
                "What happened: No heater zones were configured.\nLikely causes: The config has no [[zones]] entries.\nHow to fix: Add at least one [[zones]] table (see etc/thermal_config.toml).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/thermal_config.toml for a sample."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<ThermalError>() {
        return match te {
            ThermalError::Fault { zone, reason } => {
                format!("Zone {zone}: {}", fault_text(*reason))
            }
            ThermalError::Timeout => {
                "What happened: Temperature sensor read timed out.\nLikely causes: Sensor not wired, no power, or bus contention.\nHow to fix: Verify the sensor wiring and power.".to_string()
            }
            ThermalError::Hardware(_) | ThermalError::HardwareFault(_) => format!(
                "What happened: {te}.\nLikely causes: Heater driver or GPIO access failed.\nHow to fix: Check [hardware] heater_pins and GPIO permissions, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<AutotuneError>() {
        return match ae {
            AutotuneError::Timeout { cycles, requested } => format!(
                "What happened: Autotune timed out after {cycles} of {requested} cycles.\nLikely causes: Heater too weak to oscillate around the target, or autotune.timeout_ms too short.\nHow to fix: Lower the target or raise autotune.timeout_ms."
            ),
            AutotuneError::TemperatureTooHigh { celsius, ceiling } => format!(
                "What happened: Zone is at {celsius:.1} °C, above the tuning ceiling of {ceiling:.1} °C.\nLikely causes: Zone still hot from a previous job, or target too close to max_temp_c.\nHow to fix: Let the zone cool down or pick a lower target."
            ),
            AutotuneError::ZoneFaulted(reason) => fault_text(*reason).to_string(),
            AutotuneError::Cancelled => {
                "What happened: Autotune was cancelled before it finished.\nLikely causes: Ctrl-C or the zone was disabled.\nHow to fix: Start autotune again.".to_string()
            }
            other => format!(
                "What happened: {other}.\nLikely causes: Wrong --zone index, or the zone is disabled or faulted.\nHow to fix: Check the [[zones]] list in the config."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file. Original: {msg}"
        );
    }
    if lower.contains("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this schema.\nLikely causes: Typo in a key, wrong value type, or missing [[zones]].\nHow to fix: Compare with etc/thermal_config.toml. Original: {msg}"
        );
    }
    if lower.contains("zones[")
        || lower.contains("pid.")
        || lower.contains("safety.")
        || lower.contains("autotune.")
        || lower.contains("control.")
        || lower.contains("hardware.")
    {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range value for the key named above.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per fault reason; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    let reason = match err.downcast_ref::<ThermalError>() {
        Some(ThermalError::Fault { reason, .. }) => Some(*reason),
        _ => match err.downcast_ref::<AutotuneError>() {
            Some(AutotuneError::ZoneFaulted(reason)) => Some(*reason),
            Some(AutotuneError::TemperatureTooHigh { .. }) => Some(FaultReason::AutotuneOverheat),
            Some(AutotuneError::Timeout { .. }) => return 9,
            _ => None,
        },
    };
    match reason {
        Some(FaultReason::MaxTemp) => 2,
        Some(FaultReason::MinTemp) => 3,
        Some(FaultReason::RedundantMismatch) => 4,
        Some(FaultReason::SensorFault) => 5,
        Some(FaultReason::SensorTimeout) => 6,
        Some(FaultReason::HeatingStalled) => 7,
        Some(FaultReason::AutotuneOverheat) => 8,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    match err.downcast_ref::<ThermalError>() {
        Some(ThermalError::Fault { zone, reason }) => json!({
            "reason": fault_reason_name(*reason),
            "details": { "zone": zone },
            "message": humanize(err),
        })
        .to_string(),
        _ => {
            let reason = if err.downcast_ref::<AutotuneError>().is_some() {
                "Autotune"
            } else {
                "Error"
            };
            json!({ "reason": reason, "message": humanize(err) }).to_string()
        }
    }
}

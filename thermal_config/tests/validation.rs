use rstest::rstest;
use std::fs;
use tempfile::tempdir;
use thermal_config::{load_file, load_toml};

const BASE: &str = r#"
[control]
period_ms = 100

[pid]
max_power = 255
functional_range_c = 10.0
integral_drive_max = 255.0
d_filter = 0.95

[[zones]]
kind = "hotend"
label = "hotend0"
max_temp_c = 275
min_temp_c = 5
kp = 22.2
ki = 1.08
kd = 114.0
standby_temp_c = 150

[[zones]]
kind = "bed"
max_temp_c = 150

[safety]
redundant_max_diff_c = 10.0
sensor_error_limit = 3
watch_period_ms = 20000
watch_min_rise_c = 2.0
watch_min_power = 128
watch_settle_band_c = 10.0

[autotune]
hysteresis_c = 5.0
overshoot_ceiling_c = 20.0
timeout_ms = 1200000
"#;

#[test]
fn accepts_full_config() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.zones.len(), 2);
    assert_eq!(cfg.bed_index(), Some(1));
    assert_eq!(cfg.zones[0].label.as_deref(), Some("hotend0"));
}

#[rstest]
#[case("period_ms = 100", "period_ms = 0", "control.period_ms")]
#[case("max_power = 255", "max_power = 0", "pid.max_power")]
#[case("d_filter = 0.95", "d_filter = 1.0", "pid.d_filter")]
#[case("functional_range_c = 10.0", "functional_range_c = -1.0", "pid.functional_range_c")]
#[case("min_temp_c = 5", "min_temp_c = 265", "max_temp_c must exceed")]
#[case("kp = 22.2", "kp = -1.0", "zones[0].kp")]
#[case("sensor_error_limit = 3", "sensor_error_limit = 0", "safety.sensor_error_limit")]
#[case("watch_period_ms = 20000", "watch_period_ms = 50", "safety.watch_period_ms")]
#[case("watch_min_rise_c = 2.0", "watch_min_rise_c = 0.0", "safety.watch_min_rise_c")]
#[case("hysteresis_c = 5.0", "hysteresis_c = 0.0", "autotune.hysteresis_c")]
#[case("overshoot_ceiling_c = 20.0", "overshoot_ceiling_c = 4.0", "autotune.overshoot_ceiling_c")]
fn rejects_out_of_range_values(#[case] from: &str, #[case] to: &str, #[case] expect: &str) {
    let toml = BASE.replacen(from, to, 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    let msg = format!("{err}");
    assert!(msg.contains(expect), "message {msg:?} should mention {expect:?}");
}

#[test]
fn zero_watch_period_disables_watchdog_checks() {
    let toml = BASE
        .replacen("watch_period_ms = 20000", "watch_period_ms = 0", 1)
        .replacen("watch_min_rise_c = 2.0", "watch_min_rise_c = 0.0", 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("disabled watchdog ignores its tuning values");
}

#[test]
fn rejects_two_beds() {
    let toml = format!("{BASE}\n[[zones]]\nkind = \"bed\"\nmax_temp_c = 120\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("two beds");
    assert!(format!("{err}").contains("at most one bed"));
}

#[test]
fn rejects_missing_zones() {
    let cfg = load_toml("zones = []\n").expect("parse TOML");
    let err = cfg.validate().expect_err("no zones");
    assert!(format!("{err}").contains("at least one"));
}

#[test]
fn rejects_unknown_rotation() {
    let toml = format!("{BASE}\n[logging]\nrotation = \"weekly\"\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("bad rotation");
    assert!(format!("{err}").contains("logging.rotation"));
}

#[test]
fn unknown_zone_kind_is_a_parse_error() {
    let toml = "[[zones]]\nkind = \"chamber\"\nmax_temp_c = 80\n";
    assert!(load_toml(toml).is_err());
}

#[test]
fn load_file_parses_and_validates() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.toml");
    fs::write(&good, BASE).unwrap();
    let cfg = load_file(&good).expect("load");
    assert_eq!(cfg.control.period_ms, 100);

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, BASE.replacen("period_ms = 100", "period_ms = 0", 1)).unwrap();
    assert!(load_file(&bad).is_err());

    let missing = dir.path().join("missing.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn heater_pins_must_match_zones() {
    let toml = format!("{BASE}\n[hardware]\nheater_pins = [18]\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("one pin for two zones");
    assert!(format!("{err}").contains("hardware.heater_pins"));

    let toml = format!("{BASE}\n[hardware]\nheater_pins = [18, 23]\npwm_frequency_hz = 20.0\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("one pin per zone");
    assert_eq!(cfg.hardware.heater_pins, vec![18, 23]);
}

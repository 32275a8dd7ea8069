#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Thermal control core (hardware-agnostic).
//!
//! Keeps hotends and an optional heated bed at their setpoints and protects
//! them from thermal runaway. All hardware interaction goes through the
//! `thermal_traits::TemperatureSensor` and `thermal_traits::HeaterOutput`
//! traits.
//!
//! ## Architecture
//!
//! - **Zones**: per-heater targets, limits and state (`zone` module)
//! - **PID**: anti-windup PID with filtered derivative (`pid` module)
//! - **Safety**: limit checks, sensor loss, stuck-heater watchdog (`safety`)
//! - **Standby**: idle timeout and standby setpoints (`standby`)
//! - **Autotune**: relay-feedback gain estimation (`autotune`)
//! - **Controller**: the periodic `tick()` that sequences all of the above
//!
//! ## Timing
//!
//! Gains and timeouts are expressed per tick. `ControllerCfg::period_ms`
//! fixes the tick length; the `runner` keeps that cadence on a `Clock`.

pub mod autotune;
pub mod builder;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod pid;
pub mod runner;
pub mod safety;
pub mod standby;
pub mod status;
pub mod util;
pub mod zone;

pub use autotune::{
    AutotuneObserver, AutotuneProgress, AutotuneReport, AutotuneState, FnObserver, NoopObserver,
    TunedGains,
};
pub use builder::{Missing, ThermalControllerBuilder, build_controller};
pub use command::{CommandReceiver, CommandSender, ControlCommand, command_channel};
pub use config::{
    AutotuneCfg, ControllerCfg, ExtrusionCfg, PidCfg, SAFETY_MARGIN_C, SafetyCfg, StandbyCfg,
    WatchCfg, ZoneCfg,
};
pub use controller::ThermalController;
pub use error::{AutotuneError, BuildError, FaultReason, Result, ThermalError};
pub use pid::PidGains;
pub use runner::{RunParams, RunSummary, StopReason, run};
pub use status::TickStatus;
pub use zone::{ZoneId, ZoneKind, ZoneState, ZoneView};

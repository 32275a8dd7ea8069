//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "thermal", version, about = "Thermal control CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/thermal_config.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Options shared by every command that runs the control loop.
#[derive(Args, Debug, Clone)]
pub struct LoopOpts {
    /// Pace the loop on the wall clock instead of simulated time
    #[arg(long, action = ArgAction::SetTrue)]
    pub realtime: bool,
    /// Record every zone on every tick to this CSV file
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,
    /// Print control loop stats (ticks, missed deadlines)
    #[arg(long, action = ArgAction::SetTrue)]
    pub stats: bool,
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority, pins to one CPU, and calls mlockall to keep the process address space in RAM. Needs CAP_SYS_NICE / CAP_IPC_LOCK or root; failures are reported as warnings and the loop still runs."
    )]
    pub rt: bool,
    /// Real-time priority for SCHED_FIFO (1..=max)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Select memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin the process to for --rt. Defaults to 0.
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Heat zones to their targets and hold them for a while
    Heat {
        /// Target for every hotend (°C)
        #[arg(long, value_name = "CELSIUS")]
        hotend: Option<f32>,
        /// Target for the bed (°C)
        #[arg(long, value_name = "CELSIUS")]
        bed: Option<f32>,
        /// How long to run the loop, in seconds
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        seconds: u64,
        #[command(flatten)]
        opts: LoopOpts,
    },
    /// Run relay autotune on one zone and print the resulting gains
    Autotune {
        /// Zone index as listed in [[zones]]
        #[arg(long, default_value_t = 0)]
        zone: usize,
        /// Tuning temperature (°C)
        #[arg(long, value_name = "CELSIUS")]
        target: f32,
        /// Oscillation cycles to run (minimum 2)
        #[arg(long, default_value_t = 5)]
        cycles: u32,
        #[command(flatten)]
        opts: LoopOpts,
    },
    /// Quick health check (config, controller build, one tick)
    SelfCheck,
}

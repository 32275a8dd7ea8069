#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Thermal control CLI: heat, autotune and self-check on the simulated plant.

mod cli;
mod error_fmt;
mod rt;
mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn init_tracing(json: bool, level: &str, logging: Option<&thermal_config::Logging>) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    // Optional JSON-lines file sink from [logging]
    let file_layer = logging.and_then(|l| {
        let path = std::path::Path::new(l.file.as_deref()?);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let dir = dir.unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name()?;
        let appender = match l.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let filter = EnvFilter::new(l.level.clone().unwrap_or_else(|| "info".into()));
        Some(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();
}

fn install_ctrlc() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
    shutdown
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let json_mode = cli.json;
    let cfg = match thermal_config::load_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing(json_mode, &cli.log_level, None);
            return Err(e);
        }
    };
    init_tracing(json_mode, &cli.log_level, Some(&cfg.logging));
    tracing::debug!(config = %cli.config.display(), zones = cfg.zones.len(), "config loaded");

    let shutdown = install_ctrlc();
    match cli.cmd {
        Commands::Heat {
            hotend,
            bed,
            seconds,
            opts,
        } => run::run_heat(&cfg, hotend, bed, seconds, &opts, shutdown, json_mode),
        Commands::Autotune {
            zone,
            target,
            cycles,
            opts,
        } => run::run_autotune(&cfg, zone, target, cycles, &opts, shutdown, json_mode),
        Commands::SelfCheck => run::run_self_check(&cfg),
    }
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        tracing::error!(error = ?err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

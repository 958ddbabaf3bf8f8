#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `diffbot` command-line entry point.

mod cli;
mod control;
mod error_fmt;
mod rig;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use diffbot_config::{Config, Logging};
use diffbot_core::RunStats;
use eyre::WrapErr;
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands};
use crate::control::{GainOverrides, stop_reason_name};
use crate::error_fmt::{ConfigFile, exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    // A config that fails to load gets console logging only.
    let loaded = load_config(&cli.config);
    let logging = loaded.as_ref().ok().map(|c| c.logging.clone());
    let (guard, result) = match init_tracing(json, cli.log_level.as_deref(), logging.as_ref()) {
        Ok(guard) => (guard, loaded.and_then(|cfg| execute(cli, &cfg))),
        Err(e) => (None, Err(e)),
    };

    if let Err(e) = result {
        if json {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        tracing::error!(error = ?e, "command failed");
        // exit() skips destructors; flush the file sink first
        drop(guard);
        std::process::exit(exit_code_for_error(&e));
    }
}

fn execute(cli: Cli, cfg: &Config) -> eyre::Result<()> {
    color_eyre::install()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    match cli.cmd {
        Commands::Drive {
            speed,
            turn,
            duration_ms,
        } => {
            let stats = control::drive(cfg, speed, turn, duration_ms.map(Duration::from_millis), &shutdown)?;
            print_summary(cli.json, "drive", &stats);
        }
        Commands::Power {
            left,
            right,
            duration_ms,
        } => {
            let stats = control::power(cfg, left, right, duration_ms.map(Duration::from_millis), &shutdown)?;
            print_summary(cli.json, "power", &stats);
        }
        Commands::Tune {
            target,
            kp,
            ki,
            kd,
            duration_ms,
            csv,
        } => {
            let report = control::tune(
                cfg,
                target,
                GainOverrides { kp, ki, kd },
                Duration::from_millis(duration_ms),
                csv.as_deref(),
                &shutdown,
            )?;
            if cli.json {
                println!("{}", report.to_json());
            } else {
                let rise = report
                    .rise_ms
                    .map_or_else(|| "never".to_string(), |ms| format!("{ms} ms"));
                println!(
                    "tune complete: target {:.1} final {:.1} peak {:.1} overshoot {:.1}% rise {rise} state {}",
                    report.target,
                    report.final_speed,
                    report.peak_speed,
                    report.overshoot_pct(),
                    report.final_state
                );
            }
        }
        Commands::SelfCheck => {
            let check = control::self_check(cfg)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "event": "self_check",
                        "ok": true,
                        "backend": check.backend,
                        "pulse_sources": check.pulse_sources,
                        "encoder_pins": { "left": check.left_pin, "right": check.right_pin },
                    })
                );
            } else {
                println!(
                    "OK: backend {} with {} pulse sources (encoders on GPIO {:?}/{:?})",
                    check.backend, check.pulse_sources, check.left_pin, check.right_pin
                );
            }
        }
    }
    Ok(())
}

/// Read, parse and validate the config file.
fn load_config(path: &Path) -> eyre::Result<Config> {
    let ctx = || ConfigFile(path.to_path_buf());
    let text = fs::read_to_string(path).wrap_err_with(ctx)?;
    let cfg = diffbot_config::load_toml(&text)
        .map_err(eyre::Report::new)
        .wrap_err_with(ctx)?;
    cfg.validate().wrap_err_with(ctx)?;
    Ok(cfg)
}

fn rotation(name: Option<&str>) -> Rotation {
    match name {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Console logs go to stderr (pretty or JSON). With `[logging].file` set,
/// JSON lines are also written there through a non-blocking appender whose
/// guard must outlive every log call.
fn init_tracing(
    json: bool,
    cli_level: Option<&str>,
    logging: Option<&Logging>,
) -> eyre::Result<Option<WorkerGuard>> {
    // RUST_LOG, then --log-level, then [logging].level
    let level = cli_level
        .or_else(|| logging.and_then(|l| l.level.as_deref()))
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let mut guard = None;
    let file = match logging.and_then(|l| l.file.as_deref().map(|f| (f, l.rotation.as_deref()))) {
        Some((path, rot)) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = RollingFileAppender::new(rotation(rot), dir, name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}

fn print_summary(json: bool, command: &str, stats: &RunStats) {
    if json {
        println!(
            "{}",
            json!({
                "event": "summary",
                "command": command,
                "ticks": stats.ticks,
                "writes": stats.writes,
                "telemetry": stats.telemetry,
                "dropped": stats.dropped,
                "missed_deadlines": stats.missed_deadlines,
                "stop_reason": stop_reason_name(stats.stop_reason),
            })
        );
    } else {
        println!(
            "{command} complete: {} ticks, {} telemetry records, {} missed deadlines, stopped by {}",
            stats.ticks,
            stats.telemetry,
            stats.missed_deadlines,
            stop_reason_name(stats.stop_reason)
        );
    }
}

//! Logger configuration and structured output formatting.
//!
//! Structured, column-aligned log output with per-level colors. Colors are
//! disabled when `NO_COLOR` is set; the level filter follows `RUST_LOG`
//! with an `info` default.

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Visible width of the `[LEVEL]` column including padding.
const LEVEL_FIELD_WIDTH: usize = 8;

/// Visible width of the `module` column including padding.
const TARGET_FIELD_WIDTH: usize = 28;

/// Configure and initialize the application's logging system.
///
/// Output format:
///
/// ```text
/// Mar 15 25 02:30:45 PM | [INFO]  | vanguard_rs::routes::http  | Gateway starting on 0.0.0.0:8080
/// ```
///
/// Should be called once during startup; later calls are ignored by the
/// underlying logger.
pub fn configure_logger() {
    let no_color = env::var("NO_COLOR").is_ok();

    let level = env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let _ = Builder::new()
        .format(move |buf, record| {
            let level_plain = format!("[{}]", record.level());
            // Pad before colorizing so escape codes don't skew alignment
            let level_padded = format!("{:<width$}", level_plain, width = LEVEL_FIELD_WIDTH);

            let level_display = if no_color {
                level_padded
            } else {
                let color = match record.level() {
                    log::Level::Error => "\x1b[31m",
                    log::Level::Warn => "\x1b[33m",
                    log::Level::Info => "\x1b[32m",
                    log::Level::Debug => "\x1b[34m",
                    log::Level::Trace => "\x1b[35m",
                };
                format!("{}{}\x1b[0m", color, level_padded)
            };

            let target = record.target();
            let target_display = if target.len() > TARGET_FIELD_WIDTH {
                &target[target.len() - TARGET_FIELD_WIDTH..]
            } else {
                target
            };

            writeln!(
                buf,
                "{} | {}| {:<target_width$}| {}",
                Local::now().format("%b %d %y %I:%M:%S %p"),
                level_display,
                target_display,
                record.args(),
                target_width = TARGET_FIELD_WIDTH,
            )
        })
        .filter_level(level)
        .try_init();
}

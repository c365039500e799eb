//! Logging setup for the command line
//!
//! - Console output behind a reload handle so quiet runs can start at WARN
//! - Optional rolling log file, plain text or JSON

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Layer,
};

use mediasort::WakeHook;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for the log file; no file logging when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default)]
    pub json_logging: bool,
    /// node_exporter textfile collector target
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            log_file_name: default_log_file_name(),
            rotation: LogRotation::default(),
            json_logging: false,
            metrics_textfile: None,
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_file_name() -> String { "mediasort.log".to_string() }

pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

type ConsoleControl = Arc<dyn Fn(LevelFilter) + Send + Sync>;

/// Keeps the file writer alive and the console level adjustable
pub struct Telemetry {
    _file_guard: Option<WorkerGuard>,
    console: ConsoleControl,
}

impl Telemetry {
    /// Install the global subscriber. `quiet` starts the console at WARN.
    pub fn init(config: &TelemetryConfig, level_override: Option<&str>, quiet: bool) -> Result<Self> {
        let level = parse_level(level_override.unwrap_or(&config.log_level));

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("mediasort={}", level)));

        let initial = if quiet { LevelFilter::WARN } else { LevelFilter::TRACE };
        let (console_filter, console_handle) = reload::Layer::new(initial);
        // stdout is reserved for command output such as `check --json`
        let console_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter);

        let mut json_layer = None;
        let mut text_layer = None;
        let mut guard = None;

        if let Some(dir) = &config.log_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let appender = match config.rotation {
                LogRotation::Daily => rolling::daily(dir, &config.log_file_name),
                LogRotation::Hourly => rolling::hourly(dir, &config.log_file_name),
                LogRotation::Never => rolling::never(dir, &config.log_file_name),
            };
            let (writer, file_guard) = tracing_appender::non_blocking(appender);

            if config.json_logging {
                json_layer = Some(fmt::layer().json().with_current_span(true).with_writer(writer));
            } else {
                text_layer = Some(fmt::layer().with_ansi(false).with_writer(writer));
            }
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(json_layer)
            .with(text_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        let console: ConsoleControl = Arc::new(move |level| {
            if let Err(e) = console_handle.modify(|filter| *filter = level) {
                eprintln!("Failed to change console log level: {}", e);
            }
        });

        debug!(level = %level, quiet, file_logging = guard.is_some(), "Telemetry initialized");

        Ok(Self {
            _file_guard: guard,
            console,
        })
    }

    /// Restores full console output when a quiet run finds work
    pub fn wake_hook(&self) -> WakeHook {
        let console = self.console.clone();
        Box::new(move || console(LevelFilter::TRACE))
    }
}

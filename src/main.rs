mod cli;
mod commands;
mod presets;

use std::future::Future;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use parley_settings::{LogFormat, LoggingSettings};
use parley_telemetry::{init_telemetry, LogBuffer, TelemetryConfig};

use cli::Cli;

const LOG_PANEL_LINES: usize = 50;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match parley_settings::load_settings() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let telemetry = init_telemetry(telemetry_config(&loaded.settings.logging, cli.log_level.clone()));
    loaded.log_warnings();
    let settings = loaded.settings;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(interrupt, tokio::signal::ctrl_c).await {
            eprintln!("interrupted again, exiting without cleanup");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    let result = commands::dispatch(cli.command, &settings, &cancel).await;

    if cli.log_panel {
        print_log_panel(telemetry.logs(), settings.logging.format);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Cancel `cancel` on the first signal. Returns `true` on a second one, when
/// the caller should stop waiting for cleanup.
async fn watch_interrupts<F, Fut>(cancel: CancellationToken, mut next_signal: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    tracing::info!("interrupted, cancelling active run");
    cancel.cancel();
    next_signal().await.is_ok()
}

fn telemetry_config(logging: &LoggingSettings, level: Option<String>) -> TelemetryConfig {
    TelemetryConfig {
        log_level: level.unwrap_or_else(|| logging.level.clone()),
        module_levels: Vec::new(),
        format: match logging.format {
            LogFormat::Pretty => parley_telemetry::LogFormat::Pretty,
            LogFormat::Json => parley_telemetry::LogFormat::Json,
        },
        buffer_capacity: logging.buffer_capacity,
    }
}

fn print_log_panel(logs: &LogBuffer, format: LogFormat) {
    let records = logs.recent(LOG_PANEL_LINES);
    eprintln!("── log panel: {} warning(s) and error(s) ──", records.len());
    for record in &records {
        match format {
            LogFormat::Json => match serde_json::to_string(record) {
                Ok(line) => eprintln!("{line}"),
                Err(_) => eprintln!("{record}"),
            },
            LogFormat::Pretty => eprintln!("{record}"),
        }
    }
}

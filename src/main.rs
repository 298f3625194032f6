//! AutoFish - automated fishing driven by screen perception
//!
//! Bootstrap: logging, configuration, perception services, the fishing
//! controller, global hotkeys, and a console status echo. Everything
//! interesting happens on the controller's threads; the main thread just
//! keeps the process alive.

use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

mod config;
mod detector;
mod fishing;
mod hotkeys;
mod input;
mod screen_reader;
mod session_log;
mod utils;

use config::AutofishConfig;
use detector::{DetectorFacade, TemplateStateModel, TextStateReader};
use fishing::{ControlError, FishingController, Phase};
use hotkeys::HotkeyDispatcher;
use input::EnigoActuator;
use screen_reader::ScreenService;
use session_log::{SessionLogger, SessionOutcome};
use utils::path::get_data_dir;

const APP_VERSION: &str = env!("APP_VERSION");

fn init_logging() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // Default level 'info'; noisy external crates clamped to 'warn'
    const LOG_FILTER: &str = "info,autofish=info,global_hotkey=warn,mio=warn";

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_FILTER));

    let log_dir = get_data_dir().join("debug").join("log");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file_path = log_dir.join("debug.log");
    let file_result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path);

    match file_result {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE);

            let stdout_layer = tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();

            tracing::info!("[INIT] Logging initialized, file: {:?}", log_file_path);
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(LOG_FILTER))
                .init();
            eprintln!(
                "[INIT] Failed to create debug log file at {:?}: {}",
                log_file_path, e
            );
        }
    }
}

/// Build the perception stack; a failure here is an init fault and the
/// controller never starts.
fn build_detector(config: &AutofishConfig) -> Result<DetectorFacade, ControlError> {
    let model = TemplateStateModel::load(&config.templates_path())
        .map_err(|e| ControlError::InitFault(format!("classifier init failed: {}", e)))?;

    let text = TextStateReader::new(&config.ocr);

    // The screen service is constructed on this thread but retains no OS
    // handle, so the control thread can use it safely
    let frames = ScreenService::new();

    Ok(DetectorFacade::new(
        config,
        Box::new(frames),
        Box::new(model),
        Box::new(text),
    ))
}

/// Console observer: logs phase transitions and feeds the audit log.
/// Runs on the status delivery thread.
fn attach_status_echo(controller: &FishingController) {
    let previous: Arc<Mutex<(Phase, u64)>> = Arc::new(Mutex::new((Phase::Stopped, 0)));
    let audit = SessionLogger::new();

    controller.subscribe_status(Box::new(move |status| {
        let mut prev = previous.lock();
        let (prev_phase, prev_rounds) = *prev;

        if status.phase != prev_phase {
            println!("[{:?}] {}", status.phase, status.phase.description());

            match (prev_phase, status.phase) {
                (Phase::Stopped | Phase::Error, Phase::WaitingInitial) => {
                    audit.session_started(status.round_count)
                }
                (p, Phase::Stopped) if p != Phase::Stopped => {
                    audit.session_ended(SessionOutcome::Stopped, None)
                }
                (_, Phase::Error) => {
                    if let Some(err) = &status.last_error {
                        println!("Error: {}", err);
                    }
                    audit.session_ended(SessionOutcome::Error, status.last_error.as_deref());
                }
                _ => {}
            }
        }

        if status.round_count > prev_rounds {
            println!("Round {} complete", status.round_count);
            audit.round_completed(status.round_count);
        }

        *prev = (status.phase, status.round_count);
    }));
}

fn main() {
    init_logging();

    println!("AutoFish {}", APP_VERSION);
    println!("================================");

    let config = AutofishConfig::load();

    let detector = match build_detector(&config) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("[INIT] {}", e);
            eprintln!("Initialization failed: {}", e);
            process::exit(1);
        }
    };

    let actuator = Arc::new(EnigoActuator::new(&config));
    let controller = FishingController::new(config.clone(), detector, actuator);

    attach_status_echo(&controller);

    let dispatcher = match HotkeyDispatcher::new(&config.hotkey) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("[INIT] {}", e);
            eprintln!("Hotkey registration failed: {}", e);
            process::exit(1);
        }
    };

    let _listener = dispatcher.spawn_listener(controller.clone());

    println!(
        "Ready. start={} stop={} emergency={}",
        config.hotkey.start_fishing, config.hotkey.stop_fishing, config.hotkey.emergency_stop
    );

    // Hotkeys drive everything from here on
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

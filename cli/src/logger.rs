use std::sync::OnceLock;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::time::Duration;

/// Set up log levels, formatting, and other configurations for the logger
pub struct Logger {
    multi_progress: MultiProgress,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

impl<'a> Logger {
    pub fn init() -> &'a Self {
        LOGGER.get_or_init(|| {
            let logger = env_logger::Builder::from_env(
                // No logs shown by default, only human-friendly messages
                // Enable logs output with "export RUST_LOG=debug" in terminal
                env_logger::Env::default().default_filter_or("off"),
            )
            .build();

            let level = logger.filter();
            let multi_progress = MultiProgress::new();

            // Fails only if another logger is set, the first one wins then
            if let Err(error) = LogWrapper::new(multi_progress.clone(), logger).try_init() {
                eprintln!("Logger is already initialized: {error}");
            }

            log::set_max_level(level);

            Self { multi_progress }
        })
    }

    pub fn multi_progress() -> &'a MultiProgress {
        &Self::init().multi_progress
    }

    /// Spinner that keeps log lines above it
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = Self::multi_progress().add(ProgressBar::new_spinner());

        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

use crate::nice_display::NiceDisplay;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "research_companion.log";
const DEFAULT_FILTER: &str = "research_companion=info";

#[derive(Debug)]
pub enum Error {
    CreatingDir(std::io::Error),
    Init(String),
}

impl NiceDisplay for Error {
    fn message(&self) -> String {
        match self {
            Error::CreatingDir(err) => format!("Failed to create logs directory: {}", err),
            Error::Init(err) => format!("Failed to start logging: {}", err),
        }
    }
}

/// Logs go to stderr and to a daily file under `logs/`. Keep the guard
/// alive until exit or buffered lines are lost.
pub fn init() -> Result<WorkerGuard, Error> {
    std::fs::create_dir_all(LOG_DIR).map_err(Error::CreatingDir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|err| Error::Init(err.to_string()))?;

    Ok(guard)
}

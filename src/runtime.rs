use evlog::Logger;
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// Install the process logger. Later calls are no-ops; the library falls
/// back to a silent default logger if nothing was installed.
pub fn set_logger(logger: Logger) {
    let _ = LOGGER.set(logger);
}

pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::default)
}

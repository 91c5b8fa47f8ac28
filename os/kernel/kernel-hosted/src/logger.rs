use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// `log` sink writing `[LEVEL] target: message` lines to stderr, the hosted
/// stand-in for the kernel log.
pub struct KernelLogger {
    max_level: LevelFilter,
}

impl KernelLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install the logger. Only the first call in a process succeeds.
    ///
    /// # Errors
    /// If a logger is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Best effort, like the kernel log.
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn level_filter() {
        let logger = KernelLogger::new(LevelFilter::Info);
        let info = Metadata::builder().level(Level::Info).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&info));
        assert!(!logger.enabled(&debug));
    }
}

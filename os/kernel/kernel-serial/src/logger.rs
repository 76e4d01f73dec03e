use crate::{PortIo, Uart16550};
use core::fmt::Write;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// A `log` sink that writes `[LEVEL] target: message` lines to a UART.
pub struct SerialLogger<P> {
    uart: Uart16550<P>,
    max_level: LevelFilter,
}

impl<P: PortIo> SerialLogger<P> {
    #[must_use]
    pub const fn new(uart: Uart16550<P>, max_level: LevelFilter) -> Self {
        Self { uart, max_level }
    }

    #[must_use]
    pub fn accepts(&self, level: Level) -> bool {
        level <= self.max_level
    }

    /// Format one record onto the wire.
    pub fn write_record(&self, record: &Record) {
        // The UART writer itself never fails.
        let _ = writeln!(
            &self.uart,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }
}

#[cfg(target_arch = "x86_64")]
impl SerialLogger<crate::X86Ports> {
    /// Install as the global logger. Call this once during early init.
    #[allow(static_mut_refs, clippy::missing_errors_doc)]
    pub fn init(self) -> Result<&'static Self, log::SetLoggerError> {
        // No heap in the kernel; keep the logger in a static.
        static mut LOGGER: Option<SerialLogger<crate::X86Ports>> = None;

        let max_level = self.max_level;
        // SAFETY: single-threaded early boot, called once.
        let logger: &'static Self = unsafe { LOGGER.insert(self) };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(logger)
    }
}

impl<P: PortIo + Send + Sync> Log for SerialLogger<P> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.accepts(metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_record(record);
    }

    fn flush(&self) {}
}

use core::sync::atomic::{AtomicBool, Ordering};
use kernel_serial::{SerialLogger, Uart16550, X86Ports};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Logs to COM1 and, while boot services last, to the UEFI console.
pub struct UefiLogger {
    serial: SerialLogger<X86Ports>,
    console: AtomicBool,
}

impl UefiLogger {
    #[must_use]
    pub const fn new(uart: Uart16550<X86Ports>, max_level: LevelFilter) -> Self {
        Self {
            serial: SerialLogger::new(uart, max_level),
            console: AtomicBool::new(true),
        }
    }

    /// Call this once during early init.
    #[allow(static_mut_refs, clippy::missing_errors_doc)]
    pub fn init(self, max_level: LevelFilter) -> Result<&'static Self, SetLoggerError> {
        static mut LOGGER: Option<UefiLogger> = None;

        // SAFETY: single-threaded, called once before anything logs.
        let logger: &'static Self = unsafe { LOGGER.insert(self) };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(logger)
    }

    /// Stop mirroring to the console. Serial output continues.
    pub fn exit_boot_services(&self) {
        self.console.store(false, Ordering::SeqCst);
    }
}

impl Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.serial.accepts(metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        self.serial.write_record(record);

        // Mirror to UEFI console as long as possible.
        if self.console.load(Ordering::SeqCst) {
            uefi::println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

use crate::PortIo;
use core::fmt;

/// I/O base of the first serial port.
pub const COM1: u16 = 0x3F8;

const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// Line status: transmit holding register empty.
const LSR_THR_EMPTY: u8 = 0x20;

/// An initialized 16550 UART.
pub struct Uart16550<P> {
    io: P,
    base: u16,
}

impl<P: PortIo> Uart16550<P> {
    /// Program 38400 baud, 8N1, FIFOs enabled, interrupts off.
    ///
    /// # Safety
    /// The caller must own the UART at `base` for the lifetime of the driver.
    pub unsafe fn init(io: P, base: u16) -> Self {
        let uart = Self { io, base };
        unsafe {
            uart.write_reg(INTERRUPT_ENABLE, 0x00);
            uart.write_reg(LINE_CONTROL, 0x80); // DLAB on
            uart.write_reg(DATA, 0x03); // divisor low: 38400 baud
            uart.write_reg(INTERRUPT_ENABLE, 0x00); // divisor high
            uart.write_reg(LINE_CONTROL, 0x03); // 8N1, DLAB off
            uart.write_reg(FIFO_CONTROL, 0xC7);
            uart.write_reg(MODEM_CONTROL, 0x0B);
        }
        uart
    }

    /// Blocking single-byte transmit.
    pub fn write_byte(&self, byte: u8) {
        // SAFETY: `init` established ownership of the port range.
        unsafe {
            while self.io.inb(self.base + LINE_STATUS) & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.write_reg(DATA, byte);
        }
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(b);
        }
    }

    #[inline]
    unsafe fn write_reg(&self, reg: u16, value: u8) {
        unsafe { self.io.outb(self.base + reg, value) }
    }
}

/// Borrowing adapter so `write!` works on a shared driver.
impl<P: PortIo> fmt::Write for &Uart16550<P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

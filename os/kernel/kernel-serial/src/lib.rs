//! # COM1 Serial Output
//!
//! A minimal 16550 UART driver for early diagnostics, used by both the UEFI
//! loader (before and after `ExitBootServices`) and the kernel.
//!
//! ## Initialization as a value
//!
//! There is no "already initialized?" flag anywhere. [`Uart16550::init`]
//! programs the line settings and returns the driver; holding a
//! `Uart16550` *is* the proof that the port was set up. Whoever needs serial
//! output receives the driver (or the [`SerialLogger`] built from it)
//! explicitly.
//!
//! ```text
//! efi_main / kernel_entry
//!     ↓
//! Uart16550::init(X86Ports, COM1)
//!     ↓
//! SerialLogger::new(uart, level).init()
//!     ↓
//! log::info!(...)  →  "[INFO] target: message\n"  →  port 0x3F8
//! ```
//!
//! ## Port access
//!
//! Register access goes through the [`PortIo`] trait. [`X86Ports`] issues
//! real `in`/`out` instructions; tests substitute a recording fake.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod uart;

pub use logger::SerialLogger;
pub use uart::{COM1, Uart16550};

/// Byte-wide access to the x86 I/O port space.
pub trait PortIo {
    /// Write `value` to `port`.
    ///
    /// # Safety
    /// The caller must own the device behind `port`.
    unsafe fn outb(&self, port: u16, value: u8);

    /// Read a byte from `port`.
    ///
    /// # Safety
    /// The caller must own the device behind `port`.
    unsafe fn inb(&self, port: u16) -> u8;
}

/// Real port I/O via `in`/`out`.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default, Copy, Clone)]
pub struct X86Ports;

#[cfg(target_arch = "x86_64")]
impl PortIo for X86Ports {
    #[inline]
    unsafe fn outb(&self, port: u16, value: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[inline]
    unsafe fn inb(&self, port: u16) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }
}

//! # UEFI Loader
//!
//! A UEFI application that loads `\kernel.elf` from its own boot volume,
//! copies the kernel's segments to the physical addresses the image names,
//! leaves boot services and jumps to the kernel entry point with a pointer
//! to a [`KernelBootInfo`] record.
//!
//! ```text
//! UEFI Firmware Boot
//!         ↓
//! ┌─────────────────────────────────────────────┐
//! │              UEFI Loader                    │
//! ├─────────────────────────────────────────────┤
//! │  1. COM1 + logger                           │
//! │  2. Read \kernel.elf                        │
//! │  3. Parse ELF64, place PT_LOAD segments     │
//! │     at their physical addresses             │
//! │  4. Query the active GOP mode               │
//! │  5. Reserve the boot info page, find RSDP   │
//! │  6. Console off; capture memory map and     │
//! │     ExitBootServices (one retry)            │
//! │  7. Write KernelBootInfo                    │
//! │  8. Call the kernel entry point             │
//! └─────────────────────────────────────────────┘
//!         ↓
//! Kernel (identity mapped, loader's stack)
//! ```
//!
//! There are no page tables of our own: firmware's identity map stays in
//! place and the kernel runs on the loader's stack until it sets up its own.
//!
//! Everything up to step 7 lives in `uefi-handoff`; this crate implements its
//! firmware traits over boot services and does the jump.
//!
//! ## Failure
//!
//! Before boot services are gone, a failure is logged and returned to
//! firmware as a status code. Afterwards there is nothing to return to and
//! the loader halts.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]
extern crate alloc;

mod file_system;
mod firmware;
mod framebuffer;
mod logger;
mod memory;
mod rsdp;
mod tracing;
mod uefi_mmap;

use crate::firmware::UefiFirmware;
use crate::logger::UefiLogger;
use crate::tracing::trace_handoff;
use kernel_info::boot::KernelBootInfo;
use kernel_serial::{COM1, Uart16550, X86Ports};
use log::{LevelFilter, error, info};
use uefi::prelude::*;
use uefi_handoff::LoaderConfig;

const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// The kernel entry as the loader calls it. Declared as returning so that a
/// kernel which comes back ends up in [`halt`].
type EntryThunk = unsafe extern "win64" fn(*const KernelBootInfo);

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }

    // SAFETY: nothing else drives COM1 while the loader runs.
    let uart = unsafe { Uart16550::init(X86Ports, COM1) };
    let Ok(logger) = UefiLogger::new(uart, LOG_LEVEL).init(LOG_LEVEL) else {
        return Status::ABORTED;
    };

    info!("UEFI Loader reporting on COM1");

    let config = LoaderConfig::DEFAULT;
    let mut firmware = UefiFirmware::new();

    let result = uefi_handoff::run(&mut firmware, &config, || logger.exit_boot_services());
    let handoff = match result {
        Ok(handoff) => handoff,
        Err(failure) => {
            error!("{failure}: {}", failure.error);
            if failure.stage.firmware_available() {
                return Status::from(&failure.error);
            }
            halt();
        }
    };

    info!("Boot services exited, we're now flying by instruments.");
    trace_handoff(&handoff);

    #[allow(clippy::cast_possible_truncation)]
    let entry_addr = handoff.entry.as_u64() as usize;
    info!("Jumping into the kernel at {entry_addr:#x}. Ciao Kakao ...");

    // SAFETY: the image's segments sit at their physical targets, memory is
    // identity mapped, and the entry point lies inside a placed segment.
    unsafe {
        let entry = core::mem::transmute::<usize, EntryThunk>(entry_addr);
        entry(handoff.boot_info.as_mut_ptr::<KernelBootInfo>());
    }

    error!("The kernel returned to the loader");
    halt()
}

fn halt() -> ! {
    loop {
        unsafe {
            core::arch::asm!("cli; hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("Loader panic: {info}");
    halt()
}

//! # Kernel Entry Point
//!
//! The receiving end of the UEFI handoff. The loader calls [`_start_kernel`]
//! with a pointer to a [`KernelBootInfo`] record after `ExitBootServices`;
//! memory is identity mapped and nothing from firmware is usable anymore.
//!
//! All this kernel does is prove the handoff worked: it brings up COM1,
//! validates the record, reports the memory map, paints the boot splash and
//! halts.

#![no_std]
#![no_main]
#![allow(unsafe_code)]

mod framebuffer;
mod memory_map;

use kernel_info::boot::{KernelBootInfo, KernelEntryFn};
use kernel_info::memory::KERNEL_STACK_SIZE;
use kernel_serial::{COM1, SerialLogger, Uart16550, X86Ports};
use log::{LevelFilter, error, info};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("Kernel panic: {info}");
    halt()
}

/// 16-byte aligned stack
#[repr(align(16))]
struct Aligned<const N: usize>([u8; N]);

#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned<KERNEL_STACK_SIZE> = Aligned([0; KERNEL_STACK_SIZE]);

const _: KernelEntryFn = _start_kernel;

/// The kernel entry point
///
/// # UEFI Interaction
/// The UEFI loader calls this after `ExitBootServices`, still on its own
/// stack.
///
/// # ABI
/// The ABI is defined as `win64` since the kernel is called from a UEFI
/// (PE/COFF) application. This passes the `boot_info` pointer as `RCX`
/// (as opposed to `RDI` for the SysV ABI).
///
/// # Naked function & Stack
/// This is a naked function in order to move onto [`BOOT_STACK`] before any
/// Rust code runs. Nothing below the loader's frame is ever returned to.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "win64" fn _start_kernel(_boot_info: *const KernelBootInfo) -> ! {
    core::arch::naked_asm!(
        "cli",

        // save RCX (boot_info per Win64)
        "mov r12, rcx",

        // Build our own kernel stack and establish a valid call frame for kernel_entry
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        // Align down to 16
        "and rax, -16",
        "mov rsp, rax",
        // Emulate a CALL by pushing a dummy return address (so RSP % 16 == 8 at entry)
        "push 0",
        "xor rbp, rbp",

        // Restore boot_info into the expected arg register (SysV/C ABI)
        "mov rdi, r12",

        // Jump to Rust entry and never return
        "jmp {rust_entry}",
        stack_sym = sym BOOT_STACK,
        stack_size = const KERNEL_STACK_SIZE,
        rust_entry = sym kernel_entry,
    );
}

/// Kernel entry running on [`BOOT_STACK`].
///
/// # Notes
/// * `no_mangle` is used so that [`_start_kernel`] can jump to it by name.
/// * It uses C ABI to have a defined convention when calling in from ASM.
#[unsafe(no_mangle)]
extern "C" fn kernel_entry(boot_info: *const KernelBootInfo) -> ! {
    // SAFETY: the loader is gone; COM1 is ours now.
    let uart = unsafe { Uart16550::init(X86Ports, COM1) };
    if SerialLogger::new(uart, LevelFilter::Info).init().is_err() {
        halt();
    }
    info!("Kernel reporting on COM1");

    // SAFETY: the loader hands over a pointer to a full record in memory it
    // reserved for us.
    let bytes =
        unsafe { core::slice::from_raw_parts(boot_info.cast::<u8>(), KernelBootInfo::SIZE) };
    match KernelBootInfo::decode(bytes) {
        Ok(bi) => kernel_main(&bi),
        Err(e) => {
            error!("Rejecting boot info at {boot_info:p}: {e}");
            halt()
        }
    }
}

fn kernel_main(bi: &KernelBootInfo) -> ! {
    memory_map::report(&bi.mmap);
    framebuffer::paint(&bi.fb);
    if bi.rsdp_addr != 0 {
        info!("ACPI RSDP at {:#x}", bi.rsdp_addr);
    }

    info!("Boot complete, halting");
    halt()
}

fn halt() -> ! {
    loop {
        unsafe {
            core::arch::asm!("cli; hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

//! # Trace output

use kernel_info::boot::KernelBootInfo;
use log::{debug, error};
use uefi_handoff::Handoff;

/// Read back the descriptor the kernel is about to receive and log it.
pub fn trace_handoff(handoff: &Handoff) {
    // SAFETY: the descriptor was just written into loader-owned pages.
    let bytes = unsafe {
        core::slice::from_raw_parts(
            handoff.boot_info.as_mut_ptr::<u8>().cast_const(),
            KernelBootInfo::SIZE,
        )
    };

    let info = match KernelBootInfo::decode(bytes) {
        Ok(info) => info,
        Err(e) => {
            error!("Handoff descriptor at {} is unreadable: {e}", handoff.boot_info);
            return;
        }
    };

    debug!("Boot info at {}", handoff.boot_info);
    debug!(
        " MMAP ptr = {:#018x}, len = {}, desc size = {}, desc version = {}, records = {}",
        info.mmap.mmap_ptr,
        info.mmap.mmap_len,
        info.mmap.mmap_desc_size,
        info.mmap.mmap_desc_version,
        info.mmap.record_count()
    );
    debug!(
        "   FB ptr = {:#018x}, {}x{}, pitch = {}, bpp = {}, format = {:?}",
        info.fb.framebuffer_ptr,
        info.fb.framebuffer_width,
        info.fb.framebuffer_height,
        info.fb.framebuffer_pitch,
        info.fb.framebuffer_bpp,
        info.fb.framebuffer_format
    );
    debug!(" RSDP addr = {:#x}", info.rsdp_addr);
}

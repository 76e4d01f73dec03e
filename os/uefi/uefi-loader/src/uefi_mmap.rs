//! # UEFI Memory Map and Boot Services Exit
//!
//! The `uefi` crate's own `exit_boot_services` allocates its buffer and
//! retries internally. The handoff gate needs to own both decisions, so this
//! calls `GetMemoryMap` and `ExitBootServices` through the raw boot services
//! table instead.

use crate::firmware::UefiFirmware;
use crate::memory::UefiBootAllocator;
use core::ptr::null_mut;
use uefi::{Status, boot};
use uefi_handoff::FirmwareError;
use uefi_handoff::firmware::{MapKey, MapMeta, MemoryMapService, PhysicalRegion};
use uefi_raw::table::boot::{BootServices, MemoryDescriptor};

fn boot_services() -> Result<*mut BootServices, FirmwareError> {
    let st = uefi::table::system_table_raw().ok_or(FirmwareError::Unsupported)?;
    // SAFETY: the system table pointer stays valid for the loader's lifetime.
    let bs = unsafe { st.as_ref().boot_services };
    if bs.is_null() {
        return Err(FirmwareError::Unsupported);
    }
    Ok(bs)
}

impl MemoryMapService for UefiFirmware {
    fn memory_map(&mut self, buffer: Option<PhysicalRegion>) -> Result<MapMeta, FirmwareError> {
        let bs = boot_services()?;

        let (mut size, map) = match buffer {
            Some(region) => (region.len, region.base.as_mut_ptr::<MemoryDescriptor>()),
            None => (0, null_mut()),
        };
        let mut key = 0usize;
        let mut descriptor_size = 0usize;
        let mut descriptor_version = 0u32;

        // SAFETY: `map` is null (size probe) or a loader-owned buffer of `size` bytes.
        let status = unsafe {
            ((*bs).get_memory_map)(
                &mut size,
                map,
                &mut key,
                &mut descriptor_size,
                &mut descriptor_version,
            )
        };

        match status {
            Status::SUCCESS => Ok(MapMeta {
                map_size: size,
                key: MapKey(key),
                descriptor_size,
                descriptor_version,
            }),
            Status::BUFFER_TOO_SMALL => Err(FirmwareError::BufferTooSmall {
                required: size,
                descriptor_size,
            }),
            other => Err(other.into()),
        }
    }

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), FirmwareError> {
        let bs = boot_services()?;
        let image = boot::image_handle();

        // SAFETY: after success nothing may call boot services again. The
        // caller silences console logging first; the allocator retires below.
        let status = unsafe { ((*bs).exit_boot_services)(image.as_ptr(), key.0) };
        if status == Status::SUCCESS {
            UefiBootAllocator::retire();
            Ok(())
        } else {
            Err(status.into())
        }
    }
}

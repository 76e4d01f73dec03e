//! # Firmware Adapter
//!
//! [`UefiFirmware`] implements the `uefi-handoff` service traits over UEFI
//! boot services. Each service lives in its own module:
//!
//! | Trait              | Module           |
//! |--------------------|------------------|
//! | `BootVolume`       | `file_system`    |
//! | `DisplayService`   | `framebuffer`    |
//! | `PhysicalMemory`   | `memory`         |
//! | `MemoryMapService` | `uefi_mmap`      |
//! | `AcpiTables`       | `rsdp`           |

use alloc::vec::Vec;
use kernel_memory_addresses::PageSpan;

/// Boot-services backed firmware, plus the page reservations made through it.
pub struct UefiFirmware {
    /// Every live reservation; `place` only writes inside these.
    pub(crate) reservations: Vec<PageSpan>,
}

impl UefiFirmware {
    pub fn new() -> Self {
        Self {
            reservations: Vec::with_capacity(16),
        }
    }
}

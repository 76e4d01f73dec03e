//! # Handoff Descriptor Assembly
//!
//! The descriptor's pages are reserved while firmware is still running, so
//! that reservation shows up in the captured memory map. The record itself is
//! written after the exit, through [`PhysicalMemory::place`] only.

use crate::error::BootError;
use crate::firmware::{PhysicalMemory, RegionKind, Source};
use crate::gate::{FirmwareExited, MemoryInventory};
use crate::placer::write;
use kernel_info::boot::{FramebufferInfo, KernelBootInfo};
use kernel_memory_addresses::{PageSize, PageSpan, PhysicalAddress, Size4K};
use log::debug;

/// Reserved storage for the [`KernelBootInfo`] record.
#[derive(Debug)]
pub struct HandoffBlock {
    span: PageSpan,
}

impl HandoffBlock {
    /// Reserve pages for the record. Must happen before the gate.
    ///
    /// # Errors
    /// [`BootError::OutOfMemory`] if firmware has no pages left.
    pub fn reserve<M: PhysicalMemory>(memory: &mut M) -> Result<Self, BootError> {
        let pages = Size4K::pages_for(KernelBootInfo::SIZE as u64);
        let span = memory
            .reserve_any(pages, RegionKind::LoaderData)
            .map_err(|_| BootError::OutOfMemory)?;
        debug!("Handoff descriptor reserved at {span}");
        Ok(Self { span })
    }

    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        self.span.base()
    }

    /// Fill in the record and return its physical address.
    ///
    /// # Errors
    /// [`BootError::WriteRefused`] if the block is no longer writable.
    pub fn commit<M: PhysicalMemory>(
        self,
        memory: &mut M,
        fb: FramebufferInfo,
        inventory: &MemoryInventory,
        rsdp: Option<PhysicalAddress>,
        _exited: &FirmwareExited,
    ) -> Result<PhysicalAddress, BootError> {
        let info = KernelBootInfo::new(
            fb,
            inventory.to_info(),
            rsdp.map_or(0, PhysicalAddress::as_u64),
        );
        let bytes = info.encode();

        let base = self.span.base();
        write(memory, base, self.span.len(), Source::Zero)?;
        write(memory, base, bytes.len() as u64, Source::Bytes(&bytes))?;

        Ok(base)
    }
}

//! # Firmware Memory Map

use kernel_info::boot::MemoryMapInfo;
use kernel_info::memory::PAGE_SIZE;
use kernel_info::mmap::{CONVENTIONAL_MEMORY, MemoryMapRecords};
use log::{info, warn};

/// Log how many records the loader captured and how much memory is free.
#[allow(clippy::cast_possible_truncation)]
pub fn report(mmap: &MemoryMapInfo) {
    if mmap.mmap_ptr == 0 || mmap.mmap_desc_size == 0 {
        warn!("No memory map was handed over");
        return;
    }

    // SAFETY: the map lives in loader data pages that nobody reuses.
    let bytes = unsafe {
        core::slice::from_raw_parts(
            mmap.base().as_mut_ptr::<u8>().cast_const(),
            mmap.mmap_len as usize,
        )
    };
    let records = MemoryMapRecords::new(bytes, mmap.mmap_desc_size as usize);
    let count = records.len();

    let free_pages: u64 = records
        .filter(|r| r.kind() == Some(CONVENTIONAL_MEMORY))
        .filter_map(|r| r.page_count())
        .sum();

    info!(
        "Memory map: {count} records (v{}), {} MiB conventional",
        mmap.mmap_desc_version,
        free_pages * PAGE_SIZE / (1024 * 1024)
    );
}

//! # Loader Memory
//!
//! Two things live here: the global allocator backing `alloc` while boot
//! services run, and page reservations for the kernel, the memory map and
//! the handoff descriptor.

use crate::firmware::UefiFirmware;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_memory_addresses::{PageSpan, PhysicalAddress};
use uefi::boot::{self, AllocateType, MemoryType};
use uefi_handoff::FirmwareError;
use uefi_handoff::firmware::{PhysicalMemory, RegionKind, Source};

/// A UEFI Boot Services pool allocation to back Rust's global allocator.
///
/// # Notes
/// - Valid only while Boot Services are active. After [`UefiBootAllocator::retire`]
///   every allocation fails and frees are dropped on the floor.
/// - We always over-allocate to satisfy alignment and store the original pointer
///   just before the returned aligned block for correct deallocation.
pub struct UefiBootAllocator {
    retired: AtomicBool,
}

#[global_allocator]
static GLOBAL_ALLOC: UefiBootAllocator = UefiBootAllocator {
    retired: AtomicBool::new(false),
};

impl UefiBootAllocator {
    /// Stop calling into the pool allocator; boot services are gone.
    pub fn retire() {
        GLOBAL_ALLOC.retired.store(true, Ordering::SeqCst);
    }

    fn live(&self) -> bool {
        !self.retired.load(Ordering::SeqCst)
    }
}

unsafe impl GlobalAlloc for UefiBootAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !self.live() {
            return null_mut();
        }

        // At least one byte, plus a header for the pool pointer and alignment padding.
        let align = layout.align().max(size_of::<usize>());
        let size = layout.size().max(1);
        let Some(total) = size
            .checked_add(align)
            .and_then(|v| v.checked_add(size_of::<usize>()))
        else {
            return null_mut();
        };

        let Ok(raw) = boot::allocate_pool(MemoryType::LOADER_DATA, total) else {
            return null_mut();
        };

        let raw_ptr = raw.as_ptr();
        let addr = raw_ptr as usize + size_of::<usize>();
        let aligned = (addr + (align - 1)) & !(align - 1);
        let header_ptr = (aligned - size_of::<usize>()) as *mut usize;

        // Store the original allocation pointer just before the aligned region
        unsafe {
            ptr::write(header_ptr, raw_ptr as usize);
        }
        aligned as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if ptr.is_null() || !self.live() {
            return;
        }

        // Recover the original pool pointer from the header we stored in alloc()
        let header_ptr = (ptr as usize - size_of::<usize>()) as *mut usize;
        let orig_ptr = unsafe { ptr::read(header_ptr) as *mut u8 };

        // SAFETY: `orig_ptr` was returned by `allocate_pool` and stored by us.
        let _ = unsafe { boot::free_pool(NonNull::new_unchecked(orig_ptr)) };
    }
}

const fn memory_type(kind: RegionKind) -> MemoryType {
    match kind {
        RegionKind::LoaderCode => MemoryType::LOADER_CODE,
        RegionKind::LoaderData => MemoryType::LOADER_DATA,
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn page_count(span: PageSpan) -> usize {
    span.pages() as usize
}

impl PhysicalMemory for UefiFirmware {
    fn reserve_at(&mut self, span: PageSpan, kind: RegionKind) -> Result<(), FirmwareError> {
        let got = boot::allocate_pages(
            AllocateType::Address(span.base().as_u64()),
            memory_type(kind),
            page_count(span),
        )?;
        debug_assert_eq!(PhysicalAddress::from_nonnull(got), span.base());
        self.reservations.push(span);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn reserve_any(&mut self, pages: u64, kind: RegionKind) -> Result<PageSpan, FirmwareError> {
        let got = boot::allocate_pages(AllocateType::AnyPages, memory_type(kind), pages as usize)?;
        let span = PageSpan::new(PhysicalAddress::from_nonnull(got), pages)
            .ok_or(FirmwareError::InvalidParameter)?;
        self.reservations.push(span);
        Ok(span)
    }

    fn release(&mut self, span: PageSpan) -> Result<(), FirmwareError> {
        let Some(pos) = self.reservations.iter().position(|r| *r == span) else {
            return Err(FirmwareError::InvalidParameter);
        };
        let ptr = NonNull::new(span.base().as_mut_ptr::<u8>())
            .ok_or(FirmwareError::InvalidParameter)?;
        // SAFETY: the span came from allocate_pages and is not referenced anymore.
        unsafe { boot::free_pages(ptr, page_count(span)) }?;
        self.reservations.swap_remove(pos);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn place(
        &mut self,
        at: PhysicalAddress,
        len: u64,
        source: Source<'_>,
    ) -> Result<(), FirmwareError> {
        if !self.reservations.iter().any(|r| r.contains_range(at, len)) {
            return Err(FirmwareError::InvalidParameter);
        }

        let dst = at.as_mut_ptr::<u8>();
        let len = len as usize;
        // SAFETY: memory is identity mapped and the range lies in one of our
        // own reservations.
        unsafe {
            match source {
                Source::Bytes(src) if src.len() == len => {
                    ptr::copy_nonoverlapping(src.as_ptr(), dst, len);
                }
                Source::Bytes(_) => return Err(FirmwareError::InvalidParameter),
                Source::Zero => ptr::write_bytes(dst, 0, len),
            }
        }
        Ok(())
    }
}

//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses a boot loader juggles
//! while firmware still owns the machine.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A CPU physical address (RAM or MMIO). |
//! | [`VirtualAddress`] | An address as named by an executable image. |
//! | [`PageSpan`] | A run of whole 4 KiB pages at a page-aligned physical base. |
//!
//! Page sizes are marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, the firmware allocation granule
//! - [`Size2M`]: 2 MiB huge pages
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! // A segment that wants to live at 0x10_0400 and spans 0x2000 bytes
//! let target = PhysicalAddress::new(0x10_0400);
//! let span = PageSpan::covering(target, 0x2000, Size4K::SIZE).unwrap();
//!
//! assert!(span.base().is_aligned::<Size4K>());
//! assert!(span.contains_range(target, 0x2000));
//! assert_eq!(span.pages(), 3);
//! ```
//!
//! ## Design Notes
//!
//! - The address types are `#[repr(transparent)]` over `u64` and are
//!   `Copy`, `Eq`, `Ord` and `Hash`.
//! - All arithmetic that can overflow is exposed as `checked_*` and returns
//!   `Option`; spans that would wrap the address space cannot be built.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod page_span;
mod physical_address;
mod virtual_address;

pub use page_size::{PageSize, Size2M, Size4K};
pub use page_span::PageSpan;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        let a = PhysicalAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u64(), 0x12000);
        assert_eq!(a.page_offset::<Size4K>(), 0x345);
        assert!(!a.is_aligned::<Size4K>());
        assert!(PhysicalAddress::new(0x20_0000).is_aligned::<Size2M>());
    }

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(Size4K::pages_for(0), 0);
        assert_eq!(Size4K::pages_for(1), 1);
        assert_eq!(Size4K::pages_for(4096), 1);
        assert_eq!(Size4K::pages_for(4097), 2);
    }

    #[test]
    fn covering_aligned_target() {
        let span = PageSpan::covering(PhysicalAddress::new(0x10_0000), 4096, 0).unwrap();
        assert_eq!(span.base().as_u64(), 0x10_0000);
        assert_eq!(span.pages(), 1);
        assert_eq!(span.end().as_u64(), 0x10_1000);
    }

    #[test]
    fn covering_unaligned_target_includes_lead() {
        // 0xF00 lead bytes + 0x200 bytes crosses into a second page.
        let target = PhysicalAddress::new(0x20_0F00);
        let span = PageSpan::covering(target, 0x200, 1).unwrap();
        assert_eq!(span.base().as_u64(), 0x20_0000);
        assert_eq!(span.pages(), 2);
        assert!(span.contains_range(target, 0x200));
    }

    #[test]
    fn covering_honors_larger_alignment() {
        let target = PhysicalAddress::new(0x30_1000);
        let span = PageSpan::covering(target, 0x1000, Size2M::SIZE).unwrap();
        assert_eq!(span.base().as_u64(), 0x20_0000);
        assert_eq!(span.len(), 0x10_2000);
        assert!(span.contains_range(target, 0x1000));
    }

    #[test]
    fn covering_non_power_of_two_alignment_falls_back_to_pages() {
        let span = PageSpan::covering(PhysicalAddress::new(0x10_0010), 16, 3000).unwrap();
        assert_eq!(span.base().as_u64(), 0x10_0000);
        assert_eq!(span.pages(), 1);
    }

    #[test]
    fn spans_cannot_wrap() {
        assert!(PageSpan::new(PhysicalAddress::new(u64::MAX & !0xFFF), 2).is_none());
        assert!(PageSpan::new(PhysicalAddress::new(0x1001), 1).is_none());
    }

    #[test]
    fn overlap_detection() {
        let a = PageSpan::new(PhysicalAddress::new(0x1000), 2).unwrap();
        let b = PageSpan::new(PhysicalAddress::new(0x2000), 1).unwrap();
        let c = PageSpan::new(PhysicalAddress::new(0x3000), 1).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.contains_range(PhysicalAddress::new(0x2800), 0x1000));
    }

    #[test]
    fn virtual_identity_conversion() {
        let va = VirtualAddress::new(0x10_0000);
        assert_eq!(va.identity(), PhysicalAddress::new(0x10_0000));
    }
}

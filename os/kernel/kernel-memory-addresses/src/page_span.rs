use crate::{PageSize, PhysicalAddress, Size4K};
use core::fmt;

/// A run of whole 4 KiB pages starting at a page-aligned physical address.
///
/// This is the unit in which firmware hands out memory: every reservation
/// the loader makes, fixed-address or not, is a `PageSpan`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageSpan {
    base: PhysicalAddress,
    pages: u64,
}

impl PageSpan {
    /// Creates a span from an already aligned base.
    ///
    /// Returns `None` if `base` is not 4 KiB aligned or the span would wrap
    /// around the address space.
    #[must_use]
    pub fn new(base: PhysicalAddress, pages: u64) -> Option<Self> {
        if !base.is_aligned::<Size4K>() {
            return None;
        }
        let len = pages.checked_mul(Size4K::SIZE)?;
        base.checked_add(len)?;
        Some(Self { base, pages })
    }

    /// The smallest span whose start is `target` rounded down to `align` and
    /// that contains `[target, target + len)`.
    ///
    /// `align` is raised to at least 4 KiB; non-power-of-two values are
    /// treated as 4 KiB.
    ///
    /// ```rust
    /// # use kernel_memory_addresses::*;
    /// let span = PageSpan::covering(PhysicalAddress::new(0x10_0800), 0x1000, 0).unwrap();
    /// assert_eq!(span.base().as_u64(), 0x10_0000);
    /// assert_eq!(span.pages(), 2);
    /// ```
    #[must_use]
    pub fn covering(target: PhysicalAddress, len: u64, align: u64) -> Option<Self> {
        let align = if align.is_power_of_two() {
            align.max(Size4K::SIZE)
        } else {
            Size4K::SIZE
        };
        let base = target.align_down_to(align);
        let lead = target.checked_offset_from(base)?;
        let bytes = lead.checked_add(len)?;
        Self::new(base, Size4K::pages_for(bytes))
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    /// Length of the span in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.pages * Size4K::SIZE
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pages == 0
    }

    /// One past the last byte of the span.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + self.len())
    }

    /// Whether `[start, start + len)` lies entirely within this span.
    #[must_use]
    pub fn contains_range(&self, start: PhysicalAddress, len: u64) -> bool {
        let Some(end) = start.checked_add(len) else {
            return false;
        };
        start >= self.base && end <= self.end()
    }

    /// Whether the two spans share at least one byte.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

impl fmt::Debug for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageSpan({}+{}p)", self.base, self.pages)
    }
}

impl fmt::Display for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} ({} pages)", self.base, self.end(), self.pages)
    }
}

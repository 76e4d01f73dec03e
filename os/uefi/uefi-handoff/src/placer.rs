//! # Segment Placement
//!
//! Every `PT_LOAD` segment is copied to the physical address the image asks
//! for. The reservation is fixed-address: if firmware cannot hand out that
//! exact range the boot fails, there is no relocation.

use crate::elf::{ElfImage, ImageError, SegmentDescriptor};
use crate::error::BootError;
use crate::firmware::{PhysicalMemory, RegionKind, Source};
use alloc::vec::Vec;
use kernel_memory_addresses::{PageSpan, PhysicalAddress};
use log::{debug, info};

/// How far below a segment's target its reservation may start.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum SegmentAlignment {
    /// Round the target down to a 4 KiB page, whatever `p_align` says.
    #[default]
    PageGranular,
    /// Round down to `p_align` when it is a power of two above 4 KiB.
    HonorDeclared,
}

/// Where a segment ended up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Index in the program header table.
    pub index: usize,
    pub target: PhysicalAddress,
    pub span: PageSpan,
    pub file_size: u64,
    pub mem_size: u64,
}

/// The page span reserved for `segment`: page-aligned start at or below the
/// target, whole pages, covering `[target, target + p_memsz)`.
#[must_use]
pub fn reservation_span(
    segment: &SegmentDescriptor,
    alignment: SegmentAlignment,
) -> Option<PageSpan> {
    let align = match alignment {
        SegmentAlignment::PageGranular => 0,
        SegmentAlignment::HonorDeclared => segment.align,
    };
    PageSpan::covering(segment.physical_target(), segment.memsz, align)
}

/// Reserve, zero and fill every loadable segment, in header order.
///
/// # Errors
/// [`BootError::PlacementConflict`] if a fixed-address reservation fails;
/// [`BootError::InvalidImage`] for segments whose range overflows.
pub fn place_segments<M: PhysicalMemory>(
    memory: &mut M,
    image: &ElfImage,
    bytes: &[u8],
    alignment: SegmentAlignment,
) -> Result<Vec<Placement>, BootError> {
    let mut placements = Vec::new();

    for (index, seg) in image.loadable() {
        if seg.memsz == 0 {
            debug!("Skipping empty segment {index}");
            continue;
        }

        let target = seg.physical_target();
        let span = reservation_span(seg, alignment)
            .ok_or(ImageError::SegmentAddressOverflow { index })?;

        let kind = if seg.flags.execute() {
            RegionKind::LoaderCode
        } else {
            RegionKind::LoaderData
        };

        memory
            .reserve_at(span, kind)
            .map_err(|source| BootError::PlacementConflict {
                target,
                base: span.base(),
                pages: span.pages(),
                source,
            })?;

        // Whole span first; then the payload; then the tail again, since an
        // unaligned target shares its first page with whatever lies below it.
        write(memory, span.base(), span.len(), Source::Zero)?;

        let file = file_bytes(seg, index, bytes)?;
        if !file.is_empty() {
            write(memory, target, seg.filesz, Source::Bytes(file))?;
        }

        let tail = seg.memsz - seg.filesz;
        if tail != 0 {
            let tail_start = target
                .checked_add(seg.filesz)
                .ok_or(ImageError::SegmentAddressOverflow { index })?;
            write(memory, tail_start, tail, Source::Zero)?;
        }

        info!(
            "Loaded segment {index}: paddr={target} memsz={:#x} filesz={:#x} span={span}",
            seg.memsz, seg.filesz
        );

        placements.push(Placement {
            index,
            target,
            span,
            file_size: seg.filesz,
            mem_size: seg.memsz,
        });
    }

    Ok(placements)
}

fn file_bytes<'a>(
    seg: &SegmentDescriptor,
    index: usize,
    bytes: &'a [u8],
) -> Result<&'a [u8], ImageError> {
    let out_of_bounds = ImageError::SegmentOutOfBounds { index };
    let start = usize::try_from(seg.offset).map_err(|_| out_of_bounds)?;
    let len = usize::try_from(seg.filesz).map_err(|_| out_of_bounds)?;
    let end = start.checked_add(len).ok_or(out_of_bounds)?;
    bytes.get(start..end).ok_or(out_of_bounds)
}

pub(crate) fn write<M: PhysicalMemory>(
    memory: &mut M,
    at: PhysicalAddress,
    len: u64,
    source: Source<'_>,
) -> Result<(), BootError> {
    memory
        .place(at, len, source)
        .map_err(|source| BootError::WriteRefused { at, len, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirmwareError;
    use crate::testing::{ElfBuilder, Phdr, SimFirmware};
    use kernel_memory_addresses::{PageSize, Size4K};

    fn place(
        fw: &mut SimFirmware,
        image: &[u8],
        alignment: SegmentAlignment,
    ) -> Result<Vec<Placement>, BootError> {
        let parsed = ElfImage::parse(image).unwrap();
        place_segments(fw, &parsed, image, alignment)
    }

    #[test]
    fn code_and_zero_initialized_segments() {
        let text: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        let image = ElfBuilder::new(0x10_0000)
            .segment(Phdr::load(0x10_0000, text.clone()).flags(0b101))
            .segment(Phdr::bss(0x20_0000, 16384).flags(0b110))
            .build();

        let mut fw = SimFirmware::new();
        let placements = place(&mut fw, &image, SegmentAlignment::PageGranular).unwrap();

        assert_eq!(placements.len(), 2);
        assert_eq!(fw.read(PhysicalAddress::new(0x10_0000), 4096), text);
        assert!(
            fw.read(PhysicalAddress::new(0x20_0000), 16384)
                .iter()
                .all(|&b| b == 0)
        );
        assert_eq!(
            fw.region_kind(PhysicalAddress::new(0x10_0000)),
            Some(RegionKind::LoaderCode)
        );
        assert_eq!(
            fw.region_kind(PhysicalAddress::new(0x20_0000)),
            Some(RegionKind::LoaderData)
        );
    }

    #[test]
    fn spans_are_page_aligned_and_cover_the_segment() {
        let image = ElfBuilder::new(0)
            .segment(Phdr::load(0x10_0123, vec![0xAB; 100]).memsz(0x1F00))
            .segment(Phdr::load(0x30_0FF0, vec![0xCD; 0x20]))
            .build();

        let mut fw = SimFirmware::new();
        let placements = place(&mut fw, &image, SegmentAlignment::PageGranular).unwrap();

        for p in &placements {
            assert!(p.span.base().is_aligned::<Size4K>());
            assert_eq!(p.span.len() % Size4K::SIZE, 0);
            assert!(p.span.contains_range(p.target, p.mem_size));
        }
        assert_eq!(placements[0].span.base().as_u64(), 0x10_0000);
        assert_eq!(placements[0].span.pages(), 3);
        assert_eq!(placements[1].span.pages(), 2);
    }

    #[test]
    fn unaligned_target_gets_payload_then_zero_tail() {
        let image = ElfBuilder::new(0)
            .segment(Phdr::load(0x10_0800, vec![0x5A; 0x100]).memsz(0x300))
            .build();

        let mut fw = SimFirmware::new();
        place(&mut fw, &image, SegmentAlignment::PageGranular).unwrap();

        // Lead-in below the target is zeroed, not left as firmware garbage.
        assert!(fw.read(PhysicalAddress::new(0x10_0000), 0x800).iter().all(|&b| b == 0));
        assert!(fw.read(PhysicalAddress::new(0x10_0800), 0x100).iter().all(|&b| b == 0x5A));
        assert!(fw.read(PhysicalAddress::new(0x10_0900), 0x200).iter().all(|&b| b == 0));
    }

    #[test]
    fn non_loadable_and_empty_segments_are_skipped() {
        let image = ElfBuilder::new(0)
            .segment(Phdr::other(4))
            .segment(Phdr::bss(0x10_0000, 0))
            .segment(Phdr::load(0x20_0000, vec![1; 16]))
            .build();

        let mut fw = SimFirmware::new();
        let placements = place(&mut fw, &image, SegmentAlignment::PageGranular).unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].index, 2);
        assert_eq!(fw.fixed_reservations(), 1);
    }

    #[test]
    fn occupied_range_is_a_placement_conflict() {
        let image = ElfBuilder::new(0)
            .segment(Phdr::load(0x10_0000, vec![1; 16]))
            .build();

        let mut fw = SimFirmware::new();
        fw.occupy(PhysicalAddress::new(0x10_0000), 1);

        let err = place(&mut fw, &image, SegmentAlignment::PageGranular).unwrap_err();
        assert_eq!(
            err,
            BootError::PlacementConflict {
                target: PhysicalAddress::new(0x10_0000),
                base: PhysicalAddress::new(0x10_0000),
                pages: 1,
                source: FirmwareError::NotFound,
            }
        );
    }

    #[test]
    fn declared_alignment_policy() {
        let image = ElfBuilder::new(0)
            .segment(Phdr::load(0x20_1000, vec![1; 16]).align(0x20_0000))
            .build();
        let seg = ElfImage::parse(&image).unwrap().segments[0];

        let page = reservation_span(&seg, SegmentAlignment::PageGranular).unwrap();
        assert_eq!(page.base().as_u64(), 0x20_1000);
        assert_eq!(page.pages(), 1);

        let declared = reservation_span(&seg, SegmentAlignment::HonorDeclared).unwrap();
        assert_eq!(declared.base().as_u64(), 0x20_0000);
        assert_eq!(declared.pages(), 2);
    }

    #[test]
    fn placement_is_deterministic() {
        let image = ElfBuilder::new(0)
            .segment(Phdr::load(0x10_0000, vec![3; 5000]))
            .segment(Phdr::bss(0x40_0000, 100))
            .build();

        let mut a = SimFirmware::new();
        let mut b = SimFirmware::new();
        assert_eq!(
            place(&mut a, &image, SegmentAlignment::PageGranular).unwrap(),
            place(&mut b, &image, SegmentAlignment::PageGranular).unwrap()
        );
        assert_eq!(
            a.read(PhysicalAddress::new(0x10_0000), 8192),
            b.read(PhysicalAddress::new(0x10_0000), 8192)
        );
    }
}

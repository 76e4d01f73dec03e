//! # ELF Header Parsing
//!
//! Decodes the ELF64 file header and program header table of the kernel
//! image. All fields are read as little-endian integers from the byte blob,
//! so the image buffer needs no particular alignment.

use alloc::vec::Vec;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

const EI_MAGIC_BYTES: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const EM_X86_64: u16 = 62;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

const PT_LOAD: u32 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("The image is smaller than an ELF64 header")]
    TooShort,
    #[error("The image does not start with the ELF magic")]
    BadMagic,
    #[error("Only little-endian ELF64 version 1 images are supported")]
    UnsupportedClass,
    #[error("The image targets machine {0}, not x86-64")]
    UnsupportedMachine(u16),
    #[error("Program headers are {0} bytes, expected 56")]
    BadProgramHeaderSize(u16),
    #[error("The program header table lies outside the image")]
    ProgramHeaderTableOutOfBounds,
    #[error("Segment {index} references file bytes outside the image")]
    SegmentOutOfBounds { index: usize },
    #[error("Segment {index} has a file size larger than its memory size")]
    FileSizeExceedsMemSize { index: usize },
    #[error("Segment {index} extends past the end of the physical address space")]
    SegmentAddressOverflow { index: usize },
}

/// Bitfield wrapper for `Elf64_Phdr.p_flags` (32-bit)
///
/// Layout (LSB→MSB):
/// - bit 0: execute
/// - bit 1: write
/// - bit 2: read
/// - bits 3..31: reserved (must be zero for standard flags)
#[bitfield_struct::bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool,
    #[bits(1)]
    pub write: bool,
    #[bits(1)]
    pub read: bool,
    #[bits(29)]
    __: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    Load,
    /// Anything but `PT_LOAD`; carries the raw `p_type`.
    Other(u32),
}

/// One program header, as the placer needs it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub kind: SegmentKind,
    pub flags: PFlags,
    pub offset: u64,
    pub vaddr: VirtualAddress,
    pub paddr: PhysicalAddress,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl SegmentDescriptor {
    #[must_use]
    pub const fn is_loadable(&self) -> bool {
        matches!(self.kind, SegmentKind::Load)
    }

    /// `p_paddr` if the image sets one, else `p_vaddr`. No relocation.
    #[must_use]
    pub const fn physical_target(&self) -> PhysicalAddress {
        if self.paddr.is_null() {
            self.vaddr.identity()
        } else {
            self.paddr
        }
    }
}

/// Parsed header view of a kernel image. The bytes stay with the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfImage {
    pub entry: VirtualAddress,
    /// All program headers, in table order.
    pub segments: Vec<SegmentDescriptor>,
}

impl ElfImage {
    /// Parse a 64-bit little-endian x86-64 ELF image.
    ///
    /// Loadable segments are checked to reference only bytes inside
    /// `bytes` and to have `p_filesz <= p_memsz`.
    ///
    /// # Errors
    /// Any validation or bounds failure, as [`ImageError`].
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < EHDR_SIZE {
            return Err(ImageError::TooShort);
        }

        let ident = &bytes[..16];
        if ident[0..4] != EI_MAGIC_BYTES {
            return Err(ImageError::BadMagic);
        }
        if ident[4] != ELFCLASS64 || ident[5] != ELFDATA2LSB || ident[6] != EV_CURRENT {
            return Err(ImageError::UnsupportedClass);
        }

        let machine = le_u16(bytes, 18);
        if machine != EM_X86_64 {
            return Err(ImageError::UnsupportedMachine(machine));
        }

        let entry = VirtualAddress::new(le_u64(bytes, 24));
        let phoff = le_u64(bytes, 32);
        let phentsize = le_u16(bytes, 54);
        let phnum = usize::from(le_u16(bytes, 56));

        if usize::from(phentsize) != PHDR_SIZE {
            // An empty table may leave the entry size at zero.
            if phnum != 0 {
                return Err(ImageError::BadProgramHeaderSize(phentsize));
            }
        }

        let phoff =
            usize::try_from(phoff).map_err(|_| ImageError::ProgramHeaderTableOutOfBounds)?;
        let end = PHDR_SIZE
            .checked_mul(phnum)
            .and_then(|size| phoff.checked_add(size))
            .ok_or(ImageError::ProgramHeaderTableOutOfBounds)?;
        if end > bytes.len() {
            return Err(ImageError::ProgramHeaderTableOutOfBounds);
        }

        let mut segments = Vec::with_capacity(phnum);
        for index in 0..phnum {
            let ph = &bytes[phoff + index * PHDR_SIZE..][..PHDR_SIZE];
            let p_type = le_u32(ph, 0);
            let segment = SegmentDescriptor {
                kind: if p_type == PT_LOAD {
                    SegmentKind::Load
                } else {
                    SegmentKind::Other(p_type)
                },
                flags: PFlags::from_bits(le_u32(ph, 4)),
                offset: le_u64(ph, 8),
                vaddr: VirtualAddress::new(le_u64(ph, 16)),
                paddr: PhysicalAddress::new(le_u64(ph, 24)),
                filesz: le_u64(ph, 32),
                memsz: le_u64(ph, 40),
                align: le_u64(ph, 48),
            };

            if segment.is_loadable() {
                validate_loadable(&segment, index, bytes.len())?;
            }
            segments.push(segment);
        }

        Ok(Self { entry, segments })
    }

    pub fn loadable(&self) -> impl Iterator<Item = (usize, &SegmentDescriptor)> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_loadable())
    }
}

fn validate_loadable(
    segment: &SegmentDescriptor,
    index: usize,
    image_len: usize,
) -> Result<(), ImageError> {
    if segment.filesz > segment.memsz {
        return Err(ImageError::FileSizeExceedsMemSize { index });
    }
    let end = segment
        .offset
        .checked_add(segment.filesz)
        .ok_or(ImageError::SegmentOutOfBounds { index })?;
    if end > image_len as u64 {
        return Err(ImageError::SegmentOutOfBounds { index });
    }
    Ok(())
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

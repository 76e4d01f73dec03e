//! # Kernel Boot Information
//!
//! The one structure the loader hands to the kernel. Its byte layout is the
//! load-time ABI between the two programs and is pinned below, field by
//! field; [`KernelBootInfo::encode`] and [`KernelBootInfo::decode`] are the
//! only sanctioned ways across the boundary.

use kernel_memory_addresses::PhysicalAddress;

/// Kernel function pointer.
///
/// # ABI
/// The ABI is defined as `win64` since the kernel is called from a UEFI
/// (PE/COFF) application. The single argument is the **physical** address of
/// the encoded [`KernelBootInfo`].
#[cfg(target_arch = "x86_64")]
pub type KernelEntryFn = extern "win64" fn(*const KernelBootInfo) -> !;

/// `"SFBI"` in little-endian byte order.
pub const BOOT_INFO_MAGIC: u32 = u32::from_le_bytes(*b"SFBI");

/// Bumped whenever the layout below changes.
pub const BOOT_INFO_VERSION: u32 = 1;

/// Information the kernel needs right after `ExitBootServices`.
///
/// Keep this `#[repr(C)]`, fixed-width and free of implicit padding.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelBootInfo {
    /// Always [`BOOT_INFO_MAGIC`].
    pub magic: u32,

    /// Always [`BOOT_INFO_VERSION`] for this layout.
    pub version: u32,

    /// Framebuffer information, passed from UEFI GOP.
    pub fb: FramebufferInfo,

    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// RSDP (ACPI) physical address, or 0 if not provided.
    pub rsdp_addr: u64,
}

#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramebufferInfo {
    /// Linear framebuffer base address (CPU physical address).
    /// Valid to write after `ExitBootServices`.
    pub framebuffer_ptr: u64,

    /// Visible width in **pixels**.
    pub framebuffer_width: u32,

    /// Visible height in **pixels**.
    pub framebuffer_height: u32,

    /// **Bytes** per scanline. May exceed `width * bpp / 8` due to padding.
    pub framebuffer_pitch: u32,

    /// Bits per pixel.
    pub framebuffer_bpp: u32,

    /// Pixel channel order.
    pub framebuffer_format: BootPixelFormat,

    pub reserved: u32,
}

#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryMapInfo {
    /// Physical address of the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes. Use this as the stride, never `size_of`.
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI). Kernel can check it matches expectations.
    pub mmap_desc_version: u32,

    pub reserved: u32,
}

/// Pixel format tag compatible with UEFI GOP.
/// We avoid Rust enums with payloads across the ABI boundary.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BootPixelFormat {
    /// 8:8:8 stored as R,G,B in low-to-high bytes.
    Rgb = 0,
    /// 8:8:8 stored as B,G,R in low-to-high bytes.
    Bgr = 1,
    /// Channel layout described by firmware bit masks that match neither of the above.
    Bitmask = 2,
}

impl TryFrom<u32> for BootPixelFormat {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Rgb),
            1 => Ok(Self::Bgr),
            2 => Ok(Self::Bitmask),
            other => Err(DecodeError::UnknownPixelFormat(other)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error(
        "The boot info block is {0} bytes, expected at least {size}",
        size = KernelBootInfo::SIZE
    )]
    Truncated(usize),
    #[error("The boot info magic {0:#010x} is invalid")]
    BadMagic(u32),
    #[error("The boot info version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("The pixel format tag {0} is unknown")]
    UnknownPixelFormat(u32),
}

impl KernelBootInfo {
    /// Encoded size in bytes.
    pub const SIZE: usize = 80;

    #[must_use]
    pub const fn new(fb: FramebufferInfo, mmap: MemoryMapInfo, rsdp_addr: u64) -> Self {
        Self {
            magic: BOOT_INFO_MAGIC,
            version: BOOT_INFO_VERSION,
            fb,
            mmap,
            rsdp_addr,
        }
    }

    /// Serialize into the exact in-memory layout of the `#[repr(C)]` struct.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = Writer {
            buf: &mut out,
            at: 0,
        };
        w.u32(self.magic);
        w.u32(self.version);
        w.u64(self.fb.framebuffer_ptr);
        w.u32(self.fb.framebuffer_width);
        w.u32(self.fb.framebuffer_height);
        w.u32(self.fb.framebuffer_pitch);
        w.u32(self.fb.framebuffer_bpp);
        w.u32(self.fb.framebuffer_format as u32);
        w.u32(self.fb.reserved);
        w.u64(self.mmap.mmap_ptr);
        w.u64(self.mmap.mmap_len);
        w.u64(self.mmap.mmap_desc_size);
        w.u32(self.mmap.mmap_desc_version);
        w.u32(self.mmap.reserved);
        w.u64(self.rsdp_addr);
        debug_assert_eq!(w.at, Self::SIZE);
        out
    }

    /// Parse and validate an encoded block.
    ///
    /// # Errors
    /// Fails on short input, a wrong magic, an unknown version or an unknown
    /// pixel format tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < Self::SIZE {
            return Err(DecodeError::Truncated(bytes.len()));
        }

        let mut r = Reader { buf: bytes, at: 0 };
        let magic = r.u32();
        if magic != BOOT_INFO_MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let version = r.u32();
        if version != BOOT_INFO_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let fb = FramebufferInfo {
            framebuffer_ptr: r.u64(),
            framebuffer_width: r.u32(),
            framebuffer_height: r.u32(),
            framebuffer_pitch: r.u32(),
            framebuffer_bpp: r.u32(),
            framebuffer_format: BootPixelFormat::try_from(r.u32())?,
            reserved: r.u32(),
        };
        let mmap = MemoryMapInfo {
            mmap_ptr: r.u64(),
            mmap_len: r.u64(),
            mmap_desc_size: r.u64(),
            mmap_desc_version: r.u32(),
            reserved: r.u32(),
        };
        let rsdp_addr = r.u64();

        Ok(Self {
            magic,
            version,
            fb,
            mmap,
            rsdp_addr,
        })
    }
}

impl FramebufferInfo {
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.framebuffer_ptr)
    }

    /// Bytes covered by the visible rows.
    #[must_use]
    pub const fn visible_len(&self) -> u64 {
        self.framebuffer_pitch as u64 * self.framebuffer_height as u64
    }
}

impl MemoryMapInfo {
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.mmap_ptr)
    }

    /// Number of descriptors in the map.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        if self.mmap_desc_size == 0 {
            0
        } else {
            self.mmap_len / self.mmap_desc_size
        }
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl Writer<'_> {
    fn u32(&mut self, v: u32) {
        self.buf[self.at..self.at + 4].copy_from_slice(&v.to_le_bytes());
        self.at += 4;
    }

    fn u64(&mut self, v: u64) {
        self.buf[self.at..self.at + 8].copy_from_slice(&v.to_le_bytes());
        self.at += 8;
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl Reader<'_> {
    fn u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.at..self.at + 4]);
        self.at += 4;
        u32::from_le_bytes(raw)
    }

    fn u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.at..self.at + 8]);
        self.at += 8;
        u64::from_le_bytes(raw)
    }
}

// The encoder above writes fields in declaration order; these pin the
// struct to the same offsets so a pointer cast on the kernel side agrees.
const _: () = {
    use core::mem::offset_of;
    assert!(size_of::<KernelBootInfo>() == KernelBootInfo::SIZE);
    assert!(size_of::<FramebufferInfo>() == 32);
    assert!(size_of::<MemoryMapInfo>() == 32);
    assert!(offset_of!(KernelBootInfo, fb) == 8);
    assert!(offset_of!(KernelBootInfo, mmap) == 40);
    assert!(offset_of!(KernelBootInfo, rsdp_addr) == 72);
    assert!(offset_of!(FramebufferInfo, framebuffer_pitch) == 16);
    assert!(offset_of!(FramebufferInfo, framebuffer_format) == 24);
    assert!(offset_of!(MemoryMapInfo, mmap_desc_version) == 24);
};

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KernelBootInfo {
        KernelBootInfo::new(
            FramebufferInfo {
                framebuffer_ptr: 0x8000_0000,
                framebuffer_width: 1280,
                framebuffer_height: 800,
                framebuffer_pitch: 1280 * 4,
                framebuffer_bpp: 32,
                framebuffer_format: BootPixelFormat::Bgr,
                reserved: 0,
            },
            MemoryMapInfo {
                mmap_ptr: 0x7F00_0000,
                mmap_len: 48 * 40,
                mmap_desc_size: 48,
                mmap_desc_version: 1,
                reserved: 0,
            },
            0x7FF7_E014,
        )
    }

    #[test]
    fn encoding_places_fields_at_pinned_offsets() {
        let bytes = sample().encode();
        assert_eq!(&bytes[0..4], b"SFBI");
        assert_eq!(bytes[4], 1);
        assert_eq!(bytes[8..16], 0x8000_0000u64.to_le_bytes());
        assert_eq!(bytes[16..20], 1280u32.to_le_bytes());
        assert_eq!(bytes[20..24], 800u32.to_le_bytes());
        assert_eq!(bytes[24..28], 5120u32.to_le_bytes());
        assert_eq!(bytes[28..32], 32u32.to_le_bytes());
        assert_eq!(bytes[32..36], 1u32.to_le_bytes());
        assert_eq!(bytes[40..48], 0x7F00_0000u64.to_le_bytes());
        assert_eq!(bytes[48..56], 1920u64.to_le_bytes());
        assert_eq!(bytes[56..64], 48u64.to_le_bytes());
        assert_eq!(bytes[64..68], 1u32.to_le_bytes());
        assert_eq!(bytes[72..80], 0x7FF7_E014u64.to_le_bytes());
    }

    #[test]
    fn decode_reverses_encode() {
        let info = sample();
        assert_eq!(KernelBootInfo::decode(&info.encode()), Ok(info));
    }

    #[test]
    fn decode_rejects_foreign_blocks() {
        let mut bytes = sample().encode();
        assert_eq!(
            KernelBootInfo::decode(&bytes[..40]),
            Err(DecodeError::Truncated(40))
        );

        bytes[32] = 7;
        assert_eq!(
            KernelBootInfo::decode(&bytes),
            Err(DecodeError::UnknownPixelFormat(7))
        );

        bytes[4] = 2;
        assert_eq!(
            KernelBootInfo::decode(&bytes),
            Err(DecodeError::UnsupportedVersion(2))
        );

        bytes[0] = 0;
        assert!(matches!(
            KernelBootInfo::decode(&bytes),
            Err(DecodeError::BadMagic(_))
        ));
    }

    #[test]
    fn record_count_uses_stride() {
        let info = sample();
        assert_eq!(info.mmap.record_count(), 40);
        assert_eq!(info.fb.visible_len(), 5120 * 800);
    }
}

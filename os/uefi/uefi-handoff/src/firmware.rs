//! # Firmware Services
//!
//! The boot sequence is written against these traits rather than against
//! UEFI directly. The UEFI loader implements them over boot services; the
//! tests implement them over simulated RAM.
//!
//! [`PhysicalMemory::place`] is the single capability that writes to raw
//! physical memory. Header parsing, alignment arithmetic and the exit retry
//! logic never see a pointer.

use crate::error::FirmwareError;
use kernel_memory_addresses::{PageSpan, PhysicalAddress};

/// An open, read-only file on the boot volume.
pub trait VolumeFile {
    /// File size in bytes, from the file's metadata.
    ///
    /// # Errors
    /// Any firmware failure.
    fn size(&mut self) -> Result<u64, FirmwareError>;

    /// Read from the start of the file into `buf`; returns the bytes read.
    ///
    /// # Errors
    /// Any firmware failure.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FirmwareError>;
}

/// The volume the loader itself was started from.
pub trait BootVolume {
    type File: VolumeFile;

    /// Open `path` (backslash separated, rooted) for reading.
    ///
    /// # Errors
    /// [`FirmwareError::NotFound`] if there is no such file.
    fn open(&mut self, path: &str) -> Result<Self::File, FirmwareError>;
}

/// Channel layout of the active graphics mode as firmware reports it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FirmwarePixelFormat {
    Rgb,
    Bgr,
    Bitmask {
        red: u32,
        green: u32,
        blue: u32,
        reserved: u32,
    },
    /// No linear framebuffer; only block transfers.
    BltOnly,
}

/// The currently active graphics mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub framebuffer_base: PhysicalAddress,
    pub framebuffer_size: usize,
    pub width: usize,
    pub height: usize,
    pub pixels_per_scanline: usize,
    pub pixel_format: FirmwarePixelFormat,
}

pub trait DisplayService {
    /// The mode firmware has already set, if any. Never changes the mode.
    ///
    /// # Errors
    /// Any firmware failure; a missing graphics service is `Ok(None)`.
    fn current_mode(&mut self) -> Result<Option<ModeInfo>, FirmwareError>;
}

/// Memory type a reservation is recorded as.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegionKind {
    LoaderCode,
    LoaderData,
}

/// What [`PhysicalMemory::place`] writes.
#[derive(Debug, Copy, Clone)]
pub enum Source<'a> {
    Bytes(&'a [u8]),
    Zero,
}

pub trait PhysicalMemory {
    /// Reserve exactly `span`. Firmware may not pick a different address.
    ///
    /// # Errors
    /// Any firmware failure, typically [`FirmwareError::NotFound`] when the
    /// range is not free.
    fn reserve_at(&mut self, span: PageSpan, kind: RegionKind) -> Result<(), FirmwareError>;

    /// Reserve `pages` pages wherever firmware likes.
    ///
    /// # Errors
    /// Any firmware failure.
    fn reserve_any(&mut self, pages: u64, kind: RegionKind) -> Result<PageSpan, FirmwareError>;

    /// Return a reservation made by this loader.
    ///
    /// # Errors
    /// Any firmware failure.
    fn release(&mut self, span: PageSpan) -> Result<(), FirmwareError>;

    /// Write `len` bytes to physical memory at `at`: a copy of `source`
    /// (which must be exactly `len` bytes long) or zeros. The target range
    /// must lie inside a reservation made through this trait.
    ///
    /// # Errors
    /// [`FirmwareError::InvalidParameter`] if the range is not owned by the
    /// loader. Never calls into firmware, so it stays usable after exit.
    fn place(
        &mut self,
        at: PhysicalAddress,
        len: u64,
        source: Source<'_>,
    ) -> Result<(), FirmwareError>;
}

/// A physical buffer handed to the memory map service.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PhysicalRegion {
    pub base: PhysicalAddress,
    pub len: usize,
}

impl From<PageSpan> for PhysicalRegion {
    #[allow(clippy::cast_possible_truncation)]
    fn from(span: PageSpan) -> Self {
        Self {
            base: span.base(),
            len: span.len() as usize,
        }
    }
}

/// Freshness token of one memory map capture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapKey(pub usize);

/// What a successful capture reports alongside the records.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapMeta {
    /// Bytes of records written.
    pub map_size: usize,
    pub key: MapKey,
    pub descriptor_size: usize,
    pub descriptor_version: u32,
}

pub trait MemoryMapService {
    /// Capture the memory map into `buffer`, or probe the required size when
    /// `buffer` is `None`.
    ///
    /// # Errors
    /// [`FirmwareError::BufferTooSmall`] (the normal answer to a probe), or
    /// any other firmware failure.
    fn memory_map(&mut self, buffer: Option<PhysicalRegion>) -> Result<MapMeta, FirmwareError>;

    /// Terminate firmware boot services. Succeeds only if `key` belongs to the
    /// most recent capture and nothing changed since.
    ///
    /// # Errors
    /// [`FirmwareError::InvalidParameter`] for a stale key.
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), FirmwareError>;
}

pub trait AcpiTables {
    /// Physical address of the ACPI root pointer, preferring ACPI 2.0+.
    fn rsdp(&self) -> Option<PhysicalAddress>;
}

/// Everything the boot sequence needs from firmware.
pub trait Firmware:
    BootVolume + DisplayService + PhysicalMemory + MemoryMapService + AcpiTables
{
}

impl<T> Firmware for T where
    T: BootVolume + DisplayService + PhysicalMemory + MemoryMapService + AcpiTables
{
}

//! Simulated firmware and image builders for the tests.
//!
//! [`SimFirmware`] backs every reservation with a byte vector, hands out a
//! fresh map key whenever the allocation state changes, and refuses any boot
//! service once `exit_boot_services` has succeeded.

use crate::error::FirmwareError;
use crate::firmware::{
    AcpiTables, BootVolume, DisplayService, MapKey, MapMeta, MemoryMapService, ModeInfo,
    PhysicalMemory, PhysicalRegion, RegionKind, Source, VolumeFile,
};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use kernel_info::mmap::CONVENTIONAL_MEMORY;
use kernel_memory_addresses::{PageSpan, PhysicalAddress};

/// Firmware memory type for `EfiLoaderCode`.
const LOADER_CODE: u32 = 1;
/// Firmware memory type for `EfiLoaderData`.
const LOADER_DATA: u32 = 2;

/// Fill pattern for freshly reserved pages.
const GARBAGE: u8 = 0xCC;

/// One firmware call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    CurrentMode,
    ReserveAt(PageSpan),
    ReserveAny(u64),
    Release(PageSpan),
    Place(PhysicalAddress, u64),
    Probe,
    Capture(PhysicalRegion),
    Exit(MapKey),
}

#[derive(Debug)]
struct Reservation {
    span: PageSpan,
    kind: RegionKind,
    fixed: bool,
    bytes: Vec<u8>,
}

pub struct SimFile {
    data: Vec<u8>,
    read_error: Option<FirmwareError>,
    short_by: usize,
}

impl VolumeFile for SimFile {
    fn size(&mut self) -> Result<u64, FirmwareError> {
        Ok(self.data.len() as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FirmwareError> {
        if let Some(e) = self.read_error {
            return Err(e);
        }
        let n = buf.len().min(self.data.len().saturating_sub(self.short_by));
        buf[..n].copy_from_slice(&self.data[..n]);
        Ok(n)
    }
}

pub struct SimFirmware {
    files: BTreeMap<String, Vec<u8>>,
    pub read_error: Option<FirmwareError>,
    pub short_read_by: usize,
    pub mode: Result<Option<ModeInfo>, FirmwareError>,
    pub rsdp: Option<PhysicalAddress>,

    reservations: BTreeMap<u64, Reservation>,
    occupied: Vec<PageSpan>,
    next_any: u64,
    /// `reserve_any` calls left before the pool runs dry.
    pub any_budget: Option<usize>,

    /// Descriptors firmware reports besides one per loader reservation.
    pub base_descriptors: usize,
    pub descriptor_size: usize,
    /// Descriptors added to the map right before each capture.
    pub growth_before_capture: VecDeque<usize>,
    /// Number of otherwise valid exit calls to reject as stale.
    pub reject_exits: usize,
    pub exit_error: Option<FirmwareError>,
    pub probe_error: Option<FirmwareError>,
    pub capture_error: Option<FirmwareError>,
    /// Descriptor size a successful capture reports, if not `descriptor_size`.
    pub captured_descriptor_size: Option<usize>,

    epoch: usize,
    exited: bool,
    pub calls: Vec<Call>,
}

impl Default for SimFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFirmware {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            read_error: None,
            short_read_by: 0,
            mode: Ok(None),
            rsdp: None,
            reservations: BTreeMap::new(),
            occupied: Vec::new(),
            next_any: 0x7000_0000,
            any_budget: None,
            base_descriptors: 24,
            descriptor_size: 48,
            growth_before_capture: VecDeque::new(),
            reject_exits: 0,
            exit_error: None,
            probe_error: None,
            capture_error: None,
            captured_descriptor_size: None,
            epoch: 1,
            exited: false,
            calls: Vec::new(),
        }
    }

    pub fn add_file(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.to_string(), data);
    }

    /// Mark pages as already in use by firmware.
    pub fn occupy(&mut self, base: PhysicalAddress, pages: u64) {
        self.occupied.push(PageSpan::new(base, pages).expect("valid span"));
    }

    pub const fn exited(&self) -> bool {
        self.exited
    }

    pub fn fixed_reservations(&self) -> usize {
        self.reservations.values().filter(|r| r.fixed).count()
    }

    pub fn any_reservations(&self) -> Vec<PageSpan> {
        self.reservations
            .values()
            .filter(|r| !r.fixed)
            .map(|r| r.span)
            .collect()
    }

    pub fn region_kind(&self, at: PhysicalAddress) -> Option<RegionKind> {
        self.find(at, 1).map(|r| r.kind)
    }

    /// Copy out `len` bytes of reserved memory.
    pub fn read(&self, at: PhysicalAddress, len: usize) -> Vec<u8> {
        let r = self.find(at, len as u64).expect("read outside reservations");
        let offset = at.checked_offset_from(r.span.base()).unwrap() as usize;
        r.bytes[offset..offset + len].to_vec()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn find(&self, at: PhysicalAddress, len: u64) -> Option<&Reservation> {
        self.reservations
            .range(..=at.as_u64())
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.span.contains_range(at, len))
    }

    fn assert_live(&self) {
        assert!(!self.exited, "boot service used after exit");
    }

    fn map_size(&self) -> usize {
        (self.base_descriptors + self.reservations.len()) * self.descriptor_size
    }

    fn insert(&mut self, span: PageSpan, kind: RegionKind, fixed: bool) {
        self.reservations.insert(
            span.base().as_u64(),
            Reservation {
                span,
                kind,
                fixed,
                bytes: vec![GARBAGE; span.len() as usize],
            },
        );
        self.epoch += 1;
    }

    fn conflicts(&self, span: &PageSpan) -> bool {
        self.occupied.iter().any(|o| o.overlaps(span))
            || self.reservations.values().any(|r| r.span.overlaps(span))
    }

    fn write_records(&mut self, region: PhysicalRegion) {
        let size = self.descriptor_size;
        let mut records = Vec::new();
        for i in 0..self.base_descriptors {
            records.push((CONVENTIONAL_MEMORY, 0x1000_0000 + (i as u64) * 0x10_0000, 16));
        }
        for r in self.reservations.values() {
            let kind = match r.kind {
                RegionKind::LoaderCode => LOADER_CODE,
                RegionKind::LoaderData => LOADER_DATA,
            };
            records.push((kind, r.span.base().as_u64(), r.span.pages()));
        }

        let target = self
            .reservations
            .range(..=region.base.as_u64())
            .next_back()
            .map(|(_, r)| r.span.base())
            .expect("capture buffer is reserved");
        let offset = region.base.checked_offset_from(target).unwrap() as usize;
        let res = self.reservations.get_mut(&target.as_u64()).unwrap();
        for (i, (kind, start, pages)) in records.into_iter().enumerate() {
            let at = offset + i * size;
            let rec = &mut res.bytes[at..at + size];
            rec.fill(0);
            rec[0..4].copy_from_slice(&kind.to_le_bytes());
            rec[8..16].copy_from_slice(&start.to_le_bytes());
            rec[24..32].copy_from_slice(&pages.to_le_bytes());
        }
    }
}

impl BootVolume for SimFirmware {
    type File = SimFile;

    fn open(&mut self, path: &str) -> Result<SimFile, FirmwareError> {
        self.assert_live();
        self.calls.push(Call::Open(path.to_string()));
        let data = self.files.get(path).ok_or(FirmwareError::NotFound)?.clone();
        Ok(SimFile {
            data,
            read_error: self.read_error,
            short_by: self.short_read_by,
        })
    }
}

impl DisplayService for SimFirmware {
    fn current_mode(&mut self) -> Result<Option<ModeInfo>, FirmwareError> {
        self.assert_live();
        self.calls.push(Call::CurrentMode);
        self.mode
    }
}

impl PhysicalMemory for SimFirmware {
    fn reserve_at(&mut self, span: PageSpan, kind: RegionKind) -> Result<(), FirmwareError> {
        self.assert_live();
        self.calls.push(Call::ReserveAt(span));
        if self.conflicts(&span) {
            return Err(FirmwareError::NotFound);
        }
        self.insert(span, kind, true);
        Ok(())
    }

    fn reserve_any(&mut self, pages: u64, kind: RegionKind) -> Result<PageSpan, FirmwareError> {
        self.assert_live();
        self.calls.push(Call::ReserveAny(pages));
        if let Some(budget) = self.any_budget.as_mut() {
            if *budget == 0 {
                return Err(FirmwareError::OutOfResources);
            }
            *budget -= 1;
        }
        let span = PageSpan::new(PhysicalAddress::new(self.next_any), pages)
            .ok_or(FirmwareError::OutOfResources)?;
        self.next_any = span.end().as_u64();
        self.insert(span, kind, false);
        Ok(span)
    }

    fn release(&mut self, span: PageSpan) -> Result<(), FirmwareError> {
        self.assert_live();
        self.calls.push(Call::Release(span));
        match self.reservations.get(&span.base().as_u64()) {
            Some(r) if r.span == span => {
                self.reservations.remove(&span.base().as_u64());
                self.epoch += 1;
                Ok(())
            }
            _ => Err(FirmwareError::InvalidParameter),
        }
    }

    fn place(
        &mut self,
        at: PhysicalAddress,
        len: u64,
        source: Source<'_>,
    ) -> Result<(), FirmwareError> {
        self.calls.push(Call::Place(at, len));
        let Some(base) = self.find(at, len).map(|r| r.span.base()) else {
            return Err(FirmwareError::InvalidParameter);
        };
        let offset = at.checked_offset_from(base).unwrap() as usize;
        let len = len as usize;
        let r = self.reservations.get_mut(&base.as_u64()).unwrap();
        let dst = &mut r.bytes[offset..offset + len];
        match source {
            Source::Bytes(src) => {
                assert_eq!(src.len(), len, "source length mismatch");
                dst.copy_from_slice(src);
            }
            Source::Zero => dst.fill(0),
        }
        Ok(())
    }
}

impl MemoryMapService for SimFirmware {
    fn memory_map(&mut self, buffer: Option<PhysicalRegion>) -> Result<MapMeta, FirmwareError> {
        self.assert_live();
        let Some(region) = buffer else {
            self.calls.push(Call::Probe);
            if let Some(e) = self.probe_error {
                return Err(e);
            }
            return Err(FirmwareError::BufferTooSmall {
                required: self.map_size(),
                descriptor_size: self.descriptor_size,
            });
        };

        self.calls.push(Call::Capture(region));
        if let Some(e) = self.capture_error {
            return Err(e);
        }
        if let Some(extra) = self.growth_before_capture.pop_front() {
            self.base_descriptors += extra;
            self.epoch += 1;
        }
        let required = self.map_size();
        if region.len < required {
            return Err(FirmwareError::BufferTooSmall {
                required,
                descriptor_size: self.descriptor_size,
            });
        }

        self.write_records(region);
        Ok(MapMeta {
            map_size: required,
            key: MapKey(self.epoch),
            descriptor_size: self
                .captured_descriptor_size
                .unwrap_or(self.descriptor_size),
            descriptor_version: 1,
        })
    }

    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), FirmwareError> {
        self.assert_live();
        self.calls.push(Call::Exit(key));
        if let Some(e) = self.exit_error {
            return Err(e);
        }
        if key != MapKey(self.epoch) {
            return Err(FirmwareError::InvalidParameter);
        }
        if self.reject_exits > 0 {
            // Something else allocated behind the loader's back.
            self.reject_exits -= 1;
            self.epoch += 1;
            return Err(FirmwareError::InvalidParameter);
        }
        self.exited = true;
        Ok(())
    }
}

impl AcpiTables for SimFirmware {
    fn rsdp(&self) -> Option<PhysicalAddress> {
        self.rsdp
    }
}

/// One program header for [`ElfBuilder`].
#[derive(Debug, Clone)]
pub struct Phdr {
    p_type: u32,
    flags: u32,
    vaddr: u64,
    paddr: Option<u64>,
    data: Vec<u8>,
    memsz: u64,
    align: u64,
}

impl Phdr {
    /// A `PT_LOAD` segment whose memory image is exactly `data`.
    pub fn load(vaddr: u64, data: Vec<u8>) -> Self {
        Self {
            p_type: 1,
            flags: 0b100,
            vaddr,
            paddr: None,
            memsz: data.len() as u64,
            data,
            align: 0x1000,
        }
    }

    /// A `PT_LOAD` segment with no file bytes.
    pub fn bss(vaddr: u64, memsz: u64) -> Self {
        Self {
            memsz,
            ..Self::load(vaddr, Vec::new())
        }
    }

    pub fn other(p_type: u32) -> Self {
        Self {
            p_type,
            ..Self::load(0, Vec::new())
        }
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn paddr(mut self, paddr: u64) -> Self {
        self.paddr = Some(paddr);
        self
    }

    pub fn memsz(mut self, memsz: u64) -> Self {
        self.memsz = memsz;
        self
    }

    pub fn align(mut self, align: u64) -> Self {
        self.align = align;
        self
    }
}

/// Assembles a minimal x86-64 executable: header, program header table
/// right behind it, then segment bytes in header order.
pub struct ElfBuilder {
    entry: u64,
    segments: Vec<Phdr>,
}

impl ElfBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, phdr: Phdr) -> Self {
        self.segments.push(phdr);
        self
    }

    pub fn build(self) -> Vec<u8> {
        const EHDR: usize = 64;
        const PHDR: usize = 56;

        let mut out = vec![0u8; EHDR];
        out[0..4].copy_from_slice(b"\x7fELF");
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // little endian
        out[6] = 1;
        out[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[24..32].copy_from_slice(&self.entry.to_le_bytes());
        out[32..40].copy_from_slice(&(EHDR as u64).to_le_bytes());
        out[52..54].copy_from_slice(&(EHDR as u16).to_le_bytes());
        out[54..56].copy_from_slice(&(PHDR as u16).to_le_bytes());
        out[56..58].copy_from_slice(&(self.segments.len() as u16).to_le_bytes());

        let mut data_offset = EHDR + PHDR * self.segments.len();
        let mut data = Vec::new();
        for seg in &self.segments {
            let mut ph = [0u8; PHDR];
            ph[0..4].copy_from_slice(&seg.p_type.to_le_bytes());
            ph[4..8].copy_from_slice(&seg.flags.to_le_bytes());
            ph[8..16].copy_from_slice(&(data_offset as u64).to_le_bytes());
            ph[16..24].copy_from_slice(&seg.vaddr.to_le_bytes());
            ph[24..32].copy_from_slice(&seg.paddr.unwrap_or(seg.vaddr).to_le_bytes());
            ph[32..40].copy_from_slice(&(seg.data.len() as u64).to_le_bytes());
            ph[40..48].copy_from_slice(&seg.memsz.to_le_bytes());
            ph[48..56].copy_from_slice(&seg.align.to_le_bytes());
            out.extend_from_slice(&ph);

            data.extend_from_slice(&seg.data);
            data_offset += seg.data.len();
        }
        out.extend_from_slice(&data);
        out
    }
}

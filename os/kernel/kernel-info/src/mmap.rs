//! # Memory Map Records
//!
//! The memory map is handed over as firmware wrote it: `len` bytes of
//! fixed-stride records whose stride may exceed any struct the kernel knows
//! about. Records are walked by byte offset.

/// `EfiConventionalMemory`: free for the kernel to use.
pub const CONVENTIONAL_MEMORY: u32 = 7;

/// Iterator over the raw records of a memory map buffer.
#[derive(Clone)]
pub struct MemoryMapRecords<'a> {
    bytes: &'a [u8],
    stride: usize,
}

impl<'a> MemoryMapRecords<'a> {
    /// A stride of zero yields no records; trailing bytes shorter than a
    /// full stride are ignored.
    #[must_use]
    pub const fn new(bytes: &'a [u8], stride: usize) -> Self {
        Self { bytes, stride }
    }
}

impl<'a> Iterator for MemoryMapRecords<'a> {
    type Item = MemoryRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stride == 0 || self.bytes.len() < self.stride {
            return None;
        }
        let (head, tail) = self.bytes.split_at(self.stride);
        self.bytes = tail;
        Some(MemoryRecord(head))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.bytes.len().checked_div(self.stride).unwrap_or(0);
        (n, Some(n))
    }
}

impl ExactSizeIterator for MemoryMapRecords<'_> {}

/// One record, still opaque. The accessors read the version-1 descriptor
/// prefix (`Type`, `PhysicalStart`, `NumberOfPages`) and return `None` if the
/// record is too short to hold them.
#[derive(Copy, Clone, Debug)]
pub struct MemoryRecord<'a>(&'a [u8]);

impl<'a> MemoryRecord<'a> {
    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.0
    }

    #[must_use]
    pub fn kind(&self) -> Option<u32> {
        let raw = self.0.get(0..4)?;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    #[must_use]
    pub fn physical_start(&self) -> Option<u64> {
        self.u64_at(8)
    }

    #[must_use]
    pub fn page_count(&self) -> Option<u64> {
        self.u64_at(24)
    }

    fn u64_at(&self, at: usize) -> Option<u64> {
        let raw = self.0.get(at..at + 8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(raw);
        Some(u64::from_le_bytes(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u32, start: u64, pages: u64, stride: usize) -> Vec<u8> {
        let mut r = vec![0u8; stride];
        r[0..4].copy_from_slice(&kind.to_le_bytes());
        r[8..16].copy_from_slice(&start.to_le_bytes());
        r[24..32].copy_from_slice(&pages.to_le_bytes());
        r
    }

    #[test]
    fn walks_by_stride_not_struct_size() {
        let mut buf = record(CONVENTIONAL_MEMORY, 0x10_0000, 16, 48);
        buf.extend(record(0, 0, 1, 48));
        let records: Vec<_> = MemoryMapRecords::new(&buf, 48).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), Some(CONVENTIONAL_MEMORY));
        assert_eq!(records[0].physical_start(), Some(0x10_0000));
        assert_eq!(records[0].page_count(), Some(16));
        assert_eq!(records[1].kind(), Some(0));
    }

    #[test]
    fn partial_tail_and_zero_stride_are_ignored() {
        let buf = [0u8; 100];
        assert_eq!(MemoryMapRecords::new(&buf, 48).count(), 2);
        assert_eq!(MemoryMapRecords::new(&buf, 0).count(), 0);
    }

    #[test]
    fn short_records_have_no_fields() {
        let buf = [0u8; 16];
        let rec = MemoryMapRecords::new(&buf, 16).next().unwrap();
        assert_eq!(rec.kind(), Some(0));
        assert_eq!(rec.page_count(), None);
    }
}

//! # Memory Inventory & Handoff Gate
//!
//! Captures the final memory map and terminates firmware boot services.
//!
//! `ExitBootServices` only accepts the key of the most recent capture, and
//! any allocation between capture and exit (including the one that creates
//! the capture buffer) invalidates it. The gate therefore runs as an explicit
//! state machine:
//!
//! ```text
//! ProbingSize -> Allocating -> Capturing -> Exiting -> done
//!                    ^             |           |
//!                    +-- too small-+           |
//! ProbingSize <------- stale key (once) -------+
//! ```
//!
//! * The probe's `BufferTooSmall` is the expected answer, not a failure.
//! * A capture that still does not fit frees its buffer and allocates again
//!   within the same attempt.
//! * A stale key frees the buffer and starts one more attempt with more
//!   slack and at least one page more than the rejected buffer. The second
//!   rejection is final.
//!
//! Nothing is allocated between a successful capture and the exit call.

use crate::error::{BootError, FirmwareError, HandoffError};
use crate::firmware::{MapMeta, MemoryMapService, PhysicalMemory, RegionKind};
use kernel_info::boot::MemoryMapInfo;
use kernel_memory_addresses::{PageSize, PageSpan, Size4K};
use log::{debug, trace, warn};

/// Number of `ExitBootServices` calls the gate makes at most.
pub const MAX_EXIT_ATTEMPTS: usize = 2;

/// Headroom for the capture buffer, in descriptors, per attempt.
///
/// The retry always asks for more than the first attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    slack_descriptors: [usize; MAX_EXIT_ATTEMPTS],
}

impl GatePolicy {
    pub const DEFAULT: Self = Self {
        slack_descriptors: [8, 32],
    };

    /// Returns `None` unless `retry` is strictly larger than `first`.
    #[must_use]
    pub const fn new(first: usize, retry: usize) -> Option<Self> {
        if retry > first {
            Some(Self {
                slack_descriptors: [first, retry],
            })
        } else {
            None
        }
    }

    /// Slack descriptors for the given zero-based attempt.
    #[must_use]
    pub const fn slack(&self, attempt: usize) -> usize {
        self.slack_descriptors[attempt]
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The accepted memory map capture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryInventory {
    /// Loader-owned pages holding the records.
    pub buffer: PageSpan,
    /// Bytes of records, not the buffer size.
    pub map_size: usize,
    pub descriptor_size: usize,
    pub descriptor_version: u32,
}

impl MemoryInventory {
    #[must_use]
    pub const fn record_count(&self) -> usize {
        match self.map_size.checked_div(self.descriptor_size) {
            Some(count) => count,
            None => 0,
        }
    }

    #[must_use]
    pub const fn to_info(&self) -> MemoryMapInfo {
        MemoryMapInfo {
            mmap_ptr: self.buffer.base().as_u64(),
            mmap_len: self.map_size as u64,
            mmap_desc_size: self.descriptor_size as u64,
            mmap_desc_version: self.descriptor_version,
            reserved: 0,
        }
    }
}

/// Witness that firmware boot services have been terminated.
///
/// Only [`exit_firmware`] creates one. Code that must not run before the
/// exit takes it by reference.
#[derive(Debug)]
pub struct FirmwareExited {
    _private: (),
}

#[cfg(test)]
impl FirmwareExited {
    pub(crate) const fn assume() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug)]
enum GateState {
    ProbingSize {
        attempt: usize,
        /// Smallest buffer, in pages, this attempt may allocate.
        min_pages: u64,
    },
    Allocating {
        attempt: usize,
        required: usize,
        descriptor_size: usize,
        min_pages: u64,
    },
    Capturing {
        attempt: usize,
        buffer: PageSpan,
        descriptor_size: usize,
        min_pages: u64,
    },
    Exiting {
        attempt: usize,
        buffer: PageSpan,
        meta: MapMeta,
    },
}

/// Capture the final memory map and exit boot services.
///
/// # Errors
/// [`BootError::OutOfMemory`] if the capture buffer cannot be allocated;
/// [`BootError::HandoffFailed`] for everything else, including a key that
/// went stale on both attempts.
pub fn exit_firmware<F>(
    firmware: &mut F,
    policy: &GatePolicy,
) -> Result<(MemoryInventory, FirmwareExited), BootError>
where
    F: PhysicalMemory + MemoryMapService,
{
    let mut state = GateState::ProbingSize {
        attempt: 0,
        min_pages: 0,
    };

    loop {
        state = match state {
            GateState::ProbingSize { attempt, min_pages } => match firmware.memory_map(None) {
                Err(FirmwareError::BufferTooSmall {
                    required,
                    descriptor_size,
                }) => GateState::Allocating {
                    attempt,
                    required,
                    descriptor_size,
                    min_pages,
                },
                Ok(meta) => GateState::Allocating {
                    attempt,
                    required: meta.map_size,
                    descriptor_size: meta.descriptor_size,
                    min_pages,
                },
                Err(e) => return Err(HandoffError::Probe(e).into()),
            },

            GateState::Allocating {
                attempt,
                required,
                descriptor_size,
                min_pages,
            } => {
                if descriptor_size == 0 {
                    return Err(HandoffError::ZeroDescriptorSize.into());
                }
                let slack = policy.slack(attempt).saturating_mul(descriptor_size);
                let pages = Size4K::pages_for(required.saturating_add(slack) as u64).max(min_pages);
                let buffer = firmware
                    .reserve_any(pages, RegionKind::LoaderData)
                    .map_err(|e| {
                        warn!("Allocating {pages} pages for the memory map failed: {e}");
                        BootError::OutOfMemory
                    })?;
                trace!("Memory map buffer {buffer} for {required} bytes (+{slack} slack)");
                GateState::Capturing {
                    attempt,
                    buffer,
                    descriptor_size,
                    min_pages,
                }
            }

            GateState::Capturing {
                attempt,
                buffer,
                descriptor_size,
                min_pages,
            } => match firmware.memory_map(Some(buffer.into())) {
                Ok(meta) if meta.descriptor_size == 0 => {
                    firmware.release(buffer).map_err(HandoffError::Release)?;
                    return Err(HandoffError::ZeroDescriptorSize.into());
                }
                Ok(meta) => GateState::Exiting {
                    attempt,
                    buffer,
                    meta,
                },
                Err(FirmwareError::BufferTooSmall {
                    required,
                    descriptor_size: reported,
                }) => {
                    debug!("Memory map grew to {required} bytes, reallocating");
                    firmware.release(buffer).map_err(HandoffError::Release)?;
                    GateState::Allocating {
                        attempt,
                        required,
                        descriptor_size: if reported == 0 {
                            descriptor_size
                        } else {
                            reported
                        },
                        min_pages,
                    }
                }
                Err(e) => return Err(HandoffError::Capture(e).into()),
            },

            GateState::Exiting {
                attempt,
                buffer,
                meta,
            } => match firmware.exit_boot_services(meta.key) {
                Ok(()) => {
                    let inventory = MemoryInventory {
                        buffer,
                        map_size: meta.map_size,
                        descriptor_size: meta.descriptor_size,
                        descriptor_version: meta.descriptor_version,
                    };
                    return Ok((inventory, FirmwareExited { _private: () }));
                }
                Err(FirmwareError::InvalidParameter) if attempt + 1 < MAX_EXIT_ATTEMPTS => {
                    warn!("Memory map key went stale, retrying with a larger buffer");
                    firmware.release(buffer).map_err(HandoffError::Release)?;
                    GateState::ProbingSize {
                        attempt: attempt + 1,
                        min_pages: buffer.pages() + 1,
                    }
                }
                Err(FirmwareError::InvalidParameter) => {
                    return Err(HandoffError::StaleKeyRetriesExhausted {
                        attempts: attempt + 1,
                    }
                    .into());
                }
                Err(e) => return Err(HandoffError::Exit(e).into()),
            },
        };
    }
}

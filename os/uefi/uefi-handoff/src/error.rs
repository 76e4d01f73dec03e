//! # Boot Errors
//!
//! Every variant of [`BootError`] is fatal. The only retry in the whole
//! sequence lives inside the memory inventory gate and never surfaces here
//! unless it is exhausted.

use crate::elf::ImageError;
use kernel_memory_addresses::PhysicalAddress;

/// Failure reported by a firmware service call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FirmwareError {
    #[error("The requested item was not found")]
    NotFound,
    #[error("The buffer is too small, {required} bytes are required")]
    BufferTooSmall {
        /// Bytes the firmware wants.
        required: usize,
        /// Size of one record, where the call reports one (memory map), else 0.
        descriptor_size: usize,
    },
    #[error("A parameter was rejected by the firmware")]
    InvalidParameter,
    #[error("The firmware is out of resources")]
    OutOfResources,
    #[error("The device reported an error")]
    DeviceError,
    #[error("The operation is not supported")]
    Unsupported,
    #[error("The firmware call failed with status {0:#x}")]
    Other(usize),
}

/// Why the boot sequence stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    #[error("The kernel image was not found on the boot volume")]
    NotFound,
    #[error("Reading from the boot volume failed")]
    Io(#[source] FirmwareError),
    #[error("A firmware memory allocation failed")]
    OutOfMemory,
    #[error("The kernel image is malformed")]
    InvalidImage(#[source] ImageError),
    #[error("Could not reserve {pages} pages at {base} for a segment targeting {target}")]
    PlacementConflict {
        target: PhysicalAddress,
        base: PhysicalAddress,
        pages: u64,
        #[source]
        source: FirmwareError,
    },
    #[error("Writing {len} bytes at {at} was refused")]
    WriteRefused {
        at: PhysicalAddress,
        len: u64,
        #[source]
        source: FirmwareError,
    },
    #[error("No linear framebuffer is available")]
    DisplayUnavailable,
    #[error("Exiting firmware services failed")]
    HandoffFailed(#[source] HandoffError),
}

/// The specific way the memory inventory gate gave up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    #[error("Probing the memory map size failed")]
    Probe(#[source] FirmwareError),
    #[error("Capturing the memory map failed")]
    Capture(#[source] FirmwareError),
    #[error("Releasing the stale memory map buffer failed")]
    Release(#[source] FirmwareError),
    #[error("ExitBootServices failed")]
    Exit(#[source] FirmwareError),
    #[error("The memory map key was rejected on every attempt ({attempts})")]
    StaleKeyRetriesExhausted { attempts: usize },
    #[error("The memory map reports a zero descriptor size")]
    ZeroDescriptorSize,
}

impl From<ImageError> for BootError {
    fn from(value: ImageError) -> Self {
        Self::InvalidImage(value)
    }
}

impl From<HandoffError> for BootError {
    fn from(value: HandoffError) -> Self {
        Self::HandoffFailed(value)
    }
}

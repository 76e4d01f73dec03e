//! # UEFI Kernel Handoff
//!
//! The firmware-independent core of the UEFI loader: read the kernel image,
//! place its segments at fixed physical addresses, describe the display,
//! capture the memory map, leave boot services and assemble the
//! [`KernelBootInfo`](kernel_info::boot::KernelBootInfo) record the kernel
//! receives.
//!
//! All firmware access goes through the traits in [`firmware`], so the whole
//! sequence runs against simulated firmware in host tests. The `uefi-loader`
//! binary provides the real implementations.
//!
//! ## Features
//! * `uefi`: conversions between [`uefi::Status`] and the error types.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod assembler;
pub mod boot;
pub mod display;
pub mod elf;
pub mod error;
pub mod firmware;
pub mod gate;
pub mod image;
pub mod placer;

#[cfg(test)]
mod testing;
#[cfg(feature = "uefi")]
mod uefi_status;

pub use boot::{BootFailure, BootStage, Handoff, LoaderConfig, Prepared, prepare, run};
pub use error::{BootError, FirmwareError, HandoffError};
pub use gate::{FirmwareExited, GatePolicy, MemoryInventory};
pub use placer::SegmentAlignment;

//! # Kernel Boot Interface
//!
//! This crate defines the contract between the UEFI loader and the kernel:
//! the handoff structure, its byte layout, the entry point signature and the
//! physical placement constant the kernel is linked against.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! * **Kernel Entry Point**: Function signature and calling convention
//! * **Boot Data Structures**: Framebuffer and memory map details, ACPI root
//! * **ABI Stability**: `#[repr(C)]` layout, pinned offsets, explicit encoding
//!
//! ### Memory Map Records ([`mmap`])
//! Byte-offset iteration over the firmware memory map, which is opaque to the
//! loader and only interpreted on the kernel side.
//!
//! ### Memory Layout ([`memory`])
//! Physical load address and stack sizing used by the kernel's `build.rs`.
//!
//! ## Boot Protocol
//!
//! ```rust
//! # use kernel_info::boot::KernelBootInfo;
//! # #[cfg(target_arch = "x86_64")]
//! pub type KernelEntryFn = extern "win64" fn(*const KernelBootInfo) -> !;
//! ```
//!
//! * **Calling Convention**: Windows x64 ABI for UEFI compatibility
//! * **Parameter**: Physical address of the encoded boot information block
//! * **No Return**: Kernel assumes control permanently
//!
//! ```text
//! Offset  Field                        Width
//!      0  magic "SFBI"                 u32
//!      4  version                      u32
//!      8  framebuffer base (phys)      u64
//!     16  width / height (px)          u32 u32
//!     24  pitch (bytes) / bpp          u32 u32
//!     32  pixel format / reserved      u32 u32
//!     40  memory map (phys)            u64
//!     48  memory map size (bytes)      u64
//!     56  descriptor stride (bytes)    u64
//!     64  descriptor version/reserved  u32 u32
//!     72  RSDP (phys, 0 if absent)     u64
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::boot::*;
//!
//! let info = KernelBootInfo::new(
//!     FramebufferInfo {
//!         framebuffer_ptr: 0x8000_0000,
//!         framebuffer_width: 800,
//!         framebuffer_height: 600,
//!         framebuffer_pitch: 800 * 4,
//!         framebuffer_bpp: 32,
//!         framebuffer_format: BootPixelFormat::Rgb,
//!         reserved: 0,
//!     },
//!     MemoryMapInfo {
//!         mmap_ptr: 0x7000_0000,
//!         mmap_len: 480,
//!         mmap_desc_size: 48,
//!         mmap_desc_version: 1,
//!         reserved: 0,
//!     },
//!     0,
//! );
//! let bytes = info.encode();
//! assert_eq!(KernelBootInfo::decode(&bytes).unwrap(), info);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod mmap;

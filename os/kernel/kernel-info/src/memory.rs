//! # Memory Layout

/// Where the kernel's bytes are placed in *physical* memory.
///
/// The kernel is linked physically addressed: its `PT_LOAD` segments carry
/// `p_paddr == p_vaddr` starting here, and the loader reserves exactly these
/// addresses.
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// The size of the kernel's own boot stack.
pub const KERNEL_STACK_SIZE: usize = 64 * 1024;

/// Granule of every firmware page allocation.
pub const PAGE_SIZE: u64 = 4096;

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(16));
    assert!(PHYS_LOAD.is_multiple_of(PAGE_SIZE));
};

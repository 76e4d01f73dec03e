//! # Boot Sequence
//!
//! Runs the loader's stages in order and stops at the first failure:
//!
//! 1. read the kernel image from the boot volume,
//! 2. parse its headers,
//! 3. place its segments at their physical targets,
//! 4. describe the framebuffer,
//! 5. reserve the handoff descriptor and look up the ACPI root pointer,
//! 6. capture the memory map and exit firmware,
//! 7. write the handoff descriptor.
//!
//! Steps 1 to 5 are [`prepare`]; 6 and 7 are [`Prepared::exit_firmware`].
//! The split gives the caller a point to silence anything that still talks
//! to firmware (such as console logging) right before the exit.

use crate::assembler::HandoffBlock;
use crate::display::probe_display;
use crate::elf::ElfImage;
use crate::error::BootError;
use crate::firmware::{Firmware, MemoryMapService, PhysicalMemory};
use crate::gate::{FirmwareExited, GatePolicy, exit_firmware};
use crate::image::load_image;
use crate::placer::{SegmentAlignment, place_segments};
use kernel_info::boot::FramebufferInfo;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use log::info;

/// Loader settings. There is no config file; this is compiled in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Kernel path on the boot volume.
    pub kernel_path: &'static str,
    pub alignment: SegmentAlignment,
    pub gate: GatePolicy,
}

impl LoaderConfig {
    pub const DEFAULT: Self = Self {
        kernel_path: "\\kernel.elf",
        alignment: SegmentAlignment::PageGranular,
        gate: GatePolicy::DEFAULT,
    };
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The step a boot failure happened in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootStage {
    LoadImage,
    ParseImage,
    PlaceSegments,
    ProbeDisplay,
    ReserveHandoff,
    ExitFirmware,
    WriteHandoff,
}

impl BootStage {
    /// Whether firmware boot services are still there to return to.
    ///
    /// An exit that was attempted but not accepted still counts as
    /// available: control goes back to firmware with an error status.
    #[must_use]
    pub const fn firmware_available(self) -> bool {
        !matches!(self, Self::WriteHandoff)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Boot failed while in stage {stage:?}")]
pub struct BootFailure {
    pub stage: BootStage,
    #[source]
    pub error: BootError,
}

trait InStage<T> {
    fn in_stage(self, stage: BootStage) -> Result<T, BootFailure>;
}

impl<T, E: Into<BootError>> InStage<T> for Result<T, E> {
    fn in_stage(self, stage: BootStage) -> Result<T, BootFailure> {
        self.map_err(|e| BootFailure {
            stage,
            error: e.into(),
        })
    }
}

/// Kernel placed, display known, descriptor reserved; firmware still up.
#[derive(Debug)]
pub struct Prepared {
    entry: VirtualAddress,
    fb: FramebufferInfo,
    block: HandoffBlock,
    rsdp: Option<PhysicalAddress>,
}

/// Everything needed to jump into the kernel.
#[derive(Debug)]
pub struct Handoff {
    /// Kernel entry point, identity mapped.
    pub entry: VirtualAddress,
    /// Physical address of the encoded `KernelBootInfo`.
    pub boot_info: PhysicalAddress,
    pub exited: FirmwareExited,
}

/// Load and place the kernel and gather everything the descriptor needs,
/// without leaving firmware.
///
/// # Errors
/// The first failing stage together with its error.
pub fn prepare<F: Firmware>(
    firmware: &mut F,
    config: &LoaderConfig,
) -> Result<Prepared, BootFailure> {
    info!("Loading kernel from {}", config.kernel_path);
    let bytes = load_image(firmware, config.kernel_path).in_stage(BootStage::LoadImage)?;
    let image = ElfImage::parse(&bytes).in_stage(BootStage::ParseImage)?;
    info!(
        "Kernel entry at {:#x}, {} program headers",
        image.entry.as_u64(),
        image.segments.len()
    );

    place_segments(firmware, &image, &bytes, config.alignment)
        .in_stage(BootStage::PlaceSegments)?;
    let entry = image.entry;
    drop(image);
    drop(bytes);

    let fb = probe_display(firmware).in_stage(BootStage::ProbeDisplay)?;
    let block = HandoffBlock::reserve(firmware).in_stage(BootStage::ReserveHandoff)?;

    let rsdp = firmware.rsdp();
    match rsdp {
        Some(addr) => info!("ACPI root pointer at {addr}"),
        None => info!("No ACPI root pointer found"),
    }

    Ok(Prepared {
        entry,
        fb,
        block,
        rsdp,
    })
}

impl Prepared {
    #[must_use]
    pub const fn entry(&self) -> VirtualAddress {
        self.entry
    }

    #[must_use]
    pub const fn boot_info_address(&self) -> PhysicalAddress {
        self.block.address()
    }

    /// Exit firmware and write the handoff descriptor.
    ///
    /// Must not log to anything that calls into firmware.
    ///
    /// # Errors
    /// [`BootStage::ExitFirmware`] while firmware is still present, or
    /// [`BootStage::WriteHandoff`] after it is gone.
    pub fn exit_firmware<M>(
        self,
        firmware: &mut M,
        policy: &GatePolicy,
    ) -> Result<Handoff, BootFailure>
    where
        M: PhysicalMemory + MemoryMapService,
    {
        let (inventory, exited) =
            exit_firmware(firmware, policy).in_stage(BootStage::ExitFirmware)?;

        let boot_info = self
            .block
            .commit(firmware, self.fb, &inventory, self.rsdp, &exited)
            .in_stage(BootStage::WriteHandoff)?;

        Ok(Handoff {
            entry: self.entry,
            boot_info,
            exited,
        })
    }
}

/// [`prepare`] and [`Prepared::exit_firmware`] back to back.
///
/// `before_exit` runs between the two.
///
/// # Errors
/// The first failing stage together with its error.
pub fn run<F: Firmware>(
    firmware: &mut F,
    config: &LoaderConfig,
    before_exit: impl FnOnce(),
) -> Result<Handoff, BootFailure> {
    let prepared = prepare(firmware, config)?;
    before_exit();
    prepared.exit_firmware(firmware, &config.gate)
}

//! # Display Probing
//!
//! Reads the graphics mode firmware already set up. The mode is never
//! changed; a system without a linear framebuffer does not boot.

use crate::error::BootError;
use crate::firmware::{DisplayService, FirmwarePixelFormat, ModeInfo};
use kernel_info::boot::{BootPixelFormat, FramebufferInfo};
use log::{info, warn};

const RGB_MASKS: (u32, u32, u32) = (0x0000_00FF, 0x0000_FF00, 0x00FF_0000);
const BGR_MASKS: (u32, u32, u32) = (0x00FF_0000, 0x0000_FF00, 0x0000_00FF);

/// Describe the active framebuffer.
///
/// # Errors
/// [`BootError::DisplayUnavailable`] when there is no graphics service, no
/// active mode, a block-transfer-only mode, a mode whose scanlines overrun
/// the framebuffer, or a mode that does not fit the handoff fields.
pub fn probe_display<D: DisplayService>(display: &mut D) -> Result<FramebufferInfo, BootError> {
    let mode = match display.current_mode() {
        Ok(Some(mode)) => mode,
        Ok(None) => {
            warn!("No graphics output available");
            return Err(BootError::DisplayUnavailable);
        }
        Err(e) => {
            warn!("Querying the graphics mode failed: {e}");
            return Err(BootError::DisplayUnavailable);
        }
    };

    let info = describe(&mode).ok_or(BootError::DisplayUnavailable)?;
    info!(
        "Framebuffer {}x{} pitch={} bpp={} format={:?} at {:#x}",
        info.framebuffer_width,
        info.framebuffer_height,
        info.framebuffer_pitch,
        info.framebuffer_bpp,
        info.framebuffer_format,
        info.framebuffer_ptr
    );
    Ok(info)
}

fn describe(mode: &ModeInfo) -> Option<FramebufferInfo> {
    let (format, bpp) = match mode.pixel_format {
        FirmwarePixelFormat::Rgb => (BootPixelFormat::Rgb, 32),
        FirmwarePixelFormat::Bgr => (BootPixelFormat::Bgr, 32),
        FirmwarePixelFormat::Bitmask {
            red,
            green,
            blue,
            reserved,
        } => {
            let bpp = u32::BITS - (red | green | blue | reserved).leading_zeros();
            let format = match (red, green, blue) {
                RGB_MASKS if bpp == 32 => BootPixelFormat::Rgb,
                BGR_MASKS if bpp == 32 => BootPixelFormat::Bgr,
                _ => BootPixelFormat::Bitmask,
            };
            (format, bpp)
        }
        FirmwarePixelFormat::BltOnly => {
            warn!("Graphics mode has no linear framebuffer");
            return None;
        }
    };

    if bpp == 0 || mode.framebuffer_base.is_null() {
        return None;
    }

    let width = u32::try_from(mode.width).ok()?;
    let height = u32::try_from(mode.height).ok()?;
    let stride = u32::try_from(mode.pixels_per_scanline).ok()?;
    let pitch = stride.checked_mul(bpp.div_ceil(8))?;

    let visible = (pitch as usize).checked_mul(mode.height)?;
    if visible > mode.framebuffer_size {
        warn!(
            "Framebuffer of {} bytes is smaller than {height} rows of {pitch} bytes",
            mode.framebuffer_size
        );
        return None;
    }

    Some(FramebufferInfo {
        framebuffer_ptr: mode.framebuffer_base.as_u64(),
        framebuffer_width: width,
        framebuffer_height: height,
        framebuffer_pitch: pitch,
        framebuffer_bpp: bpp,
        framebuffer_format: format,
        reserved: 0,
    })
}

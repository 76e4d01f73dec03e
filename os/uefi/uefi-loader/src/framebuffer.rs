//! # GOP Framebuffer Query

use crate::firmware::UefiFirmware;
use kernel_memory_addresses::PhysicalAddress;
use log::debug;
use uefi::boot::{self, OpenProtocolAttributes, OpenProtocolParams};
use uefi::proto::console::gop::{GraphicsOutput, PixelFormat};
use uefi_handoff::FirmwareError;
use uefi_handoff::firmware::{DisplayService, FirmwarePixelFormat, ModeInfo};

impl DisplayService for UefiFirmware {
    fn current_mode(&mut self) -> Result<Option<ModeInfo>, FirmwareError> {
        let Ok(handle) = boot::get_handle_for_protocol::<GraphicsOutput>() else {
            debug!("No Graphics Output Protocol handle");
            return Ok(None);
        };

        // Shared access: the console keeps drawing until boot services end.
        let mut gop = unsafe {
            boot::open_protocol::<GraphicsOutput>(
                OpenProtocolParams {
                    handle,
                    agent: boot::image_handle(),
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }?;

        let mode = gop.current_mode_info();
        let (width, height) = mode.resolution();
        let pixel_format = match mode.pixel_format() {
            PixelFormat::Rgb => FirmwarePixelFormat::Rgb,
            PixelFormat::Bgr => FirmwarePixelFormat::Bgr,
            PixelFormat::Bitmask => match mode.pixel_bitmask() {
                Some(mask) => FirmwarePixelFormat::Bitmask {
                    red: mask.red,
                    green: mask.green,
                    blue: mask.blue,
                    reserved: mask.reserved,
                },
                None => FirmwarePixelFormat::BltOnly,
            },
            PixelFormat::BltOnly => FirmwarePixelFormat::BltOnly,
        };

        let mut fb = gop.frame_buffer();
        Ok(Some(ModeInfo {
            framebuffer_base: PhysicalAddress::from_ptr(fb.as_mut_ptr().cast_const()),
            framebuffer_size: fb.size(),
            width,
            height,
            pixels_per_scanline: mode.stride(),
            pixel_format,
        }))
    }
}

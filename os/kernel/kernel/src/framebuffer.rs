//! # Boot Splash

use kernel_framebuffer::{Canvas, paint_boot_splash};
use kernel_info::boot::FramebufferInfo;
use log::{info, warn};

#[allow(clippy::cast_possible_truncation)]
pub fn paint(fb: &FramebufferInfo) {
    if fb.framebuffer_ptr == 0 {
        warn!("No framebuffer was handed over");
        return;
    }

    // SAFETY: identity mapped; the loader reported this range as the
    // visible part of the linear framebuffer.
    let memory = unsafe {
        core::slice::from_raw_parts_mut(fb.base().as_mut_ptr::<u8>(), fb.visible_len() as usize)
    };

    match Canvas::new(fb, memory) {
        Ok(mut canvas) => {
            paint_boot_splash(&mut canvas);
            info!(
                "Painted {}x{} {:?} framebuffer",
                canvas.width(),
                canvas.height(),
                fb.framebuffer_format
            );
        }
        Err(e) => warn!("Cannot draw on the framebuffer: {e}"),
    }
}

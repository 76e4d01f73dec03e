//! # Kernel Framebuffer helpers
//!
//! A [`Canvas`] borrows the linear framebuffer described by
//! [`FramebufferInfo`] as a plain byte slice and draws into it with bounds
//! checks. Creating that slice from the physical base is the kernel's one
//! unsafe step; everything here is safe code.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

use kernel_info::boot::{BootPixelFormat, FramebufferInfo};

/// A color in 8-bit channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Self = Self::new(0xFF, 0xFF, 0xFF);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanvasError {
    #[error("Only 32 bpp RGB/BGR framebuffers can be drawn to")]
    UnsupportedFormat,
    #[error("The pitch is smaller than one row of pixels")]
    PitchTooSmall,
    #[error("The framebuffer memory is smaller than pitch * height")]
    MemoryTooSmall,
}

/// Drawing surface over framebuffer memory.
pub struct Canvas<'a> {
    memory: &'a mut [u8],
    width: usize,
    height: usize,
    pitch: usize,
    format: BootPixelFormat,
}

impl<'a> Canvas<'a> {
    const BYTES_PER_PIXEL: usize = 4;

    /// Wrap `memory`, which must cover at least `pitch * height` bytes.
    ///
    /// # Errors
    /// Rejects non-32 bpp or bitmask framebuffers and inconsistent geometry.
    pub fn new(info: &FramebufferInfo, memory: &'a mut [u8]) -> Result<Self, CanvasError> {
        if info.framebuffer_bpp != 32 || info.framebuffer_format == BootPixelFormat::Bitmask {
            return Err(CanvasError::UnsupportedFormat);
        }

        let width = info.framebuffer_width as usize;
        let height = info.framebuffer_height as usize;
        let pitch = info.framebuffer_pitch as usize;
        if pitch < width * Self::BYTES_PER_PIXEL {
            return Err(CanvasError::PitchTooSmall);
        }
        if memory.len() < pitch * height {
            return Err(CanvasError::MemoryTooSmall);
        }

        Ok(Self {
            memory,
            width,
            height,
            pitch,
            format: info.framebuffer_format,
        })
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The four bytes stored for `color` in this framebuffer's channel order.
    #[must_use]
    pub const fn encode(&self, color: Rgb) -> [u8; 4] {
        match self.format {
            BootPixelFormat::Bgr => [color.b, color.g, color.r, 0],
            BootPixelFormat::Rgb | BootPixelFormat::Bitmask => [color.r, color.g, color.b, 0],
        }
    }

    /// Paint every visible pixel.
    pub fn fill(&mut self, color: Rgb) {
        for y in 0..self.height {
            self.hline(y, 0, self.width, color);
        }
    }

    /// Paint `[x0, x1)` on row `y`, clipped to the visible area.
    pub fn hline(&mut self, y: usize, x0: usize, x1: usize, color: Rgb) {
        if y >= self.height {
            return;
        }
        let x1 = x1.min(self.width);
        let px = self.encode(color);
        let row = y * self.pitch;
        for x in x0..x1 {
            let at = row + x * Self::BYTES_PER_PIXEL;
            self.memory[at..at + Self::BYTES_PER_PIXEL].copy_from_slice(&px);
        }
    }

    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y * self.pitch + x * Self::BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.memory[at..at + Self::BYTES_PER_PIXEL]);
        Some(px)
    }
}

/// The boot splash: a solid background (blue-ish on BGR, red-ish on RGB)
/// crossed by a white line through the middle, 10 px in from either edge.
pub fn paint_boot_splash(canvas: &mut Canvas<'_>) {
    const MARGIN: usize = 10;

    let background = match canvas.format {
        BootPixelFormat::Bgr => Rgb::new(0x20, 0x20, 0xC0),
        BootPixelFormat::Rgb | BootPixelFormat::Bitmask => Rgb::new(0xC0, 0x20, 0x20),
    };
    canvas.fill(background);

    let mid = canvas.height / 2;
    let end = canvas.width.saturating_sub(MARGIN);
    canvas.hline(mid, MARGIN, end, Rgb::WHITE);
}

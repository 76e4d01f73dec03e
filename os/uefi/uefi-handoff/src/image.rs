//! # Kernel Image Loading

use crate::error::{BootError, FirmwareError};
use crate::firmware::{BootVolume, VolumeFile};
use alloc::vec::Vec;
use log::{debug, error};

/// Read the whole file at `path` into a buffer sized from its metadata.
///
/// One full read; a short read is fatal, not retried.
///
/// # Errors
/// [`BootError::NotFound`], [`BootError::Io`] or [`BootError::OutOfMemory`].
pub fn load_image<V: BootVolume>(volume: &mut V, path: &str) -> Result<Vec<u8>, BootError> {
    let mut file = volume.open(path).map_err(|e| match e {
        FirmwareError::NotFound => BootError::NotFound,
        other => BootError::Io(other),
    })?;

    let size = file.size().map_err(BootError::Io)?;
    let size = usize::try_from(size).map_err(|_| BootError::OutOfMemory)?;
    debug!("{path} is {size} bytes");

    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| BootError::OutOfMemory)?;
    buf.resize(size, 0);

    let read = file.read(&mut buf).map_err(BootError::Io)?;
    if read != size {
        error!("Mismatch in file size: read {read} bytes, expected {size} bytes");
        return Err(BootError::Io(FirmwareError::DeviceError));
    }

    Ok(buf)
}

//! Conversions between firmware status codes and the boot error types.

use crate::error::{BootError, FirmwareError};
use uefi::Status;

impl From<Status> for FirmwareError {
    fn from(status: Status) -> Self {
        match status {
            Status::NOT_FOUND => Self::NotFound,
            Status::BUFFER_TOO_SMALL => Self::BufferTooSmall {
                required: 0,
                descriptor_size: 0,
            },
            Status::INVALID_PARAMETER => Self::InvalidParameter,
            Status::OUT_OF_RESOURCES => Self::OutOfResources,
            Status::DEVICE_ERROR => Self::DeviceError,
            Status::UNSUPPORTED => Self::Unsupported,
            other => Self::Other(other.0),
        }
    }
}

impl<Data: core::fmt::Debug> From<uefi::Error<Data>> for FirmwareError {
    fn from(error: uefi::Error<Data>) -> Self {
        error.status().into()
    }
}

impl From<&BootError> for Status {
    fn from(error: &BootError) -> Self {
        match error {
            BootError::NotFound => Self::NOT_FOUND,
            BootError::Io(_) => Self::DEVICE_ERROR,
            BootError::OutOfMemory => Self::OUT_OF_RESOURCES,
            BootError::InvalidImage(_)
            | BootError::PlacementConflict { .. }
            | BootError::WriteRefused { .. } => Self::LOAD_ERROR,
            BootError::DisplayUnavailable => Self::UNSUPPORTED,
            BootError::HandoffFailed(_) => Self::ABORTED,
        }
    }
}

//! # Boot Volume Access

use crate::firmware::UefiFirmware;
use log::warn;
use uefi::proto::media::file::{File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::{CString16, boot};
use uefi_handoff::FirmwareError;
use uefi_handoff::firmware::{BootVolume, VolumeFile};

/// A regular file opened on the loader's own volume.
pub struct EspFile(RegularFile);

impl VolumeFile for EspFile {
    fn size(&mut self) -> Result<u64, FirmwareError> {
        let info = self.0.get_boxed_info::<FileInfo>()?;
        Ok(info.file_size())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FirmwareError> {
        self.0.set_position(0)?;
        Ok(self.0.read(buf)?)
    }
}

impl BootVolume for UefiFirmware {
    type File = EspFile;

    fn open(&mut self, path: &str) -> Result<EspFile, FirmwareError> {
        let path = CString16::try_from(path).map_err(|_| FirmwareError::InvalidParameter)?;

        let mut sfs = boot::get_image_file_system(boot::image_handle()).map_err(|e| {
            warn!("Failed to get file system: {e:?}");
            FirmwareError::from(e)
        })?;
        let mut volume = sfs.open_volume()?;

        let handle = volume.open(&path, FileMode::Read, FileAttribute::empty())?;
        handle
            .into_regular_file()
            .map(EspFile)
            .ok_or(FirmwareError::NotFound)
    }
}

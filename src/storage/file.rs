use std::fs::File;
use std::os::unix::prelude::FileExt;

use crate::error::FsError;

use super::disk_storage::DiskStorage;

pub struct FileStorage(File);

impl FileStorage {
    pub fn new(file: File) -> Self {
        FileStorage(file)
    }
}

impl DiskStorage for FileStorage {
    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<(), FsError> {
        self.0.read_exact_at(buf, position)?;

        Ok(())
    }

    fn write_at(&self, position: u64, data: &[u8]) -> Result<(), FsError> {
        self.0.write_all_at(data, position)?;

        Ok(())
    }

    fn size(&self) -> Result<u64, FsError> {
        Ok(self.0.metadata()?.len())
    }
}

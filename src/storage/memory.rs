use std::cell::RefCell;
use std::io::{Error, ErrorKind};

use crate::disk_format::layout::Layout;
use crate::error::FsError;

use super::disk_storage::DiskStorage;

/// A disk image held entirely in memory. Used by tests and usable anywhere a
/// throwaway filesystem is convenient.
pub struct MemoryStorage(RefCell<Vec<u8>>);

impl MemoryStorage {
    /// A zeroed image sized for `layout`.
    pub fn new(layout: Layout) -> Self {
        MemoryStorage(RefCell::new(vec![0; layout.image_size() as usize]))
    }

    fn check_bounds(&self, position: u64, len: usize) -> Result<usize, FsError> {
        let position = position as usize;
        let end = position + len;

        if end > self.0.borrow().len() {
            return Err(FsError::Io(Error::from(ErrorKind::UnexpectedEof)));
        }

        Ok(position)
    }
}

impl DiskStorage for MemoryStorage {
    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<(), FsError> {
        let position = self.check_bounds(position, buf.len())?;
        buf.copy_from_slice(&self.0.borrow()[position..position + buf.len()]);

        Ok(())
    }

    fn write_at(&self, position: u64, data: &[u8]) -> Result<(), FsError> {
        let position = self.check_bounds(position, data.len())?;
        self.0.borrow_mut()[position..position + data.len()].copy_from_slice(data);

        Ok(())
    }

    fn size(&self) -> Result<u64, FsError> {
        Ok(self.0.borrow().len() as u64)
    }
}

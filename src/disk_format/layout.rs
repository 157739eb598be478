use crate::error::FsError;

use super::block::BLOCK_SIZE;
use super::table::{BlockIndex, END_BLOCK, TABLE_ENTRY_SIZE};

/// The number of blocks in a freshly formatted image, unless overridden.
pub const DEFAULT_NUM_BLOCKS: usize = 40640;

/// Byte positions within the disk image.
///
/// The image carries no header: the allocation table occupies the first
/// `num_blocks * TABLE_ENTRY_SIZE` bytes and the block area follows immediately,
/// so the block count is fully determined by the image length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub num_blocks: usize,
}

impl Layout {
    pub fn new(num_blocks: usize) -> Result<Self, FsError> {
        if num_blocks == 0 || num_blocks > END_BLOCK as usize {
            return Err(FsError::Corrupt(format!(
                "invalid number of blocks: {num_blocks}"
            )));
        }

        Ok(Self { num_blocks })
    }

    /// Derives the layout from the length of a disk image.
    pub fn from_image_size(size: u64) -> Result<Self, FsError> {
        let stride = (TABLE_ENTRY_SIZE + BLOCK_SIZE) as u64;

        if size % stride != 0 {
            return Err(FsError::Corrupt(format!(
                "image size {size} is not a multiple of {stride}"
            )));
        }

        Self::new((size / stride) as usize)
    }

    /// The total size of the image in bytes.
    pub fn image_size(&self) -> u64 {
        (self.num_blocks * (TABLE_ENTRY_SIZE + BLOCK_SIZE)) as u64
    }

    /// The position of the allocation-table entry for `index`.
    pub fn table_entry_position(&self, index: BlockIndex) -> u64 {
        (index as usize * TABLE_ENTRY_SIZE) as u64
    }

    /// The position of the first byte of block `index`.
    pub fn block_position(&self, index: BlockIndex) -> u64 {
        (self.num_blocks * TABLE_ENTRY_SIZE + index as usize * BLOCK_SIZE) as u64
    }

    pub fn contains(&self, index: BlockIndex) -> bool {
        (index as usize) < self.num_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_image_size() {
        let layout = Layout::from_image_size(10 * (TABLE_ENTRY_SIZE + BLOCK_SIZE) as u64).unwrap();
        assert_eq!(layout.num_blocks, 10);
        assert_eq!(layout.image_size(), 10 * 258);
    }

    #[test]
    fn test_from_image_size_unaligned() {
        assert!(Layout::from_image_size(1000).is_err());
    }

    #[test]
    fn test_from_image_size_empty() {
        assert!(Layout::from_image_size(0).is_err());
    }

    #[test]
    fn test_too_many_blocks() {
        assert!(Layout::new(END_BLOCK as usize).is_ok());
        assert!(Layout::new(END_BLOCK as usize + 1).is_err());
    }

    #[test]
    fn test_positions() {
        let layout = Layout::new(4).unwrap();

        assert_eq!(layout.table_entry_position(0), 0);
        assert_eq!(layout.table_entry_position(3), 6);
        assert_eq!(layout.block_position(0), 8);
        assert_eq!(layout.block_position(1), 8 + BLOCK_SIZE as u64);
    }

    #[test]
    fn test_contains() {
        let layout = Layout::new(4).unwrap();

        assert!(layout.contains(0));
        assert!(layout.contains(3));
        assert!(!layout.contains(4));
    }
}

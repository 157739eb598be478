use crate::error::FsError;

/// Raw fixed-offset access to the bytes of a disk image.
///
/// The engine performs all of its reads and writes through this trait; the
/// positions it uses are computed by [`crate::disk_format::layout::Layout`] and
/// never cross a block boundary.
pub trait DiskStorage {
    fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<(), FsError>;

    fn write_at(&self, position: u64, data: &[u8]) -> Result<(), FsError>;

    /// The total size of the image in bytes.
    fn size(&self) -> Result<u64, FsError>;
}

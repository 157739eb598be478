/// The block-allocation table.
pub mod alloc;
/// The storage engine.
pub mod chainfs;
/// Constants and structures that define the on-disk format.
pub mod disk_format;
/// Engine errors and their errno mapping.
pub mod error;
/// An implementation of a FUSE filesystem around the engine.
pub mod fuse;
/// Disk-image storage backends.
pub mod storage;

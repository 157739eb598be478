/// The disk-image storage abstraction.
mod disk_storage;
/// File-backed storage.
mod file;
/// Memory-backed storage.
mod memory;

pub use disk_storage::*;
pub use file::*;
pub use memory::*;

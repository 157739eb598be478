/// Perform a const assertion.
macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

/// Blocks.
pub mod block;
/// Inodes.
pub mod inode;
/// Disk-image geometry.
pub mod layout;
/// Allocation-table entries.
pub mod table;

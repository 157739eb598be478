use std::mem::size_of;

// block indices are represented as `u16`s on the disk. we keep that width in memory
// too, so a table entry and a block index are the same type.
pub type BlockIndex = u16;

/// The number of bytes occupied by one allocation-table entry.
pub const TABLE_ENTRY_SIZE: usize = size_of::<BlockIndex>();

/// Table entry marking a block as unused.
pub const FREE_BLOCK: BlockIndex = 0x0000;

/// Table entry marking a block as the last of its chain.
pub const END_BLOCK: BlockIndex = 0xffff;

/// The block that holds the root directory's chain head.
///
/// Nothing can ever link *to* block zero (a successor of zero would collide with
/// [`FREE_BLOCK`]), which is consistent with the root always being a chain head.
pub const ROOT_BLOCK: BlockIndex = 0;
